use clap::CommandFactory;
use clap::FromArgMatches;
use clap::Parser;
use tcpka::addr::*;
use tcpka::*;

/// Exit status for a session that hit a fatal error.
const EXIT_FAILURE: i32 = 1;

/// Exit status for malformed command-line input.
const EXIT_USAGE: i32 = 2;

const USAGE_ARGS: &str = "[-c CNT] [-d IDLE] [-i INTVL] HOST:PORT";

#[derive(Debug, Parser)]
#[clap(
    name = "tcpkatest",
    version,
    about = "Test TCP keep-alive configuration",
    override_usage = "tcpkatest [-c CNT] [-d IDLE] [-i INTVL] HOST:PORT",
    long_about = "Connects to HOST:PORT, applies the given TCP keep-alive \
options, then logs every socket readiness event with a timestamp until \
the connection ends."
)]
struct Opt {
    /// TCP_KEEPCNT: unacknowledged probes tolerated before the
    /// connection is considered dead.
    #[clap(
        short = 'c',
        value_name = "CNT",
        verbatim_doc_comment,
        value_parser = parse_cnt
    )]
    keep_count: Option<u32>,

    /// TCP_KEEPIDLE: idle seconds before the first probe.
    #[clap(
        short = 'd',
        value_name = "IDLE",
        verbatim_doc_comment,
        value_parser = parse_idle
    )]
    keep_idle: Option<u32>,

    /// TCP_KEEPINTVL: seconds between probes.
    #[clap(
        short = 'i',
        value_name = "INTVL",
        verbatim_doc_comment,
        value_parser = parse_intvl
    )]
    keep_interval: Option<u32>,

    /// Remote IPv4 address and port, e.g. 10.0.0.1:80
    #[clap(value_name = "HOST:PORT", value_parser = parse_ip4port)]
    remote: std::net::SocketAddrV4,
}

fn parse_cnt(s: &str) -> std::result::Result<u32, KaUsageError> {
    parse_positive_int('c', s)
}

fn parse_idle(s: &str) -> std::result::Result<u32, KaUsageError> {
    parse_positive_int('d', s)
}

fn parse_intvl(s: &str) -> std::result::Result<u32, KaUsageError> {
    parse_positive_int('i', s)
}

fn main() {
    let args: Vec<std::ffi::OsString> = std::env::args_os().collect();
    let arg0 = args
        .first()
        .and_then(|a| std::path::Path::new(a).file_name())
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tcpkatest".to_string());

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env(),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{}: {}", arg0, err);
    }

    let config = resolve_config(&arg0, args);

    // startup diagnostic, documents intent only
    eprint!("{}", config);

    if let Err(err) = observe(&config) {
        // observe has already written the timestamped diagnostic
        tracing::debug!(?err, "session failed");
        std::process::exit(EXIT_FAILURE);
    }
}

/// Turn the command line into a [KaConfig]. On malformed input this
/// prints a usage message naming `arg0` and exits with status 2.
fn resolve_config(arg0: &str, args: Vec<std::ffi::OsString>) -> KaConfig {
    let mut cmd = Opt::command().bin_name(arg0);

    let opt = match cmd
        .try_get_matches_from_mut(args)
        .and_then(|m| Opt::from_arg_matches(&m))
    {
        Err(err) => usage(arg0, err),
        Ok(opt) => opt,
    };

    KaConfig {
        keep_idle: opt.keep_idle,
        keep_count: opt.keep_count,
        keep_interval: opt.keep_interval,
        ..KaConfig::new(opt.remote)
    }
}

/// Report `err` and the usage line, then exit. Help and version requests
/// are printed by clap and exit successfully.
fn usage(arg0: &str, err: clap::Error) -> ! {
    if !err.use_stderr() {
        err.exit();
    }

    let msg = err.to_string();
    let msg = msg.lines().next().unwrap_or_default();
    let msg = msg.strip_prefix("error: ").unwrap_or(msg);
    eprintln!("{}: {}", arg0, msg);
    eprintln!("usage: {} {}", arg0, USAGE_ARGS);
    std::process::exit(EXIT_USAGE);
}
