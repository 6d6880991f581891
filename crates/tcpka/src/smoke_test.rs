use crate::tcp::*;
use crate::*;
use std::io::Write;
use std::net::SocketAddr;
use std::net::SocketAddrV4;
use std::net::TcpListener;
use std::time::Duration;

fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env(),
        )
        .with_file(true)
        .with_line_number(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn listen() -> (TcpListener, SocketAddrV4) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        oth => panic!("unexpected addr: {}", oth),
    };
    (listener, addr)
}

/// an address nobody is listening on
fn refused_addr() -> SocketAddrV4 {
    let (listener, addr) = listen();
    drop(listener);
    addr
}

fn log_lines(log: &[u8]) -> Vec<String> {
    let log = String::from_utf8(log.to_vec()).unwrap();
    log.lines()
        .map(|l| {
            let (ts, msg) = l.split_once(": ").unwrap();
            assert_eq!(20, ts.len(), "bad timestamp: {}", l);
            msg.to_string()
        })
        .collect()
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn hangup_line() -> String {
    format!("poll events: {}", KaEvents(libc::POLLIN | libc::POLLRDHUP))
}

#[test]
fn observe_peer_close_ends_session() {
    init_tracing();

    let (listener, addr) = listen();
    let peer = std::thread::spawn(move || {
        let (con, _) = listener.accept().unwrap();
        drop(con);
    });

    let mut log = Vec::new();
    observe_to(&KaConfig::new(addr), &mut log).unwrap();
    peer.join().unwrap();

    let lines = log_lines(&log);
    tracing::info!(?lines);
    assert_eq!("connected", lines[0]);
    assert!(lines.last().unwrap().starts_with("poll events: 0x"));
    assert!(lines.iter().all(|l| !l.starts_with("read: ")));

    // the FIN is seen as readable first, the hangup only after the
    // zero byte read
    #[cfg(any(target_os = "linux", target_os = "android"))]
    assert_eq!(
        vec![
            "connected".to_string(),
            "poll events: 0x1".to_string(),
            "read 0 bytes".to_string(),
            hangup_line(),
        ],
        lines,
    );
}

#[test]
fn observe_data_then_close_reads_data() {
    init_tracing();

    let (listener, addr) = listen();
    let peer = std::thread::spawn(move || {
        let (mut con, _) = listener.accept().unwrap();
        con.write_all(b"hello").unwrap();
        drop(con);
    });

    let mut log = Vec::new();
    observe_to(&KaConfig::new(addr), &mut log).unwrap();
    peer.join().unwrap();

    let lines = log_lines(&log);
    tracing::info!(?lines);

    let reads: Vec<&String> =
        lines.iter().filter(|l| l.starts_with("read ")).collect();
    assert_eq!(vec!["read 5 bytes", "read 0 bytes"], reads);

    #[cfg(any(target_os = "linux", target_os = "android"))]
    assert_eq!(
        vec![
            "connected".to_string(),
            "poll events: 0x1".to_string(),
            "read 5 bytes".to_string(),
            "poll events: 0x1".to_string(),
            "read 0 bytes".to_string(),
            hangup_line(),
        ],
        lines,
    );
}

#[test]
fn observe_logs_each_read_and_keeps_waiting() {
    init_tracing();

    let (listener, addr) = listen();
    let peer = std::thread::spawn(move || {
        let (mut con, _) = listener.accept().unwrap();
        con.write_all(b"hello").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        con.write_all(b"world!").unwrap();
        std::thread::sleep(Duration::from_millis(200));
    });

    let config = KaConfig::new(addr)
        .with_keep_idle(30)
        .unwrap()
        .with_keep_interval(5)
        .unwrap()
        .with_keep_count(3)
        .unwrap();
    let mut log = Vec::new();
    observe_to(&config, &mut log).unwrap();
    peer.join().unwrap();

    let lines = log_lines(&log);
    tracing::info!(?lines);

    let reads: Vec<&String> =
        lines.iter().filter(|l| l.starts_with("read ")).collect();
    assert_eq!(vec!["read 5 bytes", "read 6 bytes", "read 0 bytes"], reads);

    // every read is preceded by its own poll line
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("read ") {
            assert!(lines[i - 1].starts_with("poll events: "));
        }
    }
    assert!(lines.last().unwrap().starts_with("poll events: "));
}

#[test]
fn observe_connect_refused() {
    init_tracing();

    let addr = refused_addr();
    let mut log = Vec::new();
    let err = observe_to(&KaConfig::new(addr), &mut log).unwrap_err();

    match &err {
        KaError::ConnectFailed { addr: ip, source } => {
            assert_eq!(addr.ip(), ip);
            assert_eq!(std::io::ErrorKind::ConnectionRefused, source.kind());
        }
        oth => panic!("unexpected {:?}", oth),
    }

    let lines = log_lines(&log);
    assert_eq!(1, lines.len());
    assert!(lines[0].starts_with("connect \"127.0.0.1\": connect: "));
}

#[cfg(target_os = "linux")]
#[test]
fn observe_connect_refused_closes_socket() {
    fn fd_count() -> usize {
        std::fs::read_dir("/proc/self/fd").unwrap().count()
    }

    let addr = refused_addr();
    let before = fd_count();
    for _ in 0..64 {
        let mut log = Vec::new();
        assert!(observe_to(&KaConfig::new(addr), &mut log).is_err());
    }
    let after = fd_count();

    // other tests run concurrently, allow for their sockets
    assert!(after < before + 16, "before: {}, after: {}", before, after);
}

#[cfg(target_os = "linux")]
#[test]
fn observe_rejected_option_does_not_connect() {
    init_tracing();

    let (listener, addr) = listen();
    listener.set_nonblocking(true).unwrap();

    // linux caps TCP_KEEPCNT at 127
    let config = KaConfig::new(addr).with_keep_count(1000).unwrap();
    let mut log = Vec::new();
    let err = observe_to(&config, &mut log).unwrap_err();

    match &err {
        KaError::OptionSetFailed { option, source } => {
            assert_eq!(KaSockOpt::KeepCount, *option);
            assert_eq!(Some(libc::EINVAL), source.raw_os_error());
        }
        oth => panic!("unexpected {:?}", oth),
    }
    assert!(err.to_string().starts_with("setsockopt TCP_KEEPCNT: "));

    match listener.accept() {
        Err(err) => {
            assert_eq!(std::io::ErrorKind::WouldBlock, err.kind())
        }
        Ok((_, peer)) => panic!("unexpected connection from {}", peer),
    }

    let lines = log_lines(&log);
    assert_eq!(1, lines.len());
    assert!(lines.iter().all(|l| l != "connected"));
}

#[cfg(target_os = "linux")]
#[test]
fn configure_applies_options_in_order() {
    // idle and interval cap at 32767 on linux, count at 127
    let addr = refused_addr();
    let bad_all = KaConfig {
        remote: addr,
        keepalive: true,
        keep_idle: Some(40000),
        keep_interval: Some(40000),
        keep_count: Some(1000),
    };
    let bad_intvl_cnt = KaConfig {
        keep_idle: Some(10),
        ..bad_all.clone()
    };

    for (config, expect) in [
        (bad_all, KaSockOpt::KeepIdle),
        (bad_intvl_cnt, KaSockOpt::KeepInterval),
    ] {
        let socket = ka_tcp_socket(&config, ka_tcp_protocol().unwrap())
            .unwrap();
        match ka_tcp_configure(&socket, &config) {
            Err(KaError::OptionSetFailed { option, .. }) => {
                assert_eq!(expect, option)
            }
            oth => panic!("unexpected {:?}", oth),
        }
    }
}

#[cfg(target_os = "linux")]
#[test]
fn configure_sets_requested_values() {
    use nix::sys::socket::getsockopt;
    use nix::sys::socket::sockopt;

    let config = KaConfig::new(refused_addr())
        .with_keep_idle(42)
        .unwrap()
        .with_keep_interval(7)
        .unwrap()
        .with_keep_count(4)
        .unwrap();

    let socket =
        ka_tcp_socket(&config, ka_tcp_protocol().unwrap()).unwrap();
    ka_tcp_configure(&socket, &config).unwrap();

    assert!(socket.keepalive().unwrap());
    assert_eq!(42, getsockopt(&socket, sockopt::TcpKeepIdle).unwrap());
    assert_eq!(7, getsockopt(&socket, sockopt::TcpKeepInterval).unwrap());
    assert_eq!(4, getsockopt(&socket, sockopt::TcpKeepCount).unwrap());
}

#[test]
fn configure_skips_disabled_keepalive() {
    let config = KaConfig::new(refused_addr()).with_keepalive(false);
    let socket =
        ka_tcp_socket(&config, ka_tcp_protocol().unwrap()).unwrap();
    ka_tcp_configure(&socket, &config).unwrap();
    assert!(!socket.keepalive().unwrap());
}

#[test]
fn tcp_protocol_resolves() {
    let proto = ka_tcp_protocol().unwrap();
    assert_eq!(socket2::Protocol::TCP, proto);
}

#[test]
fn events_terminal_flags() {
    assert!(!KaEvents(libc::POLLIN).is_terminal());
    assert!(!KaEvents(0).is_terminal());
    assert!(KaEvents(libc::POLLIN | libc::POLLHUP).is_terminal());
    assert!(KaEvents(libc::POLLERR).is_terminal());
    assert!(KaEvents(libc::POLLNVAL).is_terminal());
    assert_eq!("0x1", KaEvents(libc::POLLIN).to_string());

    // bits without a portable name are kept and still end the session
    let odd = KaEvents(libc::POLLIN | 0x2000);
    assert!(odd.is_terminal());
    assert_eq!("0x2001", odd.to_string());
}

#[test]
fn log_time_format() {
    let ts = log_time();
    assert_eq!(20, ts.len());
    assert_eq!(Some('T'), ts.chars().nth(10));
    assert!(ts.ends_with('Z'));
    assert!(chrono::NaiveDateTime::parse_from_str(
        &ts,
        "%Y-%m-%dT%H:%M:%SZ"
    )
    .is_ok());
}
