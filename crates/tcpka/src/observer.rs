//! The connection observer.
//!
//! [observe] drives one socket through
//! `Created -> Configured -> Connected -> Observing -> Closed`.
//! Any failure jumps straight to `Closed`. While observing, each
//! readiness event is logged; plain readability leads to a read of up to
//! [READ_CHUNK] bytes, anything else (hangup, error, peer shutdown) ends
//! the session successfully.

use crate::tcp::*;
use crate::*;
use socket2::Socket;
use std::io::Read;
use std::io::Write;
use std::os::fd::AsRawFd;

/// Maximum bytes consumed per readable event.
pub const READ_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy)]
enum KaState {
    Created,
    Configured,
    Connected,
    Observing,
    Closed,
}

/// The raw set of flags reported by one readiness wait, exactly as the
/// kernel returned them (including bits with no portable name).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KaEvents(
    /// poll `revents`
    pub libc::c_short,
);

impl std::fmt::Debug for KaEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for KaEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0 as u16)
    }
}

impl KaEvents {
    /// True if anything other than plain readability was reported.
    /// This is how a session normally ends.
    pub fn is_terminal(&self) -> bool {
        self.0 & !libc::POLLIN != 0
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn log_time() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Writes timestamped diagnostic lines. Failures writing the log itself
/// are ignored, there is nowhere better to report them.
struct KaLog<'lt, W: Write> {
    out: &'lt mut W,
}

impl<'lt, W: Write> KaLog<'lt, W> {
    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        let _ = writeln!(self.out, "{}: {}", log_time(), args);
        let _ = self.out.flush();
    }
}

/// Connect to `config.remote` with the configured keep-alive options and
/// log readiness events to stderr until the connection ends.
///
/// Returns `Ok(())` when the wait reports anything other than plain
/// readability (peer shutdown, hangup, socket error).
pub fn observe(config: &KaConfig) -> Result<()> {
    observe_to(config, &mut std::io::stderr())
}

/// Same as [observe], writing the timestamped event log to `out`.
/// Every fatal error is also written to `out` as a timestamped line
/// before it is returned.
pub fn observe_to<W: Write>(config: &KaConfig, out: &mut W) -> Result<()> {
    let mut log = KaLog { out };

    let res = ka_session(config, &mut log);

    if let Err(err) = &res {
        log.line(format_args!("{}", err));
    }
    tracing::debug!(state = ?KaState::Closed, ok = res.is_ok());

    res
}

fn ka_session<W: Write>(
    config: &KaConfig,
    log: &mut KaLog<'_, W>,
) -> Result<()> {
    let proto = ka_tcp_protocol()?;

    // the socket is closed on drop, whichever way we leave this scope
    let socket = ka_tcp_socket(config, proto)?;
    tracing::debug!(state = ?KaState::Created, remote = %config.remote);

    ka_tcp_configure(&socket, config)?;
    tracing::debug!(
        state = ?KaState::Configured,
        keepalive = config.keepalive,
        keep_idle = ?config.keep_idle,
        keep_interval = ?config.keep_interval,
        keep_count = ?config.keep_count
    );

    ka_tcp_connect(&socket, config)?;
    tracing::debug!(state = ?KaState::Connected);
    log.line(format_args!("connected"));

    tracing::debug!(state = ?KaState::Observing);
    ka_observe_loop(&socket, log)
}

fn ka_observe_loop<W: Write>(
    socket: &Socket,
    log: &mut KaLog<'_, W>,
) -> Result<()> {
    let mut buf = [0; READ_CHUNK];
    let mut reader = socket;
    let mut interest = libc::POLLIN;
    let mut iteration: u64 = 0;

    loop {
        iteration += 1;

        let events = ka_wait(socket, interest)?;
        tracing::trace!(iteration, %events, "poll returned");
        log.line(format_args!("poll events: {}", events));

        if events.is_terminal() {
            return Ok(());
        }

        let count = reader
            .read(&mut buf[..])
            .map_err(|source| KaError::ReadFailed { source })?;
        tracing::trace!(iteration, byte_count = count, "read bytes");
        log.line(format_args!("read {} bytes", count));

        if count == 0 {
            // peer half-close, the next wait has to report the hangup
            interest = ka_hangup_interest();
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn ka_hangup_interest() -> libc::c_short {
    // linux reports a peer FIN only as POLLRDHUP, and only on request
    libc::POLLIN | libc::POLLRDHUP
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn ka_hangup_interest() -> libc::c_short {
    libc::POLLIN
}

/// Block with no timeout until `socket` is ready for `interest` or
/// reports an exceptional condition. `EINTR` restarts the wait.
#[allow(unsafe_code)]
fn ka_wait(socket: &Socket, interest: libc::c_short) -> Result<KaEvents> {
    loop {
        let mut pfd = libc::pollfd {
            fd: socket.as_raw_fd(),
            events: interest,
            revents: 0,
        };

        // SAFETY: pfd is a single valid pollfd that outlives the call,
        // and the descriptor is kept open by `socket`.
        let rv = unsafe { libc::poll(&mut pfd, 1, -1) };
        if rv >= 0 {
            return Ok(KaEvents(pfd.revents));
        }

        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            tracing::trace!("poll interrupted");
            continue;
        }
        return Err(KaError::WaitFailed { source: err });
    }
}
