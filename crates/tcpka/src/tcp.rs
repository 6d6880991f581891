//! tcp socket lifecycle primitives

use crate::*;
use socket2::Domain;
use socket2::Protocol;
use socket2::SockAddr;
use socket2::Socket;
use socket2::Type;

/// Look up the "tcp" entry in the platform protocol database.
#[allow(unsafe_code)]
pub fn ka_tcp_protocol() -> Result<Protocol> {
    // SAFETY: getprotobyname returns null or a pointer into static
    // storage that stays valid until the next protocol database call.
    // We copy p_proto out immediately and this tool is single-threaded.
    let proto = unsafe {
        let ent = libc::getprotobyname(c"tcp".as_ptr());
        if ent.is_null() {
            return Err(KaError::ProtocolUnavailable);
        }
        (*ent).p_proto
    };
    Ok(Protocol::from(proto))
}

/// Create an IPv4 stream socket for `proto`.
/// The socket is closed when the returned value is dropped.
pub fn ka_tcp_socket(config: &KaConfig, proto: Protocol) -> Result<Socket> {
    Socket::new(Domain::IPV4, Type::STREAM, Some(proto)).map_err(|source| {
        KaError::SocketCreateFailed {
            addr: *config.remote.ip(),
            source,
        }
    })
}

/// Apply the requested keep-alive options, in order:
/// `SO_KEEPALIVE`, `TCP_KEEPIDLE`, `TCP_KEEPINTVL`, `TCP_KEEPCNT`.
/// Unset options are skipped. The first failure aborts.
pub fn ka_tcp_configure(socket: &Socket, config: &KaConfig) -> Result<()> {
    if config.keepalive {
        socket
            .set_keepalive(true)
            .map_err(opt_err(KaSockOpt::KeepAlive))?;
    }

    if let Some(secs) = config.keep_idle {
        sys::set_keep_idle(socket, secs)
            .map_err(opt_err(KaSockOpt::KeepIdle))?;
    }

    if let Some(secs) = config.keep_interval {
        sys::set_keep_interval(socket, secs)
            .map_err(opt_err(KaSockOpt::KeepInterval))?;
    }

    if let Some(count) = config.keep_count {
        sys::set_keep_count(socket, count)
            .map_err(opt_err(KaSockOpt::KeepCount))?;
    }

    Ok(())
}

fn opt_err(option: KaSockOpt) -> impl FnOnce(std::io::Error) -> KaError {
    move |source| KaError::OptionSetFailed { option, source }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
mod sys {
    use nix::sys::socket::setsockopt;
    use nix::sys::socket::sockopt;
    use socket2::Socket;

    pub(super) fn set_keep_idle(s: &Socket, v: u32) -> std::io::Result<()> {
        Ok(setsockopt(s, sockopt::TcpKeepIdle, &v)?)
    }

    pub(super) fn set_keep_interval(
        s: &Socket,
        v: u32,
    ) -> std::io::Result<()> {
        Ok(setsockopt(s, sockopt::TcpKeepInterval, &v)?)
    }

    pub(super) fn set_keep_count(s: &Socket, v: u32) -> std::io::Result<()> {
        Ok(setsockopt(s, sockopt::TcpKeepCount, &v)?)
    }
}

// no tcp-level keep-alive tunables through nix here
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd"
)))]
mod sys {
    use socket2::Socket;

    fn unsupported() -> std::io::Result<()> {
        Err(std::io::Error::from_raw_os_error(libc::ENOPROTOOPT))
    }

    pub(super) fn set_keep_idle(_: &Socket, _: u32) -> std::io::Result<()> {
        unsupported()
    }

    pub(super) fn set_keep_interval(
        _: &Socket,
        _: u32,
    ) -> std::io::Result<()> {
        unsupported()
    }

    pub(super) fn set_keep_count(_: &Socket, _: u32) -> std::io::Result<()> {
        unsupported()
    }
}

/// Blocking connect to the configured remote. The platform's default
/// connect timeout applies.
pub fn ka_tcp_connect(socket: &Socket, config: &KaConfig) -> Result<()> {
    socket
        .connect(&SockAddr::from(config.remote))
        .map_err(|source| KaError::ConnectFailed {
            addr: *config.remote.ip(),
            source,
        })
}
