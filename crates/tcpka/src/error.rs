use crate::config::KaSockOpt;
use std::net::Ipv4Addr;

/// A fatal failure of the connection observer. Every variant ends the
/// session; the socket, if one was created, has already been closed by
/// the time the caller sees this value.
#[derive(Debug, thiserror::Error)]
pub enum KaError {
    /// The platform protocol database has no "tcp" entry.
    #[error("protocol not found: \"tcp\"")]
    ProtocolUnavailable,

    /// The stream socket could not be created.
    #[error("connect \"{addr}\": socket: {source}")]
    SocketCreateFailed {
        /// remote address we were about to connect to
        addr: Ipv4Addr,
        /// underlying system error
        source: std::io::Error,
    },

    /// Applying one of the keep-alive socket options failed.
    #[error("setsockopt {option}: {source}")]
    OptionSetFailed {
        /// which option was being applied
        option: KaSockOpt,
        /// underlying system error
        source: std::io::Error,
    },

    /// The blocking connect failed.
    #[error("connect \"{addr}\": connect: {source}")]
    ConnectFailed {
        /// remote address
        addr: Ipv4Addr,
        /// underlying system error
        source: std::io::Error,
    },

    /// The readiness wait failed with something other than `EINTR`.
    #[error("poll: {source}")]
    WaitFailed {
        /// underlying system error
        source: std::io::Error,
    },

    /// Reading from a readable socket failed.
    #[error("read: {source}")]
    ReadFailed {
        /// underlying system error
        source: std::io::Error,
    },
}

impl KaError {
    /// The wrapped system error, if this failure carries one.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            KaError::ProtocolUnavailable => None,
            KaError::SocketCreateFailed { source, .. }
            | KaError::OptionSetFailed { source, .. }
            | KaError::ConnectFailed { source, .. }
            | KaError::WaitFailed { source }
            | KaError::ReadFailed { source } => Some(source),
        }
    }
}

/// Malformed command-line input. These never reach the observer;
/// the binary reports them with a usage line and exits with status 2.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KaUsageError {
    /// An option-argument was not a positive `int`.
    #[error("invalid value for -{0}")]
    InvalidValue(char),

    /// The positional `HOST:PORT` argument could not be parsed.
    #[error("invalid IP/port: \"{0}\"")]
    InvalidIpPort(String),

    /// A keep-alive tunable outside `0 < v < i32::MAX`.
    #[error("{option} value out of range: {value}")]
    OutOfRange {
        /// the tunable being configured
        option: KaSockOpt,
        /// the rejected value
        value: u32,
    },
}
