//! Connection configuration

use crate::*;
use std::net::SocketAddrV4;

/// The socket options this tool knows how to apply, in the order
/// [crate::tcp::ka_tcp_configure] applies them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KaSockOpt {
    /// `SO_KEEPALIVE` - enable keep-alive probes.
    KeepAlive,

    /// `TCP_KEEPIDLE` - idle seconds before the first probe.
    KeepIdle,

    /// `TCP_KEEPINTVL` - seconds between probes.
    KeepInterval,

    /// `TCP_KEEPCNT` - unacknowledged probes before the peer is dead.
    KeepCount,
}

impl KaSockOpt {
    /// The conventional C name of this option.
    pub fn name(&self) -> &'static str {
        match self {
            KaSockOpt::KeepAlive => "SO_KEEPALIVE",
            KaSockOpt::KeepIdle => "TCP_KEEPIDLE",
            KaSockOpt::KeepInterval => "TCP_KEEPINTVL",
            KaSockOpt::KeepCount => "TCP_KEEPCNT",
        }
    }
}

impl std::fmt::Display for KaSockOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Check a keep-alive tunable against `0 < value < i32::MAX`.
pub fn check_tunable(
    option: KaSockOpt,
    value: u32,
) -> std::result::Result<u32, KaUsageError> {
    if value == 0 || value >= i32::MAX as u32 {
        return Err(KaUsageError::OutOfRange { option, value });
    }
    Ok(value)
}

/// Everything the observer needs to know about one session.
/// Unset tunables (`None`) are left at the operating system default.
///
/// The [std::fmt::Display] impl renders the startup diagnostic,
/// showing unset tunables as `-1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KaConfig {
    /// Remote IPv4 address and port.
    pub remote: SocketAddrV4,

    /// Whether `SO_KEEPALIVE` is turned on before connecting.
    pub keepalive: bool,

    /// `TCP_KEEPIDLE` seconds.
    pub keep_idle: Option<u32>,

    /// `TCP_KEEPCNT` probes.
    pub keep_count: Option<u32>,

    /// `TCP_KEEPINTVL` seconds.
    pub keep_interval: Option<u32>,
}

impl KaConfig {
    /// Construct a config for `remote` with keep-alive enabled and
    /// every tunable left at the system default.
    pub fn new(remote: SocketAddrV4) -> Self {
        Self {
            remote,
            keepalive: true,
            keep_idle: None,
            keep_count: None,
            keep_interval: None,
        }
    }

    /// Turn `SO_KEEPALIVE` on or off.
    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Set the idle time in seconds.
    pub fn with_keep_idle(
        mut self,
        secs: u32,
    ) -> std::result::Result<Self, KaUsageError> {
        self.keep_idle = Some(check_tunable(KaSockOpt::KeepIdle, secs)?);
        Ok(self)
    }

    /// Set the probe count.
    pub fn with_keep_count(
        mut self,
        count: u32,
    ) -> std::result::Result<Self, KaUsageError> {
        self.keep_count = Some(check_tunable(KaSockOpt::KeepCount, count)?);
        Ok(self)
    }

    /// Set the probe interval in seconds.
    pub fn with_keep_interval(
        mut self,
        secs: u32,
    ) -> std::result::Result<Self, KaUsageError> {
        self.keep_interval =
            Some(check_tunable(KaSockOpt::KeepInterval, secs)?);
        Ok(self)
    }

    /// The value this config wants for `opt`, as the C tool would print
    /// it: `-1` for unset, `0`/`1` for `SO_KEEPALIVE`.
    pub fn sockopt_value(&self, opt: KaSockOpt) -> i64 {
        fn or_unset(v: Option<u32>) -> i64 {
            v.map(i64::from).unwrap_or(-1)
        }

        match opt {
            KaSockOpt::KeepAlive => i64::from(self.keepalive),
            KaSockOpt::KeepIdle => or_unset(self.keep_idle),
            KaSockOpt::KeepInterval => or_unset(self.keep_interval),
            KaSockOpt::KeepCount => or_unset(self.keep_count),
        }
    }
}

impl std::fmt::Display for KaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "will connect to: {} port {}",
            self.remote.ip(),
            self.remote.port()
        )?;
        for opt in [
            KaSockOpt::KeepAlive,
            KaSockOpt::KeepIdle,
            KaSockOpt::KeepCount,
            KaSockOpt::KeepInterval,
        ] {
            writeln!(f, "{:<13} = {}", opt.name(), self.sockopt_value(opt))?;
        }
        Ok(())
    }
}
