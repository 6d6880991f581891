//! addr and option-argument parsing

use crate::*;
use std::net::Ipv4Addr;
use std::net::SocketAddrV4;

/// Parse `HOST:PORT` where HOST is a dotted-quad IPv4 address and PORT is
/// a decimal number in `1..=65535`, optionally preceded by whitespace.
/// The split happens at the last colon.
pub fn parse_ip4port(
    ipport: &str,
) -> std::result::Result<SocketAddrV4, KaUsageError> {
    let bad = || KaUsageError::InvalidIpPort(ipport.to_string());

    let (host, port) = ipport.rsplit_once(':').ok_or_else(bad)?;

    let ip: Ipv4Addr = host.parse().map_err(|_| bad())?;

    // strtol(.., 10) skips leading whitespace
    let port: i64 = port.trim_start().parse().map_err(|_| bad())?;
    if port <= 0 || port >= 65536 {
        return Err(bad());
    }

    Ok(SocketAddrV4::new(ip, port as u16))
}

/// Parse the option-argument for short option `optname` as a positive
/// `int`, strictly less than `i32::MAX`.
///
/// Follows `strtol(.., 0)` conventions: leading whitespace and an optional
/// sign are allowed, `0x` selects hexadecimal, a leading `0` selects octal.
/// Trailing garbage is rejected.
pub fn parse_positive_int(
    optname: char,
    optarg: &str,
) -> std::result::Result<u32, KaUsageError> {
    let bad = || KaUsageError::InvalidValue(optname);

    let val = strtol_auto(optarg).ok_or_else(bad)?;
    if val <= 0 || val >= i64::from(i32::MAX) {
        return Err(bad());
    }

    Ok(val as u32)
}

/// Whole-string integer parse with automatic radix detection.
/// Values that do not fit in an `i64` are treated as invalid.
fn strtol_auto(s: &str) -> Option<i64> {
    let s = s.trim_start();

    let (neg, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, digits) = if let Some(hex) =
        s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
    {
        (16, hex)
    } else if s.len() > 1 && s.starts_with('0') {
        (8, &s[1..])
    } else {
        (10, s)
    };

    // from_str_radix would otherwise accept a second sign
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let val = i64::from_str_radix(digits, radix).ok()?;
    Some(if neg { -val } else { val })
}
