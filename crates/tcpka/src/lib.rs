#![deny(missing_docs)]
#![deny(unsafe_code)]
//! tcp keep-alive observation diagnostic
//!
//! Establishes a single IPv4 TCP connection with caller-specified
//! keep-alive socket options, then blocks on readiness events and logs
//! each one with a timestamp until the connection terminates.
//!
//! - [addr] - `HOST:PORT` and option-argument parsing
//! - [config] - the immutable [KaConfig] consumed by the observer
//! - [tcp] - socket creation and keep-alive option application
//! - [observer] - the connect-and-observe loop, see [observe]

mod error;
pub use error::*;

pub mod addr;

pub mod config;
pub use config::*;

pub mod tcp;

pub mod observer;
pub use observer::*;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, KaError>;


#[cfg(test)]
mod smoke_test;
