//! vremote-core: wire protocol, transports and TLS policy for talking to a
//! remote hypervisor-management daemon.
//!
//! This crate provides:
//! - XDR encoding and the RPC message header
//! - Length-prefixed framing with size limits
//! - Connection URI resolution
//! - Channel establishment over TCP, TLS, Unix sockets and relay helpers
//! - TLS certificate verification policy
//! - Logging setup

pub mod constants;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;
pub mod xdr;

pub use error::{CertificateFailure, Error, RemoteError, Result, Severity, TlsError};
pub use logging::{LogFormat, init_logging, init_test_logging};
