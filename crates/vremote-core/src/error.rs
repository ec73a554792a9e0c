//! Error types for vremote-core.

use std::fmt;

use thiserror::Error;

use crate::protocol::{Domain, Network};

/// Main error type for vremote operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing connection parameter.
    #[error("invalid argument: {message}")]
    Config { message: String },

    /// Channel establishment failed (resolve, socket, connect, spawn).
    #[error("system error: {message}")]
    Transport { message: String },

    /// TLS credential, handshake or certificate failure.
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Framing or header violation on an established connection.
    #[error("RPC error: {message}")]
    Protocol { message: String },

    /// XDR encoding/decoding failure.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Peer closed the channel mid-message.
    #[error("socket closed unexpectedly")]
    ConnectionClosed,

    /// The server answered with status=error.
    #[error("remote error: {0}")]
    Remote(Box<RemoteError>),

    /// Operation attempted on a closed connection.
    #[error("tried to use a closed or uninitialised handle")]
    ClosedHandle,

    /// Allocation failed.
    #[error("out of memory: {message}")]
    ResourceExhausted { message: String },
}

impl Error {
    /// Returns true if the server itself reported this failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Remote(_))
    }

    /// Returns true if this failure originated locally (transport, TLS or protocol).
    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }

    /// The server-reported error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(err) => Some(err),
            _ => None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Error::Codec {
            message: message.into(),
        }
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote(Box::new(err))
    }
}

/// TLS failure classification.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Trust anchors or client certificate/key could not be loaded.
    #[error("failed to load credentials: {message}")]
    Credentials { message: String },

    /// The handshake failed for a reason other than certificate policy.
    #[error("handshake failed: {message}")]
    Handshake { message: String },

    /// The peer certificate was rejected.
    #[error("{0}")]
    Certificate(CertificateFailure),

    /// The server did not send the liveness byte after verification.
    #[error("server verification (of our certificate or IP address) failed")]
    ServerVerificationFailed,
}

/// Reason a peer certificate was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateFailure {
    #[error("the certificate is not trusted")]
    Untrusted,

    #[error("the certificate hasn't got a known issuer")]
    UnknownIssuer,

    #[error("the certificate has been revoked")]
    Revoked,

    #[error("the certificate uses an insecure algorithm")]
    InsecureAlgorithm,

    #[error("certificate type is not X.509")]
    WrongType,

    #[error("the certificate has expired")]
    Expired,

    #[error("the certificate is not yet activated")]
    NotYetActive,

    #[error("certificate's owner does not match the hostname ({hostname})")]
    HostnameMismatch { hostname: String },
}

impl CertificateFailure {
    /// Chain-trust failures are the only ones the verification override may waive.
    pub fn is_trust_failure(&self) -> bool {
        matches!(
            self,
            CertificateFailure::Untrusted
                | CertificateFailure::UnknownIssuer
                | CertificateFailure::Revoked
                | CertificateFailure::InsecureAlgorithm
        )
    }
}

/// Severity of a server-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    None,
    Warning,
    Error,
    Unknown(i32),
}

impl From<i32> for Severity {
    fn from(level: i32) -> Self {
        match level {
            0 => Severity::None,
            1 => Severity::Warning,
            2 => Severity::Error,
            other => Severity::Unknown(other),
        }
    }
}

/// A failure reported by the server, converted from the wire error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Originating subsystem on the server.
    pub subsystem: i32,
    /// Numeric error code.
    pub code: i32,
    /// Raw severity level.
    pub level: i32,
    /// Human-readable message.
    pub message: Option<String>,
    pub str1: Option<String>,
    pub str2: Option<String>,
    pub str3: Option<String>,
    pub int1: i32,
    pub int2: i32,
    /// Domain involved in the failure, if the server named one.
    pub domain: Option<Domain>,
    /// Network involved in the failure, if the server named one.
    pub network: Option<Network>,
}

impl RemoteError {
    pub fn severity(&self) -> Severity {
        Severity::from(self.level)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}", message)?,
            None => write!(f, "error code {}", self.code)?,
        }
        write!(f, " (subsystem {}, code {})", self.subsystem, self.code)
    }
}

/// Convenience result type for vremote operations.
pub type Result<T> = std::result::Result<T, Error>;
