//! Transport layer: URI resolution and channel establishment.
//!
//! A connection URI resolves to [`ConnectParams`]; [`establish`] turns those
//! into an open [`Channel`], a bidirectional byte stream over one of:
//! - plain TCP
//! - TCP wrapped in TLS (with the verification policy in [`tls`])
//! - a local Unix-domain socket
//! - the stdin/stdout of a relay helper (`ssh` or a user command)

pub mod cert;
pub mod query;
pub mod relay;
pub mod socket;
pub mod tls;
pub mod uri;

use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tokio::process::Child;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::constants::{
    DEFAULT_SSH_PORT, DEFAULT_TCP_PORT, DEFAULT_TLS_PORT, DEFAULT_UNIX_SOCKET,
    DEFAULT_UNIX_SOCKET_RO, RELAY_EXIT_GRACE,
};
use crate::error::{Error, Result};
use crate::protocol::OpenFlags;

pub use query::{QueryField, QueryFields};
pub use relay::{RelayCommand, spawn_duplex};
pub use tls::{PolicyVerifier, TlsContext, TlsPaths};
pub use uri::resolve;

/// How the byte stream to the daemon is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Transport {
    #[default]
    Tls,
    Unix,
    Ssh,
    Ext,
    Tcp,
}

impl Transport {
    /// Port used when the URI names none; `None` for transports without one.
    pub fn default_port(self) -> Option<u16> {
        match self {
            Transport::Tls => Some(DEFAULT_TLS_PORT),
            Transport::Tcp => Some(DEFAULT_TCP_PORT),
            Transport::Ssh => Some(DEFAULT_SSH_PORT),
            Transport::Unix | Transport::Ext => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Tls => "tls",
            Transport::Unix => "unix",
            Transport::Ssh => "ssh",
            Transport::Ext => "ext",
            Transport::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Transport::Tls,
            Transport::Unix,
            Transport::Ssh,
            Transport::Ext,
            Transport::Tcp,
        ]
        .into_iter()
        .find(|t| s.eq_ignore_ascii_case(t.as_str()))
        .ok_or_else(|| Error::Config {
            message: format!(
                "transport '{}' in URL not recognised (should be tls|unix|ssh|ext|tcp)",
                s
            ),
        })
    }
}

/// Everything needed to reach the daemon, derived from the URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
    pub transport: Transport,
    /// Server host; `localhost` when the URI has none.
    pub host: String,
    /// Explicit or per-transport default port; 0 for `unix` and `ext`.
    pub port: u16,
    /// Remote login name (ssh only).
    pub username: Option<String>,
    /// Target name sent in the open call.
    pub name: String,
    pub socket: Option<String>,
    pub command: Option<String>,
    pub netcat: Option<String>,
    /// Accept an untrusted certificate chain.
    pub no_verify: bool,
}

impl ConnectParams {
    /// Local socket path: the explicit one, else the default for the
    /// requested access mode.
    pub fn socket_path(&self, flags: OpenFlags) -> &str {
        match &self.socket {
            Some(path) => path,
            None if flags.read_only => DEFAULT_UNIX_SOCKET_RO,
            None => DEFAULT_UNIX_SOCKET,
        }
    }
}

/// An open byte stream to the daemon.
#[derive(Debug)]
pub enum Channel {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Unix(UnixStream),
    Relay { stream: UnixStream, child: Child },
}

impl Channel {
    pub fn is_tls(&self) -> bool {
        matches!(self, Channel::Tls(_))
    }

    /// Release the channel: TLS close_notify, stream shutdown, and reaping
    /// of the relay helper. Failures are logged, not returned.
    pub async fn close(self) {
        match self {
            Channel::Tcp(mut stream) => {
                let _ = stream.shutdown().await;
            }
            Channel::Tls(mut stream) => {
                if let Err(e) = stream.shutdown().await {
                    debug!(error = %e, "TLS shutdown failed");
                }
            }
            Channel::Unix(mut stream) => {
                let _ = stream.shutdown().await;
            }
            Channel::Relay { stream, child } => {
                drop(stream);
                reap_relay(child).await;
            }
        }
    }
}

/// Give the helper a short grace period to exit on stdin EOF, then kill it.
async fn reap_relay(mut child: Child) {
    let waited = tokio::time::timeout(RELAY_EXIT_GRACE, child.wait()).await;
    match waited {
        Ok(Ok(status)) => {
            debug!(%status, "Relay helper exited");
            return;
        }
        Ok(Err(e)) => {
            debug!(error = %e, "Failed to reap relay helper");
            return;
        }
        Err(_) => debug!(pid = ?child.id(), "Relay helper still running, killing it"),
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Failed to kill relay helper");
    }
}

impl AsyncRead for Channel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Channel::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Channel::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Channel::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Channel::Relay { stream, .. } => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Channel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Channel::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Channel::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Channel::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Channel::Relay { stream, .. } => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Channel::Tcp(s) => Pin::new(s).poll_flush(cx),
            Channel::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Channel::Unix(s) => Pin::new(s).poll_flush(cx),
            Channel::Relay { stream, .. } => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Channel::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Channel::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Channel::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Channel::Relay { stream, .. } => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Open the channel described by `params`.
///
/// `tls` must be provided for the `tls` transport. Nothing opened for a
/// failed attempt outlives this call.
pub async fn establish(
    params: &ConnectParams,
    flags: OpenFlags,
    tls: Option<&TlsContext>,
) -> Result<Channel> {
    debug!(transport = %params.transport, host = %params.host, "Establishing channel");

    match params.transport {
        Transport::Tcp => {
            let stream = socket::connect_tcp(&params.host, params.port, |s| async move { Ok(s) })
                .await?;
            Ok(Channel::Tcp(stream))
        }
        Transport::Tls => {
            let ctx = tls.ok_or_else(|| Error::Config {
                message: "TLS transport requested without credentials".to_string(),
            })?;
            let host = params.host.as_str();
            let no_verify = params.no_verify;
            let stream = socket::connect_tcp(host, params.port, |s| {
                tls::negotiate(ctx, s, host, no_verify)
            })
            .await?;
            Ok(Channel::Tls(Box::new(stream)))
        }
        Transport::Unix => {
            let path = params.socket_path(flags);
            let stream = socket::connect_unix(Path::new(path)).await?;
            Ok(Channel::Unix(stream))
        }
        Transport::Ssh => relay_channel(&RelayCommand::ssh(params)),
        Transport::Ext => {
            let command = params.command.as_deref().ok_or_else(|| Error::Config {
                message: "for 'ext' transport, command is required".to_string(),
            })?;
            relay_channel(&RelayCommand::external(command))
        }
    }
}

fn relay_channel(command: &RelayCommand) -> Result<Channel> {
    let (stream, child) = spawn_duplex(command)?;
    Ok(Channel::Relay { stream, child })
}
