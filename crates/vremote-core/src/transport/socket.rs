//! Direct socket transports: TCP (plain or as the TLS carrier) and local
//! Unix-domain sockets.

use std::future::Future;
use std::path::Path;

use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

use crate::error::{Error, Result};

/// Connect to `host:port`, trying each resolved address in order.
///
/// `on_connected` runs on every successfully connected stream (for TLS it
/// performs the handshake). If it fails the stream is dropped and the next
/// address is tried. When every candidate fails, the last error is returned.
pub async fn connect_tcp<T, F, Fut>(host: &str, port: u16, mut on_connected: F) -> Result<T>
where
    F: FnMut(TcpStream) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::Transport {
            message: format!("unable to resolve '{}': {}", host, e),
        })?;

    let mut last_err = None;
    for addr in addrs {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(%addr, error = %e, "Connect failed, trying next address");
                last_err = Some(Error::Transport {
                    message: format!("unable to connect to '{}': {}", addr, e),
                });
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, error = %e, "Failed to disable Nagle");
        }

        match on_connected(stream).await {
            Ok(value) => {
                debug!(%addr, "Connected");
                return Ok(value);
            }
            Err(e) => {
                debug!(%addr, error = %e, "Session setup failed, trying next address");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Transport {
        message: format!("no addresses found for '{}'", host),
    }))
}

/// Connect to a local daemon socket.
pub async fn connect_unix(path: &Path) -> Result<UnixStream> {
    let stream = UnixStream::connect(path)
        .await
        .map_err(|e| Error::Transport {
            message: format!("unable to connect to '{}': {}", path.display(), e),
        })?;
    debug!(path = %path.display(), "Connected to local socket");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, UnixListener};

    #[tokio::test]
    async fn tcp_connects_and_runs_hook() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let nodelay = connect_tcp("127.0.0.1", port, |s| async move { Ok(s.nodelay()?) })
            .await
            .unwrap();
        assert!(nodelay);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_returns_last_hook_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move { listener.accept().await });

        let err = connect_tcp("127.0.0.1", port, |_s| async {
            Err::<(), _>(Error::protocol("hook failed"))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("hook failed"));
    }

    #[tokio::test]
    async fn tcp_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect_tcp("127.0.0.1", port, |s| async move { Ok(s) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[tokio::test]
    async fn unix_connect_and_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let _listener = UnixListener::bind(&path).unwrap();

        assert!(connect_unix(&path).await.is_ok());

        let err = connect_unix(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }
}
