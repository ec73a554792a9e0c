//! Driver entry point: URI in, open connection out.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use vremote_core::error::Result;
use vremote_core::protocol::OpenFlags;
use vremote_core::transport::{self, ConnectParams, TlsContext, TlsPaths, Transport};

use crate::connection::Connection;

/// Opens connections to remote daemons.
///
/// TLS credentials are loaded on the first `tls` open and shared by every
/// later connection made through this driver (and its clones).
#[derive(Debug, Clone, Default)]
pub struct RemoteDriver {
    tls_paths: TlsPaths,
    tls: Arc<OnceCell<Arc<TlsContext>>>,
}

impl RemoteDriver {
    pub fn new(tls_paths: TlsPaths) -> Self {
        Self {
            tls_paths,
            tls: Arc::new(OnceCell::new()),
        }
    }

    /// Use already-loaded credentials instead of reading `tls_paths`.
    pub fn with_tls_context(ctx: TlsContext) -> Self {
        Self {
            tls_paths: TlsPaths::default(),
            tls: Arc::new(OnceCell::new_with(Some(Arc::new(ctx)))),
        }
    }

    pub fn tls_paths(&self) -> &TlsPaths {
        &self.tls_paths
    }

    /// Open a connection for `uri`.
    ///
    /// Returns `Ok(None)` when the URI is not one this driver handles.
    pub async fn open(&self, uri: Option<&str>, flags: OpenFlags) -> Result<Option<Connection>> {
        let Some(params) = transport::resolve(uri)? else {
            return Ok(None);
        };
        self.open_params(&params, flags).await.map(Some)
    }

    /// Open a connection from already-resolved parameters.
    pub async fn open_params(&self, params: &ConnectParams, flags: OpenFlags) -> Result<Connection> {
        let tls = match params.transport {
            Transport::Tls => Some(self.tls_context().await?),
            _ => None,
        };

        let channel = transport::establish(params, flags, tls.as_deref()).await?;
        Connection::open(channel, params, flags).await
    }

    async fn tls_context(&self) -> Result<Arc<TlsContext>> {
        let ctx = self
            .tls
            .get_or_try_init(|| async {
                debug!(paths = ?self.tls_paths, "Loading TLS credentials");
                TlsContext::load(&self.tls_paths).await.map(Arc::new)
            })
            .await?;
        Ok(ctx.clone())
    }
}
