//! Connection state.
//!
//! A [`Connection`] is live from a successful open until [`Connection::close`].
//! Once dead it holds no stream at all, so every further call fails with
//! [`Error::ClosedHandle`] without touching the network.

use tracing::{debug, info, warn};

use vremote_core::error::{Error, Result};
use vremote_core::protocol::{OpenArgs, OpenFlags, Procedure};
use vremote_core::transport::{Channel, ConnectParams, Transport};
use vremote_core::xdr::{XdrDecode, XdrEncode};

use crate::rpc::RpcClient;

#[derive(Debug)]
enum Link {
    Live(RpcClient<Channel>),
    Dead,
}

/// An open connection to the remote daemon.
#[derive(Debug)]
pub struct Connection {
    link: Link,
    transport: Transport,
    name: String,
    pub(crate) cached_type: Option<String>,
}

impl Connection {
    /// Send the open call over a freshly established channel.
    ///
    /// On failure the channel is released before the error is returned.
    pub async fn open(channel: Channel, params: &ConnectParams, flags: OpenFlags) -> Result<Self> {
        let mut rpc = RpcClient::new(channel);
        let args = OpenArgs {
            name: Some(params.name.clone()),
            flags,
        };

        if let Err(e) = rpc.call::<_, ()>(Procedure::Open, &args).await {
            debug!(error = %e, "Open call failed, releasing channel");
            rpc.into_inner().close().await;
            return Err(e);
        }

        info!(
            transport = %params.transport,
            name = %params.name,
            read_only = flags.read_only,
            "Connection open"
        );
        Ok(Self {
            link: Link::Live(rpc),
            transport: params.transport,
            name: params.name.clone(),
            cached_type: None,
        })
    }

    pub fn is_live(&self) -> bool {
        matches!(self.link, Link::Live(_))
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Target name sent in the open call.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issue one call on this connection.
    pub async fn call<A, R>(&mut self, procedure: Procedure, args: &A) -> Result<R>
    where
        A: XdrEncode + ?Sized,
        R: XdrDecode,
    {
        match &mut self.link {
            Link::Live(rpc) => rpc.call(procedure, args).await,
            Link::Dead => Err(Error::ClosedHandle),
        }
    }

    /// Send the close call and release the channel.
    ///
    /// The connection is dead afterwards whether or not the close call
    /// succeeded; its error, if any, is returned. Closing a dead connection
    /// returns [`Error::ClosedHandle`].
    pub async fn close(&mut self) -> Result<()> {
        let Link::Live(mut rpc) = std::mem::replace(&mut self.link, Link::Dead) else {
            return Err(Error::ClosedHandle);
        };
        self.cached_type = None;

        let result = rpc.call::<_, ()>(Procedure::Close, &()).await;
        if let Err(e) = &result {
            warn!(error = %e, "Close call failed, releasing connection anyway");
        }
        rpc.into_inner().close().await;

        info!(name = %self.name, "Connection closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;
    use vremote_core::protocol::{HEADER_LEN, MessageHeader, Status, encode_call, read_frame, write_frame};
    use vremote_core::transport;

    /// Answer every call with an empty success reply until the client hangs up.
    async fn echo_ok(listener: UnixListener) -> Vec<u32> {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut procedures = Vec::new();
        let mut buf = bytes::BytesMut::new();
        while let Ok(mut body) = read_frame(&mut conn).await {
            assert!(body.len() >= HEADER_LEN);
            let call = MessageHeader::decode(&mut body).unwrap();
            procedures.push(call.procedure);
            encode_call(&MessageHeader::reply_to(&call, Status::Ok), &(), &mut buf).unwrap();
            write_frame(&mut conn, &buf).await.unwrap();
        }
        procedures
    }

    #[tokio::test]
    async fn open_then_close_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let server = tokio::spawn(echo_ok(UnixListener::bind(&path).unwrap()));

        let params = ConnectParams {
            transport: Transport::Unix,
            socket: Some(path.to_string_lossy().into_owned()),
            name: "test:///default".into(),
            ..ConnectParams::default()
        };
        let channel = transport::establish(&params, OpenFlags::default(), None)
            .await
            .unwrap();
        let mut conn = Connection::open(channel, &params, OpenFlags::default())
            .await
            .unwrap();
        assert!(conn.is_live());
        assert_eq!(conn.name(), "test:///default");
        assert_eq!(conn.transport(), Transport::Unix);

        conn.close().await.unwrap();
        assert!(!conn.is_live());
        assert!(matches!(conn.close().await, Err(Error::ClosedHandle)));
        assert!(matches!(
            conn.call::<_, ()>(Procedure::GetType, &()).await,
            Err(Error::ClosedHandle)
        ));

        let procedures = server.await.unwrap();
        assert_eq!(
            procedures,
            vec![Procedure::Open.as_u32(), Procedure::Close.as_u32()]
        );
    }
}
