//! Call/reply engine.
//!
//! One call at a time: frame the request, send it, wait for the matching
//! reply, then decode either the result or the server's error payload.
//! `&mut self` on [`RpcClient::call`] is what guarantees a single call in
//! flight per connection.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use vremote_core::error::{Error, RemoteError, Result};
use vremote_core::protocol::{
    MessageHeader, Procedure, RemoteErrorPayload, Status, encode_call, read_frame, write_frame,
};
use vremote_core::xdr::{XdrDecode, XdrEncode};

/// Initial capacity of the send buffer.
const SEND_BUFFER_CAPACITY: usize = 8192;

/// RPC client over any byte stream.
#[derive(Debug)]
pub struct RpcClient<S> {
    stream: S,
    serial: u32,
    send_buf: BytesMut,
}

impl<S> RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            serial: 0,
            send_buf: BytesMut::with_capacity(SEND_BUFFER_CAPACITY),
        }
    }

    /// Serial the next call will carry.
    pub fn next_serial(&self) -> u32 {
        self.serial
    }

    /// Issue one call and wait for its reply.
    ///
    /// A header that does not answer this call is a protocol error and the
    /// payload is left undecoded. A status=error reply becomes
    /// [`Error::Remote`].
    pub async fn call<A, R>(&mut self, procedure: Procedure, args: &A) -> Result<R>
    where
        A: XdrEncode + ?Sized,
        R: XdrDecode,
    {
        let serial = self.serial;
        self.serial = self.serial.wrapping_add(1);

        let header = MessageHeader::call(procedure, serial);
        encode_call(&header, args, &mut self.send_buf)?;

        debug!(?procedure, serial, len = self.send_buf.len(), "Sending call");
        write_frame(&mut self.stream, &self.send_buf).await?;

        let mut body = read_frame(&mut self.stream).await?;
        let reply = MessageHeader::decode(&mut body)
            .map_err(|e| Error::protocol(format!("unmarshalling reply header: {}", e)))?;
        trace!(?reply, "Received reply header");

        match reply.validate_reply(&header)? {
            Status::Ok => R::decode(&mut body)
                .map_err(|e| Error::protocol(format!("unmarshalling ret: {}", e))),
            Status::Error => {
                let payload = RemoteErrorPayload::decode(&mut body)
                    .map_err(|e| Error::protocol(format!("unmarshalling remote_error: {}", e)))?;
                debug!(
                    ?procedure,
                    serial,
                    code = payload.code,
                    subsystem = payload.subsystem,
                    "Server returned error"
                );
                Err(RemoteError::from(payload).into())
            }
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vremote_core::protocol::{Domain, read_frame, write_frame};
    use tokio::io::DuplexStream;
    use uuid::Uuid;

    /// Read one call from `server` and answer with `header_edit` applied to
    /// the reply header, followed by `payload`.
    async fn answer(
        server: &mut DuplexStream,
        status: Status,
        header_edit: impl FnOnce(&mut MessageHeader),
        payload: &(impl XdrEncode + ?Sized),
    ) -> MessageHeader {
        let mut body = read_frame(server).await.unwrap();
        let call = MessageHeader::decode(&mut body).unwrap();
        let mut reply = MessageHeader::reply_to(&call, status);
        header_edit(&mut reply);

        let mut buf = BytesMut::new();
        encode_call(&reply, payload, &mut buf).unwrap();
        write_frame(server, &buf).await.unwrap();
        call
    }

    #[tokio::test]
    async fn call_returns_decoded_result() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut rpc = RpcClient::new(client);

        let daemon = tokio::spawn(async move {
            answer(&mut server, Status::Ok, |_| {}, "QEMU").await
        });
        let ty: String = rpc.call(Procedure::GetType, &()).await.unwrap();
        assert_eq!(ty, "QEMU");

        let call = daemon.await.unwrap();
        assert_eq!(call.procedure, Procedure::GetType.as_u32());
        assert_eq!(call.serial, 0);
        assert_eq!(rpc.next_serial(), 1);
    }

    #[tokio::test]
    async fn serials_increase_per_call() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut rpc = RpcClient::new(client);

        let daemon = tokio::spawn(async move {
            let mut serials = Vec::new();
            for _ in 0..3 {
                serials.push(answer(&mut server, Status::Ok, |_| {}, &7i32).await.serial);
            }
            serials
        });
        for _ in 0..3 {
            let n: i32 = rpc.call(Procedure::NumOfDomains, &()).await.unwrap();
            assert_eq!(n, 7);
        }
        assert_eq!(daemon.await.unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn serial_mismatch_is_protocol_error() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut rpc = RpcClient::new(client);

        // The payload is not a valid string: decoding it would fail with a
        // different message.
        let daemon = tokio::spawn(async move {
            answer(&mut server, Status::Ok, |h| h.serial += 1, &u32::MAX).await
        });
        let err = rpc
            .call::<_, String>(Procedure::GetType, &())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("unknown serial"), "{}", err);
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn wrong_procedure_and_program_are_protocol_errors() {
        for edit in [
            (|h: &mut MessageHeader| h.procedure = 99) as fn(&mut MessageHeader),
            |h: &mut MessageHeader| h.program = 1,
            |h: &mut MessageHeader| h.version = 2,
            |h: &mut MessageHeader| h.direction = 0,
            |h: &mut MessageHeader| h.status = 7,
        ] {
            let (client, mut server) = tokio::io::duplex(4096);
            let mut rpc = RpcClient::new(client);
            let daemon = tokio::spawn(async move {
                answer(&mut server, Status::Ok, edit, &()).await
            });
            let err = rpc.call::<_, ()>(Procedure::GetType, &()).await.unwrap_err();
            assert!(matches!(err, Error::Protocol { .. }), "{:?}", err);
            daemon.await.unwrap();
        }
    }

    #[tokio::test]
    async fn error_reply_becomes_remote_error() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut rpc = RpcClient::new(client);

        let mut payload = RemoteErrorPayload::new(10, 42, "boom");
        payload.domain = Some(Domain {
            name: "guest".into(),
            uuid: Uuid::nil(),
            id: 5,
        });
        let daemon = tokio::spawn(async move {
            answer(&mut server, Status::Error, |_| {}, &payload).await
        });

        let err = rpc
            .call::<_, String>(Procedure::DomainGetOsType, &())
            .await
            .unwrap_err();
        assert!(err.is_remote());
        let remote = err.remote().unwrap();
        assert_eq!(remote.subsystem, 10);
        assert_eq!(remote.code, 42);
        assert_eq!(remote.message.as_deref(), Some("boom"));
        assert_eq!(remote.domain.as_ref().map(|d| d.name.as_str()), Some("guest"));
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn peer_closing_is_connection_closed() {
        let (client, server) = tokio::io::duplex(4096);
        let mut rpc = RpcClient::new(client);
        drop(server);

        let err = rpc.call::<_, ()>(Procedure::Close, &()).await.unwrap_err();
        assert!(err.is_local());
    }
}
