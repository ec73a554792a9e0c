//! Scripted daemon for exercising the client without a real server.
//!
//! The daemon reads framed calls, records them, and answers each with the
//! next scripted [`Reply`]. Once the script runs out every call gets an
//! empty success reply. Serving ends when the client closes the stream.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::debug;

use vremote_core::error::{Error, Result};
use vremote_core::protocol::{
    MessageHeader, RemoteErrorPayload, Status, encode_call, read_frame, write_frame,
};
use vremote_core::xdr::{XdrDecode, XdrEncode};

type HeaderEdit = Box<dyn Fn(&mut MessageHeader) + Send>;

/// One scripted answer.
pub enum Reply {
    /// status=ok followed by an already-encoded payload.
    Ok(Bytes),
    /// status=error followed by the error payload.
    Error(RemoteErrorPayload),
    /// A success reply whose header is altered before sending.
    Tampered { edit: HeaderEdit, payload: Bytes },
    /// Close the connection instead of answering.
    Hangup,
}

impl Reply {
    /// Success carrying `value`.
    pub fn ok<T: XdrEncode + ?Sized>(value: &T) -> Self {
        let mut buf = BytesMut::new();
        value.encode(&mut buf).expect("encode scripted reply");
        Reply::Ok(buf.freeze())
    }

    /// Success with no payload.
    pub fn empty() -> Self {
        Reply::Ok(Bytes::new())
    }

    pub fn error(payload: RemoteErrorPayload) -> Self {
        Reply::Error(payload)
    }

    /// Success carrying `value`, with a header edited by `edit`.
    pub fn tampered<T, F>(value: &T, edit: F) -> Self
    where
        T: XdrEncode + ?Sized,
        F: Fn(&mut MessageHeader) + Send + 'static,
    {
        let mut buf = BytesMut::new();
        value.encode(&mut buf).expect("encode scripted reply");
        Reply::Tampered {
            edit: Box::new(edit),
            payload: buf.freeze(),
        }
    }
}

/// A call as the daemon received it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub header: MessageHeader,
    pub payload: Bytes,
}

/// Shared record of received calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Procedure numbers in arrival order.
    pub fn procedures(&self) -> Vec<u32> {
        self.calls().iter().map(|c| c.header.procedure).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, call: RecordedCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

/// Raw payload bytes written as-is.
struct Raw<'a>(&'a [u8]);

impl XdrEncode for Raw<'_> {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(self.0);
        Ok(())
    }
}

/// Scripted responder.
#[derive(Default)]
pub struct MockDaemon {
    script: VecDeque<Reply>,
    log: CallLog,
}

impl MockDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply to the script.
    pub fn reply(mut self, reply: Reply) -> Self {
        self.script.push_back(reply);
        self
    }

    /// Handle to the calls this daemon records.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Serve one client until it disconnects or a `Hangup` is scripted.
    pub async fn serve<S>(mut self, mut stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut out = BytesMut::new();
        loop {
            let mut body = match read_frame(&mut stream).await {
                Ok(body) => body,
                Err(Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            let call = MessageHeader::decode(&mut body)?;
            debug!(procedure = call.procedure, serial = call.serial, "Mock daemon got call");
            self.log.push(RecordedCall {
                header: call,
                payload: body,
            });

            let (header, payload) = match self.script.pop_front().unwrap_or_else(Reply::empty) {
                Reply::Ok(payload) => (MessageHeader::reply_to(&call, Status::Ok), payload),
                Reply::Error(err) => {
                    let mut buf = BytesMut::new();
                    err.encode(&mut buf)?;
                    (MessageHeader::reply_to(&call, Status::Error), buf.freeze())
                }
                Reply::Tampered { edit, payload } => {
                    let mut header = MessageHeader::reply_to(&call, Status::Ok);
                    edit(&mut header);
                    (header, payload)
                }
                Reply::Hangup => return Ok(()),
            };

            encode_call(&header, &Raw(&payload), &mut out)?;
            write_frame(&mut stream, &out).await?;
        }
    }

    /// Bind a Unix socket at `path` and serve the first client that connects.
    pub fn spawn_unix(self, path: &Path) -> std::io::Result<JoinHandle<Result<()>>> {
        let listener = UnixListener::bind(path)?;
        Ok(tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            self.serve(stream).await
        }))
    }
}
