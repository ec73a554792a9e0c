//! Frame codec: length word + header + payload.
//!
//! Format: 4-byte big-endian length that counts itself, followed by the body.
//!
//! The codec ensures:
//! - Outgoing bodies never exceed [`REMOTE_MESSAGE_MAX`]
//! - An oversized or undersized incoming length is rejected before any body
//!   byte is read
//! - Reads and writes are exact; a peer closing mid-frame is reported as
//!   [`Error::ConnectionClosed`]

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::constants::{LENGTH_WORD_LEN, REMOTE_MESSAGE_MAX};
use crate::error::{Error, Result};
use crate::protocol::MessageHeader;
use crate::xdr::XdrEncode;

/// Serialize `header` and `args` into a complete frame in `buf`.
///
/// `buf` is cleared first so callers can reuse one allocation per connection.
pub fn encode_call<A: XdrEncode + ?Sized>(
    header: &MessageHeader,
    args: &A,
    buf: &mut BytesMut,
) -> Result<()> {
    buf.clear();
    buf.put_u32(0);

    header
        .encode(buf)
        .map_err(|e| Error::protocol(format!("marshalling header: {}", e)))?;
    args.encode(buf)
        .map_err(|e| Error::protocol(format!("marshalling args: {}", e)))?;

    let body_len = buf.len() - LENGTH_WORD_LEN;
    if body_len > REMOTE_MESSAGE_MAX {
        return Err(Error::protocol(format!(
            "message too large: {} bytes (max {})",
            body_len, REMOTE_MESSAGE_MAX
        )));
    }

    let total = buf.len() as u32;
    buf[..LENGTH_WORD_LEN].copy_from_slice(&total.to_be_bytes());
    Ok(())
}

/// Write an already-framed message in full.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    trace!(len = frame.len(), "Sending frame");
    writer.write_all(frame).await.map_err(map_io)?;
    writer.flush().await.map_err(map_io)?;
    Ok(())
}

/// Read one frame and return its body (header + payload).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes> {
    let mut len_word = [0u8; LENGTH_WORD_LEN];
    reader.read_exact(&mut len_word).await.map_err(map_io)?;

    let total = u32::from_be_bytes(len_word) as usize;
    let Some(body_len) = total.checked_sub(LENGTH_WORD_LEN) else {
        return Err(Error::protocol(format!(
            "packet length {} shorter than its length word",
            total
        )));
    };
    if body_len > REMOTE_MESSAGE_MAX {
        return Err(Error::protocol(format!(
            "packet received from server too large ({} bytes, max {})",
            body_len, REMOTE_MESSAGE_MAX
        )));
    }

    let mut body = Vec::new();
    body.try_reserve_exact(body_len)
        .map_err(|e| Error::ResourceExhausted {
            message: format!("reply buffer of {} bytes: {}", body_len, e),
        })?;
    body.resize(body_len, 0);
    reader.read_exact(&mut body).await.map_err(map_io)?;

    trace!(len = total, "Received frame");
    Ok(Bytes::from(body))
}

fn map_io(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
        _ => Error::Io(e),
    }
}
