//! XDR (RFC 4506) encoding for message headers and procedure payloads.
//!
//! Every item is a multiple of four bytes, big-endian. Payload types
//! implement [`XdrEncode`] for the call direction and [`XdrDecode`] for the
//! reply direction; `()` is the void codec for calls that carry nothing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::constants::{REMOTE_STRING_MAX, UUID_BUFLEN};
use crate::error::{Error, Result};

/// Serialization routine for one direction of a procedure.
pub trait XdrEncode {
    fn encode(&self, buf: &mut BytesMut) -> Result<()>;
}

/// Deserialization routine for one direction of a procedure.
pub trait XdrDecode: Sized {
    fn decode(buf: &mut Bytes) -> Result<Self>;
}

fn need(buf: &Bytes, len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(Error::codec(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

// =============================================================================
// Primitives
// =============================================================================

impl XdrEncode for () {
    fn encode(&self, _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }
}

impl XdrDecode for () {
    fn decode(_buf: &mut Bytes) -> Result<Self> {
        Ok(())
    }
}

impl XdrEncode for u32 {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(*self);
        Ok(())
    }
}

impl XdrDecode for u32 {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 4, "unsigned int")?;
        Ok(buf.get_u32())
    }
}

impl XdrEncode for i32 {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_i32(*self);
        Ok(())
    }
}

impl XdrDecode for i32 {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 4, "int")?;
        Ok(buf.get_i32())
    }
}

impl XdrEncode for u64 {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(*self);
        Ok(())
    }
}

impl XdrDecode for u64 {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 8, "unsigned hyper")?;
        Ok(buf.get_u64())
    }
}

impl XdrEncode for i64 {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_i64(*self);
        Ok(())
    }
}

impl XdrDecode for i64 {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 8, "hyper")?;
        Ok(buf.get_i64())
    }
}

impl XdrEncode for bool {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(u32::from(*self));
        Ok(())
    }
}

impl XdrDecode for bool {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        match u32::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::codec(format!("invalid boolean {}", other))),
        }
    }
}

/// Variable-length string, bounded by [`REMOTE_STRING_MAX`].
impl XdrEncode for String {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.as_str().encode(buf)
    }
}

impl XdrEncode for str {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let bytes = self.as_bytes();
        if bytes.len() > REMOTE_STRING_MAX {
            return Err(Error::codec(format!(
                "string too long: {} bytes (max {})",
                bytes.len(),
                REMOTE_STRING_MAX
            )));
        }
        buf.put_u32(bytes.len() as u32);
        buf.put_slice(bytes);
        buf.put_bytes(0, padding(bytes.len()));
        Ok(())
    }
}

impl XdrDecode for String {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let len = u32::decode(buf)? as usize;
        if len > REMOTE_STRING_MAX {
            return Err(Error::codec(format!(
                "string too long: {} bytes (max {})",
                len, REMOTE_STRING_MAX
            )));
        }
        let padded = len + padding(len);
        need(buf, padded, "string")?;
        let raw = buf.split_to(len);
        buf.advance(padding(len));
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::codec(format!("invalid UTF-8 in string: {}", e)))
    }
}

/// XDR optional-data: a boolean discriminant followed by the value when present.
impl<T: XdrEncode> XdrEncode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Some(value) => {
                true.encode(buf)?;
                value.encode(buf)
            }
            None => false.encode(buf),
        }
    }
}

impl<T: XdrDecode> XdrDecode for Option<T> {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        if bool::decode(buf)? {
            Ok(Some(T::decode(buf)?))
        } else {
            Ok(None)
        }
    }
}

impl XdrEncode for Uuid {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(self.as_bytes());
        Ok(())
    }
}

impl XdrDecode for Uuid {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, UUID_BUFLEN, "uuid")?;
        let mut raw = [0u8; UUID_BUFLEN];
        buf.copy_to_slice(&mut raw);
        Ok(Uuid::from_bytes(raw))
    }
}

// =============================================================================
// Arrays
// =============================================================================

/// Encode a variable-length array with an upper bound on its element count.
pub fn encode_array<T: XdrEncode>(items: &[T], max: usize, buf: &mut BytesMut) -> Result<()> {
    if items.len() > max {
        return Err(Error::codec(format!(
            "array too long: {} elements (max {})",
            items.len(),
            max
        )));
    }
    buf.put_u32(items.len() as u32);
    for item in items {
        item.encode(buf)?;
    }
    Ok(())
}

/// Decode a variable-length array, rejecting counts above `max` before
/// decoding any element.
pub fn decode_array<T: XdrDecode>(buf: &mut Bytes, max: usize) -> Result<Vec<T>> {
    let count = u32::decode(buf)? as usize;
    if count > max {
        return Err(Error::codec(format!(
            "array too long: {} elements (max {})",
            count, max
        )));
    }
    // Each element occupies at least four bytes.
    need(buf, count.saturating_mul(4), "array")?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(T::decode(buf)?);
    }
    Ok(items)
}

/// Encode a fixed-length `char[N]` field. XDR widens each char to four bytes.
pub fn encode_char_array(text: &str, len: usize, buf: &mut BytesMut) -> Result<()> {
    let bytes = text.as_bytes();
    for i in 0..len {
        let c = bytes.get(i).copied().unwrap_or(0);
        buf.put_i32(i32::from(c as i8));
    }
    Ok(())
}

/// Decode a fixed-length `char[N]` field, stopping the text at the first NUL.
pub fn decode_char_array(buf: &mut Bytes, len: usize) -> Result<String> {
    need(buf, len * 4, "char array")?;
    let mut raw = Vec::with_capacity(len);
    for _ in 0..len {
        raw.push(buf.get_i32() as u8);
    }
    if let Some(nul) = raw.iter().position(|&b| b == 0) {
        raw.truncate(nul);
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
