//! Typed operations layered on [`Connection::call`](crate::Connection::call).
//!
//! Each operation picks a procedure, builds its argument record and decodes
//! its result record; nothing here touches the stream directly.

mod domain;
mod host;
mod network;

use bytes::{Bytes, BytesMut};

use vremote_core::error::{Error, Result};
use vremote_core::xdr::{XdrDecode, XdrEncode, decode_array};

/// A variable-length array reply bounded by `MAX` entries on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct List<T, const MAX: usize>(pub Vec<T>);

impl<T: XdrDecode, const MAX: usize> XdrDecode for List<T, MAX> {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        decode_array(buf, MAX).map(List)
    }
}

/// Reject a caller-requested count above the protocol limit, before any I/O.
pub(crate) fn check_request(requested: usize, max: usize, what: &str) -> Result<i32> {
    if requested > max {
        return Err(Error::protocol(format!("{} > {}", what, max)));
    }
    i32::try_from(requested).map_err(|_| Error::protocol(format!("{} out of range", what)))
}

/// Reject a reply carrying more entries than were asked for.
pub(crate) fn check_reply<T>(items: Vec<T>, requested: usize, what: &str) -> Result<Vec<T>> {
    if items.len() > requested {
        return Err(Error::protocol(format!(
            "{} returned {} entries, more than the {} requested",
            what,
            items.len(),
            requested
        )));
    }
    Ok(items)
}

/// An argument record of a non-null identity followed by an int of flags.
pub(crate) struct WithFlags<'a, T>(pub &'a T, pub i32);

impl<T: XdrEncode> XdrEncode for WithFlags<'_, T> {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.0.encode(buf)?;
        self.1.encode(buf)
    }
}
