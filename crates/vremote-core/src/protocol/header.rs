//! Message header carried at the start of every frame body.

use bytes::{Bytes, BytesMut};

use crate::constants::{REMOTE_PROGRAM, REMOTE_PROTOCOL_VERSION};
use crate::error::{Error, Result};
use crate::protocol::Procedure;
use crate::xdr::{XdrDecode, XdrEncode};

/// Encoded size of [`MessageHeader`].
pub const HEADER_LEN: usize = 24;

/// Message direction.
///
/// Only call/reply are produced or accepted; the field leaves room for
/// unsolicited server messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Call,
    Reply,
}

impl Direction {
    pub fn as_u32(self) -> u32 {
        match self {
            Direction::Call => 0,
            Direction::Reply => 1,
        }
    }
}

/// Reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_u32(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }
}

/// Raw header as it appears on the wire.
///
/// Fields stay numeric so that a reply carrying unexpected values can be
/// reported precisely instead of failing to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub direction: u32,
    pub serial: u32,
    pub status: u32,
}

impl MessageHeader {
    /// Header for an outgoing call.
    pub fn call(procedure: Procedure, serial: u32) -> Self {
        Self {
            program: REMOTE_PROGRAM,
            version: REMOTE_PROTOCOL_VERSION,
            procedure: procedure.as_u32(),
            direction: Direction::Call.as_u32(),
            serial,
            status: Status::Ok.as_u32(),
        }
    }

    /// Header for a reply to `call` with the given status.
    pub fn reply_to(call: &MessageHeader, status: Status) -> Self {
        Self {
            direction: Direction::Reply.as_u32(),
            status: status.as_u32(),
            ..*call
        }
    }

    /// Check that this header is the reply to `call`.
    ///
    /// Program, version, procedure, direction and serial must all match; the
    /// status is returned for dispatch. Any mismatch is a protocol error.
    pub fn validate_reply(&self, call: &MessageHeader) -> Result<Status> {
        if self.program != call.program {
            return Err(Error::protocol(format!(
                "unknown program (received {:x}, expected {:x})",
                self.program, call.program
            )));
        }
        if self.version != call.version {
            return Err(Error::protocol(format!(
                "unknown protocol version (received {:x}, expected {:x})",
                self.version, call.version
            )));
        }
        if self.procedure != call.procedure {
            return Err(Error::protocol(format!(
                "unknown procedure (received {:x}, expected {:x})",
                self.procedure, call.procedure
            )));
        }
        if self.direction != Direction::Reply.as_u32() {
            return Err(Error::protocol(format!(
                "unknown direction (received {:x}, expected {:x})",
                self.direction,
                Direction::Reply.as_u32()
            )));
        }
        if self.serial != call.serial {
            return Err(Error::protocol(format!(
                "unknown serial (received {:x}, expected {:x})",
                self.serial, call.serial
            )));
        }
        match self.status {
            0 => Ok(Status::Ok),
            1 => Ok(Status::Error),
            other => Err(Error::protocol(format!(
                "unknown status (received {:x})",
                other
            ))),
        }
    }
}

impl XdrEncode for MessageHeader {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.program.encode(buf)?;
        self.version.encode(buf)?;
        self.procedure.encode(buf)?;
        self.direction.encode(buf)?;
        self.serial.encode(buf)?;
        self.status.encode(buf)
    }
}

impl XdrDecode for MessageHeader {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            program: u32::decode(buf)?,
            version: u32::decode(buf)?,
            procedure: u32::decode(buf)?,
            direction: u32::decode(buf)?,
            serial: u32::decode(buf)?,
            status: u32::decode(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> MessageHeader {
        MessageHeader::call(Procedure::GetType, 5)
    }

    #[test]
    fn call_header_defaults() {
        let hdr = call();
        assert_eq!(hdr.program, REMOTE_PROGRAM);
        assert_eq!(hdr.version, REMOTE_PROTOCOL_VERSION);
        assert_eq!(hdr.direction, 0);
        assert_eq!(hdr.status, 0);
        assert_eq!(hdr.serial, 5);
    }

    #[test]
    fn encoded_header_is_24_bytes() {
        let mut buf = BytesMut::new();
        call().encode(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[..4], &REMOTE_PROGRAM.to_be_bytes());
    }

    #[test]
    fn matching_reply_validates() {
        let reply = MessageHeader::reply_to(&call(), Status::Ok);
        assert_eq!(reply.validate_reply(&call()).unwrap(), Status::Ok);

        let reply = MessageHeader::reply_to(&call(), Status::Error);
        assert_eq!(reply.validate_reply(&call()).unwrap(), Status::Error);
    }

    #[test]
    fn serial_mismatch_is_protocol_error() {
        let mut reply = MessageHeader::reply_to(&call(), Status::Ok);
        reply.serial = 6;
        let err = reply.validate_reply(&call()).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("unknown serial"));
    }

    #[test]
    fn each_field_mismatch_is_rejected() {
        let base = MessageHeader::reply_to(&call(), Status::Ok);
        let cases = [
            MessageHeader { program: 1, ..base },
            MessageHeader { version: 9, ..base },
            MessageHeader {
                procedure: 99,
                ..base
            },
            MessageHeader {
                direction: 0,
                ..base
            },
            MessageHeader { status: 2, ..base },
        ];
        for reply in cases {
            assert!(reply.validate_reply(&call()).is_err(), "{:?}", reply);
        }
    }
}
