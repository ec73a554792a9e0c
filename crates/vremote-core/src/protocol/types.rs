//! Procedure payloads and identity records.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use uuid::Uuid;

use crate::constants::NODE_MODEL_LEN;
use crate::error::{RemoteError, Result};
use crate::xdr::{XdrDecode, XdrEncode, decode_char_array, encode_char_array};

// =============================================================================
// Identity Records
// =============================================================================

/// A domain (guest) known to the remote daemon.
///
/// Wire form is the non-null domain record: name, UUID, id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    pub name: String,
    pub uuid: Uuid,
    /// Runtime id; -1 for inactive domains.
    pub id: i32,
}

impl XdrEncode for Domain {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.name.encode(buf)?;
        self.uuid.encode(buf)?;
        self.id.encode(buf)
    }
}

impl XdrDecode for Domain {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            name: String::decode(buf)?,
            uuid: Uuid::decode(buf)?,
            id: i32::decode(buf)?,
        })
    }
}

/// A virtual network known to the remote daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub name: String,
    pub uuid: Uuid,
}

impl XdrEncode for Network {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.name.encode(buf)?;
        self.uuid.encode(buf)
    }
}

impl XdrDecode for Network {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            name: String::decode(buf)?,
            uuid: Uuid::decode(buf)?,
        })
    }
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

/// Flags sent with the open call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Request a read-only connection.
    pub read_only: bool,
}

impl OpenFlags {
    const READ_ONLY: i32 = 1;

    pub fn read_only() -> Self {
        Self { read_only: true }
    }

    pub fn bits(self) -> i32 {
        if self.read_only { Self::READ_ONLY } else { 0 }
    }
}

/// Arguments of the open call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenArgs {
    /// Target name the daemon should open, e.g. `qemu:///system`.
    pub name: Option<String>,
    pub flags: OpenFlags,
}

impl XdrEncode for OpenArgs {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.name.encode(buf)?;
        self.flags.bits().encode(buf)
    }
}

impl XdrDecode for OpenArgs {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let name = Option::<String>::decode(buf)?;
        let bits = i32::decode(buf)?;
        Ok(Self {
            name,
            flags: OpenFlags {
                read_only: bits & OpenFlags::READ_ONLY != 0,
            },
        })
    }
}

// =============================================================================
// Remote Error Payload
// =============================================================================

/// Error payload following a reply header with status=error.
///
/// Every nullable field is an explicit `Option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteErrorPayload {
    pub code: i32,
    pub subsystem: i32,
    pub message: Option<String>,
    pub level: i32,
    pub domain: Option<Domain>,
    pub str1: Option<String>,
    pub str2: Option<String>,
    pub str3: Option<String>,
    pub int1: i32,
    pub int2: i32,
    pub network: Option<Network>,
}

impl RemoteErrorPayload {
    /// A payload carrying only the common fields.
    pub fn new(subsystem: i32, code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            subsystem,
            message: Some(message.into()),
            level: 2,
            domain: None,
            str1: None,
            str2: None,
            str3: None,
            int1: 0,
            int2: 0,
            network: None,
        }
    }
}

impl From<RemoteErrorPayload> for RemoteError {
    fn from(payload: RemoteErrorPayload) -> Self {
        RemoteError {
            subsystem: payload.subsystem,
            code: payload.code,
            level: payload.level,
            message: payload.message,
            str1: payload.str1,
            str2: payload.str2,
            str3: payload.str3,
            int1: payload.int1,
            int2: payload.int2,
            domain: payload.domain,
            network: payload.network,
        }
    }
}

impl XdrEncode for RemoteErrorPayload {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.code.encode(buf)?;
        self.subsystem.encode(buf)?;
        self.message.encode(buf)?;
        self.level.encode(buf)?;
        self.domain.encode(buf)?;
        self.str1.encode(buf)?;
        self.str2.encode(buf)?;
        self.str3.encode(buf)?;
        self.int1.encode(buf)?;
        self.int2.encode(buf)?;
        self.network.encode(buf)
    }
}

impl XdrDecode for RemoteErrorPayload {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            code: i32::decode(buf)?,
            subsystem: i32::decode(buf)?,
            message: Option::decode(buf)?,
            level: i32::decode(buf)?,
            domain: Option::decode(buf)?,
            str1: Option::decode(buf)?,
            str2: Option::decode(buf)?,
            str3: Option::decode(buf)?,
            int1: i32::decode(buf)?,
            int2: i32::decode(buf)?,
            network: Option::decode(buf)?,
        })
    }
}

// =============================================================================
// Node / Domain Info
// =============================================================================

/// Host hardware summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub model: String,
    /// Memory in KiB.
    pub memory: i64,
    pub cpus: i32,
    pub mhz: i32,
    pub nodes: i32,
    pub sockets: i32,
    pub cores: i32,
    pub threads: i32,
}

impl XdrEncode for NodeInfo {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        encode_char_array(&self.model, NODE_MODEL_LEN, buf)?;
        self.memory.encode(buf)?;
        self.cpus.encode(buf)?;
        self.mhz.encode(buf)?;
        self.nodes.encode(buf)?;
        self.sockets.encode(buf)?;
        self.cores.encode(buf)?;
        self.threads.encode(buf)
    }
}

impl XdrDecode for NodeInfo {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            model: decode_char_array(buf, NODE_MODEL_LEN)?,
            memory: i64::decode(buf)?,
            cpus: i32::decode(buf)?,
            mhz: i32::decode(buf)?,
            nodes: i32::decode(buf)?,
            sockets: i32::decode(buf)?,
            cores: i32::decode(buf)?,
            threads: i32::decode(buf)?,
        })
    }
}

/// Run state and resource usage of one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainInfo {
    pub state: u32,
    /// Maximum memory in KiB.
    pub max_mem: u64,
    /// Current memory in KiB.
    pub memory: u64,
    pub nr_virt_cpu: u32,
    /// CPU time used, in nanoseconds.
    pub cpu_time: u64,
}

impl XdrEncode for DomainInfo {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.state.encode(buf)?;
        self.max_mem.encode(buf)?;
        self.memory.encode(buf)?;
        self.nr_virt_cpu.encode(buf)?;
        self.cpu_time.encode(buf)
    }
}

impl XdrDecode for DomainInfo {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            state: u32::decode(buf)?,
            max_mem: u64::decode(buf)?,
            memory: u64::decode(buf)?,
            nr_virt_cpu: u32::decode(buf)?,
            cpu_time: u64::decode(buf)?,
        })
    }
}
