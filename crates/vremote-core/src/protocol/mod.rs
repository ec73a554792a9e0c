//! Wire protocol: message header, framing and procedure payloads.
//!
//! Frame layout: 4-byte big-endian length (counting itself), then the XDR
//! [`MessageHeader`], then the procedure's argument, result or error payload.

mod codec;
mod header;
mod types;

pub use codec::{encode_call, read_frame, write_frame};
pub use header::{Direction, HEADER_LEN, MessageHeader, Status};
pub use types::*;

/// Procedure numbers understood by the remote daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Procedure {
    Open = 1,
    Close = 2,
    GetType = 3,
    GetVersion = 4,
    GetMaxVcpus = 5,
    NodeGetInfo = 6,
    GetCapabilities = 7,
    DomainDestroy = 12,
    DomainDumpXml = 14,
    DomainGetInfo = 16,
    DomainGetMaxMemory = 17,
    DomainGetOsType = 19,
    ListDefinedDomains = 21,
    DomainLookupById = 22,
    DomainLookupByName = 23,
    DomainLookupByUuid = 24,
    NumOfDefinedDomains = 25,
    DomainReboot = 27,
    DomainResume = 28,
    DomainShutdown = 33,
    DomainSuspend = 34,
    ListDomains = 37,
    ListNetworks = 38,
    NetworkDumpXml = 43,
    NetworkGetBridgeName = 45,
    NetworkLookupByName = 46,
    NetworkLookupByUuid = 47,
    NumOfDomains = 51,
    NumOfNetworks = 52,
}

impl Procedure {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}
