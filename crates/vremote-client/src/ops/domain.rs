use uuid::Uuid;

use vremote_core::error::Result;
use vremote_core::protocol::{Domain, DomainInfo, Procedure};

use super::WithFlags;
use crate::connection::Connection;

impl Connection {
    pub async fn domain_lookup_by_id(&mut self, id: i32) -> Result<Domain> {
        self.call(Procedure::DomainLookupById, &id).await
    }

    pub async fn domain_lookup_by_name(&mut self, name: &str) -> Result<Domain> {
        self.call(Procedure::DomainLookupByName, name).await
    }

    pub async fn domain_lookup_by_uuid(&mut self, uuid: &Uuid) -> Result<Domain> {
        self.call(Procedure::DomainLookupByUuid, uuid).await
    }

    pub async fn domain_suspend(&mut self, domain: &Domain) -> Result<()> {
        self.call(Procedure::DomainSuspend, domain).await
    }

    pub async fn domain_resume(&mut self, domain: &Domain) -> Result<()> {
        self.call(Procedure::DomainResume, domain).await
    }

    pub async fn domain_shutdown(&mut self, domain: &Domain) -> Result<()> {
        self.call(Procedure::DomainShutdown, domain).await
    }

    pub async fn domain_reboot(&mut self, domain: &Domain, flags: i32) -> Result<()> {
        self.call(Procedure::DomainReboot, &WithFlags(domain, flags))
            .await
    }

    pub async fn domain_destroy(&mut self, domain: &Domain) -> Result<()> {
        self.call(Procedure::DomainDestroy, domain).await
    }

    pub async fn domain_get_info(&mut self, domain: &Domain) -> Result<DomainInfo> {
        self.call(Procedure::DomainGetInfo, domain).await
    }

    /// Domain definition as XML.
    pub async fn domain_dump_xml(&mut self, domain: &Domain, flags: i32) -> Result<String> {
        self.call(Procedure::DomainDumpXml, &WithFlags(domain, flags))
            .await
    }

    pub async fn domain_get_os_type(&mut self, domain: &Domain) -> Result<String> {
        self.call(Procedure::DomainGetOsType, domain).await
    }

    /// Maximum memory in KiB.
    pub async fn domain_get_max_memory(&mut self, domain: &Domain) -> Result<u64> {
        self.call(Procedure::DomainGetMaxMemory, domain).await
    }
}
