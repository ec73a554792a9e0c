//! Connection-level operations: hypervisor identity, host info and domain
//! enumeration.

use tracing::debug;

use vremote_core::constants::{REMOTE_DOMAIN_ID_LIST_MAX, REMOTE_DOMAIN_NAME_LIST_MAX};
use vremote_core::error::Result;
use vremote_core::protocol::{NodeInfo, Procedure};

use super::{List, check_reply, check_request};
use crate::connection::Connection;

impl Connection {
    /// Hypervisor type name, e.g. `QEMU`. Fetched once per connection.
    pub async fn get_type(&mut self) -> Result<String> {
        if let Some(ty) = &self.cached_type {
            return Ok(ty.clone());
        }
        let ty: String = self.call(Procedure::GetType, &()).await?;
        debug!(ty = %ty, "Cached hypervisor type");
        self.cached_type = Some(ty.clone());
        Ok(ty)
    }

    /// Hypervisor version as `major * 1_000_000 + minor * 1_000 + release`.
    pub async fn get_version(&mut self) -> Result<i64> {
        self.call(Procedure::GetVersion, &()).await
    }

    /// Maximum virtual CPUs per guest for `ty`, or for the default type.
    pub async fn get_max_vcpus(&mut self, ty: Option<&str>) -> Result<i32> {
        let ty = ty.map(str::to_string);
        self.call(Procedure::GetMaxVcpus, &ty).await
    }

    pub async fn node_get_info(&mut self) -> Result<NodeInfo> {
        self.call(Procedure::NodeGetInfo, &()).await
    }

    /// Capabilities XML document.
    pub async fn get_capabilities(&mut self) -> Result<String> {
        self.call(Procedure::GetCapabilities, &()).await
    }

    /// Ids of up to `max` running domains.
    pub async fn list_domains(&mut self, max: usize) -> Result<Vec<i32>> {
        let maxids = check_request(max, REMOTE_DOMAIN_ID_LIST_MAX, "maxids")?;
        let ids: List<i32, REMOTE_DOMAIN_ID_LIST_MAX> =
            self.call(Procedure::ListDomains, &maxids).await?;
        check_reply(ids.0, max, "list_domains")
    }

    pub async fn num_of_domains(&mut self) -> Result<i32> {
        self.call(Procedure::NumOfDomains, &()).await
    }

    /// Names of up to `max` defined but inactive domains.
    pub async fn list_defined_domains(&mut self, max: usize) -> Result<Vec<String>> {
        let maxnames = check_request(max, REMOTE_DOMAIN_NAME_LIST_MAX, "maxnames")?;
        let names: List<String, REMOTE_DOMAIN_NAME_LIST_MAX> =
            self.call(Procedure::ListDefinedDomains, &maxnames).await?;
        check_reply(names.0, max, "list_defined_domains")
    }

    pub async fn num_of_defined_domains(&mut self) -> Result<i32> {
        self.call(Procedure::NumOfDefinedDomains, &()).await
    }
}
