//! Virtual network operations.

use uuid::Uuid;

use vremote_core::constants::REMOTE_NETWORK_NAME_LIST_MAX;
use vremote_core::error::Result;
use vremote_core::protocol::{Network, Procedure};

use super::{List, WithFlags, check_reply, check_request};
use crate::connection::Connection;

impl Connection {
    /// Names of up to `max` active networks.
    pub async fn list_networks(&mut self, max: usize) -> Result<Vec<String>> {
        let maxnames = check_request(max, REMOTE_NETWORK_NAME_LIST_MAX, "maxnames")?;
        let names: List<String, REMOTE_NETWORK_NAME_LIST_MAX> =
            self.call(Procedure::ListNetworks, &maxnames).await?;
        check_reply(names.0, max, "list_networks")
    }

    pub async fn num_of_networks(&mut self) -> Result<i32> {
        self.call(Procedure::NumOfNetworks, &()).await
    }

    pub async fn network_lookup_by_name(&mut self, name: &str) -> Result<Network> {
        self.call(Procedure::NetworkLookupByName, name).await
    }

    pub async fn network_lookup_by_uuid(&mut self, uuid: &Uuid) -> Result<Network> {
        self.call(Procedure::NetworkLookupByUuid, uuid).await
    }

    pub async fn network_dump_xml(&mut self, network: &Network, flags: i32) -> Result<String> {
        self.call(Procedure::NetworkDumpXml, &WithFlags(network, flags))
            .await
    }

    /// Name of the host bridge device backing `network`.
    pub async fn network_get_bridge_name(&mut self, network: &Network) -> Result<String> {
        self.call(Procedure::NetworkGetBridgeName, network).await
    }
}
