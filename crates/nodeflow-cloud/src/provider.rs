//! Provider trait definitions
//!
//! Each trait covers one independent provider API. SDK adapters implement
//! them; the orchestrator only ever talks to these traits. Request payloads
//! are passed as JSON documents with snake_case keys, already resolved.

use crate::error::Result;
use crate::model::{
    DnsRecord, DnsZone, Filter, NetworkInterface, Node, NodeState, SecurityGroup, Snapshot, Tag,
    Volume, VolumeState,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Compute API: nodes, network interfaces, subnets and security groups
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Nodes matching every filter
    async fn find_nodes(&self, filters: &[Filter]) -> Result<Vec<Node>>;

    /// Re-fetch a node by id
    async fn node(&self, id: &str) -> Result<Node>;

    /// Submit a launch request and return the new node
    async fn create_node(&self, request: &serde_json::Value) -> Result<Node>;

    /// Block until the node reaches `state`
    async fn wait_node(&self, id: &str, state: NodeState) -> Result<()>;

    async fn start_node(&self, id: &str) -> Result<()>;

    async fn stop_node(&self, id: &str) -> Result<()>;

    async fn reboot_node(&self, id: &str) -> Result<()>;

    async fn terminate_node(&self, id: &str) -> Result<()>;

    /// Mark an attached volume for deletion when the node terminates
    async fn set_delete_on_termination(
        &self,
        node_id: &str,
        device_name: &str,
        volume_id: &str,
    ) -> Result<()>;

    async fn tag_resources(&self, resource_ids: &[String], tags: &[Tag]) -> Result<()>;

    async fn create_interface(&self, request: &serde_json::Value) -> Result<NetworkInterface>;

    /// Attach an interface at `device_index`; the attachment is deleted with the node
    async fn attach_interface(
        &self,
        interface_id: &str,
        node_id: &str,
        device_index: u32,
    ) -> Result<()>;

    async fn delete_interface(&self, interface_id: &str) -> Result<()>;

    /// VPC owning a subnet
    async fn subnet_vpc(&self, subnet_id: &str) -> Result<String>;

    /// Availability zone of a subnet
    async fn subnet_zone(&self, subnet_id: &str) -> Result<String>;

    async fn find_security_groups(&self, vpc_id: &str, name: &str) -> Result<Vec<SecurityGroup>>;

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> Result<SecurityGroup>;

    async fn delete_security_group(&self, id: &str) -> Result<()>;
}

/// Block storage API: volumes and snapshots
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn find_volumes(&self, filters: &[Filter]) -> Result<Vec<Volume>>;

    async fn volume(&self, id: &str) -> Result<Volume>;

    async fn create_volume(&self, request: &serde_json::Value) -> Result<Volume>;

    async fn delete_volume(&self, id: &str) -> Result<()>;

    async fn attach_volume(&self, volume_id: &str, node_id: &str, device: &str) -> Result<()>;

    async fn detach_volume(&self, volume_id: &str, node_id: &str, device: &str) -> Result<()>;

    /// Block until the volume reaches `state`
    async fn wait_volume(&self, id: &str, state: VolumeState) -> Result<()>;

    async fn find_snapshots(&self, filters: &[Filter]) -> Result<Vec<Snapshot>>;

    async fn create_snapshot(&self, volume_id: &str) -> Result<Snapshot>;

    async fn delete_snapshot(&self, id: &str) -> Result<()>;

    async fn wait_snapshot_completed(&self, id: &str) -> Result<()>;
}

/// DNS API over the public and private zones
#[async_trait]
pub trait DnsFacade: Send + Sync {
    /// First record set at or after `fqdn` in the zone, if any
    async fn record(&self, fqdn: &str, zone: DnsZone) -> Result<Option<DnsRecord>>;

    /// Values of the record named `fqdn`, empty when there is none
    async fn lookup(&self, fqdn: &str, zone: DnsZone) -> Result<Vec<String>> {
        Ok(self
            .record(fqdn, zone)
            .await?
            .filter(|r| r.matches(fqdn))
            .map(|r| r.values)
            .unwrap_or_default())
    }

    /// Submit a change batch and return its change id
    async fn change(&self, zone: DnsZone, change: &serde_json::Value) -> Result<String>;

    /// Block until the change has propagated
    async fn wait_sync(&self, change_id: &str) -> Result<()>;
}

/// Stack outputs API
#[async_trait]
pub trait OutputProvider: Send + Sync {
    /// All outputs published by `stack`
    async fn outputs(&self, stack: &str) -> Result<HashMap<String, String>>;
}
