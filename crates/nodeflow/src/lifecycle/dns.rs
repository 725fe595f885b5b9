//! A-record publishing for nodes
//!
//! Each node gets `fqdn -> public ip` in the public zone and
//! `fqdn -> private ip` in the private zone. A zone is skipped when its id
//! is not configured or the node has no address of that kind.

use super::NodeManager;
use nodeflow_cloud::{DnsZone, LockToken, Node, Result};

/// Change template publishing an A record
const UPSERT_TEMPLATE: &str = "arec";
/// Change template removing an A record
const DELETE_TEMPLATE: &str = "delete";

const ZONES: [DnsZone; 2] = [DnsZone::Public, DnsZone::Private];

impl NodeManager {
    /// Publish the node's A records, optionally waiting for propagation
    pub async fn update_dns(&mut self, node: &Node, wait: bool) -> Result<()> {
        self.set_node_name(node)?;
        self.publish_dns(node, wait, &mut None, &mut Vec::new()).await
    }

    /// Remove the node's A records, optionally waiting for propagation
    pub async fn remove_dns(&mut self, node: &Node, wait: bool) -> Result<()> {
        self.set_node_name(node)?;
        let changes = self
            .submit_changes(node, DELETE_TEMPLATE, "Removing", &ZONES, &mut Vec::new())
            .await?;
        self.wait_changes(&changes, wait).await
    }

    /// Publish A records for the current `fqdn` parameter, releasing `lock`
    /// as soon as the changes are submitted. Zones are pushed onto
    /// `published` as their change is accepted.
    pub(super) async fn publish_dns(
        &mut self,
        node: &Node,
        wait: bool,
        lock: &mut Option<LockToken>,
        published: &mut Vec<DnsZone>,
    ) -> Result<()> {
        let changes = self
            .submit_changes(node, UPSERT_TEMPLATE, "Publishing", &ZONES, published)
            .await?;

        if let Some(lock) = lock.take() {
            lock.release().await?;
        }
        self.wait_changes(&changes, wait).await
    }

    /// Delete the A records `publish_dns` put in `zones`, without waiting
    pub(super) async fn withdraw_dns(&mut self, node: &Node, zones: &[DnsZone]) -> Result<()> {
        self.submit_changes(node, DELETE_TEMPLATE, "Withdrawing", zones, &mut Vec::new())
            .await?;
        Ok(())
    }

    fn set_node_name(&mut self, node: &Node) -> Result<()> {
        let name = node.name().unwrap_or(node.id.as_str()).to_string();
        self.set_name(&name)?;
        Ok(())
    }

    async fn submit_changes(
        &mut self,
        node: &Node,
        template: &str,
        verb: &str,
        zones: &[DnsZone],
        submitted: &mut Vec<DnsZone>,
    ) -> Result<Vec<String>> {
        let fqdn = self.fqdn()?;
        let result = self
            .submit_zone_changes(node, template, verb, &fqdn, zones, submitted)
            .await;
        self.params.remove("zone_id");
        self.params.remove("ipaddr");
        result
    }

    async fn submit_zone_changes(
        &mut self,
        node: &Node,
        template: &str,
        verb: &str,
        fqdn: &str,
        zones: &[DnsZone],
        submitted: &mut Vec<DnsZone>,
    ) -> Result<Vec<String>> {
        let mut changes = Vec::new();
        for &zone in zones {
            let (zone_id, address) = match zone {
                DnsZone::Public => (self.session.public_zone_id(), node.public_ip.clone()),
                DnsZone::Private => (self.session.private_zone_id(), node.private_ip.clone()),
            };
            let (Some(zone_id), Some(address)) = (zone_id, address) else {
                continue;
            };
            self.params.setparam("zone_id", zone_id);
            self.params.setparam("ipaddr", address.as_str());
            let change = self.session.load_change(&self.params, template).await?;

            self.emit(format!("{verb} {zone} A record {fqdn} -> {address}"));
            changes.push(self.session.dns().change(zone, &change).await?);
            submitted.push(zone);
        }
        Ok(changes)
    }

    async fn wait_changes(&self, changes: &[String], wait: bool) -> Result<()> {
        if !wait {
            return Ok(());
        }
        for change_id in changes {
            self.emit(format!("Waiting for DNS change {change_id} to propagate"));
            self.session.dns().wait_sync(change_id).await?;
        }
        if !changes.is_empty() {
            self.emit("DNS changes in sync");
        }
        Ok(())
    }
}
