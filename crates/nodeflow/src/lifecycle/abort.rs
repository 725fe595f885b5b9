//! Teardown of a partially created node

use super::NodeManager;
use nodeflow_cloud::{LockToken, NetworkInterface, Node, NodeState, Result, Tag};

impl NodeManager {
    /// Undo a launch: release the lock, delete the interfaces that were
    /// never attached, and terminate the node if one exists.
    ///
    /// Volumes the node gained without a `Name` tag are marked for deletion
    /// on termination first, so a failed launch leaves no anonymous volumes
    /// behind. The lock is released before anything else is attempted.
    pub(super) async fn abort(
        &self,
        node: Option<&Node>,
        interfaces: Vec<NetworkInterface>,
        wait: bool,
        lock: Option<LockToken>,
    ) -> Result<()> {
        let released = match lock {
            Some(lock) => lock.release().await,
            None => Ok(()),
        };
        if let Err(e) = &released {
            tracing::error!("Releasing lock during abort: {}", e);
        }

        let compute = self.session.compute();
        for iface in &interfaces {
            self.emit(format!("Deleting network interface {}", iface.id));
            compute.delete_interface(&iface.id).await?;
        }

        let Some(node) = node else {
            return released;
        };

        let node = match compute.node(&node.id).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!("Refreshing node {} before abort: {}", node.id, e);
                node.clone()
            }
        };

        for device in &node.block_devices {
            let volume = self.session.storage().volume(&device.volume_id).await?;
            if volume.name().is_none() {
                self.emit(format!(
                    "Marking volume {} for deletion on termination",
                    volume.id
                ));
                compute
                    .set_delete_on_termination(&node.id, &device.device_name, &volume.id)
                    .await?;
            }
        }

        self.emit(format!("Terminating node {}", node.id));
        compute.terminate_node(&node.id).await?;
        if wait {
            self.emit(format!("Waiting for {} to terminate", node.id));
            compute.wait_node(&node.id, NodeState::Terminated).await?;
            self.emit("Terminated");
        }
        released
    }

    /// Tag a node and every volume attached to it
    pub(super) async fn tag_node(
        &self,
        node: &Node,
        instance_tags: &[Tag],
        volume_tags: &[Tag],
    ) -> Result<()> {
        let compute = self.session.compute();
        tracing::debug!("Tagging node {}", node.id);
        compute
            .tag_resources(std::slice::from_ref(&node.id), instance_tags)
            .await?;

        let volumes: Vec<String> = node
            .block_devices
            .iter()
            .map(|b| b.volume_id.clone())
            .collect();
        if !volumes.is_empty() {
            tracing::debug!("Tagging volumes {}", volumes.join(", "));
            compute.tag_resources(&volumes, volume_tags).await?;
        }
        Ok(())
    }
}
