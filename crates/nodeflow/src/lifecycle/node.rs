//! Operations on existing nodes

use super::{DATA_DEVICE, NodeManager};
use nodeflow_cloud::{CloudError, Node, NodeState, Result, Volume, VolumeState};

/// What `terminate` removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateOutcome {
    pub node_id: String,
    pub security_group: Option<String>,
    pub volume: Option<String>,
}

impl NodeManager {
    /// Start a stopped node, reattaching its data volume when it lives in
    /// the node's zone, and publish its DNS records
    pub async fn start(&mut self, name: &str, wait: bool) -> Result<Node> {
        let node = self.resolve_node(name, &[NodeState::Stopped]).await?;
        let name = self.current_name()?;
        let session = self.session.clone();
        let compute = session.compute();

        if let Some(volume) = self
            .find_volume(&name, &[VolumeState::Available], &[])
            .await?
        {
            let zone = match &node.subnet_id {
                Some(subnet) => Some(compute.subnet_zone(subnet).await?),
                None => None,
            };
            if zone.as_deref() == Some(volume.availability_zone.as_str()) {
                self.emit(format!("Attaching data volume {} to {}", volume.id, node.id));
                self.session
                    .storage()
                    .attach_volume(&volume.id, &node.id, DATA_DEVICE)
                    .await?;
                self.session
                    .storage()
                    .wait_volume(&volume.id, VolumeState::InUse)
                    .await?;
            } else {
                self.emit(format!(
                    "Volume {} is in {}, not the zone of {}; ignoring",
                    volume.id, volume.availability_zone, name
                ));
            }
        }

        self.emit(format!("Starting {name} ({})", node.id));
        compute.start_node(&node.id).await?;
        self.emit("Waiting for the node to enter state running ...");
        compute.wait_node(&node.id, NodeState::Running).await?;
        self.emit("Running");

        let node = compute.node(&node.id).await?;
        self.update_dns(&node, wait).await?;
        Ok(node)
    }

    /// Stop a running node and withdraw its DNS records
    pub async fn stop(&mut self, name: &str, wait: bool, detach: bool) -> Result<()> {
        let node = self.resolve_node(name, &[NodeState::Running]).await?;
        let name = self.current_name()?;
        let session = self.session.clone();
        let compute = session.compute();

        self.emit(format!("Stopping {name} ({})", node.id));
        compute.stop_node(&node.id).await?;
        self.remove_dns(&node, wait).await?;

        if wait || detach {
            self.emit("Waiting for the node to enter state stopped ...");
            compute.wait_node(&node.id, NodeState::Stopped).await?;
            self.emit("Stopped");
        }
        if detach {
            let volume = self.node_data_volume(&node).await?;
            let device = attached_device(&volume, &node)?;
            self.detach(&node, &volume, &device, wait).await?;
        }
        Ok(())
    }

    pub async fn reboot(&mut self, name: &str) -> Result<()> {
        let node = self.resolve_node(name, &[NodeState::Running]).await?;
        self.emit(format!("Rebooting {}", node.id));
        self.session.compute().reboot_node(&node.id).await
    }

    /// Terminate a node along with its private security group and, if asked,
    /// its data volume
    pub async fn terminate(
        &mut self,
        name: &str,
        wait: bool,
        delete_volume: bool,
    ) -> Result<TerminateOutcome> {
        let node = self.resolve_node(name, &NodeState::ACTIVE).await?;
        let name = self.current_name()?;
        let session = self.session.clone();
        let compute = session.compute();

        let group = match &node.vpc_id {
            Some(vpc_id) => compute
                .find_security_groups(vpc_id, &name)
                .await?
                .into_iter()
                .next(),
            None => None,
        };

        if node.state == NodeState::Running {
            self.remove_dns(&node, false).await?;
        }

        let volume = if delete_volume {
            let volume = self
                .find_attached_volume(&name)
                .await?
                .filter(|v| v.device_on(&node.id).is_some())
                .ok_or_else(|| {
                    CloudError::NotFound(format!(
                        "No data volume named {name} attached to {}",
                        node.id
                    ))
                })?;
            Some(volume)
        } else {
            None
        };

        self.emit(format!("Terminating {name} ({})", node.id));
        compute.terminate_node(&node.id).await?;
        if wait || volume.is_some() || group.is_some() {
            self.emit("Waiting for the node to terminate ...");
            compute.wait_node(&node.id, NodeState::Terminated).await?;
            self.emit("Terminated");
        }

        if let Some(group) = &group {
            self.emit(format!("Deleting private security group {}", group.id));
            compute.delete_security_group(&group.id).await?;
        }
        if let Some(volume) = &volume {
            let storage = self.session.storage();
            storage.wait_volume(&volume.id, VolumeState::Available).await?;
            self.emit(format!("Deleting data volume {}", volume.id));
            storage.delete_volume(&volume.id).await?;
        }

        Ok(TerminateOutcome {
            node_id: node.id,
            security_group: group.map(|g| g.id),
            volume: volume.map(|v| v.id),
        })
    }

    /// Detach the node's data volume, or the named volume
    pub async fn detach_volume(
        &mut self,
        name: &str,
        volname: Option<&str>,
        wait: bool,
    ) -> Result<Volume> {
        let node = self.resolve_node(name, &NodeState::ACTIVE).await?;
        let volume = match volname {
            None => self.node_data_volume(&node).await?,
            Some(volname) => {
                let volname = self.set_volname(volname)?;
                self.find_volume(&volname, &[VolumeState::InUse], &[])
                    .await?
                    .ok_or_else(|| {
                        CloudError::NotFound(format!("No attached volume with Name: {volname}"))
                    })?
            }
        };
        let device = attached_device(&volume, &node)?;
        self.detach(&node, &volume, &device, wait).await?;
        Ok(volume)
    }

    pub async fn list_templates(&self, class: &str) -> Result<Vec<String>> {
        self.session.list_templates(class).await
    }

    /// The `metadata` section of a node template
    pub async fn metadata(&self, template: &str) -> Result<Option<serde_json::Value>> {
        let template = self.session.load_template(&self.params, template).await?;
        Ok(template.metadata.as_ref().map(|m| m.to_json()))
    }

    async fn detach(&self, node: &Node, volume: &Volume, device: &str, wait: bool) -> Result<()> {
        self.emit(format!(
            "Detaching {} from {} ({device})",
            volume.id, node.id
        ));
        let storage = self.session.storage();
        storage.detach_volume(&volume.id, &node.id, device).await?;
        if wait {
            storage.wait_volume(&volume.id, VolumeState::Available).await?;
            self.emit("Detached");
        }
        Ok(())
    }

    fn current_name(&self) -> Result<String> {
        self.params
            .get_str("name")
            .ok_or_else(|| CloudError::InvalidParameters("node name is required".to_string()))
    }
}

fn attached_device(volume: &Volume, node: &Node) -> Result<String> {
    volume
        .device_on(&node.id)
        .map(str::to_string)
        .ok_or_else(|| {
            CloudError::NotFound(format!(
                "Volume {} is not attached to {}",
                volume.id, node.id
            ))
        })
}
