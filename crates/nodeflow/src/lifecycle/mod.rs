//! Node lifecycle
//!
//! [`NodeManager`] drives one node's lifecycle at a time. `create` runs the
//! locked state machine in [`create`]; every other operation resolves an
//! existing resource by name and acts on it without the lock.
//!
//! Names are normalized against `DNSDomain` before every lookup, and every
//! lookup is scoped to the domain via the `Domain` tag.

mod abort;
mod create;
mod dns;
mod node;
mod storage;

pub use create::{CreateOutcome, CreateRequest, CreateState, Rollback};
pub use node::TerminateOutcome;
pub use storage::{CreateVolumeRequest, SNAPSHOT_TYPE_TAG};

use crate::progress::Progress;
use crate::session::Session;
use nodeflow_cloud::{
    CloudError, Filter, Node, NodeState, Result, Snapshot, Volume, VolumeState,
};
use nodeflow_core::ParamStore;
use std::sync::Arc;

/// Lock serializing node creation across processes
pub const CREATE_LOCK: &str = "create-node";

/// Device a node's data volume is attached at
pub const DATA_DEVICE: &str = "/dev/sdf";

/// Names the data device may show up under once attached
pub const DATA_DEVICES: [&str; 2] = ["/dev/sdf", "/dev/xvdf"];

pub struct NodeManager {
    session: Arc<Session>,
    params: ParamStore,
    progress: Progress,
}

impl NodeManager {
    pub fn new(session: Arc<Session>, progress: Progress) -> Self {
        Self {
            session,
            params: ParamStore::new(),
            progress,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn emit(&self, message: impl AsRef<str>) {
        self.progress.emit(message);
    }

    /// Set and normalize the `name` parameter, returning the short name
    fn set_name(&mut self, name: &str) -> Result<String> {
        let domain = self.session.domain()?;
        self.params.setparam("name", name);
        self.params.normalize_names(&domain);
        self.params
            .get_str("name")
            .ok_or_else(|| CloudError::InvalidParameters("node name is required".to_string()))
    }

    /// Set and normalize the `volname` parameter, returning the short name
    fn set_volname(&mut self, volname: &str) -> Result<String> {
        let domain = self.session.domain()?;
        self.params.setparam("volname", volname);
        self.params.normalize_names(&domain);
        self.params
            .get_str("volname")
            .ok_or_else(|| CloudError::InvalidParameters("volume name is required".to_string()))
    }

    fn fqdn(&self) -> Result<String> {
        self.params
            .get_str("fqdn")
            .ok_or_else(|| CloudError::InvalidParameters("node name is required".to_string()))
    }

    fn domain_filter(&self) -> Result<Filter> {
        Ok(Filter::tag("Domain", self.session.domain()?))
    }

    /// Nodes of this domain in any of `states`
    pub async fn list_nodes(&self, states: &[NodeState]) -> Result<Vec<Node>> {
        let filters = [self.domain_filter()?, state_filter(states)];
        self.session.compute().find_nodes(&filters).await
    }

    /// The single node called `name` in any of `states`
    pub async fn resolve_node(&mut self, name: &str, states: &[NodeState]) -> Result<Node> {
        let name = self.set_name(name)?;
        self.find_node(&name, states).await?.ok_or_else(|| {
            CloudError::NotFound(format!(
                "No node found with Name: {name} in any of the states: {}",
                state_list(states)
            ))
        })
    }

    async fn find_node(&self, name: &str, states: &[NodeState]) -> Result<Option<Node>> {
        let filters = [
            Filter::tag("Name", name),
            self.domain_filter()?,
            state_filter(states),
        ];
        let nodes = self.session.compute().find_nodes(&filters).await?;
        unique(nodes, &format!("node {name}"))
    }

    /// The single volume called `volname` in one of `states`
    async fn find_volume(
        &self,
        volname: &str,
        states: &[VolumeState],
        extra: &[Filter],
    ) -> Result<Option<Volume>> {
        let mut filters = vec![
            Filter::tag("Name", volname),
            self.domain_filter()?,
            Filter::new("status", states.iter().map(VolumeState::as_str)),
        ];
        filters.extend_from_slice(extra);
        let volumes = self.session.storage().find_volumes(&filters).await?;
        unique(volumes, &format!("volume {volname}"))
    }

    /// The named volume while attached as a data device
    async fn find_attached_volume(&self, volname: &str) -> Result<Option<Volume>> {
        self.find_volume(
            volname,
            &[VolumeState::InUse],
            &[Filter::new("attachment.device", DATA_DEVICES)],
        )
        .await
    }

    pub async fn resolve_snapshot(&self, snapshot_id: &str) -> Result<Snapshot> {
        let filters = [Filter::new("snapshot-id", [snapshot_id]), self.domain_filter()?];
        let snapshots = self.session.storage().find_snapshots(&filters).await?;
        unique(snapshots, &format!("snapshot {snapshot_id}"))?.ok_or_else(|| {
            CloudError::NotFound(format!(
                "No snapshot found for domain {} with id: {snapshot_id}",
                self.session.config().str("DNSDomain").unwrap_or_default()
            ))
        })
    }

    /// The attached volume carrying the node's own name
    async fn node_data_volume(&self, node: &Node) -> Result<Volume> {
        let name = node.name().unwrap_or_default();
        for device in node.data_devices() {
            let volume = self.session.storage().volume(&device.volume_id).await?;
            if volume.name() == Some(name) {
                return Ok(volume);
            }
        }
        Err(CloudError::NotFound(format!(
            "Couldn't locate an attached volume with Name: {name}"
        )))
    }

    pub async fn data_volume(&mut self, name: &str) -> Result<Volume> {
        let node = self.resolve_node(name, &NodeState::ACTIVE).await?;
        self.node_data_volume(&node).await
    }

    pub async fn root_volume(&mut self, name: &str) -> Result<Volume> {
        let node = self.resolve_node(name, &NodeState::ACTIVE).await?;
        let root = node.root_device().ok_or_else(|| {
            CloudError::NotFound(format!("Node {} has no root device mapping", node.id))
        })?;
        self.session.storage().volume(&root.volume_id).await
    }
}

fn state_filter(states: &[NodeState]) -> Filter {
    Filter::new("instance-state-name", states.iter().map(NodeState::as_str))
}

fn state_list(states: &[NodeState]) -> String {
    states
        .iter()
        .map(NodeState::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Zero or one match; more than one is ambiguous
fn unique<T>(mut items: Vec<T>, what: &str) -> Result<Option<T>> {
    match items.len() {
        0 => Ok(None),
        1 => Ok(items.pop()),
        n => Err(CloudError::Conflict(format!("Multiple matches ({n}) for {what}"))),
    }
}
