//! Resource handles observed by the orchestrator
//!
//! Handles are snapshots of provider-owned resources. They are never assumed
//! to stay valid after a state-changing call; callers re-fetch through the
//! provider when they need fresh attachment data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider tag in the capitalized wire form (`Key` / `Value`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "Value")]
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Look up a tag value by key
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.key == key)
        .map(|t| t.value.as_str())
}

/// Lookup filter (`name` such as `tag:Name` or `instance-state-name`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `tag:<key>` filter with a single value
    pub fn tag(key: &str, value: impl Into<String>) -> Self {
        Self::new(format!("tag:{key}"), [value.into()])
    }
}

/// Compute node lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl NodeState {
    /// Every state in which a node still owns its name
    pub const ACTIVE: [NodeState; 5] = [
        NodeState::Pending,
        NodeState::Running,
        NodeState::ShuttingDown,
        NodeState::Stopping,
        NodeState::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Pending => "pending",
            NodeState::Running => "running",
            NodeState::ShuttingDown => "shutting-down",
            NodeState::Terminated => "terminated",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block device mapping entry on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume_id: String,
}

/// Compute node handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub state: NodeState,
    pub tags: Vec<Tag>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    pub root_device_name: String,
    pub block_devices: Vec<BlockDevice>,
}

impl Node {
    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("Name")
    }

    /// Block devices other than the root device
    pub fn data_devices(&self) -> impl Iterator<Item = &BlockDevice> {
        self.block_devices
            .iter()
            .filter(|b| b.device_name != self.root_device_name)
    }

    pub fn root_device(&self) -> Option<&BlockDevice> {
        self.block_devices
            .iter()
            .find(|b| b.device_name == self.root_device_name)
    }
}

/// Block storage volume state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeState {
    Creating,
    Available,
    InUse,
    Deleting,
    Deleted,
    Error,
}

impl VolumeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeState::Creating => "creating",
            VolumeState::Available => "available",
            VolumeState::InUse => "in-use",
            VolumeState::Deleting => "deleting",
            VolumeState::Deleted => "deleted",
            VolumeState::Error => "error",
        }
    }
}

impl std::fmt::Display for VolumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment of a volume to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub node_id: String,
    pub device: String,
}

/// Block storage volume handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub state: VolumeState,
    pub availability_zone: String,
    pub volume_type: Option<String>,
    pub size_gb: Option<u32>,
    pub tags: Vec<Tag>,
    pub attachments: Vec<Attachment>,
}

impl Volume {
    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("Name")
    }

    /// Zone letter suffix (`c` for `us-east-1c`)
    pub fn zone_letter(&self) -> Option<char> {
        self.availability_zone.chars().last()
    }

    /// Device the volume is attached at on the given node
    pub fn device_on(&self, node_id: &str) -> Option<&str> {
        self.attachments
            .iter()
            .find(|a| a.node_id == node_id)
            .map(|a| a.device.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotState {
    Pending,
    Completed,
    Error,
}

/// Volume snapshot handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub volume_id: String,
    pub state: SnapshotState,
    pub start_time: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

impl Snapshot {
    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }
}

/// Network interface created ahead of a node launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub vpc_id: String,
}

/// One of the two hosted zones the orchestrator publishes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsZone {
    Public,
    Private,
}

impl std::fmt::Display for DnsZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsZone::Public => write!(f, "public"),
            DnsZone::Private => write!(f, "private"),
        }
    }
}

/// Record set as returned by a zone lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: String,
    pub values: Vec<String>,
}

impl DnsRecord {
    /// Whether the record name matches `fqdn`, ignoring a trailing dot
    pub fn matches(&self, fqdn: &str) -> bool {
        self.name.trim_end_matches('.') == fqdn.trim_end_matches('.')
    }
}
