#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use nodeflow::{NodeManager, Progress, Providers, Session};
use nodeflow_cloud::{
    Attachment, BlockDevice, CloudError, ComputeProvider, DnsFacade, DnsRecord, DnsZone, Filter,
    LockService, NetworkInterface, Node, NodeState, OutputProvider, Result, SecurityGroup,
    Snapshot, SnapshotState, StorageProvider, Tag, Volume, VolumeState,
};
use nodeflow_core::{ConfigTree, CoreError, DirTemplateSource, TemplateSource};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub const DOMAIN: &str = "example.com";

pub const CONFIG: &str = r#"
Bucket: deploy-bucket
Region: us-east-1
VPCCIDR: 10.0.0.0/16
AvailabilityZones: [a, b, c]
SubnetTypes:
  Private:
    CIDR: 10.0.0.0/18
    Subnets: []
DNSDomain: example.com
PublicDNSId: ZPUBLIC
PrivateDNSId: ZPRIVATE
BaseImage: ami-123
Tags:
  - Owner: ops
"#;

/// Region that defers tagging until after launch
pub const DEFERRED_CONFIG: &str = r#"
Bucket: deploy-bucket
Region: us-gov-west-1
VPCCIDR: 10.0.0.0/16
AvailabilityZones: [a, b, c]
SubnetTypes:
  Private:
    CIDR: 10.0.0.0/18
    Subnets: []
DNSDomain: example.com
PrivateDNSId: ZPRIVATE
BaseImage: ami-123
"#;

pub const WEB_TEMPLATE: &str = r#"
metadata:
  description: Web server
private_sg: true
tags:
  Role: web
api_template:
  ImageId: $BaseImage
  InstanceType: t3.micro
  KeyName: ${@key:ops}
  UserData: |
    #!/bin/sh
    hostname ${@name}
  NetworkInterfaces:
    - DeviceIndex: 0
      SubnetId: subnet-private#a
  BlockDeviceMappings:
    - DeviceName: /dev/sda1
      Ebs:
        VolumeSize: 8
    - DeviceName: /dev/sdf
      Ebs:
        VolumeSize: 20
        VolumeType: gp3
        Iops: 3000
        SnapshotId: snap-template
additional_interfaces:
  - SubnetId: subnet-private#a
    Description: backend
"#;

pub const SIMPLE_TEMPLATE: &str = r#"
api_template:
  ImageId: $BaseImage
  SubnetId: subnet-private#a
  BlockDeviceMappings:
    - DeviceName: /dev/sda1
      Ebs:
        VolumeSize: 8
    - DeviceName: /dev/sdf
      Ebs:
        VolumeSize: 20
        VolumeType: gp3
        DeleteOnTermination: false
"#;

#[derive(Default)]
struct State {
    nodes: Vec<Node>,
    volumes: Vec<Volume>,
    delete_on_termination: HashSet<String>,
    marked: Vec<String>,
    snapshots: Vec<Snapshot>,
    interfaces: Vec<(NetworkInterface, Option<String>)>,
    groups: Vec<SecurityGroup>,
    records: HashMap<(DnsZone, String), DnsRecord>,
    templates: HashMap<(String, String), String>,
    outputs: HashMap<String, HashMap<String, String>>,
    launches: Vec<Json>,
    changes: Vec<(DnsZone, Json)>,
    calls: Vec<String>,
    failing: HashSet<String>,
    race_fqdn: Option<String>,
    lock_held: bool,
    lock_acquires: usize,
    lock_releases: usize,
    next_id: u32,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| CloudError::NotFound(format!("node {id}")))
    }

    fn volume_mut(&mut self, id: &str) -> Result<&mut Volume> {
        self.volumes
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| CloudError::NotFound(format!("volume {id}")))
    }

    fn attach(&mut self, volume_id: &str, node_id: &str, device: &str) -> Result<()> {
        let volume = self.volume_mut(volume_id)?;
        volume.state = VolumeState::InUse;
        volume.attachments.push(Attachment {
            node_id: node_id.to_string(),
            device: device.to_string(),
        });
        self.node_mut(node_id)?.block_devices.push(BlockDevice {
            device_name: device.to_string(),
            volume_id: volume_id.to_string(),
        });
        Ok(())
    }

    fn detach(&mut self, volume_id: &str, node_id: &str) -> Result<()> {
        let volume = self.volume_mut(volume_id)?;
        volume.attachments.retain(|a| a.node_id != node_id);
        volume.state = VolumeState::Available;
        self.node_mut(node_id)?
            .block_devices
            .retain(|b| b.volume_id != volume_id);
        Ok(())
    }
}

/// In-memory cloud implementing every provider trait, the lock service and
/// the template source
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record a call to `op`, failing if `op` was set up to fail
    fn enter(&self, op: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(op.to_string());
        if state.failing.contains(op) {
            return Err(CloudError::Provider(format!("injected failure in {op}")));
        }
        Ok(())
    }

    pub fn fail_on(&self, op: &str) {
        self.state().failing.insert(op.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn called(&self, op: &str) -> bool {
        self.state().calls.iter().any(|c| c == op)
    }

    pub fn position(&self, op: &str) -> Option<usize> {
        self.state().calls.iter().position(|c| c == op)
    }

    pub fn lock_acquires(&self) -> usize {
        self.state().lock_acquires
    }

    pub fn lock_releases(&self) -> usize {
        self.state().lock_releases
    }

    pub fn lock_held(&self) -> bool {
        self.state().lock_held
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.state().nodes.clone()
    }

    pub fn volumes(&self) -> Vec<Volume> {
        self.state().volumes.clone()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.state().snapshots.clone()
    }

    pub fn groups(&self) -> Vec<SecurityGroup> {
        self.state().groups.clone()
    }

    pub fn interfaces(&self) -> Vec<(NetworkInterface, Option<String>)> {
        self.state().interfaces.clone()
    }

    pub fn marked_for_deletion(&self) -> Vec<String> {
        self.state().marked.clone()
    }

    pub fn launches(&self) -> Vec<Json> {
        self.state().launches.clone()
    }

    pub fn dns_record(&self, zone: DnsZone, fqdn: &str) -> Option<DnsRecord> {
        self.state().records.get(&(zone, fqdn.to_string())).cloned()
    }

    pub fn add_template(&self, class: &str, name: &str, text: &str) {
        self.state()
            .templates
            .insert((class.to_string(), name.to_string()), text.to_string());
    }

    pub fn add_record(&self, zone: DnsZone, fqdn: &str, record_type: &str, values: &[&str]) {
        self.state().records.insert(
            (zone, fqdn.to_string()),
            DnsRecord {
                name: format!("{fqdn}."),
                record_type: record_type.to_string(),
                values: values.iter().map(|v| v.to_string()).collect(),
            },
        );
    }

    /// A record for `fqdn` shows up in the private zone while the node launches
    pub fn race_record(&self, fqdn: &str) {
        self.state().race_fqdn = Some(fqdn.to_string());
    }

    /// A node of this domain with a named root volume
    pub fn add_node(&self, name: &str, node_state: NodeState, subnet: &str) -> Node {
        let mut state = self.state();
        let id = state.id("i");
        let root = state.id("vol");
        let n = state.next_id;
        state.volumes.push(Volume {
            id: root.clone(),
            state: VolumeState::InUse,
            availability_zone: zone_of(subnet),
            volume_type: Some("gp3".to_string()),
            size_gb: Some(8),
            tags: vec![Tag::new("InstanceName", name), Tag::new("Domain", DOMAIN)],
            attachments: vec![Attachment {
                node_id: id.clone(),
                device: "/dev/sda1".to_string(),
            }],
        });
        state.delete_on_termination.insert(root.clone());
        let node = Node {
            id,
            state: node_state,
            tags: vec![Tag::new("Name", name), Tag::new("Domain", DOMAIN)],
            private_ip: Some(format!("10.0.1.{n}")),
            public_ip: Some(format!("54.0.1.{n}")),
            subnet_id: Some(subnet.to_string()),
            vpc_id: Some("vpc-1".to_string()),
            root_device_name: "/dev/sda1".to_string(),
            block_devices: vec![BlockDevice {
                device_name: "/dev/sda1".to_string(),
                volume_id: root,
            }],
        };
        state.nodes.push(node.clone());
        node
    }

    pub fn add_volume(&self, name: Option<&str>, zone: &str) -> Volume {
        let mut state = self.state();
        let id = state.id("vol");
        let mut tags = vec![Tag::new("Domain", DOMAIN)];
        if let Some(name) = name {
            tags.push(Tag::new("Name", name));
        }
        let volume = Volume {
            id,
            state: VolumeState::Available,
            availability_zone: zone.to_string(),
            volume_type: Some("gp3".to_string()),
            size_gb: Some(20),
            tags,
            attachments: Vec::new(),
        };
        state.volumes.push(volume.clone());
        volume
    }

    pub fn add_tags(&self, volume_id: &str, tags: &[Tag]) {
        merge_tags(&mut self.state().volume_mut(volume_id).unwrap().tags, tags);
    }

    pub fn attach(&self, volume_id: &str, node_id: &str, device: &str) {
        self.state().attach(volume_id, node_id, device).unwrap();
    }

    pub fn add_snapshot(&self, volume_id: &str, tags: Vec<Tag>) -> Snapshot {
        let mut state = self.state();
        let snapshot = Snapshot {
            id: state.id("snap"),
            volume_id: volume_id.to_string(),
            state: SnapshotState::Completed,
            start_time: Utc::now(),
            tags,
        };
        state.snapshots.push(snapshot.clone());
        snapshot
    }

    pub fn add_group(&self, name: &str) -> SecurityGroup {
        let mut state = self.state();
        let group = SecurityGroup {
            id: state.id("sg"),
            name: name.to_string(),
            vpc_id: "vpc-1".to_string(),
        };
        state.groups.push(group.clone());
        group
    }
}

/// `subnet-private#b` lives in `us-east-1b`
fn zone_of(subnet: &str) -> String {
    match subnet.rsplit_once('#') {
        Some((_, zone)) => format!("us-east-1{zone}"),
        None => "us-east-1a".to_string(),
    }
}

fn has_tag(tags: &[Tag], key: &str, values: &[String]) -> bool {
    tags.iter()
        .any(|t| t.key == key && values.iter().any(|v| v == &t.value))
}

fn node_matches(node: &Node, filter: &Filter) -> bool {
    match filter.name.as_str() {
        "instance-state-name" => filter.values.iter().any(|v| v == node.state.as_str()),
        "private-ip-address" => node
            .private_ip
            .as_ref()
            .is_some_and(|ip| filter.values.contains(ip)),
        name => match name.strip_prefix("tag:") {
            Some(key) => has_tag(&node.tags, key, &filter.values),
            None => panic!("unsupported node filter {name}"),
        },
    }
}

fn volume_matches(volume: &Volume, filter: &Filter) -> bool {
    match filter.name.as_str() {
        "status" => filter.values.iter().any(|v| v == volume.state.as_str()),
        "attachment.device" => volume
            .attachments
            .iter()
            .any(|a| filter.values.contains(&a.device)),
        name => match name.strip_prefix("tag:") {
            Some(key) => has_tag(&volume.tags, key, &filter.values),
            None => panic!("unsupported volume filter {name}"),
        },
    }
}

fn snapshot_matches(snapshot: &Snapshot, filter: &Filter) -> bool {
    match filter.name.as_str() {
        "snapshot-id" => filter.values.contains(&snapshot.id),
        name => match name.strip_prefix("tag:") {
            Some(key) => has_tag(&snapshot.tags, key, &filter.values),
            None => panic!("unsupported snapshot filter {name}"),
        },
    }
}

/// Tags from `tag_specifications` for one resource type
fn spec_tags(request: &Json, resource_type: &str) -> Vec<Tag> {
    request["tag_specifications"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|spec| spec["resource_type"] == resource_type)
        .flat_map(|spec| spec["tags"].as_array().cloned().unwrap_or_default())
        .map(|tag| {
            Tag::new(
                tag["key"].as_str().unwrap_or_default(),
                tag["value"].as_str().unwrap_or_default(),
            )
        })
        .collect()
}

fn merge_tags(tags: &mut Vec<Tag>, new: &[Tag]) {
    for tag in new {
        tags.retain(|t| t.key != tag.key);
        tags.push(tag.clone());
    }
}

#[async_trait]
impl ComputeProvider for FakeCloud {
    async fn find_nodes(&self, filters: &[Filter]) -> Result<Vec<Node>> {
        self.enter("find_nodes")?;
        Ok(self
            .state()
            .nodes
            .iter()
            .filter(|n| filters.iter().all(|f| node_matches(n, f)))
            .cloned()
            .collect())
    }

    async fn node(&self, id: &str) -> Result<Node> {
        self.enter("node")?;
        Ok(self.state().node_mut(id)?.clone())
    }

    async fn create_node(&self, request: &Json) -> Result<Node> {
        self.enter("create_node")?;
        let mut state = self.state();
        state.launches.push(request.clone());

        let subnet = request["network_interfaces"][0]["subnet_id"]
            .as_str()
            .or(request["subnet_id"].as_str())
            .unwrap_or("subnet-default")
            .to_string();
        let id = state.id("i");
        let n = state.next_id;
        let volume_tags = spec_tags(request, "volume");

        let mut block_devices = Vec::new();
        let mappings = request["block_device_mappings"].as_array().cloned().unwrap_or_default();
        let mut devices: Vec<(String, bool)> = mappings
            .iter()
            .map(|m| {
                let name = m["device_name"].as_str().unwrap_or_default().to_string();
                let keep = m["ebs"]["delete_on_termination"] == Json::Bool(false);
                (name, !keep)
            })
            .collect();
        if !devices.iter().any(|(name, _)| name == "/dev/sda1") {
            devices.insert(0, ("/dev/sda1".to_string(), true));
        }
        for (device, delete_on_termination) in devices {
            let volume_id = state.id("vol");
            state.volumes.push(Volume {
                id: volume_id.clone(),
                state: VolumeState::InUse,
                availability_zone: zone_of(&subnet),
                volume_type: Some("gp3".to_string()),
                size_gb: Some(8),
                tags: volume_tags.clone(),
                attachments: vec![Attachment {
                    node_id: id.clone(),
                    device: device.clone(),
                }],
            });
            if delete_on_termination {
                state.delete_on_termination.insert(volume_id.clone());
            }
            block_devices.push(BlockDevice {
                device_name: device,
                volume_id,
            });
        }

        let node = Node {
            id,
            state: NodeState::Pending,
            tags: spec_tags(request, "instance"),
            private_ip: Some(format!("10.0.0.{n}")),
            public_ip: Some(format!("54.0.0.{n}")),
            subnet_id: Some(subnet),
            vpc_id: Some("vpc-1".to_string()),
            root_device_name: "/dev/sda1".to_string(),
            block_devices,
        };
        state.nodes.push(node.clone());

        if let Some(fqdn) = state.race_fqdn.take() {
            state.records.insert(
                (DnsZone::Private, fqdn.clone()),
                DnsRecord {
                    name: format!("{fqdn}."),
                    record_type: "A".to_string(),
                    values: vec!["10.99.0.1".to_string()],
                },
            );
        }
        Ok(node)
    }

    async fn wait_node(&self, id: &str, target: NodeState) -> Result<()> {
        self.enter("wait_node")?;
        let mut state = self.state();
        let node = state.node_mut(id)?;
        if node.state != NodeState::Terminated {
            node.state = target;
        }
        Ok(())
    }

    async fn start_node(&self, id: &str) -> Result<()> {
        self.enter("start_node")?;
        self.state().node_mut(id)?.state = NodeState::Pending;
        Ok(())
    }

    async fn stop_node(&self, id: &str) -> Result<()> {
        self.enter("stop_node")?;
        self.state().node_mut(id)?.state = NodeState::Stopping;
        Ok(())
    }

    async fn reboot_node(&self, id: &str) -> Result<()> {
        self.enter("reboot_node")?;
        self.state().node_mut(id)?;
        Ok(())
    }

    async fn terminate_node(&self, id: &str) -> Result<()> {
        self.enter("terminate_node")?;
        let mut state = self.state();
        let node = state.node_mut(id)?;
        node.state = NodeState::Terminated;
        let devices = std::mem::take(&mut node.block_devices);

        for device in devices {
            if state.delete_on_termination.contains(&device.volume_id) {
                state.volumes.retain(|v| v.id != device.volume_id);
            } else if let Ok(volume) = state.volume_mut(&device.volume_id) {
                volume.attachments.retain(|a| a.node_id != id);
                volume.state = VolumeState::Available;
            }
        }
        state
            .interfaces
            .retain(|(_, attached)| attached.as_deref() != Some(id));
        Ok(())
    }

    async fn set_delete_on_termination(
        &self,
        node_id: &str,
        device_name: &str,
        volume_id: &str,
    ) -> Result<()> {
        self.enter("set_delete_on_termination")?;
        let mut state = self.state();
        let attached = state
            .node_mut(node_id)?
            .block_devices
            .iter()
            .any(|b| b.device_name == device_name && b.volume_id == volume_id);
        assert!(attached, "{volume_id} is not attached at {device_name}");
        state.delete_on_termination.insert(volume_id.to_string());
        state.marked.push(volume_id.to_string());
        Ok(())
    }

    async fn tag_resources(&self, resource_ids: &[String], tags: &[Tag]) -> Result<()> {
        self.enter("tag_resources")?;
        let mut state = self.state();
        for id in resource_ids {
            if let Some(node) = state.nodes.iter_mut().find(|n| &n.id == id) {
                merge_tags(&mut node.tags, tags);
            } else if let Some(volume) = state.volumes.iter_mut().find(|v| &v.id == id) {
                merge_tags(&mut volume.tags, tags);
            } else if let Some(snapshot) = state.snapshots.iter_mut().find(|s| &s.id == id) {
                merge_tags(&mut snapshot.tags, tags);
            } else if !state.groups.iter().any(|g| &g.id == id) {
                return Err(CloudError::NotFound(format!("resource {id}")));
            }
        }
        Ok(())
    }

    async fn create_interface(&self, request: &Json) -> Result<NetworkInterface> {
        self.enter("create_interface")?;
        let mut state = self.state();
        let iface = NetworkInterface {
            id: state.id("eni"),
            subnet_id: request["subnet_id"].as_str().map(str::to_string),
        };
        state.interfaces.push((iface.clone(), None));
        Ok(iface)
    }

    async fn attach_interface(
        &self,
        interface_id: &str,
        node_id: &str,
        device_index: u32,
    ) -> Result<()> {
        self.enter("attach_interface")?;
        assert!(device_index >= 1, "device index 0 belongs to the primary interface");
        let mut state = self.state();
        let (_, attached) = state
            .interfaces
            .iter_mut()
            .find(|(i, _)| i.id == interface_id)
            .ok_or_else(|| CloudError::NotFound(format!("interface {interface_id}")))?;
        *attached = Some(node_id.to_string());
        Ok(())
    }

    async fn delete_interface(&self, interface_id: &str) -> Result<()> {
        self.enter("delete_interface")?;
        self.state()
            .interfaces
            .retain(|(i, _)| i.id != interface_id);
        Ok(())
    }

    async fn subnet_vpc(&self, _subnet_id: &str) -> Result<String> {
        self.enter("subnet_vpc")?;
        Ok("vpc-1".to_string())
    }

    async fn subnet_zone(&self, subnet_id: &str) -> Result<String> {
        self.enter("subnet_zone")?;
        Ok(zone_of(subnet_id))
    }

    async fn find_security_groups(&self, vpc_id: &str, name: &str) -> Result<Vec<SecurityGroup>> {
        self.enter("find_security_groups")?;
        Ok(self
            .state()
            .groups
            .iter()
            .filter(|g| g.vpc_id == vpc_id && g.name == name)
            .cloned()
            .collect())
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> Result<SecurityGroup> {
        self.enter("create_security_group")?;
        assert_eq!(description, format!("Private security group for {name}"));
        let mut state = self.state();
        let group = SecurityGroup {
            id: state.id("sg"),
            name: name.to_string(),
            vpc_id: vpc_id.to_string(),
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        self.enter("delete_security_group")?;
        self.state().groups.retain(|g| g.id != id);
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for FakeCloud {
    async fn find_volumes(&self, filters: &[Filter]) -> Result<Vec<Volume>> {
        self.enter("find_volumes")?;
        Ok(self
            .state()
            .volumes
            .iter()
            .filter(|v| filters.iter().all(|f| volume_matches(v, f)))
            .cloned()
            .collect())
    }

    async fn volume(&self, id: &str) -> Result<Volume> {
        self.enter("volume")?;
        Ok(self.state().volume_mut(id)?.clone())
    }

    async fn create_volume(&self, request: &Json) -> Result<Volume> {
        self.enter("create_volume")?;
        let mut state = self.state();
        let volume = Volume {
            id: state.id("vol"),
            state: VolumeState::Available,
            availability_zone: request["availability_zone"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            volume_type: request["volume_type"].as_str().map(str::to_string),
            size_gb: request["size"].as_u64().map(|s| s as u32),
            tags: spec_tags(request, "volume"),
            attachments: Vec::new(),
        };
        state.volumes.push(volume.clone());
        Ok(volume)
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        self.enter("delete_volume")?;
        let mut state = self.state();
        let volume = state.volume_mut(id)?;
        assert_eq!(volume.state, VolumeState::Available, "deleting attached volume {id}");
        state.volumes.retain(|v| v.id != id);
        Ok(())
    }

    async fn attach_volume(&self, volume_id: &str, node_id: &str, device: &str) -> Result<()> {
        self.enter("attach_volume")?;
        self.state().attach(volume_id, node_id, device)
    }

    async fn detach_volume(&self, volume_id: &str, node_id: &str, _device: &str) -> Result<()> {
        self.enter("detach_volume")?;
        self.state().detach(volume_id, node_id)
    }

    async fn wait_volume(&self, _id: &str, _state: VolumeState) -> Result<()> {
        self.enter("wait_volume")
    }

    async fn find_snapshots(&self, filters: &[Filter]) -> Result<Vec<Snapshot>> {
        self.enter("find_snapshots")?;
        Ok(self
            .state()
            .snapshots
            .iter()
            .filter(|s| filters.iter().all(|f| snapshot_matches(s, f)))
            .cloned()
            .collect())
    }

    async fn create_snapshot(&self, volume_id: &str) -> Result<Snapshot> {
        self.enter("create_snapshot")?;
        let mut state = self.state();
        state.volume_mut(volume_id)?;
        let snapshot = Snapshot {
            id: state.id("snap"),
            volume_id: volume_id.to_string(),
            state: SnapshotState::Pending,
            start_time: Utc::now(),
            tags: Vec::new(),
        };
        state.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn delete_snapshot(&self, id: &str) -> Result<()> {
        self.enter("delete_snapshot")?;
        self.state().snapshots.retain(|s| s.id != id);
        Ok(())
    }

    async fn wait_snapshot_completed(&self, id: &str) -> Result<()> {
        self.enter("wait_snapshot_completed")?;
        if let Some(snapshot) = self.state().snapshots.iter_mut().find(|s| s.id == id) {
            snapshot.state = SnapshotState::Completed;
        }
        Ok(())
    }
}

#[async_trait]
impl DnsFacade for FakeCloud {
    async fn record(&self, fqdn: &str, zone: DnsZone) -> Result<Option<DnsRecord>> {
        self.enter("record")?;
        let key = (zone, fqdn.trim_end_matches('.').to_string());
        Ok(self.state().records.get(&key).cloned())
    }

    async fn change(&self, zone: DnsZone, change: &Json) -> Result<String> {
        self.enter("change")?;
        let mut state = self.state();
        let expected_zone = match zone {
            DnsZone::Public => "ZPUBLIC",
            DnsZone::Private => "ZPRIVATE",
        };
        assert_eq!(change["hosted_zone_id"], expected_zone);

        for item in change["change_batch"]["changes"].as_array().into_iter().flatten() {
            let set = &item["resource_record_set"];
            let name = set["name"].as_str().unwrap_or_default().trim_end_matches('.').to_string();
            match item["action"].as_str() {
                Some("UPSERT") => {
                    let values = set["resource_records"]
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(|r| r["value"].as_str().map(str::to_string))
                        .collect();
                    state.records.insert(
                        (zone, name.clone()),
                        DnsRecord {
                            name: format!("{name}."),
                            record_type: set["type"].as_str().unwrap_or_default().to_string(),
                            values,
                        },
                    );
                }
                Some("DELETE") => {
                    state.records.remove(&(zone, name));
                }
                other => panic!("unsupported change action {other:?}"),
            }
        }
        state.changes.push((zone, change.clone()));
        Ok(format!("change-{}", state.changes.len()))
    }

    async fn wait_sync(&self, _change_id: &str) -> Result<()> {
        self.enter("wait_sync")
    }
}

#[async_trait]
impl OutputProvider for FakeCloud {
    async fn outputs(&self, stack: &str) -> Result<HashMap<String, String>> {
        self.enter("outputs")?;
        self.state()
            .outputs
            .get(stack)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("stack {stack}")))
    }
}

#[async_trait]
impl LockService for FakeCloud {
    async fn acquire(&self, name: &str) -> Result<()> {
        self.enter("acquire")?;
        let mut state = self.state();
        if state.lock_held {
            return Err(CloudError::Lock(format!("{name} is already held")));
        }
        state.lock_held = true;
        state.lock_acquires += 1;
        Ok(())
    }

    async fn release(&self, _name: &str) -> Result<()> {
        self.state().lock_releases += 1;
        self.enter("release")?;
        self.state().lock_held = false;
        Ok(())
    }
}

#[async_trait]
impl TemplateSource for FakeCloud {
    async fn fetch(&self, class: &str, name: &str) -> nodeflow_core::Result<String> {
        self.enter("fetch").map_err(CoreError::from)?;
        let text = self
            .state()
            .templates
            .get(&(class.to_string(), name.to_string()))
            .cloned();
        match text {
            Some(text) => Ok(text),
            None => DirTemplateSource::default().fetch(class, name).await,
        }
    }

    async fn list(&self, class: &str) -> nodeflow_core::Result<Vec<String>> {
        let mut names = DirTemplateSource::default().list(class).await?;
        names.extend(
            self.state()
                .templates
                .keys()
                .filter(|(c, _)| c == class)
                .map(|(_, n)| n.clone()),
        );
        names.sort();
        Ok(names)
    }
}

pub fn session(cloud: &Arc<FakeCloud>, config: &str) -> Arc<Session> {
    let config = ConfigTree::from_yaml_str(config, "test").unwrap();
    let providers = Providers {
        compute: cloud.clone(),
        storage: cloud.clone(),
        dns: cloud.clone(),
        outputs: cloud.clone(),
        lock: cloud.clone(),
        templates: cloud.clone(),
    };
    Arc::new(Session::new(config, providers))
}

/// A manager over the fake cloud plus its progress receiver
pub fn manager(cloud: &Arc<FakeCloud>, config: &str) -> (NodeManager, UnboundedReceiver<String>) {
    let (progress, rx) = Progress::channel();
    (NodeManager::new(session(cloud, config), progress), rx)
}

/// Progress lines received so far
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}
