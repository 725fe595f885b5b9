//! Node creation
//!
//! ```text
//! AcquireLock → Preflight → LoadTemplate → ResolveVolume → BuildRequest
//!     → DryRunGate ──(dry run)──────────────────────────────→ Done
//!     → CreateNode → PostCreate → RaceCheck → PublishDns ──→ Done
//! ```
//!
//! Each state names the rollback that runs when it fails ([`Rollback`]). The
//! lock taken in AcquireLock is released by exactly one of: the rollback of
//! a failing state, the dry-run gate, or DNS publishing as soon as the
//! record changes are submitted.

use super::{CREATE_LOCK, DATA_DEVICE, NodeManager, state_filter};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nodeflow_cloud::{
    CloudError, DnsZone, Filter, LockToken, NetworkInterface, Node, NodeState, Result, Tag,
    Volume, VolumeState,
};
use nodeflow_core::{Scalar, TagSet, Template, Value, normalize_keys};
use regex::Regex;
use std::sync::LazyLock;

/// Availability-zone placeholder in a subnet reference (`#a`, `#F`, `#?`)
static ZONE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[FL0-9a-j?]").expect("zone placeholder pattern"));

/// Parameters of one `create` call
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub name: String,
    pub template: String,
    pub key: Option<String>,
    /// Launch with this existing, available volume
    pub volume: Option<String>,
    /// Launch with a data volume created from this snapshot
    pub snapshot: Option<String>,
    /// Size of a freshly created data volume, in GiB
    pub data_size: Option<i64>,
    pub dry_run: bool,
    /// Block on DNS propagation, and on termination when rolling back
    pub wait: bool,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            wait: true,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created { node: Node, note: Option<String> },
    /// The fully built launch request; nothing was created
    DryRun { request: serde_json::Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateState {
    AcquireLock,
    Preflight,
    LoadTemplate,
    ResolveVolume,
    BuildRequest,
    DryRunGate,
    CreateNode,
    PostCreate,
    RaceCheck,
    PublishDns,
    Done,
}

/// Compensating action for a failure in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    None,
    ReleaseLock,
    /// Release the lock, then delete interfaces created for the launch
    DiscardInterfaces,
    /// Release the lock if still held, then abort the node
    AbortNode,
}

impl CreateState {
    pub const ALL: [CreateState; 11] = [
        CreateState::AcquireLock,
        CreateState::Preflight,
        CreateState::LoadTemplate,
        CreateState::ResolveVolume,
        CreateState::BuildRequest,
        CreateState::DryRunGate,
        CreateState::CreateNode,
        CreateState::PostCreate,
        CreateState::RaceCheck,
        CreateState::PublishDns,
        CreateState::Done,
    ];

    pub fn rollback(self) -> Rollback {
        match self {
            CreateState::AcquireLock | CreateState::Done => Rollback::None,
            CreateState::Preflight
            | CreateState::LoadTemplate
            | CreateState::ResolveVolume
            | CreateState::BuildRequest
            | CreateState::DryRunGate => Rollback::ReleaseLock,
            CreateState::CreateNode => Rollback::DiscardInterfaces,
            CreateState::PostCreate | CreateState::RaceCheck | CreateState::PublishDns => {
                Rollback::AbortNode
            }
        }
    }

    fn next(self, dry_run: bool) -> Self {
        match self {
            CreateState::AcquireLock => CreateState::Preflight,
            CreateState::Preflight => CreateState::LoadTemplate,
            CreateState::LoadTemplate => CreateState::ResolveVolume,
            CreateState::ResolveVolume => CreateState::BuildRequest,
            CreateState::BuildRequest => CreateState::DryRunGate,
            CreateState::DryRunGate if dry_run => CreateState::Done,
            CreateState::DryRunGate => CreateState::CreateNode,
            CreateState::CreateNode => CreateState::PostCreate,
            CreateState::PostCreate => CreateState::RaceCheck,
            CreateState::RaceCheck => CreateState::PublishDns,
            CreateState::PublishDns | CreateState::Done => CreateState::Done,
        }
    }
}

impl std::fmt::Display for CreateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CreateState::AcquireLock => "acquire-lock",
            CreateState::Preflight => "preflight",
            CreateState::LoadTemplate => "load-template",
            CreateState::ResolveVolume => "resolve-volume",
            CreateState::BuildRequest => "build-request",
            CreateState::DryRunGate => "dry-run-gate",
            CreateState::CreateNode => "create-node",
            CreateState::PostCreate => "post-create",
            CreateState::RaceCheck => "race-check",
            CreateState::PublishDns => "publish-dns",
            CreateState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Everything one `create` call accumulates on its way through the states
struct CreateRun {
    request: CreateRequest,
    name: String,
    lock: Option<LockToken>,
    /// Address of the stale private record found in Preflight
    stale_ip: Option<String>,
    template: Option<Template>,
    volume: Option<Volume>,
    launch: Option<serde_json::Value>,
    instance_tags: Vec<Tag>,
    volume_tags: Vec<Tag>,
    /// Created for the launch and not attached yet
    interfaces: Vec<NetworkInterface>,
    node: Option<Node>,
    /// Zones holding an A record published for the node
    published: Vec<DnsZone>,
    note: Option<String>,
}

impl CreateRun {
    fn new(request: CreateRequest, name: String) -> Self {
        Self {
            request,
            name,
            lock: None,
            stale_ip: None,
            template: None,
            volume: None,
            launch: None,
            instance_tags: Vec::new(),
            volume_tags: Vec::new(),
            interfaces: Vec::new(),
            node: None,
            published: Vec::new(),
            note: None,
        }
    }

    fn template(&mut self) -> Result<&mut Template> {
        self.template
            .as_mut()
            .ok_or_else(|| CloudError::Template("no template loaded".to_string()))
    }

    fn node_id(&self) -> Result<String> {
        self.node
            .as_ref()
            .map(|n| n.id.clone())
            .ok_or_else(|| CloudError::Provider("no node was created".to_string()))
    }

    fn finish(self) -> Result<CreateOutcome> {
        if self.request.dry_run {
            return Ok(CreateOutcome::DryRun {
                request: self.launch.unwrap_or_default(),
            });
        }
        match self.node {
            Some(node) => Ok(CreateOutcome::Created {
                node,
                note: self.note,
            }),
            None => Err(CloudError::Provider("no node was created".to_string())),
        }
    }
}

async fn release(lock: Option<LockToken>) -> Result<()> {
    match lock {
        Some(lock) => lock.release().await,
        None => Ok(()),
    }
}

impl NodeManager {
    /// Create a node from a template
    pub async fn create(&mut self, request: CreateRequest) -> Result<CreateOutcome> {
        let name = self.prepare_create(&request)?;
        let mut run = CreateRun::new(request, name);

        let mut state = CreateState::AcquireLock;
        while state != CreateState::Done {
            tracing::debug!("create {}: {}", run.name, state);
            if let Err(err) = self.step(state, &mut run).await {
                return Err(self.rollback(state, &mut run, err).await);
            }
            state = state.next(run.request.dry_run);
        }
        run.finish()
    }

    /// Validate the request and load its parameters; nothing here touches a provider
    fn prepare_create(&mut self, request: &CreateRequest) -> Result<String> {
        if request.volume.is_some() && (request.snapshot.is_some() || request.data_size.is_some()) {
            return Err(CloudError::InvalidParameters(
                "volume provided with snapshot and/or data size".to_string(),
            ));
        }
        let name = self.set_name(&request.name)?;
        match &request.volume {
            Some(volname) => {
                self.set_volname(volname)?;
            }
            None => {
                self.params.remove("volname");
            }
        }
        if let Some(key) = &request.key {
            self.params.setparam("key", key.as_str());
        }
        match &request.snapshot {
            Some(id) => self.params.setparam("snapid", id.as_str()),
            None => {
                self.params.remove("snapid");
            }
        }
        match request.data_size {
            Some(size) => self.params.setparam("datasize", size),
            None => {
                self.params.remove("datasize");
            }
        }
        self.params.setparam("dryrun", request.dry_run);
        Ok(name)
    }

    async fn step(&mut self, state: CreateState, run: &mut CreateRun) -> Result<()> {
        match state {
            CreateState::AcquireLock => {
                run.lock = Some(LockToken::acquire(self.session.lock_service(), CREATE_LOCK).await?);
                Ok(())
            }
            CreateState::Preflight => self.preflight(run).await,
            CreateState::LoadTemplate => self.load_create_template(run).await,
            CreateState::ResolveVolume => self.resolve_volume_strategy(run).await,
            CreateState::BuildRequest => self.build_request(run).await,
            CreateState::DryRunGate => self.dry_run_gate(run).await,
            CreateState::CreateNode => self.create_node(run).await,
            CreateState::PostCreate => self.post_create(run).await,
            CreateState::RaceCheck => self.race_check(run).await,
            CreateState::PublishDns => {
                let node = run
                    .node
                    .clone()
                    .ok_or_else(|| CloudError::Provider("no node was created".to_string()))?;
                self.publish_dns(&node, run.request.wait, &mut run.lock, &mut run.published)
                    .await
            }
            CreateState::Done => Ok(()),
        }
    }

    /// Run the rollback for `state` and return the error to report
    async fn rollback(&mut self, state: CreateState, run: &mut CreateRun, err: CloudError) -> CloudError {
        self.emit(format!("Creating {} failed at {}: {}", run.name, state, err));

        let wait = run.request.wait;
        let result = match state.rollback() {
            Rollback::None => Ok(()),
            Rollback::ReleaseLock => release(run.lock.take()).await,
            Rollback::DiscardInterfaces => {
                let released = release(run.lock.take()).await;
                let interfaces = std::mem::take(&mut run.interfaces);
                let discarded = self.abort(None, interfaces, wait, None).await;
                released.and(discarded)
            }
            Rollback::AbortNode => {
                let node = run.node.take();
                let withdrawn = match &node {
                    Some(node) if !run.published.is_empty() => {
                        let zones = std::mem::take(&mut run.published);
                        self.withdraw_dns(node, &zones).await
                    }
                    _ => Ok(()),
                };
                let interfaces = std::mem::take(&mut run.interfaces);
                let aborted = self
                    .abort(node.as_ref(), interfaces, wait, run.lock.take())
                    .await;
                withdrawn.and(aborted)
            }
        };

        match result {
            Ok(()) => err,
            Err(rollback_err) => {
                tracing::error!(
                    "Rollback of {} after {} failed: {} (original error: {})",
                    run.name,
                    state,
                    rollback_err,
                    err
                );
                rollback_err
            }
        }
    }

    async fn preflight(&mut self, run: &mut CreateRun) -> Result<()> {
        if let Some(node) = self.find_node(&run.name, &NodeState::ACTIVE).await? {
            return Err(CloudError::Conflict(format!(
                "Node {} already exists (id: {})",
                run.name, node.id
            )));
        }

        if self.session.private_zone_id().is_none() {
            return Ok(());
        }
        let fqdn = self.fqdn()?;
        let Some(record) = self
            .session
            .dns()
            .record(&fqdn, DnsZone::Private)
            .await?
            .filter(|r| r.matches(&fqdn))
        else {
            return Ok(());
        };

        match record.record_type.as_str() {
            "A" => {}
            "CNAME" => {
                return Err(CloudError::Unsupported(format!(
                    "CNAME exists for {fqdn}"
                )));
            }
            other => {
                return Err(CloudError::Unsupported(format!(
                    "Unable to handle record type for {fqdn}: {other}"
                )));
            }
        }
        let [private_ip] = record.values.as_slice() else {
            return Err(CloudError::Unsupported(format!(
                "Unable to handle {} value record for {fqdn}",
                record.values.len()
            )));
        };

        tracing::debug!("Checking whether {} -> {} is stale", fqdn, private_ip);
        let filters = [
            Filter::new("private-ip-address", [private_ip.as_str()]),
            state_filter(&NodeState::ACTIVE),
        ];
        let owners = self.session.compute().find_nodes(&filters).await?;
        if !owners.is_empty() {
            let ids: Vec<&str> = owners.iter().map(|n| n.id.as_str()).collect();
            return Err(CloudError::Conflict(format!(
                "Private DNS record for {fqdn} points to existing node {}",
                ids.join(", ")
            )));
        }

        run.stale_ip = Some(private_ip.clone());
        self.emit(format!(
            "Found stale private DNS record {fqdn} -> {private_ip}, ignoring"
        ));
        Ok(())
    }

    async fn load_create_template(&mut self, run: &mut CreateRun) -> Result<()> {
        let name = run.request.template.clone();
        let template = self
            .session
            .load_template(&self.params, &name)
            .await
            .map_err(|e| match e {
                CloudError::Template(_) => e,
                other => CloudError::Template(format!("Loading template {name}: {other}")),
            })?;
        run.template = Some(template);
        Ok(())
    }

    async fn resolve_volume_strategy(&mut self, run: &mut CreateRun) -> Result<()> {
        let mut volume = None;
        if run.request.volume.is_some()
            && let Some(volname) = self.params.get_str("volname")
        {
            self.emit(format!("Looking up volume: {volname}"));
            let found = self
                .find_volume(&volname, &[VolumeState::Available], &[])
                .await?
                .ok_or_else(|| {
                    CloudError::NotFound(format!(
                        "No volume found with Name: {volname} and Status: available"
                    ))
                })?;
            volume = Some(found);
        }

        if let Some(existing) = self
            .find_volume(&run.name, &[VolumeState::Available], &[])
            .await?
        {
            if let Some(explicit) = &volume {
                if explicit.id != existing.id {
                    return Err(CloudError::Conflict(format!(
                        "Launching with volume {} would duplicate the name of existing volume {}; \
                         delete the existing volume or attach it instead",
                        explicit.id, run.name
                    )));
                }
            } else {
                self.emit(format!(
                    "Found existing volume for {}: {}",
                    run.name, existing.id
                ));
            }
            volume = Some(existing);
        }

        if let Some(volume) = &volume
            && let Some(zone) = volume.zone_letter()
        {
            let template = run.template()?;
            if !place_in_zone(&mut template.request, zone) {
                tracing::warn!(
                    "No zone placeholder in the subnet of {}, launching without moving it to the zone of {}",
                    template.name,
                    volume.id
                );
            }
        }
        run.volume = volume;
        Ok(())
    }

    async fn build_request(&mut self, run: &mut CreateRun) -> Result<()> {
        let snapshot = match &run.request.snapshot {
            Some(id) if run.volume.is_none() => Some(self.resolve_snapshot(id).await?),
            _ => None,
        };
        if let Some(snapshot) = &snapshot {
            self.emit(format!(
                "Launching with data volume from snapshot {} for {} created: {}",
                snapshot.id,
                snapshot.tag("Name").unwrap_or("(unnamed)"),
                snapshot
                    .start_time
                    .with_timezone(&chrono::Local)
                    .format("%F|%R")
            ));
        }

        let reuse_volume = run.volume.is_some();
        let data_size = run.request.data_size;
        let dry_run = run.request.dry_run;
        let name = run.name.clone();
        let template = run.template()?;

        prune_block_devices(
            &mut template.request,
            reuse_volume,
            snapshot.as_ref().map(|s| s.id.as_str()),
            data_size,
        );

        let resolver = self.session.resolver(&self.params);
        resolver.resolve_vars(&mut template.request).await?;
        normalize_keys(&mut template.request);
        if let Some(tags) = template.tags.as_mut() {
            resolver.resolve_vars(tags).await?;
        }
        for iface in template.additional_interfaces.iter_mut() {
            resolver.resolve_vars(iface).await?;
            normalize_keys(iface);
        }

        let mut tags = self.session.config().tags().clone();
        tags.insert("Name", name.clone());
        tags.insert("Domain", self.session.domain()?);
        let group_tags = tags.api_tags();
        if let Some(extra) = &template.tags {
            let extra = TagSet::from_value(extra).map_err(|e| {
                CloudError::Template(format!("template {} tags: {e}", template.name))
            })?;
            tags.add(&extra);
        }
        let instance_tags = tags.clone();
        tags.insert("InstanceName", name.clone());
        let volume_tags = tags;

        if template.private_sg {
            if dry_run {
                self.emit(format!(
                    "Dry run, not creating private security group {name}"
                ));
            } else {
                self.create_private_group(&name, &mut template.request, &group_tags)
                    .await?;
            }
        }

        let request = &mut template.request;
        if let Some(Value::Scalar(Scalar::Str(user_data))) = request.get_mut("user_data") {
            *user_data = STANDARD.encode(user_data.as_bytes());
        }
        if !self.session.config().defers_tagging()
            && let Some(map) = request.as_mapping_mut()
        {
            map.insert(
                "tag_specifications".to_string(),
                Value::Sequence(vec![
                    tag_specification("instance", &instance_tags),
                    tag_specification("volume", &volume_tags),
                ]),
            );
        }

        let launch = request.to_json();
        run.launch = Some(launch);
        run.instance_tags = instance_tags.api_tags();
        run.volume_tags = volume_tags.api_tags();
        Ok(())
    }

    /// Security group of the node's own, replacing any orphan of the same name
    async fn create_private_group(&self, name: &str, request: &mut Value, tags: &[Tag]) -> Result<()> {
        let compute = self.session.compute();

        let interface_subnet = first_interface(request)
            .and_then(|i| i.get("subnet_id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let subnet = match &interface_subnet {
            Some(subnet) => subnet.clone(),
            None => request
                .get("subnet_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    CloudError::Template(
                        "Unable to identify a subnet/VPC for creating the private security group"
                            .to_string(),
                    )
                })?,
        };

        let vpc_id = compute.subnet_vpc(&subnet).await?;
        for orphan in compute.find_security_groups(&vpc_id, name).await? {
            self.emit(format!(
                "Deleting orphaned private security group {name} ({})",
                orphan.id
            ));
            compute.delete_security_group(&orphan.id).await?;
        }

        tracing::debug!("Creating private security group {}", name);
        let group = compute
            .create_security_group(name, &format!("Private security group for {name}"), &vpc_id)
            .await?;
        compute
            .tag_resources(std::slice::from_ref(&group.id), tags)
            .await?;

        let (holder, key) = match interface_subnet {
            Some(_) => (first_interface_mut(request), "groups"),
            None => (Some(request), "security_group_ids"),
        };
        if let Some(holder) = holder {
            append(holder, key, Value::str(group.id));
        }
        Ok(())
    }

    async fn dry_run_gate(&mut self, run: &mut CreateRun) -> Result<()> {
        if !run.request.dry_run {
            return Ok(());
        }
        let launch = run.launch.clone().unwrap_or_default();
        self.emit(format!("Dry run, creating: {launch}"));
        release(run.lock.take()).await
    }

    async fn create_node(&mut self, run: &mut CreateRun) -> Result<()> {
        let compute = self.session.compute();

        let specs: Vec<serde_json::Value> = run
            .template()?
            .additional_interfaces
            .iter()
            .map(Value::to_json)
            .collect();
        for spec in &specs {
            let iface = compute.create_interface(spec).await?;
            tracing::debug!("Created network interface {}", iface.id);
            run.interfaces.push(iface);
        }

        let launch = run
            .launch
            .as_ref()
            .ok_or_else(|| CloudError::Template("no launch request was built".to_string()))?;
        self.emit(format!("Creating node {}", run.name));
        let node = compute.create_node(launch).await.map_err(|e| match e {
            CloudError::Provider(_) => e,
            other => CloudError::Provider(format!("Creating node {}: {other}", run.name)),
        })?;
        run.node = Some(node);
        Ok(())
    }

    async fn post_create(&mut self, run: &mut CreateRun) -> Result<()> {
        let compute = self.session.compute();
        let storage = self.session.storage();
        let node_id = run.node_id()?;

        self.emit(format!(
            "Created node {} (id: {node_id}), waiting for it to enter state running ...",
            run.name
        ));
        compute.wait_node(&node_id, NodeState::Running).await?;
        self.emit("Running");

        let mut device_index = 1;
        while let Some(iface) = run.interfaces.first() {
            self.emit(format!(
                "Attaching additional interface #{device_index} to {node_id}"
            ));
            compute
                .attach_interface(&iface.id, &node_id, device_index)
                .await?;
            run.interfaces.remove(0);
            device_index += 1;
        }

        if let Some(volume) = &run.volume {
            if volume.state != VolumeState::Available {
                return Err(CloudError::Attach(format!(
                    "Data volume {} not in state 'available'",
                    volume.id
                )));
            }
            self.emit(format!("Attaching data volume: {}", volume.id));
            storage
                .attach_volume(&volume.id, &node_id, DATA_DEVICE)
                .await
                .map_err(|e| {
                    CloudError::Attach(format!("Unable to attach volume {}: {e}", volume.id))
                })?;
            storage.wait_volume(&volume.id, VolumeState::InUse).await?;
            run.note = Some("Used existing volume".to_string());
        }

        let node = compute.node(&node_id).await?;
        run.node = Some(node.clone());
        if self.session.config().defers_tagging() {
            self.tag_node(&node, &run.instance_tags, &run.volume_tags)
                .await?;
        }
        Ok(())
    }

    /// Fail when a private record for the node appeared, or a stale one
    /// changed, while the node was launching
    async fn race_check(&mut self, run: &mut CreateRun) -> Result<()> {
        if self.session.private_zone_id().is_none() {
            return Ok(());
        }
        let fqdn = self.fqdn()?;
        let values = self.session.dns().lookup(&fqdn, DnsZone::Private).await?;
        let unchanged = match &run.stale_ip {
            Some(stale_ip) => values.is_empty() || values == std::slice::from_ref(stale_ip),
            None => values.is_empty(),
        };
        if !unchanged {
            return Err(CloudError::Conflict(format!(
                "DNS record for {} created during launch",
                run.name
            )));
        }
        Ok(())
    }
}

fn is_boot_device(device_name: &str) -> bool {
    device_name.ends_with('a') || device_name.ends_with("a1")
}

/// Adjust data-volume block devices for the chosen volume strategy
fn prune_block_devices(
    request: &mut Value,
    reuse_volume: bool,
    snapshot_id: Option<&str>,
    data_size: Option<i64>,
) {
    let Some(map) = request.as_mapping_mut() else {
        return;
    };
    let empty = match map.get_mut("block_device_mappings") {
        Some(Value::Sequence(devices)) => {
            devices.retain_mut(|device| {
                let boot = device
                    .get("device_name")
                    .and_then(Value::as_str)
                    .is_some_and(is_boot_device);
                if boot {
                    return true;
                }
                if reuse_volume {
                    return false;
                }
                if let Some(ebs) = device.get_mut("ebs").and_then(Value::as_mapping_mut) {
                    match snapshot_id {
                        Some(id) => {
                            ebs.remove("encrypted");
                            ebs.insert("snapshot_id".to_string(), Value::str(id));
                        }
                        None => {
                            ebs.remove("snapshot_id");
                        }
                    }
                    if let Some(size) = data_size {
                        ebs.insert("volume_size".to_string(), Value::Scalar(Scalar::Int(size)));
                    }
                    if ebs.get("volume_type").and_then(Value::as_str) != Some("io1") {
                        ebs.remove("iops");
                    }
                }
                true
            });
            devices.is_empty()
        }
        _ => return,
    };
    if empty {
        map.remove("block_device_mappings");
    }
}

/// Point the request's subnet reference at `zone`; false when it has no placeholder
fn place_in_zone(request: &mut Value, zone: char) -> bool {
    let subnet = if request.get("subnet_id").is_some() {
        request.get_mut("subnet_id")
    } else {
        first_interface_mut(request).and_then(|i| i.get_mut("subnet_id"))
    };
    let Some(Value::Scalar(Scalar::Str(subnet))) = subnet else {
        return false;
    };
    if !ZONE_PLACEHOLDER.is_match(subnet) {
        return false;
    }

    let placed = ZONE_PLACEHOLDER
        .replace(subnet, format!("#{zone}").as_str())
        .into_owned();
    tracing::debug!("Setting node location to {} to match the existing volume", placed);
    *subnet = placed;
    true
}

fn first_interface(request: &Value) -> Option<&Value> {
    request
        .get("network_interfaces")
        .and_then(Value::as_sequence)
        .and_then(|s| s.first())
}

fn first_interface_mut(request: &mut Value) -> Option<&mut Value> {
    request
        .get_mut("network_interfaces")
        .and_then(Value::as_sequence_mut)
        .and_then(|s| s.first_mut())
}

/// Push onto the list under `key`, creating it when missing
fn append(holder: &mut Value, key: &str, item: Value) {
    let Some(map) = holder.as_mapping_mut() else {
        return;
    };
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Sequence(Vec::new()));
    match entry {
        Value::Sequence(items) => items.push(item),
        other => {
            let previous = std::mem::replace(other, Value::Sequence(Vec::new()));
            if let Value::Sequence(items) = other {
                if !previous.is_null() {
                    items.push(previous);
                }
                items.push(item);
            }
        }
    }
}

fn tag_specification(resource_type: &str, tags: &TagSet) -> Value {
    let mut spec = nodeflow_core::Mapping::new();
    spec.insert("resource_type".to_string(), Value::str(resource_type));
    spec.insert("tags".to_string(), tags.lower_value());
    Value::Mapping(spec)
}
