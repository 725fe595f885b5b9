//! Volume and snapshot operations

use super::NodeManager;
use nodeflow_cloud::{CloudError, Filter, Result, Snapshot, Tag, Volume, VolumeState};
use serde_json::json;

/// Tag recording why a snapshot was taken
pub const SNAPSHOT_TYPE_TAG: &str = "SnapshotType";

/// Tag keys reserved by the provider; never copied onto snapshots
const RESERVED_TAG_PREFIX: &str = "aws:";

/// Parameters of `create_volume`
#[derive(Debug, Clone, Default)]
pub struct CreateVolumeRequest {
    pub name: String,
    /// Size in GiB; taken from the snapshot when absent
    pub size: Option<i64>,
    /// Availability zone, e.g. `us-east-1c`
    pub zone: String,
    pub snapshot: Option<String>,
    pub volume_type: Option<String>,
    pub wait: bool,
}

impl NodeManager {
    pub async fn create_volume(&mut self, request: CreateVolumeRequest) -> Result<Volume> {
        let name = self.set_volname(&request.name)?;
        if let Some(existing) = self
            .find_volume(&name, &[VolumeState::Available, VolumeState::InUse], &[])
            .await?
        {
            return Err(CloudError::Conflict(format!(
                "Volume {name} already exists ({})",
                existing.id
            )));
        }
        if request.size.is_none() && request.snapshot.is_none() {
            return Err(CloudError::InvalidParameters(format!(
                "Volume {name} needs a size or a snapshot"
            )));
        }

        let mut tags = self.session.config().tags().clone();
        tags.insert("Name", name.clone());
        tags.insert("Domain", self.session.domain()?);

        let mut spec = json!({
            "availability_zone": request.zone,
            "volume_type": request.volume_type.as_deref().unwrap_or("gp3"),
            "tag_specifications": [
                {"resource_type": "volume", "tags": tags.lower_value().to_json()}
            ],
        });
        if let Some(size) = request.size {
            spec["size"] = json!(size);
        }
        if let Some(snapshot) = &request.snapshot {
            let snapshot = self.resolve_snapshot(snapshot).await?;
            spec["snapshot_id"] = json!(snapshot.id);
        }

        self.emit(format!("Creating volume {name} in {}", request.zone));
        let storage = self.session.storage();
        let volume = storage.create_volume(&spec).await?;
        if request.wait {
            self.emit(format!("Waiting for {} to become available", volume.id));
            storage.wait_volume(&volume.id, VolumeState::Available).await?;
            self.emit("Available");
        }
        Ok(volume)
    }

    /// Delete an available volume by name
    pub async fn delete_volume(&mut self, volname: &str, wait: bool) -> Result<()> {
        let volname = self.set_volname(volname)?;
        let volume = self
            .find_volume(&volname, &[VolumeState::Available], &[])
            .await?
            .ok_or_else(|| {
                CloudError::NotFound(format!(
                    "No volume found with Name: {volname} and Status: available"
                ))
            })?;

        self.emit(format!("Deleting volume {volname} ({})", volume.id));
        let storage = self.session.storage();
        storage.delete_volume(&volume.id).await?;
        if wait {
            storage.wait_volume(&volume.id, VolumeState::Deleted).await?;
            self.emit("Deleted");
        }
        Ok(())
    }

    /// Volumes of this domain
    pub async fn list_volumes(&self) -> Result<Vec<Volume>> {
        let filters = [self.domain_filter()?];
        self.session.storage().find_volumes(&filters).await
    }

    /// Snapshot a volume by name: the available volume, else the attached
    /// data volume. Tags are carried over and `SnapshotType` records `kind`.
    pub async fn create_snapshot(&mut self, volname: &str, wait: bool, kind: &str) -> Result<Snapshot> {
        let volname = self.set_volname(volname)?;
        let volume = match self
            .find_volume(&volname, &[VolumeState::Available], &[])
            .await?
        {
            Some(volume) => volume,
            None => self.find_attached_volume(&volname).await?.ok_or_else(|| {
                CloudError::NotFound(format!(
                    "No available or attached data volume with Name: {volname}"
                ))
            })?,
        };

        let mut tags: Vec<Tag> = volume
            .tags
            .iter()
            .filter(|t| !t.key.starts_with(RESERVED_TAG_PREFIX) && t.key != SNAPSHOT_TYPE_TAG)
            .cloned()
            .collect();
        tags.push(Tag::new(SNAPSHOT_TYPE_TAG, kind));

        self.emit(format!("Creating {kind} snapshot of {volname} ({})", volume.id));
        let storage = self.session.storage();
        let snapshot = storage.create_snapshot(&volume.id).await?;
        self.session
            .compute()
            .tag_resources(std::slice::from_ref(&snapshot.id), &tags)
            .await?;

        if wait {
            self.emit(format!("Waiting for snapshot {} to complete", snapshot.id));
            storage.wait_snapshot_completed(&snapshot.id).await?;
            self.emit("Snapshot completed");
        }
        Ok(Snapshot { tags, ..snapshot })
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let snapshot = self.resolve_snapshot(snapshot_id).await?;
        self.emit(format!("Deleting snapshot {}", snapshot.id));
        self.session.storage().delete_snapshot(&snapshot.id).await
    }

    /// Snapshots of this domain, newest first, optionally narrowed by volume
    /// name and snapshot type
    pub async fn list_snapshots(&self, name: Option<&str>, kind: Option<&str>) -> Result<Vec<Snapshot>> {
        let mut filters = vec![self.domain_filter()?];
        if let Some(name) = name {
            let domain = self.session.domain()?;
            filters.push(Filter::tag("Name", nodeflow_core::normalize_name(name, &domain)));
        }
        if let Some(kind) = kind {
            filters.push(Filter::tag(SNAPSHOT_TYPE_TAG, kind));
        }
        let mut snapshots = self.session.storage().find_snapshots(&filters).await?;
        snapshots.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(snapshots)
    }
}
