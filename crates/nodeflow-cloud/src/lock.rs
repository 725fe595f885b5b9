//! Named mutual exclusion
//!
//! `LockService` is the acquire/release contract; `FileLockService` keeps one
//! JSON lock file per name under a lock directory.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_STALE_AFTER_HOURS: i64 = 1;

/// Process-wide named lock
#[async_trait]
pub trait LockService: Send + Sync {
    /// Block until `name` is held by this process
    async fn acquire(&self, name: &str) -> Result<()>;

    async fn release(&self, name: &str) -> Result<()>;
}

/// A held lock. Consumed by `release`, so it can be released at most once.
pub struct LockToken {
    service: Arc<dyn LockService>,
    name: String,
    released: bool,
}

impl LockToken {
    pub async fn acquire(service: Arc<dyn LockService>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        service.acquire(&name).await?;
        tracing::debug!("Acquired lock {}", name);
        Ok(Self {
            service,
            name,
            released: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.service.release(&self.name).await?;
        tracing::debug!("Released lock {}", self.name);
        Ok(())
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!("Lock {} dropped while still held", self.name);
        }
    }
}

impl std::fmt::Debug for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockToken")
            .field("name", &self.name)
            .field("released", &self.released)
            .finish()
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// File-backed lock service
pub struct FileLockService {
    lock_dir: PathBuf,
    poll_interval: Duration,
    stale_after: ChronoDuration,
}

impl FileLockService {
    pub fn new(lock_dir: impl AsRef<Path>) -> Self {
        Self {
            lock_dir: lock_dir.as_ref().to_path_buf(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: ChronoDuration::hours(DEFAULT_STALE_AFTER_HOURS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: ChronoDuration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.lock_dir.join(format!("{name}.lock"))
    }

    /// Try once; `Ok(false)` when another holder owns a fresh lock
    async fn try_acquire(&self, name: &str) -> Result<bool> {
        let path = self.lock_path(name);
        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                let content = serde_json::to_string_pretty(&info)?;
                file.write_all(content.as_bytes()).await?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let Some((holder, acquired_at)) = self.current_holder(&path).await? else {
                    return Ok(false);
                };
                let age = Utc::now().signed_duration_since(acquired_at);
                if age >= self.stale_after {
                    tracing::warn!(
                        "Removing stale lock {} held by {} since {}",
                        name,
                        holder,
                        acquired_at
                    );
                    fs::remove_file(&path).await?;
                }
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Holder and acquisition time of an existing lock file; `None` once it
    /// is gone. A body that does not parse yet is still being written by its
    /// holder, so it is dated by the file's modification time.
    async fn current_holder(&self, path: &Path) -> Result<Option<(String, DateTime<Utc>)>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if let Ok(info) = serde_json::from_str::<LockInfo>(&content) {
            return Ok(Some((info.holder, info.acquired_at)));
        }

        let modified = match fs::metadata(path).await {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Lock file {} has no readable body yet", path.display());
        Ok(Some(("unknown".to_string(), DateTime::<Utc>::from(modified))))
    }
}

#[async_trait]
impl LockService for FileLockService {
    async fn acquire(&self, name: &str) -> Result<()> {
        fs::create_dir_all(&self.lock_dir).await?;
        loop {
            if self.try_acquire(name).await? {
                return Ok(());
            }
            tracing::debug!("Lock {} is held, waiting", name);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn release(&self, name: &str) -> Result<()> {
        let path = self.lock_path(name);
        if !path.exists() {
            return Err(CloudError::Lock(format!("Lock {name} is not held")));
        }
        fs::remove_file(&path).await?;
        Ok(())
    }
}
