//! nodeflow cloud abstraction
//!
//! This crate defines what the node-lifecycle orchestrator needs from the
//! outside world, without binding to any particular SDK:
//!
//! - resource handles returned by providers (nodes, volumes, snapshots, ...)
//! - provider traits for compute, block storage, DNS and stack outputs
//! - a named, process-wide lock service and a file-backed implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  nodeflow                        │
//! │        (create / start / stop / terminate)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               nodeflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  ComputeProvider  StorageProvider         │   │
//! │  │  DnsFacade        OutputProvider          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Handles    │  │ LockService  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  SDK adapters │ │  lock backend │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod lock;
pub mod model;
pub mod provider;

// Re-exports
pub use error::{CloudError, Result};
pub use lock::{FileLockService, LockService, LockToken};
pub use model::{
    Attachment, BlockDevice, DnsRecord, DnsZone, Filter, NetworkInterface, Node, NodeState,
    SecurityGroup, Snapshot, SnapshotState, Tag, Volume, VolumeState,
};
pub use provider::{ComputeProvider, DnsFacade, OutputProvider, StorageProvider};
