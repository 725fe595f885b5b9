//! nodeflow
//!
//! Node-lifecycle orchestration on top of the resolution engine in
//! `nodeflow-core` and the provider traits in `nodeflow-cloud`.
//!
//! ```text
//! Session (config, providers, caches)
//!    │
//!    ▼
//! NodeManager ── create (locked state machine, rollback)
//!    │        ── start / stop / reboot / terminate
//!    │        ── volumes / snapshots / DNS
//!    ▼
//! Progress (ordered, human-readable lines)
//! ```

pub mod lifecycle;
pub mod progress;
pub mod session;

pub use lifecycle::{
    CREATE_LOCK, CreateOutcome, CreateRequest, CreateState, CreateVolumeRequest, NodeManager,
    Rollback, SNAPSHOT_TYPE_TAG, TerminateOutcome,
};
pub use progress::Progress;
pub use session::{Providers, Session};
