//! Progress channel
//!
//! Long-running operations report what they are doing as ordered,
//! human-readable lines. Errors never travel through here; they are
//! returned separately.

use tokio::sync::mpsc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Caller-supplied progress sink
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl Progress {
    /// A sink plus the receiving end the caller drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only logs
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn emit(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        if let Some(tx) = &self.tx {
            let line = format!("{} {}", chrono::Local::now().format(TIMESTAMP_FORMAT), message);
            // A caller that dropped its receiver just stops seeing progress
            let _ = tx.send(line);
        }
    }
}
