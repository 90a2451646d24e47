//! ---
//! irri_section: "02-messaging-data-model"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Message schema and transport contracts."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Errors surfaced by a command publisher.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The transport is disconnected or rejected the message.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    /// The publish did not complete within the configured bound.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound side of the device channel.
///
/// Implementations must bound every publish by a timeout; callers treat any
/// error as at-most-once delivery having failed and own the retry decision.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publish a payload to the given topic.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

/// Inbound side of the device channel.
///
/// The transport adapter invokes this for every message delivered on a
/// subscribed topic. Implementations must stay within a bounded amount of
/// work and must never panic into the transport task.
pub trait TelemetrySink: Send + Sync {
    /// Handle one inbound message.
    fn on_message(&self, topic: &str, payload: &[u8]);
}

/// In-memory publisher for tests and single-process integration.
#[derive(Clone, Default)]
pub struct InMemoryPublisher {
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryPublisher {
    /// Create a new recording publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with [`PublishError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot the recorded `(topic, payload)` pairs.
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// Drain and return the recorded messages.
    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl CommandPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("in-memory fault injected".into()));
        }
        self.sent.lock().push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_publisher_records_messages() {
        let publisher = InMemoryPublisher::new();
        publisher
            .publish("irricore/d1/command", b"{\"action\":\"valve_on\"}")
            .await
            .unwrap();
        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "irricore/d1/command");
    }

    #[tokio::test]
    async fn fault_injection_surfaces_unavailable() {
        let publisher = InMemoryPublisher::new();
        publisher.set_failing(true);
        let err = publisher
            .publish("irricore/d1/command", b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Unavailable(_)));
        assert!(publisher.sent().is_empty());
    }
}
