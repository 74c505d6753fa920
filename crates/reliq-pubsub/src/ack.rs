//! Acknowledgment and read-counter garbage collection.
//!
//! Each delivered message carries an [`AckHandle`]. Acking removes the
//! message key from the consumer's in-flight record, decrements the
//! shared read counter, and deletes the payload when the counter reaches
//! zero. The in-flight removal doubles as the idempotency guard: a
//! removed count of zero means this delivery was already acknowledged,
//! so the counter is left untouched.

use crate::retry::with_retry;
use crate::{PubSubError, Result};
use reliq_config::RetryPolicy;
use reliq_core::MessageKey;
use reliq_store::Store;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Single-use acknowledgment for one delivered message.
///
/// Duplicate `ack` calls are harmless no-ops. Clones refer to the same
/// delivery, so a handle can be moved into a spawned task.
#[derive(Clone)]
pub struct AckHandle {
    store: Arc<dyn Store>,
    message_key: MessageKey,
    record_key: String,
    payload_key: String,
    reads_key: String,
    retry: RetryPolicy,
    /// Set once the loop may dequeue again (per-instance policy only)
    release: Option<Arc<Notify>>,
    released: Arc<AtomicBool>,
}

impl AckHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<dyn Store>,
        message_key: MessageKey,
        record_key: String,
        payload_key: String,
        reads_key: String,
        retry: RetryPolicy,
        release: Option<Arc<Notify>>,
    ) -> Self {
        Self {
            store,
            message_key,
            record_key,
            payload_key,
            reads_key,
            retry,
            release,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The key of the message this handle acknowledges
    pub fn message_key(&self) -> &MessageKey {
        &self.message_key
    }

    /// Acknowledge the delivery.
    ///
    /// 1. Remove the key from the in-flight record; zero removed means a
    ///    duplicate ack and stops here.
    /// 2. Decrement the read counter, retrying without bound: a dropped
    ///    decrement would leak the message until its TTL.
    /// 3. The acker that observes the counter hit zero deletes the
    ///    payload and the counter. The decrement is atomic, so exactly
    ///    one acker sees zero.
    pub async fn ack(&self) -> Result<()> {
        let result = self.acknowledge().await;
        self.release_loop();
        result
    }

    async fn acknowledge(&self) -> Result<()> {
        let removed = with_retry(&self.retry, "ack.remove_in_flight", || {
            self.store
                .list_remove(&self.record_key, self.message_key.as_str())
        })
        .await
        .map_err(PubSubError::from)?;

        if removed == 0 {
            debug!(
                "Message '{}' already acknowledged, nothing to do",
                self.message_key
            );
            return Ok(());
        }

        let unbounded = self.retry.clone().unbounded();
        let remaining = with_retry(&unbounded, "ack.decrement_reads", || {
            self.store.decrement(&self.reads_key)
        })
        .await
        .map_err(PubSubError::from)?;

        if remaining == 0 {
            debug!(
                "Last acknowledgment for '{}', deleting payload and counter",
                self.message_key
            );
            with_retry(&self.retry, "ack.delete_payload", || {
                self.store.delete(&self.payload_key)
            })
            .await
            .map_err(PubSubError::from)?;
            with_retry(&self.retry, "ack.delete_reads", || {
                self.store.delete(&self.reads_key)
            })
            .await
            .map_err(PubSubError::from)?;
        } else if remaining < 0 {
            // Cannot happen through this protocol; an external writer
            // touched the counter.
            warn!(
                "Read counter for '{}' went negative ({})",
                self.message_key, remaining
            );
        }

        Ok(())
    }

    /// Let the delivery loop dequeue the next message. Fired at most
    /// once per delivery even when ack is called repeatedly.
    fn release_loop(&self) {
        if let Some(release) = &self.release
            && !self.released.swap(true, Ordering::SeqCst)
        {
            release.notify_one();
        }
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("message_key", &self.message_key)
            .field("record_key", &self.record_key)
            .finish_non_exhaustive()
    }
}
