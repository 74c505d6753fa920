//! Message fan-out.
//!
//! A publish resolves the consumer set once, stores the payload and a
//! read counter sized to that set, then pushes the message key onto
//! each consumer's queue. There is no multi-key atomicity: a crash
//! between those steps can leave a partial fan-out, which is within
//! the at-least-once contract.

use crate::Result;
use crate::retry::with_retry;
use reliq_config::RetryPolicy;
use reliq_core::{Action, Identity, MessageKey, keys};
use reliq_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn Store>,
    identity: Identity,
    message_ttl: Option<Duration>,
    retry: RetryPolicy,
}

impl Publisher {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        identity: Identity,
        message_ttl: Option<Duration>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            identity,
            message_ttl,
            retry,
        }
    }

    /// Publish one message of `action` to every registered consumer.
    ///
    /// The producer's own identity is filtered out before the read
    /// counter is sized, so subscribing to yourself neither delivers to
    /// you nor skews the counter. With no remaining consumers the
    /// message is dropped without storing anything and `Ok(None)` is
    /// returned.
    pub async fn publish(&self, action: &Action, payload: &[u8]) -> Result<Option<MessageKey>> {
        let set_key = keys::consumer_set(&self.identity, action);
        let members = with_retry(&self.retry, "publish.consumers", || {
            self.store.set_members(&set_key)
        })
        .await?;

        let consumers: Vec<Identity> = members
            .into_iter()
            .filter(|m| m != self.identity.as_str())
            .map(Identity::new)
            .collect();

        if consumers.is_empty() {
            warn!(
                "No consumers registered for '{}' from '{}', dropping message",
                action, self.identity
            );
            return Ok(None);
        }

        let key = MessageKey::generate(action);
        let payload_key = keys::payload(&self.identity, &key);
        let reads_key = keys::reads(&self.identity, &key);
        let reads = consumers.len().to_string();

        with_retry(&self.retry, "publish.payload", || {
            self.store.set(&payload_key, payload, self.message_ttl)
        })
        .await?;
        with_retry(&self.retry, "publish.reads", || {
            self.store.set(&reads_key, reads.as_bytes(), None)
        })
        .await?;

        for consumer in &consumers {
            let queue = keys::fanout_queue(&self.identity, consumer);
            with_retry(&self.retry, "publish.enqueue", || {
                self.store.list_push(&queue, key.as_str())
            })
            .await?;
            debug!("Enqueued '{}' for consumer '{}'", key, consumer);
        }

        info!(
            "Published '{}' to {} consumer(s)",
            key,
            consumers.len()
        );
        Ok(Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reliq_store::MemoryStore;

    fn publisher_over(store: &MemoryStore, identity: &str) -> Publisher {
        Publisher::new(
            Arc::new(store.clone()),
            Identity::new(identity),
            Some(Duration::from_secs(86400)),
            RetryPolicy::default().jitter(false),
        )
    }

    async fn register(store: &MemoryStore, set_key: &str, members: &[&str]) {
        for member in members {
            store.set_add(set_key, member).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_all_consumers() {
        let store = MemoryStore::new();
        register(&store, "a.order.created.consumers", &["b", "c"]).await;
        let fixture = publisher_over(&store, "a");

        let key = fixture
            .publish(&Action::new("order.created"), b"{\"id\":1}")
            .await
            .unwrap()
            .unwrap();

        let payload = store
            .get(&format!("a.message.{}", key.as_str()))
            .await
            .unwrap();
        assert_eq!(payload, Some(b"{\"id\":1}".to_vec()));

        let reads = store
            .get(&format!("a.reads.{}", key.as_str()))
            .await
            .unwrap();
        assert_eq!(reads, Some(b"2".to_vec()));

        for consumer in ["b", "c"] {
            let queue = store
                .list_range(&format!("a.{consumer}.message"))
                .await
                .unwrap();
            assert_eq!(queue, vec![key.as_str().to_string()]);
        }
    }

    #[tokio::test]
    async fn test_publish_excludes_self_from_counter_and_fanout() {
        let store = MemoryStore::new();
        register(&store, "a.order.created.consumers", &["a", "b"]).await;
        let fixture = publisher_over(&store, "a");

        let key = fixture
            .publish(&Action::new("order.created"), b"x")
            .await
            .unwrap()
            .unwrap();

        let reads = store
            .get(&format!("a.reads.{}", key.as_str()))
            .await
            .unwrap();
        assert_eq!(reads, Some(b"1".to_vec()));
        assert!(store.list_range("a.a.message").await.unwrap().is_empty());
        assert_eq!(store.list_range("a.b.message").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_consumers_stores_nothing() {
        let store = MemoryStore::new();
        let fixture = publisher_over(&store, "a");

        let actual = fixture
            .publish(&Action::new("order.created"), b"x")
            .await
            .unwrap();
        assert_eq!(actual, None);
    }

    #[tokio::test]
    async fn test_publish_to_only_self_stores_nothing() {
        let store = MemoryStore::new();
        register(&store, "a.order.created.consumers", &["a"]).await;
        let fixture = publisher_over(&store, "a");

        let actual = fixture
            .publish(&Action::new("order.created"), b"x")
            .await
            .unwrap();
        assert_eq!(actual, None);
    }

    #[tokio::test]
    async fn test_publish_preserves_fifo_order() {
        let store = MemoryStore::new();
        register(&store, "a.order.created.consumers", &["b"]).await;
        let fixture = publisher_over(&store, "a");
        let action = Action::new("order.created");

        let first = fixture.publish(&action, b"1").await.unwrap().unwrap();
        let second = fixture.publish(&action, b"2").await.unwrap().unwrap();

        // Tail-pop order: first published is dequeued first
        let actual = store.pop_push("a.b.message", "b.dequeued").await.unwrap();
        assert_eq!(actual, Some(first.as_str().to_string()));
        let actual = store.pop_push("a.b.message", "b.dequeued").await.unwrap();
        assert_eq!(actual, Some(second.as_str().to_string()));
    }
}
