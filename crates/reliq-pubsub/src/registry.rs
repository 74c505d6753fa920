use crate::Result;
use crate::retry::with_retry;
use reliq_config::RetryPolicy;
use reliq_core::{Action, Identity, keys};
use reliq_store::Store;
use std::sync::Arc;
use tracing::{debug, info};

/// Consumer-set registration.
///
/// Registration is durable store state, shared by every process that
/// talks to the same store: once a consumer is in the set, all future
/// publishes of that action fan out to it, whether or not the consumer
/// is currently running.
pub struct Registry {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl Registry {
    pub(crate) fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Add `consumer` to the consumer set for `(producer, action)`.
    ///
    /// Idempotent; registering an already-present consumer is not an
    /// error. Does not start delivery.
    pub async fn subscribe(
        &self,
        producer: &Identity,
        action: &Action,
        consumer: &Identity,
    ) -> Result<()> {
        let set_key = keys::consumer_set(producer, action);
        let added = with_retry(&self.retry, "registry.subscribe", || {
            self.store.set_add(&set_key, consumer.as_str())
        })
        .await?;

        if added {
            info!(
                "Registered '{}' as consumer of '{}' from '{}'",
                consumer, action, producer
            );
        } else {
            debug!(
                "'{}' already registered as consumer of '{}' from '{}'",
                consumer, action, producer
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reliq_store::MemoryStore;

    fn registry_over(store: &MemoryStore) -> Registry {
        Registry::new(
            Arc::new(store.clone()),
            RetryPolicy::default().jitter(false),
        )
    }

    #[tokio::test]
    async fn test_subscribe_adds_to_consumer_set() {
        let store = MemoryStore::new();
        let fixture = registry_over(&store);

        fixture
            .subscribe(
                &Identity::new("a"),
                &Action::new("order.created"),
                &Identity::new("b"),
            )
            .await
            .unwrap();

        let actual = store.set_members("a.order.created.consumers").await.unwrap();
        assert_eq!(actual, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let store = MemoryStore::new();
        let fixture = registry_over(&store);
        let producer = Identity::new("a");
        let action = Action::new("order.created");
        let consumer = Identity::new("b");

        fixture
            .subscribe(&producer, &action, &consumer)
            .await
            .unwrap();
        fixture
            .subscribe(&producer, &action, &consumer)
            .await
            .unwrap();

        let actual = store.set_members("a.order.created.consumers").await.unwrap();
        assert_eq!(actual.len(), 1);
    }
}
