//! The per-producer delivery loop.
//!
//! One loop runs per distinct subscribed producer and carries every
//! action from that producer. Each iteration atomically pops the oldest
//! message key from the fan-out queue onto the in-flight record, fetches
//! the payload, and invokes the handler. The in-flight record scoping
//! and the re-arm timing depend on the configured [`DeliveryPolicy`]:
//!
//! - `SharedRecoverable`: the record is shared across restarts of this
//!   consumer identity. The loop re-arms right after the handler
//!   returns, and on startup replays whatever a previous run left on the
//!   record before dequeuing anything new.
//! - `PerInstance`: the record is scoped to this process. The loop does
//!   not dequeue again until the delivered message is acknowledged,
//!   giving backpressure and making concurrent instances safe.

use crate::ack::AckHandle;
use crate::retry::{delay_for_attempt, with_retry};
use crate::types::{Delivery, ErrorHandler, Handler};
use reliq_config::{DeliveryPolicy, RetryPolicy};
use reliq_core::{Identity, InstanceTag, MessageKey, Topic, keys};
use reliq_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

pub(crate) struct DeliveryLoop {
    /// Handle for payload fetches and acknowledgments
    store: Arc<dyn Store>,
    /// Dedicated handle parked on the blocking dequeue, so it cannot
    /// starve publish and ack traffic
    blocking: Arc<dyn Store>,
    producer: Identity,
    consumer: Identity,
    policy: DeliveryPolicy,
    queue_key: String,
    record_key: String,
    retry: RetryPolicy,
    handler: Arc<dyn Handler>,
    errors: ErrorHandler,
    shutdown: watch::Receiver<bool>,
    /// Ack gate for the per-instance policy
    release: Arc<Notify>,
}

impl DeliveryLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<dyn Store>,
        blocking: Arc<dyn Store>,
        producer: Identity,
        consumer: Identity,
        policy: DeliveryPolicy,
        instance_tag: &InstanceTag,
        retry: RetryPolicy,
        handler: Arc<dyn Handler>,
        errors: ErrorHandler,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let queue_key = keys::fanout_queue(&producer, &consumer);
        let record_key = match policy {
            DeliveryPolicy::SharedRecoverable => keys::dequeued(&consumer),
            DeliveryPolicy::PerInstance => keys::processing(&consumer, instance_tag),
        };
        Self {
            store,
            blocking,
            producer,
            consumer,
            policy,
            queue_key,
            record_key,
            retry,
            handler,
            errors,
            shutdown,
            release: Arc::new(Notify::new()),
        }
    }

    pub(crate) async fn run(mut self) {
        if self.policy == DeliveryPolicy::SharedRecoverable {
            self.recover().await;
        }

        debug!(
            "Delivery loop waiting on '{}' for consumer '{}'",
            self.queue_key, self.consumer
        );

        loop {
            let fetched = tokio::select! {
                _ = shutdown_signalled(&mut self.shutdown) => break,
                fetched = self.blocking.blocking_pop_push(
                    &self.queue_key,
                    &self.record_key,
                    Duration::ZERO,
                ) => fetched,
            };

            match fetched {
                Ok(Some(raw)) => {
                    let key = MessageKey::from_raw(raw);
                    let dispatched = self.dispatch(&key, true).await;

                    // Nothing to wait for if no handler was invoked
                    if dispatched && self.policy == DeliveryPolicy::PerInstance {
                        tokio::select! {
                            _ = shutdown_signalled(&mut self.shutdown) => break,
                            _ = self.release.notified() => {}
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                    (self.errors)(e.into());
                    tokio::time::sleep(delay_for_attempt(&self.retry, 1)).await;
                }
            }
        }

        info!(
            "Delivery loop for '{}' -> '{}' stopped",
            self.producer, self.consumer
        );
    }

    /// Replay unacknowledged messages a previous run left on the shared
    /// in-flight record, oldest first.
    ///
    /// The record is shared by every producer this consumer subscribes
    /// to, so only entries whose payload exists under this loop's
    /// producer are replayed here; the rest belong to other loops and
    /// are left in place.
    async fn recover(&self) {
        let entries = match with_retry(&self.retry, "delivery.recover", || {
            self.store.list_range(&self.record_key)
        })
        .await
        {
            Ok(entries) => entries,
            Err(e) => {
                (self.errors)(e.into());
                return;
            }
        };

        if entries.is_empty() {
            return;
        }

        info!(
            "Replaying up to {} unacknowledged message(s) from '{}'",
            entries.len(),
            self.record_key
        );

        // The record lists newest first
        for raw in entries.into_iter().rev() {
            let key = MessageKey::from_raw(raw);
            self.dispatch(&key, false).await;
        }
    }

    /// Fetch a message's payload and hand it to the handler.
    ///
    /// `drop_if_missing` distinguishes the two callers: a freshly popped
    /// key is always this producer's, so no payload means the TTL
    /// expired and the entry is discarded. During recovery ownership is
    /// read off the counter instead: read counters carry no TTL, so a
    /// standing counter under this producer marks the entry as ours
    /// with an expired payload, while no counter means it belongs to a
    /// different producer's loop and stays.
    async fn dispatch(&self, key: &MessageKey, drop_if_missing: bool) -> bool {
        let payload_key = keys::payload(&self.producer, key);
        let reads_key = keys::reads(&self.producer, key);
        let payload = match with_retry(&self.retry, "delivery.fetch", || {
            self.store.get(&payload_key)
        })
        .await
        {
            Ok(payload) => payload,
            Err(e) => {
                (self.errors)(e.into());
                return false;
            }
        };

        let Some(payload) = payload else {
            if drop_if_missing || self.counter_exists(&reads_key).await {
                warn!(
                    "Payload for '{}' from '{}' is gone, discarding in-flight entry",
                    key, self.producer
                );
                self.discard(key, &reads_key).await;
            } else {
                debug!(
                    "No payload for '{}' under producer '{}', leaving entry in place",
                    key, self.producer
                );
            }
            return false;
        };

        let topic = Topic::new(&self.producer, key.action());
        let release = match self.policy {
            DeliveryPolicy::PerInstance => Some(self.release.clone()),
            DeliveryPolicy::SharedRecoverable => None,
        };
        let ack = AckHandle::new(
            self.store.clone(),
            key.clone(),
            self.record_key.clone(),
            payload_key,
            reads_key,
            self.retry.clone(),
            release,
        );

        debug!("Dispatching '{}' on topic '{}'", key, topic);
        self.handler.handle(Delivery::new(topic, payload, ack)).await;
        true
    }

    /// Whether the read counter for a message is still standing
    async fn counter_exists(&self, reads_key: &str) -> bool {
        match with_retry(&self.retry, "delivery.reads_lookup", || {
            self.store.get(reads_key)
        })
        .await
        {
            Ok(counter) => counter.is_some(),
            Err(e) => {
                (self.errors)(e.into());
                false
            }
        }
    }

    /// Drop an in-flight entry whose payload is gone, settling its share
    /// of the read counter as an acknowledgment would have.
    ///
    /// Without the decrement the counter, which carries no TTL, would
    /// outlive the message, and on a multi-consumer fan-out the
    /// remaining consumers' acknowledgments could never reach zero.
    async fn discard(&self, key: &MessageKey, reads_key: &str) {
        let removed = match with_retry(&self.retry, "delivery.drop_expired", || {
            self.store.list_remove(&self.record_key, key.as_str())
        })
        .await
        {
            Ok(removed) => removed,
            Err(e) => {
                (self.errors)(e.into());
                return;
            }
        };
        if removed == 0 {
            return;
        }

        let unbounded = self.retry.clone().unbounded();
        let remaining = match with_retry(&unbounded, "delivery.discard_reads", || {
            self.store.decrement(reads_key)
        })
        .await
        {
            Ok(remaining) => remaining,
            Err(e) => {
                (self.errors)(e.into());
                return;
            }
        };

        // Negative means the counter was already gone and the decrement
        // recreated it; deleting covers that remnant too
        if remaining <= 0
            && let Err(e) = with_retry(&self.retry, "delivery.delete_reads", || {
                self.store.delete(reads_key)
            })
            .await
        {
            (self.errors)(e.into());
        }
    }
}

/// Resolves once shutdown has been requested
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone: the client was dropped, stop the loop
            return;
        }
    }
}
