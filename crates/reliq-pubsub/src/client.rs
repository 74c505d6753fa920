//! Client facade tying registration, publishing, and delivery together.

use crate::delivery::DeliveryLoop;
use crate::publisher::Publisher;
use crate::registry::Registry;
use crate::types::{ErrorHandler, Handler, default_error_handler};
use crate::{PubSubError, Result};
use reliq_config::Config;
use reliq_core::{Action, Identity, InstanceTag, MessageKey};
use reliq_store::{RedisStore, Store};
use std::collections::HashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use std::sync::Arc;

/// One participant's connection to the protocol.
///
/// A client owns its store handle, identity, delivery policy, and
/// handler; nothing is process-global, so several clients with
/// different identities can coexist in one process.
///
/// ```no_run
/// use reliq_pubsub::{Client, Delivery};
/// use reliq_config::Config;
///
/// # async fn example() -> reliq_pubsub::Result<()> {
/// let client = Client::connect(Config::new("b"), |delivery: Delivery| async move {
///     println!("{}: {:?}", delivery.topic(), delivery.payload_str());
///     let _ = delivery.ack().await;
/// })
/// .await?;
///
/// client.subscribe("a", ["order.created"]).await?;
/// client.publish("invoice.sent", "{\"id\":1}");
/// # Ok(())
/// # }
/// ```
pub struct Client {
    identity: Identity,
    instance_tag: InstanceTag,
    config: Config,
    store: Arc<dyn Store>,
    handler: Arc<dyn Handler>,
    errors: ErrorHandler,
    publisher: Publisher,
    registry: Registry,
    /// One delivery loop per subscribed producer
    loops: Mutex<HashMap<Identity, JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Client {
    /// Connect to the store named by `config` and build a client around
    /// `handler`.
    pub async fn connect(config: Config, handler: impl Handler + 'static) -> Result<Self> {
        config.validate()?;
        let store = RedisStore::new(&config.redis).await?;
        Self::with_store(config, Arc::new(store), handler)
    }

    /// Build a client over an existing store handle. Used with
    /// [`reliq_store::MemoryStore`] in tests and by callers managing
    /// their own connections.
    pub fn with_store(
        config: Config,
        store: Arc<dyn Store>,
        handler: impl Handler + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let identity = Identity::new(config.identity.clone());
        let retry = config.delivery.retry.clone();
        let publisher = Publisher::new(
            store.clone(),
            identity.clone(),
            config.delivery.message_ttl,
            retry.clone(),
        );
        let registry = Registry::new(store.clone(), retry);
        let (shutdown, _) = watch::channel(false);

        info!("Client '{}' ready", identity);

        Ok(Self {
            identity,
            instance_tag: InstanceTag::generate(),
            config,
            store,
            handler: Arc::new(handler),
            errors: default_error_handler(),
            publisher,
            registry,
            loops: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// Replace the default error handler. Failures from fire-and-forget
    /// publishes and from delivery loops whose retries are exhausted are
    /// routed here; the default logs them. Set this before subscribing.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(PubSubError) + Send + Sync + 'static,
    ) -> Self {
        self.errors = Arc::new(handler);
        self
    }

    /// This client's participant identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The tag scoping this process's in-flight record under the
    /// per-instance policy
    pub fn instance_tag(&self) -> &InstanceTag {
        &self.instance_tag
    }

    /// Register for the given actions of `producer` and start delivery.
    ///
    /// Registration is idempotent. One delivery loop is started per
    /// distinct producer no matter how many actions or repeat calls; the
    /// loop carries every action from that producer.
    pub async fn subscribe(
        &self,
        producer: impl Into<Identity>,
        actions: impl IntoIterator<Item = impl Into<Action>>,
    ) -> Result<()> {
        let producer = producer.into();
        for action in actions {
            self.registry
                .subscribe(&producer, &action.into(), &self.identity)
                .await?;
        }
        self.ensure_delivery_loop(producer).await
    }

    /// Register for several producers at once, e.g. from a deserialized
    /// `producer -> [actions]` mapping.
    pub async fn subscribe_all<I, P, A>(&self, subscriptions: I) -> Result<()>
    where
        I: IntoIterator<Item = (P, Vec<A>)>,
        P: Into<Identity>,
        A: Into<Action>,
    {
        for (producer, actions) in subscriptions {
            self.subscribe(producer, actions).await?;
        }
        Ok(())
    }

    /// Publish a message of `action`, fire-and-forget.
    ///
    /// The store calls run on a background task so the caller's path is
    /// never stalled; failures go to the error handler.
    pub fn publish(&self, action: impl Into<Action>, payload: impl Into<Vec<u8>>) {
        let publisher = self.publisher.clone();
        let errors = self.errors.clone();
        let action = action.into();
        let payload = payload.into();
        tokio::spawn(async move {
            if let Err(e) = publisher.publish(&action, &payload).await {
                (errors)(e);
            }
        });
    }

    /// Publish and wait for the fan-out to complete.
    ///
    /// Returns the stored message key, or `None` when no consumers were
    /// registered and nothing was stored.
    pub async fn publish_wait(
        &self,
        action: impl Into<Action>,
        payload: impl AsRef<[u8]>,
    ) -> Result<Option<MessageKey>> {
        self.publisher
            .publish(&action.into(), payload.as_ref())
            .await
    }

    /// Number of running delivery loops (one per subscribed producer)
    pub async fn delivery_loop_count(&self) -> usize {
        self.loops.lock().await.len()
    }

    /// Stop every delivery loop and wait for them to finish.
    ///
    /// Loops stop issuing new dequeues; a message already popped sits on
    /// the in-flight record and is replayed on the next start under the
    /// shared recoverable policy.
    pub async fn shutdown(&self) {
        info!("Client '{}' shutting down", self.identity);
        self.shutdown.send_replace(true);

        let handles: Vec<JoinHandle<()>> = {
            let mut loops = self.loops.lock().await;
            loops.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Delivery loop task failed during shutdown: {}", e);
            }
        }
    }

    async fn ensure_delivery_loop(&self, producer: Identity) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(PubSubError::Shutdown);
        }

        let mut loops = self.loops.lock().await;
        if loops.contains_key(&producer) {
            return Ok(());
        }

        // Dedicated handle: the blocking dequeue would otherwise
        // monopolize the shared connection
        let blocking = self.store.blocking_handle().await?;
        let delivery_loop = DeliveryLoop::new(
            self.store.clone(),
            blocking,
            producer.clone(),
            self.identity.clone(),
            self.config.delivery.policy,
            &self.instance_tag,
            self.config.delivery.retry.clone(),
            self.handler.clone(),
            self.errors.clone(),
            self.shutdown.subscribe(),
        );

        info!(
            "Starting delivery loop for producer '{}' as '{}'",
            producer, self.identity
        );
        loops.insert(producer, tokio::spawn(delivery_loop.run()));
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("identity", &self.identity)
            .field("instance_tag", &self.instance_tag)
            .field("policy", &self.config.delivery.policy)
            .finish_non_exhaustive()
    }
}
