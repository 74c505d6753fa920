use crate::ack::AckHandle;
use crate::Result;
use async_trait::async_trait;
use reliq_core::Topic;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::error;

/// One message handed to a consumer's handler.
///
/// The payload is the exact bytes the producer published. Call
/// [`Delivery::ack`] once processing is done; until then the message
/// stays on this consumer's in-flight record and (under the shared
/// recoverable policy) will be redelivered after a crash.
#[derive(Debug)]
pub struct Delivery {
    topic: Topic,
    payload: Vec<u8>,
    ack: AckHandle,
}

impl Delivery {
    pub(crate) fn new(topic: Topic, payload: Vec<u8>, ack: AckHandle) -> Self {
        Self {
            topic,
            payload,
            ack,
        }
    }

    /// Topic the message was published under: `{producer}.{action}`
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as UTF-8, if it is valid UTF-8
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Deserialize the payload as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Acknowledge this delivery
    pub async fn ack(&self) -> Result<()> {
        self.ack.ack().await
    }

    /// A standalone handle for acknowledging later, e.g. from a spawned
    /// task that outlives the handler call
    pub fn ack_handle(&self) -> AckHandle {
        self.ack.clone()
    }
}

/// Consumer callback invoked once per delivered message.
///
/// Implemented for any `async` closure taking a [`Delivery`], so most
/// callers never implement this trait by hand.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, delivery: Delivery);
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Delivery) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, delivery: Delivery) {
        (self)(delivery).await;
    }
}

/// Callback receiving failures from fire-and-forget paths: background
/// publishes and delivery loops whose retries were exhausted.
pub type ErrorHandler = Arc<dyn Fn(crate::PubSubError) + Send + Sync>;

/// Default error handler: log and carry on
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|e| error!("Unrecoverable pub/sub error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reliq_config::RetryPolicy;
    use reliq_core::{Identity, MessageKey};
    use reliq_store::MemoryStore;
    use serde_json::json;

    fn delivery_with_payload(payload: &[u8]) -> Delivery {
        let ack = AckHandle::new(
            Arc::new(MemoryStore::new()),
            MessageKey::from_raw("order.created:u1"),
            "b.dequeued".to_string(),
            "a.message.order.created:u1".to_string(),
            "a.reads.order.created:u1".to_string(),
            RetryPolicy::default(),
            None,
        );
        Delivery::new(
            Topic::new(&Identity::new("a"), "order.created"),
            payload.to_vec(),
            ack,
        )
    }

    #[test]
    fn test_delivery_accessors() {
        let fixture = delivery_with_payload(b"hello");
        assert_eq!(fixture.topic().as_str(), "a.order.created");
        assert_eq!(fixture.payload(), b"hello");
        assert_eq!(fixture.payload_str(), Some("hello"));
    }

    #[test]
    fn test_delivery_json() {
        let fixture = delivery_with_payload(br#"{"id": 7}"#);
        let actual: serde_json::Value = fixture.json().unwrap();
        assert_eq!(actual, json!({"id": 7}));
    }

    #[test]
    fn test_delivery_json_invalid() {
        let fixture = delivery_with_payload(b"not json");
        let actual = fixture.json::<serde_json::Value>();
        assert!(actual.is_err());
    }

    #[tokio::test]
    async fn test_closure_implements_handler() {
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |delivery: Delivery| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(delivery.topic().to_string());
            }
        };

        handler.handle(delivery_with_payload(b"x")).await;

        let actual = seen.lock().await.clone();
        assert_eq!(actual, vec!["a.order.created".to_string()]);
    }
}
