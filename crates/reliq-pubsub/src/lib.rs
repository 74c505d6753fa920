//! # reliq-pubsub
//!
//! Reliable, at-least-once, multi-consumer pub/sub delivery over a
//! shared Redis store. There is no broker process: producers and
//! consumers coordinate purely through atomic single-key store
//! operations, so any number of services sharing one Redis instance can
//! exchange messages that survive process restarts.
//!
//! ## Protocol
//!
//! - **Registry**: consumers register durably in a set per
//!   `(producer, action)`.
//! - **Publisher**: a publish stores the payload once, sets a read
//!   counter to the consumer count, and pushes the message key onto
//!   each consumer's FIFO queue. Publishing with no consumers is a
//!   logged no-op.
//! - **Delivery loop**: one task per subscribed producer blocks on an
//!   atomic pop from queue to in-flight record, fetches the payload,
//!   and invokes the handler.
//! - **Acknowledgment**: removes the in-flight entry (idempotently),
//!   decrements the read counter, and deletes the payload exactly when
//!   the counter reaches zero.
//! - **Recovery**: under the shared recoverable policy, messages left
//!   in flight by a crash are replayed oldest-first at startup.
//!
//! ## Example
//!
//! ```no_run
//! use reliq_pubsub::{Client, Delivery};
//! use reliq_config::Config;
//!
//! # async fn example() -> reliq_pubsub::Result<()> {
//! let client = Client::connect(Config::new("billing"), |delivery: Delivery| async move {
//!     if let Err(e) = delivery.ack().await {
//!         eprintln!("ack failed: {e}");
//!     }
//! })
//! .await?;
//!
//! client.subscribe("orders", ["order.created"]).await?;
//! client.publish("invoice.sent", "{\"order\":17}");
//! # Ok(())
//! # }
//! ```

pub mod ack;
pub mod client;
pub mod delivery;
pub mod error;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod types;

pub use ack::AckHandle;
pub use client::Client;
pub use error::{PubSubError, Result};
pub use publisher::Publisher;
pub use registry::Registry;
pub use types::{Delivery, ErrorHandler, Handler, default_error_handler};

// Re-exported so callers rarely need the lower crates directly
pub use reliq_config::{Config, DeliveryConfig, DeliveryPolicy, RedisConfig, RetryPolicy};
pub use reliq_core::{Action, Identity, InstanceTag, MessageKey, Topic};
