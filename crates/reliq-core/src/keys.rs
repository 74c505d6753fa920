//! Shared-store key schema.
//!
//! Every key the protocol touches is built here. The patterns are part of
//! the wire contract: other implementations coordinate through the same
//! store, so they must match byte for byte.
//!
//! | purpose | pattern | type |
//! |---|---|---|
//! | consumer set | `{producer}.{action}.consumers` | set |
//! | message payload | `{producer}.message.{action}:{uuid}` | string |
//! | read counter | `{producer}.reads.{action}:{uuid}` | integer |
//! | fan-out queue | `{producer}.{consumer}.message` | list |
//! | in-flight record (shared) | `{consumer}.dequeued` | list |
//! | in-flight record (per-instance) | `{consumer}.processing.{tag}` | list |

use crate::id::{Action, Identity, InstanceTag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the action part and the random part of a message key.
const KEY_SEPARATOR: char = ':';

/// Identifier of one published message: `action:uuid`.
///
/// The random UUID makes keys unique without being enumerable; the action
/// prefix lets a consumer derive the topic from the key alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey(String);

impl MessageKey {
    /// Generate a fresh key for a message of the given action
    pub fn generate(action: &Action) -> Self {
        Self(format!(
            "{}{}{}",
            action.as_str(),
            KEY_SEPARATOR,
            uuid::Uuid::new_v4()
        ))
    }

    /// Reconstruct a key from its stored string form
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Get the string representation of the key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The action portion of the key (everything before the separator).
    ///
    /// Keys written by this crate always carry a separator; a raw key
    /// without one yields the whole string, matching how a split on the
    /// separator behaves everywhere else this protocol is implemented.
    pub fn action(&self) -> &str {
        match self.0.find(KEY_SEPARATOR) {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Topic handed to consumer callbacks: `{producer}.{action}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Build the topic for a producer and an action name
    pub fn new(producer: &Identity, action: &str) -> Self {
        Self(format!("{}.{}", producer.as_str(), action))
    }

    /// Get the string representation of the topic
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of the consumer set for `(producer, action)`
pub fn consumer_set(producer: &Identity, action: &Action) -> String {
    format!("{}.{}.consumers", producer.as_str(), action.as_str())
}

/// Key under which a message payload is stored
pub fn payload(producer: &Identity, key: &MessageKey) -> String {
    format!("{}.message.{}", producer.as_str(), key.as_str())
}

/// Key of a message's read counter
pub fn reads(producer: &Identity, key: &MessageKey) -> String {
    format!("{}.reads.{}", producer.as_str(), key.as_str())
}

/// Key of the fan-out queue feeding `consumer` from `producer`
pub fn fanout_queue(producer: &Identity, consumer: &Identity) -> String {
    format!("{}.{}.message", producer.as_str(), consumer.as_str())
}

/// Key of the shared in-flight record for a consumer identity
pub fn dequeued(consumer: &Identity) -> String {
    format!("{}.dequeued", consumer.as_str())
}

/// Key of the per-instance in-flight record for one running process
pub fn processing(consumer: &Identity, tag: &InstanceTag) -> String {
    format!("{}.processing.{}", consumer.as_str(), tag.as_str())
}
