//! # reliq-core
//!
//! Foundational types for the reliq delivery protocol: participant
//! identities, actions, message keys, topics, and the shared-store key
//! schema that every other crate builds on.
//!
//! ## Key Components
//!
//! - **Identity / Action**: opaque names for participants and event types
//! - **MessageKey**: `action:uuid` identifier of a published message
//! - **InstanceTag**: per-process tag used by the per-instance delivery policy
//! - **keys**: the exact shared-store key patterns other protocol
//!   implementations interoperate with

pub mod id;
pub mod keys;

pub use id::{Action, Identity, InstanceTag};
pub use keys::{MessageKey, Topic};
