//! # reliq-store
//!
//! Store adapter for the reliq delivery protocol. The protocol coordinates
//! exclusively through atomic single-key operations against a shared store;
//! this crate defines that operation set as the [`Store`] trait and ships
//! two implementations:
//!
//! - [`RedisStore`]: production backend over a multiplexed Redis connection
//! - [`MemoryStore`]: in-process backend with the same semantics, used by
//!   the protocol tests
//!
//! No multi-key transactions appear here on purpose: the protocol is
//! specified against single-key atomicity only.

pub mod error;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Atomic single-key operations the delivery protocol needs.
///
/// List semantics follow Redis: `list_push` pushes onto the head,
/// `pop_push` and `blocking_pop_push` pop from the source tail and push
/// onto the destination head, so a list used as a queue is FIFO.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value with optional TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Add a member to a set, returning whether it was newly added
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Get all members of a set
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Push a value onto the head of a list
    async fn list_push(&self, key: &str, value: &str) -> Result<()>;

    /// Get the full contents of a list, head first
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;

    /// Remove all occurrences of a value from a list, returning the count
    /// removed
    async fn list_remove(&self, key: &str, value: &str) -> Result<usize>;

    /// Atomically pop from the tail of `source` and push onto the head of
    /// `destination`
    async fn pop_push(&self, source: &str, destination: &str) -> Result<Option<String>>;

    /// Like [`Store::pop_push`], but blocks until an element arrives.
    /// A zero timeout waits forever; a nonzero timeout yields `Ok(None)`
    /// when it elapses with nothing to pop.
    async fn blocking_pop_push(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<String>>;

    /// Atomically decrement an integer value, returning the new value
    async fn decrement(&self, key: &str) -> Result<i64>;

    /// Check store connectivity
    async fn ping(&self) -> Result<()>;

    /// A handle safe to park on [`Store::blocking_pop_push`] indefinitely.
    ///
    /// Blocking commands monopolize their connection, so each delivery
    /// loop takes its own handle and leaves the primary one free for
    /// publish and acknowledgment traffic.
    async fn blocking_handle(&self) -> Result<Arc<dyn Store>>;
}
