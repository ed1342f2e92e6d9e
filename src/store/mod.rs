//! Counter store abstraction.
//!
//! The rate limiter never owns its counters: they live in a shared store so
//! that the quota holds across every server process pointing at the same
//! backend. This module defines the store contract and its error type;
//! concrete implementations live in [`memory`] and [`redis_store`].

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur in counter store operations.
///
/// These describe infrastructure faults, never quota decisions. An absent
/// key is a normal result (`Ok(None)`), not an error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the connection dropped mid-call.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store did not answer within the configured deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The value under a counter key was not a non-negative integer.
    #[error("corrupt counter value: {0}")]
    Corrupt(String),
}

/// Trait for counter store implementations.
///
/// This trait abstracts over the in-process [`MemoryStore`] and the
/// Redis-backed [`RedisStore`] so the limiter works with either, and so
/// tests can substitute a deterministic fake.
///
/// The one hard requirement is that [`increment`](CounterStore::increment)
/// is atomic with respect to concurrent callers: two simultaneous increments
/// of the same key must observe distinct values. Implementations must not
/// emulate it with a get-then-set sequence.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `key` and return the new value.
    ///
    /// A returned value of `1` means this call created the key, which is the
    /// caller's cue to set the window expiry.
    async fn increment(&self, key: &str) -> std::result::Result<u64, StoreError>;

    /// Set or refresh the time-to-live for `key`. When the TTL elapses the
    /// whole counter vanishes in one step.
    async fn expire(&self, key: &str, ttl: Duration) -> std::result::Result<(), StoreError>;

    /// Read the current counter value without mutating it.
    ///
    /// Returns `Ok(None)` when the key does not exist (or has expired).
    async fn get(&self, key: &str) -> std::result::Result<Option<u64>, StoreError>;

    /// Remove the key immediately, restoring full quota.
    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError>;

    /// Remaining time-to-live for `key`, or `Ok(None)` when the key is
    /// absent or carries no expiry.
    async fn ttl(&self, key: &str) -> std::result::Result<Option<Duration>, StoreError>;
}
