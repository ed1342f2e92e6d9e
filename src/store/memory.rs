//! In-process counter store implementation.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CounterStore, StoreError};

/// A single counter and its window deadline.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// An in-process counter store backed by a concurrent map.
///
/// Suitable for single-process deployments and tests. Increments are atomic
/// because the map holds an exclusive guard on the entry for the duration of
/// the update. Expiry is lazy: a counter past its deadline is treated as
/// absent and restarted on the next increment, which matches the
/// store-managed TTL semantics of [`RedisStore`](super::RedisStore).
///
/// Uses [`tokio::time::Instant`] for deadlines so tests can drive window
/// expiry with virtual time.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CounterEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) counters, primarily for tests.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    /// Whether the store holds no live counters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(CounterEntry {
                count: 0,
                expires_at: None,
            });

        // A counter past its deadline restarts as if freshly created.
        if entry.is_expired() {
            entry.count = 0;
            entry.expires_at = None;
        }

        entry.count += 1;
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.count)),
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                Ok(entry.expires_at.map(|deadline| deadline - Instant::now()))
            }
            _ => Ok(None),
        }
    }
}
