//! Redis-backed counter store implementation.
//!
//! Counters map directly onto Redis primitives: INCR for the atomic
//! increment, EXPIRE for the window boundary, GET/DEL/TTL for introspection
//! and reset. Redis serializes concurrent INCRs on a key, which is what the
//! limiter's admission guarantee rests on.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ErrorKind, RedisResult};
use tracing::debug;

use super::{CounterStore, StoreError};

/// Default per-operation deadline for store calls.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// A counter store backed by a shared Redis instance.
///
/// Every operation is bounded by a per-call deadline; a missed deadline is
/// reported as [`StoreError::Timeout`] and routed through the caller's
/// fail-open/fail-closed policy like any other fault.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`) with the
    /// default operation timeout.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_timeout(url, DEFAULT_OP_TIMEOUT).await
    }

    /// Connect with an explicit per-operation timeout.
    pub async fn connect_with_timeout(
        url: &str,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = tokio::time::timeout(op_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout(op_timeout))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!(url = %url, "Connected to Redis counter store");

        Ok(Self { conn, op_timeout })
    }

    /// Run a Redis operation under the configured deadline, mapping client
    /// errors onto [`StoreError`].
    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.kind() == ErrorKind::TypeError => {
                Err(StoreError::Corrupt(e.to_string()))
            }
            Ok(Err(e)) => Err(StoreError::Connection(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

/// EXPIRE takes whole seconds; round fractional TTLs up so a window is
/// never shorter than requested, and never zero.
fn ttl_to_secs(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1) as i64
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.incr(key, 1u64).await }).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let secs = ttl_to_secs(ttl);
        self.bounded(async move { conn.expire(key, secs).await })
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.get(key).await }).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = self.bounded(async move { conn.del(key).await }).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let secs: i64 = self.bounded(async move { conn.ttl(key).await }).await?;

        // Redis reports -2 for a missing key and -1 for a key with no expiry.
        if secs < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(secs as u64)))
        }
    }
}
