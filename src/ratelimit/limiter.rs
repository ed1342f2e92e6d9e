//! Core rate limiter implementation.

use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::error::{RateLimitError, Result};
use crate::store::{CounterStore, StoreError};

use super::key::RateLimitKey;
use super::policy::Policy;

/// Admission control for protected resources.
///
/// A `RateLimiter` decides, for a given subject (user id or IP address) and
/// resource (endpoint name), whether a new request fits under the policy's
/// quota. Counters live in the injected [`CounterStore`], which is the
/// single source of truth, so the quota holds across every server process
/// sharing that store. The limiter itself keeps no per-key state and adds no
/// locking on the hot path; correctness under concurrency rests on the
/// store's atomic increment.
pub struct RateLimiter<S> {
    /// Shared counter store
    store: S,
    /// Policy applied when the caller does not supply one. Swappable at
    /// runtime so operators can change limits or flip fail-open live.
    default_policy: RwLock<Policy>,
}

impl<S: CounterStore> RateLimiter<S> {
    /// Create a rate limiter over the given store with the crate default
    /// policy.
    pub fn new(store: S) -> Self {
        Self::with_default_policy(store, Policy::default())
    }

    /// Create a rate limiter with an explicit default policy.
    pub fn with_default_policy(store: S, policy: Policy) -> Self {
        Self {
            store,
            default_policy: RwLock::new(policy),
        }
    }

    /// Replace the default policy.
    pub fn set_default_policy(&self, policy: Policy) {
        let mut current = self.default_policy.write();
        *current = policy;
    }

    /// Get a copy of the current default policy.
    pub fn default_policy(&self) -> Policy {
        self.default_policy.read().clone()
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check admission for an arbitrary key under the given policy.
    ///
    /// This is the primitive behind [`is_allowed`](Self::is_allowed) and
    /// [`is_allowed_by_ip`](Self::is_allowed_by_ip): increment the key's
    /// counter, establish the window boundary on the first increment, then
    /// compare against the limit. A denied request is *not* decremented,
    /// so retries keep burning the window.
    pub async fn check(&self, key: &RateLimitKey, policy: &Policy) -> Result<bool> {
        policy.validate()?;
        key.validate()?;

        let store_key = key.to_store_key();

        trace!(
            key = %store_key,
            limit = policy.limit,
            window_secs = policy.window.as_secs(),
            "Checking rate limit"
        );

        let count = match self.store.increment(&store_key).await {
            Ok(count) => count,
            Err(fault) => return self.degrade(&store_key, policy, fault),
        };

        // The first increment of a window fixes its boundary: the counter
        // expires window seconds from now regardless of later requests.
        if count == 1 {
            if let Err(fault) = self.store.expire(&store_key, policy.window).await {
                return self.degrade(&store_key, policy, fault);
            }
        }

        if count > policy.limit {
            debug!(
                key = %store_key,
                count = count,
                limit = policy.limit,
                "Rate limit exceeded"
            );
            return Err(RateLimitError::Exceeded {
                key: store_key,
                count,
                limit: policy.limit,
            });
        }

        Ok(true)
    }

    /// Check admission for a user-identity subject.
    pub async fn is_allowed(&self, subject: &str, resource: &str, policy: &Policy) -> Result<bool> {
        self.check(&RateLimitKey::user(subject, resource), policy)
            .await
    }

    /// Check admission for a user-identity subject under the default policy.
    pub async fn is_allowed_with_defaults(&self, subject: &str, resource: &str) -> Result<bool> {
        let policy = self.default_policy();
        self.is_allowed(subject, resource, &policy).await
    }

    /// Check admission for an IP-address subject.
    ///
    /// IP-scoped counters live in their own key namespace, so they never
    /// collide with user-scoped counters for the same resource even when
    /// the subject strings coincide.
    pub async fn is_allowed_by_ip(
        &self,
        address: &str,
        resource: &str,
        policy: &Policy,
    ) -> Result<bool> {
        self.check(&RateLimitKey::ip(address, resource), policy)
            .await
    }

    /// Remaining quota for a user subject, treating an absent counter as
    /// zero used.
    ///
    /// Read-only: does not mutate the counter or refresh its expiry. Meant
    /// for quota-remaining response headers, not for admission decisions.
    /// Store faults always propagate here; introspection has no admission
    /// to fail open for.
    pub async fn get_remaining_requests(
        &self,
        subject: &str,
        resource: &str,
        limit: u64,
    ) -> Result<u64> {
        if limit < 1 {
            return Err(RateLimitError::InvalidPolicy(
                "limit must be at least 1".to_string(),
            ));
        }
        let key = RateLimitKey::user(subject, resource);
        key.validate()?;

        let count = self.store.get(&key.to_store_key()).await?.unwrap_or(0);
        Ok(limit.saturating_sub(count))
    }

    /// Delete the counter for a user subject, immediately restoring full
    /// quota. Administrative override; never invoked implicitly.
    pub async fn reset_user_limit(&self, subject: &str, resource: &str) -> Result<()> {
        self.reset(&RateLimitKey::user(subject, resource)).await
    }

    /// Delete the counter for an IP subject.
    pub async fn reset_ip_limit(&self, address: &str, resource: &str) -> Result<()> {
        self.reset(&RateLimitKey::ip(address, resource)).await
    }

    /// Time until the key's window expires, derived from the store's TTL.
    ///
    /// Returns `Ok(None)` when no counter exists (full quota available).
    /// Useful for a Retry-After hint alongside a denial.
    pub async fn retry_after(&self, key: &RateLimitKey) -> Result<Option<Duration>> {
        key.validate()?;
        Ok(self.store.ttl(&key.to_store_key()).await?)
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<()> {
        key.validate()?;
        let store_key = key.to_store_key();
        self.store.delete(&store_key).await?;
        debug!(key = %store_key, "Rate limit counter reset");
        Ok(())
    }

    /// Route a store fault through the policy's degradation mode.
    fn degrade(&self, key: &str, policy: &Policy, fault: StoreError) -> Result<bool> {
        if policy.fail_open {
            warn!(
                key = %key,
                error = %fault,
                "Counter store fault, allowing request (fail-open)"
            );
            Ok(true)
        } else {
            Err(RateLimitError::StoreUnavailable(fault))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};
    use std::sync::Arc;

    /// A store whose every operation fails, simulating a Redis outage.
    struct UnreachableStore;

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn increment(&self, _key: &str) -> std::result::Result<u64, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn expire(
            &self,
            _key: &str,
            _ttl: Duration,
        ) -> std::result::Result<(), StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn get(&self, _key: &str) -> std::result::Result<Option<u64>, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn ttl(&self, _key: &str) -> std::result::Result<Option<Duration>, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }

    fn limiter() -> RateLimiter<MemoryStore> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        RateLimiter::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_exactly_limit_requests_are_admitted() {
        let limiter = limiter();
        let policy = Policy::new(10, Duration::from_secs(60));

        for i in 1..=10 {
            let allowed = limiter
                .is_allowed("user_123", "/api/aria/chat", &policy)
                .await;
            assert!(allowed.is_ok(), "request {} should be admitted", i);
        }

        let denied = limiter
            .is_allowed("user_123", "/api/aria/chat", &policy)
            .await;
        match denied {
            Err(RateLimitError::Exceeded { key, count, limit }) => {
                assert_eq!(key, "rate_limit:user_123:/api/aria/chat");
                assert_eq!(count, 11);
                assert_eq!(limit, 10);
            }
            other => panic!("expected Exceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_denied_request_still_counts_toward_window() {
        let limiter = limiter();
        let policy = Policy::new(2, Duration::from_secs(60));

        limiter.is_allowed("u", "/r", &policy).await.unwrap();
        limiter.is_allowed("u", "/r", &policy).await.unwrap();

        // Two denials keep incrementing the counter.
        assert!(limiter.is_allowed("u", "/r", &policy).await.is_err());
        match limiter.is_allowed("u", "/r", &policy).await {
            Err(RateLimitError::Exceeded { count, .. }) => assert_eq!(count, 4),
            other => panic!("expected Exceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remaining_requests_accounting() {
        let limiter = limiter();
        let policy = Policy::new(5, Duration::from_secs(60));

        assert_eq!(
            limiter.get_remaining_requests("u", "/r", 5).await.unwrap(),
            5
        );

        for n in 1..=3 {
            limiter.is_allowed("u", "/r", &policy).await.unwrap();
            assert_eq!(
                limiter.get_remaining_requests("u", "/r", 5).await.unwrap(),
                5 - n
            );
        }
    }

    #[tokio::test]
    async fn test_remaining_requests_propagates_store_fault() {
        // Introspection never fails open: there is no request to admit.
        let limiter = RateLimiter::new(UnreachableStore);

        let result = limiter.get_remaining_requests("u", "/r", 10).await;
        assert!(matches!(result, Err(RateLimitError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_remaining_never_goes_negative() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));

        limiter.is_allowed("u", "/r", &policy).await.unwrap();
        let _ = limiter.is_allowed("u", "/r", &policy).await;
        let _ = limiter.is_allowed("u", "/r", &policy).await;

        assert_eq!(
            limiter.get_remaining_requests("u", "/r", 1).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_resources_accrue_independent_counters() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));

        limiter.is_allowed("u", "/api/a", &policy).await.unwrap();
        assert!(limiter.is_allowed("u", "/api/a", &policy).await.is_err());

        // Quota for /api/b is untouched.
        assert!(limiter.is_allowed("u", "/api/b", &policy).await.is_ok());
    }

    #[tokio::test]
    async fn test_subjects_accrue_independent_counters() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));

        limiter.is_allowed("alice", "/r", &policy).await.unwrap();
        assert!(limiter.is_allowed("alice", "/r", &policy).await.is_err());

        assert!(limiter.is_allowed("bob", "/r", &policy).await.is_ok());
    }

    #[tokio::test]
    async fn test_ip_and_user_quotas_are_independent() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));

        // Exhaust the IP-scoped quota for this string.
        limiter
            .is_allowed_by_ip("192.168.1.1", "/api/public/search", &policy)
            .await
            .unwrap();
        assert!(limiter
            .is_allowed_by_ip("192.168.1.1", "/api/public/search", &policy)
            .await
            .is_err());

        // The identity-scoped counter for the same string is untouched.
        assert!(limiter
            .is_allowed("192.168.1.1", "/api/public/search", &policy)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reset_restores_full_quota() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));

        limiter.is_allowed("u", "/r", &policy).await.unwrap();
        assert!(limiter.is_allowed("u", "/r", &policy).await.is_err());

        limiter.reset_user_limit("u", "/r").await.unwrap();

        // A call that would have been denied succeeds right after reset.
        assert!(limiter.is_allowed("u", "/r", &policy).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_ip_limit_restores_full_quota() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));

        limiter
            .is_allowed_by_ip("10.0.0.1", "/r", &policy)
            .await
            .unwrap();
        assert!(limiter
            .is_allowed_by_ip("10.0.0.1", "/r", &policy)
            .await
            .is_err());

        limiter.reset_ip_limit("10.0.0.1", "/r").await.unwrap();

        assert!(limiter
            .is_allowed_by_ip("10.0.0.1", "/r", &policy)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reset_removes_the_counter_from_the_store() {
        let limiter = limiter();
        let policy = Policy::new(5, Duration::from_secs(60));

        limiter.is_allowed("u", "/r", &policy).await.unwrap();
        assert_eq!(limiter.store().len(), 1);

        limiter.reset_user_limit("u", "/r").await.unwrap();
        assert!(limiter.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_restarts_the_counter() {
        let limiter = limiter();
        let policy = Policy::new(10, Duration::from_secs(60));

        for _ in 0..10 {
            limiter.is_allowed("user_123", "/r", &policy).await.unwrap();
        }
        assert!(limiter.is_allowed("user_123", "/r", &policy).await.is_err());

        tokio::time::advance(Duration::from_secs(61)).await;

        // Fresh window: admitted again with a counter restarted at 1.
        assert!(limiter.is_allowed("user_123", "/r", &policy).await.is_ok());
        assert_eq!(
            limiter
                .get_remaining_requests("user_123", "/r", 10)
                .await
                .unwrap(),
            9
        );
    }

    #[tokio::test]
    async fn test_fail_open_allows_on_store_fault() {
        let limiter = RateLimiter::new(UnreachableStore);
        let policy = Policy::new(10, Duration::from_secs(60)).fail_open(true);

        let allowed = tokio_test::assert_ok!(limiter.is_allowed("u", "/r", &policy).await);
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_fail_closed_surfaces_store_fault() {
        let limiter = RateLimiter::new(UnreachableStore);
        let policy = Policy::new(10, Duration::from_secs(60));

        let result = limiter.is_allowed("u", "/r", &policy).await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(
            err,
            RateLimitError::StoreUnavailable(StoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_policy_fails_fast_without_store_access() {
        // The store is unreachable, but validation rejects the call first.
        let limiter = RateLimiter::new(UnreachableStore);
        let policy = Policy::new(0, Duration::from_secs(60));

        let result = limiter.is_allowed("u", "/r", &policy).await;
        assert!(matches!(result, Err(RateLimitError::InvalidPolicy(_))));
    }

    #[tokio::test]
    async fn test_empty_subject_is_rejected() {
        let limiter = limiter();
        let policy = Policy::new(10, Duration::from_secs(60));

        let result = limiter.is_allowed("", "/r", &policy).await;
        assert!(matches!(result, Err(RateLimitError::InvalidPolicy(_))));
    }

    #[tokio::test]
    async fn test_retry_after_tracks_store_ttl() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));
        let key = RateLimitKey::user("u", "/r");

        assert_eq!(limiter.retry_after(&key).await.unwrap(), None);

        limiter.is_allowed("u", "/r", &policy).await.unwrap();

        let remaining = limiter.retry_after(&key).await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retry_after_for_ip_namespace() {
        let limiter = limiter();
        let policy = Policy::new(1, Duration::from_secs(60));
        let key = RateLimitKey::ip("10.0.0.1", "/r");

        assert_eq!(limiter.retry_after(&key).await.unwrap(), None);

        limiter
            .is_allowed_by_ip("10.0.0.1", "/r", &policy)
            .await
            .unwrap();

        let remaining = limiter.retry_after(&key).await.unwrap().unwrap();
        assert!(remaining > Duration::ZERO);
        assert!(remaining <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_default_policy_can_be_swapped_at_runtime() {
        let limiter = RateLimiter::with_default_policy(
            MemoryStore::new(),
            Policy::new(1, Duration::from_secs(60)),
        );

        limiter.is_allowed_with_defaults("u", "/r").await.unwrap();
        assert!(limiter.is_allowed_with_defaults("u", "/r").await.is_err());

        limiter.set_default_policy(Policy::new(100, Duration::from_secs(60)));

        assert!(limiter.is_allowed_with_defaults("u", "/r").await.is_ok());
        assert_eq!(limiter.default_policy().limit, 100);
    }

    #[tokio::test]
    async fn test_concurrent_racers_admit_exactly_limit() {
        let limiter = Arc::new(RateLimiter::new(MemoryStore::new()));
        let policy = Policy::new(5, Duration::from_secs(60));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                let policy = policy.clone();
                tokio::spawn(
                    async move { limiter.is_allowed("racer", "/r", &policy).await.is_ok() },
                )
            })
            .collect();

        let admitted = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(admitted, 5, "exactly limit racers must be admitted");
    }
}
