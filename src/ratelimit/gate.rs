//! Request gating wrapper.
//!
//! `Gate` is the middleware-facing form of the limiter: it binds a resource
//! name and a policy once, then wraps handler invocations, running the
//! admission check before the handler and short-circuiting on denial. The
//! HTTP layer translates a propagated [`RateLimitError::Exceeded`] into a
//! 429 response and [`RateLimitError::StoreUnavailable`] into a 503.
//!
//! [`RateLimitError::Exceeded`]: crate::error::RateLimitError::Exceeded
//! [`RateLimitError::StoreUnavailable`]: crate::error::RateLimitError::StoreUnavailable

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::store::CounterStore;

use super::limiter::RateLimiter;
use super::policy::Policy;

/// A reusable guard around request handlers for one protected resource.
pub struct Gate<S> {
    limiter: Arc<RateLimiter<S>>,
    resource: String,
    policy: Policy,
}

impl<S> Clone for Gate<S> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            resource: self.resource.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<S: CounterStore> Gate<S> {
    /// Create a gate for `resource` enforcing `policy`.
    pub fn new(limiter: Arc<RateLimiter<S>>, resource: impl Into<String>, policy: Policy) -> Self {
        Self {
            limiter,
            resource: resource.into(),
            policy,
        }
    }

    /// The resource this gate protects.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The policy this gate enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Check admission for `subject`, then run the handler.
    ///
    /// On denial the handler is never invoked and the error propagates to
    /// the caller. On a store fault the gate's policy decides: fail-open
    /// runs the handler anyway, fail-closed propagates the fault.
    pub async fn run<F, Fut, T>(&self, subject: &str, handler: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.limiter
            .is_allowed(subject, &self.resource, &self.policy)
            .await?;
        Ok(handler().await)
    }

    /// Like [`run`](Self::run), but keyed by client IP address.
    pub async fn run_for_ip<F, Fut, T>(&self, address: &str, handler: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.limiter
            .is_allowed_by_ip(address, &self.resource, &self.policy)
            .await?;
        Ok(handler().await)
    }
}
