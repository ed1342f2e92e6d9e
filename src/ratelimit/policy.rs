//! Admission policy configuration.

use std::time::Duration;

use crate::error::{RateLimitError, Result};

/// Default rate limit when no specific limit is configured.
const DEFAULT_LIMIT: u64 = 100;
/// Default time window when no specific window is configured.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Per-call admission policy: how many requests a subject may make against a
/// resource within one fixed window, and how to behave when the counter
/// store is unreachable.
///
/// `fail_open` is a runtime field rather than a compile-time variant so
/// operators can flip it without redeploying.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Maximum requests allowed in the time window
    pub limit: u64,
    /// Duration of the fixed window
    pub window: Duration,
    /// On a store fault, allow the request (`true`) or surface the fault
    /// to the caller (`false`)
    pub fail_open: bool,
}

impl Policy {
    /// Create a fail-closed policy with the given limit and window.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            fail_open: false,
        }
    }

    /// Set the fail-open flag, builder-style.
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Reject non-positive limits and sub-second windows.
    ///
    /// A violating policy is a caller programming error, never a runtime
    /// state, so it fails fast instead of being coerced.
    pub fn validate(&self) -> Result<()> {
        if self.limit < 1 {
            return Err(RateLimitError::InvalidPolicy(
                "limit must be at least 1".to_string(),
            ));
        }
        if self.window < Duration::from_secs(1) {
            return Err(RateLimitError::InvalidPolicy(
                "window must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}
