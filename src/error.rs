//! Error types for the Tollgate library.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// The subject/resource pair is over quota for the current window.
    ///
    /// This is an expected, caller-recoverable condition: the HTTP layer
    /// should translate it into a 429-style response. The rejected request
    /// has already been counted toward the window.
    #[error("rate limit exceeded for {key}: {count} requests observed, limit is {limit}")]
    Exceeded {
        /// Serialized store key for the limited pair
        key: String,
        /// Post-increment count observed by the denied request
        count: u64,
        /// The configured limit for the window
        limit: u64,
    },

    /// The counter store could not be reached or timed out.
    ///
    /// Surfaced only when the governing policy is fail-closed; under
    /// fail-open the fault is logged and the request is allowed instead.
    #[error("counter store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Caller programming error: non-positive limit or window, or an empty
    /// subject/resource.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateLimitError {
    /// Whether this error is a quota denial rather than a fault.
    pub fn is_denial(&self) -> bool {
        matches!(self, RateLimitError::Exceeded { .. })
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;
