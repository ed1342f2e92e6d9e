//! Rate limit key generation and handling.

use crate::error::{RateLimitError, Result};

/// The entity being rate-limited.
///
/// The two kinds occupy separate key namespaces, so an IP-scoped quota and a
/// user-scoped quota for the same resource never collide even when their
/// string representations coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// An authenticated user identity
    User(String),
    /// A client network address
    Ip(String),
}

impl Subject {
    fn as_str(&self) -> &str {
        match self {
            Subject::User(id) => id,
            Subject::Ip(addr) => addr,
        }
    }
}

/// A key that uniquely identifies a rate-limited (subject, resource) pair.
///
/// Serializes to a stable store key: `rate_limit:{subject}:{resource}` for
/// user subjects and `rate_limit:ip:{subject}:{resource}` for IP subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The entity being limited
    pub subject: Subject,
    /// The logical operation being protected, e.g. an endpoint path
    pub resource: String,
}

impl RateLimitKey {
    /// Create a key for a user-identity subject.
    pub fn user(subject: &str, resource: &str) -> Self {
        Self {
            subject: Subject::User(subject.to_string()),
            resource: resource.to_string(),
        }
    }

    /// Create a key for an IP-address subject.
    pub fn ip(address: &str, resource: &str) -> Self {
        Self {
            subject: Subject::Ip(address.to_string()),
            resource: resource.to_string(),
        }
    }

    /// Reject empty subjects or resources before they reach the store.
    pub fn validate(&self) -> Result<()> {
        if self.subject.as_str().is_empty() {
            return Err(RateLimitError::InvalidPolicy(
                "subject must be a non-empty string".to_string(),
            ));
        }
        if self.resource.is_empty() {
            return Err(RateLimitError::InvalidPolicy(
                "resource must be a non-empty string".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to the stable store key.
    pub fn to_store_key(&self) -> String {
        match &self.subject {
            Subject::User(id) => format!("rate_limit:{}:{}", id, self.resource),
            Subject::Ip(addr) => format!("rate_limit:ip:{}:{}", addr, self.resource),
        }
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
