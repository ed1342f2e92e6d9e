//! Configuration management for Tollgate.
//!
//! Deployments typically carry a small YAML file mapping protected resources
//! to their quotas, with a catch-all default. The file is optional: a
//! [`TollgateConfig::default()`] enforces the crate defaults everywhere.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RateLimitError, Result};
use crate::ratelimit::Policy;

/// Main configuration for Tollgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Policy applied to resources without an explicit entry
    #[serde(default)]
    pub default: PolicyConfig,

    /// Per-resource policy overrides, keyed by resource name
    #[serde(default)]
    pub resources: HashMap<String, PolicyConfig>,
}

/// Declarative form of a [`Policy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window duration in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Allow requests through when the counter store is unreachable
    #[serde(default)]
    pub fail_open: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            fail_open: false,
        }
    }
}

fn default_limit() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    60
}

impl PolicyConfig {
    /// Convert to a runtime [`Policy`].
    pub fn to_policy(&self) -> Policy {
        Policy::new(self.limit, Duration::from_secs(self.window_secs)).fail_open(self.fail_open)
    }
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RateLimitError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations carrying a policy the limiter would refuse at
    /// call time.
    pub fn validate(&self) -> Result<()> {
        self.default.to_policy().validate()?;
        for (resource, policy) in &self.resources {
            policy.to_policy().validate().map_err(|e| {
                RateLimitError::Config(format!("resource {:?}: {}", resource, e))
            })?;
        }
        Ok(())
    }

    /// The policy governing `resource`: its explicit entry if present,
    /// otherwise the default.
    pub fn policy_for(&self, resource: &str) -> Policy {
        self.resources
            .get(resource)
            .unwrap_or(&self.default)
            .to_policy()
    }
}
