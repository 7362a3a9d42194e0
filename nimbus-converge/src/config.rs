//! Provider configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::backend::Backend;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by every controller built from one provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the control plane, e.g. `https://kr1-api.example.com`.
    pub endpoint: String,
    /// Route load-balancer operations to the modern backend.
    pub use_octavia: bool,
    pub request_timeout_secs: u64,
    pub timeouts: OperationTimeouts,
}

/// Default per-operation convergence budgets, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OperationTimeouts {
    pub create_secs: u64,
    pub update_secs: u64,
    pub delete_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9876".to_string(),
            use_octavia: false,
            request_timeout_secs: 30,
            timeouts: OperationTimeouts::default(),
        }
    }
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create_secs: 600,
            update_secs: 600,
            delete_secs: 600,
        }
    }
}

impl OperationTimeouts {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    /// Every budget must be positive; a zero budget would let a controller
    /// issue its mutation and then fail the wait that follows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("create_secs", self.create_secs),
            ("update_secs", self.update_secs),
            ("delete_secs", self.delete_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("timeouts.{name} must be positive")));
            }
        }
        Ok(())
    }
}

impl ProviderConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".into()));
        }
        self.timeouts.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backend chosen for load-balancer operations.
    pub fn backend(&self) -> Backend {
        Backend::select(self)
    }
}
