//! Fixture configuration.
//!
//! Loaded once by the entry point from a YAML file and handed to
//! [`LifecycleController::connect`](crate::controller::LifecycleController::connect).
//! Nothing here is global: every controller gets its own copy.
//!
//! ```yaml
//! client:
//!   target_endpoint: https://api.example.com
//!   username: admin
//!   password: secret
//! scope:
//!   organization: acceptance
//!   space: autosleep
//!   application: sample-app
//!   instance: autosleep-instance
//!   service:
//!     broker:
//!       name: autosleep
//!       url: https://autosleep.example.com
//!       username: broker
//!       password: broker-secret
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::CleanupPolicy;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Default per-request timeout of the platform client
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Complete fixture configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Platform API connection
    pub client: ClientConfig,
    /// Entities the controller manages
    pub scope: ScopeConfig,
    /// Cleanup loop tuning
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// Autosleep service probe, if the suite uses it
    #[serde(default)]
    pub autosleep: Option<AutosleepConfig>,
}

/// Platform API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// API endpoint, e.g. `https://api.example.com`
    pub target_endpoint: String,
    /// Disable TLS certificate verification
    #[serde(default)]
    pub skip_ssl_validation: bool,
    /// Platform user
    pub username: String,
    /// Platform password
    pub password: String,
    /// HTTP(S) proxy for every platform call
    #[serde(default)]
    pub proxy: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Names of the managed entities
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    /// Organization name
    pub organization: String,
    /// Space name
    pub space: String,
    /// Application the instance gets bound to
    pub application: String,
    /// Name of the managed service instance
    pub instance: String,
    /// Parameters used when an instance is created without explicit ones
    #[serde(default)]
    pub default_instance_parameters: Option<serde_json::Value>,
    /// Where the service plan comes from, written as `catalog: {..}` or `broker: {..}`
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub service: ServiceSource,
}

/// Where the plan used to provision instances comes from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSource {
    /// A service already in the marketplace
    Catalog(CatalogService),
    /// A broker this fixture registers (and unregisters) in the space
    Broker(BrokerRegistration),
}

impl ServiceSource {
    /// Broker registration, when running in broker mode
    pub fn broker(&self) -> Option<&BrokerRegistration> {
        match self {
            Self::Broker(broker) => Some(broker),
            Self::Catalog(_) => None,
        }
    }
}

/// Marketplace service and plan names
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogService {
    /// Service label
    pub service: String,
    /// Plan name
    pub plan: String,
}

/// Broker endpoint and credentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerRegistration {
    /// Broker name
    pub name: String,
    /// Broker endpoint URL
    pub url: String,
    /// Basic-auth user
    pub username: String,
    /// Basic-auth password, also the secret the broker expects on privileged updates
    pub password: String,
    /// Plan to use; the first plan of the broker when absent
    #[serde(default)]
    pub plan: Option<String>,
}

/// Cleanup loop tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Delete attempts before giving up
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay_ms: u64,
    /// Delay cap
    pub max_delay_ms: u64,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Switch force-enrolled instances back to standard enrollment to delete them
    pub repair_forced_enrollment: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_attempts: retry.max_attempts,
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            backoff_multiplier: retry.backoff_multiplier,
            repair_forced_enrollment: true,
        }
    }
}

impl CleanupConfig {
    /// Build the cleanup policy used by the controller
    pub fn policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                initial_delay: Duration::from_millis(self.initial_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                backoff_multiplier: self.backoff_multiplier,
            },
            repair_forced_enrollment: self.repair_forced_enrollment,
        }
    }
}

/// Autosleep service dashboard API
#[derive(Debug, Clone, Deserialize)]
pub struct AutosleepConfig {
    /// Service endpoint, e.g. `https://autosleep.example.com`
    pub endpoint: String,
    /// Basic-auth user
    pub username: String,
    /// Basic-auth password
    pub password: String,
}

impl LifecycleConfig {
    /// Read and validate a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        let config = Self::parse(&data)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(data: &str) -> Result<Self> {
        let config = Self::parse(data).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn parse(data: &str) -> std::result::Result<Self, String> {
        serde_yaml::from_str(data).map_err(|e| format!("invalid YAML: {}", e))
    }

    /// Check the values serde cannot express
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("client.target_endpoint", &self.client.target_endpoint),
            ("scope.organization", &self.scope.organization),
            ("scope.space", &self.scope.space),
            ("scope.application", &self.scope.application),
            ("scope.instance", &self.scope.instance),
        ];
        if let Some((field, _)) = names.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::validation(format!("{} must not be empty", field)));
        }

        if let Some(params) = &self.scope.default_instance_parameters {
            if !params.is_object() {
                return Err(Error::validation(format!(
                    "scope.default_instance_parameters must be a mapping, got {}",
                    params
                )));
            }
        }

        if self.cleanup.max_attempts == 0 {
            return Err(Error::validation("cleanup.max_attempts must be at least 1"));
        }
        let multiplier = self.cleanup.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::validation(
                "cleanup.backoff_multiplier must be a finite number >= 1.0",
            ));
        }

        Ok(())
    }

    /// Override the platform credentials (e.g. from the environment)
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        if let Some(username) = username {
            self.client.username = username;
        }
        if let Some(password) = password {
            self.client.password = password;
        }
        self
    }
}
