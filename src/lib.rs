//! binding-lifecycle - service broker, instance and binding fixtures for acceptance tests
//!
//! Drives one organization/space/application/instance/binding tuple on a Cloud
//! Foundry control plane: publishes a service broker, provisions an instance, binds
//! the application, and cleans everything up between scenarios even while other
//! actors create bindings on the same instance.
//!
//! # Modules
//!
//! - [`controller`] - the lifecycle controller (resolve, reconcile, clean, observe)
//! - [`platform`] - the platform API trait and its Cloud Foundry v2 client
//! - [`config`] - fixture configuration loaded from YAML
//! - [`retry`] - bounded retry policy used by the cleanup loop
//! - [`probe`] - application ping and autosleep service probes
//! - [`error`] - error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod platform;
pub mod probe;
pub mod retry;

pub use config::LifecycleConfig;
pub use controller::LifecycleController;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
