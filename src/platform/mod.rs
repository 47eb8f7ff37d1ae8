//! Platform API abstraction
//!
//! The controller talks to the control plane only through [`PlatformApi`]. The
//! production implementation is [`CloudFoundryClient`]; tests substitute a mock or
//! an in-memory fake.
//!
//! Operations whose negative outcome is *expected* by some caller return a
//! classified value instead of an error:
//! - instance deletion returns [`InstanceDeletion::Blocked`] for the recoverable
//!   conflicts the cleanup loop works around
//! - the instances listing returns [`InstancesReport::NoInstances`] when the
//!   application is stopped

mod cloudfoundry;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

pub use cloudfoundry::CloudFoundryClient;
pub use types::*;

use crate::error::{Conflict, RemoteError};
use crate::Error;

/// Outcome of a service instance delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceDeletion {
    /// The instance is gone
    Deleted,
    /// The platform refused with a recoverable conflict
    Blocked {
        /// Classified conflict
        conflict: Conflict,
        /// Raw answer, for callers that treat the conflict as fatal
        error: RemoteError,
    },
}

impl InstanceDeletion {
    /// Treat any conflict as a failure
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::Deleted => Ok(()),
            Self::Blocked { error, .. } => Err(error.into()),
        }
    }
}

/// Outcome of listing the instances of an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstancesReport {
    /// Instance states keyed by index
    Reported(BTreeMap<String, InstanceState>),
    /// The platform reports the application has no instances (stopped)
    NoInstances,
}

/// Trait abstracting the control-plane calls used by the lifecycle controller
///
/// Lookups return `Ok(None)` when nothing matches; only transport failures,
/// non-2xx answers and undecodable bodies are errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Find an organization by exact name
    async fn find_organization(&self, name: &str) -> Result<Option<Organization>, Error>;

    /// Find a space by exact name inside an organization
    async fn find_space(&self, organization_guid: &str, name: &str)
        -> Result<Option<Space>, Error>;

    /// Find an application by exact name inside a space
    async fn find_application(
        &self,
        space_guid: &str,
        name: &str,
    ) -> Result<Option<Application>, Error>;

    /// Find a marketplace service offering by label
    async fn find_service_offering(&self, label: &str) -> Result<Option<ServiceOffering>, Error>;

    /// List the offerings exposed by a broker
    async fn list_broker_offerings(&self, broker_guid: &str)
        -> Result<Vec<ServiceOffering>, Error>;

    /// List the plans of a service offering
    async fn list_service_plans(&self, service_guid: &str) -> Result<Vec<ServicePlan>, Error>;

    /// Find a broker in a space matching both name and endpoint URL
    async fn find_service_broker(
        &self,
        space_guid: &str,
        name: &str,
        broker_url: &str,
    ) -> Result<Option<ServiceBroker>, Error>;

    /// Register a service broker
    async fn create_service_broker(
        &self,
        request: &NewServiceBroker,
    ) -> Result<ServiceBroker, Error>;

    /// Remove a service broker
    async fn delete_service_broker(&self, broker_guid: &str) -> Result<(), Error>;

    /// Find a service instance by exact name inside a space
    async fn find_service_instance(
        &self,
        space_guid: &str,
        name: &str,
    ) -> Result<Option<ServiceInstance>, Error>;

    /// Provision a service instance
    async fn create_service_instance(
        &self,
        request: &NewServiceInstance,
    ) -> Result<ServiceInstance, Error>;

    /// Push new parameters to a service instance
    async fn update_service_instance(
        &self,
        instance_guid: &str,
        parameters: &Parameters,
    ) -> Result<(), Error>;

    /// Delete a service instance, classifying recoverable conflicts
    async fn delete_service_instance(&self, instance_guid: &str)
        -> Result<InstanceDeletion, Error>;

    /// List bindings of a service instance, in platform order
    async fn list_bindings(&self, instance_guid: &str) -> Result<Vec<ServiceBinding>, Error>;

    /// Find the binding between an instance and an application
    async fn find_binding(
        &self,
        instance_guid: &str,
        app_guid: &str,
    ) -> Result<Option<ServiceBinding>, Error>;

    /// Bind an application to a service instance
    async fn create_binding(
        &self,
        app_guid: &str,
        instance_guid: &str,
    ) -> Result<ServiceBinding, Error>;

    /// Delete a binding
    async fn delete_binding(&self, binding_guid: &str) -> Result<(), Error>;

    /// Report the state of each application instance
    async fn application_instances(&self, app_guid: &str) -> Result<InstancesReport, Error>;

    /// Runtime stats (routes) of each application instance
    async fn application_stats(&self, app_guid: &str) -> Result<ApplicationStats, Error>;

    /// Request the application to be started
    async fn start_application(&self, app_guid: &str) -> Result<(), Error>;

    /// Request the application to be stopped
    async fn stop_application(&self, app_guid: &str) -> Result<(), Error>;
}
