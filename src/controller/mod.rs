//! Lifecycle controller
//!
//! Tracks one organization/space/application/instance/binding tuple and keeps the
//! believed state (`broker_id`, `plan_id`, `instance_id`, `binding_id`) in step with
//! the platform.
//!
//! - [`resolver`] turns configured names into identifiers at construction
//! - [`reconciler`] creates and deletes brokers, instances and bindings
//! - [`cleaner`] force-deletes the instance and its bindings between scenarios
//! - [`observer`] checks that the platform agrees with the believed state
//!
//! Every operation takes `&mut self` (or `&self` for read-only checks), so one
//! controller can never run two operations at the same time.

pub mod cleaner;
pub mod observer;
pub mod reconciler;
pub mod resolver;

use std::sync::Arc;

use tracing::info;

pub use cleaner::CleanupPolicy;
pub use resolver::Identity;

use crate::config::{LifecycleConfig, ScopeConfig, ServiceSource};
use crate::platform::{CloudFoundryClient, Parameters, PlatformApi};
use crate::Result;

/// Lifecycle controller for one service binding fixture
pub struct LifecycleController {
    api: Arc<dyn PlatformApi>,
    source: ServiceSource,
    instance_name: String,
    default_parameters: Option<Parameters>,
    cleanup: CleanupPolicy,

    organization: Identity,
    space: Identity,
    application: Identity,

    broker_id: Option<String>,
    plan_id: Option<String>,
    instance_id: Option<String>,
    binding_id: Option<String>,
}

impl LifecycleController {
    /// Connect to the platform described by `config` and resolve the scope
    pub async fn connect(config: &LifecycleConfig) -> Result<Self> {
        let api = Arc::new(CloudFoundryClient::new(&config.client)?);
        Self::new(api, &config.scope, config.cleanup.policy()).await
    }

    /// Resolve the scope through `api` and build a controller with empty state
    ///
    /// The cleanup policy and default instance parameters are validated before any
    /// platform call.
    pub async fn new(
        api: Arc<dyn PlatformApi>,
        scope: &ScopeConfig,
        cleanup: CleanupPolicy,
    ) -> Result<Self> {
        cleanup.retry.validate()?;
        let default_parameters = scope
            .default_instance_parameters
            .as_ref()
            .map(reconciler::check_parameters)
            .transpose()?;

        let resolved = resolver::resolve(api.as_ref(), scope).await?;

        info!(
            organization = %resolved.organization,
            space = %resolved.space,
            application = %resolved.application,
            broker = ?resolved.broker_id,
            plan = ?resolved.plan_id,
            "Resolved fixture scope"
        );

        Ok(Self {
            api,
            source: scope.service.clone(),
            instance_name: scope.instance.clone(),
            default_parameters,
            cleanup,
            organization: resolved.organization,
            space: resolved.space,
            application: resolved.application,
            broker_id: resolved.broker_id,
            plan_id: resolved.plan_id,
            instance_id: None,
            binding_id: None,
        })
    }

    /// Organization the fixture lives in
    pub fn organization(&self) -> &Identity {
        &self.organization
    }

    /// Space the fixture lives in
    pub fn space(&self) -> &Identity {
        &self.space
    }

    /// Application the instance gets bound to
    pub fn application(&self) -> &Identity {
        &self.application
    }

    /// Name of the managed service instance
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Registered broker, when known
    pub fn broker_id(&self) -> Option<&str> {
        self.broker_id.as_deref()
    }

    /// Plan used for new instances, when known
    pub fn plan_id(&self) -> Option<&str> {
        self.plan_id.as_deref()
    }

    /// Instance created by this controller, if any
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Binding created by this controller, if any
    pub fn binding_id(&self) -> Option<&str> {
        self.binding_id.as_deref()
    }

    pub(crate) fn api(&self) -> &dyn PlatformApi {
        self.api.as_ref()
    }

    fn forget_instance(&mut self) {
        self.instance_id = None;
        self.binding_id = None;
    }

    /// Build a controller with an already resolved scope
    #[cfg(test)]
    pub(crate) fn for_testing(
        api: Arc<dyn PlatformApi>,
        source: ServiceSource,
        plan_id: Option<&str>,
        broker_id: Option<&str>,
    ) -> Self {
        Self {
            api,
            source,
            instance_name: "autosleep-acceptance".to_string(),
            default_parameters: None,
            cleanup: CleanupPolicy {
                retry: crate::retry::RetryPolicy::immediate(3),
                repair_forced_enrollment: true,
            },
            organization: Identity::new("org-guid", "acceptance"),
            space: Identity::new("space-guid", "autosleep"),
            application: Identity::new("app-guid", "sample-app"),
            broker_id: broker_id.map(str::to_string),
            plan_id: plan_id.map(str::to_string),
            instance_id: None,
            binding_id: None,
        }
    }
}
