//! Broker, instance and binding mutations
//!
//! Every operation checks the believed state first and refuses with
//! [`Error::Precondition`] before touching the platform.

use serde_json::Value;
use tracing::info;

use super::{resolver, LifecycleController};
use crate::platform::{NewServiceBroker, NewServiceInstance, Parameters};
use crate::{Error, Result};

/// Accept only JSON objects as instance parameters
pub(crate) fn check_parameters(parameters: &Value) -> Result<Parameters> {
    match parameters {
        Value::Object(map) => Ok(map.clone()),
        other => Err(Error::validation(format!(
            "instance parameters should be a mapping, got {}",
            other
        ))),
    }
}

impl LifecycleController {
    /// Register the configured broker in the space
    pub async fn create_service_broker(&mut self) -> Result<()> {
        const OPERATION: &str = "create_service_broker";
        let broker = self.source.broker().cloned().ok_or_else(|| {
            Error::precondition(
                OPERATION,
                "the fixture is configured with a catalog service, not a broker",
            )
        })?;
        if let Some(existing) = &self.broker_id {
            return Err(Error::precondition(
                OPERATION,
                format!("service broker {} is already registered", existing),
            ));
        }

        let request = NewServiceBroker {
            name: broker.name.clone(),
            broker_url: broker.url.clone(),
            auth_username: broker.username.clone(),
            auth_password: broker.password.clone(),
            space_guid: self.space.guid.clone(),
        };
        let created = self.api().create_service_broker(&request).await?;
        let broker_id = created.guid().to_string();
        info!(broker = %broker_id, name = %broker.name, "create_service_broker - ok");
        self.broker_id = Some(broker_id);

        self.plan_id =
            resolver::derive_plan(self.api(), self.broker_id.as_deref(), broker.plan.as_deref())
                .await?;
        Ok(())
    }

    /// Unregister the broker
    pub async fn delete_service_broker(&mut self) -> Result<()> {
        const OPERATION: &str = "delete_service_broker";
        let broker_id = self.broker_id.clone().ok_or_else(|| {
            Error::precondition(OPERATION, "no service broker is registered")
        })?;

        self.api().delete_service_broker(&broker_id).await?;
        self.broker_id = None;
        self.plan_id = None;
        info!(broker = %broker_id, "delete_service_broker - ok");
        Ok(())
    }

    /// Register the broker unless it already is
    pub async fn ensure_broker_published(&mut self) -> Result<()> {
        if self.broker_id.is_none() {
            self.create_service_broker().await?;
        }
        Ok(())
    }

    /// Unregister the broker if it is registered
    pub async fn ensure_broker_unpublished(&mut self) -> Result<()> {
        if self.broker_id.is_some() {
            self.delete_service_broker().await?;
        }
        Ok(())
    }

    /// Provision the configured instance
    ///
    /// `parameters` falls back to the configured defaults, then to `{}`. Anything
    /// but a JSON object is rejected before the platform is contacted.
    pub async fn create_service_instance(&mut self, parameters: Option<Value>) -> Result<()> {
        const OPERATION: &str = "create_service_instance";
        if let Some(existing) = &self.instance_id {
            return Err(Error::precondition(
                OPERATION,
                format!(
                    "service instance {} exists, delete it before creating a new one",
                    existing
                ),
            ));
        }
        let parameters = match parameters {
            Some(value) => check_parameters(&value)?,
            None => self.default_parameters.clone().unwrap_or_default(),
        };
        let plan_id = self.plan_id.clone().ok_or_else(|| {
            Error::precondition(
                OPERATION,
                "no service plan known, publish the service broker first",
            )
        })?;

        info!(
            parameters = %serde_json::Value::Object(parameters.clone()),
            "create_service_instance - parameters"
        );
        let request = NewServiceInstance {
            name: self.instance_name.clone(),
            space_guid: self.space.guid.clone(),
            service_plan_guid: plan_id,
            parameters,
        };
        let instance = self.api().create_service_instance(&request).await?;
        info!(instance = %instance.guid(), "create_service_instance - ok");
        self.instance_id = Some(instance.guid().to_string());
        Ok(())
    }

    /// Push new parameters to the instance
    pub async fn update_service_instance(&mut self, parameters: Value) -> Result<()> {
        const OPERATION: &str = "update_service_instance";
        let instance_id = self.require_instance(OPERATION, "updating it")?;
        let parameters = check_parameters(&parameters)?;

        info!(
            instance = %instance_id,
            parameters = %serde_json::Value::Object(parameters.clone()),
            "update_service_instance - parameters"
        );
        self.api()
            .update_service_instance(&instance_id, &parameters)
            .await?;
        info!(instance = %instance_id, "update_service_instance - ok");
        Ok(())
    }

    /// Delete the instance this controller created
    pub async fn delete_service_instance(&mut self) -> Result<()> {
        const OPERATION: &str = "delete_service_instance";
        let instance_id = self.require_instance(OPERATION, "deleting it")?;

        self.api()
            .delete_service_instance(&instance_id)
            .await?
            .into_result()?;
        self.forget_instance();
        info!(instance = %instance_id, "delete_service_instance - ok");
        Ok(())
    }

    /// Bind the application to the instance
    pub async fn bind_application(&mut self) -> Result<()> {
        const OPERATION: &str = "bind_application";
        let instance_id = self.require_instance(OPERATION, "binding it")?;

        let binding = self
            .api()
            .create_binding(&self.application.guid, &instance_id)
            .await?;
        info!(binding = %binding.guid(), "bind_application - ok");
        self.binding_id = Some(binding.guid().to_string());
        Ok(())
    }

    /// Remove the binding this controller created
    pub async fn unbind_application(&mut self) -> Result<()> {
        const OPERATION: &str = "unbind_application";
        let binding_id = self.binding_id.clone().ok_or_else(|| {
            Error::precondition(OPERATION, "bind the application before unbinding it")
        })?;

        self.api().delete_binding(&binding_id).await?;
        self.binding_id = None;
        info!(binding = %binding_id, "unbind_application - ok");
        Ok(())
    }

    /// Start the application
    pub async fn start_application(&mut self) -> Result<()> {
        self.api().start_application(&self.application.guid).await?;
        info!(application = %self.application, "start_application - ok");
        Ok(())
    }

    /// Stop the application
    pub async fn stop_application(&mut self) -> Result<()> {
        self.api().stop_application(&self.application.guid).await?;
        info!(application = %self.application, "stop_application - ok");
        Ok(())
    }

    pub(crate) fn require_instance(&self, operation: &'static str, action: &str) -> Result<String> {
        self.instance_id.clone().ok_or_else(|| {
            Error::precondition(
                operation,
                format!("create the service instance before {}", action),
            )
        })
    }
}
