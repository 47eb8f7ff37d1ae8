//! Read-only checks of the platform state

use tracing::info;

use super::LifecycleController;
use crate::platform::InstancesReport;
use crate::{Error, Result};

impl LifecycleController {
    /// True iff the application is bound to the instance this controller created
    pub async fn is_bound(&self) -> Result<bool> {
        let instance_id = self.require_instance("is_bound", "testing if bound")?;
        let binding = self
            .api()
            .find_binding(&instance_id, &self.application.guid)
            .await?;
        let bound = binding.is_some();
        info!(bound, "is_bound");
        Ok(bound)
    }

    /// Fail unless the application is bound to the instance
    pub async fn should_be_bound(&self) -> Result<()> {
        if !self.is_bound().await? {
            return Err(Error::assertion(format!(
                "application {} should be bound to service instance {}",
                self.application.name, self.instance_name
            )));
        }
        info!("should_be_bound - ok");
        Ok(())
    }

    /// Fail if the application is bound to the instance
    pub async fn should_not_be_bound(&self) -> Result<()> {
        if self.is_bound().await? {
            return Err(Error::assertion(format!(
                "application {} should not be bound to service instance {}",
                self.application.name, self.instance_name
            )));
        }
        info!("should_not_be_bound - ok");
        Ok(())
    }

    /// Applications bound to the instance, in platform listing order
    pub async fn get_bound_applications(&self) -> Result<Vec<String>> {
        let instance_id =
            self.require_instance("get_bound_applications", "getting bound applications")?;
        let applications: Vec<String> = self
            .api()
            .list_bindings(&instance_id)
            .await?
            .into_iter()
            .map(|binding| binding.entity.app_guid)
            .collect();
        info!(count = applications.len(), "get_bound_applications");
        Ok(applications)
    }

    /// Fail unless every instance of the application is running
    pub async fn should_be_started(&self) -> Result<()> {
        match self.api().application_instances(&self.application.guid).await? {
            InstancesReport::Reported(instances) => {
                if let Some((index, instance)) = instances.iter().find(|(_, i)| !i.is_running()) {
                    return Err(Error::assertion(format!(
                        "instance {} of application {} is {}, not RUNNING",
                        index, self.application.name, instance.state
                    )));
                }
            }
            InstancesReport::NoInstances => {
                return Err(Error::assertion(format!(
                    "application {} has no instance running",
                    self.application.name
                )));
            }
        }
        info!("should_be_started - ok");
        Ok(())
    }

    /// Fail unless the platform reports the application has no instance
    pub async fn should_be_stopped(&self) -> Result<()> {
        match self.api().application_instances(&self.application.guid).await? {
            InstancesReport::NoInstances => {
                info!("should_be_stopped - ok");
                Ok(())
            }
            InstancesReport::Reported(instances) => Err(Error::assertion(format!(
                "application {} should have no instance, found {}",
                self.application.name,
                instances.len()
            ))),
        }
    }
}
