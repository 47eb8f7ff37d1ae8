//! Cleanup convergence loop
//!
//! Brings the platform to "no instance, no bindings" for the configured instance
//! name, whatever the controller currently believes. The instance is looked up by
//! name, its bindings are deleted, and the delete is retried while the platform
//! answers with one of the recoverable conflicts:
//!
//! - association not empty: another actor bound the instance since the listing;
//!   bindings are listed and deleted again
//! - forced enrollment: the broker refuses to delete a force-enrolled instance;
//!   the instance is switched back to standard enrollment first (opt-out via
//!   [`CleanupPolicy::repair_forced_enrollment`])
//!
//! The number of delete attempts is bounded by [`CleanupPolicy::retry`].

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::LifecycleController;
use crate::error::{Conflict, RemoteError};
use crate::platform::{InstanceDeletion, Parameters};
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Parameter selecting the enrollment mode of an autosleep instance
pub const ENROLLMENT_PARAMETER: &str = "auto-enrollment";

/// Parameter carrying the broker secret required to leave forced enrollment
pub const SECRET_PARAMETER: &str = "secret";

/// How hard the cleanup loop tries
#[derive(Clone, Debug, PartialEq)]
pub struct CleanupPolicy {
    /// Bound on instance delete attempts
    pub retry: RetryPolicy,
    /// Switch a force-enrolled instance to standard enrollment so it can be deleted.
    ///
    /// This changes the instance configuration as a side effect of cleanup; turn it
    /// off to surface the conflict instead.
    pub repair_forced_enrollment: bool,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            repair_forced_enrollment: true,
        }
    }
}

impl LifecycleController {
    /// Delete the configured instance and all its bindings, if it exists
    ///
    /// Calling this when no instance exists is a no-op. On success the believed
    /// `instance_id` and `binding_id` are cleared.
    #[instrument(skip(self), fields(instance = %self.instance_name, space = %self.space.guid))]
    pub async fn clean_all_service_data(&mut self) -> Result<()> {
        let Some(instance) = self
            .api()
            .find_service_instance(&self.space.guid, &self.instance_name)
            .await?
        else {
            info!("clean_all_service_data - no instance to delete");
            self.forget_instance();
            return Ok(());
        };
        let instance_id = instance.guid().to_string();
        info!(instance_guid = %instance_id, "clean_all_service_data - instance found");

        let mut backoff = self.cleanup.retry.backoff();
        let mut relist_bindings = true;
        loop {
            if relist_bindings {
                self.delete_bindings(&instance_id).await?;
            }

            let conflict = match self.api().delete_service_instance(&instance_id).await? {
                InstanceDeletion::Deleted => break,
                InstanceDeletion::Blocked {
                    conflict: Conflict::AssociationNotEmpty,
                    ..
                } => {
                    debug!("Binding appeared in the meantime, looping again");
                    relist_bindings = true;
                    Conflict::AssociationNotEmpty
                }
                InstanceDeletion::Blocked {
                    conflict: Conflict::ForcedEnrollment,
                    error,
                } => {
                    self.leave_forced_enrollment(&instance_id, error).await?;
                    relist_bindings = false;
                    Conflict::ForcedEnrollment
                }
            };

            match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    warn!(
                        attempts = backoff.attempts(),
                        conflict = %conflict,
                        "clean_all_service_data - giving up"
                    );
                    return Err(Error::ConvergenceTimeout {
                        instance: self.instance_name.clone(),
                        attempts: backoff.attempts(),
                        last_conflict: conflict,
                    });
                }
            }
        }

        info!(instance_guid = %instance_id, "clean_all_service_data - instance deleted");
        self.forget_instance();
        Ok(())
    }

    /// Delete every binding currently listed for the instance
    ///
    /// A failed delete is logged and skipped: the instance delete that follows
    /// reports any binding still present and the bindings are listed again.
    async fn delete_bindings(&self, instance_id: &str) -> Result<()> {
        for binding in self.api().list_bindings(instance_id).await? {
            match self.api().delete_binding(binding.guid()).await {
                Ok(()) => info!(
                    binding = %binding.guid(),
                    "clean_all_service_data - binding deleted"
                ),
                Err(e) => warn!(
                    binding = %binding.guid(),
                    error = %e,
                    "clean_all_service_data - failed to delete binding"
                ),
            }
        }
        Ok(())
    }

    async fn leave_forced_enrollment(&self, instance_id: &str, error: RemoteError) -> Result<()> {
        let secret = match self.source.broker() {
            Some(broker) if self.cleanup.repair_forced_enrollment => broker.password.clone(),
            _ => return Err(error.into()),
        };

        info!(
            instance_guid = %instance_id,
            "Instance is in forced enrollment, switching to standard"
        );
        let mut parameters = Parameters::new();
        parameters.insert(ENROLLMENT_PARAMETER.to_string(), json!("standard"));
        parameters.insert(SECRET_PARAMETER.to_string(), json!(secret));
        self.api()
            .update_service_instance(instance_id, &parameters)
            .await
    }
}
