//! Name to identifier resolution
//!
//! Lookup order is organization → space → application → broker → plan, and the
//! first miss stops the chain. Broker and plan are re-derived whenever the broker
//! identity changes, so [`derive_plan`] is a function of the broker id alone.

use std::fmt;

use tracing::debug;

use crate::config::{CatalogService, ScopeConfig, ServiceSource};
use crate::error::EntityKind;
use crate::platform::{PlatformApi, ServicePlan};
use crate::{Error, Result};

/// A resolved platform entity: identifier plus the name it was found by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Platform-assigned identifier
    pub guid: String,
    /// Name used for the lookup
    pub name: String,
}

impl Identity {
    /// Create an identity
    pub fn new(guid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.guid)
    }
}

pub(crate) struct ResolvedScope {
    pub(crate) organization: Identity,
    pub(crate) space: Identity,
    pub(crate) application: Identity,
    pub(crate) broker_id: Option<String>,
    pub(crate) plan_id: Option<String>,
}

pub(crate) async fn resolve(api: &dyn PlatformApi, scope: &ScopeConfig) -> Result<ResolvedScope> {
    let organization = api
        .find_organization(&scope.organization)
        .await?
        .ok_or_else(|| Error::not_found(EntityKind::Organization, &scope.organization))?;
    let organization = Identity::new(organization.guid(), &scope.organization);

    let space = api
        .find_space(&organization.guid, &scope.space)
        .await?
        .ok_or_else(|| Error::not_found(EntityKind::Space, &scope.space))?;
    let space = Identity::new(space.guid(), &scope.space);

    let application = api
        .find_application(&space.guid, &scope.application)
        .await?
        .ok_or_else(|| Error::not_found(EntityKind::Application, &scope.application))?;
    let application = Identity::new(application.guid(), &scope.application);

    let (broker_id, plan_id) = match &scope.service {
        ServiceSource::Catalog(catalog) => (None, Some(catalog_plan(api, catalog).await?)),
        ServiceSource::Broker(broker) => {
            // an unregistered broker is the starting point of create_service_broker
            let broker_id = api
                .find_service_broker(&space.guid, &broker.name, &broker.url)
                .await?
                .map(|b| b.guid().to_string());
            let plan_id = derive_plan(api, broker_id.as_deref(), broker.plan.as_deref()).await?;
            (broker_id, plan_id)
        }
    };

    Ok(ResolvedScope {
        organization,
        space,
        application,
        broker_id,
        plan_id,
    })
}

async fn catalog_plan(api: &dyn PlatformApi, catalog: &CatalogService) -> Result<String> {
    let service = api
        .find_service_offering(&catalog.service)
        .await?
        .ok_or_else(|| Error::not_found(EntityKind::ServiceOffering, &catalog.service))?;

    let plans = api.list_service_plans(service.guid()).await?;
    pick_plan(plans, Some(&catalog.plan))
        .map(|plan| plan.guid().to_string())
        .ok_or_else(|| Error::not_found(EntityKind::ServicePlan, &catalog.plan))
}

/// Plan exposed by a broker: the named one, or the first one when no name is given
///
/// An absent broker has no plan.
pub(crate) async fn derive_plan(
    api: &dyn PlatformApi,
    broker_id: Option<&str>,
    plan_name: Option<&str>,
) -> Result<Option<String>> {
    let Some(broker_id) = broker_id else {
        return Ok(None);
    };

    for offering in api.list_broker_offerings(broker_id).await? {
        let plans = api.list_service_plans(offering.guid()).await?;
        if let Some(plan) = pick_plan(plans, plan_name) {
            debug!(
                broker = %broker_id,
                service = %offering.entity.label,
                plan = %plan.entity.name,
                "Derived plan from broker"
            );
            return Ok(Some(plan.guid().to_string()));
        }
    }

    let wanted = match plan_name {
        Some(name) => name.to_string(),
        None => format!("any plan of broker {}", broker_id),
    };
    Err(Error::not_found(EntityKind::ServicePlan, wanted))
}

fn pick_plan(plans: Vec<ServicePlan>, plan_name: Option<&str>) -> Option<ServicePlan> {
    match plan_name {
        Some(name) => plans.into_iter().find(|p| p.entity.name == name),
        None => plans.into_iter().next(),
    }
}
