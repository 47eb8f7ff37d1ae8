//! Typed platform resources.
//!
//! Each structure carries only the fields the controller reads. Responses follow the
//! v2 envelope: `{"metadata": {"guid": ...}, "entity": {...}}`, and list endpoints
//! wrap resources in a page with an optional `next_url`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Instance parameters: an arbitrary JSON object
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Resource metadata
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Metadata {
    /// Platform-assigned identifier
    pub guid: String,
}

/// A platform resource: metadata plus entity body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Resource<E> {
    /// Resource metadata
    pub metadata: Metadata,
    /// Entity fields
    pub entity: E,
}

impl<E> Resource<E> {
    /// Build a resource from its guid and entity
    pub fn new(guid: impl Into<String>, entity: E) -> Self {
        Self {
            metadata: Metadata { guid: guid.into() },
            entity,
        }
    }

    /// The resource identifier
    pub fn guid(&self) -> &str {
        &self.metadata.guid
    }
}

/// One page of a list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Page<E> {
    /// Relative URL of the next page
    #[serde(default)]
    pub next_url: Option<String>,
    /// Resources on this page
    #[serde(default = "Vec::new")]
    pub resources: Vec<Resource<E>>,
}

/// Entity body for resources that only need a name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Named {
    /// Resource name
    pub name: String,
}

impl Named {
    /// Create a named entity
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Organization
pub type Organization = Resource<Named>;
/// Space
pub type Space = Resource<Named>;
/// Application
pub type Application = Resource<Named>;
/// Service plan
pub type ServicePlan = Resource<Named>;

/// Service offering entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceOfferingEntity {
    /// Marketplace label
    pub label: String,
}

/// Service offering
pub type ServiceOffering = Resource<ServiceOfferingEntity>;

/// Service broker entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceBrokerEntity {
    /// Broker name
    pub name: String,
    /// Broker callback endpoint
    pub broker_url: String,
}

/// Service broker
pub type ServiceBroker = Resource<ServiceBrokerEntity>;

/// Service instance entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceInstanceEntity {
    /// Instance name
    pub name: String,
}

/// Service instance
pub type ServiceInstance = Resource<ServiceInstanceEntity>;

/// Service binding entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceBindingEntity {
    /// Bound application
    pub app_guid: String,
    /// Bound service instance
    pub service_instance_guid: String,
}

/// Service binding
pub type ServiceBinding = Resource<ServiceBindingEntity>;

/// State of one application instance, keyed by index in the instances listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceState {
    /// e.g. `RUNNING`, `STARTING`, `CRASHED`
    pub state: String,
}

impl InstanceState {
    /// True when the instance reports `RUNNING`
    pub fn is_running(&self) -> bool {
        self.state == "RUNNING"
    }
}

/// Stats of one application instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceStats {
    /// Instance state
    pub state: String,
    /// Runtime details, absent while the instance is down
    #[serde(default)]
    pub stats: Option<StatsDetail>,
}

/// Runtime details of an application instance
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct StatsDetail {
    /// Routes mapped to the application
    #[serde(default)]
    pub uris: Vec<String>,
}

/// Application stats keyed by instance index
pub type ApplicationStats = BTreeMap<String, InstanceStats>;

/// Body for registering a service broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewServiceBroker {
    /// Broker name
    pub name: String,
    /// Broker callback endpoint
    pub broker_url: String,
    /// Basic-auth user the platform uses against the broker
    pub auth_username: String,
    /// Basic-auth password the platform uses against the broker
    pub auth_password: String,
    /// Space the broker is private to
    pub space_guid: String,
}

/// Body for provisioning a service instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewServiceInstance {
    /// Instance name
    pub name: String,
    /// Target space
    pub space_guid: String,
    /// Plan to provision from
    pub service_plan_guid: String,
    /// Broker-specific configuration
    pub parameters: Parameters,
}
