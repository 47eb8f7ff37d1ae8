//! Constructing a controller resolves names into identifiers, in order, and stops
//! at the first name the platform does not know.

use std::sync::Arc;

use serde_json::json;

use binding_lifecycle::controller::CleanupPolicy;
use binding_lifecycle::error::EntityKind;
use binding_lifecycle::retry::RetryPolicy;
use binding_lifecycle::{Error, LifecycleController};

use super::fake::{FakePlatform, APPLICATION_GUID, CATALOG_PLAN_GUID, SPACE_GUID};
use super::{broker_scope, catalog_scope, controller, policy};

#[tokio::test]
async fn unknown_organization_stops_resolution_after_one_call() {
    let platform = Arc::new(FakePlatform::empty());

    let result = controller(&platform, &catalog_scope()).await;

    assert!(matches!(
        result,
        Err(Error::NotFound {
            kind: EntityKind::Organization,
            ..
        })
    ));
    assert_eq!(platform.calls(), 1);
}

#[tokio::test]
async fn unknown_application_is_reported_by_name() {
    let platform = Arc::new(FakePlatform::new());
    let mut scope = catalog_scope();
    scope.application = "missing-app".to_string();

    match controller(&platform, &scope).await {
        Err(Error::NotFound {
            kind: EntityKind::Application,
            name,
        }) => assert_eq!(name, "missing-app"),
        Err(other) => panic!("expected application not found, got {}", other),
        Ok(_) => panic!("expected application not found"),
    }
    // organization, space, application
    assert_eq!(platform.calls(), 3);
}

#[tokio::test]
async fn catalog_scope_resolves_plan_from_marketplace() {
    let platform = Arc::new(FakePlatform::new());

    let controller = controller(&platform, &catalog_scope()).await.unwrap();

    assert_eq!(controller.space().guid, SPACE_GUID);
    assert_eq!(controller.application().guid, APPLICATION_GUID);
    assert_eq!(controller.plan_id(), Some(CATALOG_PLAN_GUID));
    assert_eq!(controller.broker_id(), None);
    assert_eq!(controller.instance_id(), None);
}

#[tokio::test]
async fn unknown_catalog_plan_fails_construction() {
    let platform = Arc::new(FakePlatform::new());
    let mut scope = catalog_scope();
    if let binding_lifecycle::config::ServiceSource::Catalog(catalog) = &mut scope.service {
        catalog.plan = "premium".to_string();
    }

    assert!(matches!(
        controller(&platform, &scope).await,
        Err(Error::NotFound {
            kind: EntityKind::ServicePlan,
            ..
        })
    ));
}

#[tokio::test]
async fn unregistered_broker_leaves_plan_unknown() {
    let platform = Arc::new(FakePlatform::new());

    let controller = controller(&platform, &broker_scope()).await.unwrap();

    assert_eq!(controller.broker_id(), None);
    assert_eq!(controller.plan_id(), None);
}

#[tokio::test]
async fn registered_broker_is_found_at_construction() {
    let platform = Arc::new(FakePlatform::new());
    let scope = broker_scope();
    let mut first = controller(&platform, &scope).await.unwrap();
    first.create_service_broker().await.unwrap();

    let second = controller(&platform, &scope).await.unwrap();

    assert_eq!(second.broker_id(), first.broker_id());
    assert_eq!(second.plan_id(), first.plan_id());
    assert!(second.plan_id().is_some());
}

#[tokio::test]
async fn invalid_default_parameters_fail_before_any_call() {
    let platform = Arc::new(FakePlatform::new());
    let mut scope = catalog_scope();
    scope.default_instance_parameters = Some(json!(["not", "a", "mapping"]));

    let result = LifecycleController::new(platform.clone(), &scope, policy(3)).await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(platform.calls(), 0);
}

#[tokio::test]
async fn unusable_cleanup_policy_fails_before_any_call() {
    let platform = Arc::new(FakePlatform::new());
    let cleanup = CleanupPolicy {
        retry: RetryPolicy {
            backoff_multiplier: -2.0,
            ..RetryPolicy::immediate(5)
        },
        repair_forced_enrollment: true,
    };

    let result = LifecycleController::new(platform.clone(), &catalog_scope(), cleanup).await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(platform.calls(), 0);
}
