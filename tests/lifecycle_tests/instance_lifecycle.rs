//! Publishing a broker, provisioning an instance and binding the application,
//! then tearing everything down again.

use std::sync::Arc;

use serde_json::json;

use binding_lifecycle::Error;

use super::fake::{FakePlatform, APPLICATION_GUID};
use super::{broker_scope, catalog_scope, controller, INSTANCE};

#[tokio::test]
async fn full_round_trip_through_a_published_broker() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &broker_scope()).await.unwrap();

    controller.ensure_broker_published().await.unwrap();
    assert!(controller.broker_id().is_some());
    assert!(controller.plan_id().is_some());

    controller.create_service_instance(None).await.unwrap();
    let instance_id = controller.instance_id().map(str::to_string);
    assert_eq!(instance_id, platform.instance_guid(INSTANCE));

    controller.bind_application().await.unwrap();
    controller.should_be_bound().await.unwrap();
    assert_eq!(
        controller.get_bound_applications().await.unwrap(),
        vec![APPLICATION_GUID]
    );

    controller.unbind_application().await.unwrap();
    controller.should_not_be_bound().await.unwrap();
    assert_eq!(controller.binding_id(), None);

    controller.delete_service_instance().await.unwrap();
    assert_eq!(controller.instance_id(), None);
    assert_eq!(platform.instance_guid(INSTANCE), None);

    controller.ensure_broker_unpublished().await.unwrap();
    assert_eq!(controller.broker_id(), None);
    assert_eq!(controller.plan_id(), None);
    assert_eq!(platform.broker_count(), 0);
}

#[tokio::test]
async fn publishing_twice_registers_one_broker() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &broker_scope()).await.unwrap();

    controller.ensure_broker_published().await.unwrap();
    controller.ensure_broker_published().await.unwrap();
    assert_eq!(platform.broker_count(), 1);

    assert!(matches!(
        controller.create_service_broker().await,
        Err(Error::Precondition {
            operation: "create_service_broker",
            ..
        })
    ));
}

#[tokio::test]
async fn instance_needs_a_published_broker() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &broker_scope()).await.unwrap();
    let calls = platform.calls();

    assert!(matches!(
        controller.create_service_instance(None).await,
        Err(Error::Precondition { .. })
    ));
    assert_eq!(platform.calls(), calls);
}

#[tokio::test]
async fn second_create_is_refused_while_instance_exists() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();

    controller.create_service_instance(None).await.unwrap();
    let calls = platform.calls();

    assert!(matches!(
        controller.create_service_instance(None).await,
        Err(Error::Precondition { .. })
    ));
    assert_eq!(platform.calls(), calls);
}

#[tokio::test]
async fn non_mapping_parameters_are_rejected_without_platform_calls() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    let calls = platform.calls();

    assert!(matches!(
        controller.create_service_instance(Some(json!("idle-duration=PT1M"))).await,
        Err(Error::Validation(_))
    ));
    assert_eq!(controller.instance_id(), None);
    assert_eq!(platform.calls(), calls);
}

#[tokio::test]
async fn parameters_reach_the_platform() {
    let platform = Arc::new(FakePlatform::new());
    let mut scope = catalog_scope();
    scope.default_instance_parameters = Some(json!({"idle-duration": "PT2M"}));
    let mut controller = controller(&platform, &scope).await.unwrap();

    controller.create_service_instance(None).await.unwrap();
    let instance_id = controller.instance_id().unwrap().to_string();
    let stored = platform.instance_parameters(&instance_id).unwrap();
    assert_eq!(stored.get("idle-duration"), Some(&json!("PT2M")));

    controller
        .update_service_instance(json!({
            "idle-duration": "PT5M",
            "exclude-from-auto-enrollment": "^tmp-"
        }))
        .await
        .unwrap();
    let stored = platform.instance_parameters(&instance_id).unwrap();
    assert_eq!(stored.get("idle-duration"), Some(&json!("PT5M")));
    assert_eq!(stored.get("exclude-from-auto-enrollment"), Some(&json!("^tmp-")));
}

#[tokio::test]
async fn explicit_parameters_replace_defaults() {
    let platform = Arc::new(FakePlatform::new());
    let mut scope = catalog_scope();
    scope.default_instance_parameters = Some(json!({"idle-duration": "PT2M"}));
    let mut controller = controller(&platform, &scope).await.unwrap();

    controller
        .create_service_instance(Some(json!({})))
        .await
        .unwrap();

    let instance_id = controller.instance_id().unwrap().to_string();
    assert!(platform.instance_parameters(&instance_id).unwrap().is_empty());
}

#[tokio::test]
async fn operations_on_missing_instance_are_refused() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();

    assert!(matches!(
        controller.bind_application().await,
        Err(Error::Precondition { operation: "bind_application", .. })
    ));
    assert!(matches!(
        controller.update_service_instance(json!({})).await,
        Err(Error::Precondition { .. })
    ));
    assert!(matches!(
        controller.delete_service_instance().await,
        Err(Error::Precondition { .. })
    ));
    assert!(matches!(
        controller.unbind_application().await,
        Err(Error::Precondition { .. })
    ));
    assert!(matches!(
        controller.is_bound().await,
        Err(Error::Precondition { .. })
    ));
}

#[tokio::test]
async fn delete_with_foreign_binding_surfaces_the_conflict() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    controller.create_service_instance(None).await.unwrap();
    platform.bind_intruder(controller.instance_id().unwrap());

    match controller.delete_service_instance().await {
        Err(Error::Remote(e)) => assert_eq!(e.status, 400),
        other => panic!("expected remote error, got {:?}", other.err()),
    }
    assert!(controller.instance_id().is_some());
}
