//! Cleaning converges to "no instance, no binding" even while another actor keeps
//! binding the instance, and gives up after a bounded number of attempts.

use std::sync::Arc;

use serde_json::json;

use binding_lifecycle::controller::CleanupPolicy;
use binding_lifecycle::error::Conflict;
use binding_lifecycle::retry::RetryPolicy;
use binding_lifecycle::{Error, LifecycleController};

use super::fake::{repaired_parameters, FakePlatform};
use super::{broker_scope, catalog_scope, controller, policy, INSTANCE};

#[tokio::test]
async fn cleaning_nothing_is_a_no_op() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();

    controller.clean_all_service_data().await.unwrap();
    controller.clean_all_service_data().await.unwrap();

    assert_eq!(platform.delete_attempts(), 0);
    assert_eq!(controller.instance_id(), None);
}

#[tokio::test]
async fn cleaning_finds_the_instance_by_name() {
    let platform = Arc::new(FakePlatform::new());
    let scope = catalog_scope();
    let mut previous_run = controller(&platform, &scope).await.unwrap();
    previous_run.create_service_instance(None).await.unwrap();
    previous_run.bind_application().await.unwrap();

    // a fresh controller knows nothing about the leftover instance
    let mut controller = controller(&platform, &scope).await.unwrap();
    controller.clean_all_service_data().await.unwrap();

    assert_eq!(platform.instance_guid(INSTANCE), None);
    assert_eq!(platform.binding_count(), 0);
    assert_eq!(platform.delete_attempts(), 1);
}

#[tokio::test]
async fn cleaning_clears_believed_state() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    controller.create_service_instance(None).await.unwrap();
    controller.bind_application().await.unwrap();

    controller.clean_all_service_data().await.unwrap();

    assert_eq!(controller.instance_id(), None);
    assert_eq!(controller.binding_id(), None);
    // a new instance can be created right away
    controller.create_service_instance(None).await.unwrap();
}

#[tokio::test]
async fn cleaning_outlasts_racing_bindings() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    controller.create_service_instance(None).await.unwrap();
    platform.race_bindings(2);

    controller.clean_all_service_data().await.unwrap();

    assert_eq!(platform.delete_attempts(), 3);
    assert_eq!(platform.instance_guid(INSTANCE), None);
    assert_eq!(platform.binding_count(), 0);
}

#[tokio::test]
async fn cleaning_gives_up_when_bindings_keep_appearing() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = LifecycleController::new(platform.clone(), &catalog_scope(), policy(3))
        .await
        .unwrap();
    controller.create_service_instance(None).await.unwrap();
    platform.race_bindings(u32::MAX);

    match controller.clean_all_service_data().await {
        Err(Error::ConvergenceTimeout {
            attempts,
            last_conflict,
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_conflict, Conflict::AssociationNotEmpty);
        }
        other => panic!("expected convergence timeout, got {:?}", other.err()),
    }
    assert_eq!(platform.delete_attempts(), 3);
    assert!(platform.instance_guid(INSTANCE).is_some());
}

#[tokio::test]
async fn cleaning_leaves_forced_enrollment_with_broker_secret() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &broker_scope()).await.unwrap();
    controller.ensure_broker_published().await.unwrap();
    controller
        .create_service_instance(Some(json!({"auto-enrollment": "forced"})))
        .await
        .unwrap();
    let instance_id = controller.instance_id().unwrap().to_string();

    controller.clean_all_service_data().await.unwrap();

    assert_eq!(platform.instance_parameters(&instance_id), None);
    assert_eq!(platform.updates(), vec![(instance_id, repaired_parameters())]);
    assert_eq!(platform.delete_attempts(), 2);
}

#[tokio::test]
async fn forced_enrollment_is_fatal_when_repair_is_disabled() {
    let platform = Arc::new(FakePlatform::new());
    let cleanup = CleanupPolicy {
        retry: RetryPolicy::immediate(5),
        repair_forced_enrollment: false,
    };
    let mut controller = LifecycleController::new(platform.clone(), &broker_scope(), cleanup)
        .await
        .unwrap();
    controller.ensure_broker_published().await.unwrap();
    controller
        .create_service_instance(Some(json!({"auto-enrollment": "forced"})))
        .await
        .unwrap();
    let instance_id = controller.instance_id().unwrap().to_string();

    match controller.clean_all_service_data().await {
        Err(Error::Remote(e)) => {
            assert_eq!(e.conflict(), Some(Conflict::ForcedEnrollment));
        }
        other => panic!("expected remote error, got {:?}", other.err()),
    }
    assert_eq!(platform.delete_attempts(), 1);
    assert!(platform.updates().is_empty());
    let stored = platform.instance_parameters(&instance_id).unwrap();
    assert_eq!(stored.get("auto-enrollment"), Some(&json!("forced")));
}

#[tokio::test]
async fn forced_enrollment_cannot_be_repaired_without_broker_credentials() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    controller
        .create_service_instance(Some(json!({"auto-enrollment": "forced"})))
        .await
        .unwrap();

    assert!(matches!(
        controller.clean_all_service_data().await,
        Err(Error::Remote(_))
    ));
    assert!(platform.instance_guid(INSTANCE).is_some());
}
