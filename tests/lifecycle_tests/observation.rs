//! Start and stop the application and check the platform agrees.

use std::sync::Arc;

use binding_lifecycle::Error;

use super::fake::FakePlatform;
use super::{catalog_scope, controller};

#[tokio::test]
async fn started_application_reports_running_instances() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();

    controller.start_application().await.unwrap();

    controller.should_be_started().await.unwrap();
    assert!(matches!(
        controller.should_be_stopped().await,
        Err(Error::Assertion(_))
    ));
}

#[tokio::test]
async fn stopped_application_has_no_instance() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    controller.start_application().await.unwrap();

    controller.stop_application().await.unwrap();

    controller.should_be_stopped().await.unwrap();
    assert!(matches!(
        controller.should_be_started().await,
        Err(Error::Assertion(_))
    ));
}

#[tokio::test]
async fn stopped_application_cannot_be_pinged() {
    let platform = Arc::new(FakePlatform::new());
    let controller = controller(&platform, &catalog_scope()).await.unwrap();

    assert!(matches!(
        controller.ping_application("/").await,
        Err(Error::Assertion(_))
    ));
}

#[tokio::test]
async fn is_bound_follows_bind_and_unbind() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    controller.create_service_instance(None).await.unwrap();

    assert!(!controller.is_bound().await.unwrap());
    controller.bind_application().await.unwrap();
    assert!(controller.is_bound().await.unwrap());
    controller.unbind_application().await.unwrap();
    assert!(!controller.is_bound().await.unwrap());
}

#[tokio::test]
async fn foreign_bindings_are_listed_but_do_not_count_as_bound() {
    let platform = Arc::new(FakePlatform::new());
    let mut controller = controller(&platform, &catalog_scope()).await.unwrap();
    controller.create_service_instance(None).await.unwrap();
    platform.bind_intruder(controller.instance_id().unwrap());

    assert!(!controller.is_bound().await.unwrap());
    assert_eq!(
        controller.get_bound_applications().await.unwrap(),
        vec![super::fake::INTRUDER_GUID]
    );
}
