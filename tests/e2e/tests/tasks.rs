//! Remote task submission and failure propagation

use gateway_e2e_tests::{local_gateway, local_runtime};
use gateway_types::CallOptions;
use runtime_gateway::{FailureCause, GatewayError};

#[tokio::test]
async fn test_unregistered_function_fails_fast() {
    let gateway = local_gateway().unwrap();

    assert!(matches!(
        gateway.task::<i64>("missing"),
        Err(GatewayError::UnregisteredFunction { .. })
    ));
    assert_eq!(gateway.metrics().tasks_submitted, 0);
}

#[tokio::test]
async fn test_actor_class_is_not_a_task() {
    let gateway = local_gateway().unwrap();
    assert!(gateway.task::<i64>("Counter").is_err());
}

#[tokio::test]
async fn test_reference_argument_is_resolved() {
    let gateway = local_gateway().unwrap();

    let input = gateway.put(&10i64).await.unwrap();
    let result = gateway
        .task::<i64>("add_one")
        .unwrap()
        .arg_ref(&input)
        .remote()
        .await
        .unwrap();

    assert_eq!(gateway.get(&result).await.unwrap(), 11);
}

#[tokio::test]
async fn test_mixed_value_and_reference_arguments() {
    let gateway = local_gateway().unwrap();

    let left = gateway.put(&40i64).await.unwrap();
    let result = gateway
        .task::<i64>("add")
        .unwrap()
        .arg_ref(&left)
        .arg(&2i64)
        .remote()
        .await
        .unwrap();
    assert_eq!(gateway.get(&result).await.unwrap(), 42);

    let total = gateway
        .task::<i64>("sum")
        .unwrap()
        .arg(&vec![1i64, 2, 3, 4])
        .remote()
        .await
        .unwrap();
    assert_eq!(gateway.get(&total).await.unwrap(), 10);
}

#[tokio::test]
async fn test_wrong_arity_is_rejected() {
    let gateway = local_gateway().unwrap();

    let result = gateway.task::<i64>("add").unwrap().arg(&1i64).remote().await;
    assert!(matches!(result, Err(GatewayError::InvalidArgument { .. })));
}

#[tokio::test]
async fn test_raised_error_surfaces_on_get() {
    let gateway = local_gateway().unwrap();

    let result = gateway
        .task::<i64>("divide")
        .unwrap()
        .arg(&1i64)
        .arg(&0i64)
        .remote()
        .await
        .unwrap();

    match gateway.get(&result).await {
        Err(GatewayError::RemoteTask { failure, .. }) => {
            assert_eq!(failure.cause, FailureCause::TaskRaised);
            assert!(failure.message.contains("division by zero"));
        }
        other => panic!("expected task failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_crash_is_retried_then_reported() {
    let gateway = local_gateway().unwrap();

    let result = gateway
        .task::<i64>("crash")
        .unwrap()
        .options(CallOptions::new().with_max_retries(2))
        .remote()
        .await
        .unwrap();

    match gateway.get(&result).await {
        Err(GatewayError::RemoteTask { failure, .. }) => {
            assert_eq!(failure.cause, FailureCause::WorkerCrashed)
        }
        other => panic!("expected crash, got {:?}", other),
    }
    assert_eq!(gateway.metrics().task_retries, 2);
}

#[tokio::test]
async fn test_lost_dependency_fails_dependent_task() {
    let (gateway, runtime) = local_runtime().unwrap();

    let input = gateway.put(&1i64).await.unwrap();
    runtime.evict_object(&input.id()).unwrap();

    let result = gateway
        .task::<i64>("add_one")
        .unwrap()
        .arg_ref(&input)
        .remote()
        .await
        .unwrap();

    match gateway.get(&result).await {
        Err(GatewayError::RemoteTask { failure, .. }) => {
            assert_eq!(failure.cause, FailureCause::DependencyFailed)
        }
        other => panic!("expected dependency failure, got {:?}", other),
    }
}
