//! Object store behaviour through the public gateway

use gateway_e2e_tests::local_gateway;
use runtime_gateway::GatewayError;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_put_get_and_reference_counting() {
    let gateway = local_gateway().unwrap();

    let value = gateway.put(&vec![1i64, 2, 3]).await.unwrap();
    assert_eq!(gateway.get(&value).await.unwrap(), vec![1, 2, 3]);
    assert_eq!(gateway.local_reference_count(&value), 1);

    let copies: Vec<_> = (0..3).map(|_| value.clone()).collect();
    assert_eq!(gateway.local_reference_count(&value), 4);
    drop(copies);
    assert_eq!(gateway.local_reference_count(&value), 1);

    let id = value.id();
    drop(value);
    assert!(matches!(
        gateway.runtime().get(&id).await,
        Err(GatewayError::ObjectNotFound { .. })
    ));
}

#[tokio::test]
async fn test_adopt_keeps_object_alive() {
    let gateway = local_gateway().unwrap();

    let original = gateway.put(&"shared".to_string()).await.unwrap();
    let adopted = gateway.adopt::<String>(original.id()).unwrap();
    drop(original);

    assert_eq!(gateway.get(&adopted).await.unwrap(), "shared");
}

#[tokio::test]
async fn test_get_all_preserves_input_order() {
    let gateway = local_gateway().unwrap();

    let mut objects = Vec::new();
    for i in 0..5i64 {
        objects.push(gateway.put(&(i * 10)).await.unwrap());
    }
    objects.reverse();

    assert_eq!(gateway.get_all(&objects).await.unwrap(), vec![40, 30, 20, 10, 0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_returns_on_timeout() {
    let gateway = local_gateway().unwrap();

    let ready = gateway.put(&1i64).await.unwrap();
    let slow = gateway
        .task::<i64>("sleep_then")
        .unwrap()
        .arg(&500u64)
        .arg(&2i64)
        .remote()
        .await
        .unwrap();

    let started = Instant::now();
    let flags = gateway.wait(&[ready.clone(), slow.clone()], 2, 50).await.unwrap();
    assert_eq!(flags, vec![true, false]);
    assert!(started.elapsed() < Duration::from_millis(400));

    // One settled object is enough
    let flags = gateway.wait(&[ready, slow.clone()], 1, 0).await.unwrap();
    assert_eq!(flags, vec![true, false]);

    assert_eq!(gateway.get(&slow).await.unwrap(), 2);
}

#[tokio::test]
async fn test_wait_rejects_bad_counts() {
    let gateway = local_gateway().unwrap();
    let a = gateway.put(&1i64).await.unwrap();

    assert!(matches!(
        gateway.wait(&[a.clone()], 2, 10).await,
        Err(GatewayError::InvalidArgument { .. })
    ));
    assert!(matches!(
        gateway.wait(&[a], 0, 10).await,
        Err(GatewayError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_operations_after_shutdown_fail() {
    let gateway = local_gateway().unwrap();
    let held = gateway.put(&7i64).await.unwrap();

    gateway.shutdown().await;
    assert!(!gateway.is_initialized());

    assert!(matches!(
        gateway.put(&1i64).await,
        Err(GatewayError::RuntimeShutdown)
    ));
    // Dropping a handle after shutdown is quiet
    drop(held);
}
