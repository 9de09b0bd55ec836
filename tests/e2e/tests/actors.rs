//! Actor lifecycle through the public gateway

use gateway_e2e_tests::local_gateway;
use gateway_types::{ActorCreationOptions, ActorState, Channel, LifecycleEvent};
use runtime_gateway::{GatewayError, Subscription};
use std::time::Duration;

async fn next_state(subscription: &mut Subscription) -> ActorState {
    match tokio::time::timeout(Duration::from_secs(5), subscription.recv()).await {
        Ok(Some(LifecycleEvent::Actor { state, .. })) => state,
        other => panic!("expected actor event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_method_calls_run_in_submission_order() {
    let gateway = local_gateway().unwrap();
    let counter = gateway.actor("Counter").unwrap().arg(&0i64).remote().await.unwrap();

    let mut results = Vec::new();
    for _ in 0..20 {
        results.push(
            gateway
                .method::<i64>(&counter, "Counter.incr")
                .unwrap()
                .arg(&1i64)
                .remote()
                .await
                .unwrap(),
        );
    }

    assert_eq!(
        gateway.get_all(&results).await.unwrap(),
        (1..=20).collect::<Vec<i64>>()
    );
}

#[tokio::test]
async fn test_killed_actor_rejects_calls() {
    let gateway = local_gateway().unwrap();
    let counter = gateway.actor("Counter").unwrap().arg(&0i64).remote().await.unwrap();

    gateway.kill_actor(&counter, true).await.unwrap();

    let call = gateway
        .method::<i64>(&counter, "Counter.incr")
        .unwrap()
        .arg(&1i64)
        .remote()
        .await;
    assert!(matches!(call, Err(GatewayError::ActorNotFound { .. })));
}

#[tokio::test]
async fn test_crash_restarts_within_budget() {
    let gateway = local_gateway().unwrap();
    let counter = gateway
        .actor("Counter")
        .unwrap()
        .arg(&5i64)
        .options(ActorCreationOptions::new().with_max_restarts(1))
        .remote()
        .await
        .unwrap();

    let bumped = gateway
        .method::<i64>(&counter, "Counter.incr")
        .unwrap()
        .arg(&3i64)
        .remote()
        .await
        .unwrap();
    assert_eq!(gateway.get(&bumped).await.unwrap(), 8);

    let crashed = gateway
        .method::<i64>(&counter, "Counter.crash")
        .unwrap()
        .remote()
        .await
        .unwrap();
    assert!(gateway.get(&crashed).await.is_err());

    let restarted = gateway
        .method::<bool>(&counter, "Counter.restarted")
        .unwrap()
        .remote()
        .await
        .unwrap();
    assert!(gateway.get(&restarted).await.unwrap());

    // State is rebuilt from the constructor arguments
    let value = gateway
        .method::<i64>(&counter, "Counter.value")
        .unwrap()
        .remote()
        .await
        .unwrap();
    assert_eq!(gateway.get(&value).await.unwrap(), 5);

    assert_eq!(gateway.metrics().actor_restarts, 1);
    assert_eq!(gateway.actor_state(&counter).await.unwrap(), ActorState::Running);
}

#[tokio::test]
async fn test_exit_actor_publishes_termination() {
    let gateway = local_gateway().unwrap();
    let counter = gateway.actor("Counter").unwrap().arg(&9i64).remote().await.unwrap();
    let mut events = gateway
        .subscribe(Channel::Actor, Some(&counter.id.to_string()))
        .unwrap();

    let last = gateway
        .method::<i64>(&counter, "Counter.exit")
        .unwrap()
        .remote()
        .await
        .unwrap();
    assert_eq!(gateway.get(&last).await.unwrap(), 9);

    let mut state = next_state(&mut events).await;
    while state != ActorState::Terminated {
        state = next_state(&mut events).await;
    }

    let call = gateway
        .method::<i64>(&counter, "Counter.incr")
        .unwrap()
        .arg(&1i64)
        .remote()
        .await;
    assert!(call.is_err());
}

#[tokio::test]
async fn test_actor_context_required_outside_methods() {
    let gateway = local_gateway().unwrap();

    assert!(matches!(
        gateway.exit_actor(),
        Err(GatewayError::OutsideActorContext { .. })
    ));
    assert!(matches!(
        gateway.was_current_actor_restarted(),
        Err(GatewayError::OutsideActorContext { .. })
    ));
}

#[tokio::test]
async fn test_named_actors() {
    let gateway = local_gateway().unwrap();

    let local = gateway
        .actor("Counter")
        .unwrap()
        .arg(&0i64)
        .options(ActorCreationOptions::new().with_name("local-counter"))
        .remote()
        .await
        .unwrap();
    let global = gateway
        .actor("Counter")
        .unwrap()
        .arg(&0i64)
        .options(ActorCreationOptions::new().with_global_name("global-counter"))
        .remote()
        .await
        .unwrap();

    assert_eq!(gateway.get_actor_id(false, "local-counter").await.unwrap(), local.id);
    assert_eq!(gateway.get_actor_id(true, "global-counter").await.unwrap(), global.id);
    assert!(matches!(
        gateway.get_actor_id(true, "nobody").await,
        Err(GatewayError::ActorNotFound { .. })
    ));

    let collision = gateway
        .actor("Counter")
        .unwrap()
        .arg(&0i64)
        .options(ActorCreationOptions::new().with_global_name("global-counter"))
        .remote()
        .await;
    assert!(matches!(collision, Err(GatewayError::ActorNameCollision { .. })));
}

#[tokio::test]
async fn test_shutdown_terminates_actors() {
    let gateway = local_gateway().unwrap();
    for start in 0..3i64 {
        gateway.actor("Counter").unwrap().arg(&start).remote().await.unwrap();
    }

    gateway.shutdown().await;

    let metrics = gateway.metrics();
    assert_eq!(metrics.actors_created, 3);
    assert_eq!(metrics.actors_terminated, 3);
}
