//! Placement group reservation through the public gateway

use gateway_e2e_tests::{local_gateway, local_runtime};
use gateway_types::{
    ActorCreationOptions, PlacementGroupCreationOptions, PlacementGroupState, PlacementStrategy,
    Resources,
};
use runtime_gateway::GatewayError;

fn cpus(n: f64) -> Resources {
    Resources::from([("CPU".to_string(), n)])
}

#[tokio::test]
async fn test_group_waits_for_released_capacity() {
    let (gateway, runtime) = local_runtime().unwrap();

    let first = gateway
        .create_placement_group(PlacementGroupCreationOptions::new(
            vec![cpus(3.0)],
            PlacementStrategy::Pack,
        ))
        .await
        .unwrap();
    assert!(gateway.wait_placement_group_ready(&first.id, 0).await.unwrap());
    assert_eq!(runtime.available_resources().get("CPU"), Some(&1.0));

    let second = gateway
        .create_placement_group(PlacementGroupCreationOptions::new(
            vec![cpus(1.0), cpus(2.0)],
            PlacementStrategy::Spread,
        ))
        .await
        .unwrap();
    assert!(!gateway.wait_placement_group_ready(&second.id, 0).await.unwrap());
    assert_eq!(
        gateway.placement_group_state(&second.id).await.unwrap(),
        PlacementGroupState::Pending
    );

    gateway.remove_placement_group(&first.id).await.unwrap();
    assert!(gateway.wait_placement_group_ready(&second.id, 5).await.unwrap());
    assert_eq!(runtime.available_resources().get("CPU"), Some(&1.0));
}

#[tokio::test]
async fn test_unknown_and_removed_groups() {
    let gateway = local_gateway().unwrap();

    let group = gateway
        .create_placement_group(
            PlacementGroupCreationOptions::new(vec![cpus(1.0)], PlacementStrategy::StrictPack)
                .with_name("trainers"),
        )
        .await
        .unwrap();
    let listed = gateway.list_placement_groups().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0.id, group.id);

    gateway.remove_placement_group(&group.id).await.unwrap();
    assert!(matches!(
        gateway.wait_placement_group_ready(&group.id, 1).await,
        Err(GatewayError::PlacementGroupNotFound { .. })
    ));
}

#[tokio::test]
async fn test_invalid_bundles_are_rejected() {
    let gateway = local_gateway().unwrap();

    let empty = gateway
        .create_placement_group(PlacementGroupCreationOptions::new(
            vec![],
            PlacementStrategy::Pack,
        ))
        .await;
    assert!(empty.is_err());

    let negative = gateway
        .create_placement_group(PlacementGroupCreationOptions::new(
            vec![cpus(-1.0)],
            PlacementStrategy::Pack,
        ))
        .await;
    assert!(negative.is_err());
}

#[tokio::test]
async fn test_actor_in_bundle() {
    let gateway = local_gateway().unwrap();

    let group = gateway
        .create_placement_group(PlacementGroupCreationOptions::new(
            vec![cpus(1.0), cpus(1.0)],
            PlacementStrategy::Pack,
        ))
        .await
        .unwrap();
    assert!(gateway.wait_placement_group_ready(&group.id, 1).await.unwrap());

    let counter = gateway
        .actor("Counter")
        .unwrap()
        .arg(&1i64)
        .options(
            ActorCreationOptions::new()
                .with_resource("CPU", 1.0)
                .with_placement_group(group.id, Some(0)),
        )
        .remote()
        .await
        .unwrap();

    let value = gateway
        .method::<i64>(&counter, "Counter.incr")
        .unwrap()
        .arg(&1i64)
        .remote()
        .await
        .unwrap();
    assert_eq!(gateway.get(&value).await.unwrap(), 2);

    let out_of_range = gateway
        .actor("Counter")
        .unwrap()
        .arg(&1i64)
        .options(ActorCreationOptions::new().with_placement_group(group.id, Some(5)))
        .remote()
        .await;
    assert!(out_of_range.is_err());
}
