//! Building gateways from configuration files

use gateway_config::{load_config, RuntimeMode};
use gateway_e2e_tests::registry;
use runtime_gateway::{GatewayBuilder, GatewayError};
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn test_gateway_from_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gateway.toml");
    fs::write(
        &path,
        r#"
namespace = "e2e"
shutdown_grace_ms = 200

[resources]
CPU = 2.0
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.effective_mode(), RuntimeMode::Local);

    let gateway = GatewayBuilder::new(config)
        .registry(registry().unwrap())
        .build()
        .unwrap();
    assert_eq!(gateway.mode(), RuntimeMode::Local);
    assert_eq!(gateway.config().namespace, "e2e");

    let answer = gateway.task::<i64>("add").unwrap().arg(&40i64).arg(&2i64).remote().await.unwrap();
    assert_eq!(gateway.get(&answer).await.unwrap(), 42);
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_cluster_mode_requires_client() {
    let config = gateway_config::RuntimeConfig {
        mode: RuntimeMode::Cluster,
        address: Some("10.0.0.5:6379".to_string()),
        ..Default::default()
    };

    let built = GatewayBuilder::new(config).registry(registry().unwrap()).build();
    assert!(matches!(built, Err(GatewayError::Configuration { .. })));
}
