//! The runner's scenarios, executed through the framework

use gateway_e2e_tests::{all_scenarios, TestConfig, TestFramework};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_scenarios_pass() {
    let framework = TestFramework::new(TestConfig::default());

    for scenario in all_scenarios() {
        let result = framework.run_scenario(scenario.as_ref()).await;
        let failed: Vec<_> = result.checks.iter().filter(|c| !c.passed).collect();
        assert!(
            result.success,
            "{} failed: {:?} {:?}",
            result.scenario_name, result.error_message, failed
        );
        assert!(!result.checks.is_empty());
        assert!(result.metrics.is_some());
    }
}

#[tokio::test]
async fn test_results_serialize_for_output_file() {
    let framework = TestFramework::new(TestConfig::default());
    let scenario = gateway_e2e_tests::PlacementGroupTest;

    let result = framework.run_scenario(&scenario).await;
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["scenario_name"], "placement_groups");
    assert!(json["checks"].as_array().map(|c| !c.is_empty()).unwrap_or(false));
}
