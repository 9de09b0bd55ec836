//! Core scenario framework

use anyhow::{Context, Result};
use gateway_config::RuntimeConfig;
use runtime_gateway::{FunctionRegistry, Gateway, GatewayBuilder, MetricsSnapshot};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs scenarios, each against a fresh gateway
pub struct TestFramework {
    config: TestConfig,
    run_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Per-scenario timeout in seconds
    pub timeout_secs: u64,
    pub verbose: bool,
    pub runtime: RuntimeConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            verbose: false,
            runtime: crate::fixtures::local_config(),
        }
    }
}

/// A self-checking gateway workload
#[async_trait::async_trait]
pub trait TestScenario: Send + Sync {
    async fn execute(&self, gateway: &Gateway) -> Result<Vec<CheckResult>>;

    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub metrics: Option<MetricsSnapshot>,
    pub checks: Vec<CheckResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    pub fn expect(check: &str, passed: bool, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            passed,
            message: message.into(),
        }
    }

    /// Pass when `actual == expected`
    pub fn equal<T: PartialEq + std::fmt::Debug>(check: &str, actual: T, expected: T) -> Self {
        let passed = actual == expected;
        Self::expect(check, passed, format!("expected {:?}, got {:?}", expected, actual))
    }
}

impl TestFramework {
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn gateway(&self) -> Result<Gateway> {
        let registry: FunctionRegistry =
            crate::fixtures::registry().context("Failed to populate registry")?;
        GatewayBuilder::new(self.config.runtime.clone())
            .registry(registry)
            .build()
            .context("Failed to build gateway")
    }

    /// Run one scenario; failures are reported in the result, not returned
    pub async fn run_scenario<S: TestScenario + ?Sized>(&self, scenario: &S) -> TestResult {
        info!(run = %self.run_id, scenario = scenario.name(), "Starting scenario");
        info!("Description: {}", scenario.description());
        let start_time = Instant::now();

        let gateway = match self.gateway() {
            Ok(gateway) => gateway,
            Err(e) => {
                error!("Setup failed: {:#}", e);
                return TestResult {
                    scenario_name: scenario.name().to_string(),
                    success: false,
                    duration: start_time.elapsed(),
                    error_message: Some(format!("Setup failed: {:#}", e)),
                    metrics: None,
                    checks: vec![],
                };
            }
        };

        let timeout = scenario
            .timeout()
            .min(Duration::from_secs(self.config.timeout_secs));
        let outcome = tokio::time::timeout(timeout, scenario.execute(&gateway)).await;

        let (checks, error_message) = match outcome {
            Ok(Ok(checks)) => (checks, None),
            Ok(Err(e)) => {
                error!("Scenario execution failed: {:#}", e);
                (vec![], Some(format!("Execution failed: {:#}", e)))
            }
            Err(_) => {
                error!("Scenario timed out after {:?}", timeout);
                (vec![], Some("Scenario timed out".to_string()))
            }
        };

        let metrics = gateway.metrics();
        gateway.shutdown().await;

        let failed: Vec<&CheckResult> = checks.iter().filter(|c| !c.passed).collect();
        for check in &failed {
            warn!(check = %check.check, "Check failed: {}", check.message);
        }
        let success = error_message.is_none() && failed.is_empty();

        info!(
            scenario = scenario.name(),
            success,
            checks = checks.len(),
            "Scenario completed"
        );

        TestResult {
            scenario_name: scenario.name().to_string(),
            success,
            duration: start_time.elapsed(),
            error_message,
            metrics: Some(metrics),
            checks,
        }
    }
}
