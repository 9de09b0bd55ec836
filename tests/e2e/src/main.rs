//! End-to-End Test Runner for the Runtime Gateway

use anyhow::{Context, Result};
use clap::Parser;
use gateway_config::load_config;
use gateway_e2e_tests::{
    all_scenarios, ActorLifecycleTest, ObjectLifecycleTest, PlacementGroupTest, TaskPipelineTest,
    TestConfig, TestFramework, TestResult, TestScenario,
};
use runtime_gateway::init_tracing;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run: all, object_lifecycle, task_pipeline, actor_lifecycle, placement_groups
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Per-scenario timeout in seconds
    #[arg(short, long, default_value_t = 60)]
    timeout: u64,

    /// Write JSON results to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gateway configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging, overrides --log-level
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { args.log_level.as_str() };
    init_tracing(level, args.json_logs);

    info!("Starting Runtime Gateway E2E Test Suite");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let runtime = match &args.config {
        Some(path) => load_config(Some(path.as_path()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TestConfig::default().runtime,
    };

    let config = TestConfig {
        timeout_secs: args.timeout,
        verbose: args.verbose,
        runtime,
    };
    let framework = TestFramework::new(config);
    info!(run = %framework.run_id(), "Test run started");

    let scenarios: Vec<Box<dyn TestScenario>> = match args.scenario.as_str() {
        "objects" | "object_lifecycle" => vec![Box::new(ObjectLifecycleTest { wait_timeout_ms: 100 })],
        "tasks" | "task_pipeline" => vec![Box::new(TaskPipelineTest { depth: 10 })],
        "actors" | "actor_lifecycle" => vec![Box::new(ActorLifecycleTest { calls: 50 })],
        "placement" | "placement_groups" => vec![Box::new(PlacementGroupTest)],
        "all" => {
            info!("Running all test scenarios");
            all_scenarios()
        }
        _ => {
            error!("Unknown test scenario: {}", args.scenario);
            std::process::exit(2);
        }
    };

    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        results.push(framework.run_scenario(scenario.as_ref()).await);
    }

    print_results_summary(&results, framework.config().verbose);

    if let Some(output_path) = args.output {
        save_results_to_file(&results, &output_path).await?;
        info!("Results saved to: {}", output_path.display());
    }

    if !results.iter().all(|r| r.success) {
        error!("Some tests failed");
        std::process::exit(1);
    }

    info!("All tests passed successfully!");
    Ok(())
}

fn print_results_summary(results: &[TestResult], verbose: bool) {
    println!("\n═══════════════════════════════════════");
    println!("        TEST RESULTS SUMMARY");
    println!("═══════════════════════════════════════");

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.success).count();

    println!("Total Tests: {}", total_tests);
    println!("Passed:      {} ✓", passed_tests);
    println!("Failed:      {} ✗", total_tests - passed_tests);
    println!();

    for result in results {
        let status = if result.success { "✓ PASS" } else { "✗ FAIL" };
        println!(
            "{} {} ({} ms)",
            status,
            result.scenario_name,
            result.duration.as_millis()
        );

        if let Some(ref error) = result.error_message {
            println!("      Error: {}", error);
        }

        if let Some(ref metrics) = result.metrics {
            println!(
                "      Objects: {} put | Tasks: {} submitted, {} failed | Actors: {} created, {} restarts",
                metrics.objects_put,
                metrics.tasks_submitted,
                metrics.tasks_failed,
                metrics.actors_created,
                metrics.actor_restarts
            );
        }

        for check in &result.checks {
            if !check.passed {
                println!("      ✗ {}: {}", check.check, check.message);
            } else if verbose {
                println!("      ✓ {}", check.check);
            }
        }

        println!();
    }

    println!("═══════════════════════════════════════");
}

async fn save_results_to_file(results: &[TestResult], path: &Path) -> Result<()> {
    let json_output = serde_json::json!({
        "test_run": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "total_tests": results.len(),
            "passed_tests": results.iter().filter(|r| r.success).count(),
            "failed_tests": results.iter().filter(|r| !r.success).count(),
        },
        "results": results
    });

    tokio::fs::write(path, serde_json::to_string_pretty(&json_output)?).await?;
    Ok(())
}
