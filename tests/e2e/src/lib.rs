//! End-to-End Test Framework for the Runtime Gateway
//!
//! Scenario fixtures and a small framework that runs each scenario against
//! a fresh local-mode gateway and collects check results and metrics.

pub mod fixtures;
pub mod framework;
pub mod scenarios;

pub use fixtures::*;
pub use framework::{CheckResult, TestConfig, TestFramework, TestResult, TestScenario};
pub use scenarios::*;
