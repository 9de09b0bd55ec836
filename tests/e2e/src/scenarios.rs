//! End-to-end scenarios over the public gateway

use crate::framework::{CheckResult, TestScenario};
use anyhow::Result;
use async_trait::async_trait;
use gateway_types::{
    ActorCreationOptions, CallOptions, PlacementGroupCreationOptions, PlacementStrategy, Resources,
};
use runtime_gateway::{FailureCause, Gateway, GatewayError};
use std::time::{Duration, Instant};

/// Put, get, reference counting and bounded waits
pub struct ObjectLifecycleTest {
    pub wait_timeout_ms: u64,
}

#[async_trait]
impl TestScenario for ObjectLifecycleTest {
    async fn execute(&self, gateway: &Gateway) -> Result<Vec<CheckResult>> {
        let mut checks = Vec::new();

        let answer = gateway.put(&42i64).await?;
        checks.push(CheckResult::equal("put_get_round_trip", gateway.get(&answer).await?, 42));

        let copy = answer.clone();
        checks.push(CheckResult::equal("clone_adds_reference", gateway.local_reference_count(&answer), 2));
        drop(copy);
        checks.push(CheckResult::equal("drop_removes_reference", gateway.local_reference_count(&answer), 1));

        let slow = gateway
            .task::<i64>("sleep_then")?
            .arg(&1_000u64)
            .arg(&1i64)
            .remote()
            .await?;
        let started = Instant::now();
        let flags = gateway
            .wait(&[answer.clone(), slow], 2, self.wait_timeout_ms)
            .await?;
        let waited = started.elapsed();
        checks.push(CheckResult::equal("wait_flags_on_timeout", flags, vec![true, false]));
        checks.push(CheckResult::expect(
            "wait_bounded_by_timeout",
            waited < Duration::from_millis(self.wait_timeout_ms + 500),
            format!("waited {:?}", waited),
        ));

        let id = answer.id();
        drop(answer);
        let released = matches!(
            gateway.runtime().get(&id).await,
            Err(GatewayError::ObjectNotFound { .. })
        );
        checks.push(CheckResult::expect("released_object_gone", released, "object still readable"));

        Ok(checks)
    }

    fn name(&self) -> &str {
        "object_lifecycle"
    }

    fn description(&self) -> &str {
        "Put/Get round trip, local reference counting and Wait timeouts"
    }
}

/// Tasks chained through references, failures surfacing on get
pub struct TaskPipelineTest {
    pub depth: usize,
}

#[async_trait]
impl TestScenario for TaskPipelineTest {
    async fn execute(&self, gateway: &Gateway) -> Result<Vec<CheckResult>> {
        let mut checks = Vec::new();

        let mut current = gateway.put(&10i64).await?;
        for _ in 0..self.depth {
            current = gateway.task::<i64>("add_one")?.arg_ref(&current).remote().await?;
        }
        checks.push(CheckResult::equal(
            "chained_add_one",
            gateway.get(&current).await?,
            10 + self.depth as i64,
        ));

        let unregistered = matches!(
            gateway.task::<i64>("does_not_exist"),
            Err(GatewayError::UnregisteredFunction { .. })
        );
        checks.push(CheckResult::expect("unregistered_fails_fast", unregistered, "task was accepted"));

        let quotient = gateway.task::<i64>("divide")?.arg(&1i64).arg(&0i64).remote().await?;
        let raised = match gateway.get(&quotient).await {
            Err(GatewayError::RemoteTask { failure, .. }) => failure.cause == FailureCause::TaskRaised,
            _ => false,
        };
        checks.push(CheckResult::expect("raised_error_on_get", raised, "division by zero not reported"));

        let crashed = gateway
            .task::<i64>("crash")?
            .options(CallOptions::new().with_max_retries(1))
            .remote()
            .await?;
        let crash_reported = match gateway.get(&crashed).await {
            Err(GatewayError::RemoteTask { failure, .. }) => {
                failure.cause == FailureCause::WorkerCrashed
            }
            _ => false,
        };
        checks.push(CheckResult::expect("crash_after_retries", crash_reported, "crash not reported"));

        Ok(checks)
    }

    fn name(&self) -> &str {
        "task_pipeline"
    }

    fn description(&self) -> &str {
        "Reference-passing task chains and asynchronous failure reporting"
    }
}

/// Ordered method calls, kill semantics and named lookup
pub struct ActorLifecycleTest {
    pub calls: i64,
}

#[async_trait]
impl TestScenario for ActorLifecycleTest {
    async fn execute(&self, gateway: &Gateway) -> Result<Vec<CheckResult>> {
        let mut checks = Vec::new();

        let counter = gateway
            .actor("Counter")?
            .arg(&0i64)
            .options(ActorCreationOptions::new().with_global_name("scenario-counter"))
            .remote()
            .await?;

        let mut last = None;
        for i in 0..self.calls {
            last = Some(
                gateway
                    .method::<Vec<i64>>(&counter, "Counter.record")?
                    .arg(&i)
                    .remote()
                    .await?,
            );
        }
        if let Some(last) = last {
            let history = gateway.get(&last).await?;
            checks.push(CheckResult::equal(
                "calls_in_submission_order",
                history,
                (0..self.calls).collect::<Vec<i64>>(),
            ));
        }

        let found = gateway.get_actor_id(true, "scenario-counter").await?;
        checks.push(CheckResult::equal("named_lookup", found, counter.id));

        gateway.kill_actor(&counter, true).await?;
        let rejected = matches!(
            gateway.method::<i64>(&counter, "Counter.incr")?.arg(&1i64).remote().await,
            Err(GatewayError::ActorNotFound { .. })
        );
        checks.push(CheckResult::expect("killed_actor_not_found", rejected, "call was accepted"));

        let name_freed = gateway.get_actor_id(true, "scenario-counter").await.is_err();
        checks.push(CheckResult::expect("name_released", name_freed, "name still registered"));

        Ok(checks)
    }

    fn name(&self) -> &str {
        "actor_lifecycle"
    }

    fn description(&self) -> &str {
        "Single-threaded actor ordering, named lookup and kill without restart"
    }
}

/// Gang reservation of placement groups against the local node
pub struct PlacementGroupTest;

#[async_trait]
impl TestScenario for PlacementGroupTest {
    async fn execute(&self, gateway: &Gateway) -> Result<Vec<CheckResult>> {
        let mut checks = Vec::new();
        let cpus = |n: f64| Resources::from([("CPU".to_string(), n)]);

        let holder = gateway
            .create_placement_group(PlacementGroupCreationOptions::new(
                vec![cpus(2.0), cpus(1.0)],
                PlacementStrategy::Pack,
            ))
            .await?;
        checks.push(CheckResult::expect(
            "fitting_group_ready",
            gateway.wait_placement_group_ready(&holder.id, 0).await?,
            "group not ready",
        ));

        let waiting = gateway
            .create_placement_group(PlacementGroupCreationOptions::new(
                vec![cpus(2.0), cpus(2.0)],
                PlacementStrategy::Spread,
            ))
            .await?;
        checks.push(CheckResult::expect(
            "oversized_group_pending",
            !gateway.wait_placement_group_ready(&waiting.id, 0).await?,
            "group reserved beyond capacity",
        ));

        let bound = gateway
            .task::<i64>("add")?
            .arg(&20i64)
            .arg(&22i64)
            .options(CallOptions::new().with_placement_group(waiting.id, Some(1)))
            .remote()
            .await?;
        let deferred = gateway.wait(&[bound.clone()], 1, 50).await?;
        checks.push(CheckResult::equal("task_deferred_until_ready", deferred, vec![false]));

        gateway.remove_placement_group(&holder.id).await?;
        checks.push(CheckResult::expect(
            "pending_group_reserved_after_release",
            gateway.wait_placement_group_ready(&waiting.id, 5).await?,
            "group still pending",
        ));
        checks.push(CheckResult::equal("deferred_task_ran", gateway.get(&bound).await?, 42));

        let removed = matches!(
            gateway
                .task::<i64>("add_one")?
                .arg(&1i64)
                .options(CallOptions::new().with_placement_group(holder.id, None))
                .remote()
                .await,
            Err(GatewayError::PlacementGroupNotFound { .. })
        );
        checks.push(CheckResult::expect("removed_group_rejected", removed, "task accepted"));

        Ok(checks)
    }

    fn name(&self) -> &str {
        "placement_groups"
    }

    fn description(&self) -> &str {
        "All-or-nothing bundle reservation, deferral and release"
    }
}

/// Every scenario with its default parameters
pub fn all_scenarios() -> Vec<Box<dyn TestScenario>> {
    vec![
        Box::new(ObjectLifecycleTest { wait_timeout_ms: 100 }),
        Box::new(TaskPipelineTest { depth: 5 }),
        Box::new(ActorLifecycleTest { calls: 20 }),
        Box::new(PlacementGroupTest),
    ]
}
