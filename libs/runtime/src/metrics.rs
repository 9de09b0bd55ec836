//! Gateway counters
//!
//! Plain atomics bumped on the hot paths; [`GatewayMetrics::snapshot`]
//! copies them out for logging or assertions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub objects_put: AtomicU64,
    pub objects_released: AtomicU64,
    pub objects_evicted: AtomicU64,

    pub tasks_submitted: AtomicU64,
    pub tasks_succeeded: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub task_retries: AtomicU64,
    pub total_execution_time_ns: AtomicU64,

    pub actors_created: AtomicU64,
    pub actors_terminated: AtomicU64,
    pub actor_restarts: AtomicU64,
    pub actor_calls: AtomicU64,
    pub actor_calls_rejected: AtomicU64,

    pub placement_groups_created: AtomicU64,
    pub placement_groups_removed: AtomicU64,
}

impl GatewayMetrics {
    pub fn record_put(&self) {
        self.objects_put.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self) {
        self.objects_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.objects_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished execution (task or actor call)
    pub fn record_execution(&self, duration: Duration, success: bool) {
        self.total_execution_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        if success {
            self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Failure recorded without an execution (dependency or placement failure)
    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.task_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actor_created(&self) {
        self.actors_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actor_terminated(&self) {
        self.actors_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actor_restart(&self) {
        self.actor_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actor_call(&self, accepted: bool) {
        if accepted {
            self.actor_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.actor_calls_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_placement_group(&self, created: bool) {
        if created {
            self.placement_groups_created.fetch_add(1, Ordering::Relaxed);
        } else {
            self.placement_groups_removed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn avg_execution_time_ns(&self) -> f64 {
        let count = self.tasks_succeeded.load(Ordering::Relaxed)
            + self.tasks_failed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_execution_time_ns.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            objects_put: self.objects_put.load(Ordering::Relaxed),
            objects_released: self.objects_released.load(Ordering::Relaxed),
            objects_evicted: self.objects_evicted.load(Ordering::Relaxed),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            task_retries: self.task_retries.load(Ordering::Relaxed),
            avg_execution_time_ns: self.avg_execution_time_ns(),
            actors_created: self.actors_created.load(Ordering::Relaxed),
            actors_terminated: self.actors_terminated.load(Ordering::Relaxed),
            actor_restarts: self.actor_restarts.load(Ordering::Relaxed),
            actor_calls: self.actor_calls.load(Ordering::Relaxed),
            actor_calls_rejected: self.actor_calls_rejected.load(Ordering::Relaxed),
            placement_groups_created: self.placement_groups_created.load(Ordering::Relaxed),
            placement_groups_removed: self.placement_groups_removed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GatewayMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub objects_put: u64,
    pub objects_released: u64,
    pub objects_evicted: u64,
    pub tasks_submitted: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub task_retries: u64,
    pub avg_execution_time_ns: f64,
    pub actors_created: u64,
    pub actors_terminated: u64,
    pub actor_restarts: u64,
    pub actor_calls: u64,
    pub actor_calls_rejected: u64,
    pub placement_groups_created: u64,
    pub placement_groups_removed: u64,
}
