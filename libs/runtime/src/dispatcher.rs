//! Local task dispatcher
//!
//! Turns a validated submission into a pending result object and a tokio
//! task that waits for its placement group, resolves reference arguments,
//! runs the function on the blocking pool and settles the result. Worker
//! crashes (panics) are retried up to the call's retry budget; errors the
//! function returns are final.

use crate::error::{GatewayError, Result, TaskFailure};
use crate::metrics::GatewayMetrics;
use crate::placement::{GroupBinding, PlacementGroupManager};
use crate::registry::{FunctionRegistry, RemoteFunctionHandle, TaskFn};
use crate::store::ObjectStore;
use gateway_types::{Bytes, CallOptions, ObjectId, TaskArg, TaskId};
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Reference arguments held alive for an in-flight call
#[derive(Debug)]
pub(crate) struct PinnedArgs {
    store: Arc<ObjectStore>,
    ids: Vec<ObjectId>,
}

impl PinnedArgs {
    /// Pin every referenced object, failing if one is unknown
    pub(crate) fn pin(store: &Arc<ObjectStore>, args: &[TaskArg]) -> Result<Self> {
        let mut pinned = PinnedArgs {
            store: store.clone(),
            ids: Vec::new(),
        };
        for (position, arg) in args.iter().enumerate() {
            if let TaskArg::Reference(id) = arg {
                if !store.pin(id) {
                    return Err(GatewayError::invalid_argument(format!(
                        "argument {} references unknown object {}",
                        position, id
                    )));
                }
                pinned.ids.push(*id);
            }
        }
        Ok(pinned)
    }
}

impl Drop for PinnedArgs {
    fn drop(&mut self) {
        for id in &self.ids {
            self.store.unpin(id);
        }
    }
}

/// Replace reference arguments with their payloads
pub(crate) async fn resolve_arguments(
    store: &ObjectStore,
    args: &[TaskArg],
) -> std::result::Result<Vec<Bytes>, TaskFailure> {
    let mut payloads = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            TaskArg::Value(data) => payloads.push(data.clone()),
            TaskArg::Reference(id) => match store.get(id).await {
                Ok(data) => payloads.push(data),
                Err(e) => return Err(TaskFailure::dependency(id, &e)),
            },
        }
    }
    Ok(payloads)
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

pub(crate) struct TaskDispatcher {
    store: Arc<ObjectStore>,
    registry: Arc<FunctionRegistry>,
    placement: Arc<PlacementGroupManager>,
    metrics: Arc<GatewayMetrics>,
    default_retries: u32,
    executor: Handle,
}

impl TaskDispatcher {
    pub(crate) fn new(
        store: Arc<ObjectStore>,
        registry: Arc<FunctionRegistry>,
        placement: Arc<PlacementGroupManager>,
        metrics: Arc<GatewayMetrics>,
        default_retries: u32,
        executor: Handle,
    ) -> Self {
        Self {
            store,
            registry,
            placement,
            metrics,
            default_retries,
            executor,
        }
    }

    /// Validate and schedule a task, returning its result object at once
    pub(crate) fn submit(
        &self,
        function: &RemoteFunctionHandle,
        args: Vec<TaskArg>,
        options: &CallOptions,
    ) -> Result<ObjectId> {
        options.validate()?;
        let task_fn = self.registry.task_fn(function)?;
        function.check_arity(args.len())?;

        let binding = match &options.placement_group {
            Some(group) => Some(self.placement.bind(group, options.bundle_index)?),
            None => None,
        };
        let pins = PinnedArgs::pin(&self.store, &args)?;

        let result = self.store.create_pending();
        let task = PendingTask {
            task_id: TaskId::new(),
            name: options
                .name
                .clone()
                .unwrap_or_else(|| function.name().to_string()),
            function: task_fn,
            args,
            pins,
            binding,
            result,
            max_retries: options.max_retries.unwrap_or(self.default_retries),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        };

        debug!(task = %task.task_id, function = function.name(), result = %result, "Task submitted");
        self.metrics.record_task_submitted();
        self.executor.spawn(task.run());
        Ok(result)
    }
}

struct PendingTask {
    task_id: TaskId,
    name: String,
    function: TaskFn,
    args: Vec<TaskArg>,
    pins: PinnedArgs,
    binding: Option<GroupBinding>,
    result: ObjectId,
    max_retries: u32,
    store: Arc<ObjectStore>,
    metrics: Arc<GatewayMetrics>,
}

impl PendingTask {
    async fn run(self) {
        let outcome = self.execute().await;
        if outcome.is_err() {
            debug!(task = %self.task_id, name = %self.name, "Task failed");
        }
        self.store.complete(&self.result, outcome);
        drop(self.pins);
    }

    async fn execute(&self) -> std::result::Result<Bytes, TaskFailure> {
        if let Some(binding) = self.binding.clone() {
            debug!(task = %self.task_id, group = %binding.group_id(), "Task waiting for placement group");
            if let Err(failure) = binding.ready().await {
                self.metrics.record_task_failed();
                return Err(failure);
            }
        }

        let payloads = match resolve_arguments(&self.store, &self.args).await {
            Ok(payloads) => Arc::new(payloads),
            Err(failure) => {
                self.metrics.record_task_failed();
                return Err(failure);
            }
        };

        let mut attempt = 0;
        loop {
            let function = self.function.clone();
            let input = payloads.clone();
            let started = Instant::now();
            let joined = tokio::task::spawn_blocking(move || function(&input)).await;

            match joined {
                Ok(Ok(data)) => {
                    self.metrics.record_execution(started.elapsed(), true);
                    return Ok(data);
                }
                Ok(Err(message)) => {
                    self.metrics.record_execution(started.elapsed(), false);
                    return Err(TaskFailure::raised(message));
                }
                Err(join_error) => {
                    let message = panic_message(join_error);
                    if attempt < self.max_retries {
                        attempt += 1;
                        self.metrics.record_retry();
                        warn!(
                            task = %self.task_id,
                            name = %self.name,
                            attempt,
                            max_retries = self.max_retries,
                            error = %message,
                            "Worker crashed, retrying task"
                        );
                        continue;
                    }
                    self.metrics.record_execution(started.elapsed(), false);
                    return Err(TaskFailure::worker_crashed(message));
                }
            }
        }
    }
}
