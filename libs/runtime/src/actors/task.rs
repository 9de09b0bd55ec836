//! Per-actor task loop
//!
//! Owns the actor instance, drains its mailbox in submission order and
//! drives the `Pending -> Running -> {Restarting -> Running}* -> Terminated`
//! lifecycle. Control messages (kills) and crash reports from concurrent
//! calls are served before queued calls.

use super::context::{self, ActorContext};
use super::{ActorCall, ActorShared, ActorTable, Control};
use crate::dispatcher::{panic_message, resolve_arguments, PinnedArgs};
use crate::error::TaskFailure;
use crate::metrics::GatewayMetrics;
use crate::names::NameDirectory;
use crate::placement::GroupBinding;
use crate::registry::{ActorInstance, MethodFn};
use crate::store::ObjectStore;
use gateway_types::{ActorState, Bytes, TaskArg};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

/// Reports from calls running concurrently with the loop
enum Signal {
    Crashed(String),
    Exited,
}

/// How a single execution ended
enum Outcome {
    Completed,
    Crashed(String),
}

enum Construction {
    Built(ActorInstance),
    /// Constructor returned an error; not retried
    Refused(String),
    /// Constructor panicked; counts against the restart budget
    Crashed(String),
}

pub(crate) struct ActorTask {
    pub(crate) shared: Arc<ActorShared>,
    pub(crate) args: Vec<TaskArg>,
    pub(crate) pins: Option<PinnedArgs>,
    pub(crate) binding: Option<GroupBinding>,
    pub(crate) mailbox: mpsc::UnboundedReceiver<ActorCall>,
    pub(crate) control: mpsc::UnboundedReceiver<Control>,
    pub(crate) store: Arc<ObjectStore>,
    pub(crate) metrics: Arc<GatewayMetrics>,
    pub(crate) names: Arc<NameDirectory>,
    pub(crate) table: Arc<ActorTable>,
}

/// State shared with calls running off the loop
#[derive(Clone)]
struct Execution {
    shared: Arc<ActorShared>,
    instance: Arc<RwLock<Option<ActorInstance>>>,
    exit: Arc<AtomicBool>,
    store: Arc<ObjectStore>,
    metrics: Arc<GatewayMetrics>,
}

impl ActorTask {
    pub(crate) async fn run(mut self) {
        let id = self.shared.handle.id;
        info!(actor_id = %id, class = %self.shared.class, "Starting actor task");

        let execution = Execution {
            shared: self.shared.clone(),
            instance: Arc::new(RwLock::new(None)),
            exit: Arc::new(AtomicBool::new(false)),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        };

        let binding = self.binding.take();
        let prepared = tokio::select! {
            biased;

            () = killed_for_good(&mut self.control, &self.shared) => {
                Err("killed before construction".to_string())
            }
            prepared = prepare(binding, &self.store, &self.args) => prepared,
        };
        let payloads = match prepared {
            Ok(payloads) => Arc::new(payloads),
            Err(reason) => {
                self.terminate(&execution, &reason);
                return;
            }
        };
        self.pins.take();

        match execution.construct(&payloads).await {
            Construction::Built(instance) => {
                *execution.instance.write() = Some(instance);
                if !self.shared.transition(ActorState::Running) {
                    self.terminate(&execution, "killed during construction");
                    return;
                }
            }
            Construction::Refused(message) => {
                error!(actor_id = %id, error = %message, "Actor constructor failed");
                self.terminate(&execution, &format!("constructor failed: {}", message));
                return;
            }
            Construction::Crashed(message) => {
                if !self.restart(&execution, &payloads, message).await {
                    return;
                }
            }
        }

        let concurrency = self.shared.options.max_concurrency;
        let permits = Arc::new(Semaphore::new(concurrency));
        let (signal_tx, mut signals) = mpsc::unbounded_channel::<Signal>();
        // Call dequeued in concurrent mode, waiting for a free permit
        let mut waiting: Option<ActorCall> = None;

        loop {
            tokio::select! {
                biased;

                Some(Control::Kill) = self.control.recv() => {
                    let terminated = self.shared.state() == ActorState::Terminated;
                    if !terminated {
                        *execution.instance.write() = None;
                    }
                    if terminated || !self.restart(&execution, &payloads, "killed".to_string()).await {
                        if let Some(call) = waiting.take() {
                            self.fail_call(call, "killed");
                        }
                        if terminated {
                            self.terminate(&execution, "killed");
                        }
                        return;
                    }
                }

                Some(signal) = signals.recv() => match signal {
                    Signal::Crashed(message) => {
                        *execution.instance.write() = None;
                        if !self.restart(&execution, &payloads, message).await {
                            if let Some(call) = waiting.take() {
                                self.fail_call(call, "actor crashed");
                            }
                            return;
                        }
                    }
                    Signal::Exited => {
                        if let Some(call) = waiting.take() {
                            self.fail_call(call, "actor exited");
                        }
                        self.terminate(&execution, "actor exited");
                        return;
                    }
                },

                permit = permits.clone().acquire_owned(), if waiting.is_some() => {
                    let (Ok(permit), Some(call)) = (permit, waiting.take()) else {
                        self.terminate(&execution, "executor closed");
                        return;
                    };
                    let execution = execution.clone();
                    let signal_tx = signal_tx.clone();
                    tokio::spawn(async move {
                        let outcome = execution.call(call).await;
                        drop(permit);
                        if let Outcome::Crashed(message) = outcome {
                            let _ = signal_tx.send(Signal::Crashed(message));
                        } else if execution.exit.load(Ordering::Acquire) {
                            let _ = signal_tx.send(Signal::Exited);
                        }
                    });
                }

                call = self.mailbox.recv(), if waiting.is_none() => {
                    let Some(call) = call else {
                        self.terminate(&execution, "mailbox closed");
                        return;
                    };
                    self.shared.dequeued();

                    if concurrency > 1 {
                        waiting = Some(call);
                        continue;
                    }
                    if let Outcome::Crashed(message) = execution.call(call).await {
                        *execution.instance.write() = None;
                        if !self.restart(&execution, &payloads, message).await {
                            return;
                        }
                    }
                    if execution.exit.load(Ordering::Acquire) {
                        self.terminate(&execution, "actor exited");
                        return;
                    }
                }
            }
        }
    }

    /// Rebuild the instance; false once the actor ended up terminated
    async fn restart(
        &mut self,
        execution: &Execution,
        payloads: &Arc<Vec<Bytes>>,
        mut reason: String,
    ) -> bool {
        let id = self.shared.handle.id;
        loop {
            let restarts = self.shared.num_restarts();
            if self.shared.state() == ActorState::Terminated
                || !self.shared.options.allows_restart(restarts)
            {
                warn!(
                    actor_id = %id,
                    restart_count = restarts,
                    max_restarts = self.shared.options.max_restarts,
                    reason = %reason,
                    "Actor exceeded restart limit"
                );
                self.terminate(execution, &reason);
                return false;
            }

            self.shared.transition(ActorState::Restarting);
            self.shared.record_restart();
            self.metrics.record_actor_restart();
            warn!(actor_id = %id, restart_count = restarts + 1, reason = %reason, "Restarting actor");

            match execution.construct(payloads).await {
                Construction::Built(instance) => {
                    *execution.instance.write() = Some(instance);
                    if !self.shared.transition(ActorState::Running) {
                        self.terminate(execution, "killed during restart");
                        return false;
                    }
                    return true;
                }
                Construction::Refused(message) => {
                    self.terminate(execution, &format!("constructor failed: {}", message));
                    return false;
                }
                Construction::Crashed(message) => reason = message,
            }
        }
    }

    /// Enter `Terminated`, free the name and fail everything still queued
    fn terminate(&mut self, execution: &Execution, reason: &str) {
        let id = self.shared.handle.id;
        self.shared.transition(ActorState::Terminated);
        *execution.instance.write() = None;
        self.names
            .release(&self.shared.handle, &self.shared.namespace);

        self.mailbox.close();
        let mut failed = 0usize;
        while let Ok(call) = self.mailbox.try_recv() {
            self.shared.dequeued();
            self.fail_call(call, reason);
            failed += 1;
        }
        self.table.retire(&id);

        self.metrics.record_actor_terminated();
        info!(
            actor_id = %id,
            reason,
            failed_calls = failed,
            restarts = self.shared.num_restarts(),
            "Actor terminated"
        );
    }

    /// Settle a call that will never run
    fn fail_call(&self, call: ActorCall, reason: &str) {
        let id = self.shared.handle.id;
        self.store.complete(
            &call.result,
            Err(TaskFailure::actor_died(format!("actor {} died: {}", id, reason))),
        );
    }
}

/// Resolves once a kill leaves the actor `Terminated`; restart kills are moot before construction
async fn killed_for_good(control: &mut mpsc::UnboundedReceiver<Control>, shared: &ActorShared) {
    while let Some(Control::Kill) = control.recv().await {
        if shared.state() == ActorState::Terminated {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Wait for the placement group, then resolve constructor arguments
async fn prepare(
    binding: Option<GroupBinding>,
    store: &ObjectStore,
    args: &[TaskArg],
) -> std::result::Result<Vec<Bytes>, String> {
    if let Some(binding) = binding {
        debug!(group = %binding.group_id(), "Actor waiting for placement group");
        binding.ready().await.map_err(|failure| failure.message)?;
    }
    resolve_arguments(store, args).await.map_err(|failure| failure.to_string())
}

impl Execution {
    fn context(&self) -> ActorContext {
        ActorContext::new(
            self.shared.handle.id,
            self.shared.num_restarts() > 0,
            self.exit.clone(),
        )
    }

    async fn construct(&self, payloads: &Arc<Vec<Bytes>>) -> Construction {
        let factory = self.shared.factory.clone();
        let input = payloads.clone();
        let context = self.context();
        let joined =
            tokio::task::spawn_blocking(move || context::scope(context, || factory(&input))).await;
        match joined {
            Ok(Ok(instance)) => Construction::Built(instance),
            Ok(Err(message)) => Construction::Refused(message),
            Err(join_error) => Construction::Crashed(panic_message(join_error)),
        }
    }

    /// Run one queued call and settle its result object
    async fn call(&self, call: ActorCall) -> Outcome {
        let ActorCall {
            method_name,
            method,
            args,
            result,
            pins,
        } = call;

        let payloads = match resolve_arguments(&self.store, &args).await {
            Ok(payloads) => payloads,
            Err(failure) => {
                self.metrics.record_task_failed();
                self.store.complete(&result, Err(failure));
                return Outcome::Completed;
            }
        };

        let instance = self.instance.clone();
        let context = self.context();
        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || match method {
            MethodFn::Exclusive(method) => instance
                .write()
                .as_mut()
                .map(|state| context::scope(context, || method(state, &payloads))),
            MethodFn::Shared(method) => instance
                .read()
                .as_ref()
                .map(|state| context::scope(context, || method(state, &payloads))),
        })
        .await;
        drop(pins);

        match joined {
            Ok(Some(Ok(data))) => {
                self.metrics.record_execution(started.elapsed(), true);
                self.store.complete(&result, Ok(data));
                Outcome::Completed
            }
            Ok(Some(Err(message))) => {
                self.metrics.record_execution(started.elapsed(), false);
                debug!(actor_id = %self.shared.handle.id, method = %method_name, error = %message, "Actor method raised");
                self.store.complete(&result, Err(TaskFailure::raised(message)));
                Outcome::Completed
            }
            Ok(None) => {
                self.metrics.record_task_failed();
                self.store.complete(
                    &result,
                    Err(TaskFailure::actor_died(format!(
                        "actor {} has no live instance",
                        self.shared.handle.id
                    ))),
                );
                Outcome::Completed
            }
            Err(join_error) => {
                let message = panic_message(join_error);
                self.metrics.record_execution(started.elapsed(), false);
                error!(
                    actor_id = %self.shared.handle.id,
                    method = %method_name,
                    error = %message,
                    "Actor crashed while executing method"
                );
                self.store
                    .complete(&result, Err(TaskFailure::worker_crashed(message.clone())));
                Outcome::Crashed(message)
            }
        }
    }
}
