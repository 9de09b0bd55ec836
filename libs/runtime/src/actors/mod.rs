//! Local Actor Manager
//!
//! Owns the actor table of local mode. Each actor runs as one tokio task
//! ([`task::ActorTask`]) fed by an unbounded mailbox; the manager validates
//! submissions, enforces naming and pending-call limits, and turns kills
//! into state changes the task loop then acts on.

pub mod context;
mod task;

use crate::dispatcher::PinnedArgs;
use crate::error::{GatewayError, Result};
use crate::metrics::GatewayMetrics;
use crate::names::NameDirectory;
use crate::placement::PlacementGroupManager;
use crate::pubsub::EventPublisher;
use crate::registry::{ActorFactory, FunctionRegistry, MethodFn, RemoteFunctionHandle};
use crate::store::ObjectStore;
use futures::future::join_all;
use gateway_types::{
    ActorCreationOptions, ActorHandle, ActorId, ActorState, CallOptions, LifecycleEvent, ObjectId,
    TaskArg,
};
use parking_lot::{Mutex, RwLock};
use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use context::ActorContext;
use task::ActorTask;

/// A queued method invocation
pub(crate) struct ActorCall {
    pub(crate) method_name: String,
    pub(crate) method: MethodFn,
    pub(crate) args: Vec<TaskArg>,
    pub(crate) result: ObjectId,
    pub(crate) pins: PinnedArgs,
}

pub(crate) enum Control {
    Kill,
}

/// Per-actor state visible to both the manager and the task loop
pub(crate) struct ActorShared {
    pub(crate) handle: ActorHandle,
    pub(crate) class: String,
    pub(crate) state_type: TypeId,
    pub(crate) factory: ActorFactory,
    pub(crate) options: ActorCreationOptions,
    pub(crate) namespace: String,
    state: watch::Sender<ActorState>,
    restarts: AtomicU32,
    queued: AtomicUsize,
    max_pending_calls: usize,
    events: Arc<EventPublisher>,
}

impl ActorShared {
    pub(crate) fn state(&self) -> ActorState {
        *self.state.borrow()
    }

    /// Apply a legal transition and publish it; false if rejected
    pub(crate) fn transition(&self, next: ActorState) -> bool {
        let mut changed = false;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                changed = true;
            }
            changed
        });
        if changed {
            debug!(actor_id = %self.handle.id, state = %next, "Actor state changed");
            self.events.publish(LifecycleEvent::Actor {
                id: self.handle.id,
                name: self.handle.name.clone(),
                state: next,
                num_restarts: self.num_restarts(),
            });
        }
        changed
    }

    pub(crate) fn num_restarts(&self) -> u32 {
        self.restarts.load(Ordering::Acquire)
    }

    pub(crate) fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn enqueued(&self) {
        self.queued.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dequeued(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }
}

struct ActorRecord {
    shared: Arc<ActorShared>,
    mailbox: mpsc::UnboundedSender<ActorCall>,
    control: mpsc::UnboundedSender<Control>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Terminated actors remembered for state queries after their record is dropped
const TOMBSTONE_CAPACITY: usize = 1_024;

/// Live actor records plus a bounded memory of retired ids
#[derive(Default)]
pub(crate) struct ActorTable {
    live: RwLock<HashMap<ActorId, Arc<ActorRecord>>>,
    retired: Mutex<VecDeque<ActorId>>,
}

impl ActorTable {
    fn get(&self, id: &ActorId) -> Option<Arc<ActorRecord>> {
        self.live.read().get(id).cloned()
    }

    fn insert(&self, id: ActorId, record: Arc<ActorRecord>) {
        self.live.write().insert(id, record);
    }

    /// Drop a terminated actor's record, keeping its id as a tombstone
    pub(crate) fn retire(&self, id: &ActorId) {
        if self.live.write().remove(id).is_none() {
            return;
        }
        let mut retired = self.retired.lock();
        if retired.len() == TOMBSTONE_CAPACITY {
            retired.pop_front();
        }
        retired.push_back(*id);
    }

    fn is_retired(&self, id: &ActorId) -> bool {
        self.retired.lock().contains(id)
    }

    fn records(&self) -> Vec<Arc<ActorRecord>> {
        self.live.read().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.live.read().len()
    }

    fn clear(&self) {
        self.live.write().clear();
    }
}

pub(crate) struct ActorManager {
    actors: Arc<ActorTable>,
    names: Arc<NameDirectory>,
    store: Arc<ObjectStore>,
    registry: Arc<FunctionRegistry>,
    placement: Arc<PlacementGroupManager>,
    events: Arc<EventPublisher>,
    metrics: Arc<GatewayMetrics>,
    namespace: String,
    default_max_pending_calls: usize,
    executor: Handle,
}

/// Collaborators the manager shares with the rest of the local runtime
pub(crate) struct ActorManagerParts {
    pub(crate) store: Arc<ObjectStore>,
    pub(crate) registry: Arc<FunctionRegistry>,
    pub(crate) placement: Arc<PlacementGroupManager>,
    pub(crate) events: Arc<EventPublisher>,
    pub(crate) metrics: Arc<GatewayMetrics>,
    pub(crate) names: Arc<NameDirectory>,
}

impl ActorManager {
    pub(crate) fn new(
        parts: ActorManagerParts,
        namespace: String,
        default_max_pending_calls: usize,
        executor: Handle,
    ) -> Self {
        Self {
            actors: Arc::new(ActorTable::default()),
            names: parts.names,
            store: parts.store,
            registry: parts.registry,
            placement: parts.placement,
            events: parts.events,
            metrics: parts.metrics,
            namespace,
            default_max_pending_calls,
            executor,
        }
    }

    fn record(&self, id: &ActorId) -> Result<Arc<ActorRecord>> {
        self.actors
            .get(id)
            .ok_or_else(|| GatewayError::actor_not_found(id))
    }

    /// Register an actor and start constructing it in the background
    pub(crate) fn create(
        &self,
        class: &RemoteFunctionHandle,
        args: Vec<TaskArg>,
        options: ActorCreationOptions,
    ) -> Result<ActorHandle> {
        options.validate()?;
        let (state_type, factory) = self.registry.actor_factory(class)?;
        class.check_arity(args.len())?;

        let binding = match &options.placement_group {
            Some(group) => Some(self.placement.bind(group, options.bundle_index)?),
            None => None,
        };
        let pins = PinnedArgs::pin(&self.store, &args)?;

        let id = ActorId::new();
        let handle = match &options.name {
            Some(name) => ActorHandle::named(id, name.clone(), options.global),
            None => ActorHandle::new(id),
        };
        self.names.claim(&handle, &self.namespace)?;

        let (state, _) = watch::channel(ActorState::Pending);
        let shared = Arc::new(ActorShared {
            handle: handle.clone(),
            class: class.name().to_string(),
            state_type,
            factory,
            max_pending_calls: options
                .max_pending_calls
                .unwrap_or(self.default_max_pending_calls),
            options,
            namespace: self.namespace.clone(),
            state,
            restarts: AtomicU32::new(0),
            queued: AtomicUsize::new(0),
            events: self.events.clone(),
        });

        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let task = ActorTask {
            shared: shared.clone(),
            args,
            pins: Some(pins),
            binding,
            mailbox: mailbox_rx,
            control: control_rx,
            store: self.store.clone(),
            metrics: self.metrics.clone(),
            names: self.names.clone(),
            table: self.actors.clone(),
        };

        let record = Arc::new(ActorRecord {
            shared: shared.clone(),
            mailbox: mailbox_tx,
            control: control_tx,
            task: Mutex::new(None),
        });
        self.actors.insert(id, record.clone());

        self.metrics.record_actor_created();
        self.events.publish(LifecycleEvent::Actor {
            id,
            name: handle.name.clone(),
            state: ActorState::Pending,
            num_restarts: 0,
        });
        info!(actor_id = %id, class = class.name(), name = ?handle.name, "Actor created");

        *record.task.lock() = Some(self.executor.spawn(task.run()));
        Ok(handle)
    }

    /// Queue a method call, returning its result object
    pub(crate) fn call(
        &self,
        method: &RemoteFunctionHandle,
        actor: &ActorId,
        args: Vec<TaskArg>,
        options: &CallOptions,
    ) -> Result<ObjectId> {
        options.validate()?;
        let (state_type, method_fn) = self.registry.actor_method(method)?;
        method.check_arity(args.len())?;

        let record = self.record(actor)?;
        let shared = &record.shared;
        if state_type != shared.state_type {
            return Err(GatewayError::invalid_argument(format!(
                "method '{}' is not defined on actor class '{}'",
                method.name(),
                shared.class
            )));
        }

        match shared.state() {
            ActorState::Terminated => {
                self.metrics.record_actor_call(false);
                return Err(GatewayError::actor_not_found(actor));
            }
            ActorState::Restarting if shared.queued() >= shared.max_pending_calls => {
                self.metrics.record_actor_call(false);
                return Err(GatewayError::ActorRestarting {
                    actor_id: *actor,
                    pending_calls: shared.queued(),
                });
            }
            _ => {}
        }

        let pins = PinnedArgs::pin(&self.store, &args)?;
        let result = self.store.create_pending();
        shared.enqueued();

        let call = ActorCall {
            method_name: method.name().to_string(),
            method: method_fn,
            args,
            result,
            pins,
        };
        if let Err(mpsc::error::SendError(rejected)) = record.mailbox.send(call) {
            shared.dequeued();
            self.store.release(&rejected.result);
            self.metrics.record_actor_call(false);
            return Err(if shared.state() == ActorState::Terminated {
                GatewayError::actor_not_found(actor)
            } else {
                GatewayError::ActorUnreachable {
                    actor_id: *actor,
                    reason: "mailbox closed".to_string(),
                }
            });
        }

        self.metrics.record_actor_call(true);
        debug!(actor_id = %actor, method = method.name(), result = %result, "Actor call queued");
        Ok(result)
    }

    /// Kill an actor; with `no_restart` false it restarts if its budget allows
    pub(crate) fn kill(&self, actor: &ActorId, no_restart: bool) -> Result<()> {
        let record = self.record(actor)?;
        let shared = &record.shared;
        if shared.state() == ActorState::Terminated {
            return Err(GatewayError::actor_not_found(actor));
        }

        let restart = !no_restart && shared.options.allows_restart(shared.num_restarts());
        if restart {
            shared.transition(ActorState::Restarting);
        } else {
            shared.transition(ActorState::Terminated);
            self.names.release(&shared.handle, &self.namespace);
        }
        info!(actor_id = %actor, no_restart, restart, "Kill requested");

        if record.control.send(Control::Kill).is_err() {
            debug!(actor_id = %actor, "Actor task already stopped");
        }
        Ok(())
    }

    pub(crate) fn get_actor_id(&self, global: bool, name: &str) -> Result<ActorId> {
        self.names
            .lookup(global, &self.namespace, name)
            .ok_or_else(|| GatewayError::actor_not_found(name))
    }

    /// Recently terminated actors still report `Terminated`
    pub(crate) fn state(&self, actor: &ActorId) -> Result<ActorState> {
        match self.record(actor) {
            Ok(record) => Ok(record.shared.state()),
            Err(_) if self.actors.is_retired(actor) => Ok(ActorState::Terminated),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn num_restarts(&self, actor: &ActorId) -> Result<u32> {
        Ok(self.record(actor)?.shared.num_restarts())
    }

    /// Actors not yet terminated
    pub(crate) fn live_count(&self) -> usize {
        self.actors
            .records()
            .iter()
            .filter(|record| !record.shared.state().is_terminal())
            .count()
    }

    /// Records still held, including actors whose loop is winding down
    pub(crate) fn tracked_count(&self) -> usize {
        self.actors.len()
    }

    /// Terminate every actor and wait for their loops to finish
    pub(crate) async fn shutdown(&self, grace: Duration) {
        let records = self.actors.records();

        let mut handles = Vec::new();
        for record in records {
            if !record.shared.state().is_terminal() {
                record.shared.transition(ActorState::Terminated);
                self.names.release(&record.shared.handle, &self.namespace);
                let _ = record.control.send(Control::Kill);
            }
            if let Some(handle) = record.task.lock().take() {
                handles.push(handle);
            }
        }

        let count = handles.len();
        if tokio::time::timeout(grace, join_all(handles)).await.is_err() {
            warn!(actors = count, grace_ms = grace.as_millis() as u64, "Actor loops still running after grace period");
        }
        self.actors.clear();
    }
}
