//! Cluster-backed runtime
//!
//! Storage, scheduling and actor processes belong to an external cluster
//! reached through a [`ClusterClient`]. The gateway side still owns what is
//! process-local: reference counts, fail-fast name resolution, option
//! validation, non-global actor names and the error taxonomy.

use crate::error::{GatewayError, Result};
use crate::metrics::{GatewayMetrics, MetricsSnapshot};
use crate::names::NameDirectory;
use crate::pubsub::EventPublisher;
use crate::references::{ReferenceTable, Release};
use crate::registry::{FunctionKind, FunctionRegistry, RemoteFunctionHandle};
use crate::runtime::Runtime;
use async_trait::async_trait;
use dashmap::DashMap;
use gateway_config::{RuntimeConfig, RuntimeMode};
use gateway_types::{
    ActorCreationOptions, ActorHandle, ActorId, ActorState, Bytes, CallOptions, LifecycleEvent,
    ObjectId, PlacementGroup, PlacementGroupCreationOptions, PlacementGroupId,
    PlacementGroupState, TaskArg, TaskId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A task handed to the cluster scheduler
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub function: String,
    pub args: Vec<TaskArg>,
    pub options: CallOptions,
}

/// An actor the cluster should construct under a gateway-chosen id
#[derive(Debug, Clone)]
pub struct ActorSpec {
    pub actor_id: ActorId,
    pub class: String,
    pub args: Vec<TaskArg>,
    pub options: ActorCreationOptions,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct ActorTaskSpec {
    pub task_id: TaskId,
    pub actor_id: ActorId,
    pub method: String,
    pub args: Vec<TaskArg>,
    pub options: CallOptions,
}

/// Contract of the external scheduler and object store
///
/// Failures of accepted work are reported through `get`, never through the
/// submission call. Submission errors use the gateway taxonomy; transport
/// problems map to [`GatewayError::Backend`].
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn put(&self, data: Bytes) -> Result<ObjectId>;

    async fn get(&self, id: &ObjectId) -> Result<Bytes>;

    async fn wait(
        &self,
        ids: &[ObjectId],
        num_objects: usize,
        timeout: Duration,
    ) -> Result<Vec<bool>>;

    async fn submit_task(&self, spec: TaskSpec) -> Result<ObjectId>;

    async fn create_actor(&self, spec: ActorSpec) -> Result<()>;

    async fn submit_actor_task(&self, spec: ActorTaskSpec) -> Result<ObjectId>;

    /// Global actor registered under `(namespace, name)`, if any
    async fn lookup_named_actor(&self, namespace: &str, name: &str) -> Result<Option<ActorId>>;

    async fn kill_actor(&self, actor: &ActorId, no_restart: bool) -> Result<()>;

    async fn actor_state(&self, actor: &ActorId) -> Result<ActorState>;

    async fn create_placement_group(
        &self,
        options: &PlacementGroupCreationOptions,
    ) -> Result<PlacementGroupId>;

    async fn remove_placement_group(&self, id: &PlacementGroupId) -> Result<()>;

    async fn placement_group_state(&self, id: &PlacementGroupId) -> Result<PlacementGroupState>;

    /// This process no longer holds any reference to these objects
    async fn release_objects(&self, ids: Vec<ObjectId>) -> Result<()>;
}

pub struct ClusterModeRuntime {
    client: Arc<dyn ClusterClient>,
    registry: Arc<FunctionRegistry>,
    references: ReferenceTable,
    names: NameDirectory,
    /// Actors this gateway created, for local names and teardown
    owned_actors: DashMap<ActorId, ActorHandle>,
    groups: DashMap<PlacementGroupId, PlacementGroup>,
    events: Arc<EventPublisher>,
    metrics: Arc<GatewayMetrics>,
    namespace: String,
    poll_interval: Duration,
    executor: Handle,
    shutdown: AtomicBool,
}

impl ClusterModeRuntime {
    pub fn new(
        config: &RuntimeConfig,
        registry: Arc<FunctionRegistry>,
        client: Arc<dyn ClusterClient>,
    ) -> Result<Self> {
        let executor = Handle::try_current().map_err(|e| {
            GatewayError::configuration(format!("cluster mode needs a tokio runtime: {}", e))
        })?;
        info!(
            address = ?config.address,
            namespace = %config.namespace,
            functions = registry.len(),
            "Cluster mode runtime started"
        );
        Ok(Self {
            client,
            registry,
            references: ReferenceTable::new(),
            names: NameDirectory::new(),
            owned_actors: DashMap::new(),
            groups: DashMap::new(),
            events: Arc::new(EventPublisher::new()),
            metrics: Arc::new(GatewayMetrics::default()),
            namespace: config.namespace.clone(),
            poll_interval: Duration::from_millis(config.wait_poll_interval_ms),
            executor,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Resolve the handle locally before anything reaches the cluster
    fn check_callable(
        &self,
        handle: &RemoteFunctionHandle,
        kind: FunctionKind,
        supplied: usize,
    ) -> Result<()> {
        handle.expect_kind(kind)?;
        let registered = self.registry.resolve(handle.name())?;
        if registered.kind() != kind {
            return Err(GatewayError::unregistered(handle.name()));
        }
        handle.check_arity(supplied)
    }

    fn owned(&self, id: ObjectId) -> ObjectId {
        self.references.register_owned(id);
        id
    }

    fn release_remote(&self, ids: Vec<ObjectId>) {
        if ids.is_empty() {
            return;
        }
        let client = self.client.clone();
        self.executor.spawn(async move {
            let count = ids.len();
            if let Err(e) = client.release_objects(ids).await {
                warn!(objects = count, error = %e, "Failed to release objects in cluster");
            }
        });
    }

    fn forget_actor(&self, actor: &ActorId) {
        if let Some((_, handle)) = self.owned_actors.remove(actor) {
            self.names.release(&handle, &self.namespace);
            self.metrics.record_actor_terminated();
        }
    }

    fn publish_actor(&self, handle: &ActorHandle, state: ActorState) {
        self.events.publish(LifecycleEvent::Actor {
            id: handle.id,
            name: handle.name.clone(),
            state,
            num_restarts: 0,
        });
    }
}

#[async_trait]
impl Runtime for ClusterModeRuntime {
    fn mode(&self) -> RuntimeMode {
        RuntimeMode::Cluster
    }

    fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    async fn put(&self, data: Bytes) -> Result<ObjectId> {
        self.ensure_open()?;
        let id = self.client.put(data).await?;
        self.metrics.record_put();
        Ok(self.owned(id))
    }

    async fn get(&self, id: &ObjectId) -> Result<Bytes> {
        self.ensure_open()?;
        self.client.get(id).await
    }

    async fn wait(
        &self,
        ids: &[ObjectId],
        num_objects: usize,
        timeout: Duration,
    ) -> Result<Vec<bool>> {
        self.ensure_open()?;
        if num_objects == 0 || num_objects > ids.len() {
            return Err(GatewayError::invalid_argument(format!(
                "num_objects must be between 1 and {}, got {}",
                ids.len(),
                num_objects
            )));
        }
        self.client.wait(ids, num_objects, timeout).await
    }

    fn add_local_reference(&self, id: &ObjectId) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.references.add(id))
    }

    fn remove_local_reference(&self, id: &ObjectId) -> Result<()> {
        self.ensure_open()?;
        if let Release::Released = self.references.remove(id)? {
            debug!(object = %id, "Last local reference released");
            self.metrics.record_release();
            self.release_remote(vec![*id]);
        }
        Ok(())
    }

    fn local_reference_count(&self, id: &ObjectId) -> u64 {
        self.references.count(id)
    }

    async fn call(
        &self,
        function: &RemoteFunctionHandle,
        args: Vec<TaskArg>,
        options: &CallOptions,
    ) -> Result<ObjectId> {
        self.ensure_open()?;
        options.validate()?;
        self.check_callable(function, FunctionKind::Function, args.len())?;

        let spec = TaskSpec {
            task_id: TaskId::new(),
            function: function.name().to_string(),
            args,
            options: options.clone(),
        };
        let task_id = spec.task_id;
        let id = self.client.submit_task(spec).await?;
        self.metrics.record_task_submitted();
        debug!(task = %task_id, function = function.name(), result = %id, "Task submitted to cluster");
        Ok(self.owned(id))
    }

    async fn create_actor(
        &self,
        class: &RemoteFunctionHandle,
        args: Vec<TaskArg>,
        options: ActorCreationOptions,
    ) -> Result<ActorHandle> {
        self.ensure_open()?;
        options.validate()?;
        self.check_callable(class, FunctionKind::ActorClass, args.len())?;

        let actor_id = ActorId::new();
        let handle = match &options.name {
            Some(name) => ActorHandle::named(actor_id, name.clone(), options.global),
            None => ActorHandle::new(actor_id),
        };
        // Global names are arbitrated by the cluster
        if !handle.global {
            self.names.claim(&handle, &self.namespace)?;
        }

        let spec = ActorSpec {
            actor_id,
            class: class.name().to_string(),
            args,
            options,
            namespace: self.namespace.clone(),
        };
        if let Err(e) = self.client.create_actor(spec).await {
            self.names.release(&handle, &self.namespace);
            return Err(e);
        }

        self.owned_actors.insert(actor_id, handle.clone());
        self.metrics.record_actor_created();
        self.publish_actor(&handle, ActorState::Pending);
        info!(actor_id = %actor_id, class = class.name(), name = ?handle.name, "Actor created in cluster");
        Ok(handle)
    }

    async fn call_actor(
        &self,
        method: &RemoteFunctionHandle,
        actor: &ActorId,
        args: Vec<TaskArg>,
        options: &CallOptions,
    ) -> Result<ObjectId> {
        self.ensure_open()?;
        options.validate()?;
        self.check_callable(method, FunctionKind::ActorMethod, args.len())?;

        let spec = ActorTaskSpec {
            task_id: TaskId::new(),
            actor_id: *actor,
            method: method.name().to_string(),
            args,
            options: options.clone(),
        };
        match self.client.submit_actor_task(spec).await {
            Ok(id) => {
                self.metrics.record_actor_call(true);
                Ok(self.owned(id))
            }
            Err(e) => {
                self.metrics.record_actor_call(false);
                if matches!(e, GatewayError::ActorNotFound { .. }) {
                    self.forget_actor(actor);
                }
                Err(e)
            }
        }
    }

    async fn get_actor_id(&self, global: bool, name: &str) -> Result<ActorId> {
        self.ensure_open()?;
        if global {
            return self
                .client
                .lookup_named_actor(&self.namespace, name)
                .await?
                .ok_or_else(|| GatewayError::actor_not_found(name));
        }

        let id = self
            .names
            .lookup(false, &self.namespace, name)
            .ok_or_else(|| GatewayError::actor_not_found(name))?;
        // The actor may have exited on its own since the name was claimed
        if self.client.actor_state(&id).await? == ActorState::Terminated {
            self.forget_actor(&id);
            return Err(GatewayError::actor_not_found(name));
        }
        Ok(id)
    }

    async fn kill_actor(&self, actor: &ActorId, no_restart: bool) -> Result<()> {
        self.ensure_open()?;
        self.client.kill_actor(actor, no_restart).await?;
        info!(actor_id = %actor, no_restart, "Kill forwarded to cluster");
        if no_restart {
            if let Some(handle) = self.owned_actors.get(actor).map(|h| h.clone()) {
                self.publish_actor(&handle, ActorState::Terminated);
            }
            self.forget_actor(actor);
        }
        Ok(())
    }

    async fn actor_state(&self, actor: &ActorId) -> Result<ActorState> {
        self.ensure_open()?;
        self.client.actor_state(actor).await
    }

    async fn create_placement_group(
        &self,
        options: PlacementGroupCreationOptions,
    ) -> Result<PlacementGroup> {
        self.ensure_open()?;
        options.validate()?;
        let id = self.client.create_placement_group(&options).await?;
        let group = PlacementGroup {
            id,
            name: options.name,
            bundles: options.bundles,
            strategy: options.strategy,
        };
        self.groups.insert(id, group.clone());
        self.metrics.record_placement_group(true);
        self.events.publish(LifecycleEvent::PlacementGroup {
            id,
            state: PlacementGroupState::Pending,
        });
        info!(group = %id, bundles = group.bundle_count(), "Placement group created in cluster");
        Ok(group)
    }

    async fn remove_placement_group(&self, id: &PlacementGroupId) -> Result<()> {
        self.ensure_open()?;
        self.client.remove_placement_group(id).await?;
        self.groups.remove(id);
        self.metrics.record_placement_group(false);
        self.events.publish(LifecycleEvent::PlacementGroup {
            id: *id,
            state: PlacementGroupState::Removed,
        });
        Ok(())
    }

    async fn wait_placement_group_ready(
        &self,
        id: &PlacementGroupId,
        timeout: Duration,
    ) -> Result<bool> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;
        loop {
            match self.client.placement_group_state(id).await? {
                PlacementGroupState::Ready => return Ok(true),
                PlacementGroupState::Removed => {
                    return Err(GatewayError::PlacementGroupNotFound { group_id: *id })
                }
                PlacementGroupState::Pending => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn placement_group_state(&self, id: &PlacementGroupId) -> Result<PlacementGroupState> {
        self.ensure_open()?;
        self.client.placement_group_state(id).await
    }

    async fn list_placement_groups(&self) -> Result<Vec<(PlacementGroup, PlacementGroupState)>> {
        self.ensure_open()?;
        let groups: Vec<PlacementGroup> =
            self.groups.iter().map(|entry| entry.value().clone()).collect();
        let mut listed = Vec::with_capacity(groups.len());
        for group in groups {
            let state = self.client.placement_group_state(&group.id).await?;
            listed.push((group, state));
        }
        Ok(listed)
    }

    fn events(&self) -> &Arc<EventPublisher> {
        &self.events
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down cluster mode runtime");

        let actors: Vec<ActorId> = self.owned_actors.iter().map(|e| *e.key()).collect();
        for actor in &actors {
            if let Err(e) = self.client.kill_actor(actor, true).await {
                warn!(actor_id = %actor, error = %e, "Failed to kill actor at shutdown");
            }
            self.forget_actor(actor);
        }

        let held = self.references.drain();
        let released = held.len();
        if !held.is_empty() {
            if let Err(e) = self.client.release_objects(held).await {
                warn!(objects = released, error = %e, "Failed to release objects at shutdown");
            }
        }

        info!(
            killed_actors = actors.len(),
            released_references = released,
            "Cluster mode runtime stopped"
        );
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
