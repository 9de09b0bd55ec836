//! In-process runtime
//!
//! Everything lives in this process: the object store, task execution on
//! the tokio blocking pool, actor loops and a single-node placement pool
//! sized from configuration.

use crate::actors::{ActorManager, ActorManagerParts};
use crate::dispatcher::TaskDispatcher;
use crate::error::{GatewayError, Result};
use crate::metrics::{GatewayMetrics, MetricsSnapshot};
use crate::names::NameDirectory;
use crate::placement::PlacementGroupManager;
use crate::pubsub::EventPublisher;
use crate::references::{ReferenceTable, Release};
use crate::registry::{FunctionRegistry, RemoteFunctionHandle};
use crate::runtime::Runtime;
use crate::store::ObjectStore;
use async_trait::async_trait;
use gateway_config::{RuntimeConfig, RuntimeMode};
use gateway_types::{
    validate_resources, ActorCreationOptions, ActorHandle, ActorId, ActorState, Bytes,
    CallOptions, ObjectId, PlacementGroup, PlacementGroupCreationOptions, PlacementGroupId,
    PlacementGroupState, Resources, TaskArg,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

pub struct LocalModeRuntime {
    references: ReferenceTable,
    store: Arc<ObjectStore>,
    registry: Arc<FunctionRegistry>,
    dispatcher: TaskDispatcher,
    actors: ActorManager,
    placement: Arc<PlacementGroupManager>,
    events: Arc<EventPublisher>,
    metrics: Arc<GatewayMetrics>,
    shutdown_grace: Duration,
    shutdown: AtomicBool,
}

impl LocalModeRuntime {
    /// Build the runtime on the current tokio runtime
    pub fn new(config: &RuntimeConfig, registry: Arc<FunctionRegistry>) -> Result<Self> {
        let executor = Handle::try_current().map_err(|e| {
            GatewayError::configuration(format!("local mode needs a tokio runtime: {}", e))
        })?;
        let node: Resources = config.resources.clone();
        validate_resources(&node)?;

        let events = Arc::new(EventPublisher::new());
        let metrics = Arc::new(GatewayMetrics::default());
        let store = Arc::new(ObjectStore::new(
            config.object_store_memory_bytes,
            events.clone(),
            metrics.clone(),
        ));
        let placement = Arc::new(PlacementGroupManager::new(
            node.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let dispatcher = TaskDispatcher::new(
            store.clone(),
            registry.clone(),
            placement.clone(),
            metrics.clone(),
            config.default_task_retries,
            executor.clone(),
        );
        let actors = ActorManager::new(
            ActorManagerParts {
                store: store.clone(),
                registry: registry.clone(),
                placement: placement.clone(),
                events: events.clone(),
                metrics: metrics.clone(),
                names: Arc::new(NameDirectory::new()),
            },
            config.namespace.clone(),
            config.default_max_pending_calls,
            executor,
        );

        info!(
            namespace = %config.namespace,
            resources = ?node,
            functions = registry.len(),
            "Local mode runtime started"
        );

        Ok(Self {
            references: ReferenceTable::new(),
            store,
            registry,
            dispatcher,
            actors,
            placement,
            events,
            metrics,
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Drop an object's data as if its node had died
    pub fn evict_object(&self, id: &ObjectId) -> Result<()> {
        self.ensure_open()?;
        self.store.evict(id)
    }

    /// Resources not reserved by placement groups
    pub fn available_resources(&self) -> Resources {
        self.placement.available()
    }

    /// Objects currently held by the store
    pub fn stored_objects(&self) -> usize {
        self.store.len()
    }

    fn owned(&self, id: ObjectId) -> ObjectId {
        self.references.register_owned(id);
        id
    }
}

#[async_trait]
impl Runtime for LocalModeRuntime {
    fn mode(&self) -> RuntimeMode {
        RuntimeMode::Local
    }

    fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    async fn put(&self, data: Bytes) -> Result<ObjectId> {
        self.ensure_open()?;
        let id = self.store.put(data)?;
        Ok(self.owned(id))
    }

    async fn get(&self, id: &ObjectId) -> Result<Bytes> {
        self.ensure_open()?;
        self.store.get(id).await
    }

    async fn wait(
        &self,
        ids: &[ObjectId],
        num_objects: usize,
        timeout: Duration,
    ) -> Result<Vec<bool>> {
        self.ensure_open()?;
        self.store.wait(ids, num_objects, timeout).await
    }

    fn add_local_reference(&self, id: &ObjectId) -> Result<u64> {
        self.ensure_open()?;
        self.references
            .add_if(id, |id| self.store.is_held(id))
            .ok_or(GatewayError::ObjectNotFound { id: *id })
    }

    fn remove_local_reference(&self, id: &ObjectId) -> Result<()> {
        self.ensure_open()?;
        let released = self
            .references
            .remove_with(id, |id| self.store.release(id))?;
        if let Release::Released = released {
            debug!(object = %id, "Last local reference released");
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
        let id = self.dispatcher.submit(function, args, options)?;
        Ok(self.owned(id))
    }

    async fn create_actor(
        &self,
        class: &RemoteFunctionHandle,
        args: Vec<TaskArg>,
        options: ActorCreationOptions,
    ) -> Result<ActorHandle> {
        self.ensure_open()?;
        self.actors.create(class, args, options)
    }

    async fn call_actor(
        &self,
        method: &RemoteFunctionHandle,
        actor: &ActorId,
        args: Vec<TaskArg>,
        options: &CallOptions,
    ) -> Result<ObjectId> {
        self.ensure_open()?;
        let id = self.actors.call(method, actor, args, options)?;
        Ok(self.owned(id))
    }

    async fn get_actor_id(&self, global: bool, name: &str) -> Result<ActorId> {
        self.ensure_open()?;
        self.actors.get_actor_id(global, name)
    }

    async fn kill_actor(&self, actor: &ActorId, no_restart: bool) -> Result<()> {
        self.ensure_open()?;
        self.actors.kill(actor, no_restart)
    }

    async fn actor_state(&self, actor: &ActorId) -> Result<ActorState> {
        self.ensure_open()?;
        self.actors.state(actor)
    }

    async fn create_placement_group(
        &self,
        options: PlacementGroupCreationOptions,
    ) -> Result<PlacementGroup> {
        self.ensure_open()?;
        self.placement.create(options)
    }

    async fn remove_placement_group(&self, id: &PlacementGroupId) -> Result<()> {
        self.ensure_open()?;
        self.placement.remove(id)
    }

    async fn wait_placement_group_ready(
        &self,
        id: &PlacementGroupId,
        timeout: Duration,
    ) -> Result<bool> {
        self.ensure_open()?;
        self.placement.wait_ready(id, timeout).await
    }

    async fn placement_group_state(&self, id: &PlacementGroupId) -> Result<PlacementGroupState> {
        self.ensure_open()?;
        self.placement.state(id)
    }

    async fn list_placement_groups(&self) -> Result<Vec<(PlacementGroup, PlacementGroupState)>> {
        self.ensure_open()?;
        Ok(self.placement.list())
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
        info!("Shutting down local mode runtime");

        // Actors parked on a pending group only wake once it is removed
        self.placement.clear();
        self.actors.shutdown(self.shutdown_grace).await;

        let held = self.references.drain();
        for id in &held {
            self.store.release(id);
        }
        self.store.clear();

        let snapshot = self.metrics.snapshot();
        info!(
            released_references = held.len(),
            objects_put = snapshot.objects_put,
            tasks_submitted = snapshot.tasks_submitted,
            tasks_failed = snapshot.tasks_failed,
            actors_created = snapshot.actors_created,
            "Local mode runtime stopped"
        );
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
