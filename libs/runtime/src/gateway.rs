//! Runtime Gateway facade
//!
//! Typed front door over a [`Runtime`]: values go in and out through the
//! payload codec, object references are RAII handles that keep the local
//! reference count honest, and calls are built with small builders that
//! resolve the callable name up front.
//!
//! ```rust,no_run
//! use runtime_gateway::{FunctionRegistry, GatewayBuilder};
//! use gateway_config::RuntimeConfig;
//!
//! # async fn demo() -> runtime_gateway::Result<()> {
//! let registry = FunctionRegistry::new();
//! registry.register_function("add_one", |(x,): (i64,)| x + 1)?;
//!
//! let gateway = GatewayBuilder::new(RuntimeConfig::default())
//!     .registry(registry)
//!     .build()?;
//! let ten = gateway.put(&10i64).await?;
//! let eleven = gateway.task::<i64>("add_one")?.arg_ref(&ten).remote().await?;
//! assert_eq!(gateway.get(&eleven).await?, 11);
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::cluster::{ClusterClient, ClusterModeRuntime};
use crate::error::{GatewayError, Result};
use crate::local::LocalModeRuntime;
use crate::metrics::MetricsSnapshot;
use crate::pubsub::Subscription;
use crate::registry::{FunctionKind, FunctionRegistry, RemoteFunctionHandle};
use crate::runtime::Runtime;
use gateway_config::{RuntimeConfig, RuntimeMode};
use gateway_types::{
    decode, encode, ActorCreationOptions, ActorHandle, ActorId, ActorState, CallOptions, Channel,
    ObjectId, PlacementGroup, PlacementGroupCreationOptions, PlacementGroupId,
    PlacementGroupState, TaskArg,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Locally counted handle to an object holding a `T`
///
/// Cloning adds a local reference and dropping removes one; the object
/// becomes collectable when the last handle in this process is gone.
pub struct ObjectRef<T> {
    id: ObjectId,
    runtime: Arc<dyn Runtime>,
    /// Whether this handle holds one of the local references
    counted: bool,
    _value: PhantomData<fn() -> T>,
}

impl<T> ObjectRef<T> {
    /// Wrap an id whose local reference the caller already holds
    fn owned(id: ObjectId, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            id,
            runtime,
            counted: true,
            _value: PhantomData,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        let mut clone = Self::owned(self.id, self.runtime.clone());
        if let Err(e) = self.runtime.add_local_reference(&self.id) {
            warn!(object = %self.id, error = %e, "Failed to add local reference on clone");
            clone.counted = false;
        }
        clone
    }
}

impl<T> Drop for ObjectRef<T> {
    fn drop(&mut self) {
        if !self.counted {
            return;
        }
        match self.runtime.remove_local_reference(&self.id) {
            Ok(()) | Err(GatewayError::RuntimeShutdown) => {}
            Err(e) => warn!(object = %self.id, error = %e, "Failed to drop local reference"),
        }
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// Argument list being built; the first encode error is kept for `remote`
#[derive(Default)]
struct Arguments {
    args: Vec<TaskArg>,
    error: Option<GatewayError>,
}

impl Arguments {
    fn value<V: Serialize + ?Sized>(&mut self, value: &V) {
        if self.error.is_some() {
            return;
        }
        match TaskArg::value(value) {
            Ok(arg) => self.args.push(arg),
            Err(e) => self.error = Some(e.into()),
        }
    }

    fn reference<U>(&mut self, object: &ObjectRef<U>) {
        self.args.push(TaskArg::reference(object.id));
    }

    fn finish(self) -> Result<Vec<TaskArg>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.args),
        }
    }
}

/// Pending task submission returning an `R`
#[must_use = "a task is only submitted by `remote`"]
pub struct TaskCall<'g, R> {
    gateway: &'g Gateway,
    function: RemoteFunctionHandle,
    args: Arguments,
    options: CallOptions,
    _result: PhantomData<fn() -> R>,
}

impl<'g, R> TaskCall<'g, R> {
    pub fn arg<V: Serialize + ?Sized>(mut self, value: &V) -> Self {
        self.args.value(value);
        self
    }

    pub fn arg_ref<U>(mut self, object: &ObjectRef<U>) -> Self {
        self.args.reference(object);
        self
    }

    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn remote(self) -> Result<ObjectRef<R>> {
        let args = self.args.finish()?;
        let runtime = &self.gateway.runtime;
        let id = runtime.call(&self.function, args, &self.options).await?;
        Ok(ObjectRef::owned(id, runtime.clone()))
    }
}

/// Pending actor creation
#[must_use = "an actor is only created by `remote`"]
pub struct ActorCreation<'g> {
    gateway: &'g Gateway,
    class: RemoteFunctionHandle,
    args: Arguments,
    options: ActorCreationOptions,
}

impl<'g> ActorCreation<'g> {
    pub fn arg<V: Serialize + ?Sized>(mut self, value: &V) -> Self {
        self.args.value(value);
        self
    }

    pub fn arg_ref<U>(mut self, object: &ObjectRef<U>) -> Self {
        self.args.reference(object);
        self
    }

    pub fn options(mut self, options: ActorCreationOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn remote(self) -> Result<ActorHandle> {
        let args = self.args.finish()?;
        self.gateway
            .runtime
            .create_actor(&self.class, args, self.options)
            .await
    }
}

/// Pending actor method call returning an `R`
#[must_use = "a method call is only submitted by `remote`"]
pub struct MethodCall<'g, R> {
    gateway: &'g Gateway,
    method: RemoteFunctionHandle,
    actor: ActorId,
    args: Arguments,
    options: CallOptions,
    _result: PhantomData<fn() -> R>,
}

impl<'g, R> MethodCall<'g, R> {
    pub fn arg<V: Serialize + ?Sized>(mut self, value: &V) -> Self {
        self.args.value(value);
        self
    }

    pub fn arg_ref<U>(mut self, object: &ObjectRef<U>) -> Self {
        self.args.reference(object);
        self
    }

    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn remote(self) -> Result<ObjectRef<R>> {
        let args = self.args.finish()?;
        let runtime = &self.gateway.runtime;
        let id = runtime
            .call_actor(&self.method, &self.actor, args, &self.options)
            .await?;
        Ok(ObjectRef::owned(id, runtime.clone()))
    }
}

/// Builds a [`Gateway`] for the configured runtime mode
pub struct GatewayBuilder {
    config: RuntimeConfig,
    registry: Arc<FunctionRegistry>,
    cluster_client: Option<Arc<dyn ClusterClient>>,
}

impl GatewayBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: Arc::new(FunctionRegistry::new()),
            cluster_client: None,
        }
    }

    /// Callables available to this gateway; empty when not set
    pub fn registry(mut self, registry: impl Into<Arc<FunctionRegistry>>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Backend for cluster mode
    pub fn cluster_client(mut self, client: Arc<dyn ClusterClient>) -> Self {
        self.cluster_client = Some(client);
        self
    }

    /// Validate the configuration and start the selected runtime
    ///
    /// Needs to run inside a tokio runtime.
    pub fn build(self) -> Result<Gateway> {
        self.config
            .validate()
            .map_err(|e| GatewayError::configuration(format!("{:#}", e)))?;

        let runtime: Arc<dyn Runtime> = match self.config.effective_mode() {
            RuntimeMode::Local => {
                if self.cluster_client.is_some() {
                    warn!("Cluster client ignored in local mode");
                }
                Arc::new(LocalModeRuntime::new(&self.config, self.registry)?)
            }
            RuntimeMode::Cluster => {
                let client = self.cluster_client.ok_or_else(|| {
                    GatewayError::configuration("cluster mode requires a cluster client")
                })?;
                Arc::new(ClusterModeRuntime::new(&self.config, self.registry, client)?)
            }
        };

        info!(mode = %runtime.mode(), namespace = %self.config.namespace, "Gateway initialized");
        Ok(Gateway {
            runtime,
            config: self.config,
        })
    }
}

/// Typed entry point for callers
pub struct Gateway {
    runtime: Arc<dyn Runtime>,
    config: RuntimeConfig,
}

impl Gateway {
    /// Wrap a runtime built elsewhere
    pub fn with_runtime(runtime: Arc<dyn Runtime>, config: RuntimeConfig) -> Self {
        Self { runtime, config }
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn mode(&self) -> RuntimeMode {
        self.runtime.mode()
    }

    fn resolve(&self, name: &str, kind: FunctionKind) -> Result<RemoteFunctionHandle> {
        self.runtime.ensure_open()?;
        let handle = self.runtime.registry().resolve(name)?;
        handle.expect_kind(kind)?;
        Ok(handle)
    }

    pub async fn put<T: Serialize>(&self, value: &T) -> Result<ObjectRef<T>> {
        let payload = encode(value)?;
        let id = self.runtime.put(payload).await?;
        Ok(ObjectRef::owned(id, self.runtime.clone()))
    }

    pub async fn get<T: DeserializeOwned>(&self, object: &ObjectRef<T>) -> Result<T> {
        let payload = self.runtime.get(&object.id).await?;
        Ok(decode(&payload)?)
    }

    /// Values in input order; fails as a whole on the first error
    pub async fn get_all<T: DeserializeOwned>(&self, objects: &[ObjectRef<T>]) -> Result<Vec<T>> {
        let ids: Vec<ObjectId> = objects.iter().map(ObjectRef::id).collect();
        let payloads = self.runtime.get_many(&ids).await?;
        payloads
            .iter()
            .map(|payload| decode(payload).map_err(GatewayError::from))
            .collect()
    }

    /// Ready flag per object after `num_objects` settle or `timeout_ms` passes
    pub async fn wait<T>(
        &self,
        objects: &[ObjectRef<T>],
        num_objects: usize,
        timeout_ms: u64,
    ) -> Result<Vec<bool>> {
        let ids: Vec<ObjectId> = objects.iter().map(ObjectRef::id).collect();
        self.runtime
            .wait(&ids, num_objects, Duration::from_millis(timeout_ms))
            .await
    }

    /// Take a local reference to an object id received from elsewhere
    pub fn adopt<T>(&self, id: ObjectId) -> Result<ObjectRef<T>> {
        self.runtime.add_local_reference(&id)?;
        Ok(ObjectRef::owned(id, self.runtime.clone()))
    }

    /// Start building a task call; unknown names fail here
    pub fn task<R>(&self, function: &str) -> Result<TaskCall<'_, R>> {
        Ok(TaskCall {
            gateway: self,
            function: self.resolve(function, FunctionKind::Function)?,
            args: Arguments::default(),
            options: CallOptions::default(),
            _result: PhantomData,
        })
    }

    pub fn actor(&self, class: &str) -> Result<ActorCreation<'_>> {
        Ok(ActorCreation {
            gateway: self,
            class: self.resolve(class, FunctionKind::ActorClass)?,
            args: Arguments::default(),
            options: ActorCreationOptions::default(),
        })
    }

    pub fn method<R>(&self, actor: &ActorHandle, method: &str) -> Result<MethodCall<'_, R>> {
        Ok(MethodCall {
            gateway: self,
            method: self.resolve(method, FunctionKind::ActorMethod)?,
            actor: actor.id,
            args: Arguments::default(),
            options: CallOptions::default(),
            _result: PhantomData,
        })
    }

    pub async fn get_actor_id(&self, global: bool, name: &str) -> Result<ActorId> {
        self.runtime.get_actor_id(global, name).await
    }

    pub async fn kill_actor(&self, actor: &ActorHandle, no_restart: bool) -> Result<()> {
        self.runtime.kill_actor(&actor.id, no_restart).await
    }

    pub async fn actor_state(&self, actor: &ActorHandle) -> Result<ActorState> {
        self.runtime.actor_state(&actor.id).await
    }

    /// Only valid inside an actor method
    pub fn exit_actor(&self) -> Result<()> {
        self.runtime.exit_actor()
    }

    /// Only valid inside an actor method
    pub fn was_current_actor_restarted(&self) -> Result<bool> {
        self.runtime.was_current_actor_restarted()
    }

    pub async fn create_placement_group(
        &self,
        options: PlacementGroupCreationOptions,
    ) -> Result<PlacementGroup> {
        self.runtime.create_placement_group(options).await
    }

    pub async fn remove_placement_group(&self, id: &PlacementGroupId) -> Result<()> {
        self.runtime.remove_placement_group(id).await
    }

    /// `Ok(false)` if the group is not ready within `timeout_seconds`
    pub async fn wait_placement_group_ready(
        &self,
        id: &PlacementGroupId,
        timeout_seconds: u64,
    ) -> Result<bool> {
        self.runtime
            .wait_placement_group_ready(id, Duration::from_secs(timeout_seconds))
            .await
    }

    pub async fn placement_group_state(&self, id: &PlacementGroupId) -> Result<PlacementGroupState> {
        self.runtime.placement_group_state(id).await
    }

    pub async fn list_placement_groups(&self) -> Result<Vec<(PlacementGroup, PlacementGroupState)>> {
        self.runtime.list_placement_groups().await
    }

    /// Lifecycle events of one channel, for a single entity or all of them
    pub fn subscribe(&self, channel: Channel, key: Option<&str>) -> Result<Subscription> {
        self.runtime.ensure_open()?;
        self.runtime.events().subscribe(channel, key)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.runtime.metrics()
    }

    pub fn local_reference_count<T>(&self, object: &ObjectRef<T>) -> u64 {
        self.runtime.local_reference_count(&object.id)
    }

    /// Kill owned actors, release held references and close the gateway
    pub async fn shutdown(&self) {
        self.runtime.shutdown().await;
        info!("Gateway shut down");
    }

    pub fn is_initialized(&self) -> bool {
        !self.runtime.is_shutdown()
    }
}
