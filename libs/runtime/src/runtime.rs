//! Runtime capability set
//!
//! [`Runtime`] carries every gateway operation over raw identifiers and
//! opaque payloads. Two variants implement it: [`crate::LocalModeRuntime`]
//! runs everything in-process, [`crate::ClusterModeRuntime`] forwards
//! storage and execution to a [`crate::ClusterClient`]. Which one backs a
//! gateway is decided once, from configuration.

use crate::actors::context;
use crate::error::{GatewayError, Result};
use crate::metrics::MetricsSnapshot;
use crate::pubsub::EventPublisher;
use crate::registry::{FunctionRegistry, RemoteFunctionHandle};
use async_trait::async_trait;
use futures::future::try_join_all;
use gateway_config::RuntimeMode;
use gateway_types::{
    ActorCreationOptions, ActorHandle, ActorId, ActorState, Bytes, CallOptions, ObjectId,
    PlacementGroup, PlacementGroupCreationOptions, PlacementGroupId, PlacementGroupState, TaskArg,
};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Runtime: Send + Sync {
    fn mode(&self) -> RuntimeMode;

    /// Callables this runtime resolves names against
    fn registry(&self) -> &Arc<FunctionRegistry>;

    /// Store a value; the caller holds the single local reference
    async fn put(&self, data: Bytes) -> Result<ObjectId>;

    /// Wait for an object's value
    async fn get(&self, id: &ObjectId) -> Result<Bytes>;

    /// Values in input order; the first failure fails the whole batch
    async fn get_many(&self, ids: &[ObjectId]) -> Result<Vec<Bytes>> {
        try_join_all(ids.iter().map(|id| self.get(id))).await
    }

    /// Ready flag per id once `num_objects` settled or `timeout` elapsed
    async fn wait(
        &self,
        ids: &[ObjectId],
        num_objects: usize,
        timeout: Duration,
    ) -> Result<Vec<bool>>;

    fn add_local_reference(&self, id: &ObjectId) -> Result<u64>;

    fn remove_local_reference(&self, id: &ObjectId) -> Result<()>;

    fn local_reference_count(&self, id: &ObjectId) -> u64;

    /// Submit a task; the result reference comes back before it runs
    async fn call(
        &self,
        function: &RemoteFunctionHandle,
        args: Vec<TaskArg>,
        options: &CallOptions,
    ) -> Result<ObjectId>;

    async fn create_actor(
        &self,
        class: &RemoteFunctionHandle,
        args: Vec<TaskArg>,
        options: ActorCreationOptions,
    ) -> Result<ActorHandle>;

    async fn call_actor(
        &self,
        method: &RemoteFunctionHandle,
        actor: &ActorId,
        args: Vec<TaskArg>,
        options: &CallOptions,
    ) -> Result<ObjectId>;

    async fn get_actor_id(&self, global: bool, name: &str) -> Result<ActorId>;

    async fn kill_actor(&self, actor: &ActorId, no_restart: bool) -> Result<()>;

    async fn actor_state(&self, actor: &ActorId) -> Result<ActorState>;

    /// End the actor executing the current method once it returns
    fn exit_actor(&self) -> Result<()> {
        self.ensure_open()?;
        let ctx = context::current().ok_or(GatewayError::OutsideActorContext {
            operation: "exit_actor",
        })?;
        ctx.request_exit();
        Ok(())
    }

    /// Whether the actor executing the current method was restarted
    fn was_current_actor_restarted(&self) -> Result<bool> {
        self.ensure_open()?;
        context::current()
            .map(|ctx| ctx.was_restarted())
            .ok_or(GatewayError::OutsideActorContext {
                operation: "was_current_actor_restarted",
            })
    }

    async fn create_placement_group(
        &self,
        options: PlacementGroupCreationOptions,
    ) -> Result<PlacementGroup>;

    async fn remove_placement_group(&self, id: &PlacementGroupId) -> Result<()>;

    /// `Ok(false)` when the group is still pending at the deadline
    async fn wait_placement_group_ready(
        &self,
        id: &PlacementGroupId,
        timeout: Duration,
    ) -> Result<bool>;

    async fn placement_group_state(&self, id: &PlacementGroupId) -> Result<PlacementGroupState>;

    async fn list_placement_groups(&self) -> Result<Vec<(PlacementGroup, PlacementGroupState)>>;

    fn events(&self) -> &Arc<EventPublisher>;

    fn metrics(&self) -> MetricsSnapshot;

    /// Kill owned actors and release every outstanding local reference
    async fn shutdown(&self);

    fn is_shutdown(&self) -> bool;

    fn ensure_open(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(GatewayError::RuntimeShutdown);
        }
        Ok(())
    }
}
