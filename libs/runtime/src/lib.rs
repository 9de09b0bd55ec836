//! # Runtime Gateway
//!
//! Client-side contract for a distributed execution substrate: store
//! objects, run registered functions as tasks, drive stateful actors and
//! reserve placement groups, all through one [`Gateway`].
//!
//! ## Architecture
//!
//! ```text
//! Gateway (typed facade, ObjectRef RAII)
//!    │
//!    ▼
//! dyn Runtime ──► LocalModeRuntime ─┬─ ReferenceTable
//!             │                     ├─ ObjectStore
//!             │                     ├─ TaskDispatcher
//!             │                     ├─ ActorManager
//!             │                     └─ PlacementGroupManager
//!             └─► ClusterModeRuntime ─► dyn ClusterClient
//! ```
//!
//! Submissions (`call`, `create_actor`, `call_actor`) return at once.
//! Failures of work that was accepted travel with its result object and
//! surface from `get`; everything rejected up front is a submission error.

pub mod actors;
pub mod cluster;
mod dispatcher;
pub mod error;
pub mod gateway;
pub mod local;
pub mod logging;
pub mod metrics;
pub mod names;
pub mod placement;
pub mod pubsub;
pub mod references;
pub mod registry;
pub mod runtime;
pub mod store;

pub use actors::context::current as current_actor;
pub use actors::ActorContext;
pub use cluster::{ActorSpec, ActorTaskSpec, ClusterClient, ClusterModeRuntime, TaskSpec};
pub use error::{FailureCause, GatewayError, Result, TaskFailure};
pub use gateway::{ActorCreation, Gateway, GatewayBuilder, MethodCall, ObjectRef, TaskCall};
pub use local::LocalModeRuntime;
pub use logging::init_tracing;
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use pubsub::{EventPublisher, Subscription};
pub use references::{ReferenceTable, Release};
pub use registry::{ActorInstance, FunctionKind, FunctionRegistry, RemoteFunctionHandle};
pub use runtime::Runtime;
pub use store::ObjectState;
