//! Gateway Error Types
//!
//! Submission failures (the call never reached a backend) and execution
//! failures (the call ran and failed remotely) are separate variants so
//! callers can tell "never scheduled" from "ran and failed". Execution
//! failures are never returned by a submission; they are attached to the
//! result object and surface from `get`.

use gateway_types::{ActorId, CodecError, ObjectId, PlacementGroupId, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a remote invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCause {
    /// The function or method returned an error
    TaskRaised,
    /// The worker executing the call crashed (panicked)
    WorkerCrashed,
    /// The node hosting the worker went away
    NodeDied,
    /// The actor was terminated before or while running the call
    ActorDied,
    /// The placement group the call was bound to was removed
    PlacementGroupRemoved,
    /// An argument object could not be resolved
    DependencyFailed,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCause::TaskRaised => "task raised",
            FailureCause::WorkerCrashed => "worker crashed",
            FailureCause::NodeDied => "node died",
            FailureCause::ActorDied => "actor died",
            FailureCause::PlacementGroupRemoved => "placement group removed",
            FailureCause::DependencyFailed => "dependency failed",
        };
        f.write_str(s)
    }
}

/// Failure attached to an object produced by a remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub cause: FailureCause,
    pub message: String,
}

impl TaskFailure {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }

    pub fn raised(message: impl Into<String>) -> Self {
        Self::new(FailureCause::TaskRaised, message)
    }

    pub fn worker_crashed(message: impl Into<String>) -> Self {
        Self::new(FailureCause::WorkerCrashed, message)
    }

    pub fn actor_died(message: impl Into<String>) -> Self {
        Self::new(FailureCause::ActorDied, message)
    }

    /// Failure of a call whose argument `dependency` could not be read
    pub fn dependency(dependency: &ObjectId, error: &GatewayError) -> Self {
        Self::new(
            FailureCause::DependencyFailed,
            format!("argument {} unavailable: {}", dependency, error),
        )
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cause, self.message)
    }
}

/// Main gateway error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Callable was never added to the function registry
    #[error("Function '{name}' is not registered")]
    UnregisteredFunction { name: String },

    /// Malformed argument list, options or identifiers
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Reference unknown or already released cluster-wide
    #[error("Object {id} not found")]
    ObjectNotFound { id: ObjectId },

    /// Backing data evicted or lost and not reconstructable
    #[error("Object {id} was lost and cannot be reconstructed")]
    ObjectLost { id: ObjectId },

    /// The producing call ran and failed
    #[error("Remote call producing {object_id} failed: {failure}")]
    RemoteTask {
        object_id: ObjectId,
        failure: TaskFailure,
    },

    /// Handle stale, name unknown, or actor terminated
    #[error("Actor {actor} not found")]
    ActorNotFound { actor: String },

    /// Actor exists but its mailbox cannot be reached
    #[error("Actor {actor_id} unreachable: {reason}")]
    ActorUnreachable { actor_id: ActorId, reason: String },

    /// Actor mid-restart with a full pending-call queue
    #[error("Actor {actor_id} is restarting and {pending_calls} calls are already queued")]
    ActorRestarting { actor_id: ActorId, pending_calls: usize },

    #[error("Actor name '{name}' already taken in namespace '{namespace}'")]
    ActorNameCollision { name: String, namespace: String },

    #[error("Placement group {group_id} not found")]
    PlacementGroupNotFound { group_id: PlacementGroupId },

    /// Operation issued after the gateway was torn down
    #[error("Runtime gateway has been shut down")]
    RuntimeShutdown,

    /// Actor-only operation issued outside an executing actor
    #[error("{operation} can only be called from inside an actor")]
    OutsideActorContext { operation: &'static str },

    /// More removals than additions for one identifier
    #[error("Local reference count of {id} would drop below zero")]
    ReferenceUnderflow { id: ObjectId },

    #[error("Object store full: {requested} bytes requested, {available} available")]
    ObjectStoreFull { requested: u64, available: u64 },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Cluster client failed to accept a request
    #[error("Backend error: {message}")]
    Backend { message: String },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn unregistered(name: impl Into<String>) -> Self {
        Self::UnregisteredFunction { name: name.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn actor_not_found(actor: impl fmt::Display) -> Self {
        Self::ActorNotFound {
            actor: actor.to_string(),
        }
    }

    pub fn remote(object_id: ObjectId, failure: TaskFailure) -> Self {
        Self::RemoteTask { object_id, failure }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// The call ran remotely and failed (as opposed to never being scheduled)
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, GatewayError::RemoteTask { .. })
    }

    /// Rejected before anything was dispatched
    pub fn is_submission_error(&self) -> bool {
        matches!(
            self,
            GatewayError::UnregisteredFunction { .. }
                | GatewayError::InvalidArgument { .. }
                | GatewayError::ActorNotFound { .. }
                | GatewayError::ActorUnreachable { .. }
                | GatewayError::ActorRestarting { .. }
                | GatewayError::ActorNameCollision { .. }
                | GatewayError::PlacementGroupNotFound { .. }
                | GatewayError::ObjectStoreFull { .. }
                | GatewayError::RuntimeShutdown
                | GatewayError::Codec(_)
                | GatewayError::Backend { .. }
        )
    }

    /// Get error category for structured logs
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::UnregisteredFunction { .. } => "unregistered_function",
            GatewayError::InvalidArgument { .. } => "invalid_argument",
            GatewayError::ObjectNotFound { .. } => "object_not_found",
            GatewayError::ObjectLost { .. } => "object_lost",
            GatewayError::RemoteTask { .. } => "remote_task",
            GatewayError::ActorNotFound { .. } => "actor_not_found",
            GatewayError::ActorUnreachable { .. } => "actor_unreachable",
            GatewayError::ActorRestarting { .. } => "actor_restarting",
            GatewayError::ActorNameCollision { .. } => "actor_name_collision",
            GatewayError::PlacementGroupNotFound { .. } => "placement_group_not_found",
            GatewayError::RuntimeShutdown => "runtime_shutdown",
            GatewayError::OutsideActorContext { .. } => "outside_actor_context",
            GatewayError::ReferenceUnderflow { .. } => "reference_underflow",
            GatewayError::ObjectStoreFull { .. } => "object_store_full",
            GatewayError::Codec(_) => "codec",
            GatewayError::Configuration { .. } => "configuration",
            GatewayError::Backend { .. } => "backend",
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(error: ValidationError) -> Self {
        GatewayError::invalid_argument(error.to_string())
    }
}
