//! # Runtime Gateway Types
//!
//! Shared vocabulary of the runtime gateway: the identifiers it hands out,
//! the options callers attach to submissions, task arguments, lifecycle
//! states and the payload codec.
//!
//! Nothing here talks to a store or a scheduler; the `runtime-gateway`
//! crate builds the behaviour on top of these types.
//!
//! ```rust
//! use gateway_types::{CallOptions, ObjectId, TaskArg};
//!
//! let by_value = TaskArg::value(&41i64).unwrap();
//! let by_ref = TaskArg::reference(ObjectId::new());
//! let options = CallOptions::new().with_resource("CPU", 1.0);
//! assert!(options.validate().is_ok());
//! assert!(!by_value.is_reference() && by_ref.is_reference());
//! ```

pub mod args;
pub mod codec;
pub mod errors;
pub mod handles;
pub mod ids;
pub mod options;
pub mod state;

pub use args::{referenced_objects, TaskArg};
pub use codec::{decode, encode, FromArgs};
pub use errors::{CodecError, ValidationError};
pub use handles::{ActorHandle, PlacementGroup};
pub use ids::{ActorId, ObjectId, PlacementGroupId, SubscriberId, TaskId};
pub use options::{
    validate_resources, ActorCreationOptions, CallOptions, PlacementGroupCreationOptions,
    PlacementStrategy, Resources,
};
pub use state::{ActorState, Channel, LifecycleEvent, ObjectStatus, PlacementGroupState};

/// Payload type moved between the gateway and its backends
pub use bytes::Bytes;
