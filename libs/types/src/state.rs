//! Lifecycle states and the events published when they change

use crate::ids::{ActorId, ObjectId, PlacementGroupId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor lifecycle: `Pending -> Running -> {Restarting -> Running}* -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorState {
    /// Created, constructor not finished yet
    Pending,
    Running,
    /// Constructor re-running after a kill or crash
    Restarting,
    /// Absorbing; the handle is dead
    Terminated,
}

impl ActorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActorState::Terminated)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: ActorState) -> bool {
        use ActorState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Restarting)
                | (Pending, Terminated)
                | (Running, Restarting)
                | (Running, Terminated)
                | (Restarting, Running)
                | (Restarting, Terminated)
        )
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorState::Pending => "PENDING",
            ActorState::Running => "RUNNING",
            ActorState::Restarting => "RESTARTING",
            ActorState::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

/// Placement group lifecycle: `Pending -> Ready -> Removed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementGroupState {
    Pending,
    Ready,
    Removed,
}

impl fmt::Display for PlacementGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlacementGroupState::Pending => "PENDING",
            PlacementGroupState::Ready => "READY",
            PlacementGroupState::Removed => "REMOVED",
        };
        f.write_str(s)
    }
}

/// What happened to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectStatus {
    /// Value stored and readable
    Ready,
    /// Producing task failed; the error is attached to the object
    Failed,
    /// Data dropped while references remained
    Lost,
    /// Last local reference released
    Released,
}

/// Event channels of the lifecycle publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Actor,
    PlacementGroup,
    Object,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Actor, Channel::PlacementGroup, Channel::Object];
}

/// A lifecycle change, keyed by the entity it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Actor {
        id: ActorId,
        name: Option<String>,
        state: ActorState,
        num_restarts: u32,
    },
    PlacementGroup {
        id: PlacementGroupId,
        state: PlacementGroupState,
    },
    Object {
        id: ObjectId,
        status: ObjectStatus,
    },
}

impl LifecycleEvent {
    pub fn channel(&self) -> Channel {
        match self {
            LifecycleEvent::Actor { .. } => Channel::Actor,
            LifecycleEvent::PlacementGroup { .. } => Channel::PlacementGroup,
            LifecycleEvent::Object { .. } => Channel::Object,
        }
    }

    /// Subscription key: the display form of the entity id
    pub fn key(&self) -> String {
        match self {
            LifecycleEvent::Actor { id, .. } => id.to_string(),
            LifecycleEvent::PlacementGroup { id, .. } => id.to_string(),
            LifecycleEvent::Object { id, .. } => id.to_string(),
        }
    }
}
