//! Handles returned by actor and placement group creation

use crate::ids::{ActorId, PlacementGroupId};
use crate::options::{PlacementStrategy, Resources};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Addressable reference to a live actor
///
/// Handles are plain data: they can be cloned, serialized and passed to
/// other calls. Whether the actor behind one is still alive is only known
/// by the runtime that created it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorHandle {
    pub id: ActorId,
    pub name: Option<String>,
    /// Name registered cluster-wide (namespace scoped) rather than per gateway
    pub global: bool,
}

impl ActorHandle {
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            name: None,
            global: false,
        }
    }

    pub fn named(id: ActorId, name: impl Into<String>, global: bool) -> Self {
        Self {
            id,
            name: Some(name.into()),
            global,
        }
    }
}

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A created placement group; its state is queried separately
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementGroup {
    pub id: PlacementGroupId,
    pub name: Option<String>,
    pub bundles: Vec<Resources>,
    pub strategy: PlacementStrategy,
}

impl PlacementGroup {
    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }
}
