//! Call, actor-creation and placement-group options
//!
//! Options are plain data: built once by the caller with the `with_*`
//! methods, validated at submission, and never mutated afterwards.

use crate::errors::ValidationError;
use crate::ids::PlacementGroupId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource name to requested quantity (e.g. `"CPU" -> 1.0`)
pub type Resources = HashMap<String, f64>;

/// Validate every quantity in a resource map
pub fn validate_resources(resources: &Resources) -> Result<(), ValidationError> {
    for (name, quantity) in resources {
        if name.trim().is_empty() {
            return Err(ValidationError::option("resources", "resource name cannot be empty"));
        }
        if !quantity.is_finite() || *quantity < 0.0 {
            return Err(ValidationError::InvalidResource {
                resource: name.clone(),
                quantity: *quantity,
            });
        }
    }
    Ok(())
}

fn validate_bundle_binding(
    placement_group: &Option<PlacementGroupId>,
    bundle_index: &Option<usize>,
) -> Result<(), ValidationError> {
    if bundle_index.is_some() && placement_group.is_none() {
        return Err(ValidationError::option(
            "bundle_index",
            "bundle index given without a placement group",
        ));
    }
    Ok(())
}

/// Options for a one-shot task submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Display name for logs; defaults to the function name
    pub name: Option<String>,
    pub resources: Resources,
    /// Run inside this placement group
    pub placement_group: Option<PlacementGroupId>,
    /// Specific bundle of the group; any bundle when absent
    pub bundle_index: Option<usize>,
    /// Re-executions after a worker crash; runtime default when absent
    pub max_retries: Option<u32>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.resources.insert(name.into(), quantity);
        self
    }

    pub fn with_placement_group(mut self, group: PlacementGroupId, bundle_index: Option<usize>) -> Self {
        self.placement_group = Some(group);
        self.bundle_index = bundle_index;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_resources(&self.resources)?;
        validate_bundle_binding(&self.placement_group, &self.bundle_index)
    }
}

/// Options for creating an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCreationOptions {
    pub name: Option<String>,
    /// Cluster-named (namespace scope) instead of process-local
    pub global: bool,
    pub resources: Resources,
    pub placement_group: Option<PlacementGroupId>,
    pub bundle_index: Option<usize>,
    /// Automatic restarts allowed; -1 means unlimited
    pub max_restarts: i32,
    /// Method calls executed at once; 1 keeps submission order
    pub max_concurrency: usize,
    /// Calls that may queue while the actor restarts; runtime default when absent
    pub max_pending_calls: Option<usize>,
}

impl Default for ActorCreationOptions {
    fn default() -> Self {
        Self {
            name: None,
            global: false,
            resources: Resources::new(),
            placement_group: None,
            bundle_index: None,
            max_restarts: 0,
            max_concurrency: 1,
            max_pending_calls: None,
        }
    }
}

impl ActorCreationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name visible only to the creating gateway
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.global = false;
        self
    }

    /// Name visible cluster-wide within the configured namespace
    pub fn with_global_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.global = true;
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.resources.insert(name.into(), quantity);
        self
    }

    pub fn with_placement_group(mut self, group: PlacementGroupId, bundle_index: Option<usize>) -> Self {
        self.placement_group = Some(group);
        self.bundle_index = bundle_index;
        self
    }

    pub fn with_max_restarts(mut self, restarts: i32) -> Self {
        self.max_restarts = restarts;
        self
    }

    pub fn with_max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency;
        self
    }

    pub fn with_max_pending_calls(mut self, calls: usize) -> Self {
        self.max_pending_calls = Some(calls);
        self
    }

    /// Whether another restart is allowed after `restarts_so_far`
    pub fn allows_restart(&self, restarts_so_far: u32) -> bool {
        self.max_restarts < 0 || restarts_so_far < self.max_restarts as u32
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_resources(&self.resources)?;
        validate_bundle_binding(&self.placement_group, &self.bundle_index)?;

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::option("name", "actor name cannot be blank"));
            }
        } else if self.global {
            return Err(ValidationError::option("global", "global actors need a name"));
        }
        if self.max_restarts < -1 {
            return Err(ValidationError::option(
                "max_restarts",
                format!("must be -1 (unlimited) or >= 0, got {}", self.max_restarts),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ValidationError::option("max_concurrency", "must be at least 1"));
        }
        Ok(())
    }
}

/// How bundles of a placement group are spread over nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementStrategy {
    /// Prefer one node, fall back to several
    #[default]
    Pack,
    /// Prefer distinct nodes, fall back to sharing
    Spread,
    /// All bundles on exactly one node
    StrictPack,
    /// Every bundle on a different node
    StrictSpread,
}

/// Options for reserving a placement group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementGroupCreationOptions {
    pub name: Option<String>,
    pub bundles: Vec<Resources>,
    pub strategy: PlacementStrategy,
}

impl PlacementGroupCreationOptions {
    pub fn new(bundles: Vec<Resources>, strategy: PlacementStrategy) -> Self {
        Self {
            name: None,
            bundles,
            strategy,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sum of every bundle's request, per resource
    pub fn total_resources(&self) -> Resources {
        let mut total = Resources::new();
        for bundle in &self.bundles {
            for (name, quantity) in bundle {
                *total.entry(name.clone()).or_insert(0.0) += quantity;
            }
        }
        total
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bundles.is_empty() {
            return Err(ValidationError::option("bundles", "placement group needs at least one bundle"));
        }
        for (index, bundle) in self.bundles.iter().enumerate() {
            if bundle.is_empty() {
                return Err(ValidationError::option(
                    "bundles",
                    format!("bundle {} requests no resources", index),
                ));
            }
            validate_resources(bundle)?;
        }
        Ok(())
    }
}
