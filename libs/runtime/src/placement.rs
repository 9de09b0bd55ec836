//! Placement Group Manager
//!
//! Gang reservation of resource bundles against the local node's pool.
//! A group is reserved all-or-nothing: it stays `Pending` until every
//! bundle fits, then becomes `Ready`. Pending groups are retried in
//! creation order whenever resources come back.

use crate::error::{FailureCause, GatewayError, Result, TaskFailure};
use crate::metrics::GatewayMetrics;
use crate::pubsub::EventPublisher;
use gateway_types::{
    LifecycleEvent, PlacementGroup, PlacementGroupCreationOptions, PlacementGroupId,
    PlacementGroupState, PlacementStrategy, Resources,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const EPSILON: f64 = 1e-9;

struct GroupRecord {
    group: PlacementGroup,
    state: watch::Sender<PlacementGroupState>,
    sequence: u64,
}

struct PlacementInner {
    groups: HashMap<PlacementGroupId, GroupRecord>,
    /// Pending groups keyed by creation sequence
    pending: BTreeMap<u64, PlacementGroupId>,
    available: Resources,
    next_sequence: u64,
}

/// A call's claim on a placement group, checked at submission
#[derive(Debug, Clone)]
pub struct GroupBinding {
    group_id: PlacementGroupId,
    state: watch::Receiver<PlacementGroupState>,
}

impl GroupBinding {
    pub fn group_id(&self) -> PlacementGroupId {
        self.group_id
    }

    /// Wait until the group is reserved; fails if it is removed first
    pub async fn ready(mut self) -> std::result::Result<(), TaskFailure> {
        let removed = || {
            TaskFailure::new(
                FailureCause::PlacementGroupRemoved,
                format!("placement group {} was removed", self.group_id),
            )
        };
        let settled = self
            .state
            .wait_for(|s| *s != PlacementGroupState::Pending)
            .await
            .map(|s| *s);
        match settled {
            Ok(PlacementGroupState::Ready) => Ok(()),
            _ => Err(removed()),
        }
    }
}

pub struct PlacementGroupManager {
    inner: Mutex<PlacementInner>,
    total: Resources,
    events: Arc<EventPublisher>,
    metrics: Arc<GatewayMetrics>,
}

impl PlacementGroupManager {
    pub fn new(
        node_resources: Resources,
        events: Arc<EventPublisher>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            inner: Mutex::new(PlacementInner {
                groups: HashMap::new(),
                pending: BTreeMap::new(),
                available: node_resources.clone(),
                next_sequence: 0,
            }),
            total: node_resources,
            events,
            metrics,
        }
    }

    fn publish(&self, id: PlacementGroupId, state: PlacementGroupState) {
        self.events
            .publish(LifecycleEvent::PlacementGroup { id, state });
    }

    /// Register a group and reserve it immediately if it fits
    pub fn create(&self, options: PlacementGroupCreationOptions) -> Result<PlacementGroup> {
        options.validate()?;

        let group = PlacementGroup {
            id: PlacementGroupId::new(),
            name: options.name.clone(),
            bundles: options.bundles.clone(),
            strategy: options.strategy,
        };
        if !Self::feasible_on_single_node(&group) {
            warn!(
                group = %group.id,
                bundles = group.bundle_count(),
                "STRICT_SPREAD needs one node per bundle; group stays pending"
            );
        } else if !fits(&self.total, &options.total_resources()) {
            warn!(group = %group.id, "Group exceeds node capacity; stays pending");
        }

        let mut ready = Vec::new();
        {
            let mut inner = self.inner.lock();
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            let (state, _) = watch::channel(PlacementGroupState::Pending);
            inner.groups.insert(
                group.id,
                GroupRecord {
                    group: group.clone(),
                    state,
                    sequence,
                },
            );
            inner.pending.insert(sequence, group.id);
            Self::schedule_pending(&mut inner, &mut ready);
        }

        self.metrics.record_placement_group(true);
        info!(group = %group.id, strategy = ?group.strategy, bundles = group.bundle_count(), "Placement group created");
        self.publish(group.id, PlacementGroupState::Pending);
        for id in ready {
            self.publish(id, PlacementGroupState::Ready);
        }
        Ok(group)
    }

    fn feasible_on_single_node(group: &PlacementGroup) -> bool {
        !(group.strategy == PlacementStrategy::StrictSpread && group.bundle_count() > 1)
    }

    /// Reserve every pending group that now fits, oldest first
    fn schedule_pending(inner: &mut PlacementInner, ready: &mut Vec<PlacementGroupId>) {
        let candidates: Vec<(u64, PlacementGroupId)> =
            inner.pending.iter().map(|(seq, id)| (*seq, *id)).collect();

        for (sequence, id) in candidates {
            let Some(record) = inner.groups.get(&id) else {
                inner.pending.remove(&sequence);
                continue;
            };
            if !Self::feasible_on_single_node(&record.group) {
                continue;
            }
            let request = total_of(&record.group.bundles);
            if !fits(&inner.available, &request) {
                continue;
            }

            for (name, quantity) in &request {
                if let Some(left) = inner.available.get_mut(name) {
                    *left -= quantity;
                }
            }
            record.state.send_replace(PlacementGroupState::Ready);
            inner.pending.remove(&sequence);
            debug!(group = %id, "Placement group reserved");
            ready.push(id);
        }
    }

    /// Remove a group, returning its reservation to the pool
    pub fn remove(&self, id: &PlacementGroupId) -> Result<()> {
        let mut ready = Vec::new();
        {
            let mut inner = self.inner.lock();
            let record = inner
                .groups
                .remove(id)
                .ok_or(GatewayError::PlacementGroupNotFound { group_id: *id })?;

            let was_ready = *record.state.borrow() == PlacementGroupState::Ready;
            if was_ready {
                for (name, quantity) in total_of(&record.group.bundles) {
                    *inner.available.entry(name).or_insert(0.0) += quantity;
                }
            } else {
                inner.pending.remove(&record.sequence);
            }
            record.state.send_replace(PlacementGroupState::Removed);

            if was_ready {
                Self::schedule_pending(&mut inner, &mut ready);
            }
        }

        self.metrics.record_placement_group(false);
        info!(group = %id, "Placement group removed");
        self.publish(*id, PlacementGroupState::Removed);
        for group in ready {
            self.publish(group, PlacementGroupState::Ready);
        }
        Ok(())
    }

    /// Wait for a group to become ready
    ///
    /// `Ok(false)` on timeout. A zero timeout reports the current state.
    pub async fn wait_ready(&self, id: &PlacementGroupId, timeout: Duration) -> Result<bool> {
        let mut state = self.watch(id)?;
        let settled = tokio::time::timeout(
            timeout,
            state.wait_for(|s| *s != PlacementGroupState::Pending),
        )
        .await;

        match settled {
            Err(_elapsed) => Ok(false),
            Ok(Ok(s)) if *s == PlacementGroupState::Ready => Ok(true),
            Ok(_) => Err(GatewayError::PlacementGroupNotFound { group_id: *id }),
        }
    }

    fn watch(&self, id: &PlacementGroupId) -> Result<watch::Receiver<PlacementGroupState>> {
        self.inner
            .lock()
            .groups
            .get(id)
            .map(|record| record.state.subscribe())
            .ok_or(GatewayError::PlacementGroupNotFound { group_id: *id })
    }

    /// Validate a call's group and bundle index, returning a handle to wait on
    pub fn bind(&self, id: &PlacementGroupId, bundle_index: Option<usize>) -> Result<GroupBinding> {
        let inner = self.inner.lock();
        let record = inner
            .groups
            .get(id)
            .ok_or(GatewayError::PlacementGroupNotFound { group_id: *id })?;
        if let Some(index) = bundle_index {
            if index >= record.group.bundle_count() {
                return Err(GatewayError::invalid_argument(format!(
                    "bundle index {} out of range for placement group {} with {} bundles",
                    index,
                    id,
                    record.group.bundle_count()
                )));
            }
        }
        Ok(GroupBinding {
            group_id: *id,
            state: record.state.subscribe(),
        })
    }

    pub fn state(&self, id: &PlacementGroupId) -> Result<PlacementGroupState> {
        self.inner
            .lock()
            .groups
            .get(id)
            .map(|record| *record.state.borrow())
            .ok_or(GatewayError::PlacementGroupNotFound { group_id: *id })
    }

    pub fn get(&self, id: &PlacementGroupId) -> Result<PlacementGroup> {
        self.inner
            .lock()
            .groups
            .get(id)
            .map(|record| record.group.clone())
            .ok_or(GatewayError::PlacementGroupNotFound { group_id: *id })
    }

    /// Live groups in creation order
    pub fn list(&self) -> Vec<(PlacementGroup, PlacementGroupState)> {
        let inner = self.inner.lock();
        let mut groups: Vec<&GroupRecord> = inner.groups.values().collect();
        groups.sort_by_key(|record| record.sequence);
        groups
            .into_iter()
            .map(|record| (record.group.clone(), *record.state.borrow()))
            .collect()
    }

    /// Unreserved resources on the node
    pub fn available(&self) -> Resources {
        self.inner.lock().available.clone()
    }

    /// Remove every group at shutdown
    pub fn clear(&self) {
        let ids: Vec<PlacementGroupId> = self.inner.lock().groups.keys().copied().collect();
        for id in ids {
            let _ = self.remove(&id);
        }
    }
}

fn total_of(bundles: &[Resources]) -> Resources {
    let mut total = Resources::new();
    for bundle in bundles {
        for (name, quantity) in bundle {
            *total.entry(name.clone()).or_insert(0.0) += quantity;
        }
    }
    total
}

fn fits(available: &Resources, request: &Resources) -> bool {
    request.iter().all(|(name, quantity)| {
        *quantity <= EPSILON || available.get(name).copied().unwrap_or(0.0) + EPSILON >= *quantity
    })
}
