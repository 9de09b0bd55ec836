//! Local Object Store
//!
//! In-memory backing for local mode. Each object is a `watch` channel
//! carrying its settlement state, so `get` and `wait` park on the channel
//! instead of polling. Objects pinned by in-flight tasks survive the
//! release of their last local reference until the pin is dropped.

use crate::error::{GatewayError, Result, TaskFailure};
use crate::metrics::GatewayMetrics;
use crate::pubsub::EventPublisher;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use gateway_types::{Bytes, LifecycleEvent, ObjectId, ObjectStatus};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Settlement state of one object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectState {
    /// Producer still running
    Pending,
    Ready(Bytes),
    Failed(TaskFailure),
    /// Data dropped while references remained
    Lost,
}

impl ObjectState {
    /// Ready, failed and lost objects all count as settled for `wait`
    pub fn is_settled(&self) -> bool {
        !matches!(self, ObjectState::Pending)
    }

    fn size(&self) -> u64 {
        match self {
            ObjectState::Ready(data) => data.len() as u64,
            _ => 0,
        }
    }
}

#[derive(Debug)]
struct ObjectEntry {
    state: watch::Sender<ObjectState>,
    /// In-flight tasks reading this object as an argument
    pins: u32,
    /// Last local reference gone; delete once unpinned
    released: bool,
}

#[derive(Debug)]
pub struct ObjectStore {
    objects: DashMap<ObjectId, ObjectEntry>,
    capacity: Option<u64>,
    used: AtomicU64,
    events: Arc<EventPublisher>,
    metrics: Arc<GatewayMetrics>,
}

impl ObjectStore {
    pub fn new(
        capacity: Option<u64>,
        events: Arc<EventPublisher>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            objects: DashMap::new(),
            capacity,
            used: AtomicU64::new(0),
            events,
            metrics,
        }
    }

    fn reserve(&self, bytes: u64) -> Result<()> {
        let Some(capacity) = self.capacity else {
            self.used.fetch_add(bytes, Ordering::AcqRel);
            return Ok(());
        };
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= capacity)
            })
            .map(|_| ())
            .map_err(|used| GatewayError::ObjectStoreFull {
                requested: bytes,
                available: capacity.saturating_sub(used),
            })
    }

    fn unreserve(&self, bytes: u64) {
        if bytes > 0 {
            let _ = self
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    Some(used.saturating_sub(bytes))
                });
        }
    }

    fn publish(&self, id: ObjectId, status: ObjectStatus) {
        self.events.publish(LifecycleEvent::Object { id, status });
    }

    /// Store an already available value under a fresh id
    pub fn put(&self, data: Bytes) -> Result<ObjectId> {
        self.reserve(data.len() as u64)?;
        let id = ObjectId::new();
        let (state, _) = watch::channel(ObjectState::Ready(data));
        self.objects.insert(
            id,
            ObjectEntry {
                state,
                pins: 0,
                released: false,
            },
        );
        self.metrics.record_put();
        self.publish(id, ObjectStatus::Ready);
        Ok(id)
    }

    /// Placeholder for the result of a call that has not finished yet
    pub fn create_pending(&self) -> ObjectId {
        let id = ObjectId::new();
        let (state, _) = watch::channel(ObjectState::Pending);
        self.objects.insert(
            id,
            ObjectEntry {
                state,
                pins: 0,
                released: false,
            },
        );
        id
    }

    /// Settle a pending object with its producer's outcome
    ///
    /// A value that does not fit the store budget settles as a failure.
    pub fn complete(&self, id: &ObjectId, outcome: std::result::Result<Bytes, TaskFailure>) {
        let next = match outcome {
            Ok(data) => match self.reserve(data.len() as u64) {
                Ok(()) => ObjectState::Ready(data),
                Err(e) => ObjectState::Failed(TaskFailure::raised(e.to_string())),
            },
            Err(failure) => ObjectState::Failed(failure),
        };
        let status = match &next {
            ObjectState::Ready(_) => ObjectStatus::Ready,
            _ => ObjectStatus::Failed,
        };
        let size = next.size();

        match self.objects.get(id) {
            Some(entry) if !entry.state.borrow().is_settled() => {
                entry.state.send_replace(next);
            }
            _ => {
                // Released (or already settled) before the producer finished
                self.unreserve(size);
                debug!(object = %id, "Dropping result of released object");
                return;
            }
        }
        self.publish(*id, status);
    }

    /// Read an object, waiting until it settles
    pub async fn get(&self, id: &ObjectId) -> Result<Bytes> {
        let mut receiver = self.subscribe(id)?;
        let state = receiver
            .wait_for(ObjectState::is_settled)
            .await
            .map(|state| state.clone())
            .map_err(|_| GatewayError::ObjectNotFound { id: *id })?;
        Self::into_result(id, state)
    }

    fn into_result(id: &ObjectId, state: ObjectState) -> Result<Bytes> {
        match state {
            ObjectState::Ready(data) => Ok(data),
            ObjectState::Failed(failure) => Err(GatewayError::remote(*id, failure)),
            ObjectState::Lost => Err(GatewayError::ObjectLost { id: *id }),
            ObjectState::Pending => Err(GatewayError::ObjectNotFound { id: *id }),
        }
    }

    fn subscribe(&self, id: &ObjectId) -> Result<watch::Receiver<ObjectState>> {
        self.objects
            .get(id)
            .map(|entry| entry.state.subscribe())
            .ok_or(GatewayError::ObjectNotFound { id: *id })
    }

    /// Block until `num_objects` of `ids` are settled or `timeout` passes
    ///
    /// Flags are a snapshot taken at return time. Timing out is not an error.
    pub async fn wait(
        &self,
        ids: &[ObjectId],
        num_objects: usize,
        timeout: Duration,
    ) -> Result<Vec<bool>> {
        if num_objects == 0 || num_objects > ids.len() {
            return Err(GatewayError::invalid_argument(format!(
                "num_objects must be between 1 and {}, got {}",
                ids.len(),
                num_objects
            )));
        }
        let mut distinct = HashSet::with_capacity(ids.len());
        if !ids.iter().all(|id| distinct.insert(*id)) {
            return Err(GatewayError::invalid_argument("wait received duplicate object ids"));
        }

        let mut receivers = Vec::with_capacity(ids.len());
        for id in ids {
            receivers.push(self.subscribe(id)?);
        }

        let mut settled = 0;
        let mut waiting = FuturesUnordered::new();
        for mut rx in receivers {
            if rx.borrow_and_update().is_settled() {
                settled += 1;
            } else {
                waiting.push(async move {
                    let _ = rx.wait_for(ObjectState::is_settled).await;
                });
            }
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        while settled < num_objects {
            tokio::select! {
                Some(()) = waiting.next() => settled += 1,
                _ = &mut deadline => break,
                else => break,
            }
        }

        Ok(ids.iter().map(|id| self.is_settled(id)).collect())
    }

    /// True when the object exists and is no longer pending
    pub fn is_settled(&self, id: &ObjectId) -> bool {
        self.objects
            .get(id)
            .map(|entry| entry.state.borrow().is_settled())
            .unwrap_or(false)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Present and not yet given up by its last local holder
    pub fn is_held(&self, id: &ObjectId) -> bool {
        self.objects
            .get(id)
            .map(|entry| !entry.released)
            .unwrap_or(false)
    }

    pub fn state(&self, id: &ObjectId) -> Option<ObjectState> {
        self.objects.get(id).map(|entry| entry.state.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Keep an argument alive for an in-flight task
    pub fn pin(&self, id: &ObjectId) -> bool {
        match self.objects.get_mut(id) {
            Some(mut entry) => {
                entry.pins += 1;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&self, id: &ObjectId) {
        let delete = match self.objects.get_mut(id) {
            Some(mut entry) => {
                entry.pins = entry.pins.saturating_sub(1);
                entry.pins == 0 && entry.released
            }
            None => false,
        };
        if delete {
            self.delete(id);
        }
    }

    /// The last local reference went away
    pub fn release(&self, id: &ObjectId) {
        let delete = match self.objects.get_mut(id) {
            Some(mut entry) => {
                entry.released = true;
                entry.pins == 0
            }
            None => false,
        };
        if delete {
            self.delete(id);
        }
    }

    fn delete(&self, id: &ObjectId) {
        if let Some((_, entry)) = self.objects.remove(id) {
            self.unreserve(entry.state.borrow().size());
            self.metrics.record_release();
            self.publish(*id, ObjectStatus::Released);
        }
    }

    /// Drop an object's data while keeping its id known
    ///
    /// Later reads fail with `ObjectLost`; nothing reconstructs it.
    pub fn evict(&self, id: &ObjectId) -> Result<()> {
        let freed = {
            let entry = self
                .objects
                .get(id)
                .ok_or(GatewayError::ObjectNotFound { id: *id })?;
            let previous = entry.state.send_replace(ObjectState::Lost);
            previous.size()
        };
        self.unreserve(freed);
        self.metrics.record_eviction();
        warn!(object = %id, bytes = freed, "Object evicted");
        self.publish(*id, ObjectStatus::Lost);
        Ok(())
    }

    /// Drop everything at shutdown; pending readers see `ObjectNotFound`
    pub fn clear(&self) {
        self.objects.clear();
        self.used.store(0, Ordering::Release);
    }
}
