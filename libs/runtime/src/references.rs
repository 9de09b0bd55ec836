//! Process-local reference counting
//!
//! One table per gateway, mutated under a single lock. Counts only track
//! references held by this process; cluster-wide lifetime is the backend's
//! business and is informed through [`Release::Released`].

use crate::error::{GatewayError, Result};
use gateway_types::ObjectId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Outcome of dropping one local reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other local references remain
    Retained(u64),
    /// Count reached zero; the object may be reclaimed
    Released,
}

#[derive(Debug, Default)]
pub struct ReferenceTable {
    counts: Mutex<HashMap<ObjectId, u64>>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the handle handed out for a freshly created object
    pub fn register_owned(&self, id: ObjectId) {
        *self.counts.lock().entry(id).or_insert(0) += 1;
    }

    /// Count one more local holder, returning the new count
    ///
    /// An id never seen before starts at one: that is how a reference
    /// received from elsewhere (deserialized from an argument or a result)
    /// becomes locally held.
    pub fn add(&self, id: &ObjectId) -> u64 {
        let mut counts = self.counts.lock();
        let count = counts.entry(*id).or_insert(0);
        *count += 1;
        *count
    }

    /// Count one more holder if `exists` still vouches for the object
    ///
    /// `exists` runs under the table lock, so a concurrent final
    /// [`remove_with`](Self::remove_with) cannot reclaim the object between
    /// the check and the increment.
    pub fn add_if(&self, id: &ObjectId, exists: impl FnOnce(&ObjectId) -> bool) -> Option<u64> {
        let mut counts = self.counts.lock();
        if !counts.contains_key(id) && !exists(id) {
            return None;
        }
        let count = counts.entry(*id).or_insert(0);
        *count += 1;
        Some(*count)
    }

    /// Drop one local holder
    pub fn remove(&self, id: &ObjectId) -> Result<Release> {
        self.remove_with(id, |_| {})
    }

    /// Drop one local holder; `on_release` runs under the table lock when
    /// the count reaches zero
    pub fn remove_with(&self, id: &ObjectId, on_release: impl FnOnce(&ObjectId)) -> Result<Release> {
        let mut counts = self.counts.lock();
        match counts.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(Release::Retained(*count))
            }
            Some(_) => {
                counts.remove(id);
                on_release(id);
                Ok(Release::Released)
            }
            None => Err(GatewayError::ReferenceUnderflow { id: *id }),
        }
    }

    pub fn count(&self, id: &ObjectId) -> u64 {
        self.counts.lock().get(id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }

    /// Forget every reference at teardown, returning the ids that were held
    pub fn drain(&self) -> Vec<ObjectId> {
        self.counts.lock().drain().map(|(id, _)| id).collect()
    }
}
