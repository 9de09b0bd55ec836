//! Named actor directory
//!
//! Global names are unique per namespace; local names are unique within
//! one gateway. A name is held from creation until the actor terminates.

use crate::error::{GatewayError, Result};
use gateway_types::{ActorHandle, ActorId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct NameDirectory {
    global: Mutex<HashMap<(String, String), ActorId>>,
    local: Mutex<HashMap<String, ActorId>>,
}

impl NameDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the handle's name, if it has one
    pub fn claim(&self, handle: &ActorHandle, namespace: &str) -> Result<()> {
        let Some(name) = &handle.name else {
            return Ok(());
        };
        let collision = || GatewayError::ActorNameCollision {
            name: name.clone(),
            namespace: namespace.to_string(),
        };

        if handle.global {
            let mut global = self.global.lock();
            let key = (namespace.to_string(), name.clone());
            if global.contains_key(&key) {
                return Err(collision());
            }
            global.insert(key, handle.id);
        } else {
            let mut local = self.local.lock();
            if local.contains_key(name) {
                return Err(collision());
            }
            local.insert(name.clone(), handle.id);
        }
        Ok(())
    }

    /// Free the handle's name if it still maps to this actor
    pub fn release(&self, handle: &ActorHandle, namespace: &str) {
        let Some(name) = &handle.name else {
            return;
        };
        if handle.global {
            let mut global = self.global.lock();
            let key = (namespace.to_string(), name.clone());
            if global.get(&key) == Some(&handle.id) {
                global.remove(&key);
            }
        } else {
            let mut local = self.local.lock();
            if local.get(name) == Some(&handle.id) {
                local.remove(name);
            }
        }
    }

    pub fn lookup(&self, global: bool, namespace: &str, name: &str) -> Option<ActorId> {
        if global {
            self.global
                .lock()
                .get(&(namespace.to_string(), name.to_string()))
                .copied()
        } else {
            self.local.lock().get(name).copied()
        }
    }
}
