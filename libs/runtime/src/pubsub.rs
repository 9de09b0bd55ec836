//! # Lifecycle Event Publisher
//!
//! ## Purpose
//! Fan-out of actor, placement group and object lifecycle changes to
//! in-process subscribers. Every state transition the runtimes perform is
//! published here; dashboards, tests and the cluster runtime's waiters
//! consume it.
//!
//! ## Subscription Modes
//!
//! Each channel has its own [`SubscriptionIndex`], which is in one of two
//! modes at a time:
//! - **All-keys**: every subscriber receives every event on the channel
//! - **Per-key**: subscribers receive only events whose key (the entity id)
//!   they registered
//!
//! The mode is channel-wide. An all-keys registration is rejected with
//! `InvalidArgument` while any per-key registration exists on the channel,
//! and vice versa. Once the last registration goes away the channel accepts
//! either mode again.
//!
//! ## Delivery
//!
//! - Events for a key nobody listens to are dropped and not counted
//! - Each delivered event increments the channel's cumulative publish count
//! - A subscriber whose receiver was dropped is erased on the next publish
//!   that targets it
//!
//! ```rust
//! use gateway_types::{Channel, LifecycleEvent, ObjectId, ObjectStatus};
//! use runtime_gateway::EventPublisher;
//!
//! let publisher = EventPublisher::new();
//! let mut subscription = publisher.subscribe(Channel::Object, None).unwrap();
//!
//! let id = ObjectId::new();
//! publisher.publish(LifecycleEvent::Object { id, status: ObjectStatus::Ready });
//!
//! assert!(subscription.try_recv().is_some());
//! assert_eq!(publisher.published_count(Channel::Object), 1);
//! ```

use crate::error::{GatewayError, Result};
use gateway_types::{Channel, LifecycleEvent, SubscriberId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Subscribers of one channel, by mode
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    all_keys: HashSet<SubscriberId>,
    by_key: HashMap<String, HashSet<SubscriberId>>,
    keys_of: HashMap<SubscriberId, HashSet<String>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for `key`, or for every key when `key` is None
    ///
    /// Returns false when the registration already existed.
    pub fn add_entry(&mut self, key: Option<&str>, subscriber: SubscriberId) -> Result<bool> {
        match key {
            None => {
                if !self.by_key.is_empty() {
                    return Err(GatewayError::invalid_argument(format!(
                        "cannot subscribe {} to every key: channel is in per-key mode",
                        subscriber
                    )));
                }
                Ok(self.all_keys.insert(subscriber))
            }
            Some(key) => {
                if !self.all_keys.is_empty() {
                    return Err(GatewayError::invalid_argument(format!(
                        "cannot subscribe {} to key {}: channel is in all-keys mode",
                        subscriber, key
                    )));
                }
                let added = self
                    .by_key
                    .entry(key.to_string())
                    .or_default()
                    .insert(subscriber);
                self.keys_of
                    .entry(subscriber)
                    .or_default()
                    .insert(key.to_string());
                Ok(added)
            }
        }
    }

    /// Subscribers that should see an event with `key`
    pub fn subscribers_of(&self, key: &str) -> Vec<SubscriberId> {
        let mut out: Vec<SubscriberId> = self.all_keys.iter().copied().collect();
        if let Some(keyed) = self.by_key.get(key) {
            out.extend(keyed.iter().copied());
        }
        out
    }

    /// Drop one key registration; returns whether it existed
    pub fn erase_entry(&mut self, key: &str, subscriber: &SubscriberId) -> bool {
        let Some(subscribers) = self.by_key.get_mut(key) else {
            return false;
        };
        if !subscribers.remove(subscriber) {
            return false;
        }
        if subscribers.is_empty() {
            self.by_key.remove(key);
        }
        if let Some(keys) = self.keys_of.get_mut(subscriber) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys_of.remove(subscriber);
            }
        }
        true
    }

    /// Remove every registration of `subscriber`; returns whether any existed
    pub fn erase_subscriber(&mut self, subscriber: &SubscriberId) -> bool {
        let mut erased = self.all_keys.remove(subscriber);
        if let Some(keys) = self.keys_of.remove(subscriber) {
            erased = true;
            for key in keys {
                if let Some(subscribers) = self.by_key.get_mut(&key) {
                    subscribers.remove(subscriber);
                    if subscribers.is_empty() {
                        self.by_key.remove(&key);
                    }
                }
            }
        }
        erased
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// True when both directions of the key index are empty
    pub fn check_no_leaks(&self) -> bool {
        self.all_keys.is_empty() && self.by_key.is_empty() && self.keys_of.is_empty()
    }
}

/// Receiving side of a subscription
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event; None once the publisher dropped this subscriber
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Default)]
struct PublisherInner {
    indexes: HashMap<Channel, SubscriptionIndex>,
    senders: HashMap<SubscriberId, mpsc::UnboundedSender<LifecycleEvent>>,
}

/// Process-wide lifecycle event hub
#[derive(Debug)]
pub struct EventPublisher {
    inner: Mutex<PublisherInner>,
    published: HashMap<Channel, AtomicU64>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher {
    pub fn new() -> Self {
        let mut indexes = HashMap::new();
        let mut published = HashMap::new();
        for channel in Channel::ALL {
            indexes.insert(channel, SubscriptionIndex::new());
            published.insert(channel, AtomicU64::new(0));
        }
        Self {
            inner: Mutex::new(PublisherInner {
                indexes,
                senders: HashMap::new(),
            }),
            published,
        }
    }

    /// New subscriber on `channel`, for one key or (None) all keys
    pub fn subscribe(&self, channel: Channel, key: Option<&str>) -> Result<Subscription> {
        let id = SubscriberId::new();
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock();
        inner
            .indexes
            .entry(channel)
            .or_default()
            .add_entry(key, id)?;
        inner.senders.insert(id, sender);
        debug!(subscriber = %id, ?channel, key, "Subscriber registered");

        Ok(Subscription { id, receiver })
    }

    /// Extend an existing subscriber with another channel/key registration
    pub fn add_subscription(
        &self,
        subscriber: &SubscriberId,
        channel: Channel,
        key: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.senders.contains_key(subscriber) {
            return Err(GatewayError::invalid_argument(format!(
                "unknown subscriber {}",
                subscriber
            )));
        }
        inner.indexes.entry(channel).or_default().add_entry(key, *subscriber)
    }

    /// Remove a subscriber everywhere; its receiver sees end of stream
    pub fn unsubscribe(&self, subscriber: &SubscriberId) -> bool {
        let mut inner = self.inner.lock();
        Self::erase(&mut inner, subscriber)
    }

    fn erase(inner: &mut PublisherInner, subscriber: &SubscriberId) -> bool {
        let mut erased = inner.senders.remove(subscriber).is_some();
        for index in inner.indexes.values_mut() {
            erased |= index.erase_subscriber(subscriber);
        }
        erased
    }

    /// Deliver an event; returns how many subscribers received it
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let channel = event.channel();
        let key = event.key();

        let mut inner = self.inner.lock();
        let targets = inner
            .indexes
            .get(&channel)
            .map(|index| index.subscribers_of(&key))
            .unwrap_or_default();
        if targets.is_empty() {
            trace!(?channel, %key, "No subscribers, event dropped");
            return 0;
        }

        let mut delivered = 0;
        let mut closed = Vec::new();
        for subscriber in targets {
            match inner.senders.get(&subscriber) {
                Some(sender) if sender.send(event.clone()).is_ok() => delivered += 1,
                _ => closed.push(subscriber),
            }
        }
        for subscriber in &closed {
            debug!(subscriber = %subscriber, "Dropping closed subscriber");
            Self::erase(&mut inner, subscriber);
        }

        if delivered > 0 {
            if let Some(counter) = self.published.get(&channel) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        delivered
    }

    /// Cumulative number of events delivered on `channel`
    pub fn published_count(&self, channel: Channel) -> u64 {
        self.published
            .get(&channel)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().senders.len()
    }

    pub fn check_no_leaks(&self) -> bool {
        let inner = self.inner.lock();
        inner.senders.is_empty() && inner.indexes.values().all(|i| i.check_no_leaks())
    }
}
