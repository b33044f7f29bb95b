//! In-process topic bus.
//!
//! Maps topic name → ordered subscriber list. Dispatch is synchronous and
//! single-threaded: `publish` calls every current subscriber of the topic
//! in registration order before returning.
//!
//! Subscribers registered while a publish is in flight do not see that
//! publish. Subscribers removed while it is in flight are skipped if they
//! have not been reached yet.
//!
//! # Usage
//!
//! ```
//! use dashlink_sync::bus::TopicBus;
//!
//! let bus: TopicBus<u32> = TopicBus::new();
//! let sub = bus.subscribe_scoped("root", |v| println!("got {v}"));
//! assert_eq!(bus.publish("root", &7), 1);
//! drop(sub);
//! assert_eq!(bus.publish("root", &8), 0);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;

use dashlink_core::Descriptor;

use crate::dispatch::ElementEvent;
use crate::store::ComponentMessage;

/// Global topic for `showModal`.
pub const TOPIC_MODAL_OPEN: &str = "modal.open";
/// Global topic for `closeModal`.
pub const TOPIC_MODAL_CLOSE: &str = "modal.close";
/// Global topic for `write`.
pub const TOPIC_WRITE: &str = "write";
/// Dispatch topic for client events and unregister requests.
pub const TOPIC_ELEMENT_EVENT: &str = "element-event";

/// Everything that travels over the engine's bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// Routed to a component-id topic.
    Component(ComponentMessage),
    Modal(Descriptor),
    ModalClose,
    Write(Value),
    Element(ElementEvent),
}

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler<P> = Rc<dyn Fn(&P)>;

struct Subscriber<P> {
    token: SubscriptionToken,
    handler: Handler<P>,
}

/// Publish counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Deliveries made to subscribers.
    pub delivered: u64,
    /// Publishes that found no subscriber.
    pub dropped: u64,
}

struct BusInner<P> {
    topics: HashMap<String, Vec<Subscriber<P>>>,
    /// token → topic, for unsubscribe without the topic name.
    owners: HashMap<SubscriptionToken, String>,
    next_token: u64,
    stats: BusStats,
}

/// Shared handle to one bus. Clones refer to the same registry.
pub struct TopicBus<P> {
    inner: Rc<RefCell<BusInner<P>>>,
}

impl<P> Clone for TopicBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> Default for TopicBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for TopicBus<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TopicBus")
            .field("topics", &inner.topics.len())
            .field("subscriptions", &inner.owners.len())
            .field("stats", &inner.stats)
            .finish()
    }
}

impl<P> TopicBus<P> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                topics: HashMap::new(),
                owners: HashMap::new(),
                next_token: 1,
                stats: BusStats::default(),
            })),
        }
    }

    /// Register `handler` under `topic`. The registration lives until
    /// [`unsubscribe`](Self::unsubscribe) is called with the token.
    pub fn subscribe(&self, topic: &str, handler: impl Fn(&P) + 'static) -> SubscriptionToken {
        let mut inner = self.inner.borrow_mut();
        let token = SubscriptionToken(inner.next_token);
        inner.next_token += 1;
        inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                token,
                handler: Rc::new(handler),
            });
        inner.owners.insert(token, topic.to_string());
        token
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(topic) = inner.owners.remove(&token) else {
            return false;
        };
        if let Some(subscribers) = inner.topics.get_mut(&topic) {
            subscribers.retain(|s| s.token != token);
            if subscribers.is_empty() {
                inner.topics.remove(&topic);
            }
        }
        true
    }

    /// Register and return a guard that unsubscribes when dropped.
    pub fn subscribe_scoped(&self, topic: &str, handler: impl Fn(&P) + 'static) -> Subscription<P> {
        let token = self.subscribe(topic, handler);
        Subscription {
            bus: Rc::downgrade(&self.inner),
            token,
        }
    }

    /// Deliver `payload` to every current subscriber of `topic`.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, topic: &str, payload: &P) -> usize {
        // Snapshot so handlers can (un)subscribe without a borrow conflict.
        let snapshot: Vec<(SubscriptionToken, Handler<P>)> = {
            let inner = self.inner.borrow();
            match inner.topics.get(topic) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|s| (s.token, Rc::clone(&s.handler)))
                    .collect(),
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            self.inner.borrow_mut().stats.dropped += 1;
            log::trace!("No subscriber for topic {topic}; message dropped");
            return 0;
        }

        let mut delivered = 0;
        for (token, handler) in snapshot {
            if !self.inner.borrow().owners.contains_key(&token) {
                continue;
            }
            handler(payload);
            delivered += 1;
        }
        self.inner.borrow_mut().stats.delivered += delivered as u64;
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.borrow().topics.get(topic).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> BusStats {
        self.inner.borrow().stats
    }
}

/// RAII registration. Dropping it unsubscribes.
pub struct Subscription<P> {
    bus: Weak<RefCell<BusInner<P>>>,
    token: SubscriptionToken,
}

impl<P> std::fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("token", &self.token).finish()
    }
}

impl<P> Drop for Subscription<P> {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            TopicBus { inner }.unsubscribe(self.token);
        }
    }
}
