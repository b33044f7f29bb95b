//! Outbound event dispatcher.
//!
//! User-originated actions are published as [`ElementEvent`] records on
//! [`TOPIC_ELEMENT_EVENT`]. A single forwarder subscribed to that topic turns
//! them into queued [`Outbound`] calls, which the engine drains onto the
//! hub and the HTTP collaborator.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;

use crate::bus::{BusMessage, Subscription, TopicBus, TOPIC_ELEMENT_EVENT};
use crate::protocol::HubInvocation;

/// Record published on the element-event topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    ClientEvent {
        event_id: String,
        event_name: String,
        event_data: Value,
    },
    UnregisterEvent {
        event_id: String,
    },
}

/// A call waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Hub invocation. `clientEvent` gets the session location attached
    /// when it is sent.
    Invoke(HubInvocation),
    /// `getState` reply for the state round-trip endpoint.
    SendState { request_id: String, state: Value },
    /// Per-component action call.
    Post {
        id: String,
        data: Value,
        headers: Vec<(String, String)>,
    },
}

/// FIFO of pending outbound calls, shared between the bus handlers and
/// the engine.
pub type Outbox = Rc<RefCell<VecDeque<Outbound>>>;

pub fn outbox() -> Outbox {
    Rc::new(RefCell::new(VecDeque::new()))
}

/// Event id for `event_name` raised by `node_id`.
pub fn event_id(node_id: &str, event_name: &str) -> String {
    format!("{node_id}{event_name}")
}

/// Publishes user actions onto the element-event topic.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    bus: TopicBus<BusMessage>,
}

impl EventDispatcher {
    pub fn new(bus: TopicBus<BusMessage>) -> Self {
        Self { bus }
    }

    /// Raise `event_name` on `node_id` with `value` as event data.
    pub fn notify(&self, node_id: &str, event_name: &str, value: Value) -> usize {
        let event = ElementEvent::ClientEvent {
            event_id: event_id(node_id, event_name),
            event_name: event_name.to_string(),
            event_data: value,
        };
        self.bus.publish(TOPIC_ELEMENT_EVENT, &BusMessage::Element(event))
    }

    /// Tell the server a previously registered event handler is gone.
    pub fn unregister(&self, event_id: &str) -> usize {
        let event = ElementEvent::UnregisterEvent {
            event_id: event_id.to_string(),
        };
        self.bus.publish(TOPIC_ELEMENT_EVENT, &BusMessage::Element(event))
    }
}

/// Subscribe the one top-level listener that queues hub calls for
/// element events.
pub fn install_forwarder(bus: &TopicBus<BusMessage>, outbox: Outbox) -> Subscription<BusMessage> {
    bus.subscribe_scoped(TOPIC_ELEMENT_EVENT, move |message| {
        let BusMessage::Element(event) = message else {
            return;
        };
        let invocation = match event {
            ElementEvent::ClientEvent {
                event_id,
                event_name,
                event_data,
            } => HubInvocation::ClientEvent {
                event_id: event_id.clone(),
                event_name: event_name.clone(),
                event_data: event_data.clone(),
                location: None,
            },
            ElementEvent::UnregisterEvent { event_id } => HubInvocation::UnregisterEvent {
                event_id: event_id.clone(),
            },
        };
        log::debug!("Queueing {} for {:?}", invocation.target(), event);
        outbox.borrow_mut().push_back(Outbound::Invoke(invocation));
    })
}
