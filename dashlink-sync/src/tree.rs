//! Mounted component tree.
//!
//! [`ComponentTree`] is the stateful [`Mounter`] used by the engine. Every
//! registered node it mounts gets a [`ComponentState`] and a scoped
//! subscription on the topic named by its id. A render pass records which
//! ids it visited; anything mounted but not visited is unmounted at the end
//! of the pass, which drops its subscription.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::{Map, Value};

use dashlink_core::{
    render_contained, resolve, ComponentProps, ComponentRegistry, Descriptor, EndpointSpec,
    Mounter, Node, Rendered, Renderer, Stateless,
};

use crate::bus::{BusMessage, Subscription, TopicBus};
use crate::dispatch::{Outbound, Outbox};
use crate::store::{needs_render, ComponentState, StoreEffect};

struct MountedNode {
    store: Rc<RefCell<ComponentState>>,
    _subscription: Subscription<BusMessage>,
}

pub struct ComponentTree {
    bus: TopicBus<BusMessage>,
    outbox: Outbox,
    dirty: Rc<Cell<bool>>,
    mounted: HashMap<String, MountedNode>,
    visited: HashSet<String>,
}

impl ComponentTree {
    pub fn new(bus: TopicBus<BusMessage>, outbox: Outbox) -> Self {
        Self {
            bus,
            outbox,
            dirty: Rc::new(Cell::new(false)),
            mounted: HashMap::new(),
            visited: HashSet::new(),
        }
    }

    /// Resolve `root`, mounting new nodes and unmounting vanished ones.
    pub fn render(&mut self, root: &Descriptor, registry: &ComponentRegistry) -> Rendered {
        self.visited.clear();
        self.dirty.set(false);
        let rendered = resolve(root, registry, self);

        let visited = &self.visited;
        self.mounted.retain(|id, _| {
            let keep = visited.contains(id);
            if !keep {
                log::debug!("Unmounting {id}");
            }
            keep
        });
        rendered
    }

    /// Whether a store changed since the last render pass.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn is_mounted(&self, id: &str) -> bool {
        self.mounted.contains_key(id)
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.len()
    }

    /// Current live descriptor of a mounted node.
    pub fn node(&self, id: &str) -> Option<Node> {
        self.mounted.get(id).map(|m| m.store.borrow().node().clone())
    }

    /// Shallow-merge client-side state into a mounted node.
    pub fn set_local_state(&self, id: &str, state: Map<String, Value>) -> bool {
        let Some(mounted) = self.mounted.get(id) else {
            return false;
        };
        let changed = mounted.store.borrow_mut().merge(state);
        if changed {
            self.dirty.set(true);
        }
        changed
    }

    /// Endpoint metadata declared by `property` on a mounted node.
    pub fn endpoint(&self, id: &str, property: &str) -> Option<EndpointSpec> {
        let mounted = self.mounted.get(id)?;
        let store = mounted.store.borrow();
        store
            .node()
            .properties
            .get(property)
            .and_then(EndpointSpec::from_property)
    }

    /// Drop every mount and its subscription.
    pub fn unmount_all(&mut self) {
        self.mounted.clear();
        self.visited.clear();
    }

    fn subscribe(&self, id: &str, store: &Rc<RefCell<ComponentState>>) -> Subscription<BusMessage> {
        let store = Rc::clone(store);
        let outbox = Rc::clone(&self.outbox);
        let dirty = Rc::clone(&self.dirty);
        self.bus.subscribe_scoped(id, move |message| {
            let BusMessage::Component(message) = message else {
                return;
            };
            let mut current = store.borrow_mut();
            let before = current.render_key();
            if let Some(StoreEffect::SendState { request_id, state }) = current.apply(message) {
                outbox
                    .borrow_mut()
                    .push_back(Outbound::SendState { request_id, state });
            }
            if needs_render(&before, &current.render_key()) {
                dirty.set(true);
            }
        })
    }
}

impl std::fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.mounted.keys().collect();
        ids.sort();
        f.debug_struct("ComponentTree")
            .field("mounted", &ids)
            .field("dirty", &self.dirty.get())
            .finish()
    }
}

impl Mounter for ComponentTree {
    fn mount(&mut self, node: &Node, renderer: Rc<dyn Renderer>, registry: &ComponentRegistry) -> Rendered {
        if node.id.is_empty() {
            log::debug!("Registered node without id renders without state");
            return Stateless.mount(node, renderer, registry);
        }
        if !self.visited.insert(node.id.clone()) {
            log::warn!("Duplicate component id {}; rendering without state", node.id);
            return Stateless.mount(node, renderer, registry);
        }

        let store = match self.mounted.get(&node.id) {
            Some(mounted) => {
                mounted.store.borrow_mut().reseed_if_changed(node);
                Rc::clone(&mounted.store)
            }
            None => {
                log::debug!("Mounting {}", node.id);
                let store = Rc::new(RefCell::new(ComponentState::seed(node)));
                let subscription = self.subscribe(&node.id, &store);
                self.mounted.insert(
                    node.id.clone(),
                    MountedNode {
                        store: Rc::clone(&store),
                        _subscription: subscription,
                    },
                );
                store
            }
        };

        // Release the borrow before recursing: children may mount too.
        let (live, generation) = {
            let state = store.borrow();
            (state.node().clone(), state.generation())
        };
        if live.hidden || live.hidden_by_properties() {
            return Rendered::Empty;
        }

        let children = resolve(&live.content, registry, self).into_children();
        let actions: Vec<String> = live.endpoints().into_iter().map(|(key, _)| key).collect();
        let kind = live.kind.as_deref().unwrap_or_default();
        let props = ComponentProps {
            id: &live.id,
            kind,
            properties: &live.properties,
            state: &live.extra,
            children,
            version: live.version_or_default(),
            generation,
            actions: &actions,
        };
        let body = render_contained(renderer.as_ref(), props);

        Rendered::Component {
            component: kind.to_string(),
            id: live.id.clone(),
            version: live.version_or_default().to_string(),
            generation,
            body: Box::new(body),
        }
    }
}
