//! Per-node component state.
//!
//! One [`ComponentState`] exists for every mounted node of a registered
//! type. It holds the node's live descriptor, seeded from the upstream
//! descriptor and re-seeded whenever the upstream `version` changes, and
//! applies the component-addressed hub messages as transitions on it.

use serde_json::{Map, Value};

use dashlink_core::{Descriptor, Node};

/// Component-addressed messages, as delivered on the node's topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentMessage {
    SetState { state: Map<String, Value> },
    /// Client-side name of the hub's `requestState`.
    GetState { request_id: String },
    AddElement { elements: Vec<Descriptor> },
    /// Hides the addressed node itself; `parent_id` is not consulted.
    RemoveElement { parent_id: Option<String> },
    ClearElement,
    SyncElement,
    TestForm,
}

/// Inputs that decide whether a node must be rendered again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub version: String,
    pub generation: u64,
    /// Bumped on every local mutation.
    pub revision: u64,
}

/// A node needs rendering when any part of its key moved.
pub fn needs_render(prev: &RenderKey, next: &RenderKey) -> bool {
    prev != next
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEffect {
    /// Report the full local state back to the server.
    SendState { request_id: String, state: Value },
}

#[derive(Debug, Clone)]
pub struct ComponentState {
    node: Node,
    upstream_version: Option<String>,
    generation: u64,
    revision: u64,
}

impl ComponentState {
    /// Seed from the upstream descriptor. Content becomes the child list.
    pub fn seed(upstream: &Node) -> Self {
        Self {
            node: normalise(upstream),
            upstream_version: upstream.version.clone(),
            generation: 0,
            revision: 0,
        }
    }

    /// Replace local state if the upstream `version` moved.
    ///
    /// Returns whether a re-seed happened. Local mutations survive any
    /// upstream change that leaves the version alone.
    pub fn reseed_if_changed(&mut self, upstream: &Node) -> bool {
        if self.upstream_version == upstream.version {
            return false;
        }
        log::debug!(
            "Re-seeding {} ({:?} -> {:?})",
            upstream.id,
            self.upstream_version,
            upstream.version
        );
        self.node = normalise(upstream);
        self.upstream_version = upstream.version.clone();
        self.revision += 1;
        true
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn children(&self) -> Vec<Descriptor> {
        self.node.content.as_children()
    }

    pub fn render_key(&self) -> RenderKey {
        RenderKey {
            version: self.node.version_or_default().to_string(),
            generation: self.generation,
            revision: self.revision,
        }
    }

    /// Full local state as sent back for `getState`.
    pub fn snapshot(&self) -> Value {
        let mut value = self.node.to_value();
        if let Value::Object(map) = &mut value {
            map.insert("version".into(), Value::String(self.node.version_or_default().to_string()));
        }
        value
    }

    /// Shallow-merge fields into the node. Used by `setState` and by
    /// renderers updating their own state.
    pub fn merge(&mut self, state: Map<String, Value>) -> bool {
        let before = self.node.clone();
        self.node.merge_state(state);
        if self.node.content != before.content {
            self.node.content = Descriptor::List(self.node.content.as_children());
        }
        self.touch_if(self.node != before)
    }

    /// Apply one message.
    pub fn apply(&mut self, message: &ComponentMessage) -> Option<StoreEffect> {
        match message {
            ComponentMessage::SetState { state } => {
                self.merge(state.clone());
            }
            ComponentMessage::GetState { request_id } => {
                return Some(StoreEffect::SendState {
                    request_id: request_id.clone(),
                    state: self.snapshot(),
                });
            }
            ComponentMessage::AddElement { elements } => {
                if !elements.is_empty() {
                    let mut children = self.children();
                    children.extend(elements.iter().cloned());
                    self.node.content = Descriptor::List(children);
                    self.touch_if(true);
                }
            }
            ComponentMessage::ClearElement => {
                let had_children = !self.children().is_empty();
                self.node.content = Descriptor::List(Vec::new());
                self.touch_if(had_children);
            }
            ComponentMessage::RemoveElement { .. } => {
                let was_visible = !self.node.hidden;
                self.node.hidden = true;
                self.touch_if(was_visible);
            }
            ComponentMessage::SyncElement => {
                self.generation += 1;
            }
            ComponentMessage::TestForm => {
                log::trace!("testForm for {} has no built-in effect", self.node.id);
            }
        }
        None
    }

    fn touch_if(&mut self, changed: bool) -> bool {
        if changed {
            self.revision += 1;
        }
        changed
    }
}

fn normalise(upstream: &Node) -> Node {
    let mut node = upstream.clone();
    node.content = Descriptor::List(upstream.content.as_children());
    node
}
