//! Tree resolver: descriptor → rendered output.
//!
//! Resolution is a recursive walk with a two-tier model:
//!
//! ```text
//!   Descriptor
//!     ├── Empty / typeless node ──► Rendered::Empty
//!     ├── Rendered              ──► returned unchanged
//!     ├── List                  ──► Fragment, element-wise, order kept
//!     ├── Text                  ──► Rendered::Text
//!     └── Node
//!           ├── type registered   ──► Mounter::mount  (state, subscriptions)
//!           └── type unregistered ──► native Element, content as children
//! ```
//!
//! Registered nodes are handed to a [`Mounter`], which owns whatever
//! per-node state the caller keeps. [`Stateless`] renders straight from the
//! descriptor; the sync engine supplies a mounter backed by live stores.

use std::rc::Rc;

use serde_json::Map;

use crate::descriptor::{Descriptor, Node};
use crate::registry::{render_contained, ComponentProps, ComponentRegistry, Renderer};
use crate::rendered::Rendered;

/// Hook invoked for every node whose type is registered.
pub trait Mounter {
    fn mount(
        &mut self,
        node: &Node,
        renderer: Rc<dyn Renderer>,
        registry: &ComponentRegistry,
    ) -> Rendered;
}

/// Resolve a descriptor recursively.
pub fn resolve<M: Mounter + ?Sized>(
    descriptor: &Descriptor,
    registry: &ComponentRegistry,
    mounter: &mut M,
) -> Rendered {
    match descriptor {
        Descriptor::Empty => Rendered::Empty,
        Descriptor::Rendered(rendered) => rendered.clone(),
        Descriptor::Text(text) => Rendered::text(text.clone()),
        Descriptor::List(items) => Rendered::Fragment {
            children: items
                .iter()
                .map(|item| resolve(item, registry, mounter))
                .collect(),
        },
        Descriptor::Node(node) => resolve_node(node, registry, mounter),
    }
}

fn resolve_node<M: Mounter + ?Sized>(
    node: &Node,
    registry: &ComponentRegistry,
    mounter: &mut M,
) -> Rendered {
    let Some(kind) = node.kind.as_deref() else {
        log::debug!("Descriptor {:?} has no type; rendering empty", node.id);
        return Rendered::Empty;
    };

    match registry.get(kind) {
        Some(renderer) => mounter.mount(node, renderer, registry),
        None => Rendered::Element {
            tag: kind.to_string(),
            key: (!node.id.is_empty()).then(|| node.id.clone()),
            attributes: node.properties.clone(),
            children: resolve(&node.content, registry, mounter).into_children(),
        },
    }
}

/// Mounter without state: every registered node renders from its
/// descriptor as delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stateless;

impl Mounter for Stateless {
    fn mount(
        &mut self,
        node: &Node,
        renderer: Rc<dyn Renderer>,
        registry: &ComponentRegistry,
    ) -> Rendered {
        if node.hidden || node.hidden_by_properties() {
            return Rendered::Empty;
        }
        let children = resolve(&node.content, registry, self).into_children();
        let actions: Vec<String> = node.endpoints().into_iter().map(|(key, _)| key).collect();
        let state = Map::new();
        let kind = node.kind.as_deref().unwrap_or_default();
        let props = ComponentProps {
            id: &node.id,
            kind,
            properties: &node.properties,
            state: &state,
            children,
            version: node.version_or_default(),
            generation: 0,
            actions: &actions,
        };
        Rendered::Component {
            component: kind.to_string(),
            id: node.id.clone(),
            version: node.version_or_default().to_string(),
            generation: 0,
            body: Box::new(render_contained(renderer.as_ref(), props)),
        }
    }
}

/// Resolve without any per-node state.
pub fn resolve_stateless(descriptor: &Descriptor, registry: &ComponentRegistry) -> Rendered {
    resolve(descriptor, registry, &mut Stateless)
}
