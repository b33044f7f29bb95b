//! Component registry: type name → renderer.
//!
//! Collaborators populate the registry before the first resolution. Types
//! that are not registered fall back to native element construction in the
//! resolver.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::descriptor::Properties;
use crate::rendered::Rendered;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("missing property `{0}`")]
    MissingProperty(String),
    #[error("render failed: {0}")]
    Failed(String),
}

/// Everything a renderer sees for one node.
#[derive(Debug, Clone)]
pub struct ComponentProps<'a> {
    pub id: &'a str,
    pub kind: &'a str,
    pub properties: &'a Properties,
    /// Fields merged in by `setState`, outside the fixed schema.
    pub state: &'a Map<String, Value>,
    /// Resolved children, in render order.
    pub children: Vec<Rendered>,
    pub version: &'a str,
    pub generation: u64,
    /// Property keys that carry a synthesized endpoint action.
    pub actions: &'a [String],
}

impl ComponentProps<'_> {
    /// Look up a value, preferring merged state over static properties.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key).or_else(|| self.properties.get(key))
    }

    pub fn has_action(&self, property: &str) -> bool {
        self.actions.iter().any(|a| a == property)
    }
}

/// Renders one registered component type.
pub trait Renderer {
    fn render(&self, props: ComponentProps<'_>) -> Result<Rendered, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(ComponentProps<'_>) -> Result<Rendered, RenderError>,
{
    fn render(&self, props: ComponentProps<'_>) -> Result<Rendered, RenderError> {
        self(props)
    }
}

/// Renders a registered component as an element named after its type,
/// with properties and merged state as attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRenderer;

impl Renderer for PassthroughRenderer {
    fn render(&self, props: ComponentProps<'_>) -> Result<Rendered, RenderError> {
        let mut attributes = props.properties.clone();
        for (key, value) in props.state {
            attributes.insert(key.clone(), value.clone());
        }
        Ok(Rendered::Element {
            tag: props.kind.to_string(),
            key: Some(props.id.to_string()),
            attributes,
            children: props.children,
        })
    }
}

#[derive(Default, Clone)]
pub struct ComponentRegistry {
    renderers: HashMap<String, Rc<dyn Renderer>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a renderer, replacing any previous one for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, renderer: impl Renderer + 'static) {
        self.renderers.insert(kind.into(), Rc::new(renderer));
    }

    pub fn with(mut self, kind: impl Into<String>, renderer: impl Renderer + 'static) -> Self {
        self.register(kind, renderer);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Rc<dyn Renderer>> {
        self.renderers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.renderers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.renderers.keys().collect();
        kinds.sort();
        f.debug_struct("ComponentRegistry").field("kinds", &kinds).finish()
    }
}

/// Run a renderer, containing failures to the node.
///
/// A failing renderer yields [`Rendered::Empty`] so siblings still render.
pub fn render_contained(renderer: &dyn Renderer, props: ComponentProps<'_>) -> Rendered {
    let id = props.id.to_string();
    match renderer.render(props) {
        Ok(rendered) => rendered,
        Err(e) => {
            log::warn!("Component {id} failed to render: {e}");
            Rendered::Empty
        }
    }
}
