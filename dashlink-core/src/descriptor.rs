//! Server-authored component descriptors.
//!
//! The hub and the handshake endpoint deliver descriptors in several shapes:
//! plain JSON objects, arrays of descriptors, JSON encoded as a string, or
//! bare text. [`Descriptor::from_value`] normalises all of them once, at the
//! boundary, into a single sum type so the resolver never probes types again.
//!
//! ```text
//!   serde_json::Value ──► Descriptor::from_value ──► Descriptor
//!                                                     ├── Empty
//!                                                     ├── Text
//!                                                     ├── List
//!                                                     ├── Node
//!                                                     └── Rendered (trusted, pre-built)
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::rendered::Rendered;

/// Ordered property mapping of a node.
pub type Properties = Map<String, Value>;

/// Version assigned to registered nodes that arrive without one.
pub const DEFAULT_VERSION: &str = "0";

/// A normalised descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Descriptor {
    /// `null`, `{}` or any scalar without structure.
    #[default]
    Empty,
    /// Literal text content.
    Text(String),
    /// Ordered sequence; render order equals list order.
    List(Vec<Descriptor>),
    /// A structured component node.
    Node(Box<Node>),
    /// Output built by trusted native code, passed through unchanged.
    Rendered(Rendered),
}

impl Descriptor {
    /// Normalise an arbitrary JSON value.
    ///
    /// Strings are first attempted as JSON; only when parsing fails are they
    /// kept as literal text. A string holding a JSON scalar has no type and
    /// normalises to empty.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => Descriptor::Empty,
            Value::Array(items) => {
                Descriptor::List(items.into_iter().map(Descriptor::from_value).collect())
            }
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Descriptor::from_value(parsed),
                Ok(_) => Descriptor::Empty,
                Err(_) => Descriptor::Text(text),
            },
            Value::Object(map) if map.is_empty() => Descriptor::Empty,
            Value::Object(map) => Descriptor::Node(Box::new(Node::from_map(map))),
        }
    }

    /// Serialise back to the wire shape. Pre-rendered output is emitted as
    /// its serde form.
    pub fn to_value(&self) -> Value {
        match self {
            Descriptor::Empty => Value::Null,
            Descriptor::Text(text) => Value::String(text.clone()),
            Descriptor::List(items) => Value::Array(items.iter().map(Descriptor::to_value).collect()),
            Descriptor::Node(node) => node.to_value(),
            Descriptor::Rendered(rendered) => {
                serde_json::to_value(rendered).unwrap_or(Value::Null)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Descriptor::Empty)
    }

    /// View the descriptor as a child sequence.
    pub fn as_children(&self) -> Vec<Descriptor> {
        match self {
            Descriptor::Empty => Vec::new(),
            Descriptor::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// The node, when this descriptor is one.
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Descriptor::Node(node) => Some(&**node),
            _ => None,
        }
    }
}

impl From<Node> for Descriptor {
    fn from(node: Node) -> Self {
        Descriptor::Node(Box::new(node))
    }
}

impl From<Rendered> for Descriptor {
    fn from(rendered: Rendered) -> Self {
        Descriptor::Rendered(rendered)
    }
}

impl<'de> Deserialize<'de> for Descriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Descriptor::from_value)
    }
}

impl Serialize for Descriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// One component node.
///
/// `id` is the routing key on the topic bus and is never reassigned.
/// Fields that are not part of the fixed schema land in `extra`; the
/// server's `setState` messages may add or overwrite them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub id: String,
    /// Registry key or native element tag. `None` resolves to empty.
    pub kind: Option<String>,
    pub properties: Properties,
    pub content: Descriptor,
    pub version: Option<String>,
    pub hidden: bool,
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_content(mut self, content: Descriptor) -> Self {
        self.content = content;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Build a node from a JSON object.
    ///
    /// `children` is accepted as an alias of `content`. Scalar ids and
    /// versions are stringified.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let id = map.remove("id").and_then(scalar_string).unwrap_or_default();
        let kind = map.remove("type").and_then(scalar_string);
        let properties = match map.remove("properties") {
            Some(Value::Object(props)) => props,
            _ => Properties::new(),
        };
        let content = match (map.remove("content"), map.remove("children")) {
            (Some(content), _) if !content.is_null() => Descriptor::from_value(content),
            (_, Some(children)) => Descriptor::from_value(children),
            _ => Descriptor::Empty,
        };
        let version = map.remove("version").and_then(scalar_string);
        let hidden = map.remove("hidden").is_some_and(|v| truthy(&v));

        Self {
            id,
            kind,
            properties,
            content,
            version,
            hidden,
            extra: map,
        }
    }

    /// Serialise to a JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        if let Some(kind) = &self.kind {
            map.insert("type".into(), Value::String(kind.clone()));
        }
        map.insert("properties".into(), Value::Object(self.properties.clone()));
        map.insert("content".into(), self.content.to_value());
        if let Some(version) = &self.version {
            map.insert("version".into(), Value::String(version.clone()));
        }
        map.insert("hidden".into(), Value::Bool(self.hidden));
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// Version token, defaulting to [`DEFAULT_VERSION`].
    pub fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    /// Whether `properties.hidden` forces this node to render empty.
    pub fn hidden_by_properties(&self) -> bool {
        self.properties.get("hidden").is_some_and(truthy)
    }

    /// Property keys carrying endpoint metadata, in property order.
    pub fn endpoints(&self) -> Vec<(String, EndpointSpec)> {
        self.properties
            .iter()
            .filter_map(|(key, value)| EndpointSpec::from_property(value).map(|e| (key.clone(), e)))
            .collect()
    }

    /// Shallow-merge a `setState` payload into this node.
    ///
    /// Schema fields are replaced wholesale; `id` is immutable and ignored.
    /// Everything else is merged into `extra`.
    pub fn merge_state(&mut self, state: Map<String, Value>) {
        for (key, value) in state {
            match key.as_str() {
                "id" => {}
                "type" => self.kind = scalar_string(value),
                "properties" => {
                    if let Value::Object(props) = value {
                        self.properties = props;
                    }
                }
                "content" | "children" => self.content = Descriptor::from_value(value),
                "version" => self.version = scalar_string(value),
                "hidden" => self.hidden = truthy(&value),
                _ => {
                    self.extra.insert(key, value);
                }
            }
        }
    }
}

/// Endpoint metadata declared on a property: `{endpoint, name, accept, contentType}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Endpoint id the action posts to.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    #[serde(default, rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl EndpointSpec {
    /// Parse a property value. Only objects with a truthy `endpoint` flag qualify.
    pub fn from_property(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !obj.get("endpoint").is_some_and(truthy) {
            return None;
        }
        let name = obj.get("name").and_then(|v| scalar_string(v.clone()))?;
        let non_empty = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        Some(Self {
            name,
            accept: non_empty("accept"),
            content_type: non_empty("contentType"),
        })
    }

    /// HTTP headers derived from the metadata. Empty values are omitted.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(accept) = &self.accept {
            headers.push(("Accept".to_string(), accept.clone()));
        }
        if let Some(content_type) = &self.content_type {
            headers.push(("Content-Type".to_string(), content_type.clone()));
        }
        headers
    }
}

fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// JavaScript-style truthiness for flags sent by the server.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_and_empty_object_are_empty() {
        assert_eq!(Descriptor::from_value(Value::Null), Descriptor::Empty);
        assert_eq!(Descriptor::from_value(json!({})), Descriptor::Empty);
        assert_eq!(Descriptor::from_value(json!(5)), Descriptor::Empty);
    }

    #[test]
    fn test_string_parsed_as_json_first() {
        let d = Descriptor::from_value(json!(r#"{"id":"a","type":"div"}"#));
        let node = d.as_node().unwrap();
        assert_eq!(node.id, "a");
        assert_eq!(node.kind.as_deref(), Some("div"));
    }

    #[test]
    fn test_json_scalar_string_is_empty() {
        assert_eq!(Descriptor::from_value(json!(r#""hi""#)), Descriptor::Empty);
        assert_eq!(Descriptor::from_value(json!("42")), Descriptor::Empty);
        assert_eq!(
            Descriptor::from_value(json!(r#"[{"id":"a","type":"div"}, "x y"]"#)).as_children().len(),
            2
        );
    }

    #[test]
    fn test_unparseable_string_is_text() {
        assert_eq!(
            Descriptor::from_value(json!("hello world")),
            Descriptor::Text("hello world".into())
        );
    }

    #[test]
    fn test_array_preserves_order() {
        let d = Descriptor::from_value(json!([{"id":"1","type":"a"}, "x", {"id":"2","type":"b"}]));
        let Descriptor::List(items) = d else { panic!("expected list") };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_node().unwrap().id, "1");
        assert_eq!(items[1], Descriptor::Text("x".into()));
        assert_eq!(items[2].as_node().unwrap().id, "2");
    }

    #[test]
    fn test_node_fields() {
        let node = Node::from_map(
            json!({
                "id": 7,
                "type": "panel",
                "properties": {"title": "t"},
                "children": ["a"],
                "version": 3,
                "hidden": true,
                "custom": 1
            })
            .as_object()
            .unwrap()
            .clone(),
        );
        assert_eq!(node.id, "7");
        assert_eq!(node.version.as_deref(), Some("3"));
        assert!(node.hidden);
        assert_eq!(node.content, Descriptor::List(vec![Descriptor::Text("a".into())]));
        assert_eq!(node.extra.get("custom"), Some(&json!(1)));
    }

    #[test]
    fn test_merge_state_keeps_content() {
        let mut node = Node::new("root", "panel").with_content(Descriptor::Text("child".into()));
        let state = json!({"title": "hi", "id": "other"});
        node.merge_state(state.as_object().unwrap().clone());

        assert_eq!(node.id, "root");
        assert_eq!(node.extra.get("title"), Some(&json!("hi")));
        assert_eq!(node.content, Descriptor::Text("child".into()));
    }

    #[test]
    fn test_endpoint_spec_parsing() {
        let node = Node::new("n", "button")
            .with_property(
                "onClick",
                json!({"endpoint": true, "name": "click-1", "accept": "application/json", "contentType": ""}),
            )
            .with_property("label", json!("Go"))
            .with_property("other", json!({"name": "no-flag"}));

        let endpoints = node.endpoints();
        assert_eq!(endpoints.len(), 1);
        let (key, spec) = &endpoints[0];
        assert_eq!(key, "onClick");
        assert_eq!(spec.name, "click-1");
        assert_eq!(
            spec.headers(),
            vec![("Accept".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn test_hidden_by_properties() {
        let node = Node::new("n", "x").with_property("hidden", json!(true));
        assert!(node.hidden_by_properties());
        assert!(!Node::new("n", "x").hidden_by_properties());
    }

    #[test]
    fn test_version_default() {
        assert_eq!(Node::new("n", "x").version_or_default(), DEFAULT_VERSION);
        assert_eq!(Node::new("n", "x").with_version("9").version_or_default(), "9");
    }

    #[test]
    fn test_deserialize_from_str() {
        let d: Descriptor = serde_json::from_str(r#"[null, "txt"]"#).unwrap();
        assert_eq!(
            d,
            Descriptor::List(vec![Descriptor::Empty, Descriptor::Text("txt".into())])
        );
    }
}
