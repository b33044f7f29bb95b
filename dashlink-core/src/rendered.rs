//! Rendered output of the tree resolver.
//!
//! This is what a presentation layer paints. It carries no behaviour;
//! interactions travel back through the engine by node id.

use serde::{Deserialize, Serialize};

use crate::descriptor::Properties;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rendered {
    #[default]
    Empty,
    Text {
        text: String,
    },
    /// A native element built directly from an unregistered type.
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default)]
        attributes: Properties,
        #[serde(default)]
        children: Vec<Rendered>,
    },
    /// Output of a registered renderer, tagged with the node identity it
    /// was produced for.
    Component {
        component: String,
        id: String,
        version: String,
        generation: u64,
        body: Box<Rendered>,
    },
    Fragment {
        children: Vec<Rendered>,
    },
}

impl Rendered {
    pub fn text(text: impl Into<String>) -> Self {
        Rendered::Text { text: text.into() }
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Rendered::Element {
            tag: tag.into(),
            key: None,
            attributes: Properties::new(),
            children: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Rendered::Empty)
    }

    /// Flatten into a child list: fragments splice, empties vanish.
    pub fn into_children(self) -> Vec<Rendered> {
        match self {
            Rendered::Empty => Vec::new(),
            Rendered::Fragment { children } => children,
            other => vec![other],
        }
    }

    /// Depth-first search for the component or element keyed by `id`.
    pub fn find(&self, id: &str) -> Option<&Rendered> {
        match self {
            Rendered::Component { id: own, body, .. } => {
                if own == id {
                    Some(self)
                } else {
                    body.find(id)
                }
            }
            Rendered::Element { key, children, .. } => {
                if key.as_deref() == Some(id) {
                    return Some(self);
                }
                children.iter().find_map(|c| c.find(id))
            }
            Rendered::Fragment { children } => children.iter().find_map(|c| c.find(id)),
            Rendered::Empty | Rendered::Text { .. } => None,
        }
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Rendered::Text { text } => out.push_str(text),
            Rendered::Component { body, .. } => body.collect_text(out),
            Rendered::Element { children, .. } | Rendered::Fragment { children } => {
                for child in children {
                    child.collect_text(out);
                }
            }
            Rendered::Empty => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_children_flattens_fragment() {
        let frag = Rendered::Fragment {
            children: vec![Rendered::text("a"), Rendered::text("b")],
        };
        assert_eq!(frag.into_children().len(), 2);
        assert!(Rendered::Empty.into_children().is_empty());
        assert_eq!(Rendered::text("x").into_children().len(), 1);
    }

    #[test]
    fn test_find_and_text_content() {
        let tree = Rendered::Component {
            component: "panel".into(),
            id: "root".into(),
            version: "0".into(),
            generation: 0,
            body: Box::new(Rendered::Element {
                tag: "div".into(),
                key: Some("inner".into()),
                attributes: Properties::new(),
                children: vec![Rendered::text("hello "), Rendered::text("world")],
            }),
        };

        assert!(tree.find("root").is_some());
        assert!(matches!(tree.find("inner"), Some(Rendered::Element { .. })));
        assert!(tree.find("missing").is_none());
        assert_eq!(tree.text_content(), "hello world");
    }
}
