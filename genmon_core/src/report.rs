//! Ordered report tree shared by every query surface.
//!
//! Reports are built once as a [`Node`] and rendered either as indented text
//! (mail and console replies) or as JSON (socket `*_json` verbs). Key order is
//! the insertion order in both renderings.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Value(String),
    Map(Vec<(String, Node)>),
    List(Vec<Node>),
}

impl Node {
    pub fn map() -> Self {
        Self::Map(Vec::new())
    }

    pub fn value(v: impl Into<String>) -> Self {
        Self::Value(v.into())
    }

    /// Append a key to a map node. No-op on other variants.
    pub fn push(&mut self, key: impl Into<String>, node: Self) -> &mut Self {
        if let Self::Map(items) = self {
            items.push((key.into(), node));
        }
        self
    }

    pub fn push_value(&mut self, key: impl Into<String>, v: impl Into<String>) -> &mut Self {
        self.push(key, Self::Value(v.into()))
    }

    /// Builder form of [`Node::push`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, node: Self) -> Self {
        self.push(key, node);
        self
    }

    #[must_use]
    pub fn with_value(self, key: impl Into<String>, v: impl Into<String>) -> Self {
        self.with(key, Self::Value(v.into()))
    }

    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(items) => items.iter().find(|(k, _)| k == key).map(|(_, n)| n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(s) => Some(s),
            _ => None,
        }
    }

    /// Whether any scalar below this node contains `needle` (case-insensitive).
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.any_value(&|v| v.to_lowercase().contains(&needle))
    }

    fn any_value(&self, pred: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Self::Value(v) => pred(v),
            Self::Map(items) => items.iter().any(|(_, n)| n.any_value(pred)),
            Self::List(items) => items.iter().any(|n| n.any_value(pred)),
        }
    }

    /// Indented `key : value` text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        render_text(self, 0, &mut out);
        out
    }

    /// Console form: text with a trailing newline.
    pub fn to_screen(&self) -> String {
        let mut out = self.to_text();
        out.push('\n');
        out
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Self::Value(v.to_string())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Self::Value(v)
    }
}

fn render_text(node: &Node, indent: usize, out: &mut String) {
    let pad = INDENT.repeat(indent);
    let Node::Map(items) = node else {
        tracing::debug!("report text rendering expects a map at the top");
        return;
    };
    for (key, item) in items {
        match item {
            Node::Map(_) => {
                out.push_str(&format!("\n{pad}{key} : \n"));
                render_text(item, indent + 1, out);
            }
            Node::List(elems) => {
                out.push_str(&format!("\n{pad}{key} : \n"));
                render_list(elems, indent + 1, out);
            }
            Node::Value(v) => out.push_str(&format!("{pad}{key} : {v}\n")),
        }
    }
}

fn render_list(elems: &[Node], indent: usize, out: &mut String) {
    for elem in elems {
        match elem {
            Node::Map(_) => render_text(elem, indent, out),
            Node::Value(v) => {
                out.push_str(&INDENT.repeat(indent));
                out.push_str(v);
                out.push('\n');
            }
            Node::List(inner) => render_list(inner, indent + 1, out),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_str(v),
            Self::Map(items) => {
                let mut map = serializer.serialize_map(Some(items.len()))?;
                for (k, v) in items {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for v in items {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}
