//! JSON (de)serialization of documents in the same shape the JavaScript
//! library uses, so steps and documents can be exchanged with it.

use super::{Attrs, Fragment, Mark, Node, NodeError, ResolveErr, Schema, Slice};
use displaydoc::Display;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Errors when reading documents, steps or selections from JSON
#[derive(Debug, Display, Error)]
pub enum JsonError {
    /// Malformed JSON: {0}
    Malformed(#[from] serde_json::Error),
    /// There is no node type {0} in this schema
    UnknownNodeType(String),
    /// There is no mark type {0} in this schema
    UnknownMarkType(String),
    /// Invalid text node in JSON
    InvalidText,
    /// Invalid input for {0}
    Invalid(&'static str),
    /// No {kind} type with id {id} defined
    UnknownTypeId {
        /// Step or selection
        kind: &'static str,
        /// The type id that was not found
        id: String,
    },
    /// {0}
    Node(#[from] NodeError),
    /// {0}
    Resolve(#[from] ResolveErr),
}

#[derive(Deserialize)]
struct RawMark {
    r#type: String,
    #[serde(default)]
    attrs: Option<Attrs>,
}

#[derive(Deserialize)]
struct RawNode {
    r#type: String,
    #[serde(default)]
    attrs: Option<Attrs>,
    #[serde(default)]
    content: Option<Vec<RawNode>>,
    #[serde(default)]
    marks: Option<Vec<RawMark>>,
    #[serde(default)]
    text: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSlice {
    #[serde(default)]
    content: Option<Vec<RawNode>>,
    #[serde(default)]
    open_start: usize,
    #[serde(default)]
    open_end: usize,
}

/// The computed attributes plus any unknown ones from the input, for checking.
fn given_attrs(computed: &Attrs, raw: Option<&Attrs>) -> Attrs {
    let mut attrs = computed.clone();
    for (name, value) in raw.into_iter().flatten() {
        attrs.entry(name.clone()).or_insert_with(|| value.clone());
    }
    attrs
}

fn build_mark(schema: &Schema, raw: &RawMark) -> Result<Mark, JsonError> {
    let mark_type = schema
        .mark_type(&raw.r#type)
        .ok_or_else(|| JsonError::UnknownMarkType(raw.r#type.clone()))?;
    let mark = mark_type.create(raw.attrs.as_ref())?;
    mark_type.check_attrs(&given_attrs(mark.attrs(), raw.attrs.as_ref()))?;
    Ok(mark)
}

fn build_fragment(schema: &Schema, raw: Option<&Vec<RawNode>>) -> Result<Fragment, JsonError> {
    match raw {
        None => Ok(Fragment::new()),
        Some(nodes) => Ok(Fragment::from(
            nodes
                .iter()
                .map(|n| build_node(schema, n))
                .collect::<Result<Vec<_>, _>>()?,
        )),
    }
}

fn build_node(schema: &Schema, raw: &RawNode) -> Result<Node, JsonError> {
    let marks = match &raw.marks {
        Some(marks) => marks
            .iter()
            .map(|m| build_mark(schema, m))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    if raw.r#type == "text" {
        return match &raw.text {
            Some(Value::String(text)) => Ok(schema.text(text.as_str(), &marks)?),
            _ => Err(JsonError::InvalidText),
        };
    }
    let node_type = schema
        .node_type(&raw.r#type)
        .ok_or_else(|| JsonError::UnknownNodeType(raw.r#type.clone()))?;
    let content = build_fragment(schema, raw.content.as_ref())?;
    let node = node_type.create(raw.attrs.as_ref(), content, &marks)?;
    node_type.check_attrs(&given_attrs(node.attrs(), raw.attrs.as_ref()))?;
    Ok(node)
}

impl Node {
    /// Deserialize a node from its JSON representation.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Node, JsonError> {
        let raw = RawNode::deserialize(json)?;
        build_node(schema, &raw)
    }

    /// Return a JSON-serializeable representation of this node.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Mark {
    /// Deserialize a mark from JSON.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Mark, JsonError> {
        let raw = RawMark::deserialize(json)?;
        build_mark(schema, &raw)
    }
}

impl Fragment {
    /// Deserialize a fragment from its JSON representation.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Fragment, JsonError> {
        if json.is_null() {
            return Ok(Fragment::new());
        }
        let raw = Vec::<RawNode>::deserialize(json)?;
        build_fragment(schema, Some(&raw))
    }
}

impl Slice {
    /// Deserialize a slice from its JSON representation. `null` is the empty slice.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Slice, JsonError> {
        if json.is_null() {
            return Ok(Slice::empty());
        }
        let raw = RawSlice::deserialize(json)?;
        let content = build_fragment(schema, raw.content.as_ref())?;
        if raw.open_start + raw.open_end > content.size() {
            return Err(JsonError::Invalid("Slice"));
        }
        Ok(Slice::new(content, raw.open_start, raw.open_end))
    }
}

impl Serialize for Mark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let with_attrs = !self.attrs().is_empty();
        let mut map = serializer.serialize_map(Some(1 + with_attrs as usize))?;
        map.serialize_entry("type", self.r#type().name())?;
        if with_attrs {
            map.serialize_entry("attrs", self.attrs())?;
        }
        map.end()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.r#type().name())?;
        if !self.attrs().is_empty() {
            map.serialize_entry("attrs", self.attrs())?;
        }
        if self.content_size() > 0 {
            map.serialize_entry("content", self.content())?;
        }
        if !self.marks().is_empty() {
            map.serialize_entry("marks", self.marks())?;
        }
        if let Some(text) = self.text_node() {
            map.serialize_entry("text", text)?;
        }
        map.end()
    }
}

impl Serialize for Slice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.content.size() == 0 {
            return serializer.serialize_none();
        }
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("content", &self.content)?;
        if self.open_start > 0 {
            map.serialize_entry("openStart", &self.open_start)?;
        }
        if self.open_end > 0 {
            map.serialize_entry("openEnd", &self.open_end)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::JsonError;
    use crate::markdown::helper::{blockquote, doc, em, h2, img, p};
    use crate::markdown::schema;
    use crate::model::{Node, NodeError, Slice};
    use serde_json::json;

    #[test]
    fn deserializes_text() {
        let s = schema();
        let node = Node::from_json(&s, &json!({"type": "text", "text": "Foo"})).unwrap();
        assert_eq!(node.text(), Some("Foo"));
        assert!(matches!(
            Node::from_json(&s, &json!({"type": "text", "text": 3})),
            Err(JsonError::InvalidText)
        ));
    }

    #[test]
    fn serializes_like_javascript() {
        let d = doc((h2(("a", em("b"))), p(img("x.png"))));
        assert_eq!(
            d.to_json(),
            json!({
                "type": "doc",
                "content": [
                    {"type": "heading", "attrs": {"level": 2}, "content": [
                        {"type": "text", "text": "a"},
                        {"type": "text", "marks": [{"type": "em"}], "text": "b"}
                    ]},
                    {"type": "paragraph", "content": [
                        {"type": "image", "attrs": {"src": "x.png", "alt": null, "title": null}}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn round_trips_documents() {
        let s = schema();
        let d = doc((blockquote(p(("x", em("y")))), h2("z")));
        assert_eq!(Node::from_json(&s, &d.to_json()).unwrap(), d);
    }

    #[test]
    fn rejects_unknown_types_and_attrs() {
        let s = schema();
        assert!(matches!(
            Node::from_json(&s, &json!({"type": "widget"})),
            Err(JsonError::UnknownNodeType(name)) if name == "widget"
        ));
        assert!(matches!(
            Node::from_json(&s, &json!({"type": "text", "text": "a", "marks": [{"type": "blink"}]})),
            Err(JsonError::UnknownMarkType(_))
        ));
        assert!(matches!(
            Node::from_json(&s, &json!({"type": "image"})),
            Err(JsonError::Node(NodeError::MissingAttribute { .. }))
        ));
        assert!(matches!(
            Node::from_json(&s, &json!({"type": "paragraph", "attrs": {"align": "left"}})),
            Err(JsonError::Node(NodeError::UnsupportedAttribute { .. }))
        ));
        assert!(matches!(
            Node::from_json(&s, &json!([1, 2])),
            Err(JsonError::Malformed(_))
        ));
    }

    #[test]
    fn slices_serialize_open_depths() {
        let s = schema();
        let slice = doc((p("ab"), p("cd"))).slice(2..6, false).unwrap();
        let json = serde_json::to_value(&slice).unwrap();
        assert_eq!(json["openStart"], json!(1));
        assert_eq!(Slice::from_json(&s, &json).unwrap(), slice);
        assert_eq!(serde_json::to_value(Slice::empty()).unwrap(), json!(null));
        assert_eq!(Slice::from_json(&s, &json!(null)).unwrap(), Slice::empty());
    }

    #[test]
    fn rejects_open_depths_deeper_than_the_content() {
        let s = schema();
        let content = json!([{"type": "paragraph", "content": [{"type": "text", "text": "a"}]}]);
        let slice = Slice::from_json(&s, &json!({"content": content.clone(), "openStart": 1, "openEnd": 1}));
        assert_eq!(slice.unwrap().size(), 1);
        assert!(matches!(
            Slice::from_json(&s, &json!({"content": content, "openStart": 2, "openEnd": 2})),
            Err(JsonError::Invalid("Slice"))
        ));
    }
}
