//! # Helpers
//!
//! This module contains some functions to create nodes programmatically.
//! Nodes are created without checking their content, so tests can build
//! invalid documents on purpose. Unknown mark names or missing required
//! attributes panic.
//!
//! See also: <https://github.com/prosemirror/prosemirror-test-builder>
use super::schema;
use crate::model::{Attrs, Fragment, Mark, Node};
use serde_json::{json, Value};

/// Conversion into the content of a helper-built node.
pub trait IntoFragment {
    /// Convert into a fragment
    fn into_fragment(self) -> Fragment;
}

impl IntoFragment for Fragment {
    fn into_fragment(self) -> Fragment {
        self
    }
}

impl IntoFragment for Node {
    fn into_fragment(self) -> Fragment {
        Fragment::from(self)
    }
}

impl IntoFragment for Vec<Node> {
    fn into_fragment(self) -> Fragment {
        Fragment::from(self)
    }
}

/// Plain text. The empty string yields no content.
impl IntoFragment for &str {
    fn into_fragment(self) -> Fragment {
        Fragment::from(schema().text(self, &[]).ok())
    }
}

impl IntoFragment for () {
    fn into_fragment(self) -> Fragment {
        Fragment::new()
    }
}

macro_rules! tuple_into_fragment {
    ($($name:ident $var:ident),+) => {
        impl<$($name: IntoFragment),+> IntoFragment for ($($name,)+) {
            fn into_fragment(self) -> Fragment {
                let ($($var,)+) = self;
                Fragment::new()$(.append($var.into_fragment()))+
            }
        }
    };
}

tuple_into_fragment!(A a);
tuple_into_fragment!(A a, B b);
tuple_into_fragment!(A a, B b, C c);
tuple_into_fragment!(A a, B b, C c, D d);
tuple_into_fragment!(A a, B b, C c, D d, E e);

fn object(value: Value) -> Attrs {
    match value {
        Value::Object(map) => map,
        _ => Attrs::new(),
    }
}

/// Create a node of the given markdown type. Panics on unknown types or missing attributes.
pub fn node_of<A: IntoFragment>(name: &str, attrs: Option<Value>, content: A) -> Node {
    let attrs = attrs.map(object);
    schema()
        .node(name, attrs.as_ref(), content.into_fragment(), &[])
        .unwrap()
}

fn marked(name: &str, attrs: Option<Value>, content: &str) -> Node {
    let s = schema();
    let attrs = attrs.map(object);
    let mark = s.mark(name, attrs.as_ref()).unwrap();
    s.text(content, &[mark]).unwrap()
}

/// Create a document node.
pub fn doc<A: IntoFragment>(content: A) -> Node {
    node_of("doc", None, content)
}

/// Create a paragraph node.
pub fn p<A: IntoFragment>(content: A) -> Node {
    node_of("paragraph", None, content)
}

/// Create a blockquote node.
pub fn blockquote<A: IntoFragment>(content: A) -> Node {
    node_of("blockquote", None, content)
}

/// Create a heading node.
pub fn h<A: IntoFragment>(level: u8, content: A) -> Node {
    node_of("heading", Some(json!({ "level": level })), content)
}

/// Create a heading (level 1) node.
pub fn h1<A: IntoFragment>(content: A) -> Node {
    h(1, content)
}

/// Create a heading (level 2) node.
pub fn h2<A: IntoFragment>(content: A) -> Node {
    h(2, content)
}

/// Create a list item node.
pub fn li<A: IntoFragment>(content: A) -> Node {
    node_of("list_item", None, content)
}

/// Create a bullet list node.
pub fn ul<A: IntoFragment>(content: A) -> Node {
    node_of("bullet_list", None, content)
}

/// Create an ordered list node.
pub fn ol<A: IntoFragment>(content: A) -> Node {
    node_of("ordered_list", None, content)
}

/// Create a code block node.
pub fn code_block<A: IntoFragment>(params: &str, content: A) -> Node {
    node_of("code_block", Some(json!({ "params": params })), content)
}

/// Create a horizontal rule.
pub fn hr() -> Node {
    node_of("horizontal_rule", None, ())
}

/// Create a hard break.
pub fn br() -> Node {
    node_of("hard_break", None, ())
}

/// Create an image.
pub fn img(src: &str) -> Node {
    node_of("image", Some(json!({ "src": src })), ())
}

/// Create an emphasized text node.
pub fn em(content: &str) -> Node {
    marked("em", None, content)
}

/// Create a strong text node.
pub fn strong(content: &str) -> Node {
    marked("strong", None, content)
}

/// Create a code text node.
pub fn code(content: &str) -> Node {
    marked("code", None, content)
}

/// Create a linked text node.
pub fn a(href: &str, content: &str) -> Node {
    marked("link", Some(json!({ "href": href })), content)
}

/// Create a mark of the given markdown type.
pub fn mark(name: &str) -> Mark {
    schema().mark(name, None).unwrap()
}

/// Create a plain text node.
pub fn node(text: &str) -> Node {
    schema().text(text, &[]).unwrap()
}
