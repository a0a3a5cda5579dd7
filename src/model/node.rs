use super::{
    util, Attrs, ContentMatch, ContentMatchError, Fragment, IndexError, Mark, MarkSet, MarkType,
    NodeType, ResolveCache, ResolveErr, ResolvedPos, Slice,
};
use displaydoc::Display;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when creating or checking nodes
#[derive(Debug, Display, Error, PartialEq, Eq, Clone)]
pub enum NodeError {
    /// No value supplied for attribute {attr} of {owner}
    MissingAttribute {
        /// The attribute name
        attr: String,
        /// The node or mark type
        owner: String,
    },
    /// Unsupported attribute {attr} for {owner}
    UnsupportedAttribute {
        /// The attribute name
        attr: String,
        /// The node or mark type
        owner: String,
    },
    /// Invalid value for attribute {attr} of {owner}, expected {expected}
    InvalidAttribute {
        /// The attribute name
        attr: String,
        /// The node or mark type
        owner: String,
        /// The allowed types
        expected: String,
    },
    /// Invalid content for node {0}
    InvalidContent(String),
    /// Invalid collection of marks for node {0}
    InvalidMarks(String),
    /// Empty text nodes are not allowed
    EmptyText,
    /// Text nodes can not be created from their node type
    CreateText,
    /// {0}
    ContentMatch(#[from] ContentMatchError),
}

/// The result of looking up the child at or around a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Child<'a> {
    /// The child node, if any
    pub node: Option<&'a Node>,
    /// The index of the child in its parent
    pub index: usize,
    /// The offset of the child from the start of the parent's content
    pub offset: usize,
}

/// A string that stores its length in utf-16
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct Text {
    len_utf16: usize,
    content: String,
}

impl Text {
    /// Return the contained string
    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// The length of this string if it were encoded in utf-16
    pub fn len_utf16(&self) -> usize {
        self.len_utf16
    }
}

impl From<String> for Text {
    fn from(src: String) -> Text {
        Text {
            len_utf16: src.encode_utf16().count(),
            content: src,
        }
    }
}

impl Serialize for Text {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.content.serialize(serializer)
    }
}

struct NodeInner {
    r#type: NodeType,
    attrs: Attrs,
    marks: MarkSet,
    content: Fragment,
    text: Option<Text>,
}

/// This struct represents a node in the tree that makes up a document. So a document is
/// an instance of `Node`, with children that are also instances of `Node`.
///
/// Nodes are persistent, cloning one is cheap and shares all of its content.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

impl Node {
    pub(crate) fn new(r#type: NodeType, attrs: Attrs, content: Fragment, marks: MarkSet) -> Node {
        Node(Arc::new(NodeInner {
            r#type,
            attrs,
            marks,
            content,
            text: None,
        }))
    }

    pub(crate) fn new_text(r#type: NodeType, text: Text, marks: MarkSet) -> Node {
        Node(Arc::new(NodeInner {
            r#type,
            attrs: Attrs::new(),
            marks,
            content: Fragment::new(),
            text: Some(text),
        }))
    }

    /// Whether both nodes are the same instance.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// The type of node that this is.
    pub fn r#type(&self) -> &NodeType {
        &self.0.r#type
    }

    /// The attributes of this node.
    pub fn attrs(&self) -> &Attrs {
        &self.0.attrs
    }

    /// Get a single attribute.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.0.attrs.get(name)
    }

    /// The marks (things like whether it is emphasized or part of a link) applied to this node.
    pub fn marks(&self) -> &[Mark] {
        &self.0.marks
    }

    /// A container holding the node's children.
    pub fn content(&self) -> &Fragment {
        &self.0.content
    }

    /// The text of this node, if it is a text node.
    pub fn text(&self) -> Option<&str> {
        self.0.text.as_ref().map(Text::as_str)
    }

    /// The text of this node with its utf-16 length, if it is a text node.
    pub fn text_node(&self) -> Option<&Text> {
        self.0.text.as_ref()
    }

    /// The size of this node, as defined by the integer-based indexing scheme. For text nodes,
    /// this is the amount of characters in utf-16. For other leaf nodes, it is one. For
    /// non-leaf nodes, it is the size of the content plus two (the start and end token).
    pub fn node_size(&self) -> usize {
        match &self.0.text {
            Some(text) => text.len_utf16(),
            None if self.is_leaf() => 1,
            None => self.0.content.size() + 2,
        }
    }

    /// Represents `.content.size`
    pub fn content_size(&self) -> usize {
        self.0.content.size()
    }

    /// The number of children that the node has.
    pub fn child_count(&self) -> usize {
        self.0.content.child_count()
    }

    /// Get the child node at the given index. Panics when the index is out of range.
    pub fn child(&self, index: usize) -> &Node {
        self.0.content.child(index)
    }

    /// Get the child node at the given index, if it exists.
    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.0.content.maybe_child(index)
    }

    /// Returns this node's first child, or `None` if there are no children.
    pub fn first_child(&self) -> Option<&Node> {
        self.0.content.first_child()
    }

    /// Returns this node's last child, or `None` if there are no children.
    pub fn last_child(&self) -> Option<&Node> {
        self.0.content.last_child()
    }

    /// True when this is a block (non-inline node)
    pub fn is_block(&self) -> bool {
        self.0.r#type.is_block()
    }

    /// True when this is an inline node (a text node or a node that can appear among text).
    pub fn is_inline(&self) -> bool {
        self.0.r#type.is_inline()
    }

    /// True when this is a textblock node, a block node with inline content.
    pub fn is_textblock(&self) -> bool {
        self.0.r#type.is_textblock()
    }

    /// True when this node allows inline content.
    pub fn inline_content(&self) -> bool {
        self.0.r#type.inline_content()
    }

    /// True when this is a text node.
    pub fn is_text(&self) -> bool {
        self.0.text.is_some()
    }

    /// True when this is a leaf node.
    pub fn is_leaf(&self) -> bool {
        self.0.r#type.is_leaf()
    }

    /// True when this is an atom, i.e. when it does not have directly editable content.
    pub fn is_atom(&self) -> bool {
        self.0.r#type.is_atom()
    }

    /// Invoke a callback for all descendant nodes recursively between the given two positions
    /// that are relative to start of this node's content. The callback is invoked with the node,
    /// its position relative to the original node (method receiver), its parent node, and its
    /// child index. When the callback returns false for a given node, that node's children will
    /// not be recursed over.
    pub fn nodes_between<F>(&self, from: usize, to: usize, mut f: F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.0.content.visit_between(from, to, &mut f, 0, Some(self))
    }

    /// Call the given callback for every descendant node.
    pub fn descendants<F>(&self, f: F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.content_size(), f)
    }

    /// Concatenates all the text nodes found in this node and its children.
    pub fn text_content(&self) -> String {
        match self.text() {
            Some(text) => text.to_owned(),
            None => self.text_between(0, self.content_size(), None, None),
        }
    }

    /// Get all text between positions `from` and `to`. When `block_separator` is given, it will
    /// be inserted to separate text from different block nodes. When `leaf_text` is given, it'll
    /// be inserted for every non-text leaf node encountered.
    pub fn text_between(
        &self,
        from: usize,
        to: usize,
        block_separator: Option<&str>,
        leaf_text: Option<&str>,
    ) -> String {
        self.0.content.text_between(from, to, block_separator, leaf_text)
    }

    /// Test whether two nodes represent the same piece of document.
    pub fn same_markup(&self, other: &Node) -> bool {
        self.has_markup(other.r#type(), Some(other.attrs()), other.marks())
    }

    /// Check whether this node's markup correspond to the given type, attributes, and marks.
    pub fn has_markup(&self, r#type: &NodeType, attrs: Option<&Attrs>, marks: &[Mark]) -> bool {
        let attrs_match = match (attrs, r#type.default_attrs()) {
            (Some(attrs), _) => *attrs == self.0.attrs,
            (None, Some(defaults)) => *defaults == self.0.attrs,
            (None, None) => self.0.attrs.is_empty(),
        };
        self.0.r#type == *r#type && attrs_match && Mark::same_set(&self.0.marks, marks)
    }

    /// Create a new node with the same markup as this node, containing the given content.
    pub fn copy(&self, content: Fragment) -> Node {
        if Fragment::ptr_eq(&content, &self.0.content) {
            return self.clone();
        }
        Node::new(
            self.0.r#type.clone(),
            self.0.attrs.clone(),
            content,
            self.0.marks.clone(),
        )
    }

    /// Create a copy of this node, with the given set of marks instead of the node's own marks.
    pub fn mark(&self, marks: MarkSet) -> Node {
        if marks == self.0.marks {
            return self.clone();
        }
        Node(Arc::new(NodeInner {
            r#type: self.0.r#type.clone(),
            attrs: self.0.attrs.clone(),
            marks,
            content: self.0.content.clone(),
            text: self.0.text.clone(),
        }))
    }

    /// Create a text node with the same marks as this one and the given text.
    pub(crate) fn with_text(&self, text: String) -> Node {
        if self.text() == Some(text.as_str()) {
            return self.clone();
        }
        Node::new_text(self.0.r#type.clone(), Text::from(text), self.0.marks.clone())
    }

    /// Create a copy of this node with only the content between the given positions.
    pub fn cut<R: RangeBounds<usize>>(&self, range: R) -> Node {
        let from = util::from(&range);
        if let Some(text) = &self.0.text {
            let len = text.len_utf16();
            let to = util::to(&range, len);
            if from == 0 && to == len {
                return self.clone();
            }
            return self.with_text(util::slice_utf16(text.as_str(), from, to).to_owned());
        }
        let size = self.content_size();
        let to = util::to(&range, size);
        if from == 0 && to == size {
            return self.clone();
        }
        self.copy(self.0.content.cut(from..to))
    }

    /// Cut out the part of the document between the given positions, and return it as a
    /// `Slice` object.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R, include_parents: bool) -> Result<Slice, ResolveErr> {
        let from = util::from(&range);
        let to = util::to(&range, self.content_size());
        if from == to {
            return Ok(Slice::empty());
        }
        let rp_from = self.resolve(from)?;
        let rp_to = self.resolve(to)?;
        let depth = if include_parents {
            0
        } else {
            rp_from.shared_depth(to)
        };
        let start = rp_from.start(depth);
        let node = rp_from.node(depth);
        let content = node.content().cut(rp_from.pos - start..rp_to.pos - start);
        Ok(Slice::new(content, rp_from.depth - depth, rp_to.depth - depth))
    }

    /// Find the node directly after the given position.
    pub fn node_at(&self, pos: usize) -> Option<&Node> {
        let mut node = self;
        let mut pos = pos;
        loop {
            let index = node.content().find_index(pos, false).ok()?;
            node = node.maybe_child(index.index)?;
            if index.offset == pos || node.is_text() {
                return Some(node);
            }
            pos -= index.offset + 1;
        }
    }

    /// Find the (direct) child node after the given offset, if any, and return it along with its
    /// index and offset relative to this node.
    pub fn child_after(&self, pos: usize) -> Result<Child<'_>, IndexError> {
        let index = self.content().find_index(pos, false)?;
        Ok(Child {
            node: self.maybe_child(index.index),
            index: index.index,
            offset: index.offset,
        })
    }

    /// Find the (direct) child node before the given offset, if any, and return it along with
    /// its index and offset relative to this node.
    pub fn child_before(&self, pos: usize) -> Result<Child<'_>, IndexError> {
        if pos == 0 {
            return Ok(Child {
                node: None,
                index: 0,
                offset: 0,
            });
        }
        let index = self.content().find_index(pos, false)?;
        if index.offset < pos {
            return Ok(Child {
                node: Some(self.child(index.index)),
                index: index.index,
                offset: index.offset,
            });
        }
        let node = self.child(index.index - 1);
        Ok(Child {
            node: Some(node),
            index: index.index - 1,
            offset: index.offset - node.node_size(),
        })
    }

    /// Test whether a given mark or mark type occurs in this document between the two given
    /// positions.
    pub fn range_has_mark(&self, from: usize, to: usize, r#type: &MarkType) -> bool {
        let mut found = false;
        if to > from {
            self.nodes_between(from, to, |node, _, _, _| {
                if r#type.is_in_set(node.marks()).is_some() {
                    found = true;
                }
                !found
            });
        }
        found
    }

    /// Resolve the given position in the document, returning a struct with information about
    /// its context.
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, ResolveErr> {
        ResolvedPos::resolve(self, pos)
    }

    /// Like `resolve`, but reuses recent results stored in the given cache.
    pub fn resolve_cached(&self, cache: &mut ResolveCache, pos: usize) -> Result<ResolvedPos, ResolveErr> {
        cache.resolve(self, pos)
    }

    /// Get the content match in this node at the given index.
    pub fn content_match_at(&self, index: usize) -> Result<ContentMatch, ContentMatchError> {
        self.0
            .r#type
            .content_match()
            .match_fragment_range(&self.0.content, 0..index)
            .ok_or(ContentMatchError::InvalidContent)
    }

    /// Test whether replacing the range between `from` and `to` (by child index) with the given
    /// replacement fragment (which defaults to the empty fragment) would leave the node's
    /// content valid. You can optionally pass `start` and `end` indices into the replacement
    /// fragment.
    pub fn can_replace(
        &self,
        from: usize,
        to: usize,
        replacement: &Fragment,
        start: usize,
        end: usize,
    ) -> bool {
        let one = match self.content_match_at(from) {
            Ok(m) => m.match_fragment_range(replacement, start..end),
            Err(_) => return false,
        };
        let two = one.and_then(|m| m.match_fragment_range(&self.0.content, to..));
        if !two.map_or(false, |m| m.valid_end()) {
            return false;
        }
        replacement.children()[start..end]
            .iter()
            .all(|child| self.0.r#type.allows_marks(child.marks()))
    }

    /// Test whether replacing the range `from` to `to` (by index) with a node of the given type
    /// would leave the node's content valid.
    pub fn can_replace_with(
        &self,
        from: usize,
        to: usize,
        r#type: &NodeType,
        marks: Option<&[Mark]>,
    ) -> bool {
        if let Some(marks) = marks {
            if !self.0.r#type.allows_marks(marks) {
                return false;
            }
        }
        let start = match self.content_match_at(from) {
            Ok(m) => m.match_type(r#type),
            Err(_) => return false,
        };
        start
            .and_then(|m| m.match_fragment_range(&self.0.content, to..))
            .map_or(false, |m| m.valid_end())
    }

    /// Test whether the given node's content could be appended to this node. If that node is
    /// empty, this will only return true if there is at least one node type that can appear in
    /// both nodes (to avoid merging completely incompatible nodes).
    pub fn can_append(&self, other: &Node) -> bool {
        if other.content_size() > 0 {
            let count = self.child_count();
            self.can_replace(count, count, other.content(), 0, other.child_count())
        } else {
            self.0.r#type.compatible_content(other.r#type())
        }
    }

    /// Check whether this node and its descendants conform to the schema, and return an error
    /// when they do not.
    pub fn check(&self) -> Result<(), NodeError> {
        self.0.r#type.check_content(&self.0.content)?;
        self.0.r#type.check_attrs(&self.0.attrs)?;
        let mut copy = MarkSet::new();
        for mark in self.marks() {
            mark.r#type().check_attrs(mark.attrs())?;
            copy = mark.add_to_set(&copy);
        }
        if !Mark::same_set(&copy, self.marks()) {
            return Err(NodeError::InvalidMarks(self.0.r#type.name().to_owned()));
        }
        self.0.content.iter().try_for_each(Node::check)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Node::ptr_eq(self, other)
            || (self.same_markup(other)
                && self.0.text == other.0.text
                && self.0.content == other.0.content)
    }
}

impl Eq for Node {}

fn wrap_marks(f: &mut fmt::Formatter<'_>, marks: &[Mark], inner: &dyn Fn(&mut fmt::Formatter<'_>) -> fmt::Result) -> fmt::Result {
    for mark in marks {
        write!(f, "{}(", mark.r#type().name())?;
    }
    inner(f)?;
    for _ in marks {
        f.write_str(")")?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        wrap_marks(f, self.marks(), &|f| match self.text() {
            Some(text) => write!(f, "{}", Value::from(text)),
            None => {
                f.write_str(self.0.r#type.name())?;
                if self.content_size() > 0 {
                    f.write_str("(")?;
                    self.0.content.fmt_inner(f)?;
                    f.write_str(")")?;
                }
                Ok(())
            }
        })
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use crate::markdown::helper::{blockquote, doc, em, h1, img, li, node, p, strong, ul};
    use crate::markdown::schema;
    use crate::model::NodeError;

    #[test]
    fn test_size() {
        assert_eq!(node("Hello").node_size(), 5);
        assert_eq!(node("\u{1F60A}").node_size(), 2);
        assert_eq!(p(("Hallo", "Foo")).node_size(), 10);
        assert_eq!(img("x.png").node_size(), 1);
    }

    #[test]
    fn displays_nested_structure() {
        let d = doc((p(("a", em("b"))), blockquote(p(strong("c")))));
        assert_eq!(
            d.to_string(),
            "doc(paragraph(\"a\", em(\"b\")), blockquote(paragraph(strong(\"c\"))))"
        );
    }

    #[test]
    fn node_at_and_children() {
        let d = doc((p("ab"), blockquote(p("cd"))));
        assert_eq!(d.node_at(0).unwrap().r#type().name(), "paragraph");
        assert_eq!(d.node_at(1).unwrap().text(), Some("ab"));
        assert_eq!(d.node_at(2).unwrap().text(), Some("ab"));
        assert_eq!(d.node_at(4).unwrap().r#type().name(), "blockquote");
        assert_eq!(d.node_at(6).unwrap().text(), Some("cd"));
        assert!(d.node_at(20).is_none());

        let after = d.child_after(4).unwrap();
        assert_eq!((after.index, after.offset), (1, 4));
        let before = d.child_before(4).unwrap();
        assert_eq!((before.index, before.offset), (0, 0));
        assert!(d.child_before(0).unwrap().node.is_none());
    }

    #[test]
    fn cuts_and_slices() {
        let d = doc((p("hello"), h1("world")));
        assert_eq!(d.cut(2..10), doc((p("ello"), h1("wo"))));
        let slice = d.slice(3..10, false).unwrap();
        assert_eq!(slice.to_string(), "<paragraph(\"llo\"), heading(\"wo\")>(1,1)");
        let slice = d.slice(2..4, false).unwrap();
        assert_eq!(slice.to_string(), "<\"el\">(0,0)");
        let slice = d.slice(2..4, true).unwrap();
        assert_eq!(slice.to_string(), "<paragraph(\"el\")>(1,1)");
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(doc(p("a")), doc(p("a")));
        assert_ne!(doc(p("a")), doc(p(em("a"))));
        assert_ne!(doc(h1("a")), doc(p("a")));
    }

    #[test]
    fn range_has_mark() {
        let s = schema();
        let em_type = s.mark_type("em").unwrap();
        let d = doc(p(("ab", em("cd"), "ef")));
        assert!(d.range_has_mark(1, 5, &em_type));
        assert!(!d.range_has_mark(1, 3, &em_type));
        assert!(!d.range_has_mark(5, 7, &em_type));
    }

    #[test]
    fn checks_content() {
        assert!(doc((p("a"), ul(li(p("b"))))).check().is_ok());
        let bad = ul(p("x"));
        assert_eq!(bad.check(), Err(NodeError::InvalidContent("bullet_list".into())));
        let s = schema();
        let empty_doc = s.top_node_type().create(None, Default::default(), &[]).unwrap();
        assert!(empty_doc.check().is_err());
    }

    #[test]
    fn can_replace_and_append() {
        let d = doc((p("a"), p("b")));
        let para = p("x");
        let content = para.content();
        assert!(d.can_replace(0, 1, d.content(), 0, 1));
        assert!(!d.can_replace(0, 2, content, 0, 1));
        assert!(d.can_replace_with(1, 1, &schema().node_type("heading").unwrap(), None));
        assert!(p("a").can_append(&p("b")));
        assert!(!p("a").can_append(&ul(li(p("b")))));
        assert!(schema().text("x", &[]).is_ok());
        assert_eq!(schema().text("", &[]).unwrap_err(), NodeError::EmptyText);
    }
}
