use super::content_expr::{self, Automaton, ContentExprError};
use super::{ContentMatch, Fragment, JsonError, Mark, Node, NodeError, Text};
use crate::de;
use derivative::Derivative;
use displaydoc::Display;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// The attributes of a node or mark.
pub type Attrs = serde_json::Map<String, Value>;

/// Errors raised while building a schema
#[derive(Debug, Display, Error, PartialEq)]
pub enum SchemaError {
    /// Schema is missing its top node type ('{0}')
    MissingTopNode(String),
    /// Every schema needs a 'text' type
    MissingTextType,
    /// The text node type should not have attributes
    TextWithAttributes,
    /// {0} can not be both a node and a mark
    NameCollision(String),
    /// Unknown mark type: '{0}'
    UnknownMarkType(String),
    /// Invalid content expression '{expr}' for node {node}: {kind}
    Content {
        /// The node type that uses the expression
        node: String,
        /// The expression that failed to compile
        expr: String,
        /// What went wrong
        #[source]
        kind: ContentExprError,
    },
}

/// How whitespace in a node is treated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Whitespace {
    /// Whitespace is collapsed
    Normal,
    /// Whitespace and newlines are preserved
    Pre,
}

/// Describes an attribute of a node or mark type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AttributeSpec {
    /// The default value. An attribute without default is required.
    #[serde(
        deserialize_with = "de::deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
    /// A `|`-separated list of JSON types the value may have
    /// (`string`, `number`, `boolean`, `null`, `object`, `array`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate: Option<String>,
}

impl AttributeSpec {
    /// An attribute with the given default value
    pub fn with_default(default: Value) -> Self {
        AttributeSpec {
            default: Some(default),
            validate: None,
        }
    }

    /// An attribute that must be given on creation
    pub fn required() -> Self {
        AttributeSpec::default()
    }

    fn accepts(&self, value: &Value) -> bool {
        match &self.validate {
            None => true,
            Some(types) => {
                let name = json_type_name(value);
                types.split('|').any(|t| t.trim() == name)
            }
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The description of a node type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeSpec {
    /// The content expression for this node. Nodes without one are leaves.
    pub content: Option<String>,
    /// The marks allowed inside this node: space-separated names or groups,
    /// `"_"` for all marks, `""` for none.
    pub marks: Option<String>,
    /// Space-separated groups this node belongs to
    pub group: Option<String>,
    /// Whether this is an inline node
    pub inline: bool,
    /// Whether this node should be treated as a single unit
    pub atom: bool,
    /// The attributes of this node
    #[serde(deserialize_with = "de::deserialize_or_default")]
    pub attrs: IndexMap<String, AttributeSpec>,
    /// Whether node selections of this node are allowed (default: true)
    pub selectable: Option<bool>,
    /// Whether this node can be dragged
    pub draggable: bool,
    /// Whether this node contains code
    pub code: bool,
    /// How whitespace is parsed in this node
    pub whitespace: Option<Whitespace>,
    /// Whether the node is kept when its content is entirely replaced
    pub defining_as_context: Option<bool>,
    /// Whether the node's type is kept when content is pasted into it
    pub defining_for_content: Option<bool>,
    /// Shorthand for both `definingAsContext` and `definingForContent`
    pub defining: bool,
    /// Whether the sides of this node count as boundaries for editing
    pub isolating: bool,
}

impl NodeSpec {
    /// A node spec with the given content expression
    pub fn with_content(content: &str) -> Self {
        NodeSpec {
            content: Some(content.to_owned()),
            ..NodeSpec::default()
        }
    }

    /// Add this node to the given group
    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_owned());
        self
    }
}

/// The description of a mark type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkSpec {
    /// The attributes of this mark
    #[serde(deserialize_with = "de::deserialize_or_default")]
    pub attrs: IndexMap<String, AttributeSpec>,
    /// Whether the mark extends to text typed at its end (default: true)
    pub inclusive: Option<bool>,
    /// Space-separated marks (or groups) this mark excludes.
    /// Defaults to only the mark itself, `""` excludes nothing.
    pub excludes: Option<String>,
    /// Space-separated groups this mark belongs to
    pub group: Option<String>,
    /// Whether the mark can span multiple adjacent nodes (default: true)
    pub spanning: Option<bool>,
}

/// The input to schema construction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchemaSpec {
    /// The node types, in order of precedence
    pub nodes: IndexMap<String, NodeSpec>,
    /// The mark types, in rank order
    pub marks: IndexMap<String, MarkSpec>,
    /// The name of the top node type (default: `doc`)
    pub top_node: Option<String>,
}

impl SchemaSpec {
    /// Add a node type
    pub fn node(mut self, name: &str, spec: NodeSpec) -> Self {
        self.nodes.insert(name.to_owned(), spec);
        self
    }

    /// Add a mark type
    pub fn mark(mut self, name: &str, spec: MarkSpec) -> Self {
        self.marks.insert(name.to_owned(), spec);
        self
    }
}

pub(crate) struct NodeTypeData {
    pub(crate) name: String,
    pub(crate) groups: Vec<String>,
    pub(crate) spec: NodeSpec,
    pub(crate) is_text: bool,
    pub(crate) is_block: bool,
    pub(crate) default_attrs: Option<Attrs>,
    pub(crate) content_match: usize,
    pub(crate) inline_content: bool,
    pub(crate) mark_set: Option<Vec<usize>>,
}

impl NodeTypeData {
    fn new(name: &str, spec: &NodeSpec) -> Self {
        let is_text = name == "text";
        NodeTypeData {
            name: name.to_owned(),
            groups: split_names(spec.group.as_deref()),
            spec: spec.clone(),
            is_text,
            is_block: !(spec.inline || is_text),
            default_attrs: default_attrs(&spec.attrs),
            content_match: content_expr::EMPTY,
            inline_content: false,
            mark_set: None,
        }
    }

    pub(crate) fn is_inline(&self) -> bool {
        !self.is_block
    }

    pub(crate) fn has_required_attrs(&self) -> bool {
        self.spec.attrs.values().any(|a| a.default.is_none())
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.content_match == content_expr::EMPTY
    }
}

pub(crate) struct MarkTypeData {
    pub(crate) name: String,
    pub(crate) spec: MarkSpec,
    pub(crate) default_attrs: Option<Attrs>,
    pub(crate) excluded: Vec<usize>,
}

fn split_names(names: Option<&str>) -> Vec<String> {
    names
        .map(|g| g.split(' ').filter(|s| !s.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default()
}

fn default_attrs(attrs: &IndexMap<String, AttributeSpec>) -> Option<Attrs> {
    let mut defaults = Attrs::new();
    for (name, attr) in attrs {
        defaults.insert(name.clone(), attr.default.clone()?);
    }
    Some(defaults)
}

fn compute_attrs(
    attrs: &IndexMap<String, AttributeSpec>,
    value: Option<&Attrs>,
    owner: &str,
) -> Result<Attrs, NodeError> {
    let mut built = Attrs::new();
    for (name, attr) in attrs {
        let given = match value.and_then(|v| v.get(name)) {
            Some(given) => given.clone(),
            None => attr.default.clone().ok_or_else(|| NodeError::MissingAttribute {
                attr: name.clone(),
                owner: owner.to_owned(),
            })?,
        };
        built.insert(name.clone(), given);
    }
    Ok(built)
}

fn check_attrs(
    attrs: &IndexMap<String, AttributeSpec>,
    values: &Attrs,
    owner: &str,
) -> Result<(), NodeError> {
    for name in values.keys() {
        if !attrs.contains_key(name) {
            return Err(NodeError::UnsupportedAttribute {
                attr: name.clone(),
                owner: owner.to_owned(),
            });
        }
    }
    for (name, attr) in attrs {
        let value = values.get(name).unwrap_or(&Value::Null);
        if !attr.accepts(value) {
            return Err(NodeError::InvalidAttribute {
                attr: name.clone(),
                owner: owner.to_owned(),
                expected: attr.validate.clone().unwrap_or_default(),
            });
        }
    }
    Ok(())
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct SchemaInner {
    pub(crate) spec: SchemaSpec,
    #[derivative(Debug = "ignore")]
    pub(crate) nodes: Vec<NodeTypeData>,
    #[derivative(Debug = "ignore")]
    pub(crate) marks: Vec<MarkTypeData>,
    #[derivative(Debug = "ignore")]
    pub(crate) automaton: Automaton,
    pub(crate) top: usize,
    pub(crate) text: usize,
}

/// A document schema. Holds node and mark type objects for the nodes and
/// marks that may occur in conforming documents, and provides functionality
/// for creating and deserializing such documents.
///
/// Cloning a schema is cheap, all clones share the same types.
#[derive(Clone, Debug)]
pub struct Schema {
    pub(crate) inner: Arc<SchemaInner>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Schema {}

impl Schema {
    /// Construct a schema from a schema specification.
    pub fn new(spec: SchemaSpec) -> Result<Schema, SchemaError> {
        let top_name = spec.top_node.clone().unwrap_or_else(|| "doc".to_owned());

        let mut nodes = Vec::with_capacity(spec.nodes.len());
        for (name, node_spec) in &spec.nodes {
            if spec.marks.contains_key(name) {
                return Err(SchemaError::NameCollision(name.clone()));
            }
            nodes.push(NodeTypeData::new(name, node_spec));
        }
        let top = spec
            .nodes
            .get_index_of(&top_name)
            .ok_or(SchemaError::MissingTopNode(top_name))?;
        let text = spec
            .nodes
            .get_index_of("text")
            .ok_or(SchemaError::MissingTextType)?;
        if !nodes[text].spec.attrs.is_empty() {
            return Err(SchemaError::TextWithAttributes);
        }

        let mut marks = Vec::with_capacity(spec.marks.len());
        for (name, mark_spec) in &spec.marks {
            marks.push(MarkTypeData {
                name: name.clone(),
                spec: mark_spec.clone(),
                default_attrs: default_attrs(&mark_spec.attrs),
                excluded: Vec::new(),
            });
        }

        let mut automaton = Automaton::new();
        let mut cache: HashMap<String, usize> = HashMap::new();
        for i in 0..nodes.len() {
            let expr = nodes[i].spec.content.clone().unwrap_or_default();
            let start = match cache.get(&expr) {
                Some(&start) => start,
                None => {
                    let before = automaton.len();
                    let start = automaton.compile(&expr, &nodes).map_err(|kind| {
                        SchemaError::Content {
                            node: nodes[i].name.clone(),
                            expr: expr.clone(),
                            kind,
                        }
                    })?;
                    debug!(
                        expr = %expr,
                        states = automaton.len() - before,
                        "compiled content expression"
                    );
                    cache.insert(expr, start);
                    start
                }
            };
            let inline_content = automaton
                .first_edge_type(start)
                .map_or(false, |t| nodes[t].is_inline());
            let mark_set = match nodes[i].spec.marks.as_deref() {
                Some("_") => None,
                Some("") => Some(Vec::new()),
                Some(expr) => Some(gather_marks(&spec.marks, expr)?),
                None if !inline_content => Some(Vec::new()),
                None => None,
            };
            let data = &mut nodes[i];
            data.content_match = start;
            data.inline_content = inline_content;
            data.mark_set = mark_set;
        }

        for (rank, mark) in marks.iter_mut().enumerate() {
            mark.excluded = match mark.spec.excludes.as_deref() {
                None => vec![rank],
                Some("") => Vec::new(),
                Some(expr) => gather_marks(&spec.marks, expr)?,
            };
        }

        Ok(Schema {
            inner: Arc::new(SchemaInner {
                spec,
                nodes,
                marks,
                automaton,
                top,
                text,
            }),
        })
    }

    /// The spec this schema is based on.
    pub fn spec(&self) -> &SchemaSpec {
        &self.inner.spec
    }

    /// Get the node type with the given name.
    pub fn node_type(&self, name: &str) -> Option<NodeType> {
        self.inner
            .spec
            .nodes
            .get_index_of(name)
            .map(|index| NodeType::at(&self.inner, index))
    }

    /// Get the mark type with the given name.
    pub fn mark_type(&self, name: &str) -> Option<MarkType> {
        self.inner
            .spec
            .marks
            .get_index_of(name)
            .map(|index| MarkType::at(&self.inner, index))
    }

    /// All node types, in declaration order.
    pub fn node_types(&self) -> impl Iterator<Item = NodeType> + '_ {
        (0..self.inner.nodes.len()).map(move |i| NodeType::at(&self.inner, i))
    }

    /// All mark types, in rank order.
    pub fn mark_types(&self) -> impl Iterator<Item = MarkType> + '_ {
        (0..self.inner.marks.len()).map(move |i| MarkType::at(&self.inner, i))
    }

    /// The type of the default top node for this schema.
    pub fn top_node_type(&self) -> NodeType {
        NodeType::at(&self.inner, self.inner.top)
    }

    /// The text node type.
    pub fn text_type(&self) -> NodeType {
        NodeType::at(&self.inner, self.inner.text)
    }

    /// Create a text node in the schema. Empty text nodes are not allowed.
    pub fn text<T: Into<String>>(&self, text: T, marks: &[Mark]) -> Result<Node, NodeError> {
        let text = text.into();
        if text.is_empty() {
            return Err(NodeError::EmptyText);
        }
        Ok(Node::new_text(
            self.text_type(),
            Text::from(text),
            Mark::set_from(marks),
        ))
    }

    /// Create a node in this schema.
    pub fn node(
        &self,
        name: &str,
        attrs: Option<&Attrs>,
        content: Fragment,
        marks: &[Mark],
    ) -> Result<Node, JsonError> {
        let node_type = self
            .node_type(name)
            .ok_or_else(|| JsonError::UnknownNodeType(name.to_owned()))?;
        Ok(node_type.create(attrs, content, marks)?)
    }

    /// Create a mark with the given type and attributes.
    pub fn mark(&self, name: &str, attrs: Option<&Attrs>) -> Result<Mark, JsonError> {
        let mark_type = self
            .mark_type(name)
            .ok_or_else(|| JsonError::UnknownMarkType(name.to_owned()))?;
        Ok(mark_type.create(attrs)?)
    }

    /// Deserialize a node from its JSON representation.
    pub fn node_from_json(&self, json: &Value) -> Result<Node, JsonError> {
        Node::from_json(self, json)
    }

    /// Deserialize a mark from its JSON representation.
    pub fn mark_from_json(&self, json: &Value) -> Result<Mark, JsonError> {
        Mark::from_json(self, json)
    }
}

fn gather_marks(marks: &IndexMap<String, MarkSpec>, expr: &str) -> Result<Vec<usize>, SchemaError> {
    let mut found = Vec::new();
    for name in expr.split(' ').filter(|s| !s.is_empty()) {
        if let Some(index) = marks.get_index_of(name) {
            found.push(index);
            continue;
        }
        let mut ok = false;
        for (index, (_, spec)) in marks.iter().enumerate() {
            let in_group = split_names(spec.group.as_deref()).iter().any(|g| g == name);
            if name == "_" || in_group {
                found.push(index);
                ok = true;
            }
        }
        if !ok {
            return Err(SchemaError::UnknownMarkType(name.to_owned()));
        }
    }
    Ok(found)
}

/// Node types are objects allocated once per `Schema` and used to tag `Node`
/// instances. They contain information about the node type, such as its name
/// and what kind of node it represents.
#[derive(Clone)]
pub struct NodeType {
    pub(crate) schema: Arc<SchemaInner>,
    pub(crate) index: usize,
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Arc::ptr_eq(&self.schema, &other.schema)
    }
}

impl Eq for NodeType {}

impl Hash for NodeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl NodeType {
    pub(crate) fn at(schema: &Arc<SchemaInner>, index: usize) -> Self {
        NodeType {
            schema: schema.clone(),
            index,
        }
    }

    pub(crate) fn data(&self) -> &NodeTypeData {
        &self.schema.nodes[self.index]
    }

    /// The name the node type has in this schema.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// The schema this type belongs to.
    pub fn schema(&self) -> Schema {
        Schema {
            inner: self.schema.clone(),
        }
    }

    /// The spec that this type is based on
    pub fn spec(&self) -> &NodeSpec {
        &self.data().spec
    }

    /// The groups this type is part of
    pub fn groups(&self) -> &[String] {
        &self.data().groups
    }

    /// True if this node type is part of the given group.
    pub fn is_in_group(&self, group: &str) -> bool {
        self.data().groups.iter().any(|g| g == group)
    }

    /// True if this is a block type
    pub fn is_block(&self) -> bool {
        self.data().is_block
    }

    /// True if this is an inline type.
    pub fn is_inline(&self) -> bool {
        !self.data().is_block
    }

    /// True if this is the text node type.
    pub fn is_text(&self) -> bool {
        self.data().is_text
    }

    /// True if this is a textblock type, a block that contains inline content.
    pub fn is_textblock(&self) -> bool {
        self.data().is_block && self.data().inline_content
    }

    /// True if this node type has inline content.
    pub fn inline_content(&self) -> bool {
        self.data().inline_content
    }

    /// True for node types that allow no content.
    pub fn is_leaf(&self) -> bool {
        self.data().is_leaf()
    }

    /// True when this node is an atom, i.e. when it does not have directly
    /// editable content.
    pub fn is_atom(&self) -> bool {
        self.is_leaf() || self.data().spec.atom
    }

    /// Whether this node's whitespace is preserved.
    pub fn whitespace(&self) -> Whitespace {
        let spec = &self.data().spec;
        spec.whitespace.unwrap_or(if spec.code {
            Whitespace::Pre
        } else {
            Whitespace::Normal
        })
    }

    /// Whether the node is kept when its content is entirely replaced.
    pub fn is_defining_as_context(&self) -> bool {
        let spec = &self.data().spec;
        spec.defining_as_context.unwrap_or(spec.defining)
    }

    /// Whether the node's type is kept when content is pasted into it.
    pub fn is_defining_for_content(&self) -> bool {
        let spec = &self.data().spec;
        spec.defining_for_content.unwrap_or(spec.defining)
    }

    /// Tells you whether this node type has any required attributes.
    pub fn has_required_attrs(&self) -> bool {
        self.data().has_required_attrs()
    }

    /// The default attributes, or `None` if some attribute is required.
    pub fn default_attrs(&self) -> Option<&Attrs> {
        self.data().default_attrs.as_ref()
    }

    /// The starting match of the node type's content expression.
    pub fn content_match(&self) -> ContentMatch {
        ContentMatch::at(&self.schema, self.data().content_match)
    }

    /// Fill in the default values for attributes that are not given.
    pub fn compute_attrs(&self, attrs: Option<&Attrs>) -> Result<Attrs, NodeError> {
        match (attrs, self.default_attrs()) {
            (None, Some(defaults)) => Ok(defaults.clone()),
            _ => compute_attrs(&self.data().spec.attrs, attrs, self.name()),
        }
    }

    /// Check that the given attributes are known to this type and valid.
    pub fn check_attrs(&self, attrs: &Attrs) -> Result<(), NodeError> {
        check_attrs(&self.data().spec.attrs, attrs, self.name())
    }

    /// Indicates whether this node allows some of the same content as the
    /// given node type.
    pub fn compatible_content(&self, other: &NodeType) -> bool {
        self == other || self.content_match().compatible(&other.content_match())
    }

    /// Create a `Node` of this type. The given attributes are checked and
    /// defaulted, the content is not checked.
    pub fn create(
        &self,
        attrs: Option<&Attrs>,
        content: Fragment,
        marks: &[Mark],
    ) -> Result<Node, NodeError> {
        if self.is_text() {
            return Err(NodeError::CreateText);
        }
        Ok(Node::new(
            self.clone(),
            self.compute_attrs(attrs)?,
            content,
            Mark::set_from(marks),
        ))
    }

    /// Like `create`, but check the given content against the node type's
    /// content restrictions.
    pub fn create_checked(
        &self,
        attrs: Option<&Attrs>,
        content: Fragment,
        marks: &[Mark],
    ) -> Result<Node, NodeError> {
        self.check_content(&content)?;
        self.create(attrs, content, marks)
    }

    /// Like `create`, but see if it is necessary to add nodes to the start or
    /// end of the given fragment to make it fit the node. If no fitting
    /// wrapping can be found, return `Ok(None)`.
    pub fn create_and_fill(
        &self,
        attrs: Option<&Attrs>,
        content: Fragment,
        marks: &[Mark],
    ) -> Result<Option<Node>, NodeError> {
        if self.is_text() {
            return Err(NodeError::CreateText);
        }
        let attrs = self.compute_attrs(attrs)?;
        let start = self.content_match();
        let mut content = content;
        if content.size() > 0 {
            match start.fill_before(&content, false, 0) {
                Some(before) => content = before.append(content),
                None => return Ok(None),
            }
        }
        let after = start
            .match_fragment(&content)
            .and_then(|m| m.fill_before(&Fragment::new(), true, 0));
        Ok(after.map(|after| {
            Node::new(
                self.clone(),
                attrs,
                content.append(after),
                Mark::set_from(marks),
            )
        }))
    }

    /// Returns true if the given fragment is valid content for this node type.
    pub fn valid_content(&self, fragment: &Fragment) -> bool {
        match self.content_match().match_fragment(fragment) {
            Some(m) if m.valid_end() => fragment
                .iter()
                .all(|child| self.allows_marks(child.marks())),
            _ => false,
        }
    }

    /// Throws an error if the given fragment is not valid content for this
    /// node type.
    pub fn check_content(&self, fragment: &Fragment) -> Result<(), NodeError> {
        if self.valid_content(fragment) {
            Ok(())
        } else {
            Err(NodeError::InvalidContent(self.name().to_owned()))
        }
    }

    /// Check whether the given mark type is allowed in this node.
    pub fn allows_mark_type(&self, mark_type: &MarkType) -> bool {
        match &self.data().mark_set {
            None => true,
            Some(set) => set.contains(&mark_type.index),
        }
    }

    /// Test whether the given set of marks are allowed in this node.
    pub fn allows_marks(&self, marks: &[Mark]) -> bool {
        marks.iter().all(|m| self.allows_mark_type(m.r#type()))
    }

    /// Removes the marks that are not allowed in this node from the given set.
    pub fn allowed_marks<'a>(&self, marks: &'a [Mark]) -> Cow<'a, [Mark]> {
        if self.allows_marks(marks) {
            Cow::Borrowed(marks)
        } else {
            Cow::Owned(
                marks
                    .iter()
                    .filter(|m| self.allows_mark_type(m.r#type()))
                    .cloned()
                    .collect(),
            )
        }
    }
}

/// Like nodes, marks (which are associated with nodes to signify
/// things like emphasis or being part of a link) are
/// tagged with type objects, which are instantiated once per `Schema`.
#[derive(Clone)]
pub struct MarkType {
    pub(crate) schema: Arc<SchemaInner>,
    pub(crate) index: usize,
}

impl PartialEq for MarkType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Arc::ptr_eq(&self.schema, &other.schema)
    }
}

impl Eq for MarkType {}

impl Hash for MarkType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Debug for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl MarkType {
    pub(crate) fn at(schema: &Arc<SchemaInner>, index: usize) -> Self {
        MarkType {
            schema: schema.clone(),
            index,
        }
    }

    fn data(&self) -> &MarkTypeData {
        &self.schema.marks[self.index]
    }

    /// The name of the mark type.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// The position of this type in the schema, which decides the order of
    /// marks in a set.
    pub fn rank(&self) -> usize {
        self.index
    }

    /// The spec on which the type is based.
    pub fn spec(&self) -> &MarkSpec {
        &self.data().spec
    }

    /// Whether the mark extends to content inserted at its end.
    pub fn is_inclusive(&self) -> bool {
        self.data().spec.inclusive.unwrap_or(true)
    }

    /// Create a mark of this type. `attrs` may be `None` when all attributes
    /// have defaults.
    pub fn create(&self, attrs: Option<&Attrs>) -> Result<Mark, NodeError> {
        let attrs = match (attrs, &self.data().default_attrs) {
            (None, Some(defaults)) => defaults.clone(),
            _ => compute_attrs(&self.data().spec.attrs, attrs, self.name())?,
        };
        Ok(Mark::new(self.clone(), attrs))
    }

    /// Whether the attributes are the defaults of this type.
    pub(crate) fn has_default_attrs(&self, attrs: &Attrs) -> bool {
        match &self.data().default_attrs {
            Some(defaults) => defaults == attrs,
            None => false,
        }
    }

    /// Check that the given attributes are known to this type and valid.
    pub fn check_attrs(&self, attrs: &Attrs) -> Result<(), NodeError> {
        check_attrs(&self.data().spec.attrs, attrs, self.name())
    }

    /// When there is a mark of this type in the given set, a new set without
    /// it is returned. Otherwise, the input set is returned.
    pub fn remove_from_set<'a>(&self, set: &'a [Mark]) -> Cow<'a, [Mark]> {
        match set.iter().position(|m| m.r#type() == self) {
            Some(i) => {
                let mut copy = set.to_vec();
                copy.remove(i);
                Cow::Owned(copy)
            }
            None => Cow::Borrowed(set),
        }
    }

    /// Tests whether there is a mark of this type in the given set.
    pub fn is_in_set<'a>(&self, set: &'a [Mark]) -> Option<&'a Mark> {
        set.iter().find(|m| m.r#type() == self)
    }

    /// Queries whether a given mark type is excluded by this one.
    pub fn excludes(&self, other: &MarkType) -> bool {
        self.data().excluded.contains(&other.index)
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeSpec, NodeSpec, Schema, SchemaError, SchemaSpec};
    use crate::model::content_expr::ContentExprError;
    use serde_json::json;

    fn schema(value: serde_json::Value) -> Result<Schema, SchemaError> {
        Schema::new(serde_json::from_value::<SchemaSpec>(value).unwrap())
    }

    #[test]
    fn requires_top_and_text() {
        assert_eq!(
            schema(json!({"nodes": {"text": {}}})).unwrap_err(),
            SchemaError::MissingTopNode("doc".into())
        );
        assert_eq!(
            schema(json!({"nodes": {"doc": {}}})).unwrap_err(),
            SchemaError::MissingTextType
        );
    }

    #[test]
    fn rejects_text_attributes_and_collisions() {
        let spec = SchemaSpec::default()
            .node("doc", NodeSpec::with_content("text*"))
            .node(
                "text",
                NodeSpec {
                    attrs: [("x".to_owned(), AttributeSpec::required())]
                        .into_iter()
                        .collect(),
                    ..NodeSpec::default()
                },
            );
        assert_eq!(Schema::new(spec).unwrap_err(), SchemaError::TextWithAttributes);

        let err = schema(json!({
            "nodes": {"doc": {"content": "text*"}, "text": {}, "em": {}},
            "marks": {"em": {}}
        }))
        .unwrap_err();
        assert_eq!(err, SchemaError::NameCollision("em".into()));
    }

    #[test]
    fn distinguishes_null_default_from_required() {
        let s = schema(json!({
            "nodes": {
                "doc": {"content": "image*"},
                "image": {"inline": true, "attrs": {"src": {}, "alt": {"default": null}}},
                "text": {}
            }
        }))
        .unwrap();
        let image = s.node_type("image").unwrap();
        assert!(image.has_required_attrs());
        assert!(image.default_attrs().is_none());
        let attrs = json!({"src": "x.png"}).as_object().cloned().unwrap();
        let computed = image.compute_attrs(Some(&attrs)).unwrap();
        assert_eq!(computed.get("alt"), Some(&serde_json::Value::Null));
        assert!(image.compute_attrs(None).is_err());
    }

    #[test]
    fn rejects_required_position_with_required_attrs() {
        let err = schema(json!({
            "nodes": {
                "doc": {"content": "widget"},
                "widget": {"attrs": {"id": {}}},
                "text": {}
            }
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Content {
                kind: ContentExprError::DeadEnd(_),
                ..
            }
        ));
    }

    #[test]
    fn mark_sets_and_exclusions() {
        let s = schema(json!({
            "nodes": {
                "doc": {"content": "block+"},
                "paragraph": {"content": "text*", "group": "block"},
                "code": {"content": "text*", "group": "block", "marks": ""},
                "quote": {"content": "block+", "group": "block"},
                "text": {}
            },
            "marks": {
                "em": {"group": "fmt"},
                "strong": {"group": "fmt"},
                "link": {"excludes": "", "attrs": {"href": {}}},
                "code": {"excludes": "fmt"}
            }
        }));
        // "code" is both a node and a mark
        assert_eq!(s.unwrap_err(), SchemaError::NameCollision("code".into()));

        let s = schema(json!({
            "nodes": {
                "doc": {"content": "block+"},
                "paragraph": {"content": "text*", "group": "block"},
                "listing": {"content": "text*", "group": "block", "marks": ""},
                "quote": {"content": "block+", "group": "block"},
                "text": {}
            },
            "marks": {
                "em": {"group": "fmt"},
                "strong": {"group": "fmt"},
                "link": {"excludes": "", "attrs": {"href": {}}},
                "mono": {"excludes": "fmt"}
            }
        }))
        .unwrap();
        let em = s.mark_type("em").unwrap();
        let strong = s.mark_type("strong").unwrap();
        let link = s.mark_type("link").unwrap();
        let mono = s.mark_type("mono").unwrap();
        assert!(em.excludes(&em));
        assert!(!em.excludes(&strong));
        assert!(!link.excludes(&link));
        assert!(mono.excludes(&em) && mono.excludes(&strong) && !mono.excludes(&mono));

        assert!(s.node_type("paragraph").unwrap().allows_mark_type(&em));
        assert!(!s.node_type("listing").unwrap().allows_mark_type(&em));
        assert!(!s.node_type("quote").unwrap().allows_mark_type(&em));
    }

    #[test]
    fn unknown_mark_in_excludes() {
        let err = schema(json!({
            "nodes": {"doc": {"content": "text*"}, "text": {}},
            "marks": {"em": {"excludes": "bogus"}}
        }))
        .unwrap_err();
        assert_eq!(err, SchemaError::UnknownMarkType("bogus".into()));
    }

    #[test]
    fn shares_automata_between_equal_expressions() {
        let s = schema(json!({
            "nodes": {
                "doc": {"content": "block+"},
                "paragraph": {"content": "text*", "group": "block"},
                "quote": {"content": "block+", "group": "block"},
                "aside": {"content": "block*", "group": "block"},
                "text": {}
            }
        }))
        .unwrap();
        let node = |name: &str| s.node_type(name).unwrap();
        assert_eq!(node("doc").content_match(), node("quote").content_match());
        assert_ne!(node("doc").content_match(), node("aside").content_match());
        assert_ne!(node("doc").content_match(), node("paragraph").content_match());
    }
}
