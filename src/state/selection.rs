use crate::model::{Fragment, JsonError, Node, ResolveErr, ResolvedPos, Slice};
use crate::transform::{Assoc, Mappable, RegistryError, Step, Transform, TransformError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::{fmt, slice, sync::Arc};
use tracing::warn;

/// The direction in which to look for a valid selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Towards the start of the document
    Backward,
    /// Towards the end of the document
    Forward,
}

impl Bias {
    /// The opposite direction
    pub fn reverse(self) -> Bias {
        match self {
            Bias::Backward => Bias::Forward,
            Bias::Forward => Bias::Backward,
        }
    }

    fn step(self, pos: usize, by: usize) -> usize {
        match self {
            Bias::Backward => pos - by,
            Bias::Forward => pos + by,
        }
    }
}

/// Represents a selected range in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRange {
    /// The lower bound of the range.
    pub from: ResolvedPos,
    /// The upper bound of the range.
    pub to: ResolvedPos,
}

/// A selection type defined outside of this crate.
pub trait CustomSelection: fmt::Debug + Send + Sync {
    /// The JSON id this selection type was registered with.
    fn selection_type(&self) -> &str;

    /// The resolved anchor of the selection (the side that stays in place when the selection
    /// is modified).
    fn resolved_anchor(&self) -> &ResolvedPos;

    /// The resolved head of the selection (the side that moves when the selection is
    /// modified).
    fn resolved_head(&self) -> &ResolvedPos;

    /// The ranges covered by the selection. Must not be empty.
    fn ranges(&self) -> &[SelectionRange];

    /// Map this selection through a mapping.
    fn map(&self, doc: &Node, mapping: &dyn Mappable) -> Result<Selection, ResolveErr>;

    /// The JSON fields of this selection, without the `type`.
    fn to_json(&self) -> Value;

    /// Test whether the selection is the same as another selection.
    fn same_as(&self, other: &dyn CustomSelection) -> bool {
        self.selection_type() == other.selection_type() && self.to_json() == other.to_json()
    }
}

/// A text selection represents a classical editor selection, with a head (the moving side) and
/// anchor (immobile side), both of which point into textblock nodes. It can be empty (a
/// regular cursor position).
#[derive(Debug, Clone)]
pub struct TextSelection {
    anchor: ResolvedPos,
    head: ResolvedPos,
    range: SelectionRange,
}

impl TextSelection {
    /// Construct a text selection between the given points.
    pub fn new(anchor: ResolvedPos, head: ResolvedPos) -> TextSelection {
        if !anchor.parent().inline_content() || !head.parent().inline_content() {
            warn!(
                anchor = anchor.pos,
                head = head.pos,
                "text selection endpoint not pointing into inline content"
            );
        }
        let range = SelectionRange {
            from: anchor.min(&head).clone(),
            to: anchor.max(&head).clone(),
        };
        TextSelection {
            anchor,
            head,
            range,
        }
    }

    /// Create a text selection from non-resolved positions. `head` defaults to `anchor`.
    pub fn create(doc: &Node, anchor: usize, head: Option<usize>) -> Result<TextSelection, ResolveErr> {
        let anchor_pos = doc.resolve(anchor)?;
        let head_pos = match head {
            Some(head) if head != anchor => doc.resolve(head)?,
            _ => anchor_pos.clone(),
        };
        Ok(TextSelection::new(anchor_pos, head_pos))
    }

    /// Return a text selection that spans the given positions or, if they aren't text
    /// positions, find a text selection near them. `bias` determines whether the method
    /// searches forward or backward first when the positions are equal. May fall back to a
    /// node selection when the document doesn't contain a valid text position.
    pub fn between(anchor: &ResolvedPos, head: &ResolvedPos, bias: Option<Bias>) -> Selection {
        let d_pos = anchor.pos as isize - head.pos as isize;
        let bias = match bias {
            Some(bias) if d_pos == 0 => bias,
            _ if d_pos >= 0 => Bias::Forward,
            _ => Bias::Backward,
        };

        let mut head = head.clone();
        if !head.parent().inline_content() {
            let found = Selection::find_from(&head, bias, true)
                .or_else(|| Selection::find_from(&head, bias.reverse(), true));
            match found {
                Some(found) => head = found.resolved_head().clone(),
                None => return Selection::near(&head, bias),
            }
        }

        let mut anchor = anchor.clone();
        if !anchor.parent().inline_content() {
            if d_pos == 0 {
                anchor = head.clone();
            } else {
                let found = Selection::find_from(&anchor, bias.reverse(), true)
                    .or_else(|| Selection::find_from(&anchor, bias, true));
                if let Some(found) = found {
                    anchor = found.resolved_anchor().clone();
                }
                if (anchor.pos < head.pos) != (d_pos < 0) {
                    anchor = head.clone();
                }
            }
        }
        Selection::Text(TextSelection::new(anchor, head))
    }

    /// The resolved anchor
    pub fn resolved_anchor(&self) -> &ResolvedPos {
        &self.anchor
    }

    /// The resolved head
    pub fn resolved_head(&self) -> &ResolvedPos {
        &self.head
    }

    /// Returns the resolved head when this is an empty selection.
    pub fn cursor(&self) -> Option<&ResolvedPos> {
        (self.anchor.pos == self.head.pos).then_some(&self.head)
    }

    fn map(&self, doc: &Node, mapping: &dyn Mappable) -> Result<Selection, ResolveErr> {
        let head = doc.resolve(mapping.map(self.head.pos, Assoc::After))?;
        if !head.parent().inline_content() {
            return Ok(Selection::near(&head, Bias::Forward));
        }
        let anchor = doc.resolve(mapping.map(self.anchor.pos, Assoc::After))?;
        let anchor = if anchor.parent().inline_content() {
            anchor
        } else {
            head.clone()
        };
        Ok(Selection::Text(TextSelection::new(anchor, head)))
    }
}

/// A node selection is a selection that points at a single node. All nodes marked
/// [selectable](crate::model::NodeSpec::selectable) can be the target of a node selection.
/// In such a selection, `from` and `to` point directly before and after the selected node,
/// `anchor` equals `from`, and `head` equals `to`.
#[derive(Debug, Clone)]
pub struct NodeSelection {
    node: Node,
    range: SelectionRange,
}

impl NodeSelection {
    /// Create a node selection. Does not verify the validity of its argument. Returns `None`
    /// when there is no node after the position.
    pub fn new(pos: ResolvedPos) -> Option<NodeSelection> {
        let node = pos.node_after()?;
        let end = pos.doc().resolve(pos.pos + node.node_size()).ok()?;
        Some(NodeSelection {
            node,
            range: SelectionRange { from: pos, to: end },
        })
    }

    /// Create a node selection from the position before the node.
    pub fn create(doc: &Node, from: usize) -> Result<Option<NodeSelection>, ResolveErr> {
        Ok(NodeSelection::new(doc.resolve(from)?))
    }

    /// Determines whether the given node may be selected as a node selection.
    pub fn is_selectable(node: &Node) -> bool {
        !node.is_text() && node.r#type().spec().selectable != Some(false)
    }

    /// The selected node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    fn map(&self, doc: &Node, mapping: &dyn Mappable) -> Result<Selection, ResolveErr> {
        let result = mapping.map_result(self.range.from.pos, Assoc::After);
        let pos = doc.resolve(result.pos)?;
        if result.deleted() {
            return Ok(Selection::near(&pos, Bias::Forward));
        }
        Ok(match NodeSelection::new(pos.clone()) {
            Some(selection) => Selection::Node(selection),
            None => Selection::near(&pos, Bias::Forward),
        })
    }
}

/// A selection type that represents selecting the whole document (which can not necessarily
/// be expressed with a text selection, when there are for example leaf block nodes at the
/// start or end of the document).
#[derive(Debug, Clone)]
pub struct AllSelection {
    range: SelectionRange,
}

impl AllSelection {
    /// Create an all-selection over the given document.
    pub fn new(doc: &Node) -> AllSelection {
        AllSelection {
            range: SelectionRange {
                from: ResolvedPos::doc_start(doc),
                to: ResolvedPos::doc_end(doc),
            },
        }
    }
}

/// The current selection in an editor.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A text selection
    Text(TextSelection),
    /// A node selection
    Node(NodeSelection),
    /// The whole document
    All(AllSelection),
    /// A selection type from outside this crate
    Custom(Arc<dyn CustomSelection>),
}

impl From<TextSelection> for Selection {
    fn from(selection: TextSelection) -> Self {
        Selection::Text(selection)
    }
}

impl From<NodeSelection> for Selection {
    fn from(selection: NodeSelection) -> Self {
        Selection::Node(selection)
    }
}

impl From<AllSelection> for Selection {
    fn from(selection: AllSelection) -> Self {
        Selection::All(selection)
    }
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Selection::Text(a), Selection::Text(b)) => {
                a.anchor.pos == b.anchor.pos && a.head.pos == b.head.pos
            }
            (Selection::Node(a), Selection::Node(b)) => a.range.from.pos == b.range.from.pos,
            (Selection::All(_), Selection::All(_)) => true,
            (Selection::Custom(a), Selection::Custom(b)) => a.same_as(b.as_ref()),
            _ => false,
        }
    }
}

impl Serialize for Selection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl Selection {
    /// The resolved anchor of the selection (the side that stays in place when the selection
    /// is modified).
    pub fn resolved_anchor(&self) -> &ResolvedPos {
        match self {
            Selection::Text(s) => &s.anchor,
            Selection::Node(s) => &s.range.from,
            Selection::All(s) => &s.range.from,
            Selection::Custom(s) => s.resolved_anchor(),
        }
    }

    /// The resolved head of the selection (the side that moves when the selection is
    /// modified).
    pub fn resolved_head(&self) -> &ResolvedPos {
        match self {
            Selection::Text(s) => &s.head,
            Selection::Node(s) => &s.range.to,
            Selection::All(s) => &s.range.to,
            Selection::Custom(s) => s.resolved_head(),
        }
    }

    /// The selection's anchor, as an unresolved position.
    pub fn anchor(&self) -> usize {
        self.resolved_anchor().pos
    }

    /// The selection's head.
    pub fn head(&self) -> usize {
        self.resolved_head().pos
    }

    /// The ranges covered by the selection.
    pub fn ranges(&self) -> &[SelectionRange] {
        match self {
            Selection::Text(s) => slice::from_ref(&s.range),
            Selection::Node(s) => slice::from_ref(&s.range),
            Selection::All(s) => slice::from_ref(&s.range),
            Selection::Custom(s) => s.ranges(),
        }
    }

    /// The resolved lower bound of the selection's main range.
    pub fn resolved_from(&self) -> &ResolvedPos {
        match self.ranges().first() {
            Some(range) => &range.from,
            None => self.resolved_anchor().min(self.resolved_head()),
        }
    }

    /// The resolved upper bound of the selection's main range.
    pub fn resolved_to(&self) -> &ResolvedPos {
        match self.ranges().first() {
            Some(range) => &range.to,
            None => self.resolved_anchor().max(self.resolved_head()),
        }
    }

    /// The lower bound of the selection's main range.
    pub fn from(&self) -> usize {
        self.resolved_from().pos
    }

    /// The upper bound of the selection's main range.
    pub fn to(&self) -> usize {
        self.resolved_to().pos
    }

    /// Indicates whether the selection contains any content.
    pub fn empty(&self) -> bool {
        self.ranges().iter().all(|range| range.from.pos == range.to.pos)
    }

    /// Get the content of this selection as a slice.
    pub fn content(&self) -> Result<Slice, ResolveErr> {
        match self {
            Selection::Node(s) => Ok(Slice::new(Fragment::from(s.node.clone()), 0, 0)),
            _ => self
                .resolved_from()
                .doc()
                .slice(self.from()..self.to(), true),
        }
    }

    /// Map this selection through a [mappable](Mappable) thing. `doc` should be the new
    /// document to which we are mapping.
    pub fn map(&self, doc: &Node, mapping: &dyn Mappable) -> Result<Selection, ResolveErr> {
        match self {
            Selection::Text(s) => s.map(doc, mapping),
            Selection::Node(s) => s.map(doc, mapping),
            Selection::All(_) => Ok(Selection::All(AllSelection::new(doc))),
            Selection::Custom(s) => s.map(doc, mapping),
        }
    }

    /// Convert the selection to a JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            Selection::Text(s) => json!({
                "type": "text",
                "anchor": s.anchor.pos,
                "head": s.head.pos,
            }),
            Selection::Node(s) => json!({ "type": "node", "anchor": s.range.from.pos }),
            Selection::All(_) => json!({ "type": "all" }),
            Selection::Custom(s) => {
                let mut value = s.to_json();
                if let Value::Object(obj) = &mut value {
                    obj.insert("type".into(), Value::String(s.selection_type().to_owned()));
                }
                value
            }
        }
    }

    /// Deserialize the JSON representation of a selection with the built-in selection types.
    pub fn from_json(doc: &Node, json: &Value) -> Result<Selection, JsonError> {
        SelectionRegistry::default().from_json(doc, json)
    }

    /// Replace the selection with a slice or, if no slice is given, delete the selection.
    /// Returns the selection placed after the inserted content.
    pub fn replace(&self, tr: &mut Transform, content: &Slice) -> Result<Selection, TransformError> {
        if let Selection::All(_) = self {
            if content == &Slice::empty() {
                let size = tr.doc().content_size();
                tr.delete(0, size)?;
                return Ok(Selection::at_start(tr.doc()));
            }
        }

        let mut last_node = content.content.last_child().cloned();
        let mut last_parent = None;
        for _ in 0..content.open_end {
            last_parent = last_node.clone();
            last_node = last_node.and_then(|node| node.last_child().cloned());
        }
        let inline = match (&last_node, &last_parent) {
            (Some(node), _) => node.is_inline(),
            (None, Some(parent)) => parent.is_textblock(),
            (None, None) => false,
        };
        let bias = if inline { Bias::Backward } else { Bias::Forward };
        self.replace_ranges(
            tr,
            bias,
            |tr, from, to| tr.replace_range(from, to, content).map(drop),
            |tr, from, to| tr.replace_range(from, to, &Slice::empty()).map(drop),
        )
    }

    /// Replace the selection with the given node, returning the selection placed after it.
    pub fn replace_with(&self, tr: &mut Transform, node: Node) -> Result<Selection, TransformError> {
        let bias = if node.is_inline() {
            Bias::Backward
        } else {
            Bias::Forward
        };
        self.replace_ranges(
            tr,
            bias,
            |tr, from, to| tr.replace_range_with(from, to, node.clone()).map(drop),
            |tr, from, to| tr.delete_range(from, to).map(drop),
        )
    }

    /// Applies `first` to the first range and `rest` to the others, each mapped through the
    /// steps added so far. The result is placed after the first range's insertion and mapped
    /// through the remaining steps.
    fn replace_ranges(
        &self,
        tr: &mut Transform,
        bias: Bias,
        first: impl FnOnce(&mut Transform, usize, usize) -> Result<(), TransformError>,
        mut rest: impl FnMut(&mut Transform, usize, usize) -> Result<(), TransformError>,
    ) -> Result<Selection, TransformError> {
        let map_from = tr.steps().len();
        let mut first = Some(first);
        let mut placed = None;
        for range in self.ranges() {
            let mapping = tr.mapping().slice(map_from..);
            let from = mapping.map(range.from.pos, Assoc::After);
            let to = mapping.map(range.to.pos, Assoc::After);
            match first.take() {
                Some(first) => {
                    first(tr, from, to)?;
                    placed = Some((self.insertion_end(tr, map_from, bias)?, tr.steps().len()));
                }
                None => rest(tr, from, to)?,
            }
        }
        let (selection, from) = placed.unwrap_or_else(|| (self.clone(), map_from));
        if from == tr.steps().len() {
            return Ok(selection);
        }
        Ok(selection.map(tr.doc(), &tr.mapping().slice(from..))?)
    }

    /// The selection near the end of the content inserted by the last replace step, or this
    /// selection mapped through the new steps when there is none.
    fn insertion_end(
        &self,
        tr: &Transform,
        start_len: usize,
        bias: Bias,
    ) -> Result<Selection, TransformError> {
        let fallback = || self.map(tr.doc(), &tr.mapping().slice(start_len..));
        let last = match tr.steps().len().checked_sub(1) {
            Some(last) if last >= start_len => last,
            _ => return Ok(fallback()?),
        };
        if !matches!(tr.steps()[last], Step::Replace(_) | Step::ReplaceAround(_)) {
            return Ok(fallback()?);
        }
        let mut end = None;
        tr.mapping().maps()[last].for_each(|_, _, _, new_to| {
            if end.is_none() {
                end = Some(new_to);
            }
        });
        match end {
            Some(end) => Ok(Selection::near(&tr.doc().resolve(end)?, bias)),
            None => Ok(fallback()?),
        }
    }

    /// Find a valid cursor or leaf node selection starting at the given position and
    /// searching in the direction given by `dir`. When `text_only` is true, only consider
    /// cursor selections. Will return `None` when no valid selection position is found.
    pub fn find_from(pos: &ResolvedPos, dir: Bias, text_only: bool) -> Option<Selection> {
        let doc = pos.doc();
        let inner = if pos.parent().inline_content() {
            Some(Selection::Text(TextSelection::new(pos.clone(), pos.clone())))
        } else {
            find_selection_in(doc, pos.parent(), pos.pos, pos.index(pos.depth), dir, text_only)
        };
        if inner.is_some() {
            return inner;
        }

        for depth in (0..pos.depth).rev() {
            let found = match dir {
                Bias::Backward => find_selection_in(
                    doc,
                    pos.node(depth),
                    pos.before_level(depth + 1),
                    pos.index(depth),
                    dir,
                    text_only,
                ),
                Bias::Forward => find_selection_in(
                    doc,
                    pos.node(depth),
                    pos.after_level(depth + 1),
                    pos.index(depth) + 1,
                    dir,
                    text_only,
                ),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Find a valid cursor or leaf node selection near the given position. Searches forward
    /// first by default, but if `bias` is backward, it will search backward first. Falls back
    /// to an [`AllSelection`] when the document contains no valid selection position.
    pub fn near(pos: &ResolvedPos, bias: Bias) -> Selection {
        Selection::find_from(pos, bias, false)
            .or_else(|| Selection::find_from(pos, bias.reverse(), false))
            .unwrap_or_else(|| Selection::All(AllSelection::new(pos.doc())))
    }

    /// Find the cursor or leaf node selection closest to the start of the given document.
    pub fn at_start(doc: &Node) -> Selection {
        find_selection_in(doc, doc, 0, 0, Bias::Forward, false)
            .unwrap_or_else(|| Selection::All(AllSelection::new(doc)))
    }

    /// Find the cursor or leaf node selection closest to the end of the given document.
    pub fn at_end(doc: &Node) -> Selection {
        find_selection_in(
            doc,
            doc,
            doc.content_size(),
            doc.child_count(),
            Bias::Backward,
            false,
        )
        .unwrap_or_else(|| Selection::All(AllSelection::new(doc)))
    }
}

fn find_selection_in(
    doc: &Node,
    node: &Node,
    pos: usize,
    index: usize,
    dir: Bias,
    text_only: bool,
) -> Option<Selection> {
    if node.inline_content() {
        return TextSelection::create(doc, pos, None).ok().map(Selection::Text);
    }
    let indices: Vec<usize> = match dir {
        Bias::Forward => (index..node.child_count()).collect(),
        Bias::Backward => (0..index.min(node.child_count())).rev().collect(),
    };
    let mut pos = pos;
    for i in indices {
        let child = node.child(i);
        if !child.is_atom() {
            let start = match dir {
                Bias::Backward => child.child_count(),
                Bias::Forward => 0,
            };
            let inner = find_selection_in(doc, child, dir.step(pos, 1), start, dir, text_only);
            if inner.is_some() {
                return inner;
            }
        } else if !text_only && NodeSelection::is_selectable(child) {
            let at = match dir {
                Bias::Backward => pos - child.node_size(),
                Bias::Forward => pos,
            };
            return NodeSelection::create(doc, at)
                .ok()
                .flatten()
                .map(Selection::Node);
        }
        pos = dir.step(pos, child.node_size());
    }
    None
}

/// A function reading a selection from JSON.
pub type SelectionParser = fn(&Node, &Value) -> Result<Selection, JsonError>;

/// The JSON parsers for selections, by `type`.
#[derive(Clone)]
pub struct SelectionRegistry {
    parsers: IndexMap<String, SelectionParser>,
}

impl fmt::Debug for SelectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.parsers.keys()).finish()
    }
}

impl Default for SelectionRegistry {
    fn default() -> Self {
        let mut parsers: IndexMap<String, SelectionParser> = IndexMap::new();
        parsers.insert("text".into(), parse_text);
        parsers.insert("node".into(), parse_node);
        parsers.insert("all".into(), parse_all);
        Self { parsers }
    }
}

impl SelectionRegistry {
    /// A registry with the built-in selection types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser for the given selection `type`. Ids can only be taken once.
    pub fn register(&mut self, id: &str, parser: SelectionParser) -> Result<(), RegistryError> {
        if self.parsers.contains_key(id) {
            return Err(RegistryError::Duplicate {
                kind: "selection",
                id: id.to_owned(),
            });
        }
        self.parsers.insert(id.to_owned(), parser);
        Ok(())
    }

    /// Whether a parser for the given id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.parsers.contains_key(id)
    }

    /// Deserialize a selection from its JSON representation.
    pub fn from_json(&self, doc: &Node, json: &Value) -> Result<Selection, JsonError> {
        let id = json
            .get("type")
            .and_then(Value::as_str)
            .ok_or(JsonError::Invalid("Selection"))?;
        let parser = self.parsers.get(id).ok_or_else(|| JsonError::UnknownTypeId {
            kind: "selection",
            id: id.to_owned(),
        })?;
        parser(doc, json)
    }
}

#[derive(Deserialize)]
struct RawText {
    anchor: usize,
    head: usize,
}

#[derive(Deserialize)]
struct RawNode {
    anchor: usize,
}

fn parse_text(doc: &Node, json: &Value) -> Result<Selection, JsonError> {
    let raw = RawText::deserialize(json).map_err(|_| JsonError::Invalid("TextSelection"))?;
    let anchor = doc.resolve(raw.anchor)?;
    let head = doc.resolve(raw.head)?;
    Ok(Selection::Text(TextSelection::new(anchor, head)))
}

fn parse_node(doc: &Node, json: &Value) -> Result<Selection, JsonError> {
    let raw = RawNode::deserialize(json).map_err(|_| JsonError::Invalid("NodeSelection"))?;
    let selection =
        NodeSelection::new(doc.resolve(raw.anchor)?).ok_or(JsonError::Invalid("NodeSelection"))?;
    Ok(Selection::Node(selection))
}

fn parse_all(doc: &Node, _json: &Value) -> Result<Selection, JsonError> {
    Ok(Selection::All(AllSelection::new(doc)))
}

#[cfg(test)]
mod tests {
    use super::{AllSelection, Bias, NodeSelection, Selection, SelectionRegistry, TextSelection};
    use crate::markdown::helper::{blockquote, doc, em, hr, img, p};
    use crate::model::{Fragment, JsonError, Slice};
    use crate::transform::{RegistryError, Transform};
    use serde_json::json;

    #[test]
    fn text_selections_span_their_endpoints() {
        let d = doc((p("abc"), p("de")));
        let sel = TextSelection::create(&d, 7, Some(2)).unwrap();
        assert_eq!(sel.cursor(), None);
        let sel = <Selection as From<_>>::from(sel);
        assert_eq!((sel.anchor(), sel.head()), (7, 2));
        assert_eq!((sel.from(), sel.to()), (2, 7));
        assert!(!sel.empty());
        assert_eq!(sel.content().unwrap().content, Fragment::from(vec![p("bc"), p("d")]));

        let cursor = TextSelection::create(&d, 3, None).unwrap();
        assert_eq!(cursor.cursor().map(|pos| pos.pos), Some(3));
        assert!(<Selection as From<_>>::from(cursor).empty());
    }

    #[test]
    fn node_selections_cover_one_node() {
        let d = doc((p("a"), hr(), p("b")));
        let sel = NodeSelection::create(&d, 3).unwrap().unwrap();
        assert_eq!(sel.node(), &hr());
        let sel = <Selection as From<_>>::from(sel);
        assert_eq!((sel.from(), sel.to()), (3, 4));
        assert_eq!(sel.content().unwrap(), Slice::new(Fragment::from(hr()), 0, 0));
        assert!(NodeSelection::create(&d, 2).unwrap().is_none());
        assert!(!NodeSelection::is_selectable(&crate::markdown::helper::br()));
        assert!(NodeSelection::is_selectable(&hr()));
    }

    #[test]
    fn finds_selections_near_positions() {
        let d = doc((hr(), blockquote(p("ab")), hr()));
        assert_eq!(Selection::at_start(&d).to_json(), json!({"type": "node", "anchor": 0}));
        assert_eq!(Selection::at_end(&d).to_json(), json!({"type": "node", "anchor": 7}));

        let inside_quote = d.resolve(2).unwrap();
        let near = Selection::near(&inside_quote, Bias::Forward);
        assert_eq!(near.to_json(), json!({"type": "text", "anchor": 3, "head": 3}));
        let back = Selection::find_from(&inside_quote, Bias::Backward, false).unwrap();
        assert_eq!(back.to_json(), json!({"type": "node", "anchor": 0}));
        assert!(Selection::find_from(&d.resolve(1).unwrap(), Bias::Backward, true).is_none());
    }

    #[test]
    fn falls_back_to_all_selection() {
        let d = doc(hr());
        let sel = Selection::near(&d.resolve(1).unwrap(), Bias::Forward);
        assert_eq!(sel.to_json(), json!({"type": "node", "anchor": 0}));
        let all = <Selection as From<_>>::from(AllSelection::new(&d));
        assert_eq!((all.from(), all.to()), (0, 1));
        assert_eq!(all, Selection::All(AllSelection::new(&doc(p("x")))));
    }

    #[test]
    fn between_moves_endpoints_into_text() {
        let d = doc((p("ab"), blockquote(p("cd"))));
        let sel = TextSelection::between(&d.resolve(0).unwrap(), &d.resolve(10).unwrap(), None);
        assert_eq!((sel.anchor(), sel.head()), (1, 8));
        let sel = TextSelection::between(&d.resolve(4).unwrap(), &d.resolve(4).unwrap(), None);
        assert_eq!((sel.anchor(), sel.head()), (6, 6));
        let sel = TextSelection::between(
            &d.resolve(4).unwrap(),
            &d.resolve(4).unwrap(),
            Some(Bias::Backward),
        );
        assert_eq!((sel.anchor(), sel.head()), (3, 3));
    }

    #[test]
    fn maps_selections_through_changes() {
        let d = doc(p("abcd"));
        let sel = <Selection as From<_>>::from(TextSelection::create(&d, 2, Some(4)).unwrap());
        let mut tr = Transform::new(d.clone());
        tr.insert(1, crate::markdown::helper::node("xy")).unwrap();
        let mapped = sel.map(tr.doc(), tr.mapping()).unwrap();
        assert_eq!((mapped.anchor(), mapped.head()), (4, 6));

        let d = doc((p("a"), hr(), p("b")));
        let sel = <Selection as From<_>>::from(NodeSelection::create(&d, 3).unwrap().unwrap());
        let mut tr = Transform::new(d.clone());
        tr.delete(3, 4).unwrap();
        let mapped = sel.map(tr.doc(), tr.mapping()).unwrap();
        assert_eq!(mapped.to_json(), json!({"type": "text", "anchor": 4, "head": 4}));

        let mut tr = Transform::new(d.clone());
        tr.insert(0, p("z")).unwrap();
        let mapped = sel.map(tr.doc(), tr.mapping()).unwrap();
        assert_eq!(mapped.to_json(), json!({"type": "node", "anchor": 6}));
    }

    #[test]
    fn replaces_the_selection() {
        let d = doc(p("abcd"));
        let sel = <Selection as From<_>>::from(TextSelection::create(&d, 2, Some(4)).unwrap());
        let mut tr = Transform::new(d.clone());
        let slice = Slice::new(Fragment::from(em("X")), 0, 0);
        let after = sel.replace(&mut tr, &slice).unwrap();
        assert_eq!(tr.doc(), &doc(p(("a", em("X"), "d"))));
        assert_eq!(after.to_json(), json!({"type": "text", "anchor": 3, "head": 3}));

        let mut tr = Transform::new(d.clone());
        let after = sel.replace_with(&mut tr, img("i.png")).unwrap();
        assert_eq!(tr.doc(), &doc(p(("a", img("i.png"), "d"))));
        assert_eq!(after.head(), 3);

        let mut tr = Transform::new(d.clone());
        let after = sel.replace(&mut tr, &Slice::empty()).unwrap();
        assert_eq!(tr.doc(), &doc(p("ad")));
        assert_eq!(after.head(), 2);
    }

    #[test]
    fn replacing_everything_leaves_a_cursor() {
        let d = doc((p("ab"), p("cd")));
        let mut tr = Transform::new(d.clone());
        let after = <Selection as From<_>>::from(AllSelection::new(&d))
            .replace(&mut tr, &Slice::empty())
            .unwrap();
        assert_eq!(tr.doc(), &doc(p(())));
        assert_eq!(after.to_json(), json!({"type": "text", "anchor": 1, "head": 1}));
    }

    #[test]
    fn reads_and_writes_json() {
        let d = doc((p("ab"), hr()));
        for value in [
            json!({"type": "text", "anchor": 1, "head": 3}),
            json!({"type": "node", "anchor": 4}),
            json!({"type": "all"}),
        ] {
            let sel = Selection::from_json(&d, &value).unwrap();
            assert_eq!(sel.to_json(), value);
            assert_eq!(serde_json::to_value(&sel).unwrap(), value);
        }
        assert!(matches!(
            Selection::from_json(&d, &json!({"type": "gap", "pos": 1})),
            Err(JsonError::UnknownTypeId { kind: "selection", .. })
        ));
        assert!(matches!(
            Selection::from_json(&d, &json!({"anchor": 1})),
            Err(JsonError::Invalid(_))
        ));
        assert!(Selection::from_json(&d, &json!({"type": "node", "anchor": 5})).is_err());
    }

    #[test]
    fn registers_selection_types_once() {
        let mut registry = SelectionRegistry::new();
        assert!(registry.contains("text"));
        fn parse_gap(doc: &crate::model::Node, _: &serde_json::Value) -> Result<Selection, JsonError> {
            Ok(Selection::at_start(doc))
        }
        registry.register("gap", parse_gap).unwrap();
        assert_eq!(
            registry.register("node", parse_gap),
            Err(RegistryError::Duplicate {
                kind: "selection",
                id: "node".into()
            })
        );
        let d = doc(p("a"));
        let sel = registry.from_json(&d, &json!({"type": "gap"})).unwrap();
        assert_eq!(sel.head(), 1);
    }
}
