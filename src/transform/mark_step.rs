use super::{Assoc, Mappable, Span, Step, StepError, StepKind, StepResult};
use crate::model::{Fragment, JsonError, Mark, Node, Schema, Slice};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn map_fragment_parent<F>(fragment: &Fragment, f: &F, parent: &Node) -> Fragment
where
    F: Fn(Node, &Node, usize) -> Node,
{
    let mut mapped = vec![];
    for (i, child) in fragment.children().iter().enumerate() {
        let mut child = if child.content_size() > 0 {
            child.copy(map_fragment_parent(child.content(), f, child))
        } else {
            child.clone()
        };

        if child.is_inline() {
            child = f(child, parent, i)
        }
        mapped.push(child)
    }
    Fragment::from(mapped)
}

fn map_fragment<F>(fragment: &Fragment, f: &F) -> Fragment
where
    F: Fn(Node) -> Node,
{
    let mut mapped = vec![];
    for child in fragment.children() {
        let mut child = if child.content_size() > 0 {
            child.copy(map_fragment(child.content(), f))
        } else {
            child.clone()
        };

        if child.is_inline() {
            child = f(child)
        }
        mapped.push(child)
    }
    Fragment::from(mapped)
}

fn map_span(span: Span, mapping: &dyn Mappable) -> Option<Span> {
    let from = mapping.map_result(span.from, Assoc::After);
    let to = mapping.map_result(span.to, Assoc::Before);
    if (from.deleted() && to.deleted()) || from.pos >= to.pos {
        None
    } else {
        Some(Span::new(from.pos, to.pos))
    }
}

/// Adding a mark on some part of the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, new)]
#[serde(rename_all = "camelCase")]
pub struct AddMarkStep {
    /// The affected part of the document
    #[serde(flatten)]
    pub span: Span,
    /// The mark to add
    pub mark: Mark,
}

/// Removing a mark on some part of the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, new)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMarkStep {
    /// The affected part of the document
    #[serde(flatten)]
    pub span: Span,
    /// The mark to remove
    pub mark: Mark,
}

impl StepKind for AddMarkStep {
    fn apply(&self, doc: &Node) -> StepResult {
        let old_slice = doc.slice(self.span.from..self.span.to, false)?;
        let rp_from = doc.resolve(self.span.from)?;
        let parent = rp_from.node(rp_from.shared_depth(self.span.to));

        let new_content = map_fragment_parent(
            &old_slice.content,
            &|node, parent, _i| {
                if !node.is_atom() || !parent.r#type().allows_mark_type(self.mark.r#type()) {
                    node
                } else {
                    let marks = self.mark.add_to_set(node.marks());
                    node.mark(marks)
                }
            },
            parent,
        );

        let slice = Slice::new(new_content, old_slice.open_start, old_slice.open_end);
        let new_node = doc.replace(self.span.from..self.span.to, &slice)?;
        Ok(new_node)
    }

    fn invert(&self, _doc: &Node) -> Result<Step, StepError> {
        Ok(Step::RemoveMark(RemoveMarkStep::new(self.span, self.mark.clone())))
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        let span = map_span(self.span, mapping)?;
        Some(Step::AddMark(AddMarkStep::new(span, self.mark.clone())))
    }

    fn merge(&self, other: &Step) -> Option<Step> {
        match other {
            Step::AddMark(other)
                if other.mark == self.mark
                    && self.span.from <= other.span.to
                    && self.span.to >= other.span.from =>
            {
                let span = Span::new(
                    self.span.from.min(other.span.from),
                    self.span.to.max(other.span.to),
                );
                Some(Step::AddMark(AddMarkStep::new(span, self.mark.clone())))
            }
            _ => None,
        }
    }
}

impl StepKind for RemoveMarkStep {
    fn apply(&self, doc: &Node) -> StepResult {
        let old_slice = doc.slice(self.span.from..self.span.to, false)?;

        let new_content = map_fragment(&old_slice.content, &|node| {
            let marks = self.mark.remove_from_set(node.marks());
            node.mark(marks)
        });

        let slice = Slice::new(new_content, old_slice.open_start, old_slice.open_end);
        let new_node = doc.replace(self.span.from..self.span.to, &slice)?;
        Ok(new_node)
    }

    fn invert(&self, _doc: &Node) -> Result<Step, StepError> {
        Ok(Step::AddMark(AddMarkStep::new(self.span, self.mark.clone())))
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        let span = map_span(self.span, mapping)?;
        Some(Step::RemoveMark(RemoveMarkStep::new(span, self.mark.clone())))
    }

    fn merge(&self, other: &Step) -> Option<Step> {
        match other {
            Step::RemoveMark(other)
                if other.mark == self.mark
                    && self.span.from <= other.span.to
                    && self.span.to >= other.span.from =>
            {
                let span = Span::new(
                    self.span.from.min(other.span.from),
                    self.span.to.max(other.span.to),
                );
                Some(Step::RemoveMark(RemoveMarkStep::new(span, self.mark.clone())))
            }
            _ => None,
        }
    }
}

/// Replace the node at `pos` with a copy carrying different marks, keeping its content.
fn replace_markup(doc: &Node, pos: usize, updated: Node, node: &Node) -> StepResult {
    let open = if node.is_leaf() { 0 } else { 1 };
    let slice = Slice::new(Fragment::from(updated), 0, open);
    let new_node = doc.replace(pos..pos + 1, &slice)?;
    Ok(new_node)
}

/// Adding a mark to a specific node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, new)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeMarkStep {
    /// The position of the target node
    pub pos: usize,
    /// The mark to add
    pub mark: Mark,
}

impl StepKind for AddNodeMarkStep {
    fn apply(&self, doc: &Node) -> StepResult {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNode(self.pos))?;
        let marks = self.mark.add_to_set(node.marks());
        let updated = node.r#type().create(Some(node.attrs()), Fragment::new(), &marks)?;
        replace_markup(doc, self.pos, updated, node)
    }

    fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        if let Some(node) = doc.node_at(self.pos) {
            let new_set = self.mark.add_to_set(node.marks());
            if new_set.len() == node.marks().len() {
                let replaced = node.marks().iter().find(|m| !m.is_in_set(&new_set));
                let mark = replaced.unwrap_or(&self.mark).clone();
                return Ok(Step::AddNodeMark(AddNodeMarkStep::new(self.pos, mark)));
            }
        }
        Ok(Step::RemoveNodeMark(RemoveNodeMarkStep::new(
            self.pos,
            self.mark.clone(),
        )))
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        if pos.deleted_after() {
            None
        } else {
            Some(Step::AddNodeMark(AddNodeMarkStep::new(pos.pos, self.mark.clone())))
        }
    }
}

/// Removing a mark from a specific node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, new)]
#[serde(rename_all = "camelCase")]
pub struct RemoveNodeMarkStep {
    /// The position of the target node
    pub pos: usize,
    /// The mark to remove
    pub mark: Mark,
}

impl StepKind for RemoveNodeMarkStep {
    fn apply(&self, doc: &Node) -> StepResult {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNode(self.pos))?;
        let marks = self.mark.remove_from_set(node.marks());
        let updated = node.r#type().create(Some(node.attrs()), Fragment::new(), &marks)?;
        replace_markup(doc, self.pos, updated, node)
    }

    fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        match doc.node_at(self.pos) {
            Some(node) if self.mark.is_in_set(node.marks()) => Ok(Step::AddNodeMark(
                AddNodeMarkStep::new(self.pos, self.mark.clone()),
            )),
            _ => Ok(Step::RemoveNodeMark(self.clone())),
        }
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        if pos.deleted_after() {
            None
        } else {
            Some(Step::RemoveNodeMark(RemoveNodeMarkStep::new(
                pos.pos,
                self.mark.clone(),
            )))
        }
    }
}

#[derive(Deserialize)]
struct RawMarkStep {
    from: usize,
    to: usize,
    mark: Value,
}

#[derive(Deserialize)]
struct RawNodeMarkStep {
    pos: usize,
    mark: Value,
}

fn read_span(schema: &Schema, json: &Value) -> Result<(Span, Mark), JsonError> {
    let raw = RawMarkStep::deserialize(json)?;
    Ok((Span::new(raw.from, raw.to), Mark::from_json(schema, &raw.mark)?))
}

fn read_pos(schema: &Schema, json: &Value) -> Result<(usize, Mark), JsonError> {
    let raw = RawNodeMarkStep::deserialize(json)?;
    Ok((raw.pos, Mark::from_json(schema, &raw.mark)?))
}

pub(crate) fn parse_add_mark(schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let (span, mark) = read_span(schema, json)?;
    Ok(Step::AddMark(AddMarkStep::new(span, mark)))
}

pub(crate) fn parse_remove_mark(schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let (span, mark) = read_span(schema, json)?;
    Ok(Step::RemoveMark(RemoveMarkStep::new(span, mark)))
}

pub(crate) fn parse_add_node_mark(schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let (pos, mark) = read_pos(schema, json)?;
    Ok(Step::AddNodeMark(AddNodeMarkStep::new(pos, mark)))
}

pub(crate) fn parse_remove_node_mark(schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let (pos, mark) = read_pos(schema, json)?;
    Ok(Step::RemoveNodeMark(RemoveNodeMarkStep::new(pos, mark)))
}
