use super::util::{is_empty_slice, is_false};
use super::{Assoc, Mappable, Span, Step, StepError, StepKind, StepMap, StepResult};
use crate::model::{JsonError, Node, ResolveErr, Schema, Slice};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Replace some part of the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceStep {
    /// The affected span
    #[serde(flatten)]
    pub span: Span,
    /// The slice to replace the current content with
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub slice: Slice,
    /// Whether this is a structural change
    #[serde(skip_serializing_if = "is_false")]
    pub structure: bool,
}

impl ReplaceStep {
    /// The given `slice` should fit the 'gap' between `from` and `to`. When `structure` is
    /// true, the step will fail if the content between from and to is not just a sequence of
    /// closing and then opening tokens (this is to guard against rebased replace steps
    /// overwriting something they weren't supposed to).
    pub fn new(from: usize, to: usize, slice: Slice, structure: bool) -> Self {
        Self {
            span: Span::new(from, to),
            slice,
            structure,
        }
    }

    fn is_ordered(&self) -> bool {
        self.span.from <= self.span.to
    }
}

impl StepKind for ReplaceStep {
    fn apply(&self, doc: &Node) -> StepResult {
        let Span { from, to } = self.span;
        if !self.is_ordered() {
            return Err(StepError::InvalidRange);
        }
        if self.structure && content_between(doc, from, to)? {
            Err(StepError::WouldOverwrite)
        } else {
            let node = doc.replace(from..to, &self.slice)?;
            Ok(node)
        }
    }

    fn get_map(&self) -> StepMap {
        let Span { from, to } = self.span;
        StepMap::new(&[(from, to - from, self.slice.size())], false)
    }

    fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        let from = self.span.from;
        let old = doc.slice(from..self.span.to, false)?;
        Ok(Step::Replace(ReplaceStep::new(
            from,
            from + self.slice.size(),
            old,
            false,
        )))
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        let from = mapping.map_result(self.span.from, Assoc::After);
        let to = mapping.map_result(self.span.to, Assoc::Before);
        if from.deleted_across() && to.deleted_across() {
            return None;
        }
        Some(Step::Replace(ReplaceStep::new(
            from.pos,
            from.pos.max(to.pos),
            self.slice.clone(),
            self.structure,
        )))
    }

    fn merge(&self, other: &Step) -> Option<Step> {
        let other = match other {
            Step::Replace(other) if !other.structure && !self.structure => other,
            _ => return None,
        };
        let (a, b) = (&self.slice, &other.slice);
        let empty = a.size() + b.size() == 0;
        if self.span.from + a.size() == other.span.from && a.open_end == 0 && b.open_start == 0 {
            let slice = if empty {
                Slice::empty()
            } else {
                Slice::new(a.content.append(b.content.clone()), a.open_start, b.open_end)
            };
            let to = self.span.to + (other.span.to - other.span.from);
            Some(Step::Replace(ReplaceStep::new(self.span.from, to, slice, false)))
        } else if other.span.to == self.span.from && a.open_start == 0 && b.open_end == 0 {
            let slice = if empty {
                Slice::empty()
            } else {
                Slice::new(b.content.append(a.content.clone()), b.open_start, a.open_end)
            };
            Some(Step::Replace(ReplaceStep::new(
                other.span.from,
                self.span.to,
                slice,
                false,
            )))
        } else {
            None
        }
    }
}

/// Replace the document structure while keeping some content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAroundStep {
    /// The affected part of the document
    #[serde(flatten)]
    pub span: Span,
    /// Start of the gap
    pub gap_from: usize,
    /// End of the gap
    pub gap_to: usize,
    /// The inner slice
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub slice: Slice,
    /// The position in the slice where the gap content is inserted
    pub insert: usize,
    /// Whether this is a structural change
    #[serde(skip_serializing_if = "is_false")]
    pub structure: bool,
}

impl ReplaceAroundStep {
    /// Create a replace-around step with the given range and gap. `insert` should be the
    /// point in the slice into which the content of the gap should be moved. `structure` has
    /// the same meaning as it has in the [`ReplaceStep`] type.
    pub fn new(
        span: Span,
        gap_from: usize,
        gap_to: usize,
        slice: Slice,
        insert: usize,
        structure: bool,
    ) -> Self {
        Self {
            span,
            gap_from,
            gap_to,
            slice,
            insert,
            structure,
        }
    }

    /// `from <= gap_from <= gap_to <= to`, and `insert` lies within the slice.
    fn is_ordered(&self) -> bool {
        self.span.from <= self.gap_from
            && self.gap_from <= self.gap_to
            && self.gap_to <= self.span.to
            && self.insert <= self.slice.size()
    }
}

impl StepKind for ReplaceAroundStep {
    fn apply(&self, doc: &Node) -> StepResult {
        if !self.is_ordered() {
            return Err(StepError::InvalidRange);
        }
        if self.structure
            && (content_between(doc, self.span.from, self.gap_from)?
                || content_between(doc, self.gap_to, self.span.to)?)
        {
            return Err(StepError::GapWouldOverwrite);
        }

        let gap = doc.slice(self.gap_from..self.gap_to, false)?;
        if gap.open_start != 0 || gap.open_end != 0 {
            return Err(StepError::GapNotFlat);
        }

        let inserted = self.slice.insert_at(self.insert, gap.content)?;
        let inserted = inserted.ok_or(StepError::GapNotFit)?;

        let result = doc.replace(self.span.from..self.span.to, &inserted)?;
        Ok(result)
    }

    fn get_map(&self) -> StepMap {
        let Span { from, to } = self.span;
        StepMap::new(
            &[
                (from, self.gap_from - from, self.insert),
                (self.gap_to, to - self.gap_to, self.slice.size() - self.insert),
            ],
            false,
        )
    }

    fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        let Span { from, to } = self.span;
        let gap = self.gap_to - self.gap_from;
        let removed = doc
            .slice(from..to, false)?
            .remove_between(self.gap_from - from, self.gap_to - from)?;
        Ok(Step::ReplaceAround(ReplaceAroundStep::new(
            Span::new(from, from + self.slice.size() + gap),
            from + self.insert,
            from + self.insert + gap,
            removed,
            self.gap_from - from,
            self.structure,
        )))
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        let from = mapping.map_result(self.span.from, Assoc::After);
        let to = mapping.map_result(self.span.to, Assoc::Before);
        let gap_from = if self.span.from == self.gap_from {
            from.pos
        } else {
            mapping.map(self.gap_from, Assoc::Before)
        };
        let gap_to = if self.span.to == self.gap_to {
            to.pos
        } else {
            mapping.map(self.gap_to, Assoc::After)
        };
        if (from.deleted_across() && to.deleted_across()) || gap_from < from.pos || gap_to > to.pos
        {
            return None;
        }
        Some(Step::ReplaceAround(ReplaceAroundStep::new(
            Span::new(from.pos, to.pos),
            gap_from,
            gap_to,
            self.slice.clone(),
            self.insert,
            self.structure,
        )))
    }
}

/// Whether there is anything but closing and opening tokens between the two positions.
fn content_between(doc: &Node, from: usize, to: usize) -> Result<bool, ResolveErr> {
    let rp_from = doc.resolve(from)?;
    let mut dist = to.saturating_sub(from);
    let mut depth = rp_from.depth;
    while dist > 0 && depth > 0 && rp_from.index_after(depth) == rp_from.node(depth).child_count() {
        depth -= 1;
        dist -= 1;
    }
    if dist > 0 {
        let mut next = rp_from.node(depth).maybe_child(rp_from.index_after(depth));
        while dist > 0 {
            match next {
                Some(c) if !c.is_leaf() => {
                    next = c.first_child();
                    dist -= 1;
                }
                _ => return Ok(true),
            }
        }
    }
    Ok(false)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReplace {
    from: usize,
    to: usize,
    #[serde(default)]
    slice: Value,
    #[serde(default)]
    structure: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReplaceAround {
    from: usize,
    to: usize,
    gap_from: usize,
    gap_to: usize,
    #[serde(default)]
    slice: Value,
    insert: usize,
    #[serde(default)]
    structure: bool,
}

pub(crate) fn parse_replace(schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let raw = RawReplace::deserialize(json)?;
    let slice = Slice::from_json(schema, &raw.slice)?;
    let step = ReplaceStep::new(raw.from, raw.to, slice, raw.structure);
    if !step.is_ordered() {
        return Err(JsonError::Invalid("ReplaceStep"));
    }
    Ok(Step::Replace(step))
}

pub(crate) fn parse_replace_around(schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let raw = RawReplaceAround::deserialize(json)?;
    let slice = Slice::from_json(schema, &raw.slice)?;
    let step = ReplaceAroundStep::new(
        Span::new(raw.from, raw.to),
        raw.gap_from,
        raw.gap_to,
        slice,
        raw.insert,
        raw.structure,
    );
    if !step.is_ordered() {
        return Err(JsonError::Invalid("ReplaceAroundStep"));
    }
    Ok(Step::ReplaceAround(step))
}
