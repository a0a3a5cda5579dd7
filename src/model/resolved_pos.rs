use super::{Mark, MarkSet, Node};
use displaydoc::Display;
use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Position {pos} outside of fragment of size {size}
#[derive(Debug, Display, Error, Copy, Clone, PartialEq, Eq)]
pub struct IndexError {
    /// The position that was looked up
    pub pos: usize,
    /// The size of the fragment
    pub size: usize,
}

/// Errors at `resolve`
#[derive(Debug, Display, Error, Copy, Clone, PartialEq, Eq)]
pub enum ResolveErr {
    /// Position {pos} out of range
    RangeError {
        /// The position that was out of range
        pos: usize,
    },
    /// {0}
    Index(#[from] IndexError),
}

/// One level of the path from the root to a resolved position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    /// The ancestor node
    pub node: Node,
    /// The index of the position within this node
    pub index: usize,
    /// The absolute position before the child at `index`
    pub before: usize,
}

/// You can resolve a position to get more information about it. Objects of this class represent
/// such a resolved position, providing various pieces of context information, and some helper
/// methods.
///
/// Throughout this interface, methods that take an optional `depth` parameter will interpret
/// `self.depth` as the innermost level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPos {
    /// The position that was resolved.
    pub pos: usize,
    /// The number of levels the parent node is from the root. If this position points directly
    /// into the root node, it is 0. If it points into a top-level paragraph, 1, and so on.
    pub depth: usize,
    /// The offset this position has into its parent node.
    pub parent_offset: usize,
    path: Vec<ResolvedNode>,
}

impl ResolvedPos {
    pub(crate) fn new(pos: usize, path: Vec<ResolvedNode>, parent_offset: usize) -> Self {
        Self {
            depth: path.len() - 1,
            pos,
            path,
            parent_offset,
        }
    }

    /// The parent node that the position points into. Note that even if
    /// a position points into a text node, that node is not considered
    /// the parent; text nodes are flat in this model, and have no content.
    pub fn parent(&self) -> &Node {
        self.node(self.depth)
    }

    /// The root node in which the position was resolved.
    pub fn doc(&self) -> &Node {
        self.node(0)
    }

    /// The ancestor node at the given level. `p.node(p.depth)` is the same as `p.parent()`.
    pub fn node(&self, depth: usize) -> &Node {
        &self.path[depth].node
    }

    /// The index into the ancestor at the given level. If this points at the 3rd node in the
    /// 2nd paragraph on the top level, for example, `p.index(0)` is 1 and `p.index(1)` is 2.
    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// The index pointing after this position into the ancestor at the given level.
    pub fn index_after(&self, depth: usize) -> usize {
        let inside = depth == self.depth && self.text_offset() == 0;
        self.index(depth) + if inside { 0 } else { 1 }
    }

    /// The (absolute) position at the start of the node at the given level.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 {
            0
        } else {
            self.path[depth - 1].before + 1
        }
    }

    /// The (absolute) position at the end of the node at the given level.
    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content_size()
    }

    pub(crate) fn before_level(&self, depth: usize) -> usize {
        if depth == self.depth + 1 {
            self.pos
        } else {
            self.path[depth - 1].before
        }
    }

    pub(crate) fn after_level(&self, depth: usize) -> usize {
        if depth == self.depth + 1 {
            self.pos
        } else {
            self.path[depth - 1].before + self.path[depth].node.node_size()
        }
    }

    /// The (absolute) position directly before the wrapping node at the given level, or, when
    /// depth is `self.depth + 1`, the original position.
    pub fn before(&self, depth: usize) -> Option<usize> {
        if depth == 0 {
            None
        } else {
            Some(self.before_level(depth))
        }
    }

    /// The (absolute) position directly after the wrapping node at the given level, or the
    /// original position when depth is `self.depth + 1`.
    pub fn after(&self, depth: usize) -> Option<usize> {
        if depth == 0 {
            None
        } else {
            Some(self.after_level(depth))
        }
    }

    /// When this position points into a text node, this returns the distance between the
    /// position and the start of the text node. Will be zero for positions that point between
    /// nodes.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path[self.depth].before
    }

    /// Get the node directly after the position, if any. If the position points into a text node,
    /// only the part of that node after the position is returned.
    pub fn node_after(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth);
        let child = parent.maybe_child(index)?;
        let d_off = self.text_offset();
        if d_off > 0 {
            Some(child.cut(d_off..))
        } else {
            Some(child.clone())
        }
    }

    /// Get the node directly before the position, if any. If the position points into a text node,
    /// only the part of that node before the position is returned.
    pub fn node_before(&self) -> Option<Node> {
        let index = self.index(self.depth);
        let d_off = self.text_offset();
        if d_off > 0 {
            Some(self.parent().child(index).cut(0..d_off))
        } else if index == 0 {
            None
        } else {
            Some(self.parent().child(index - 1).clone())
        }
    }

    /// Get the position at the given index in the parent node at the given depth.
    pub fn pos_at_index(&self, index: usize, depth: usize) -> usize {
        let node = self.node(depth);
        let mut pos = self.start(depth);
        for i in 0..index {
            pos += node.child(i).node_size();
        }
        pos
    }

    /// Get the marks at this position, factoring in the surrounding marks' `inclusive` property.
    /// If the position is at the start of a non-empty node, the marks of the node after it (if
    /// any) are returned.
    pub fn marks(&self) -> MarkSet {
        let parent = self.parent();
        let index = self.index(self.depth);

        if parent.content_size() == 0 {
            return MarkSet::new();
        }

        if self.text_offset() > 0 {
            return parent.child(index).marks().to_vec();
        }

        let before = index.checked_sub(1).and_then(|i| parent.maybe_child(i));
        let after = parent.maybe_child(index);
        let (main, other) = match before {
            Some(before) => (before, after),
            None => match after {
                Some(after) => (after, None),
                None => return MarkSet::new(),
            },
        };
        drop_exclusive(main.marks(), other)
    }

    /// Get the marks after the current position, if any, except those that are non-inclusive and
    /// not present at position `end`. This is mostly useful for getting the set of marks to
    /// preserve after a deletion. Will return `None` if this position is at the end of its parent
    /// node or its parent node isn't a textblock (in which case no marks should be preserved).
    pub fn marks_across(&self, end: &ResolvedPos) -> Option<MarkSet> {
        let after = self.parent().maybe_child(self.index(self.depth))?;
        if !after.is_inline() {
            return None;
        }
        let next = end.parent().maybe_child(end.index(end.depth));
        Some(drop_exclusive(after.marks(), next))
    }

    /// The depth up to which this position and the given (non-resolved) position share the same
    /// parent nodes.
    pub fn shared_depth(&self, pos: usize) -> usize {
        for depth in (1..=self.depth).rev() {
            if self.start(depth) <= pos && self.end(depth) >= pos {
                return depth;
            }
        }
        0
    }

    /// Returns a range based on the place where this position and the given position diverge
    /// around block content. If both point into the same textblock, for example, a range around
    /// that textblock will be returned. If they point into different blocks, the range around
    /// those blocks in their shared ancestor is returned. You can pass in an optional predicate
    /// that will be called with a parent node to see if a range into that parent is acceptable.
    pub fn block_range(
        &self,
        other: Option<&ResolvedPos>,
        pred: Option<&dyn Fn(&Node) -> bool>,
    ) -> Option<NodeRange> {
        let other = other.unwrap_or(self);
        if other.pos < self.pos {
            return other.block_range(Some(self), pred);
        }
        let skip = self.parent().inline_content() || self.pos == other.pos;
        let top = self.depth as isize - if skip { 1 } else { 0 };
        for d in (0..=top).rev() {
            let d = d as usize;
            if other.pos <= self.end(d) && pred.map_or(true, |p| p(self.node(d))) {
                return Some(NodeRange::new(self.clone(), other.clone(), d));
            }
        }
        None
    }

    /// Query whether the given position shares the same parent node.
    pub fn same_parent(&self, other: &ResolvedPos) -> bool {
        self.pos - self.parent_offset == other.pos - other.parent_offset
    }

    /// Return the greater of this and the given position.
    pub fn max<'a>(&'a self, other: &'a ResolvedPos) -> &'a ResolvedPos {
        if other.pos > self.pos {
            other
        } else {
            self
        }
    }

    /// Return the smaller of this and the given position.
    pub fn min<'a>(&'a self, other: &'a ResolvedPos) -> &'a ResolvedPos {
        if other.pos < self.pos {
            other
        } else {
            self
        }
    }

    pub(crate) fn resolve(doc: &Node, pos: usize) -> Result<Self, ResolveErr> {
        if pos > doc.content_size() {
            return Err(ResolveErr::RangeError { pos });
        }
        let mut path = vec![];
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = doc.clone();

        loop {
            let Index { index, offset } = node.content().find_index(parent_offset, false)?;
            let rem = parent_offset - offset;
            let child = node.maybe_child(index).cloned();
            path.push(ResolvedNode {
                node,
                index,
                before: start + offset,
            });
            if rem == 0 {
                break;
            }
            node = match child {
                Some(child) if !child.is_text() => child,
                _ => break,
            };
            parent_offset = rem - 1;
            start += offset + 1;
        }
        Ok(ResolvedPos::new(pos, path, parent_offset))
    }

    /// The position at the start of the document. Never fails to resolve.
    pub(crate) fn doc_start(doc: &Node) -> Self {
        let path = vec![ResolvedNode {
            node: doc.clone(),
            index: 0,
            before: 0,
        }];
        ResolvedPos::new(0, path, 0)
    }

    /// The position at the end of the document. Never fails to resolve.
    pub(crate) fn doc_end(doc: &Node) -> Self {
        let size = doc.content_size();
        let path = vec![ResolvedNode {
            node: doc.clone(),
            index: doc.child_count(),
            before: size,
        }];
        ResolvedPos::new(size, path, size)
    }
}

fn drop_exclusive(marks: &[Mark], other: Option<&Node>) -> MarkSet {
    marks
        .iter()
        .filter(|m| {
            m.r#type().is_inclusive() || other.map_or(false, |o| m.is_in_set(o.marks()))
        })
        .cloned()
        .collect()
}

impl fmt::Display for ResolvedPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 1..=self.depth {
            if i > 1 {
                f.write_str("/")?;
            }
            write!(f, "{}_{}", self.node(i).r#type().name(), self.index(i - 1))?;
        }
        write!(f, ":{}", self.parent_offset)
    }
}

/// Represents a flat range of content, i.e. one that starts and ends in the same node.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct NodeRange {
    /// A resolved position along the start of the content. May have a `depth` greater than this
    /// object's `depth` property, since these are the positions that were used to compute the
    /// range, not re-resolved positions directly at its boundaries.
    pub from: ResolvedPos,
    /// A position along the end of the content.
    pub to: ResolvedPos,
    /// The depth of the node that this range points into.
    pub depth: usize,
}

impl NodeRange {
    /// The position at the start of the range.
    pub fn start(&self) -> usize {
        self.from.before_level(self.depth + 1)
    }

    /// The position at the end of the range.
    pub fn end(&self) -> usize {
        self.to.after_level(self.depth + 1)
    }

    /// The parent node that the range points into.
    pub fn parent(&self) -> &Node {
        self.from.node(self.depth)
    }

    /// The start index of the range in the parent node.
    pub fn start_index(&self) -> usize {
        self.from.index(self.depth)
    }

    /// The end index of the range in the parent node.
    pub fn end_index(&self) -> usize {
        self.to.index_after(self.depth)
    }
}

const CACHE_SIZE: usize = 12;

/// A small ring buffer of recently resolved positions, keyed by document identity and position.
#[derive(Debug, Default)]
pub struct ResolveCache {
    entries: Vec<ResolvedPos>,
    next: usize,
}

impl ResolveCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn resolve(&mut self, doc: &Node, pos: usize) -> Result<ResolvedPos, ResolveErr> {
        if let Some(hit) = self
            .entries
            .iter()
            .find(|e| e.pos == pos && Node::ptr_eq(e.doc(), doc))
        {
            trace!(pos, "resolve cache hit");
            return Ok(hit.clone());
        }
        let resolved = ResolvedPos::resolve(doc, pos)?;
        if self.entries.len() < CACHE_SIZE {
            self.entries.push(resolved.clone());
        } else {
            self.entries[self.next] = resolved.clone();
        }
        self.next = (self.next + 1) % CACHE_SIZE;
        Ok(resolved)
    }
}

/// A child index together with the offset of that child.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, new)]
pub struct Index {
    /// The index of the child
    pub index: usize,
    /// The position at which the child starts
    pub offset: usize,
}
