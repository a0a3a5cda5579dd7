use super::{util, Fragment, Index, IndexError, Node, NodeType, ResolveErr, ResolvedPos};
use displaydoc::Display;
use std::fmt;
use std::ops::RangeBounds;
use thiserror::Error;

/// A slice represents a piece cut out of a larger document. It stores not only a fragment, but
/// also the depth up to which nodes on both side are "open" (cut through).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slice {
    /// The slice's content.
    pub content: Fragment,
    /// The open depth at the start.
    pub open_start: usize,
    /// The open depth at the end.
    pub open_end: usize,
}

impl Slice {
    /// Create a slice. When specifying a non-zero open depth, you must
    /// make sure that there are nodes of at least that depth at the
    /// appropriate side of the fragment, i.e. if the fragment is an empty
    /// paragraph node, `open_start` and `open_end` can't be greater than 1.
    ///
    /// It is not necessary for the content of open nodes to conform to
    /// the schema's content constraints, though it should be a valid
    /// start/end/middle for such a node, depending on which sides are
    /// open.
    pub fn new(content: Fragment, open_start: usize, open_end: usize) -> Slice {
        Slice {
            content,
            open_start,
            open_end,
        }
    }

    /// The empty slice.
    pub fn empty() -> Slice {
        Slice::default()
    }

    /// The size this slice would add when inserted into a document.
    pub fn size(&self) -> usize {
        self.content.size() - self.open_start - self.open_end
    }

    /// Insert a fragment at the given position (relative to the slice's content). Returns
    /// `None` when the result would not be valid.
    pub fn insert_at(&self, pos: usize, fragment: Fragment) -> Result<Option<Slice>, IndexError> {
        let content = insert_into(&self.content, pos + self.open_start, fragment, None)?;
        Ok(content.map(|c| Slice::new(c, self.open_start, self.open_end)))
    }

    /// Remove the content between the given positions (relative to the slice's content).
    pub fn remove_between(&self, from: usize, to: usize) -> Result<Slice, ReplaceError> {
        let content = remove_range(&self.content, from + self.open_start, to + self.open_start)?;
        Ok(Slice::new(content, self.open_start, self.open_end))
    }

    /// Create a slice from a fragment by taking the maximum possible open value on both side of
    /// the fragment.
    pub fn max_open(fragment: Fragment, open_isolating: bool) -> Slice {
        let opens = |n: &Node| !n.is_leaf() && (open_isolating || !n.r#type().spec().isolating);
        let mut open_start = 0;
        let mut node = fragment.first_child();
        while let Some(n) = node.filter(|n| opens(n)) {
            open_start += 1;
            node = n.first_child();
        }
        let mut open_end = 0;
        let mut node = fragment.last_child();
        while let Some(n) = node.filter(|n| opens(n)) {
            open_end += 1;
            node = n.last_child();
        }
        Slice::new(fragment, open_start, open_end)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.content, self.open_start, self.open_end)
    }
}

/// An error that can occur when replacing a slice
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ReplaceError {
    /// Inserted content deeper than insertion position
    InsertTooDeep,
    /// Inconsistent open depths
    InconsistentOpenDepths {
        /// Depth at the start
        from_depth: usize,
        /// How many nodes are "open" at the start
        open_start: usize,
        /// Depth at the end
        to_depth: usize,
        /// How many nodes are "open" at the end
        open_end: usize,
    },
    /// Could not resolve a position: {0}
    Resolve(#[from] ResolveErr),
    /// Could not find an index: {0}
    Index(#[from] IndexError),
    /// Cannot join {0} onto {1}
    CannotJoin(NodeType, NodeType),
    /// Invalid content for node {0}
    InvalidContent(NodeType),
    /// Removing non-flat range
    RemovingNonFlat,
}

fn remove_range(content: &Fragment, from: usize, to: usize) -> Result<Fragment, ReplaceError> {
    let Index { index, offset } = content.find_index(from, false)?;
    let child = content.maybe_child(index);
    let Index {
        index: index_to,
        offset: offset_to,
    } = content.find_index(to, false)?;
    match child {
        Some(child) if offset != from && !child.is_text() => {
            if index != index_to {
                return Err(ReplaceError::RemovingNonFlat);
            }
            let inner = remove_range(child.content(), from - offset - 1, to - offset - 1)?;
            Ok(content.replace_child(index, child.copy(inner)))
        }
        _ => {
            let flat_end = offset_to == to || content.maybe_child(index_to).map_or(false, Node::is_text);
            if !flat_end {
                return Err(ReplaceError::RemovingNonFlat);
            }
            Ok(content.cut(..from).append(content.cut(to..)))
        }
    }
}

pub(crate) fn insert_into(
    content: &Fragment,
    dist: usize,
    insert: Fragment,
    parent: Option<&Node>,
) -> Result<Option<Fragment>, IndexError> {
    let Index { index, offset } = content.find_index(dist, false)?;
    match content.maybe_child(index) {
        Some(child) if offset != dist && !child.is_text() => {
            let inner = insert_into(child.content(), dist - offset - 1, insert, Some(child))?;
            Ok(inner.map(|i| content.replace_child(index, child.copy(i))))
        }
        _ => {
            if let Some(p) = parent {
                if !p.can_replace(index, index, &insert, 0, insert.child_count()) {
                    return Ok(None);
                }
            }
            Ok(Some(
                content.cut(..dist).append(insert).append(content.cut(dist..)),
            ))
        }
    }
}

impl Node {
    /// Replace the part of the document between the given positions with the given slice. The
    /// slice must 'fit', meaning its open sides must be able to connect to the surrounding
    /// content, and its content nodes must be valid children for the node they are placed into.
    /// If any of this is violated, an error of type `ReplaceError` is returned.
    pub fn replace<R: RangeBounds<usize>>(&self, range: R, slice: &Slice) -> Result<Node, ReplaceError> {
        let from = util::from(&range);
        let to = util::to(&range, self.content_size());
        let rp_from = self.resolve(from)?;
        let rp_to = self.resolve(to)?;
        replace(&rp_from, &rp_to, slice)
    }
}

pub(crate) fn replace(
    rp_from: &ResolvedPos,
    rp_to: &ResolvedPos,
    slice: &Slice,
) -> Result<Node, ReplaceError> {
    if slice.open_start > rp_from.depth {
        Err(ReplaceError::InsertTooDeep)
    } else if slice.open_end > rp_to.depth
        || rp_from.depth - slice.open_start != rp_to.depth - slice.open_end
    {
        Err(ReplaceError::InconsistentOpenDepths {
            from_depth: rp_from.depth,
            open_start: slice.open_start,
            to_depth: rp_to.depth,
            open_end: slice.open_end,
        })
    } else {
        replace_outer(rp_from, rp_to, slice, 0)
    }
}

fn replace_outer(
    rp_from: &ResolvedPos,
    rp_to: &ResolvedPos,
    slice: &Slice,
    depth: usize,
) -> Result<Node, ReplaceError> {
    let index = rp_from.index(depth);
    let node = rp_from.node(depth);
    if index == rp_to.index(depth) && depth < rp_from.depth - slice.open_start {
        // Both ends are in the same child and no open node has been reached yet
        let inner = replace_outer(rp_from, rp_to, slice, depth + 1)?;
        Ok(node.copy(node.content().replace_child(index, inner)))
    } else if slice.content.size() == 0 {
        let content = replace_two_way(rp_from, rp_to, depth)?;
        close(node, content)
    } else if slice.open_start == 0
        && slice.open_end == 0
        && rp_from.depth == depth
        && rp_to.depth == depth
    {
        // Simple, flat case
        let parent = rp_from.parent();
        let content = parent.content();
        let new_content = content
            .cut(..rp_from.parent_offset)
            .append(slice.content.clone())
            .append(content.cut(rp_to.parent_offset..));
        close(parent, new_content)
    } else {
        let (rp_start, rp_end) = prepare_slice_for_replace(slice, rp_from)?;
        let content = replace_three_way(rp_from, &rp_start, &rp_end, rp_to, depth)?;
        close(node, content)
    }
}

fn check_join(main: &Node, sub: &Node) -> Result<(), ReplaceError> {
    if sub.r#type().compatible_content(main.r#type()) {
        Ok(())
    } else {
        Err(ReplaceError::CannotJoin(
            sub.r#type().clone(),
            main.r#type().clone(),
        ))
    }
}

fn joinable<'a>(
    rp_before: &'a ResolvedPos,
    rp_after: &ResolvedPos,
    depth: usize,
) -> Result<&'a Node, ReplaceError> {
    let node = rp_before.node(depth);
    check_join(node, rp_after.node(depth))?;
    Ok(node)
}

fn add_node(child: Node, target: &mut Vec<Node>) {
    if let Some(last) = target.last_mut() {
        if let (Some(a), Some(b)) = (last.text(), child.text()) {
            if child.same_markup(last) {
                *last = child.with_text(format!("{}{}", a, b));
                return;
            }
        }
    }
    target.push(child);
}

/// Copy the children of the ancestor at `depth` between `start` and `end` into `target`,
/// including the partial text nodes the positions cut through. A missing bound stands for the
/// edge of that ancestor.
fn add_range(
    start: Option<&ResolvedPos>,
    end: Option<&ResolvedPos>,
    depth: usize,
    target: &mut Vec<Node>,
) {
    let node = match end.or(start) {
        Some(pos) => pos.node(depth),
        None => return,
    };
    let end_index = end.map_or(node.child_count(), |pos| pos.index(depth));

    let mut start_index = 0;
    if let Some(start) = start {
        start_index = start.index(depth);
        if start.depth > depth {
            start_index += 1;
        } else if start.text_offset() > 0 {
            if let Some(after) = start.node_after() {
                add_node(after, target);
            }
            start_index += 1;
        }
    }
    for i in start_index..end_index {
        add_node(node.child(i).clone(), target);
    }
    if let Some(end) = end {
        if end.depth == depth && end.text_offset() > 0 {
            if let Some(before) = end.node_before() {
                add_node(before, target);
            }
        }
    }
}

fn close(node: &Node, content: Fragment) -> Result<Node, ReplaceError> {
    let node_type = node.r#type();
    if node_type.valid_content(&content) {
        Ok(node.copy(content))
    } else {
        Err(ReplaceError::InvalidContent(node_type.clone()))
    }
}

fn replace_three_way(
    rp_from: &ResolvedPos,
    rp_start: &ResolvedPos,
    rp_end: &ResolvedPos,
    rp_to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let open_start = if rp_from.depth > depth {
        Some(joinable(rp_from, rp_start, depth + 1)?)
    } else {
        None
    };
    let open_end = if rp_to.depth > depth {
        Some(joinable(rp_end, rp_to, depth + 1)?)
    } else {
        None
    };

    let mut content = Vec::new();
    add_range(None, Some(rp_from), depth, &mut content);
    match (open_start, open_end) {
        (Some(os), Some(oe)) if rp_start.index(depth) == rp_end.index(depth) => {
            check_join(os, oe)?;
            let inner = replace_three_way(rp_from, rp_start, rp_end, rp_to, depth + 1)?;
            add_node(close(os, inner)?, &mut content);
        }
        _ => {
            if let Some(os) = open_start {
                let inner = replace_two_way(rp_from, rp_start, depth + 1)?;
                add_node(close(os, inner)?, &mut content);
            }
            add_range(Some(rp_start), Some(rp_end), depth, &mut content);
            if let Some(oe) = open_end {
                let inner = replace_two_way(rp_end, rp_to, depth + 1)?;
                add_node(close(oe, inner)?, &mut content);
            }
        }
    }
    add_range(Some(rp_to), None, depth, &mut content);
    Ok(Fragment::from(content))
}

fn replace_two_way(
    rp_from: &ResolvedPos,
    rp_to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let mut content = Vec::new();
    add_range(None, Some(rp_from), depth, &mut content);
    if rp_from.depth > depth {
        let r#type = joinable(rp_from, rp_to, depth + 1)?;
        let inner = replace_two_way(rp_from, rp_to, depth + 1)?;
        add_node(close(r#type, inner)?, &mut content);
    }
    add_range(Some(rp_to), None, depth, &mut content);
    Ok(Fragment::from(content))
}

fn prepare_slice_for_replace(
    slice: &Slice,
    rp_along: &ResolvedPos,
) -> Result<(ResolvedPos, ResolvedPos), ResolveErr> {
    let extra = rp_along.depth - slice.open_start;
    let parent = rp_along.node(extra);
    let mut node = parent.copy(slice.content.clone());
    for i in (0..extra).rev() {
        node = rp_along.node(i).copy(Fragment::from(node));
    }
    let start = node.resolve(slice.open_start + extra)?;
    let end = node.resolve(node.content_size() - slice.open_end - extra)?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::{ReplaceError, Slice};
    use crate::markdown::helper::{blockquote, doc, h1, li, p, ul};
    use crate::markdown::schema;
    use crate::model::{Fragment, Node};
    use std::ops::Range;

    fn rpl(doc: Node, range: Range<usize>, insert: Option<(Node, Range<usize>)>, expected: Node) {
        let slice = insert
            .map(|(n, r)| n.slice(r, false).unwrap())
            .unwrap_or_default();
        assert_eq!(doc.replace(range, &slice), Ok(expected));
    }

    fn bad(doc: Node, range: Range<usize>, insert: Option<(Node, Range<usize>)>, pattern: ReplaceError) {
        let slice = insert
            .map(|(n, r)| n.slice(r, false).unwrap())
            .unwrap_or_default();
        assert_eq!(doc.replace(range, &slice), Err(pattern));
    }

    #[test]
    fn join_on_delete() {
        rpl(doc((p("one"), p("two"))), 3..7, None, doc(p("onwo")));
    }

    #[test]
    fn merges_matching_blocks() {
        let inserted = doc((p("xxxx"), p("yyyy")));
        assert_eq!(
            inserted.slice(3..9, false),
            Ok(Slice::new(Fragment::from(vec![p("xx"), p("yy")]), 1, 1))
        );
        rpl(
            doc((p("one"), p("two"))),
            3..7,
            Some((inserted, 3..9)),
            doc((p("onxx"), p("yywo"))),
        );
    }

    #[test]
    fn merges_when_adding_text() {
        rpl(
            doc((p("one"), p("two"))),
            3..7,
            Some((doc(p("H")), 1..2)),
            doc(p("onHwo")),
        );
    }

    #[test]
    fn can_insert_text() {
        rpl(
            doc((p("before"), p("one"), p("after"))),
            11..11,
            Some((doc(p("H")), 1..2)),
            doc((p("before"), p("onHe"), p("after"))),
        );
    }

    #[test]
    fn doesnt_merge_non_matching_blocks() {
        rpl(
            doc((p("one"), p("two"))),
            3..7,
            Some((doc(h1("H")), 1..2)),
            doc(p("onHwo")),
        );
    }

    #[test]
    fn can_merge_a_nested_node() {
        rpl(
            doc(blockquote(blockquote((p("one"), p("two"))))),
            5..9,
            Some((doc(p("H")), 1..2)),
            doc(blockquote(blockquote(p("onHwo")))),
        );
    }

    #[test]
    fn can_replace_within_a_block() {
        rpl(
            doc(blockquote(p("abcd"))),
            3..5,
            Some((doc(p("xyz")), 2..3)),
            doc(blockquote(p("ayd"))),
        );
    }

    #[test]
    fn can_insert_a_lopsided_slice() {
        rpl(
            doc(blockquote(blockquote((p("one"), p("two"), p("three"))))),
            5..12,
            Some((doc(blockquote((p("aaaa"), p("bb"), p("cc"), p("dd")))), 4..15)),
            doc(blockquote(blockquote((p("onaa"), p("bb"), p("cc"), p("three"))))),
        );
    }

    #[test]
    fn can_insert_a_deep_lopsided_slice() {
        rpl(
            doc(blockquote((blockquote((p("one"), p("two"), p("three"))), p("x")))),
            5..20,
            Some((doc((blockquote((p("aaaa"), p("bb"), p("cc"))), p("dd"))), 4..16)),
            doc(blockquote((blockquote((p("onaa"), p("bb"), p("cc"))), p("x")))),
        );
    }

    #[test]
    fn can_merge_multiple_levels() {
        rpl(
            doc((blockquote(blockquote(p("hello"))), blockquote(blockquote(p("a"))))),
            7..14,
            None,
            doc(blockquote(blockquote(p("hella")))),
        );
    }

    #[test]
    fn can_merge_multiple_levels_while_inserting() {
        rpl(
            doc((blockquote(blockquote(p("hello"))), blockquote(blockquote(p("a"))))),
            7..14,
            Some((doc(p("i")), 1..2)),
            doc(blockquote(blockquote(p("hellia")))),
        );
    }

    #[test]
    fn can_insert_a_split() {
        rpl(
            doc(p("foobar")),
            4..4,
            Some((doc((p("x"), p("y"))), 1..5)),
            doc((p("foox"), p("ybar"))),
        );
    }

    #[test]
    fn can_insert_a_deep_split() {
        rpl(
            doc(blockquote(p("fooxbar"))),
            5..6,
            Some((doc((blockquote(p("x")), blockquote(p("y")))), 2..8)),
            doc((blockquote(p("foox")), blockquote(p("ybar")))),
        );
    }

    #[test]
    fn can_add_a_split_one_level_up() {
        rpl(
            doc(blockquote((p("foou"), p("vbar")))),
            5..9,
            Some((doc((blockquote(p("x")), blockquote(p("y")))), 2..8)),
            doc((blockquote(p("foox")), blockquote(p("ybar")))),
        );
    }

    #[test]
    fn keeps_the_node_type_of_the_left_node() {
        rpl(
            doc(h1("foobar")),
            4..8,
            Some((doc(p("foobaz")), 4..8)),
            doc(h1("foobaz")),
        );
    }

    #[test]
    fn keeps_the_node_type_even_when_empty() {
        rpl(
            doc(h1("bar")),
            1..5,
            Some((doc(p("foobaz")), 4..8)),
            doc(h1("baz")),
        );
    }

    #[test]
    fn doesnt_allow_the_left_side_to_be_too_deep() {
        bad(
            doc(p("")),
            1..1,
            Some((doc(blockquote(p(""))), 2..4)),
            ReplaceError::InsertTooDeep,
        );
    }

    #[test]
    fn doesnt_allow_a_depth_mismatch() {
        bad(
            doc(p("")),
            1..1,
            Some((doc(p("")), 0..1)),
            ReplaceError::InconsistentOpenDepths {
                from_depth: 1,
                open_start: 0,
                to_depth: 1,
                open_end: 1,
            },
        );
    }

    #[test]
    fn rejects_a_bad_fit() {
        let s = schema();
        bad(
            doc(()),
            0..0,
            Some((doc(p("foo")), 1..4)),
            ReplaceError::InvalidContent(s.node_type("doc").unwrap()),
        );
    }

    #[test]
    fn rejects_unjoinable_content() {
        let s = schema();
        bad(
            doc(ul(li(p("a")))),
            6..7,
            Some((doc(p("foo")), 4..5)),
            ReplaceError::CannotJoin(
                s.node_type("paragraph").unwrap(),
                s.node_type("bullet_list").unwrap(),
            ),
        );
    }

    #[test]
    fn rejects_an_unjoinable_delete() {
        let s = schema();
        bad(
            doc((blockquote(p("a")), ul(li(p("b"))))),
            4..6,
            None,
            ReplaceError::CannotJoin(
                s.node_type("bullet_list").unwrap(),
                s.node_type("blockquote").unwrap(),
            ),
        );
    }

    #[test]
    fn check_content_validity() {
        let s = schema();
        bad(
            doc(blockquote(p("hi"))),
            1..6,
            Some((doc(blockquote("hi")), 3..4)),
            ReplaceError::InvalidContent(s.node_type("blockquote").unwrap()),
        );
    }

    #[test]
    fn max_open_and_slice_edits() {
        let content = doc((blockquote(p("a")), p("b"))).content().clone();
        let slice = Slice::max_open(content, true);
        assert_eq!((slice.open_start, slice.open_end), (2, 1));
        assert_eq!(slice.size(), 5);

        let slice = doc(p("abcd")).slice(2..4, false).unwrap();
        assert_eq!(slice.remove_between(0, 1).unwrap().to_string(), "<\"c\">(0,0)");
        let inserted = slice.insert_at(1, Fragment::from(p("x").child(0).clone())).unwrap();
        assert_eq!(inserted.unwrap().to_string(), "<\"bxc\">(0,0)");
    }
}
