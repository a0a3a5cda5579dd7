use super::{
    Assoc, Mappable, ReplaceAroundStep, ReplaceStep, Span, Step, Transform, TransformError,
};
use crate::model::{Attrs, Fragment, Mark, Node, NodeRange, NodeType, ResolveErr, Slice};

/// A node type to wrap content in, with optional attributes.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Wrapper {
    /// The type of the wrapping node
    pub r#type: NodeType,
    /// The attributes, defaults are used when `None`
    pub attrs: Option<Attrs>,
}

impl From<NodeType> for Wrapper {
    fn from(r#type: NodeType) -> Self {
        Wrapper::new(r#type, None)
    }
}

fn can_cut(node: &Node, start: usize, end: usize) -> bool {
    let empty = Fragment::new();
    (start == 0 || node.can_replace(start, node.child_count(), &empty, 0, 0))
        && (end == node.child_count() || node.can_replace(0, end, &empty, 0, 0))
}

/// Try to find a target depth to which the content in the given range can be lifted. Will not
/// go across isolating parent nodes.
pub fn lift_target(range: &NodeRange) -> Option<usize> {
    let parent = range.parent();
    let content = parent
        .content()
        .cut_by_index(range.start_index(), range.end_index());
    let mut depth = range.depth;
    loop {
        let node = range.from.node(depth);
        let index = range.from.index(depth);
        let end_index = range.to.index_after(depth);
        if depth < range.depth
            && node.can_replace(index, end_index, &content, 0, content.child_count())
        {
            return Some(depth);
        }
        if depth == 0 || node.r#type().spec().isolating || !can_cut(node, index, end_index) {
            return None;
        }
        depth -= 1;
    }
}

/// Try to find a valid way to wrap the content in the given range in a node of the given type.
/// May introduce extra nodes around and inside the wrapper node, if necessary. Returns `None`
/// if no valid wrapping could be found. When `inner_range` is given, that range's content is
/// used as the content to fit into the wrapping, instead of the content of `range`.
pub fn find_wrapping(
    range: &NodeRange,
    node_type: &NodeType,
    attrs: Option<&Attrs>,
    inner_range: Option<&NodeRange>,
) -> Option<Vec<Wrapper>> {
    let inner_range = inner_range.unwrap_or(range);
    let around = find_wrapping_outside(range, node_type)?;
    let inner = find_wrapping_inside(inner_range, node_type)?;
    let mut wrappers: Vec<Wrapper> = around.into_iter().map(Wrapper::from).collect();
    wrappers.push(Wrapper::new(node_type.clone(), attrs.cloned()));
    wrappers.extend(inner.into_iter().map(Wrapper::from));
    Some(wrappers)
}

fn find_wrapping_outside(range: &NodeRange, r#type: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let start_index = range.start_index();
    let end_index = range.end_index();
    let around = parent
        .content_match_at(start_index)
        .ok()?
        .find_wrapping(r#type)?;
    let outer = around.first().unwrap_or(r#type);
    if parent.can_replace_with(start_index, end_index, outer, None) {
        Some(around)
    } else {
        None
    }
}

fn find_wrapping_inside(range: &NodeRange, r#type: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let start_index = range.start_index();
    let end_index = range.end_index();
    let inner = parent.child(start_index);
    let inside = r#type.content_match().find_wrapping(inner.r#type())?;
    let last_type = inside.last().unwrap_or(r#type);
    let mut inner_match = Some(last_type.content_match());
    for i in start_index..end_index {
        inner_match = inner_match.and_then(|m| m.match_type(parent.child(i).r#type()));
    }
    match inner_match {
        Some(m) if m.valid_end() => Some(inside),
        _ => None,
    }
}

fn can_change_type(doc: &Node, pos: usize, r#type: &NodeType) -> Result<bool, ResolveErr> {
    let rp = doc.resolve(pos)?;
    let index = rp.index(rp.depth);
    Ok(rp.parent().can_replace_with(index, index + 1, r#type, None))
}

/// Check whether splitting at the given position is allowed.
///
/// `types_after` can hold the node types (with attributes) to use after the split, innermost
/// last. A `None` entry keeps the type of the node being split.
pub fn can_split(doc: &Node, pos: usize, depth: usize, types_after: &[Option<Wrapper>]) -> bool {
    let rp = match doc.resolve(pos) {
        Ok(rp) => rp,
        Err(_) => return false,
    };
    let base = match rp.depth.checked_sub(depth) {
        Some(base) if depth > 0 => base,
        _ => return false,
    };
    let wrapper_at = |i: usize| types_after.get(i).and_then(Option::as_ref);

    let parent = rp.parent();
    let inner_type = match types_after.last().and_then(Option::as_ref) {
        Some(w) => w.r#type.clone(),
        None => parent.r#type().clone(),
    };
    let index = rp.index(rp.depth);
    if parent.r#type().spec().isolating
        || !parent.can_replace(index, parent.child_count(), &Fragment::new(), 0, 0)
        || !inner_type.valid_content(&parent.content().cut_by_index(index, parent.child_count()))
    {
        return false;
    }

    for d in (base + 1..rp.depth).rev() {
        let i = d - base - 1;
        let node = rp.node(d);
        let index = rp.index(d);
        if node.r#type().spec().isolating {
            return false;
        }
        let mut rest = node.content().cut_by_index(index, node.child_count());
        if let Some(w) = wrapper_at(i + 1) {
            let replacement = match w.r#type.create(w.attrs.as_ref(), Fragment::new(), &[]) {
                Ok(node) => node,
                Err(_) => return false,
            };
            rest = if rest.child_count() > 0 {
                rest.replace_child(0, replacement)
            } else {
                Fragment::from(replacement)
            };
        }
        let after = match wrapper_at(i) {
            Some(w) => w.r#type.clone(),
            None => node.r#type().clone(),
        };
        if !node.can_replace(index + 1, node.child_count(), &Fragment::new(), 0, 0)
            || !after.valid_content(&rest)
        {
            return false;
        }
    }

    let index = rp.index_after(base);
    let base_type = match wrapper_at(0) {
        Some(w) => w.r#type.clone(),
        None => rp.node(base + 1).r#type().clone(),
    };
    rp.node(base).can_replace_with(index, index, &base_type, None)
}

fn joinable(a: Option<&Node>, b: Option<&Node>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.is_leaf() && a.can_append(b),
        _ => false,
    }
}

/// Test whether the blocks before and after a given position can be joined.
pub fn can_join(doc: &Node, pos: usize) -> bool {
    let rp = match doc.resolve(pos) {
        Ok(rp) => rp,
        Err(_) => return false,
    };
    let index = rp.index(rp.depth);
    joinable(rp.node_before().as_ref(), rp.node_after().as_ref())
        && rp.parent().can_replace(index, index + 1, &Fragment::new(), 0, 0)
}

/// Find an ancestor of the given position that can be joined to the block before it (with
/// [`Assoc::Before`]) or after it (with [`Assoc::After`]).
pub fn join_point(doc: &Node, pos: usize, dir: Assoc) -> Option<usize> {
    let rp = doc.resolve(pos).ok()?;
    let mut pos = pos;
    let mut d = rp.depth;
    loop {
        let node = rp.node(d);
        let mut index = rp.index(d);
        let (before, after) = if d == rp.depth {
            (rp.node_before(), rp.node_after())
        } else if dir == Assoc::After {
            index += 1;
            (Some(rp.node(d + 1).clone()), node.maybe_child(index).cloned())
        } else {
            let before = index.checked_sub(1).and_then(|i| node.maybe_child(i)).cloned();
            (before, Some(rp.node(d + 1).clone()))
        };
        if let Some(b) = &before {
            if !b.is_textblock()
                && joinable(Some(b), after.as_ref())
                && node.can_replace(index, index + 1, &Fragment::new(), 0, 0)
            {
                return Some(pos);
            }
        }
        if d == 0 {
            return None;
        }
        pos = match dir {
            Assoc::Before => rp.before_level(d),
            Assoc::After => rp.after_level(d),
        };
        d -= 1;
    }
}

/// Try to find a point where a node of the given type can be inserted near `pos`, by searching
/// up the node hierarchy when `pos` itself isn't a valid place but is at the start or end of a
/// node.
pub fn insert_point(doc: &Node, pos: usize, node_type: &NodeType) -> Option<usize> {
    let rp = doc.resolve(pos).ok()?;
    let index = rp.index(rp.depth);
    if rp.parent().can_replace_with(index, index, node_type, None) {
        return Some(pos);
    }

    if rp.parent_offset == 0 {
        for d in (0..rp.depth).rev() {
            let index = rp.index(d);
            if rp.node(d).can_replace_with(index, index, node_type, None) {
                return Some(rp.before_level(d + 1));
            }
            if index > 0 {
                return None;
            }
        }
    }
    if rp.parent_offset == rp.parent().content_size() {
        for d in (0..rp.depth).rev() {
            let index = rp.index_after(d);
            if rp.node(d).can_replace_with(index, index, node_type, None) {
                return Some(rp.after_level(d + 1));
            }
            if index < rp.node(d).child_count() {
                return None;
            }
        }
    }
    None
}

/// Finds a position at or around the given position where the given slice can be inserted.
/// Will look at parent nodes' nearest boundary and try there, even if the original position
/// wasn't directly at the start or end of that node.
pub fn drop_point(doc: &Node, pos: usize, slice: &Slice) -> Option<usize> {
    let rp = doc.resolve(pos).ok()?;
    if slice.content.size() == 0 {
        return Some(pos);
    }
    let mut content = slice.content.clone();
    for _ in 0..slice.open_start {
        content = content.first_child()?.content().clone();
    }
    let passes = if slice.open_start == 0 && slice.size() > 0 { 2 } else { 1 };
    for pass in 1..=passes {
        for d in (0..=rp.depth).rev() {
            let bias = if d == rp.depth {
                0
            } else if rp.pos * 2 <= rp.start(d + 1) + rp.end(d + 1) {
                -1
            } else {
                1
            };
            let insert_pos = rp.index(d) + usize::from(bias > 0);
            let parent = rp.node(d);
            let fits = if pass == 1 {
                parent.can_replace(insert_pos, insert_pos, &content, 0, content.child_count())
            } else {
                let wrapping = content.first_child().and_then(|first| {
                    let m = parent.content_match_at(insert_pos).ok()?;
                    m.find_wrapping(first.r#type())
                });
                match wrapping.as_ref().and_then(|w| w.first()) {
                    Some(outer) => parent.can_replace_with(insert_pos, insert_pos, outer, None),
                    None => false,
                }
            };
            if fits {
                return Some(match bias {
                    0 => rp.pos,
                    b if b < 0 => rp.before_level(d + 1),
                    _ => rp.after_level(d + 1),
                });
            }
        }
    }
    None
}

impl Transform {
    /// Split the content in the given range off from its parent, if there is sibling content
    /// before or after it, and move it up the tree to the depth specified by `target`. You'll
    /// probably want to use [`lift_target`] to compute `target`, to make sure the lift is valid.
    pub fn lift(&mut self, range: &NodeRange, target: usize) -> Result<&mut Self, TransformError> {
        let NodeRange { from, to, depth } = range;
        let depth = *depth;
        if target > depth {
            return Err(TransformError::InvalidDepth(target));
        }

        let gap_start = from.before_level(depth + 1);
        let gap_end = to.after_level(depth + 1);
        let mut start = gap_start;
        let mut end = gap_end;

        let mut before = Fragment::new();
        let mut open_start = 0;
        let mut splitting = false;
        for d in (target + 1..=depth).rev() {
            if splitting || from.index(d) > 0 {
                splitting = true;
                before = Fragment::from(from.node(d).copy(before));
                open_start += 1;
            } else {
                start -= 1;
            }
        }

        let mut after = Fragment::new();
        let mut open_end = 0;
        splitting = false;
        for d in (target + 1..=depth).rev() {
            if splitting || to.after_level(d + 1) < to.end(d) {
                splitting = true;
                after = Fragment::from(to.node(d).copy(after));
                open_end += 1;
            } else {
                end += 1;
            }
        }

        let insert = before.size() - open_start;
        let slice = Slice::new(before.append(after), open_start, open_end);
        self.step(Step::ReplaceAround(ReplaceAroundStep::new(
            Span::new(start, end),
            gap_start,
            gap_end,
            slice,
            insert,
            true,
        )))
    }

    /// Wrap the given range in the given set of wrappers. The wrappers are assumed to be valid
    /// in this position, and should probably be computed with [`find_wrapping`].
    pub fn wrap(
        &mut self,
        range: &NodeRange,
        wrappers: &[Wrapper],
    ) -> Result<&mut Self, TransformError> {
        let mut content = Fragment::new();
        for wrapper in wrappers.iter().rev() {
            if content.size() > 0 {
                let fits = wrapper
                    .r#type
                    .content_match()
                    .match_fragment(&content)
                    .map_or(false, |m| m.valid_end());
                if !fits {
                    return Err(TransformError::InvalidWrapper(wrapper.r#type.clone()));
                }
            }
            content = Fragment::from(wrapper.r#type.create(wrapper.attrs.as_ref(), content, &[])?);
        }
        let start = range.start();
        let end = range.end();
        self.step(Step::ReplaceAround(ReplaceAroundStep::new(
            Span::new(start, end),
            start,
            end,
            Slice::new(content, 0, 0),
            wrappers.len(),
            true,
        )))
    }

    /// Set the type of all textblocks (partly) between `from` and `to` to the given node type
    /// with the given attributes.
    pub fn set_block_type(
        &mut self,
        from: usize,
        to: usize,
        r#type: &NodeType,
        attrs: Option<&Attrs>,
    ) -> Result<&mut Self, TransformError> {
        if !r#type.is_textblock() {
            return Err(TransformError::NotTextblock(r#type.clone()));
        }
        let map_from = self.steps().len();
        let mut targets = Vec::new();
        self.doc().nodes_between(from, to, |node, pos, _, _| {
            if node.is_textblock() && !node.has_markup(r#type, attrs, node.marks()) {
                targets.push((node.clone(), pos));
                return false;
            }
            true
        });

        for (node, pos) in targets {
            let mapping = self.mapping().slice(map_from..);
            let mapped = mapping.map(pos, Assoc::After);
            if !can_change_type(self.doc(), mapped, r#type)? {
                continue;
            }
            self.clear_incompatible(mapped, r#type, None)?;
            let mapping = self.mapping().slice(map_from..);
            let start = mapping.map(pos, Assoc::After);
            let end = mapping.map(pos + node.node_size(), Assoc::After);
            let replacement = r#type.create(attrs, Fragment::new(), node.marks())?;
            self.step(Step::ReplaceAround(ReplaceAroundStep::new(
                Span::new(start, end),
                start + 1,
                end - 1,
                Slice::new(Fragment::from(replacement), 0, 0),
                1,
                true,
            )))?;
        }
        Ok(self)
    }

    /// Change the type, attributes, and/or marks of the node at `pos`. When `type` isn't given,
    /// the existing node type is preserved.
    pub fn set_node_markup(
        &mut self,
        pos: usize,
        r#type: Option<&NodeType>,
        attrs: Option<&Attrs>,
        marks: Option<&[Mark]>,
    ) -> Result<&mut Self, TransformError> {
        let node = self
            .doc()
            .node_at(pos)
            .cloned()
            .ok_or(TransformError::NoNodeAt(pos))?;
        let r#type = r#type.unwrap_or(node.r#type()).clone();
        let new_node = r#type.create(attrs, Fragment::new(), marks.unwrap_or(node.marks()))?;
        if node.is_leaf() {
            return self.replace_with(pos, pos + node.node_size(), new_node);
        }
        if !r#type.valid_content(node.content()) {
            return Err(TransformError::InvalidContent(r#type));
        }
        let end = pos + node.node_size();
        self.step(Step::ReplaceAround(ReplaceAroundStep::new(
            Span::new(pos, end),
            pos + 1,
            end - 1,
            Slice::new(Fragment::from(new_node), 0, 0),
            1,
            true,
        )))
    }

    /// Split the node at the given position, and optionally, if `depth` is greater than one,
    /// any number of nodes above that. By default, the parts split off will inherit the node
    /// type of the original node. This can be changed by passing `types_after`, innermost last.
    pub fn split(
        &mut self,
        pos: usize,
        depth: usize,
        types_after: &[Option<Wrapper>],
    ) -> Result<&mut Self, TransformError> {
        let rp = self.doc().resolve(pos)?;
        let base = rp
            .depth
            .checked_sub(depth)
            .ok_or(TransformError::InvalidDepth(depth))?;
        let mut before = Fragment::new();
        let mut after = Fragment::new();
        for d in (base + 1..=rp.depth).rev() {
            let node = rp.node(d);
            before = Fragment::from(node.copy(before));
            let type_after = types_after.get(d - base - 1).and_then(Option::as_ref);
            after = Fragment::from(match type_after {
                Some(w) => w.r#type.create(w.attrs.as_ref(), after, &[])?,
                None => node.copy(after),
            });
        }
        let slice = Slice::new(before.append(after), depth, depth);
        self.step(Step::Replace(ReplaceStep::new(pos, pos, slice, true)))
    }

    /// Join the blocks around the given position. If depth is 2, their last and first siblings
    /// are also joined, and so on.
    pub fn join(&mut self, pos: usize, depth: usize) -> Result<&mut Self, TransformError> {
        let from = pos
            .checked_sub(depth)
            .ok_or(TransformError::InvalidDepth(depth))?;
        self.step(Step::Replace(ReplaceStep::new(
            from,
            pos + depth,
            Slice::empty(),
            true,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{can_join, can_split, find_wrapping, insert_point, join_point, lift_target, Wrapper};
    use crate::markdown::helper::{blockquote, code_block, doc, h1, hr, img, li, p, ul};
    use crate::markdown::schema;
    use crate::transform::{Assoc, Transform};

    #[test]
    fn lifts_out_of_a_blockquote() {
        let d = doc(blockquote((p("a"), p("b"), p("c"))));
        let from = d.resolve(5).unwrap();
        let range = from.block_range(None, None).unwrap();
        assert_eq!(lift_target(&range), Some(0));

        let mut tr = Transform::new(d);
        tr.lift(&range, 0).unwrap();
        assert_eq!(
            tr.doc(),
            &doc((blockquote(p("a")), p("b"), blockquote(p("c"))))
        );
    }

    #[test]
    fn lifts_the_only_child() {
        let d = doc(blockquote(p("a")));
        let range = d.resolve(2).unwrap().block_range(None, None).unwrap();
        let mut tr = Transform::new(d);
        tr.lift(&range, 0).unwrap();
        assert_eq!(tr.doc(), &doc(p("a")));
    }

    #[test]
    fn wraps_in_a_list() {
        let s = schema();
        let d = doc((p("a"), p("b")));
        let from = d.resolve(1).unwrap();
        let to = d.resolve(4).unwrap();
        let range = from.block_range(Some(&to), None).unwrap();
        let list = s.node_type("bullet_list").unwrap();
        let wrappers = find_wrapping(&range, &list, None, None).unwrap();
        let names: Vec<_> = wrappers.iter().map(|w| w.r#type.name().to_owned()).collect();
        assert_eq!(names, ["bullet_list", "list_item"]);
        // textblocks cannot hold blocks
        assert!(find_wrapping(&range, &s.node_type("heading").unwrap(), None, None).is_none());

        let one = d.resolve(1).unwrap().block_range(None, None).unwrap();
        let wrappers = find_wrapping(&one, &list, None, None).unwrap();
        let mut tr = Transform::new(d);
        tr.wrap(&one, &wrappers).unwrap();
        assert_eq!(tr.doc(), &doc((ul(li(p("a"))), p("b"))));
    }

    #[test]
    fn changes_block_types() {
        let s = schema();
        let d = doc((p("a"), blockquote(p("b")), hr()));
        let mut tr = Transform::new(d);
        tr.set_block_type(0, 8, &s.node_type("heading").unwrap(), None)
            .unwrap();
        assert_eq!(tr.doc(), &doc((h1("a"), blockquote(h1("b")), hr())));
        assert_eq!(tr.steps().len(), 2);
    }

    #[test]
    fn clears_marks_when_changing_to_code() {
        use crate::markdown::helper::em;
        let s = schema();
        let d = doc(p(("a", em("b"))));
        let mut tr = Transform::new(d);
        tr.set_block_type(1, 1, &s.node_type("code_block").unwrap(), None)
            .unwrap();
        assert_eq!(tr.doc(), &doc(code_block("", "ab")));
    }

    #[test]
    fn changes_node_markup() {
        let s = schema();
        let d = doc((p("a"), p(img("x.png"))));
        let mut tr = Transform::new(d);
        tr.set_node_markup(0, Some(&s.node_type("heading").unwrap()), None, None)
            .unwrap();
        assert_eq!(tr.doc(), &doc((h1("a"), p(img("x.png")))));
        let quote = s.node_type("blockquote").unwrap();
        assert!(tr.set_node_markup(0, Some(&quote), None, None).is_err());
        assert!(tr.set_node_markup(20, None, None, None).is_err());
    }

    #[test]
    fn splits_blocks() {
        let d = doc(blockquote(p("abc")));
        assert!(can_split(&d, 3, 1, &[]));
        assert!(can_split(&d, 3, 2, &[]));
        assert!(!can_split(&d, 3, 3, &[]));
        assert!(!can_split(&d, 3, 0, &[]));

        let mut tr = Transform::new(d.clone());
        tr.split(3, 1, &[]).unwrap();
        assert_eq!(tr.doc(), &doc(blockquote((p("ab"), p("c")))));

        let mut tr = Transform::new(d);
        tr.split(3, 2, &[]).unwrap();
        assert_eq!(tr.doc(), &doc((blockquote(p("ab")), blockquote(p("c")))));
    }

    #[test]
    fn splits_into_another_type() {
        let s = schema();
        let d = doc(h1("ab"));
        let after = Some(Wrapper::from(s.node_type("paragraph").unwrap()));
        assert!(can_split(&d, 2, 1, std::slice::from_ref(&after)));
        let mut tr = Transform::new(d);
        tr.split(2, 1, &[after]).unwrap();
        assert_eq!(tr.doc(), &doc((h1("a"), p("b"))));
    }

    #[test]
    fn joins_blocks() {
        let d = doc((p("a"), p("b"), hr()));
        assert!(can_join(&d, 3));
        assert!(!can_join(&d, 6));
        assert!(!can_join(&d, 2));
        let mut tr = Transform::new(d);
        tr.join(3, 1).unwrap();
        assert_eq!(tr.doc(), &doc((p("ab"), hr())));
    }

    #[test]
    fn finds_join_points() {
        let d = doc((blockquote(p("a")), blockquote(p("b"))));
        assert_eq!(join_point(&d, 7, Assoc::Before), Some(5));
        assert_eq!(join_point(&d, 3, Assoc::After), Some(5));
        assert_eq!(join_point(&doc(p("a")), 1, Assoc::Before), None);
    }

    #[test]
    fn finds_insert_points() {
        let s = schema();
        let d = doc((p("ab"), p("cd")));
        let rule = s.node_type("horizontal_rule").unwrap();
        assert_eq!(insert_point(&d, 1, &rule), Some(0));
        assert_eq!(insert_point(&d, 3, &rule), Some(4));
        assert_eq!(insert_point(&d, 2, &rule), None);
        assert_eq!(insert_point(&d, 4, &rule), Some(4));
    }
}
