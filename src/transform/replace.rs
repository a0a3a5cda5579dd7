use super::structure::insert_point;
use super::{ReplaceAroundStep, ReplaceStep, Span, Step, Transform, TransformError};
use crate::model::{
    Attrs, ContentMatch, Fragment, Node, NodeError, NodeType, ResolvedPos, Slice,
};

/// ‘Fit’ a slice into a given position in the document, producing a [`Step`] that inserts it.
/// Will return `None` if there's no meaningful way to insert the slice here, or inserting it
/// would be a no-op (an empty slice over an empty range).
pub fn replace_step(
    doc: &Node,
    from: usize,
    to: usize,
    slice: &Slice,
) -> Result<Option<Step>, TransformError> {
    if from == to && slice.size() == 0 {
        return Ok(None);
    }
    let rp_from = doc.resolve(from)?;
    let rp_to = doc.resolve(to)?;
    if fits_trivially(&rp_from, &rp_to, slice) {
        return Ok(Some(Step::Replace(ReplaceStep::new(
            from,
            to,
            slice.clone(),
            false,
        ))));
    }
    Fitter::new(&rp_from, &rp_to, slice.clone())?.fit()
}

fn fits_trivially(from: &ResolvedPos, to: &ResolvedPos, slice: &Slice) -> bool {
    slice.open_start == 0
        && slice.open_end == 0
        && from.start(from.depth) == to.start(to.depth)
        && from.parent().can_replace(
            from.index(from.depth),
            to.index(to.depth),
            &slice.content,
            0,
            slice.content.child_count(),
        )
}

#[derive(Debug, Clone)]
struct Frontier {
    r#type: NodeType,
    content_match: ContentMatch,
}

#[derive(Debug)]
struct Fittable {
    slice_depth: usize,
    frontier_depth: usize,
    parent: Option<Node>,
    inject: Option<Fragment>,
    wrap: Option<Vec<NodeType>>,
}

#[derive(Debug)]
struct CloseLevel {
    depth: usize,
    fit: Fragment,
    move_to: ResolvedPos,
}

/// Places the content of a slice into the document around a position, closing and opening
/// nodes as needed.
///
/// The frontier is the stack of nodes open at the end of `placed`, with the content match
/// reached in each. Nodes are moved from `unplaced` onto the frontier until nothing is left,
/// then the frontier is closed so that it fits the content after `to`.
struct Fitter<'a> {
    from: &'a ResolvedPos,
    to: &'a ResolvedPos,
    unplaced: Slice,
    frontier: Vec<Frontier>,
    placed: Fragment,
}

impl<'a> Fitter<'a> {
    fn new(from: &'a ResolvedPos, to: &'a ResolvedPos, unplaced: Slice) -> Result<Self, NodeError> {
        let mut frontier = Vec::with_capacity(from.depth + 1);
        for i in 0..=from.depth {
            let node = from.node(i);
            frontier.push(Frontier {
                r#type: node.r#type().clone(),
                content_match: node.content_match_at(from.index_after(i))?,
            });
        }
        let mut placed = Fragment::new();
        for i in (1..=from.depth).rev() {
            placed = Fragment::from(from.node(i).copy(placed));
        }
        Ok(Fitter {
            from,
            to,
            unplaced,
            frontier,
            placed,
        })
    }

    fn depth(&self) -> usize {
        self.frontier.len() - 1
    }

    fn fit(mut self) -> Result<Option<Step>, TransformError> {
        while self.unplaced.size() > 0 {
            match self.find_fittable() {
                Some(fit) => self.place_nodes(fit)?,
                None => {
                    if !self.open_more() {
                        self.drop_node();
                    }
                }
            }
        }

        // When there's inline content directly after the frontier _and_ directly after
        // `to`, the content after `to` has to be moved into the frontier.
        let move_inline = self.must_move_inline();
        let placed_size = self.placed.size() - self.depth() - self.from.depth;
        let from = self.from;
        let to = match move_inline {
            Some(pos) => from.doc().resolve(pos)?,
            None => self.to.clone(),
        };
        let to = match self.close(&to)? {
            Some(to) => to,
            None => return Ok(None),
        };

        let mut content = self.placed.clone();
        let mut open_start = from.depth;
        let mut open_end = to.depth;
        while open_start > 0 && open_end > 0 && content.child_count() == 1 {
            content = match content.first_child() {
                Some(child) => child.content().clone(),
                None => break,
            };
            open_start -= 1;
            open_end -= 1;
        }
        let slice = Slice::new(content, open_start, open_end);
        if let Some(move_inline) = move_inline {
            return Ok(Some(Step::ReplaceAround(ReplaceAroundStep::new(
                Span::new(from.pos, move_inline),
                self.to.pos,
                self.to.end(self.to.depth),
                slice,
                placed_size,
                false,
            ))));
        }
        if slice.size() > 0 || from.pos != self.to.pos {
            return Ok(Some(Step::Replace(ReplaceStep::new(
                from.pos, to.pos, slice, false,
            ))));
        }
        Ok(None)
    }

    // Find a position on the start spine of `unplaced` that fits into a frontier node.
    //
    // The first pass looks for places where the content can go without wrapping, starting
    // with the deepest nodes on both sides. The second pass allows wrapping, but only for
    // slice depths up to the open start of the slice.
    fn find_fittable(&self) -> Option<Fittable> {
        let mut start_depth = self.unplaced.open_start;
        let mut cur = self.unplaced.content.clone();
        let mut open_end = self.unplaced.open_end;
        for d in 0..start_depth {
            let node = cur.first_child()?.clone();
            if cur.child_count() > 1 {
                open_end = 0;
            }
            if node.r#type().spec().isolating && open_end <= d {
                start_depth = d;
                break;
            }
            cur = node.content().clone();
        }

        for pass in 1..=2 {
            let top = if pass == 1 {
                start_depth
            } else {
                self.unplaced.open_start
            };
            for slice_depth in (0..=top).rev() {
                let (fragment, parent) = if slice_depth > 0 {
                    let parent = content_at(&self.unplaced.content, slice_depth - 1)
                        .first_child()
                        .cloned();
                    match parent {
                        Some(parent) => (parent.content().clone(), Some(parent)),
                        None => continue,
                    }
                } else {
                    (self.unplaced.content.clone(), None)
                };
                let first = fragment.first_child();
                for frontier_depth in (0..=self.depth()).rev() {
                    let Frontier {
                        r#type,
                        content_match,
                    } = &self.frontier[frontier_depth];
                    if pass == 1 {
                        let found = match first {
                            Some(first) => {
                                if content_match.match_type(first.r#type()).is_some() {
                                    Some(None)
                                } else {
                                    content_match
                                        .fill_before(&Fragment::from(first.clone()), false, 0)
                                        .map(Some)
                                }
                            }
                            None => parent
                                .as_ref()
                                .filter(|p| r#type.compatible_content(p.r#type()))
                                .map(|_| None),
                        };
                        if let Some(inject) = found {
                            return Some(Fittable {
                                slice_depth,
                                frontier_depth,
                                parent: parent.clone(),
                                inject,
                                wrap: None,
                            });
                        }
                    } else if let Some(first) = first {
                        if let Some(wrap) = content_match.find_wrapping(first.r#type()) {
                            return Some(Fittable {
                                slice_depth,
                                frontier_depth,
                                parent: parent.clone(),
                                inject: None,
                                wrap: Some(wrap),
                            });
                        }
                    }
                    // Don't continue looking further up if the parent node would fit here.
                    if let Some(parent) = &parent {
                        if content_match.match_type(parent.r#type()).is_some() {
                            break;
                        }
                    }
                }
            }
        }
        None
    }

    fn open_more(&mut self) -> bool {
        let Slice {
            content,
            open_start,
            open_end,
        } = &self.unplaced;
        let inner = content_at(content, *open_start);
        if inner.child_count() == 0 || inner.first_child().map_or(true, Node::is_leaf) {
            return false;
        }
        let new_end = if inner.size() + open_start >= content.size() - open_end {
            open_start + 1
        } else {
            0
        };
        self.unplaced = Slice::new(content.clone(), open_start + 1, (*open_end).max(new_end));
        true
    }

    fn drop_node(&mut self) {
        let Slice {
            content,
            open_start,
            open_end,
        } = self.unplaced.clone();
        let inner = content_at(&content, open_start);
        if inner.child_count() <= 1 && open_start > 0 {
            let open_at_end = content.size() - open_start <= open_start + inner.size();
            self.unplaced = Slice::new(
                drop_from_fragment(&content, open_start - 1, 1),
                open_start - 1,
                if open_at_end { open_start - 1 } else { open_end },
            );
        } else {
            self.unplaced = Slice::new(
                drop_from_fragment(&content, open_start, 1),
                open_start,
                open_end,
            );
        }
    }

    // Move content from the unplaced slice at `slice_depth` to the frontier node at
    // `frontier_depth`. Close that frontier node when applicable.
    fn place_nodes(&mut self, fit: Fittable) -> Result<(), NodeError> {
        let Fittable {
            slice_depth,
            frontier_depth,
            parent,
            inject,
            wrap,
        } = fit;
        while self.depth() > frontier_depth {
            self.close_frontier_node();
        }
        if let Some(wrap) = wrap {
            for r#type in wrap {
                self.open_frontier_node(r#type, None, Fragment::new())?;
            }
        }

        let slice = self.unplaced.clone();
        let fragment = match &parent {
            Some(parent) => parent.content().clone(),
            None => slice.content.clone(),
        };
        let open_start = slice.open_start - slice_depth;
        let mut taken = 0;
        let mut add = Vec::new();
        let Frontier {
            r#type,
            mut content_match,
        } = self.frontier[frontier_depth].clone();
        if let Some(inject) = inject {
            if let Some(next) = content_match.match_fragment(&inject) {
                content_match = next;
            }
            add.extend(inject.iter().cloned());
        }
        // Computes the amount of (end) open nodes at the end of the fragment. When 0, the
        // parent is open, but no more. When negative, nothing is open.
        let mut open_end_count =
            (fragment.size() + slice_depth) as isize - (slice.content.size() - slice.open_end) as isize;
        // Scan over the fragment, fitting as many child nodes as possible.
        while taken < fragment.child_count() {
            let next = fragment.child(taken);
            let matches = match content_match.match_type(next.r#type()) {
                Some(m) => m,
                None => break,
            };
            taken += 1;
            // Drop empty open nodes
            if taken > 1 || open_start == 0 || next.content().size() > 0 {
                content_match = matches;
                let marked = next.mark(r#type.allowed_marks(next.marks()).into_owned());
                let open = if taken == 1 { open_start as isize } else { 0 };
                let end = if taken == fragment.child_count() {
                    open_end_count
                } else {
                    -1
                };
                add.push(close_node_start(&marked, open, end));
            }
        }
        let to_end = taken == fragment.child_count();
        if !to_end {
            open_end_count = -1;
        }

        self.placed = add_to_fragment(&self.placed, frontier_depth, Fragment::from(add));
        self.frontier[frontier_depth].content_match = content_match;

        // If the parent types match, and the entire node was moved, and it's not open, close
        // this frontier node right away.
        let parent_matches = parent
            .as_ref()
            .map_or(false, |p| p.r#type() == &self.frontier[self.depth()].r#type);
        if to_end && open_end_count < 0 && parent_matches && self.frontier.len() > 1 {
            self.close_frontier_node();
        }

        // Add new frontier nodes for any open nodes at the end.
        let mut cur = fragment;
        for _ in 0..open_end_count.max(0) {
            let node = match cur.last_child() {
                Some(node) => node.clone(),
                None => break,
            };
            self.frontier.push(Frontier {
                r#type: node.r#type().clone(),
                content_match: node.content_match_at(node.child_count())?,
            });
            cur = node.content().clone();
        }

        // Update `unplaced`. Drop the entire node from which we placed it (if it's open) or
        // the nodes we took from it.
        self.unplaced = if !to_end {
            Slice::new(
                drop_from_fragment(&slice.content, slice_depth, taken),
                slice.open_start,
                slice.open_end,
            )
        } else if slice_depth == 0 {
            Slice::empty()
        } else {
            let open_end = if open_end_count < 0 {
                slice.open_end
            } else {
                slice_depth - 1
            };
            Slice::new(
                drop_from_fragment(&slice.content, slice_depth - 1, 1),
                slice_depth - 1,
                open_end,
            )
        };
        Ok(())
    }

    fn must_move_inline(&self) -> Option<usize> {
        if !self.to.parent().is_textblock() {
            return None;
        }
        let top = &self.frontier[self.depth()];
        if !top.r#type.is_textblock()
            || content_after_fits(self.to, self.to.depth, &top.r#type, &top.content_match, false)
                .is_none()
        {
            return None;
        }
        if self.to.depth == self.depth() {
            if let Some(level) = self.find_close_level(self.to) {
                if level.depth == self.depth() {
                    return None;
                }
            }
        }

        let mut depth = self.to.depth;
        let mut after = self.to.after_level(depth);
        while depth > 1 {
            depth -= 1;
            if after != self.to.end(depth) {
                break;
            }
            after += 1;
        }
        Some(after)
    }

    fn find_close_level(&self, to: &ResolvedPos) -> Option<CloseLevel> {
        'scan: for i in (0..=self.depth().min(to.depth)).rev() {
            let Frontier {
                r#type,
                content_match,
            } = &self.frontier[i];
            let drop_inner = i < to.depth && to.end(i + 1) == to.pos + (to.depth - (i + 1));
            let fit = match content_after_fits(to, i, r#type, content_match, drop_inner) {
                Some(fit) => fit,
                None => continue,
            };
            for d in (0..i).rev() {
                let Frontier {
                    r#type,
                    content_match,
                } = &self.frontier[d];
                match content_after_fits(to, d, r#type, content_match, true) {
                    Some(m) if m.child_count() == 0 => {}
                    _ => continue 'scan,
                }
            }
            let move_to = if drop_inner {
                to.doc().resolve(to.after_level(i + 1)).ok()?
            } else {
                to.clone()
            };
            return Some(CloseLevel {
                depth: i,
                fit,
                move_to,
            });
        }
        None
    }

    fn close(&mut self, to: &ResolvedPos) -> Result<Option<ResolvedPos>, NodeError> {
        let close = match self.find_close_level(to) {
            Some(close) => close,
            None => return Ok(None),
        };
        while self.depth() > close.depth {
            self.close_frontier_node();
        }
        if close.fit.child_count() > 0 {
            self.placed = add_to_fragment(&self.placed, close.depth, close.fit);
        }
        let to = close.move_to;
        for d in close.depth + 1..=to.depth {
            let node = to.node(d);
            let add = node
                .r#type()
                .content_match()
                .fill_before(node.content(), true, to.index(d))
                .unwrap_or_default();
            self.open_frontier_node(node.r#type().clone(), Some(node.attrs()), add)?;
        }
        Ok(Some(to))
    }

    fn open_frontier_node(
        &mut self,
        r#type: NodeType,
        attrs: Option<&Attrs>,
        content: Fragment,
    ) -> Result<(), NodeError> {
        let depth = self.depth();
        let top = &mut self.frontier[depth];
        if let Some(next) = top.content_match.match_type(&r#type) {
            top.content_match = next;
        }
        let node = r#type.create(attrs, content, &[])?;
        self.placed = add_to_fragment(&self.placed, depth, Fragment::from(node));
        self.frontier.push(Frontier {
            content_match: r#type.content_match(),
            r#type,
        });
        Ok(())
    }

    fn close_frontier_node(&mut self) {
        let open = match self.frontier.pop() {
            Some(open) => open,
            None => return,
        };
        let add = open
            .content_match
            .fill_before(&Fragment::new(), true, 0)
            .unwrap_or_default();
        if add.child_count() > 0 {
            self.placed = add_to_fragment(&self.placed, self.frontier.len(), add);
        }
    }
}

fn drop_from_fragment(fragment: &Fragment, depth: usize, count: usize) -> Fragment {
    if depth == 0 {
        return fragment.cut_by_index(count, fragment.child_count());
    }
    match fragment.first_child() {
        Some(first) => fragment.replace_child(
            0,
            first.copy(drop_from_fragment(first.content(), depth - 1, count)),
        ),
        None => fragment.clone(),
    }
}

fn add_to_fragment(fragment: &Fragment, depth: usize, content: Fragment) -> Fragment {
    if depth == 0 {
        return fragment.append(content);
    }
    match fragment.last_child() {
        Some(last) => fragment.replace_child(
            fragment.child_count() - 1,
            last.copy(add_to_fragment(last.content(), depth - 1, content)),
        ),
        None => fragment.clone(),
    }
}

fn content_at(fragment: &Fragment, depth: usize) -> Fragment {
    let mut fragment = fragment.clone();
    for _ in 0..depth {
        fragment = match fragment.first_child() {
            Some(child) => child.content().clone(),
            None => return Fragment::new(),
        };
    }
    fragment
}

fn close_node_start(node: &Node, open_start: isize, open_end: isize) -> Node {
    if open_start <= 0 {
        return node.clone();
    }
    let mut fragment = node.content().clone();
    if open_start > 1 {
        if let Some(first) = fragment.first_child() {
            let end = if fragment.child_count() == 1 {
                open_end - 1
            } else {
                0
            };
            let closed = close_node_start(first, open_start - 1, end);
            fragment = fragment.replace_child(0, closed);
        }
    }
    let start = node.r#type().content_match();
    fragment = start
        .fill_before(&fragment, false, 0)
        .unwrap_or_default()
        .append(fragment);
    if open_end <= 0 {
        let end = start
            .match_fragment(&fragment)
            .and_then(|m| m.fill_before(&Fragment::new(), true, 0))
            .unwrap_or_default();
        fragment = fragment.append(end);
    }
    node.copy(fragment)
}

fn content_after_fits(
    to: &ResolvedPos,
    depth: usize,
    r#type: &NodeType,
    content_match: &ContentMatch,
    open: bool,
) -> Option<Fragment> {
    let node = to.node(depth);
    let index = if open {
        to.index_after(depth)
    } else {
        to.index(depth)
    };
    if index == node.child_count() && !r#type.compatible_content(node.r#type()) {
        return None;
    }
    let fit = content_match.fill_before(node.content(), true, index)?;
    if invalid_marks(r#type, node.content(), index) {
        None
    } else {
        Some(fit)
    }
}

fn invalid_marks(r#type: &NodeType, fragment: &Fragment, start: usize) -> bool {
    fragment.children()[start.min(fragment.child_count())..]
        .iter()
        .any(|child| !r#type.allows_marks(child.marks()))
}

fn defines_content(r#type: &NodeType) -> bool {
    let spec = r#type.spec();
    spec.defining || spec.defining_for_content == Some(true)
}

// Returns the depths at which both positions are at the start and end of the same node,
// deepest first.
fn covered_depths(from: &ResolvedPos, to: &ResolvedPos) -> Vec<usize> {
    let mut result = Vec::new();
    let min_depth = from.depth.min(to.depth);
    for d in (0..=min_depth).rev() {
        let start = from.start(d);
        if start < from.pos - (from.depth - d)
            || to.end(d) > to.pos + (to.depth - d)
            || from.node(d).r#type().spec().isolating
            || to.node(d).r#type().spec().isolating
        {
            break;
        }
        if start == to.start(d)
            || (d == from.depth
                && d == to.depth
                && from.parent().inline_content()
                && to.parent().inline_content()
                && d > 0
                && to.start(d - 1) == start - 1)
        {
            result.push(d);
        }
    }
    result
}

fn close_fragment(
    fragment: &Fragment,
    depth: usize,
    old_open: usize,
    new_open: usize,
    parent: Option<&Node>,
) -> Fragment {
    let mut fragment = fragment.clone();
    if depth < old_open {
        if let Some(first) = fragment.first_child().cloned() {
            let inner = close_fragment(first.content(), depth + 1, old_open, new_open, Some(&first));
            fragment = fragment.replace_child(0, first.copy(inner));
        }
    }
    if depth > new_open {
        if let Some(parent) = parent {
            let start_match = parent.r#type().content_match();
            let start = start_match
                .fill_before(&fragment, false, 0)
                .unwrap_or_default()
                .append(fragment);
            let end = start_match
                .match_fragment(&start)
                .and_then(|m| m.fill_before(&Fragment::new(), true, 0))
                .unwrap_or_default();
            fragment = start.append(end);
        }
    }
    fragment
}

impl Transform {
    /// Replace the part of the document between `from` and `to` with the given `slice`.
    pub fn replace(
        &mut self,
        from: usize,
        to: usize,
        slice: &Slice,
    ) -> Result<&mut Self, TransformError> {
        if let Some(step) = replace_step(self.doc(), from, to, slice)? {
            self.step(step)?;
        }
        Ok(self)
    }

    /// Replace the given range with the given content, which may be a fragment, node, or
    /// array of nodes.
    pub fn replace_with<F: Into<Fragment>>(
        &mut self,
        from: usize,
        to: usize,
        content: F,
    ) -> Result<&mut Self, TransformError> {
        self.replace(from, to, &Slice::new(content.into(), 0, 0))
    }

    /// Delete the content between the given positions.
    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        self.replace(from, to, &Slice::empty())
    }

    /// Insert the given content at the given position.
    pub fn insert<F: Into<Fragment>>(
        &mut self,
        pos: usize,
        content: F,
    ) -> Result<&mut Self, TransformError> {
        self.replace_with(pos, pos, content)
    }

    /// Replace a range of the document with a given slice, using `from`, `to`, and the slice's
    /// open depths as hints, rather than fixed start and end points. This method may grow the
    /// replaced area or close open nodes in the slice in order to get a fit that is more in
    /// line with WYSIWYG expectations, by dropping fully covered parent nodes of the replaced
    /// region when they are marked non-defining as context, or including an open parent node
    /// from the slice that _is_ marked as defining its content.
    ///
    /// This is the method, for example, to handle paste. The similar [`replace`] method is a
    /// more primitive tool which will _not_ move the start and end of its given range, and is
    /// useful in situations where you need more precise control over what happens.
    ///
    /// [`replace`]: Transform::replace
    pub fn replace_range(
        &mut self,
        from: usize,
        to: usize,
        slice: &Slice,
    ) -> Result<&mut Self, TransformError> {
        if slice.size() == 0 {
            return self.delete_range(from, to);
        }
        let doc = self.doc().clone();
        let rp_from = doc.resolve(from)?;
        let rp_to = doc.resolve(to)?;
        if fits_trivially(&rp_from, &rp_to, slice) {
            return self.step(Step::Replace(ReplaceStep::new(
                from,
                to,
                slice.clone(),
                false,
            )));
        }

        // Negative numbers are depths that should not be expanded to cover the whole node.
        let mut target_depths: Vec<isize> = covered_depths(&rp_from, &rp_to)
            .into_iter()
            .map(|d| d as isize)
            .collect();
        if target_depths.last() == Some(&0) {
            target_depths.pop();
        }
        // Try to fit the slice at the end of the nodes around `from` first, without
        // expanding the range.
        let mut preferred_target = -(rp_from.depth as isize + 1);
        target_depths.insert(0, preferred_target);
        // Add the depths of parents that `from` sits at the very start of.
        let mut pos = rp_from.pos as isize - 1;
        for d in (1..=rp_from.depth).rev() {
            let spec = rp_from.node(d).r#type().spec();
            if spec.defining || spec.defining_as_context == Some(true) || spec.isolating {
                break;
            }
            if target_depths.contains(&(d as isize)) {
                preferred_target = d as isize;
            } else if rp_from.before_level(d) as isize == pos {
                target_depths.insert(1, -(d as isize));
            }
            pos -= 1;
        }
        // Try to fit each possible depth of the slice into each possible target depth,
        // starting with the preferred depths.
        let preferred_target_index = target_depths
            .iter()
            .position(|&t| t == preferred_target)
            .unwrap_or(0);

        let mut left_nodes: Vec<Option<Node>> = Vec::new();
        let mut preferred_depth = slice.open_start;
        let mut content = slice.content.clone();
        for i in 0.. {
            let node = content.first_child().cloned();
            left_nodes.push(node.clone());
            if i == slice.open_start {
                break;
            }
            content = node.map(|n| n.content().clone()).unwrap_or_default();
        }
        // Back up preferred depth to cover defining textblocks directly above it, possibly
        // skipping a non-defining textblock.
        for d in (0..preferred_depth).rev() {
            let left = match &left_nodes[d] {
                Some(left) => left,
                None => break,
            };
            let def = defines_content(left.r#type());
            let target_parent = rp_from.node(preferred_target.unsigned_abs() - 1);
            if def && !left.same_markup(target_parent) {
                preferred_depth = d;
            } else if def || !left.r#type().is_textblock() {
                break;
            }
        }

        for j in (0..=slice.open_start).rev() {
            let open_depth = (j + preferred_depth + 1) % (slice.open_start + 1);
            let insert = match left_nodes.get(open_depth).cloned().flatten() {
                Some(insert) => insert,
                None => continue,
            };
            for i in 0..target_depths.len() {
                // Loop over possible expansion levels, starting with the preferred one.
                let target = target_depths[(i + preferred_target_index) % target_depths.len()];
                let expand = target >= 0;
                let target_depth = target.unsigned_abs();
                let parent = rp_from.node(target_depth - 1);
                let index = rp_from.index(target_depth - 1);
                if parent.can_replace_with(index, index, insert.r#type(), Some(insert.marks())) {
                    let start = rp_from.before_level(target_depth);
                    let end = if expand {
                        rp_to.after_level(target_depth)
                    } else {
                        to
                    };
                    let closed = close_fragment(
                        &slice.content,
                        0,
                        slice.open_start,
                        open_depth,
                        None,
                    );
                    return self.replace(
                        start,
                        end,
                        &Slice::new(closed, open_depth, slice.open_end),
                    );
                }
            }
        }

        let start_steps = self.steps().len();
        let (mut from, mut to) = (from, to);
        for &depth in target_depths.iter().rev() {
            self.replace(from, to, slice)?;
            if self.steps().len() > start_steps {
                break;
            }
            if depth < 0 {
                continue;
            }
            from = rp_from.before_level(depth as usize);
            to = rp_to.after_level(depth as usize);
        }
        Ok(self)
    }

    /// Replace the given range with a node, but use `from` and `to` as hints, rather than
    /// precise positions. When from and to are the same and are at the start or end of a
    /// parent node in which the given node doesn't fit, this method may move them out
    /// towards a parent that does allow the given node to be placed. When the given range
    /// completely covers a parent node, this method may completely replace that parent node.
    pub fn replace_range_with(
        &mut self,
        from: usize,
        to: usize,
        node: Node,
    ) -> Result<&mut Self, TransformError> {
        let (mut from, mut to) = (from, to);
        if !node.is_inline() && from == to && self.doc().resolve(from)?.parent().content_size() > 0
        {
            if let Some(point) = insert_point(self.doc(), from, node.r#type()) {
                from = point;
                to = point;
            }
        }
        self.replace_range(from, to, &Slice::new(Fragment::from(node), 0, 0))
    }

    /// Delete the given range, expanding it to cover fully covered parent nodes until a valid
    /// replace is found.
    pub fn delete_range(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        let doc = self.doc().clone();
        let rp_from = doc.resolve(from)?;
        let rp_to = doc.resolve(to)?;
        let covered = covered_depths(&rp_from, &rp_to);
        for (i, &depth) in covered.iter().enumerate() {
            let last = i == covered.len() - 1;
            if (last && depth == 0) || rp_from.node(depth).r#type().content_match().valid_end() {
                return self.delete(rp_from.start(depth), rp_to.end(depth));
            }
            if depth > 0
                && (last
                    || rp_from.node(depth - 1).can_replace(
                        rp_from.index(depth - 1),
                        rp_to.index_after(depth - 1),
                        &Fragment::new(),
                        0,
                        0,
                    ))
            {
                return self.delete(rp_from.before_level(depth), rp_to.after_level(depth));
            }
        }
        for d in 1..=rp_from.depth.min(rp_to.depth) {
            if from - rp_from.start(d) == rp_from.depth - d
                && to > rp_from.end(d)
                && rp_to.end(d) - to != rp_to.depth - d
                && rp_from.start(d - 1) == rp_to.start(d - 1)
                && rp_from.node(d - 1).can_replace(
                    rp_from.index(d - 1),
                    rp_to.index(d - 1),
                    &Fragment::new(),
                    0,
                    0,
                )
            {
                return self.delete(rp_from.before_level(d), to);
            }
        }
        self.delete(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::replace_step;
    use crate::markdown::helper::{blockquote, doc, h1, hr, li, node, ol, p};
    use crate::model::{Fragment, Slice};
    use crate::transform::Transform;

    fn slice(content: Vec<crate::model::Node>, open_start: usize, open_end: usize) -> Slice {
        Slice::new(Fragment::from(content), open_start, open_end)
    }

    #[test]
    fn replaces_inline_content() {
        let mut tr = Transform::new(doc(p("hello")));
        tr.replace(3, 4, &slice(vec![node("X")], 0, 0)).unwrap();
        assert_eq!(tr.doc(), &doc(p("heXlo")));
    }

    #[test]
    fn joins_blocks_when_deleting_across_them() {
        let mut tr = Transform::new(doc((p("ab"), p("cd"))));
        tr.delete(2, 6).unwrap();
        assert_eq!(tr.doc(), &doc(p("ad")));
    }

    #[test]
    fn skips_empty_replacements() {
        let d = doc(p("ab"));
        assert!(replace_step(&d, 2, 2, &Slice::empty()).unwrap().is_none());
        assert!(replace_step(&d, 9, 9, &slice(vec![node("X")], 0, 0)).is_err());
    }

    #[test]
    fn wraps_content_that_does_not_fit() {
        let mut tr = Transform::new(doc(p("a")));
        tr.replace(3, 3, &slice(vec![li(p("x"))], 0, 0)).unwrap();
        assert_eq!(tr.doc(), &doc((p("a"), ol(li(p("x"))))));
    }

    #[test]
    fn splits_paragraphs_on_open_paste() {
        let mut tr = Transform::new(doc(p("abcd")));
        tr.replace_range(3, 3, &slice(vec![p("X"), p("Y")], 1, 1))
            .unwrap();
        assert_eq!(tr.doc(), &doc((p("abX"), p("Ycd"))));
    }

    #[test]
    fn keeps_defining_parents_of_the_slice() {
        let mut tr = Transform::new(doc(p("ab")));
        tr.replace_range(1, 3, &slice(vec![h1("X")], 1, 1)).unwrap();
        assert_eq!(tr.doc(), &doc(h1("X")));
    }

    #[test]
    fn moves_block_nodes_out_of_textblocks() {
        let mut tr = Transform::new(doc(p("ab")));
        tr.replace_range_with(3, 3, hr()).unwrap();
        assert_eq!(tr.doc(), &doc((p("ab"), hr())));
    }

    #[test]
    fn deletes_covered_parents() {
        let mut tr = Transform::new(doc((blockquote(p("a")), p("b"))));
        tr.delete_range(1, 4).unwrap();
        assert_eq!(tr.doc(), &doc(p("b")));

        let mut tr = Transform::new(doc((blockquote(p("a")), p("b"))));
        tr.delete_range(2, 3).unwrap();
        assert_eq!(tr.doc(), &doc((blockquote(p(())), p("b"))));
    }
}
