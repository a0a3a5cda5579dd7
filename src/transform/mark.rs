use super::{
    AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep, ReplaceStep, Span, Step,
    Transform, TransformError,
};
use crate::model::{ContentMatch, Fragment, Mark, MarkType, NodeType, Slice, Whitespace};

/// Selects the marks to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkFilter {
    /// Every mark
    All,
    /// Every mark of the given type
    Type(MarkType),
    /// Only this exact mark
    Mark(Mark),
}

impl From<Mark> for MarkFilter {
    fn from(mark: Mark) -> Self {
        MarkFilter::Mark(mark)
    }
}

impl From<MarkType> for MarkFilter {
    fn from(r#type: MarkType) -> Self {
        MarkFilter::Type(r#type)
    }
}

impl MarkFilter {
    fn matching(&self, marks: &[Mark]) -> Vec<Mark> {
        match self {
            MarkFilter::All => marks.to_vec(),
            MarkFilter::Mark(mark) if mark.is_in_set(marks) => vec![mark.clone()],
            MarkFilter::Mark(_) => Vec::new(),
            MarkFilter::Type(r#type) => {
                let mut set = marks.to_vec();
                let mut found = Vec::new();
                while let Some(mark) = r#type.is_in_set(&set).cloned() {
                    set = mark.remove_from_set(&set);
                    found.push(mark);
                }
                found
            }
        }
    }
}

struct Matched {
    style: Mark,
    from: usize,
    to: usize,
    step: usize,
}

/// Offsets (in utf-16 units) and lengths of the line breaks in a text.
fn newlines(text: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut offset = 0;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                found.push((offset, 2));
                offset += 2;
            }
            '\r' | '\n' => {
                found.push((offset, 1));
                offset += 1;
            }
            c => offset += c.len_utf16(),
        }
    }
    found
}

impl Transform {
    /// Add the given mark to the inline content between `from` and `to`.
    pub fn add_mark(
        &mut self,
        from: usize,
        to: usize,
        mark: &Mark,
    ) -> Result<&mut Self, TransformError> {
        let mut removed: Vec<RemoveMarkStep> = Vec::new();
        let mut added: Vec<AddMarkStep> = Vec::new();
        self.doc().nodes_between(from, to, |node, pos, parent, _| {
            if !node.is_inline() {
                return true;
            }
            let marks = node.marks();
            let allowed = parent.map_or(false, |p| p.r#type().allows_mark_type(mark.r#type()));
            if mark.is_in_set(marks) || !allowed {
                return true;
            }
            let start = pos.max(from);
            let end = (pos + node.node_size()).min(to);
            let new_set = mark.add_to_set(marks);

            for old in marks.iter().filter(|m| !m.is_in_set(&new_set)) {
                match removed.last_mut() {
                    Some(step) if step.span.to == start && step.mark == *old => step.span.to = end,
                    _ => removed.push(RemoveMarkStep::new(Span::new(start, end), old.clone())),
                }
            }
            match added.last_mut() {
                Some(step) if step.span.to == start => step.span.to = end,
                _ => added.push(AddMarkStep::new(Span::new(start, end), mark.clone())),
            }
            true
        });

        for step in removed {
            self.step(Step::RemoveMark(step))?;
        }
        for step in added {
            self.step(Step::AddMark(step))?;
        }
        Ok(self)
    }

    /// Remove marks from inline nodes between `from` and `to`. The filter selects a single
    /// mark, all marks of a type, or every mark.
    pub fn remove_mark<F: Into<MarkFilter>>(
        &mut self,
        from: usize,
        to: usize,
        filter: F,
    ) -> Result<&mut Self, TransformError> {
        let filter = filter.into();
        let mut matched: Vec<Matched> = Vec::new();
        let mut step = 0;
        self.doc().nodes_between(from, to, |node, pos, _, _| {
            if !node.is_inline() {
                return true;
            }
            step += 1;
            let to_remove = filter.matching(node.marks());
            if to_remove.is_empty() {
                return true;
            }
            let end = (pos + node.node_size()).min(to);
            for style in to_remove {
                let found = matched
                    .iter_mut()
                    .filter(|m| m.step + 1 == step && m.style == style)
                    .last();
                match found {
                    Some(m) => {
                        m.to = end;
                        m.step = step;
                    }
                    None => matched.push(Matched {
                        style,
                        from: pos.max(from),
                        to: end,
                        step,
                    }),
                }
            }
            true
        });

        for m in matched {
            self.step(Step::RemoveMark(RemoveMarkStep::new(
                Span::new(m.from, m.to),
                m.style,
            )))?;
        }
        Ok(self)
    }

    /// Add a mark to the node at position `pos`.
    pub fn add_node_mark(&mut self, pos: usize, mark: Mark) -> Result<&mut Self, TransformError> {
        self.step(Step::AddNodeMark(AddNodeMarkStep::new(pos, mark)))
    }

    /// Remove a mark (or all marks of the given type, or every mark) from the node at `pos`.
    pub fn remove_node_mark<F: Into<MarkFilter>>(
        &mut self,
        pos: usize,
        filter: F,
    ) -> Result<&mut Self, TransformError> {
        let node = self
            .doc()
            .node_at(pos)
            .ok_or(TransformError::NoNodeAt(pos))?;
        let marks = filter.into().matching(node.marks());
        for mark in marks {
            self.step(Step::RemoveNodeMark(RemoveNodeMarkStep::new(pos, mark)))?;
        }
        Ok(self)
    }

    /// Removes all marks and nodes from the content of the node at `pos` that don't match the
    /// given new parent node type. Accepts an optional starting content match as third argument.
    pub fn clear_incompatible(
        &mut self,
        pos: usize,
        parent_type: &NodeType,
        content_match: Option<ContentMatch>,
    ) -> Result<&mut Self, TransformError> {
        let node = self
            .doc()
            .node_at(pos)
            .cloned()
            .ok_or(TransformError::NoNodeAt(pos))?;
        let mut content_match = content_match.unwrap_or_else(|| parent_type.content_match());
        let mut replacements = Vec::new();
        let mut cur = pos + 1;
        for child in node.content().iter() {
            let end = cur + child.node_size();
            match content_match.match_type(child.r#type()) {
                None => replacements.push(ReplaceStep::new(cur, end, Slice::empty(), false)),
                Some(allowed) => {
                    content_match = allowed;
                    for mark in child.marks() {
                        if !parent_type.allows_mark_type(mark.r#type()) {
                            self.step(Step::RemoveMark(RemoveMarkStep::new(
                                Span::new(cur, end),
                                mark.clone(),
                            )))?;
                        }
                    }
                    if let Some(text) = child.text() {
                        if parent_type.whitespace() != Whitespace::Pre {
                            let breaks = newlines(text);
                            if !breaks.is_empty() {
                                let marks = parent_type.allowed_marks(child.marks());
                                let space = parent_type.schema().text(" ", &marks)?;
                                let slice = Slice::new(Fragment::from(space), 0, 0);
                                for (offset, len) in breaks {
                                    replacements.push(ReplaceStep::new(
                                        cur + offset,
                                        cur + offset + len,
                                        slice.clone(),
                                        false,
                                    ));
                                }
                            }
                        }
                    }
                }
            }
            cur = end;
        }
        if !content_match.valid_end() {
            let fill = content_match
                .fill_before(&Fragment::new(), true, 0)
                .unwrap_or_default();
            self.replace(cur, cur, &Slice::new(fill, 0, 0))?;
        }
        for step in replacements.into_iter().rev() {
            self.step(Step::Replace(step))?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{newlines, MarkFilter};
    use crate::markdown::helper::{a, code_block, doc, em, img, mark, p, strong};
    use crate::markdown::schema;
    use crate::transform::Transform;
    use serde_json::json;

    #[test]
    fn adds_a_mark_across_blocks() {
        let d = doc((p("ab"), p("cd")));
        let mut tr = Transform::new(d);
        tr.add_mark(2, 6, &mark("em")).unwrap();
        assert_eq!(tr.doc(), &doc((p(("a", em("b"))), p((em("c"), "d")))));
        assert_eq!(tr.steps().len(), 2);
    }

    #[test]
    fn replaces_marks_of_the_same_type() {
        let s = schema();
        let href = json!({ "href": "y" });
        let link = s.mark("link", href.as_object()).unwrap();
        let mut tr = Transform::new(doc(p(a("x", "ab"))));
        tr.add_mark(1, 3, &link).unwrap();
        assert_eq!(tr.doc(), &doc(p(a("y", "ab"))));
        assert_eq!(tr.steps().len(), 2);
    }

    #[test]
    fn removes_marks_by_type() {
        let s = schema();
        let mut tr = Transform::new(doc(p((em("ab"), "c", em("d")))));
        tr.remove_mark(0, 6, s.mark_type("em").unwrap()).unwrap();
        assert_eq!(tr.doc(), &doc(p("abcd")));
        assert_eq!(tr.steps().len(), 2);
    }

    #[test]
    fn removes_all_or_single_marks() {
        let mut tr = Transform::new(doc(p((em("a"), strong("b")))));
        tr.remove_mark(0, 4, MarkFilter::All).unwrap();
        assert_eq!(tr.doc(), &doc(p("ab")));

        let mut tr = Transform::new(doc(p(em("ab"))));
        tr.remove_mark(1, 3, mark("strong")).unwrap();
        assert!(tr.steps().is_empty());
        tr.remove_mark(1, 3, mark("em")).unwrap();
        assert_eq!(tr.doc(), &doc(p("ab")));
    }

    #[test]
    fn marks_and_unmarks_single_nodes() {
        let d = doc(p(img("x.png")));
        let mut tr = Transform::new(d.clone());
        tr.add_node_mark(1, mark("em")).unwrap();
        assert_eq!(tr.doc().node_at(1).unwrap().marks(), &[mark("em")]);
        tr.remove_node_mark(1, MarkFilter::All).unwrap();
        assert_eq!(tr.doc(), &d);
        assert!(tr.remove_node_mark(9, MarkFilter::All).is_err());
    }

    #[test]
    fn clears_nodes_and_newlines() {
        let s = schema();
        let mut tr = Transform::new(doc(p(("a", img("x.png")))));
        tr.clear_incompatible(0, &s.node_type("code_block").unwrap(), None)
            .unwrap();
        assert_eq!(tr.doc(), &doc(p("a")));

        let mut tr = Transform::new(doc(code_block("", "a\nb")));
        tr.set_block_type(1, 1, &s.node_type("paragraph").unwrap(), None)
            .unwrap();
        assert_eq!(tr.doc(), &doc(p("a b")));
    }

    #[test]
    fn finds_line_breaks() {
        assert_eq!(newlines("a\r\nb\nc\r"), [(1, 2), (4, 1), (6, 1)]);
        assert_eq!(newlines("\u{1F600}\n"), [(2, 1)]);
        assert!(newlines("plain").is_empty());
    }
}
