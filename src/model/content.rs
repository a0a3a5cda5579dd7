use super::content_expr::MatchState;
use super::schema::SchemaInner;
use super::util;
use super::{Fragment, Node, NodeType};
use displaydoc::Display;
use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;
use thiserror::Error;

/// Error on content matching
#[derive(Debug, Display, Error, PartialEq, Eq, Clone)]
pub enum ContentMatchError {
    /// Called contentMatchAt on a node with invalid content
    InvalidContent,
}

/// Instances of this type represent a match state of a node type's content
/// expression, and can be used to find out whether further content matches
/// here, and whether a given position is a valid end of the node.
#[derive(Clone)]
pub struct ContentMatch {
    schema: Arc<SchemaInner>,
    state: usize,
}

impl PartialEq for ContentMatch {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && Arc::ptr_eq(&self.schema, &other.schema)
    }
}

impl Eq for ContentMatch {}

impl fmt::Debug for ContentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentMatch({}", self.state)?;
        if self.valid_end() {
            f.write_str(", end")?;
        }
        for edge in &self.data().next {
            write!(
                f,
                ", {}->{}",
                self.schema.nodes[edge.node_type].name, edge.next
            )?;
        }
        f.write_str(")")
    }
}

impl ContentMatch {
    pub(crate) fn at(schema: &Arc<SchemaInner>, state: usize) -> Self {
        ContentMatch {
            schema: schema.clone(),
            state,
        }
    }

    fn data(&self) -> &MatchState {
        self.schema.automaton.state(self.state)
    }

    fn node_type(&self, index: usize) -> NodeType {
        NodeType::at(&self.schema, index)
    }

    /// True when this match state represents a valid end of the node.
    pub fn valid_end(&self) -> bool {
        self.data().valid_end
    }

    /// Match a node type, returning a match after that node if successful.
    pub fn match_type(&self, r#type: &NodeType) -> Option<ContentMatch> {
        if !Arc::ptr_eq(&self.schema, &r#type.schema) {
            return None;
        }
        self.data()
            .next
            .iter()
            .find(|edge| edge.node_type == r#type.index)
            .map(|edge| ContentMatch::at(&self.schema, edge.next))
    }

    /// Try to match a fragment. Returns the resulting match when successful.
    pub fn match_fragment(&self, fragment: &Fragment) -> Option<ContentMatch> {
        self.match_fragment_range(fragment, ..)
    }

    /// Try to match a part of a fragment. Returns the resulting match when successful.
    pub fn match_fragment_range<R: RangeBounds<usize>>(
        &self,
        fragment: &Fragment,
        range: R,
    ) -> Option<ContentMatch> {
        let start = util::from(&range);
        let end = util::to(&range, fragment.child_count());
        let mut cur = self.clone();
        for child in &fragment.children()[start..end] {
            cur = cur.match_type(child.r#type())?;
        }
        Some(cur)
    }

    /// Whether the first allowed node at this point is inline.
    pub fn inline_content(&self) -> bool {
        self.data()
            .next
            .first()
            .map_or(false, |edge| self.schema.nodes[edge.node_type].is_inline())
    }

    /// Get the first matching node type at this match position that can be
    /// generated.
    pub fn default_type(&self) -> Option<NodeType> {
        self.data()
            .next
            .iter()
            .map(|edge| &self.schema.nodes[edge.node_type])
            .position(|t| !(t.is_text || t.has_required_attrs()))
            .map(|i| self.node_type(self.data().next[i].node_type))
    }

    /// Whether this match and the other share a possible next node type.
    pub fn compatible(&self, other: &ContentMatch) -> bool {
        self.data()
            .next
            .iter()
            .any(|a| other.data().next.iter().any(|b| a.node_type == b.node_type))
    }

    /// The number of outgoing edges this node has in the finite automaton
    /// that describes the content expression.
    pub fn edge_count(&self) -> usize {
        self.data().next.len()
    }

    /// Get the _n_th outgoing edge from this node in the finite automaton
    /// that describes the content expression.
    pub fn edge(&self, n: usize) -> Option<(NodeType, ContentMatch)> {
        self.data().next.get(n).map(|edge| {
            (
                self.node_type(edge.node_type),
                ContentMatch::at(&self.schema, edge.next),
            )
        })
    }

    /// Try to match the given fragment, and if that fails, see if it can be
    /// made to match by inserting nodes in front of it. When successful,
    /// return a fragment of inserted nodes (which may be empty if nothing had
    /// to be inserted). When `to_end` is true, only return a fragment if the
    /// resulting match goes to the end of the content expression.
    pub fn fill_before(&self, after: &Fragment, to_end: bool, start_index: usize) -> Option<Fragment> {
        let mut seen = vec![self.state];
        self.search_fill(after, to_end, start_index, &mut seen, &mut Vec::new())
    }

    fn search_fill(
        &self,
        after: &Fragment,
        to_end: bool,
        start_index: usize,
        seen: &mut Vec<usize>,
        types: &mut Vec<NodeType>,
    ) -> Option<Fragment> {
        if let Some(finished) = self.match_fragment_range(after, start_index..) {
            if !to_end || finished.valid_end() {
                let filled: Option<Vec<Node>> = types
                    .iter()
                    .map(|t| t.create_and_fill(None, Fragment::new(), &[]).ok().flatten())
                    .collect();
                if let Some(filled) = filled {
                    return Some(Fragment::from(filled));
                }
            }
        }
        for edge in &self.data().next {
            let data = &self.schema.nodes[edge.node_type];
            if !(data.is_text || data.has_required_attrs()) && !seen.contains(&edge.next) {
                seen.push(edge.next);
                types.push(self.node_type(edge.node_type));
                let next = ContentMatch::at(&self.schema, edge.next);
                if let Some(found) = next.search_fill(after, to_end, start_index, seen, types) {
                    return Some(found);
                }
                types.pop();
            }
        }
        None
    }

    /// Find a set of wrapping node types that would allow a node of the given
    /// type to appear at this position. The result may be empty (when it fits
    /// directly) and will be `None` when no such wrapping exists.
    pub fn find_wrapping(&self, target: &NodeType) -> Option<Vec<NodeType>> {
        struct Active {
            state: ContentMatch,
            r#type: Option<usize>,
            via: Option<usize>,
        }

        let mut seen = vec![false; self.schema.nodes.len()];
        let mut visited: Vec<Active> = Vec::new();
        let mut queue = VecDeque::new();
        visited.push(Active {
            state: self.clone(),
            r#type: None,
            via: None,
        });
        queue.push_back(0);

        while let Some(current) = queue.pop_front() {
            let state = visited[current].state.clone();
            if state.match_type(target).is_some() {
                let mut result = Vec::new();
                let mut at = current;
                while let Some(t) = visited[at].r#type {
                    result.push(self.node_type(t));
                    match visited[at].via {
                        Some(via) => at = via,
                        None => break,
                    }
                }
                result.reverse();
                return Some(result);
            }
            for edge in &state.data().next {
                let data = &self.schema.nodes[edge.node_type];
                let ends_here = visited[current].r#type.is_none()
                    || self.schema.automaton.state(edge.next).valid_end;
                if !data.is_leaf() && !data.has_required_attrs() && !seen[edge.node_type] && ends_here {
                    seen[edge.node_type] = true;
                    visited.push(Active {
                        state: ContentMatch::at(&self.schema, data.content_match),
                        r#type: Some(edge.node_type),
                        via: Some(current),
                    });
                    queue.push_back(visited.len() - 1);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::markdown::helper::{doc, p};
    use crate::markdown::schema;
    use crate::model::Fragment;

    #[test]
    fn matches_and_fills() {
        let s = schema();
        let doc_type = s.node_type("doc").unwrap();
        let paragraph = s.node_type("paragraph").unwrap();
        let start = doc_type.content_match();
        assert!(!start.valid_end());
        let after = start.match_type(&paragraph).unwrap();
        assert!(after.valid_end());
        assert_eq!(start.default_type(), Some(paragraph.clone()));

        let filled = start.fill_before(&Fragment::new(), true, 0).unwrap();
        assert_eq!(filled.child_count(), 1);
        assert_eq!(filled.child(0).r#type(), &paragraph);

        let content = doc(vec![p("x")]).content().clone();
        assert_eq!(start.match_fragment(&content), Some(after));
    }

    #[test]
    fn finds_wrapping_for_list_items() {
        let s = schema();
        let start = s.node_type("doc").unwrap().content_match();
        let wrapping = start
            .find_wrapping(&s.node_type("list_item").unwrap())
            .unwrap();
        let names: Vec<&str> = wrapping.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["ordered_list"]);
        assert_eq!(
            start.find_wrapping(&s.node_type("paragraph").unwrap()),
            Some(vec![])
        );
        assert_eq!(start.find_wrapping(&s.text_type()), Some(vec![s.node_type("paragraph").unwrap()]));
    }

    #[test]
    fn compatible_and_inline_content() {
        let s = schema();
        let doc_match = s.node_type("doc").unwrap().content_match();
        let quote_match = s.node_type("blockquote").unwrap().content_match();
        let para_match = s.node_type("paragraph").unwrap().content_match();
        assert!(doc_match.compatible(&quote_match));
        assert!(!doc_match.compatible(&para_match));
        assert!(para_match.inline_content());
        assert!(!doc_match.inline_content());
    }
}
