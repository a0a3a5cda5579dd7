use super::{util, Index, IndexError, Node};
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;

/// A fragment represents a node's collection of child nodes.
///
/// Like nodes, fragments are persistent data structures, and you should not mutate them or their
/// content. Rather, you create new instances whenever needed. The API tries to make this easy.
#[derive(Clone)]
pub struct Fragment {
    inner: Arc<[Node]>,
    size: usize,
}

/// The positions at which two fragments stop being equal, counted from their ends.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiffEnd {
    /// The position in the first fragment
    pub a: usize,
    /// The position in the second fragment
    pub b: usize,
}

type Visitor<'v> = dyn FnMut(&Node, usize, Option<&Node>, usize) -> bool + 'v;

impl Fragment {
    /// Create a new empty fragment
    pub fn new() -> Self {
        Self::default()
    }

    fn from_parts(inner: Vec<Node>, size: usize) -> Self {
        Fragment {
            inner: Arc::from(inner),
            size,
        }
    }

    /// Whether both fragments share the same storage.
    pub fn ptr_eq(a: &Fragment, b: &Fragment) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The size of the fragment, which is the total of the size of its content nodes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a slice to all child nodes
    pub fn children(&self) -> &[Node] {
        &self.inner[..]
    }

    /// Iterate over the child nodes
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.inner.iter()
    }

    /// The first child of the fragment wrapped in `Some`, or `None` if it is empty.
    pub fn first_child(&self) -> Option<&Node> {
        self.inner.first()
    }

    /// The last child of the fragment wrapped in `Some`, or `None` if it is empty.
    pub fn last_child(&self) -> Option<&Node> {
        self.inner.last()
    }

    /// The number of child nodes in this fragment.
    pub fn child_count(&self) -> usize {
        self.inner.len()
    }

    /// Get the child node at the given index. Panics when the index is out of range.
    pub fn child(&self, index: usize) -> &Node {
        &self.inner[index]
    }

    /// Get the child node at the given index, if it exists.
    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.inner.get(index)
    }

    /// Invoke a callback for all descendant nodes between the given two positions (relative to
    /// start of this fragment). The callback gets the node, its position, its parent and its
    /// index in the parent. Doesn't descend into a node when the callback returns `false`.
    pub fn nodes_between<F>(&self, from: usize, to: usize, mut f: F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.visit_between(from, to, &mut f, 0, None)
    }

    pub(crate) fn visit_between(
        &self,
        from: usize,
        to: usize,
        f: &mut Visitor,
        node_start: usize,
        parent: Option<&Node>,
    ) {
        let mut pos = 0;
        for (i, child) in self.inner.iter().enumerate() {
            if pos >= to {
                break;
            }
            let end = pos + child.node_size();
            if end > from && f(child, node_start + pos, parent, i) && child.content().size() > 0 {
                let start = pos + 1;
                child.content().visit_between(
                    from.saturating_sub(start),
                    usize::min(child.content().size(), to - start),
                    f,
                    node_start + start,
                    Some(child),
                );
            }
            pos = end;
        }
    }

    /// Call `f` for every child node, passing the node, its offset into this fragment, and its
    /// index.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Node, usize, usize),
    {
        let mut pos = 0;
        for (i, child) in self.inner.iter().enumerate() {
            f(child, pos, i);
            pos += child.node_size();
        }
    }

    /// Call the given callback for every descendant node.
    pub fn descendants<F>(&self, f: F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.size, f)
    }

    /// Extract the text between `from` and `to`. When `block_separator` is given, it is inserted
    /// between the text of separate blocks. When `leaf_text` is given, it is inserted for every
    /// non-text leaf node encountered.
    pub fn text_between(
        &self,
        from: usize,
        to: usize,
        block_separator: Option<&str>,
        leaf_text: Option<&str>,
    ) -> String {
        let mut text = String::new();
        let mut first = true;
        self.nodes_between(from, to, |node, pos, _, _| {
            let node_text = if let Some(t) = node.text() {
                util::slice_utf16(t, from.saturating_sub(pos), to - pos)
            } else if !node.is_leaf() {
                ""
            } else {
                leaf_text.unwrap_or("")
            };
            let separates =
                (node.is_block() && node.is_leaf() && !node_text.is_empty()) || node.is_textblock();
            if let Some(separator) = block_separator.filter(|_| separates) {
                if first {
                    first = false;
                } else {
                    text.push_str(separator);
                }
            }
            text.push_str(node_text);
            true
        });
        text
    }

    /// Create a new fragment containing the combined content of this fragment and the other.
    pub fn append(&self, other: Fragment) -> Fragment {
        if other.size == 0 {
            return self.clone();
        }
        if self.size == 0 {
            return other;
        }
        let mut content = self.inner.to_vec();
        let mut rest = other.inner.iter();
        if let (Some(last), Some(first)) = (content.last_mut(), other.first_child()) {
            if let (Some(a), Some(b)) = (last.text(), first.text()) {
                if last.same_markup(first) {
                    *last = last.with_text(format!("{}{}", a, b));
                    rest.next();
                }
            }
        }
        content.extend(rest.cloned());
        Fragment::from_parts(content, self.size + other.size)
    }

    /// Cut out the sub-fragment between the two given positions.
    pub fn cut<R: RangeBounds<usize>>(&self, range: R) -> Fragment {
        let from = util::from(&range);
        let to = util::to(&range, self.size);

        if from == 0 && to == self.size {
            return self.clone();
        }

        let mut result = vec![];
        let mut size = 0;
        if to > from {
            let mut pos = 0;
            for child in self.inner.iter() {
                if pos >= to {
                    break;
                }
                let end = pos + child.node_size();
                if end > from {
                    let new_child = if pos < from || end > to {
                        if child.is_text() {
                            child.cut(from.saturating_sub(pos)..usize::min(child.node_size(), to - pos))
                        } else {
                            child.cut(
                                from.saturating_sub(pos + 1)
                                    ..usize::min(child.content().size(), to - pos - 1),
                            )
                        }
                    } else {
                        child.clone()
                    };
                    size += new_child.node_size();
                    result.push(new_child);
                }
                pos = end;
            }
        }
        Fragment::from_parts(result, size)
    }

    /// Cut out the children between the two given indices.
    pub fn cut_by_index(&self, from: usize, to: usize) -> Fragment {
        if from == to {
            return Fragment::new();
        }
        if from == 0 && to == self.inner.len() {
            return self.clone();
        }
        Fragment::from(self.inner[from..to].to_vec())
    }

    /// Create a new fragment in which the node at the given index is replaced by the given node.
    pub fn replace_child(&self, index: usize, node: Node) -> Fragment {
        let current = &self.inner[index];
        if Node::ptr_eq(current, &node) {
            return self.clone();
        }
        let size = self.size + node.node_size() - current.node_size();
        let mut copy = self.inner.to_vec();
        copy[index] = node;
        Fragment::from_parts(copy, size)
    }

    /// Create a new fragment by prepending the given node to this fragment.
    pub fn add_to_start(&self, node: Node) -> Fragment {
        Fragment::from(node).append(self.clone())
    }

    /// Create a new fragment by appending the given node to this fragment.
    pub fn add_to_end(&self, node: Node) -> Fragment {
        self.append(Fragment::from(node))
    }

    /// Find the index and inner offset corresponding to a given relative position in this
    /// fragment. With `round` set, a position inside a child rounds to the index after it.
    pub fn find_index(&self, pos: usize, round: bool) -> Result<Index, IndexError> {
        if pos == 0 {
            return Ok(Index::new(0, pos));
        }
        if pos == self.size {
            return Ok(Index::new(self.inner.len(), pos));
        }
        if pos > self.size {
            return Err(IndexError {
                pos,
                size: self.size,
            });
        }
        let mut cur_pos = 0;
        for (i, cur) in self.inner.iter().enumerate() {
            let end = cur_pos + cur.node_size();
            if end >= pos {
                if end == pos || round {
                    return Ok(Index::new(i + 1, end));
                }
                return Ok(Index::new(i, cur_pos));
            }
            cur_pos = end;
        }
        Err(IndexError {
            pos,
            size: self.size,
        })
    }

    /// Find the first position at which this fragment and another fragment differ, or `None`
    /// if they are the same.
    pub fn find_diff_start(&self, other: &Fragment, pos: usize) -> Option<usize> {
        let mut pos = pos;
        for i in 0.. {
            if i == self.child_count() || i == other.child_count() {
                return if self.child_count() == other.child_count() {
                    None
                } else {
                    Some(pos)
                };
            }
            let (a, b) = (self.child(i), other.child(i));
            if Node::ptr_eq(a, b) {
                pos += a.node_size();
                continue;
            }
            if !a.same_markup(b) {
                return Some(pos);
            }
            if let (Some(ta), Some(tb)) = (a.text(), b.text()) {
                if ta != tb {
                    let (ua, ub) = (util::utf16_units(ta), util::utf16_units(tb));
                    let same = ua.iter().zip(ub.iter()).take_while(|(x, y)| x == y).count();
                    return Some(pos + same);
                }
            }
            if a.content().size() > 0 || b.content().size() > 0 {
                if let Some(inner) = a.content().find_diff_start(b.content(), pos + 1) {
                    return Some(inner);
                }
            }
            pos += a.node_size();
        }
        None
    }

    /// Find the first position, searching from the end, at which this fragment and the given
    /// fragment differ, or `None` if they are the same. Since this position will not be the same
    /// in both nodes, an object with two separate positions is returned.
    pub fn find_diff_end(&self, other: &Fragment, pos_a: usize, pos_b: usize) -> Option<DiffEnd> {
        let (mut pos_a, mut pos_b) = (pos_a, pos_b);
        let (mut i_a, mut i_b) = (self.child_count(), other.child_count());
        loop {
            if i_a == 0 || i_b == 0 {
                return if i_a == i_b {
                    None
                } else {
                    Some(DiffEnd { a: pos_a, b: pos_b })
                };
            }
            i_a -= 1;
            i_b -= 1;
            let (a, b) = (self.child(i_a), other.child(i_b));
            let size = a.node_size();
            if Node::ptr_eq(a, b) {
                pos_a -= size;
                pos_b -= size;
                continue;
            }
            if !a.same_markup(b) {
                return Some(DiffEnd { a: pos_a, b: pos_b });
            }
            if let (Some(ta), Some(tb)) = (a.text(), b.text()) {
                if ta != tb {
                    let (ua, ub) = (util::utf16_units(ta), util::utf16_units(tb));
                    let same = ua
                        .iter()
                        .rev()
                        .zip(ub.iter().rev())
                        .take_while(|(x, y)| x == y)
                        .count();
                    return Some(DiffEnd {
                        a: pos_a - same,
                        b: pos_b - same,
                    });
                }
            }
            if a.content().size() > 0 || b.content().size() > 0 {
                if let Some(inner) = a.content().find_diff_end(b.content(), pos_a - 1, pos_b - 1) {
                    return Some(inner);
                }
            }
            pos_a -= size;
            pos_b -= size;
        }
    }

    pub(crate) fn fmt_inner(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, child) in self.inner.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            fmt::Display::fmt(child, f)?;
        }
        Ok(())
    }
}

impl Default for Fragment {
    fn default() -> Self {
        Fragment {
            inner: Arc::from(Vec::new()),
            size: 0,
        }
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        Fragment::ptr_eq(self, other) || self.inner[..] == other.inner[..]
    }
}

impl Eq for Fragment {}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        self.fmt_inner(f)?;
        f.write_str(">")
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Fragment {
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        self.inner.serialize(serializer)
    }
}

impl<'a> IntoIterator for &'a Fragment {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

/// Builds a fragment from an array of nodes, joining adjacent text nodes with the same marks.
impl From<Vec<Node>> for Fragment {
    fn from(src: Vec<Node>) -> Fragment {
        let mut joined: Vec<Node> = Vec::with_capacity(src.len());
        let mut size = 0;
        for node in src {
            size += node.node_size();
            if let Some(last) = joined.last_mut() {
                if let (Some(a), Some(b)) = (last.text(), node.text()) {
                    if last.same_markup(&node) {
                        *last = last.with_text(format!("{}{}", a, b));
                        continue;
                    }
                }
            }
            joined.push(node);
        }
        Fragment::from_parts(joined, size)
    }
}

impl From<Node> for Fragment {
    fn from(node: Node) -> Fragment {
        let size = node.node_size();
        Fragment::from_parts(vec![node], size)
    }
}

impl From<Option<Node>> for Fragment {
    fn from(node: Option<Node>) -> Fragment {
        node.map(Fragment::from).unwrap_or_default()
    }
}

impl From<Fragment> for Vec<Node> {
    fn from(src: Fragment) -> Vec<Node> {
        src.inner.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::DiffEnd;
    use crate::markdown::helper::{blockquote, doc, em, h1, p, strong};
    use crate::model::{Fragment, Index};

    #[test]
    fn finds_indices() {
        let para = p(("Hallo", em("Foo")));
        let content = para.content();
        assert_eq!(content.find_index(0, false), Ok(Index::new(0, 0)));
        assert_eq!(content.find_index(3, false), Ok(Index::new(0, 0)));
        assert_eq!(content.find_index(3, true), Ok(Index::new(1, 5)));
        assert_eq!(content.find_index(5, false), Ok(Index::new(1, 5)));
        assert_eq!(content.find_index(7, false), Ok(Index::new(1, 5)));
        assert_eq!(content.find_index(8, false), Ok(Index::new(2, 8)));
        assert!(content.find_index(9, false).is_err());
    }

    #[test]
    fn joins_adjacent_text() {
        let para = p(("foo", "bar", em("baz")));
        assert_eq!(para.child_count(), 2);
        assert_eq!(para.child(0).text(), Some("foobar"));

        let joined = p("ab").content().append(p("cd").content().clone());
        assert_eq!(joined.child_count(), 1);
        assert_eq!(joined.size(), 4);
    }

    #[test]
    fn visits_children_with_offsets() {
        let d = doc((p("ab"), h1("c"), p(())));
        let mut seen = Vec::new();
        d.content().for_each(|node, offset, index| {
            seen.push((node.r#type().name().to_owned(), offset, index))
        });
        assert_eq!(
            seen,
            [
                ("paragraph".to_owned(), 0, 0),
                ("heading".to_owned(), 4, 1),
                ("paragraph".to_owned(), 7, 2)
            ]
        );
    }

    #[test]
    fn cuts_text_and_nodes() {
        let d = doc((p("hello"), blockquote(p("world"))));
        let cut = d.content().cut(2..10);
        assert_eq!(cut.to_string(), "<paragraph(\"ello\"), blockquote(paragraph(\"w\"))>");
        assert!(Fragment::ptr_eq(&d.content().cut(..), d.content()));
    }

    #[test]
    fn text_between_separates_blocks() {
        let d = doc((p("foo"), p(("bar", strong("baz")))));
        assert_eq!(d.content().text_between(0, d.content().size(), Some("|"), None), "foo|barbaz");
        assert_eq!(d.content().text_between(2, 8, Some("|"), None), "oo|ba");
        assert_eq!(d.text_content(), "foobarbaz");
    }

    #[test]
    fn diff_positions() {
        let a = doc((p("abc"), h1("x")));
        let b = doc((p("abd"), h1("x")));
        assert_eq!(a.content().find_diff_start(b.content(), 0), Some(3));
        assert_eq!(
            a.content().find_diff_end(b.content(), a.content().size(), b.content().size()),
            Some(DiffEnd { a: 4, b: 4 })
        );
        assert_eq!(a.content().find_diff_start(a.content(), 0), None);

        let c = doc((p("abc"), h1("x"), p("more")));
        assert_eq!(a.content().find_diff_start(c.content(), 0), Some(8));
    }
}
