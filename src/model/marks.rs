use super::{Attrs, MarkType};
use std::fmt;

/// A set of marks, sorted by rank
pub type MarkSet = Vec<Mark>;

/// A mark is a piece of information that can be attached to a node, such as it being emphasized,
/// in code font, or a link. It has a type and optionally a set of attributes that provide further
/// information (such as the target of the link).
#[derive(Clone, PartialEq, Eq)]
pub struct Mark {
    r#type: MarkType,
    attrs: Attrs,
}

impl Mark {
    pub(crate) fn new(r#type: MarkType, attrs: Attrs) -> Self {
        Mark { r#type, attrs }
    }

    /// The type of this mark.
    pub fn r#type(&self) -> &MarkType {
        &self.r#type
    }

    /// The attributes associated with this mark.
    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// Given a set of marks, create a new set which contains this one as well, in the right
    /// position. If this mark is already in the set, the set itself is returned. If any marks
    /// that are set to be exclusive with this mark are present, those are replaced by this one.
    pub fn add_to_set(&self, set: &[Mark]) -> MarkSet {
        let mut copy: Option<MarkSet> = None;
        let mut placed = false;
        for (i, other) in set.iter().enumerate() {
            if self == other {
                return set.to_vec();
            }
            if self.r#type.excludes(&other.r#type) {
                copy.get_or_insert_with(|| set[..i].to_vec());
            } else if other.r#type.excludes(&self.r#type) {
                return set.to_vec();
            } else {
                if !placed && other.r#type.rank() > self.r#type.rank() {
                    copy.get_or_insert_with(|| set[..i].to_vec()).push(self.clone());
                    placed = true;
                }
                if let Some(copy) = &mut copy {
                    copy.push(other.clone());
                }
            }
        }
        let mut copy = copy.unwrap_or_else(|| set.to_vec());
        if !placed {
            copy.push(self.clone());
        }
        copy
    }

    /// Remove this mark from the given set, returning a new set. If this mark is not in the set,
    /// the set itself is returned.
    pub fn remove_from_set(&self, set: &[Mark]) -> MarkSet {
        set.iter().filter(|m| *m != self).cloned().collect()
    }

    /// Test whether this mark is in the given set of marks.
    pub fn is_in_set(&self, set: &[Mark]) -> bool {
        set.iter().any(|m| m == self)
    }

    /// Test whether two sets of marks are identical.
    pub fn same_set(a: &[Mark], b: &[Mark]) -> bool {
        a == b
    }

    /// Create a properly sorted mark set from an unordered collection of marks. Duplicates are
    /// dropped and exclusions are applied in order.
    pub fn set_from(marks: &[Mark]) -> MarkSet {
        marks
            .iter()
            .fold(MarkSet::new(), |set, mark| mark.add_to_set(&set))
    }
}

impl fmt::Debug for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.r#type.name())?;
        if !self.attrs.is_empty() {
            write!(f, "{}", serde_json::Value::Object(self.attrs.clone()))?;
        }
        Ok(())
    }
}
