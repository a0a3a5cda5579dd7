use super::{Mappable, Step, StepMap};
use crate::model::{IndexError, JsonError, Node, NodeError, ReplaceError, ResolveErr, Schema};
use displaydoc::Display;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Different ways a step application can fail
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum StepError {
    /// Structure replace would overwrite content
    WouldOverwrite,
    /// Structure gap-replace would overwrite content
    GapWouldOverwrite,
    /// Gap is not a flat range
    GapNotFlat,
    /// Content does not fit in gap
    GapNotFit,
    /// No node at position {0}
    NoNode(usize),
    /// Step positions are out of order
    InvalidRange,
    /// Invalid indices: {0}
    Resolve(#[from] ResolveErr),
    /// Invalid replace: {0}
    Replace(#[from] ReplaceError),
    /// Invalid index: {0}
    Index(#[from] IndexError),
    /// Invalid node: {0}
    Node(#[from] NodeError),
    /// {0}
    Custom(String),
}

/// The result of [applying](StepKind::apply) a step. Contains either a
/// new document or a failure value.
pub type StepResult = Result<Node, StepError>;

/// A step object represents an atomic change.
///
/// It generally applies only to the document it was created for, since the positions
/// stored in it will only make sense for that document.
pub trait StepKind {
    /// Applies this step to the given document, returning a result
    /// object that either indicates failure, if the step can not be
    /// applied to this document, or indicates success by containing a
    /// transformed document.
    fn apply(&self, doc: &Node) -> StepResult;

    /// Get the step map that represents the changes made by this step, and which can be used
    /// to transform between positions in the old and the new document.
    fn get_map(&self) -> StepMap {
        StepMap::empty()
    }

    /// Create an inverted version of this step. Needs the document as it was before the step
    /// as argument.
    fn invert(&self, doc: &Node) -> Result<Step, StepError>;

    /// Map this step through a mappable thing, returning either a version of that step with
    /// its positions adjusted, or `None` if the step was entirely deleted by the mapping.
    fn map(&self, mapping: &dyn Mappable) -> Option<Step>;

    /// Try to merge this step with another one, to be applied directly after it. Returns the
    /// merged step when possible, `None` if the steps can't be merged.
    fn merge(&self, _other: &Step) -> Option<Step> {
        None
    }
}

/// A step type defined outside of this crate.
pub trait CustomStep: StepKind + fmt::Debug + Send + Sync {
    /// The JSON id this step type was registered with.
    fn step_type(&self) -> &str;

    /// The JSON fields of this step, without the `stepType`.
    fn to_json(&self) -> Value;
}

/// A function reading a step from JSON.
pub type StepParser = fn(&Schema, &Value) -> Result<Step, JsonError>;

/// Errors when registering JSON parsers
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum RegistryError {
    /// Duplicate use of {kind} JSON ID {id}
    Duplicate {
        /// Step or selection
        kind: &'static str,
        /// The id that was already taken
        id: String,
    },
}

/// The JSON parsers for steps, by `stepType`.
#[derive(Clone)]
pub struct StepRegistry {
    parsers: IndexMap<String, StepParser>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.parsers.keys()).finish()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        let mut parsers: IndexMap<String, StepParser> = IndexMap::new();
        parsers.insert("replace".into(), super::replace_step::parse_replace);
        parsers.insert("replaceAround".into(), super::replace_step::parse_replace_around);
        parsers.insert("addMark".into(), super::mark_step::parse_add_mark);
        parsers.insert("removeMark".into(), super::mark_step::parse_remove_mark);
        parsers.insert("addNodeMark".into(), super::mark_step::parse_add_node_mark);
        parsers.insert("removeNodeMark".into(), super::mark_step::parse_remove_node_mark);
        parsers.insert("attr".into(), super::attr_step::parse_attr);
        parsers.insert("docAttr".into(), super::attr_step::parse_doc_attr);
        Self { parsers }
    }
}

impl StepRegistry {
    /// A registry with the built-in step types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser for the given `stepType`. Ids can only be taken once.
    pub fn register(&mut self, id: &str, parser: StepParser) -> Result<(), RegistryError> {
        if self.parsers.contains_key(id) {
            return Err(RegistryError::Duplicate {
                kind: "step",
                id: id.to_owned(),
            });
        }
        self.parsers.insert(id.to_owned(), parser);
        Ok(())
    }

    /// Whether a parser for the given id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.parsers.contains_key(id)
    }

    /// Deserialize a step from its JSON representation.
    pub fn from_json(&self, schema: &Schema, json: &Value) -> Result<Step, JsonError> {
        let id = json
            .get("stepType")
            .and_then(Value::as_str)
            .ok_or(JsonError::Invalid("Step"))?;
        let parser = self.parsers.get(id).ok_or_else(|| JsonError::UnknownTypeId {
            kind: "step",
            id: id.to_owned(),
        })?;
        parser(schema, json)
    }
}
