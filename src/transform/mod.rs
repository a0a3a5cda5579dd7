//! # The document transformations
//!
//! Documents are changed through [`Step`]s, which can be applied, inverted, mapped through
//! the changes of other steps and (de)serialized. A [`Transform`] collects steps and offers
//! the higher-level editing operations built from them.
mod attr_step;
mod map;
mod mark;
mod mark_step;
mod replace;
mod replace_step;
mod step;
mod structure;
#[allow(clippy::module_inception)]
mod transform;
mod util;

pub use attr_step::{AttrStep, DocAttrStep};
pub use map::{Assoc, MapResult, Mappable, Mapping, StepMap};
pub use mark::MarkFilter;
pub use mark_step::{AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep};
pub use replace::replace_step;
pub use replace_step::{ReplaceAroundStep, ReplaceStep};
pub use step::{
    CustomStep, RegistryError, StepError, StepKind, StepParser, StepRegistry, StepResult,
};
pub use structure::{
    can_join, can_split, drop_point, find_wrapping, insert_point, join_point, lift_target,
    Wrapper,
};
pub use transform::{Transform, TransformError};
pub use util::Span;

use crate::model::{JsonError, Node, Schema};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;

/// A list of steps
pub type Steps = Vec<Step>;

/// Steps that can be applied on a document
#[derive(Debug, Clone)]
pub enum Step {
    /// Replace some content
    Replace(ReplaceStep),
    /// Replace around some content
    ReplaceAround(ReplaceAroundStep),
    /// Add a mark to a span
    AddMark(AddMarkStep),
    /// Remove a mark from a span
    RemoveMark(RemoveMarkStep),
    /// Add a mark to a single node
    AddNodeMark(AddNodeMarkStep),
    /// Remove a mark from a single node
    RemoveNodeMark(RemoveNodeMarkStep),
    /// Set an attribute of a node
    Attr(AttrStep),
    /// Set an attribute of the document
    DocAttr(DocAttrStep),
    /// A step type defined elsewhere
    Custom(Arc<dyn CustomStep>),
}

macro_rules! dispatch {
    ($value:expr, $step:ident => $body:expr) => {
        match $value {
            Step::Replace($step) => $body,
            Step::ReplaceAround($step) => $body,
            Step::AddMark($step) => $body,
            Step::RemoveMark($step) => $body,
            Step::AddNodeMark($step) => $body,
            Step::RemoveNodeMark($step) => $body,
            Step::Attr($step) => $body,
            Step::DocAttr($step) => $body,
            Step::Custom($step) => $body,
        }
    };
}

impl Step {
    /// The JSON id of this step.
    pub fn step_type(&self) -> &str {
        match self {
            Self::Replace(_) => "replace",
            Self::ReplaceAround(_) => "replaceAround",
            Self::AddMark(_) => "addMark",
            Self::RemoveMark(_) => "removeMark",
            Self::AddNodeMark(_) => "addNodeMark",
            Self::RemoveNodeMark(_) => "removeNodeMark",
            Self::Attr(_) => "attr",
            Self::DocAttr(_) => "docAttr",
            Self::Custom(step) => step.step_type(),
        }
    }

    /// Deserialize a step of one of the built-in types.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, JsonError> {
        StepRegistry::default().from_json(schema, json)
    }

    /// Create a JSON-serializeable representation of this step.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl StepKind for Step {
    fn apply(&self, doc: &Node) -> StepResult {
        dispatch!(self, step => step.apply(doc))
    }

    fn get_map(&self) -> StepMap {
        dispatch!(self, step => step.get_map())
    }

    fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        dispatch!(self, step => step.invert(doc))
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        dispatch!(self, step => step.map(mapping))
    }

    fn merge(&self, other: &Step) -> Option<Step> {
        dispatch!(self, step => step.merge(other))
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Replace(a), Self::Replace(b)) => a == b,
            (Self::ReplaceAround(a), Self::ReplaceAround(b)) => a == b,
            (Self::AddMark(a), Self::AddMark(b)) => a == b,
            (Self::RemoveMark(a), Self::RemoveMark(b)) => a == b,
            (Self::AddNodeMark(a), Self::AddNodeMark(b)) => a == b,
            (Self::RemoveNodeMark(a), Self::RemoveNodeMark(b)) => a == b,
            (Self::Attr(a), Self::Attr(b)) => a == b,
            (Self::DocAttr(a), Self::DocAttr(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => {
                Arc::ptr_eq(a, b) || (a.step_type() == b.step_type() && a.to_json() == b.to_json())
            }
            _ => false,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "stepType", rename_all = "camelCase")]
enum Tagged<'a> {
    Replace(&'a ReplaceStep),
    ReplaceAround(&'a ReplaceAroundStep),
    AddMark(&'a AddMarkStep),
    RemoveMark(&'a RemoveMarkStep),
    AddNodeMark(&'a AddNodeMarkStep),
    RemoveNodeMark(&'a RemoveNodeMarkStep),
    Attr(&'a AttrStep),
    DocAttr(&'a DocAttrStep),
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tagged = match self {
            Self::Replace(step) => Tagged::Replace(step),
            Self::ReplaceAround(step) => Tagged::ReplaceAround(step),
            Self::AddMark(step) => Tagged::AddMark(step),
            Self::RemoveMark(step) => Tagged::RemoveMark(step),
            Self::AddNodeMark(step) => Tagged::AddNodeMark(step),
            Self::RemoveNodeMark(step) => Tagged::RemoveNodeMark(step),
            Self::Attr(step) => Tagged::Attr(step),
            Self::DocAttr(step) => Tagged::DocAttr(step),
            Self::Custom(step) => {
                let mut map = match step.to_json() {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                map.insert("stepType".into(), Value::from(step.step_type()));
                return map.serialize(serializer);
            }
        };
        tagged.serialize(serializer)
    }
}
