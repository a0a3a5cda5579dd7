use super::{AttrStep, DocAttrStep, Mapping, Step, StepError, StepKind, StepResult, Steps};
use crate::model::{Node, NodeError, NodeType, ResolveErr};
use displaydoc::Display;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors of the high-level transform operations
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TransformError {
    /// Step failed: {0}
    Step(#[from] StepError),
    /// Invalid position: {0}
    Resolve(#[from] ResolveErr),
    /// Could not create node: {0}
    Node(#[from] NodeError),
    /// No node at position {0}
    NoNodeAt(usize),
    /// Type given to set_block_type should be a textblock, got {0}
    NotTextblock(NodeType),
    /// Invalid content for node type {0}
    InvalidContent(NodeType),
    /// Wrapper type given to wrap does not form valid content of its parent wrapper: {0}
    InvalidWrapper(NodeType),
    /// Invalid depth {0}
    InvalidDepth(usize),
}

/// Abstraction to build up and track an array of [steps](Step) representing a document
/// transformation.
///
/// Most transforming methods return a reference to the transform itself, so that they can be
/// chained.
#[derive(Debug, Clone)]
pub struct Transform {
    doc: Node,
    steps: Steps,
    docs: Vec<Node>,
    mapping: Mapping,
}

impl Transform {
    /// Create a transform that starts with the given document.
    pub fn new(doc: Node) -> Transform {
        Transform {
            doc,
            steps: Vec::new(),
            docs: Vec::new(),
            mapping: Mapping::new(),
        }
    }

    /// The current document (the result of applying the steps in the transform).
    pub fn doc(&self) -> &Node {
        &self.doc
    }

    /// The starting document.
    pub fn before(&self) -> &Node {
        self.docs.first().unwrap_or(&self.doc)
    }

    /// The steps in this transform.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The documents before each of the steps.
    pub fn docs(&self) -> &[Node] {
        &self.docs
    }

    /// A mapping with the maps for each of the steps in this transform.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// True when the document has been changed (when there are any steps).
    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Apply a new step in this transform, saving the result. Fails when the step fails.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, TransformError> {
        self.maybe_step(step)?;
        Ok(self)
    }

    /// Try to apply a step in this transformation, ignoring it if it fails. Returns the
    /// step result.
    pub fn maybe_step(&mut self, step: Step) -> StepResult {
        match step.apply(&self.doc) {
            Ok(doc) => {
                trace!(step = step.step_type(), steps = self.steps.len() + 1, "applied step");
                self.add_step(step, doc.clone());
                Ok(doc)
            }
            Err(err) => {
                debug!(step = step.step_type(), %err, "step failed");
                Err(err)
            }
        }
    }

    fn add_step(&mut self, step: Step, doc: Node) {
        let before = std::mem::replace(&mut self.doc, doc);
        self.docs.push(before);
        self.mapping.append_map(step.get_map(), None);
        self.steps.push(step);
    }

    /// Set a single attribute on a given node to a new value.
    pub fn set_node_attribute(
        &mut self,
        pos: usize,
        attr: &str,
        value: Value,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::Attr(AttrStep::new(pos, attr.to_owned(), value)))
    }

    /// Set a single attribute on the document to a new value.
    pub fn set_doc_attribute(&mut self, attr: &str, value: Value) -> Result<&mut Self, TransformError> {
        self.step(Step::DocAttr(DocAttrStep::new(attr.to_owned(), value)))
    }
}

#[cfg(test)]
mod tests {
    use super::{Transform, TransformError};
    use crate::markdown::helper::{doc, h1, h2, p};
    use crate::model::Slice;
    use crate::transform::{Assoc, Mappable, ReplaceStep, Step};
    use serde_json::json;

    #[test]
    fn tracks_steps_docs_and_mapping() {
        let d = doc(p("ab"));
        let mut tr = Transform::new(d.clone());
        assert!(!tr.doc_changed());
        assert_eq!(tr.before(), &d);

        tr.delete(1, 2).unwrap().insert(2, p("c")).unwrap();
        assert!(tr.doc_changed());
        assert_eq!(tr.steps().len(), 2);
        assert_eq!(tr.docs().len(), 2);
        assert_eq!(tr.docs()[0], d);
        assert_eq!(tr.before(), &d);
        assert_eq!(tr.doc(), &doc((p("b"), p("c"))));
        assert_eq!(tr.mapping().map(3, Assoc::After), 5);
    }

    #[test]
    fn failed_steps_leave_the_transform_untouched() {
        let d = doc(p("ab"));
        let mut tr = Transform::new(d.clone());
        let bad = Step::Replace(ReplaceStep::new(1, 20, Slice::empty(), false));
        assert!(tr.maybe_step(bad.clone()).is_err());
        assert!(matches!(tr.step(bad), Err(TransformError::Step(_))));
        assert!(!tr.doc_changed());
        assert_eq!(tr.doc(), &d);
    }

    #[test]
    fn sets_attributes() {
        let mut tr = Transform::new(doc(h1("a")));
        tr.set_node_attribute(0, "level", json!(2)).unwrap();
        assert_eq!(tr.doc(), &doc(h2("a")));
        tr.set_doc_attribute("unknown", json!(1)).unwrap();
        assert_eq!(tr.steps().len(), 2);
    }
}
