use super::{Assoc, Mappable, Step, StepError, StepKind, StepResult};
use crate::model::{Fragment, JsonError, Node, Schema, Slice};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Update an attribute in a specific node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct AttrStep {
    /// The position of the target node.
    pub pos: usize,
    /// The attribute to set.
    pub attr: String,
    /// The new value
    pub value: Value,
}

impl StepKind for AttrStep {
    fn apply(&self, doc: &Node) -> StepResult {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNode(self.pos))?;
        let mut attrs = node.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        let updated = node.r#type().create(Some(&attrs), Fragment::new(), node.marks())?;
        let open = if node.is_leaf() { 0 } else { 1 };
        let slice = Slice::new(Fragment::from(updated), 0, open);
        let new_node = doc.replace(self.pos..self.pos + 1, &slice)?;
        Ok(new_node)
    }

    fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNode(self.pos))?;
        let old = node.attr(&self.attr).cloned().unwrap_or(Value::Null);
        Ok(Step::Attr(AttrStep::new(self.pos, self.attr.clone(), old)))
    }

    fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        if pos.deleted_after() {
            None
        } else {
            Some(Step::Attr(AttrStep::new(
                pos.pos,
                self.attr.clone(),
                self.value.clone(),
            )))
        }
    }
}

/// Update an attribute in the doc node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct DocAttrStep {
    /// The attribute to set.
    pub attr: String,
    /// The new value
    pub value: Value,
}

impl StepKind for DocAttrStep {
    fn apply(&self, doc: &Node) -> StepResult {
        let mut attrs = doc.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        let updated = doc
            .r#type()
            .create(Some(&attrs), doc.content().clone(), doc.marks())?;
        Ok(updated)
    }

    fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        let old = doc.attr(&self.attr).cloned().unwrap_or(Value::Null);
        Ok(Step::DocAttr(DocAttrStep::new(self.attr.clone(), old)))
    }

    fn map(&self, _mapping: &dyn Mappable) -> Option<Step> {
        Some(Step::DocAttr(self.clone()))
    }
}

pub(crate) fn parse_attr(_schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let step = AttrStep::deserialize(json).map_err(|_| JsonError::Invalid("AttrStep"))?;
    Ok(Step::Attr(step))
}

pub(crate) fn parse_doc_attr(_schema: &Schema, json: &Value) -> Result<Step, JsonError> {
    let step = DocAttrStep::deserialize(json).map_err(|_| JsonError::Invalid("DocAttrStep"))?;
    Ok(Step::DocAttr(step))
}

#[cfg(test)]
mod tests {
    use super::{AttrStep, DocAttrStep};
    use crate::markdown::helper::{doc, h1, h2, p};
    use crate::transform::{StepKind, StepMap};
    use serde_json::json;

    #[test]
    fn sets_node_attributes() {
        let d = doc((p("a"), h1("b")));
        let step = AttrStep::new(3, "level".into(), json!(2));
        let d2 = step.apply(&d).unwrap();
        assert_eq!(d2, doc((p("a"), h2("b"))));
        assert_eq!(step.invert(&d).unwrap().apply(&d2).unwrap(), d);
        assert!(step.get_map() == StepMap::empty());
        assert!(AttrStep::new(20, "level".into(), json!(2)).apply(&d).is_err());
    }

    #[test]
    fn drops_attributes_unknown_to_the_document_type() {
        let d = doc(p("a"));
        let step = DocAttrStep::new("lang".into(), json!("en"));
        let d2 = step.apply(&d).unwrap();
        assert_eq!(d2, d);
        assert!(d2.attr("lang").is_none());
        let inverse = step.invert(&d).unwrap();
        assert_eq!(inverse.to_json(), json!({"stepType": "docAttr", "attr": "lang", "value": null}));
    }
}
