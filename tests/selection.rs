use prosemirror_core::markdown::helper::{blockquote, doc, hr, p};
use prosemirror_core::model::{Fragment, JsonError, Node, ResolveErr, ResolvedPos, Slice};
use prosemirror_core::state::{
    Bias, CustomSelection, Selection, SelectionRange, SelectionRegistry, TextSelection,
};
use prosemirror_core::transform::{Assoc, Mappable, Transform};
use serde_json::{json, Value};
use std::sync::Arc;

/// A cursor between two block nodes.
#[derive(Debug)]
struct GapCursor {
    ranges: [SelectionRange; 1],
}

impl GapCursor {
    fn new(pos: ResolvedPos) -> Self {
        GapCursor {
            ranges: [SelectionRange {
                from: pos.clone(),
                to: pos,
            }],
        }
    }
}

impl CustomSelection for GapCursor {
    fn selection_type(&self) -> &str {
        "gapcursor"
    }

    fn resolved_anchor(&self) -> &ResolvedPos {
        &self.ranges[0].from
    }

    fn resolved_head(&self) -> &ResolvedPos {
        &self.ranges[0].to
    }

    fn ranges(&self) -> &[SelectionRange] {
        &self.ranges
    }

    fn map(&self, doc: &Node, mapping: &dyn Mappable) -> Result<Selection, ResolveErr> {
        let pos = doc.resolve(mapping.map(self.ranges[0].from.pos, Assoc::After))?;
        Ok(Selection::Custom(Arc::new(GapCursor::new(pos))))
    }

    fn to_json(&self) -> Value {
        json!({ "pos": self.ranges[0].from.pos })
    }
}

fn parse_gap_cursor(doc: &Node, json: &Value) -> Result<Selection, JsonError> {
    let pos = json
        .get("pos")
        .and_then(Value::as_u64)
        .ok_or(JsonError::Invalid("GapCursor"))?;
    let pos = doc.resolve(pos as usize)?;
    Ok(Selection::Custom(Arc::new(GapCursor::new(pos))))
}

#[test]
fn custom_selections_round_trip_through_a_registry() {
    let d = doc((hr(), hr()));
    let mut registry = SelectionRegistry::new();
    registry.register("gapcursor", parse_gap_cursor).unwrap();

    let value = json!({"type": "gapcursor", "pos": 1});
    let sel = registry.from_json(&d, &value).unwrap();
    assert_eq!(sel.to_json(), value);
    assert!(sel.empty());
    assert_eq!((sel.from(), sel.to()), (1, 1));
    assert_eq!(sel, registry.from_json(&d, &value).unwrap());

    let mut tr = Transform::new(d.clone());
    tr.insert(0, p("a")).unwrap();
    let mapped = sel.map(tr.doc(), tr.mapping()).unwrap();
    assert_eq!(mapped.to_json(), json!({"type": "gapcursor", "pos": 4}));

    assert!(Selection::from_json(&d, &value).is_err());
}

#[test]
fn selections_follow_a_series_of_edits() {
    let d = doc((p("one"), blockquote(p("two"))));
    let sel = <Selection as From<TextSelection>>::from(TextSelection::create(&d, 8, Some(10)).unwrap());
    assert_eq!(
        sel.content().unwrap(),
        Slice::new(Fragment::from(blockquote(p("wo"))), 2, 2)
    );

    let mut tr = Transform::new(d.clone());
    tr.delete(1, 4).unwrap().insert(2, p("x")).unwrap();
    let mapped = sel.map(tr.doc(), tr.mapping()).unwrap();
    assert_eq!((mapped.anchor(), mapped.head()), (8, 10));

    let replaced = mapped.replace(&mut tr, &Slice::empty()).unwrap();
    assert!(replaced.empty());
    assert_eq!(tr.doc(), &doc((p(()), p("x"), blockquote(p("t")))));
    assert_eq!(replaced.head(), 8);
}

#[test]
fn searches_skip_unselectable_content() {
    let d = doc((p("a"), hr()));
    let from_end = Selection::near(&d.resolve(4).unwrap(), Bias::Backward);
    assert_eq!(from_end.to_json(), json!({"type": "node", "anchor": 3}));
    let text = Selection::find_from(&d.resolve(4).unwrap(), Bias::Backward, true).unwrap();
    assert_eq!(text.to_json(), json!({"type": "text", "anchor": 2, "head": 2}));
}
