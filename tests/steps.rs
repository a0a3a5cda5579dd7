use prosemirror_core::markdown::{
    helper::{blockquote, doc, em, h1, li, mark, node, p, strong, ul},
    schema,
};
use prosemirror_core::model::{Fragment, JsonError, Slice};
use prosemirror_core::transform::{
    AddMarkStep, Assoc, Mappable, ReplaceAroundStep, ReplaceStep, Span, Step, StepError,
    StepKind, Transform,
};
use serde_json::json;

#[test]
fn test_apply() {
    let d1 = doc(p("Hello World!"));
    let step = AddMarkStep::new(Span::new(1, 9), mark("strong"));
    let d2 = step.apply(&d1).unwrap();
    assert_eq!(d2, doc(p((strong("Hello Wo"), "rld!"))));
}

#[test]
fn test_deserialize() {
    let s = schema();
    let s1 = Step::from_json(
        &s,
        &json!({"stepType": "addMark", "mark": {"type": "em"}, "from": 61, "to": 648}),
    )
    .unwrap();
    assert_eq!(
        s1,
        Step::AddMark(AddMarkStep::new(Span::new(61, 648), mark("em")))
    );

    let s2 = Step::from_json(
        &s,
        &json!({
            "stepType": "replace",
            "from": 986,
            "to": 986,
            "slice": {"content": [{"type": "text", "text": "!"}]}
        }),
    )
    .unwrap();
    assert_eq!(
        s2,
        Step::Replace(ReplaceStep::new(
            986,
            986,
            Slice::new(Fragment::from(node("!")), 0, 0),
            false
        ))
    );
}

#[test]
fn steps_survive_json_and_invert_cleanly() {
    let start = doc((h1("Title"), blockquote(p("quoted")), ul(li(p("item")))));
    let mut tr = Transform::new(start.clone());
    tr.add_mark(1, 4, &mark("em"))
        .unwrap()
        .insert(7, p("new"))
        .unwrap()
        .delete(1, 2)
        .unwrap();
    let s = schema();

    let mut replayed = start.clone();
    for step in tr.steps() {
        let parsed = Step::from_json(&s, &step.to_json()).unwrap();
        assert_eq!(&parsed, step);
        replayed = parsed.apply(&replayed).unwrap();
    }
    assert_eq!(&replayed, tr.doc());

    let mut undone = tr.doc().clone();
    for (step, before) in tr.steps().iter().zip(tr.docs()).rev() {
        let inverse = step.invert(before).unwrap();
        undone = inverse.apply(&undone).unwrap();
        assert_eq!(&undone, before);
    }
    assert_eq!(undone, start);
}

#[test]
fn rebases_concurrent_edits() {
    let start = doc(p("hello"));

    // Two clients edit the same version of the document.
    let insert = Step::Replace(ReplaceStep::new(
        1,
        1,
        Slice::new(Fragment::from(node("X")), 0, 0),
        false,
    ));
    let delete = Step::Replace(ReplaceStep::new(3, 5, Slice::empty(), false));

    let after_insert = insert.apply(&start).unwrap();
    let rebased = delete.map(&insert.get_map()).unwrap();
    assert_eq!(
        rebased,
        Step::Replace(ReplaceStep::new(4, 6, Slice::empty(), false))
    );
    assert_eq!(rebased.apply(&after_insert).unwrap(), doc(p("Xheo")));

    // A mark step inside content another client deleted disappears.
    let marked = Step::AddMark(AddMarkStep::new(Span::new(3, 5), mark("em")));
    assert!(marked.map(&delete.get_map()).is_none());
}

#[test]
fn mark_steps_merge_with_adjacent_ones() {
    let first = Step::AddMark(AddMarkStep::new(Span::new(1, 3), mark("em")));
    let second = Step::AddMark(AddMarkStep::new(Span::new(3, 5), mark("em")));
    let merged = first.merge(&second).unwrap();
    assert_eq!(
        merged,
        Step::AddMark(AddMarkStep::new(Span::new(1, 5), mark("em")))
    );
    assert_eq!(
        merged.apply(&doc(p("abcd"))).unwrap(),
        doc(p(em("abcd")))
    );
}

#[test]
fn transform_mapping_tracks_all_steps() {
    let mut tr = Transform::new(doc((p("one"), p("two"))));
    tr.insert(0, p("zero")).unwrap().delete(6, 11).unwrap();
    assert_eq!(tr.doc(), &doc((p("zero"), p("two"))));
    assert_eq!(tr.mapping().map(6, Assoc::After), 7);
    assert!(tr.mapping().map_result(2, Assoc::After).deleted());
}

#[test]
fn rejects_replace_steps_with_reversed_positions() {
    let s = schema();
    let reversed = Step::from_json(
        &s,
        &json!({"stepType": "replace", "from": 5, "to": 2}),
    );
    assert!(matches!(reversed, Err(JsonError::Invalid("ReplaceStep"))));

    let start = doc(p("hello"));
    let step = ReplaceStep::new(5, 2, Slice::empty(), false);
    assert!(matches!(step.apply(&start), Err(StepError::InvalidRange)));
    let mut tr = Transform::new(start.clone());
    assert!(tr.step(Step::Replace(step)).is_err());
    assert!(!tr.doc_changed());
    assert_eq!(tr.doc(), &start);
}

#[test]
fn rejects_replace_around_steps_with_misordered_gaps() {
    let s = schema();
    let wrap = |from, to, gap_from, gap_to, insert| {
        json!({
            "stepType": "replaceAround",
            "from": from,
            "to": to,
            "gapFrom": gap_from,
            "gapTo": gap_to,
            "insert": insert,
            "slice": {"content": [{"type": "blockquote"}], "openStart": 0, "openEnd": 0},
        })
    };
    assert!(Step::from_json(&s, &wrap(0, 7, 0, 7, 1)).is_ok());
    for bad in [
        wrap(0, 7, 7, 0, 1),
        wrap(2, 7, 0, 7, 1),
        wrap(0, 5, 0, 7, 1),
        wrap(0, 7, 0, 7, 3),
    ] {
        assert!(matches!(
            Step::from_json(&s, &bad),
            Err(JsonError::Invalid("ReplaceAroundStep"))
        ));
    }

    let start = doc(p("hello"));
    let quote = Slice::new(Fragment::from(blockquote(())), 0, 0);
    let good = ReplaceAroundStep::new(Span::new(0, 7), 0, 7, quote.clone(), 1, true);
    assert_eq!(good.apply(&start).unwrap(), doc(blockquote(p("hello"))));
    let bad = ReplaceAroundStep::new(Span::new(0, 7), 7, 0, quote, 1, true);
    let mut tr = Transform::new(start.clone());
    assert!(tr.step(Step::ReplaceAround(bad)).is_err());
    assert_eq!(tr.doc(), &start);
}
