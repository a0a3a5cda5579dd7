use prosemirror_core::markdown::{
    helper::{blockquote, doc, em, h, node, p, strong},
    schema,
};
use prosemirror_core::model::{Node, Slice};
use proptest::prelude::*;
use serde_json::json;

fn inline() -> impl Strategy<Value = Node> {
    ("[a-z ]{1,6}", 0u8..3).prop_map(|(text, style)| match style {
        0 => node(&text),
        1 => em(&text),
        _ => strong(&text),
    })
}

fn block() -> impl Strategy<Value = Node> {
    let leaf = prop_oneof![
        prop::collection::vec(inline(), 0..4).prop_map(p),
        (1u8..=6, prop::collection::vec(inline(), 0..3)).prop_map(|(level, content)| h(level, content)),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop::collection::vec(inner, 1..3).prop_map(blockquote)
    })
}

proptest! {
    #[test]
    fn documents_survive_json(blocks in prop::collection::vec(block(), 1..4)) {
        let d = doc(blocks);
        let value = d.to_json();
        prop_assert_eq!(Node::from_json(&schema(), &value).unwrap(), d);
    }

    #[test]
    fn slices_survive_json(blocks in prop::collection::vec(block(), 1..4), cut in 0.0f64..1.0) {
        let d = doc(blocks);
        let from = ((d.content_size() as f64) * cut) as usize;
        let slice = d.slice(from.., false).unwrap();
        let value = serde_json::to_value(&slice).unwrap();
        prop_assert_eq!(Slice::from_json(&schema(), &value).unwrap(), slice);
    }
}

#[test]
fn reads_the_browser_layout() {
    let value = json!({
        "type": "doc",
        "content": [
            {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Hi"}]},
            {"type": "paragraph", "content": [
                {"type": "text", "text": "a"},
                {"type": "text", "marks": [{"type": "em"}], "text": "b"}
            ]}
        ]
    });
    let d = Node::from_json(&schema(), &value).unwrap();
    assert_eq!(d, doc((h(2, "Hi"), p(("a", em("b"))))));
    assert_eq!(d.to_json(), value);
}
