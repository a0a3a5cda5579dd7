use crate::model::{AttributeSpec, MarkSpec, NodeSpec, SchemaSpec};
use indexmap::IndexMap;
use serde_json::{json, Value};

fn attrs(list: &[(&str, Option<Value>)]) -> IndexMap<String, AttributeSpec> {
    list.iter()
        .map(|(name, default)| {
            let spec = match default {
                Some(value) => AttributeSpec::with_default(value.clone()),
                None => AttributeSpec::required(),
            };
            (name.to_string(), spec)
        })
        .collect()
}

fn block(content: Option<&str>) -> NodeSpec {
    NodeSpec {
        content: content.map(str::to_owned),
        group: Some("block".to_owned()),
        ..NodeSpec::default()
    }
}

fn inline() -> NodeSpec {
    NodeSpec {
        inline: true,
        group: Some("inline".to_owned()),
        ..NodeSpec::default()
    }
}

/// The spec of the schema used by `prosemirror-markdown`.
pub(crate) fn spec() -> SchemaSpec {
    SchemaSpec::default()
        .node("doc", NodeSpec::with_content("block+"))
        .node("paragraph", block(Some("inline*")))
        .node("blockquote", block(Some("block+")))
        .node("horizontal_rule", block(None))
        .node(
            "heading",
            NodeSpec {
                attrs: attrs(&[("level", Some(json!(1)))]),
                defining: true,
                ..block(Some("(text | image)*"))
            },
        )
        .node(
            "code_block",
            NodeSpec {
                marks: Some(String::new()),
                attrs: attrs(&[("params", Some(json!("")))]),
                code: true,
                defining: true,
                ..block(Some("text*"))
            },
        )
        .node(
            "ordered_list",
            NodeSpec {
                attrs: attrs(&[("order", Some(json!(1))), ("tight", Some(json!(false)))]),
                ..block(Some("list_item+"))
            },
        )
        .node(
            "bullet_list",
            NodeSpec {
                attrs: attrs(&[("tight", Some(json!(false)))]),
                ..block(Some("list_item+"))
            },
        )
        .node(
            "list_item",
            NodeSpec {
                defining: true,
                ..NodeSpec::with_content("paragraph block*")
            },
        )
        .node("text", NodeSpec::default().in_group("inline"))
        .node(
            "image",
            NodeSpec {
                attrs: attrs(&[
                    ("src", None),
                    ("alt", Some(Value::Null)),
                    ("title", Some(Value::Null)),
                ]),
                draggable: true,
                ..inline()
            },
        )
        .node(
            "hard_break",
            NodeSpec {
                selectable: Some(false),
                ..inline()
            },
        )
        .mark("em", MarkSpec::default())
        .mark("strong", MarkSpec::default())
        .mark(
            "link",
            MarkSpec {
                attrs: attrs(&[("href", None), ("title", Some(Value::Null))]),
                inclusive: Some(false),
                ..MarkSpec::default()
            },
        )
        .mark("code", MarkSpec::default())
}
