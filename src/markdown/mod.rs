//! # The markdown schema
//!
//! This module is derived from the `prosemirror-markdown` schema. It is a
//! ready-made [`Schema`] for documents, tests and examples.
pub mod helper;
mod schema;

use crate::model::Schema;
use std::sync::OnceLock;

/// The markdown schema. Built once, every call returns a handle to the same
/// schema, so nodes from different calls are compatible.
pub fn schema() -> Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA
        .get_or_init(|| Schema::new(schema::spec()).expect("the markdown schema is valid"))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::schema;
    use crate::model::Whitespace;

    #[test]
    fn builds_the_markdown_types() {
        let s = schema();
        assert_eq!(s, schema());
        assert_eq!(s.top_node_type().name(), "doc");
        let heading = s.node_type("heading").unwrap();
        assert!(heading.is_textblock());
        assert!(heading.is_defining_for_content());
        let code = s.node_type("code_block").unwrap();
        assert_eq!(code.whitespace(), Whitespace::Pre);
        assert!(!code.allows_mark_type(&s.mark_type("em").unwrap()));
        assert!(s.node_type("image").unwrap().has_required_attrs());
        assert!(s.node_type("horizontal_rule").unwrap().is_leaf());
        assert!(!s.mark_type("link").unwrap().is_inclusive());
        assert_eq!(s.mark_type("code").unwrap().rank(), 3);
    }
}
