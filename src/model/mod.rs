//! # The document model
//!
//! Documents are trees of persistent [`Node`]s, typed by a runtime [`Schema`].
//! Positions are integers counting tokens: entering or leaving a non-leaf node
//! counts one, a leaf node counts one and text counts one per utf-16 unit.
mod content;
mod content_expr;
mod fragment;
mod json;
mod marks;
mod node;
mod replace;
mod resolved_pos;
mod schema;
pub(crate) mod util;

pub use content::{ContentMatch, ContentMatchError};
pub use content_expr::ContentExprError;
pub use fragment::{DiffEnd, Fragment};
pub use json::JsonError;
pub use marks::{Mark, MarkSet};
pub use node::{Child, Node, NodeError, Text};
pub use replace::{ReplaceError, Slice};
pub use resolved_pos::{
    Index, IndexError, NodeRange, ResolveCache, ResolveErr, ResolvedNode, ResolvedPos,
};
pub use schema::{
    AttributeSpec, Attrs, MarkSpec, MarkType, NodeSpec, NodeType, Schema, SchemaError, SchemaSpec,
    Whitespace,
};
