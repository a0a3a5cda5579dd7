//! # Selections
//!
//! A [`Selection`] describes the part of a document an editor is pointing at: a text range,
//! a single node, the whole document or a custom range type. Selections can be mapped
//! through changes, serialized, and used to replace their content in a [`Transform`].
//!
//! [`Transform`]: crate::transform::Transform
mod selection;

pub use selection::{
    AllSelection, Bias, CustomSelection, NodeSelection, Selection, SelectionParser,
    SelectionRange, SelectionRegistry, TextSelection,
};
