#![warn(missing_docs)]
//! # A structural document editing core
//!
//! This crate models rich text documents as persistent trees that are checked against a
//! [`Schema`](model::Schema), and changes them through invertible, mappable
//! [steps](transform::Step). Positions can be mapped through changes, which makes it possible
//! to rebase concurrent edits, and [selections](state::Selection) follow the document as it
//! changes.
//!
//! - [`model`]: schemas, content expressions, nodes, fragments, marks, slices and positions
//! - [`transform`]: steps, position mapping and the [`Transform`](transform::Transform) builder
//! - [`state`]: text, node and whole-document selections
//! - [`markdown`]: a ready-made schema for markdown-like documents

#[macro_use]
extern crate derive_new;

pub(crate) mod de;
pub mod markdown;
pub mod model;
pub mod state;
pub mod transform;
