//! Target tree for the protected-call execution model.
//!
//! The target is a Lua-like language: no structured exceptions, no scoped
//! resources, native multiple results. Lowered programs are expressed as a
//! [`Chunk`] and rendered by [`render`] into line-faithful text.

pub mod primitives;
mod printer;
mod tree;

pub use printer::{Rendered, render, render_from_line};
pub use tree::*;
