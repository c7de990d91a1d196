//! Typed source tree consumed by the Settle lowering passes.
//!
//! The front end (parser and type checker) is external: it hands over a
//! fully resolved tree where every expression carries its resolved [`Ty`],
//! together with a [`TypeFacts`] oracle answering capability questions.
//!
//! Structure and metadata are kept apart: nodes carry a [`NodeId`], and
//! spans live in a separate [`SpanMap`].

pub mod build;
mod node_id;
mod span_map;
mod tree;
mod types;

pub use node_id::NodeId;
pub use span_map::{SpanMap, SpanMapBuilder};
pub use tree::*;
pub use types::{DisposeCapability, ReturnArity, Ty, TypeFacts, TypeTable};

/// Identifiers are plain strings; resolution happened in the front end.
pub type Identifier = String;
