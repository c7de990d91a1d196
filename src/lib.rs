//! Settle lowers structured exception handling, scope-bound resource
//! disposal and multi-value returns into a target that only offers
//! protected calls.
//!
//! The front end hands over a typed [`settle_ast::Program`]. The pipeline
//! classifies it ([`classify`]), lowers it to a [`settle_target::Chunk`]
//! ([`lower`]) and renders it together with a generated-line position table
//! ([`source_map`]). The runtime side of trace reconciliation lives in the
//! `settle-runtime` crate.

pub mod classify;
pub mod database;
pub mod diagnostics;
mod errors;
pub mod lower;
pub mod pipeline;
pub mod source_map;

pub use classify::{
    Classification, DisposableBinding, DisposableScope, FunctionInfo, RegionInfo, classify_program,
};
pub use database::SettleDatabaseImpl;
pub use errors::{LoweringError, LoweringErrorKind, LoweringResult};
pub use lower::lower_program;
pub use pipeline::{CompilationResult, LowerOptions, SourceUnit, UnitInput, compile};
pub use settle_core::{CompilationPhase, Diagnostic, DiagnosticSeverity};
pub use source_map::EmittedUnit;
