//! Settle compiler utilities shared by the lowering passes and the runtime.
pub mod diagnostic;
pub mod line_index;
pub mod source_map;
pub mod span;

pub use diagnostic::{CompilationPhase, Diagnostic, DiagnosticSeverity};
pub use line_index::LineIndex;
pub use source_map::{SourceMapError, SourceMapTable, SourcePosition};
pub use span::Span;
