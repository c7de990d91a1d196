//! Diagnostic messages emitted during lowering.

use crate::Span;

/// A diagnostic message (error, warning, or info) with source location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[salsa::accumulator]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub severity: DiagnosticSeverity,
    pub phase: CompilationPhase,
}

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

/// Compilation phase where a diagnostic was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompilationPhase {
    Classification,
    Lowering,
    Emission,
}

impl Diagnostic {
    pub fn error(phase: CompilationPhase, span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
            severity: DiagnosticSeverity::Error,
            phase,
        }
    }

    pub fn warning(phase: CompilationPhase, span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
            severity: DiagnosticSeverity::Warning,
            phase,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl std::fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "ERROR"),
            DiagnosticSeverity::Warning => write!(f, "WARNING"),
            DiagnosticSeverity::Info => write!(f, "INFO"),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{:?}] {}: {}",
            self.severity, self.phase, self.span, self.message
        )
    }
}
