//! Error types for lowering.
//!
//! These are internal failures: the input tree broke an invariant the front
//! end guarantees. User-facing problems are reported as diagnostics instead.

use derive_more::Display;
use settle_ast::{NodeId, SpanMap};
use settle_core::{CompilationPhase, Diagnostic};

use crate::lower::region::RegionState;

pub type LoweringResult<T> = Result<T, LoweringError>;

#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display("{kind}")]
pub struct LoweringError {
    kind: Box<LoweringErrorKind>,
}

impl<E> From<E> for LoweringError
where
    LoweringErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        LoweringError {
            kind: Box::new(LoweringErrorKind::from(error)),
        }
    }
}

impl std::error::Error for LoweringError {}

impl LoweringError {
    pub(crate) fn invariant(node: NodeId, message: impl std::fmt::Display) -> Self {
        LoweringErrorKind::InvariantViolation {
            node,
            message: message.to_string(),
        }
        .into()
    }

    pub(crate) fn unclassified(node: NodeId, what: &'static str) -> Self {
        LoweringErrorKind::Unclassified { node, what }.into()
    }

    pub fn kind(&self) -> &LoweringErrorKind {
        &self.kind
    }

    /// The offending node.
    pub fn node(&self) -> NodeId {
        match self.kind.as_ref() {
            LoweringErrorKind::InvariantViolation { node, .. }
            | LoweringErrorKind::Unclassified { node, .. } => *node,
            LoweringErrorKind::IllegalTransition { region, .. } => *region,
        }
    }

    /// Error diagnostic aborting the unit, tied to the offending node.
    pub fn to_diagnostic(&self, spans: &SpanMap) -> Diagnostic {
        Diagnostic::error(
            CompilationPhase::Lowering,
            spans.get_or_default(self.node()),
            self.to_string(),
        )
    }
}

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum LoweringErrorKind {
    #[display("internal lowering invariant violated at {node}: {message}")]
    InvariantViolation { node: NodeId, message: String },

    #[display("{what} {node} reached lowering without classification")]
    Unclassified { node: NodeId, what: &'static str },

    #[display("region {region} cannot move from {from} to {to}")]
    IllegalTransition {
        region: NodeId,
        from: RegionState,
        to: RegionState,
    },
}
