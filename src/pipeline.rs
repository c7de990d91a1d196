//! Compilation pipeline for Settle.
//!
//! Each stage is a Salsa tracked function over a [`SourceUnit`] input.
//!
//! ```text
//! SourceUnit
//!     │
//!     ▼
//! classify_unit ─► Classification (regions, disposables, arities)
//!     │
//!     ▼
//! lower_unit ─► Chunk (no try/catch/finally/using left)
//!     │
//!     ▼
//! emit_unit ─► EmittedUnit (target text + position table)
//! ```
//!
//! ## Incremental Compilation
//!
//! Only `emit_unit` reads [`LowerOptions`], so toggling trace registration
//! re-renders the unit without classifying or lowering it again.
//!
//! ## Diagnostics
//!
//! Stages report through the [`Diagnostic`] accumulator. [`compile`]
//! collects them, and withholds the output when any is an error.

use salsa::Accumulator;
use settle_ast::{Program, TypeTable};
use settle_core::{CompilationPhase, Diagnostic, SourceMapTable, Span};
use settle_target::Chunk;
use tracing::debug;

use crate::classify::{Classification, classify_program};
use crate::lower::lower_program;
use crate::source_map::{EmittedUnit, emit};

/// Emission options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LowerOptions {
    /// Register the unit's position table with the runtime so stack traces
    /// are reported in source coordinates.
    pub source_map_traceback: bool,
}

/// One compiled unit: a typed program and what is needed to emit it.
#[salsa::input(debug)]
pub struct SourceUnit {
    /// Name of the generated file, used in traces (e.g. `main.lua`).
    #[returns(ref)]
    pub generated_name: String,
    /// Name of the source file (e.g. `main.ts`).
    #[returns(ref)]
    pub source_name: String,
    /// Source text, for resolving spans to lines.
    #[returns(deref)]
    pub text: String,
    #[returns(ref)]
    pub program: Program,
    #[returns(ref)]
    pub facts: TypeTable,
    pub options: LowerOptions,
}

/// Builder for [`SourceUnit`] inputs.
#[derive(Clone, Debug)]
pub struct UnitInput {
    generated_name: String,
    source_name: String,
    text: String,
    program: Program,
    facts: TypeTable,
    options: LowerOptions,
}

impl UnitInput {
    /// A unit named `main.lua` / `main.ts` with the standard type table.
    pub fn new(program: Program) -> Self {
        Self {
            generated_name: "main.lua".to_owned(),
            source_name: "main.ts".to_owned(),
            text: String::new(),
            program,
            facts: TypeTable::standard(),
            options: LowerOptions::default(),
        }
    }

    pub fn names(mut self, generated: impl Into<String>, source: impl Into<String>) -> Self {
        self.generated_name = generated.into();
        self.source_name = source.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn facts(mut self, facts: TypeTable) -> Self {
        self.facts = facts;
        self
    }

    pub fn options(mut self, options: LowerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn create(self, db: &dyn salsa::Database) -> SourceUnit {
        SourceUnit::new(
            db,
            self.generated_name,
            self.source_name,
            self.text,
            self.program,
            self.facts,
            self.options,
        )
    }
}

/// Result of the full compilation pipeline.
#[derive(Clone, Debug)]
pub struct CompilationResult {
    /// Emitted unit; `None` when compilation failed.
    pub output: Option<EmittedUnit>,
    /// Diagnostics collected during compilation.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilationResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

// =============================================================================
// Pipeline Stages
// =============================================================================

/// Stage 1: classify regions, disposable scopes and return arities.
#[salsa::tracked(returns(ref))]
pub fn classify_unit(db: &dyn salsa::Database, unit: SourceUnit) -> Option<Classification> {
    let program = unit.program(db);
    match classify_program(program, unit.facts(db)) {
        Ok((classification, diagnostics)) => {
            for diagnostic in diagnostics {
                diagnostic.accumulate(db);
            }
            Some(classification)
        }
        Err(err) => {
            err.to_diagnostic(&program.spans).accumulate(db);
            None
        }
    }
}

/// Stage 2: lower to the target tree.
#[salsa::tracked(returns(ref))]
pub fn lower_unit(db: &dyn salsa::Database, unit: SourceUnit) -> Option<Chunk> {
    let classification = classify_unit(db, unit).as_ref()?;
    let program = unit.program(db);
    match lower_program(program, classification) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            err.to_diagnostic(&program.spans).accumulate(db);
            None
        }
    }
}

/// Stage 3: render the target text and build the position table.
#[salsa::tracked(returns(ref))]
pub fn emit_unit(db: &dyn salsa::Database, unit: SourceUnit) -> Option<EmittedUnit> {
    let chunk = lower_unit(db, unit).as_ref()?;
    let options = unit.options(db);
    let emitted = emit(
        chunk,
        unit.generated_name(db),
        unit.source_name(db),
        unit.text(db),
        options.source_map_traceback,
    );
    if options.source_map_traceback && emitted.source_map.is_empty() {
        Diagnostic::warning(
            CompilationPhase::Emission,
            Span::default(),
            "no statement carries a source position; traces will not be rewritten",
        )
        .accumulate(db);
    }
    Some(emitted)
}

/// The unit's position table.
#[salsa::tracked(returns(ref))]
pub fn source_map_table(db: &dyn salsa::Database, unit: SourceUnit) -> Option<SourceMapTable> {
    emit_unit(db, unit)
        .as_ref()
        .map(|emitted| emitted.source_map.clone())
}

/// Run the full pipeline for one unit.
pub fn compile(db: &dyn salsa::Database, unit: SourceUnit) -> CompilationResult {
    let output = emit_unit(db, unit).clone();
    let diagnostics: Vec<Diagnostic> = emit_unit::accumulated::<Diagnostic>(db, unit)
        .into_iter()
        .cloned()
        .collect();
    let failed = diagnostics.iter().any(Diagnostic::is_error);
    debug!(
        unit = unit.generated_name(db).as_str(),
        diagnostics = diagnostics.len(),
        failed,
        "compiled unit"
    );
    CompilationResult {
        output: if failed { None } else { output },
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use settle_ast::Ty;
    use settle_ast::build::*;

    use super::*;
    use crate::SettleDatabaseImpl;

    #[test]
    fn test_compile_clean_unit() {
        let db = SettleDatabaseImpl::default();
        let unit = UnitInput::new(program(vec![try_finally(
            vec![expr_stmt(call_named("log", vec![str_("try")]))],
            vec![expr_stmt(call_named("log", vec![str_("finally")]))],
        )]))
        .create(&db);

        let result = compile(&db, unit);
        assert!(result.diagnostics.is_empty());
        let output = result.output.unwrap();
        assert!(output.code.contains("pcall(function()"));
        assert!(!output.code.contains("__sourcemap_traceback"));
    }

    #[test]
    fn test_classification_errors_withhold_output() {
        let db = SettleDatabaseImpl::default();
        let unit = UnitInput::new(program(vec![using(vec![(
            "x",
            call_named("make", vec![]).with_ty(Ty::named("string")),
        )])]))
        .create(&db);

        let result = compile(&db, unit);
        assert!(result.has_errors());
        assert!(result.output.is_none());
        assert_eq!(result.diagnostics[0].phase, CompilationPhase::Classification);
    }

    #[test]
    fn test_invariant_violation_becomes_diagnostic() {
        let db = SettleDatabaseImpl::default();
        let unit = UnitInput::new(program(vec![try_stmt(vec![], None, None)])).create(&db);

        let result = compile(&db, unit);
        assert!(result.output.is_none());
        assert!(
            result.diagnostics[0]
                .message
                .contains("internal lowering invariant violated")
        );
        assert!(lower_unit(&db, unit).is_none());
    }
}
