//! Common test utilities: compile a typed program through the pipeline and
//! run the lowered chunk on the reference runtime.

#![allow(dead_code)]

use settle::pipeline::lower_unit;
use settle::source_map::registration;
use settle::{LowerOptions, SettleDatabaseImpl, UnitInput, compile};
use settle_ast::build::*;
use settle_ast::{DisposeCapability, Expr, Program, PropertyKey, Stmt, Ty, TypeTable};
use settle_runtime::{Interpreter, RuntimeError, Value};
use settle_target::{Block, Chunk};

/// Type table with the standard interfaces plus the test resource types.
pub fn facts() -> TypeTable {
    TypeTable::standard()
        .with_disposable("Scoped", DisposeCapability::SYNC)
        .with_disposable("Both", DisposeCapability::BOTH)
}

pub struct Run {
    pub code: String,
    pub log: Vec<String>,
    pub result: Result<Vec<Value>, RuntimeError>,
}

impl Run {
    pub fn values(&self) -> &[Value] {
        match &self.result {
            Ok(values) => values,
            Err(err) => panic!("program failed: {err}\n{}", self.code),
        }
    }
}

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Compile `program`, failing the test on any diagnostic, and return the
/// lowered chunk with its emitted text.
pub fn lower(program: Program, options: LowerOptions) -> (Chunk, settle::EmittedUnit) {
    init_tracing();
    let db = SettleDatabaseImpl::default();
    let unit = db.open_unit(UnitInput::new(program).facts(facts()).options(options));
    let result = compile(&db, unit);
    assert!(
        result.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        result.diagnostics
    );
    let emitted = result.output.expect("compiled output");
    let chunk = lower_unit(&db, unit).clone().expect("lowered chunk");
    (chunk, emitted)
}

/// Compile and run a program on a fresh interpreter.
pub fn run(stmts: Vec<Stmt>) -> Run {
    let (chunk, emitted) = lower(program(stmts), LowerOptions::default());
    let mut interp = Interpreter::new();
    let result = interp.run(&chunk);
    Run {
        code: emitted.code,
        log: interp.take_log(),
        result,
    }
}

/// Run a chunk the way the emitted text runs: registration first.
pub fn run_registered(interp: &mut Interpreter, chunk: &Chunk, emitted: &settle::EmittedUnit) -> Result<Vec<Value>, RuntimeError> {
    let mut stmts = vec![registration(&emitted.source_map)];
    stmts.extend(chunk.block.stmts.iter().cloned());
    interp.run(&Chunk {
        block: Block::new(stmts),
    })
}

// =============================================================================
// Source-level helpers
// =============================================================================

pub fn log(text: &str) -> Stmt {
    expr_stmt(call_named("log", vec![str_(text)]))
}

pub fn log_expr(value: Expr) -> Stmt {
    expr_stmt(call_named("log", vec![value]))
}

/// ```text
/// function loggedDisposable(id) {
///     log(`Creating ${id}`);
///     return { [Symbol.dispose]() { log(`Disposing ${id}`); } };
/// }
/// ```
pub fn logged_disposable_fn() -> Stmt {
    function(
        "loggedDisposable",
        &["id"],
        vec![
            log_expr(concat(str_("Creating "), var("id"))),
            ret(object(vec![method(
                PropertyKey::Dispose,
                &[],
                vec![log_expr(concat(str_("Disposing "), var("id")))],
            )])),
        ],
    )
}

/// `loggedDisposable(id)`, typed `Disposable`.
pub fn logged(id: &str) -> Expr {
    call_named("loggedDisposable", vec![str_(id)]).with_ty(Ty::named("Disposable"))
}

/// ```text
/// function loggedAsyncDisposable(id) {
///     log(`Creating ${id}`);
///     return {
///         [Symbol.asyncDispose]() {
///             log(`Disposing async ${id}`);
///             return __settle_later(() => log(`Disposed ${id}`));
///         }
///     };
/// }
/// ```
///
/// The disposer's promise settles only once the job queue runs.
pub fn logged_async_disposable_fn() -> Stmt {
    function(
        "loggedAsyncDisposable",
        &["id"],
        vec![
            log_expr(concat(str_("Creating "), var("id"))),
            ret(object(vec![method(
                PropertyKey::AsyncDispose,
                &[],
                vec![
                    log_expr(concat(str_("Disposing async "), var("id"))),
                    ret(call_named(
                        "__settle_later",
                        vec![func_expr(
                            &[],
                            vec![log_expr(concat(str_("Disposed "), var("id")))],
                        )],
                    )),
                ],
            )])),
        ],
    )
}

/// `loggedAsyncDisposable(id)`, typed `AsyncDisposable`.
pub fn logged_async(id: &str) -> Expr {
    call_named("loggedAsyncDisposable", vec![str_(id)]).with_ty(Ty::named("AsyncDisposable"))
}

pub fn strings(values: &[Value]) -> Vec<String> {
    values.iter().map(Value::to_string).collect()
}
