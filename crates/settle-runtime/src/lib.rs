//! Reference runtime for lowered Settle programs.
//!
//! A small evaluator for the target tree that implements the primitives the
//! lowered code calls: protected calls, `error`, suspendable tasks with their
//! promises, builtin error objects, the `table.pack`/`table.unpack` helpers
//! and the source-map trace handler.
//! It exists to check that lowered programs behave like their sources.

mod builtins;
mod errors;
mod interp;
mod signal;
pub mod traceback;
mod value;

pub use errors::RuntimeError;
pub use interp::{Eval, Interpreter, Runtime};
pub use signal::ControlSignal;
pub use traceback::{SourceMapRegistry, TracebackError};
pub use value::{Native, Promise, PromiseState, Table, TableKey, Value};
