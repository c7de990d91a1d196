//! Built-in functions available to lowered chunks.
//!
//! Every builtin takes the runtime and its arguments and returns the full
//! result list, so multi-valued primitives (`pcall`, `table.unpack`) need no
//! special casing in the evaluator. Builtins that may suspend the calling
//! task, or that call back into lowered code, are [`Native::Async`].

use std::cell::RefCell;
use std::rc::Rc;

use settle_core::{SourceMapTable, SourcePosition};
use settle_target::primitives;
use tracing::{debug, warn};

use crate::interp::{Env, Eval, Runtime};
use crate::value::Native;
use crate::{PromiseState, RuntimeError, Table, TableKey, Value};

const GLOBALS: &[(&str, Native)] = &[
    ("log", Native::Sync(log)),
    ("tostring", Native::Sync(tostring)),
    (primitives::PCALL, Native::Async(pcall)),
    (primitives::ERROR, Native::Sync(error)),
    (primitives::ASYNC, Native::Sync(async_task)),
    (primitives::AWAIT, Native::Async(await_value)),
    ("__settle_later", Native::Sync(settle_later)),
    (primitives::SOURCEMAP_TRACEBACK, Native::Sync(register_source_map)),
    ("Error", Native::Async(construct_error::<0>)),
    ("RangeError", Native::Async(construct_error::<1>)),
    ("ReferenceError", Native::Async(construct_error::<2>)),
    ("SyntaxError", Native::Async(construct_error::<3>)),
    ("TypeError", Native::Async(construct_error::<4>)),
    ("URIError", Native::Async(construct_error::<5>)),
];

/// Error type names, indexed by the constructors above.
const ERROR_TYPES: [&str; 6] = [
    "Error",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "TypeError",
    "URIError",
];

const TABLE_LIBRARY: &[(&str, Native)] = &[
    (primitives::PACK, Native::Sync(table_pack)),
    (primitives::UNPACK, Native::Sync(table_unpack)),
];

const DEBUG_LIBRARY: &[(&str, Native)] = &[("traceback", Native::Sync(traceback))];

pub(crate) fn install(globals: &Env) {
    for &(name, native) in GLOBALS {
        globals.declare(name, Value::Builtin(name, native));
    }
    globals.declare(primitives::TABLE, library(TABLE_LIBRARY));
    globals.declare("debug", library(DEBUG_LIBRARY));
}

fn library(functions: &[(&'static str, Native)]) -> Value {
    let mut table = Table::new();
    for &(name, native) in functions {
        table.set_field(name, Value::Builtin(name, native));
    }
    Value::table(table)
}

fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Nil)
}

/// Appends each argument, converted with `tostring`, to the interpreter log.
fn log(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    for arg in args {
        rt.push_log(arg.to_string());
    }
    Ok(Vec::new())
}

fn tostring(_rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    Ok(vec![Value::str(&first(args).to_string())])
}

fn pcall(rt: Runtime, args: Vec<Value>) -> Eval<'static, Vec<Value>> {
    Box::pin(async move {
        let mut args = args.into_iter();
        let callee = args.next().unwrap_or(Value::Nil);
        rt.call_protected(callee, args.collect()).await
    })
}

/// `error(value, level)`: raises `value` as is. The level is ignored.
fn error(_rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    Err(RuntimeError::Thrown(first(args)))
}

/// `__async(f, ..)`: starts `f` as a task and returns its promise. Control
/// comes back here once the task finishes or first waits on a pending
/// promise.
fn async_task(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let mut args = args.into_iter();
    let callee = args.next().unwrap_or(Value::Nil);
    let promise = rt.spawn(rt.call(callee, args.collect()))?;
    Ok(vec![Value::Promise(promise)])
}

/// `__await(v)`: the settled values of `v`, suspending the calling task
/// while it is pending. Values that are not promises pass through.
fn await_value(rt: Runtime, args: Vec<Value>) -> Eval<'static, Vec<Value>> {
    Box::pin(async move {
        match first(args) {
            Value::Promise(promise) => rt.wait(promise).await,
            value => Ok(vec![value]),
        }
    })
}

/// `__settle_later(f)`: a pending promise settled by running `f` as a job.
fn settle_later(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let promise = Rc::new(RefCell::new(PromiseState::Pending));
    rt.enqueue(first(args), promise.clone());
    Ok(vec![Value::Promise(promise)])
}

fn table_pack(_rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let n = args.len() as i64;
    let mut table = Table::from_values(args);
    table.set_field("n", Value::Int(n));
    Ok(vec![Value::table(table)])
}

/// `table.unpack(t, i = 1, j = #t)`
fn table_unpack(_rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let Some(Value::Table(table)) = args.first() else {
        return Err(RuntimeError::bad_argument("unpack", "table expected"));
    };
    let table = table.borrow();
    let from = args.get(1).and_then(Value::as_int).unwrap_or(1);
    let to = args.get(2).and_then(Value::as_int).unwrap_or_else(|| table.len());
    Ok((from..=to).map(|i| table.get(&TableKey::Int(i))).collect())
}

/// `__sourcemap_traceback(generated, source, {[line] = position, ..})`
fn register_source_map(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let (Some(generated), Some(source)) = (
        args.first().and_then(Value::as_str),
        args.get(1).and_then(Value::as_str),
    ) else {
        return Err(RuntimeError::bad_argument(
            primitives::SOURCEMAP_TRACEBACK,
            "file names expected",
        ));
    };
    let Some(Value::Table(entries)) = args.get(2) else {
        return Err(RuntimeError::bad_argument(
            primitives::SOURCEMAP_TRACEBACK,
            "position table expected",
        ));
    };

    let mut table = SourceMapTable::new(generated, source);
    for (key, value) in entries.borrow().entries() {
        let line = match key {
            TableKey::Int(n) => u32::try_from(*n).ok(),
            TableKey::Str(s) => s.parse().ok(),
            TableKey::Bool(_) => None,
        };
        let Some(line) = line.filter(|&line| line > 0) else {
            return Err(RuntimeError::bad_argument(
                primitives::SOURCEMAP_TRACEBACK,
                format!("invalid generated line {key:?}"),
            ));
        };
        let Some(position) = position_of(value) else {
            return Err(RuntimeError::bad_argument(
                primitives::SOURCEMAP_TRACEBACK,
                format!("invalid position for line {line}"),
            ));
        };
        table.record(line, position);
    }

    debug!(file = generated, entries = table.len(), "registering source map");
    match rt.registry().register(table) {
        Ok(()) => Ok(vec![Value::Bool(true)]),
        Err(err) => {
            warn!(%err, "source map registration ignored");
            Ok(vec![Value::Bool(false)])
        }
    }
}

fn position_of(value: &Value) -> Option<SourcePosition> {
    match value {
        Value::Int(line) => u32::try_from(*line).ok().map(SourcePosition::line),
        Value::Table(_) => {
            let line = value.get_field("line")?.as_int()?;
            let column = value
                .get_field("column")
                .and_then(|c| c.as_int())
                .and_then(|c| u32::try_from(c).ok());
            Some(SourcePosition {
                line: u32::try_from(line).ok()?,
                column,
            })
        }
        _ => None,
    }
}

/// `debug.traceback(message, level = 1)`: the trace from `level`, reconciled
/// against registered tables, after `message` when it is a string. Any other
/// non-nil message is returned unchanged.
fn traceback(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let level = args
        .get(1)
        .and_then(Value::as_int)
        .and_then(|level| usize::try_from(level).ok())
        .unwrap_or(1);
    let trace = match args.first() {
        None | Some(Value::Nil) => rt.traceback(level),
        Some(Value::Str(message)) => format!("{message}\n{}", rt.traceback(level)),
        Some(other) => return Ok(vec![other.clone()]),
    };
    Ok(vec![Value::str(&trace)])
}

/// `Error(message)` and its subtypes: a table with `name`, `message`,
/// `stack` and a `toString` method.
fn construct_error<const KIND: usize>(rt: Runtime, args: Vec<Value>) -> Eval<'static, Vec<Value>> {
    Box::pin(async move {
        let message = match first(args) {
            Value::Nil => Value::str(""),
            other => Value::str(&other.to_string()),
        };
        let stack = error_stack(&rt).await?;
        let mut error = Table::new();
        error.set_field("name", Value::str(ERROR_TYPES[KIND]));
        error.set_field("message", message);
        error.set_field("stack", stack);
        error.set_field("toString", Value::sync_builtin("toString", error_to_string));
        Ok(vec![Value::table(error)])
    })
}

/// The stack an error captures: whatever `debug.traceback` currently is,
/// or nil once `debug` is gone.
async fn error_stack(rt: &Runtime) -> Result<Value, RuntimeError> {
    let Some(traceback) = rt.global("debug").get_field("traceback") else {
        return Ok(Value::Nil);
    };
    if !traceback.is_callable() {
        return Ok(Value::Nil);
    }
    let values = rt.call(traceback, vec![Value::Nil, Value::Int(1)]).await?;
    Ok(first(values))
}

/// `error:toString()`: `name: message`, or the one that is not empty.
fn error_to_string(_rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let error = first(args);
    let field = |name: &str| {
        error
            .get_field(name)
            .filter(|value| !value.is_nil())
            .map(|value| value.to_string())
            .unwrap_or_default()
    };
    let (name, message) = (field("name"), field("message"));
    let text = match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{name}: {message}"),
    };
    Ok(vec![Value::str(&text)])
}
