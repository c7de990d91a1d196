//! Runtime primitives the lowered code calls into.
//!
//! The engine never implements these; it only emits calls against them.
//! Reserved local names use a `____` prefix, which source identifiers
//! cannot collide with after front-end renaming.

use crate::{Expr, ExprList};

/// Protected call: `pcall(f, args..)` returns `true, results..` or
/// `false, thrown`.
pub const PCALL: &str = "pcall";
/// `error(value, 0)` raises `value` unchanged, without position info.
pub const ERROR: &str = "error";
/// `__async(f)` runs `f` as a task and returns its promise.
pub const ASYNC: &str = "__async";
/// `__await(v)` suspends until `v` settles; non-awaitables pass through.
pub const AWAIT: &str = "__await";
pub const TABLE: &str = "table";
pub const PACK: &str = "pack";
pub const UNPACK: &str = "unpack";
/// Registers a unit's position table with the trace handler.
pub const SOURCEMAP_TRACEBACK: &str = "__sourcemap_traceback";

pub const DISPOSE_KEY: &str = "Symbol.dispose";
pub const ASYNC_DISPOSE_KEY: &str = "Symbol.asyncDispose";

/// Receiver parameter of object methods.
pub const SELF: &str = "self";

pub const OK: &str = "____ok";
pub const SIGNAL: &str = "____signal";
pub const RESULT_PREFIX: &str = "____result";
pub const OUTCOME: &str = "____outcome";

/// Name of the `index`th (1-based) result slot.
pub fn result_slot(index: usize) -> String {
    format!("{RESULT_PREFIX}{index}")
}

pub fn pcall(function: Expr, args: Vec<Expr>) -> Expr {
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(function);
    all.extend(args);
    Expr::call_named(PCALL, all)
}

/// `error(value, 0)`
pub fn raise(value: Expr) -> Expr {
    Expr::call_named(ERROR, vec![value, Expr::Int(0)])
}

pub fn async_task(function: Expr) -> Expr {
    Expr::call_named(ASYNC, vec![function])
}

pub fn await_value(value: Expr) -> Expr {
    Expr::call_named(AWAIT, vec![value])
}

/// `table.pack(value)`
pub fn table_pack(value: Expr) -> Expr {
    Expr::call(Expr::field(Expr::name(TABLE), PACK), vec![value])
}

/// `table.unpack(list)` or `table.unpack(list, from, to)`.
pub fn table_unpack(list: Expr, range: Option<(Expr, Expr)>) -> Expr {
    let mut args = vec![list];
    if let Some((from, to)) = range {
        args.push(from);
        args.push(to);
    }
    Expr::call(Expr::field(Expr::name(TABLE), UNPACK), args)
}

/// `value["Symbol.dispose"](value)` or the async variant.
pub fn dispose_call(resource: &str, key: &str) -> Expr {
    Expr::call(
        Expr::index(Expr::name(resource), Expr::str(key)),
        vec![Expr::name(resource)],
    )
}

/// Values carried by a successful protected call that returned.
pub fn returned(values: ExprList) -> ExprList {
    let mut marked = ExprList::with_capacity(values.len() + 1);
    marked.push(Expr::Bool(true));
    marked.extend(values);
    marked
}
