//! Multi-value returns.
//!
//! `$multi(a, b)` and multi-valued calls travel as native multiple results:
//! `return a, b` and `return f()`. Inside a protected closure the values
//! follow the `true` marker, and the enclosing region hands them on from
//! its result slots, so no table is built on the way out.

use settle_ast::{self as ast, ExprKind, Identifier};
use settle_target::primitives;
use settle_target::{ExprList, Stmt};
use smallvec::smallvec;

use crate::errors::LoweringResult;
use crate::lower::context::LowerCtx;
use crate::lower::expr::{lower_expr, lower_raw};

/// `return v..`, tagged with `true` inside a protected closure.
pub fn lower_return(ctx: &mut LowerCtx<'_>, value: Option<&ast::Expr>) -> LoweringResult<Stmt> {
    let values = match value {
        Some(value) => return_values(ctx, value)?,
        None => ExprList::new(),
    };
    Ok(Stmt::ret(if ctx.in_protected() {
        primitives::returned(values)
    } else {
        values
    }))
}

/// Values of a `return` operand, with multi-valued results left unpacked.
pub fn return_values(ctx: &mut LowerCtx<'_>, value: &ast::Expr) -> LoweringResult<ExprList> {
    match &value.kind {
        ExprKind::Multi(values) => multi_values(ctx, values),
        _ if ctx.classification.multi_valued_call(value.id).is_some() => {
            Ok(smallvec![lower_raw(ctx, value)?])
        }
        _ => Ok(smallvec![lower_expr(ctx, value)?]),
    }
}

/// Elements of `$multi(..)`; a trailing multi-valued call spreads its values.
fn multi_values(ctx: &mut LowerCtx<'_>, values: &[ast::Expr]) -> LoweringResult<ExprList> {
    let mut out = ExprList::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let is_last = i + 1 == values.len();
        out.push(if is_last {
            lower_raw(ctx, value)?
        } else {
            lower_expr(ctx, value)?
        });
    }
    Ok(out)
}

/// `const [a, b] = init`.
///
/// Multi-valued initializers bind directly; only a list value is unpacked.
pub fn lower_destructure(
    ctx: &mut LowerCtx<'_>,
    names: &[Identifier],
    init: &ast::Expr,
) -> LoweringResult<Stmt> {
    let values = match &init.kind {
        ExprKind::Multi(values) => multi_values(ctx, values)?,
        _ if ctx.classification.multi_valued_call(init.id).is_some() => {
            smallvec![lower_raw(ctx, init)?]
        }
        _ => smallvec![primitives::table_unpack(lower_expr(ctx, init)?, None)],
    };
    Ok(Stmt::local(names.iter().cloned(), values))
}
