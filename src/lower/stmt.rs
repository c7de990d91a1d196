//! Statement lowering.

use settle_ast::{self as ast, ExprKind, Pattern, StmtKind};
use settle_target::primitives;
use settle_target::{Block, Expr, Stmt};
use smallvec::smallvec;
use tracing::debug;

use crate::errors::{LoweringError, LoweringResult};
use crate::lower::context::LowerCtx;
use crate::lower::disposal::lower_using;
use crate::lower::expr::{lower_expr, lower_function, lower_raw};
use crate::lower::multi_return::{lower_destructure, lower_return};
use crate::lower::try_finally::lower_try;

pub fn lower_block(ctx: &mut LowerCtx<'_>, block: &ast::Block) -> LoweringResult<Block> {
    Ok(Block::new(lower_block_stmts(ctx, block)?))
}

/// Lower the statements of a block, checking its `using` bindings against
/// the disposable scope recorded for it.
pub fn lower_block_stmts(ctx: &mut LowerCtx<'_>, block: &ast::Block) -> LoweringResult<Vec<Stmt>> {
    let declared: Vec<_> = block
        .stmts
        .iter()
        .filter_map(|stmt| match &stmt.kind {
            StmtKind::Using(decl) => Some(decl.bindings.iter().map(|binding| binding.id)),
            _ => None,
        })
        .flatten()
        .collect();
    if !declared.is_empty() {
        let scope = ctx
            .classification
            .scope(block.id)
            .ok_or_else(|| LoweringError::unclassified(block.id, "disposable scope"))?;
        if scope.bindings != declared {
            return Err(LoweringError::invariant(
                block.id,
                "disposable scope does not match the block's bindings",
            ));
        }
        debug!(block = %block.id, bindings = declared.len(), "lowering disposable scope");
    }
    lower_stmts(ctx, &block.stmts)
}

/// Lower a statement list. A `using` declaration takes the rest of the list
/// as the body it guards.
pub fn lower_stmts(ctx: &mut LowerCtx<'_>, stmts: &[ast::Stmt]) -> LoweringResult<Vec<Stmt>> {
    let mut out = Vec::with_capacity(stmts.len());
    for (i, stmt) in stmts.iter().enumerate() {
        if let StmtKind::Using(decl) = &stmt.kind {
            out.push(lower_using(ctx, stmt, decl, &stmts[i + 1..])?);
            break;
        }
        out.push(lower_stmt(ctx, stmt)?);
    }
    Ok(out)
}

fn lower_stmt(ctx: &mut LowerCtx<'_>, stmt: &ast::Stmt) -> LoweringResult<Stmt> {
    let lowered = match &stmt.kind {
        StmtKind::Let { pattern, init } => match pattern {
            Pattern::Binding(name) => {
                let values = match init {
                    Some(init) => smallvec![lower_expr(ctx, init)?],
                    None => smallvec![],
                };
                Stmt::local([name.clone()], values)
            }
            Pattern::Tuple(names) => {
                let Some(init) = init else {
                    return Ok(Stmt::local(names.iter().cloned(), smallvec![]).with_origin(ctx.origin(stmt.id)));
                };
                lower_destructure(ctx, names, init)?
            }
        },
        StmtKind::Assign { target, value } => {
            let target = lower_expr(ctx, target)?;
            Stmt::assign(smallvec![target], smallvec![lower_expr(ctx, value)?])
        }
        StmtKind::Expr(expr) => match &expr.kind {
            // Every value of a call statement is discarded.
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => Stmt::call(lower_raw(ctx, expr)?),
            ExprKind::Await(_) => Stmt::call(lower_expr(ctx, expr)?),
            _ => Stmt::local(["_".to_owned()], smallvec![lower_expr(ctx, expr)?]),
        },
        StmtKind::Return(value) => lower_return(ctx, value.as_ref())?,
        StmtKind::Throw(value) => {
            let value = match value {
                Some(value) => lower_expr(ctx, value)?,
                None => Expr::Nil,
            };
            Stmt::call(primitives::raise(value))
        }
        StmtKind::If {
            cond,
            then_block,
            else_block,
        } => {
            let cond = lower_expr(ctx, cond)?;
            let then_block = lower_block(ctx, then_block)?;
            let otherwise = match else_block {
                Some(block) => Some(lower_block(ctx, block)?),
                None => None,
            };
            Stmt::new(settle_target::StmtKind::If {
                clauses: vec![(cond, then_block)],
                otherwise,
            })
        }
        StmtKind::Block(block) => Stmt::do_block(lower_block(ctx, block)?),
        StmtKind::Try(region) => lower_try(ctx, stmt.id, region)?,
        StmtKind::Using(_) => {
            return Err(LoweringError::invariant(
                stmt.id,
                "using declaration outside a statement list",
            ));
        }
        StmtKind::Function(function) => {
            let Some(name) = &function.name else {
                return Err(LoweringError::invariant(
                    function.id,
                    "function declaration without a name",
                ));
            };
            Stmt::new(settle_target::StmtKind::LocalFunction {
                name: name.clone(),
                function: lower_function(ctx, function, false)?,
            })
        }
    };
    Ok(lowered.with_origin(ctx.origin(stmt.id)))
}
