//! `try` / `catch` / `finally` lowering.
//!
//! Each region becomes one `do .. end` block. The try body runs in a
//! protected closure and the captured signal is then settled in place:
//!
//! ```text
//! do
//!     local ____ok, ____signal, ____result1 = pcall(function() <try> end)
//!     -- catch and finally
//!     if not ____ok then
//!         ____ok, ____signal, ____result1 = pcall(function(e) <catch> end, ____signal)
//!     end
//!     <finally>
//!     if not ____ok then error(____signal, 0) end
//!     if ____signal then return ____result1 end
//! end
//! ```
//!
//! Without a finally block the catch body runs inline instead:
//!
//! ```text
//!     if not ____ok then
//!         local e = ____signal
//!         <catch>
//!     elseif ____signal then
//!         return ____result1
//!     end
//! ```
//!
//! The finally block runs inline at the region's own protection level, so a
//! `return` or `throw` there replaces whatever signal is pending.

use settle_ast::{self as ast, NodeId};
use settle_core::Span;
use settle_target::primitives::{self, SIGNAL};
use settle_target::{Block, Expr, Stmt, StmtKind};
use smallvec::smallvec;
use tracing::debug;

use crate::errors::{LoweringError, LoweringResult};
use crate::lower::context::LowerCtx;
use crate::lower::region::{RegionState, RegionTracker, SignalSlots};
use crate::lower::stmt::{lower_block, lower_block_stmts};

pub fn lower_try(ctx: &mut LowerCtx<'_>, id: NodeId, region: &ast::TryStmt) -> LoweringResult<Stmt> {
    let info = *ctx
        .classification
        .region(id)
        .ok_or_else(|| LoweringError::unclassified(id, "try region"))?;
    debug!(
        region = %id,
        catch = info.has_catch,
        finally = info.has_finally,
        depth = info.depth,
        "lowering region"
    );

    let mut tracker = RegionTracker::enter(id);
    let slots = SignalSlots::new(ctx.frame().slots);
    // Lines the emulation adds stay attributed to the `try` itself.
    let origin = ctx.origin(id);

    tracker.advance(RegionState::TryRunning)?;
    let body = ctx.protected(|ctx| lower_block(ctx, &region.body))?;
    let mut stmts = with_origin(slots.capture(protected_call(body, vec![], vec![])), origin);

    match (&region.catch, &region.finally) {
        (Some(catch), Some(finally)) => {
            tracker.advance(RegionState::CatchRunning)?;
            let params = catch.binding.iter().cloned().collect();
            let handler = ctx.protected(|ctx| lower_block(ctx, &catch.body))?;
            let recapture = slots.recapture(protected_call(
                handler,
                params,
                vec![Expr::name(SIGNAL)],
            ));
            stmts.push(
                Stmt::if_then(
                    Expr::not(Expr::name(primitives::OK)),
                    with_origin(recapture, origin).into(),
                )
                .with_origin(origin),
            );

            tracker.advance(RegionState::FinallyRunning)?;
            stmts.extend(lower_finally(ctx, finally, &slots, origin)?);
        }
        (Some(catch), None) => {
            tracker.advance(RegionState::CatchRunning)?;
            let mut handler = Vec::with_capacity(catch.body.stmts.len() + 1);
            if let Some(binding) = &catch.binding {
                handler.push(
                    Stmt::local([binding.clone()], smallvec![Expr::name(SIGNAL)])
                        .with_origin(ctx.origin(catch.id)),
                );
            }
            handler.extend(lower_block_stmts(ctx, &catch.body)?);
            stmts.push(Stmt::new(StmtKind::If {
                clauses: vec![
                    (Expr::not(Expr::name(primitives::OK)), handler.into()),
                    (
                        Expr::name(SIGNAL),
                        Block::new(vec![slots.return_pending(ctx.in_protected()).with_origin(origin)]),
                    ),
                ],
                otherwise: None,
            })
            .with_origin(origin));
        }
        (None, Some(finally)) => {
            tracker.advance(RegionState::FinallyRunning)?;
            stmts.extend(lower_finally(ctx, finally, &slots, origin)?);
        }
        (None, None) => {
            return Err(LoweringError::invariant(
                id,
                "try statement without catch or finally",
            ));
        }
    }

    tracker.advance(RegionState::Settled)?;
    Ok(Stmt::do_block(stmts.into()))
}

/// The finally block inline, then the pending signal re-raised or
/// re-returned.
fn lower_finally(
    ctx: &mut LowerCtx<'_>,
    finally: &ast::Block,
    slots: &SignalSlots,
    origin: Option<Span>,
) -> LoweringResult<Vec<Stmt>> {
    let mut stmts = lower_block_stmts(ctx, finally)?;
    stmts.push(slots.rethrow_if_failed().with_origin(origin));
    stmts.push(slots.propagate_return(ctx.in_protected()).with_origin(origin));
    Ok(stmts)
}

pub(crate) fn with_origin(stmts: Vec<Stmt>, origin: Option<Span>) -> Vec<Stmt> {
    stmts
        .into_iter()
        .map(|stmt| stmt.with_origin(origin))
        .collect()
}

/// `pcall(function(params) <body> end, args..)`
pub(crate) fn protected_call(body: Block, params: Vec<String>, args: Vec<Expr>) -> Expr {
    primitives::pcall(Expr::function(params, body), args)
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use settle_ast::build::*;
    use settle_ast::TypeTable;
    use settle_target::{Chunk, render};

    use super::*;
    use crate::classify::classify_program;

    fn lowered(stmts: Vec<ast::Stmt>) -> String {
        let program = program(stmts);
        let (classification, _) = classify_program(&program, &TypeTable::standard()).unwrap();
        let mut ctx = LowerCtx::new(&classification, &program.spans).unwrap();
        let stmts = lower_block_stmts(&mut ctx, &program.body).unwrap();
        render(&Chunk {
            block: Block::new(stmts),
        })
        .text
    }

    #[test]
    fn test_catch_and_finally() {
        let text = lowered(vec![function(
            "f",
            &[],
            vec![try_stmt(
                vec![ret(str_("try"))],
                Some(catch(Some("e"), vec![ret(str_("catch"))])),
                Some(vec![ret(str_("finally"))]),
            )],
        )]);
        assert_snapshot!(text, @r#"
        local function f()
            do
                local ____ok, ____signal, ____result1 = pcall(function()
                    return true, "try"
                end)
                if not ____ok then
                    ____ok, ____signal, ____result1 = pcall(function(e)
                        return true, "catch"
                    end, ____signal)
                end
                do return "finally" end
                if not ____ok then
                    error(____signal, 0)
                end
                if ____signal then
                    return ____result1
                end
            end
        end
        "#);
    }

    #[test]
    fn test_catch_without_finally_runs_inline() {
        let text = lowered(vec![function(
            "f",
            &[],
            vec![try_catch(
                vec![throw(str_("boom"))],
                Some("e"),
                vec![ret(var("e"))],
            )],
        )]);
        assert_snapshot!(text, @r#"
        local function f()
            do
                local ____ok, ____signal, ____result1 = pcall(function()
                    error("boom", 0)
                end)
                if not ____ok then
                    local e = ____signal
                    return e
                elseif ____signal then
                    return ____result1
                end
            end
        end
        "#);
    }

    #[test]
    fn test_nested_region_inside_protected_closure_tags_returns() {
        let text = lowered(vec![function(
            "f",
            &[],
            vec![try_finally(
                vec![try_finally(vec![ret(int(1))], vec![])],
                vec![expr_stmt(call_named("log", vec![str_("outer")]))],
            )],
        )]);
        assert_snapshot!(text, @r#"
        local function f()
            do
                local ____ok, ____signal, ____result1 = pcall(function()
                    do
                        local ____ok, ____signal, ____result1 = pcall(function()
                            return true, 1
                        end)
                        if not ____ok then
                            error(____signal, 0)
                        end
                        if ____signal then
                            return true, ____result1
                        end
                    end
                end)
                log("outer")
                if not ____ok then
                    error(____signal, 0)
                end
                if ____signal then
                    return ____result1
                end
            end
        end
        "#);
    }

    #[test]
    fn test_bare_catch_has_no_binding() {
        let text = lowered(vec![try_stmt(
            vec![throw_bare()],
            Some(catch(None, vec![])),
            Some(vec![]),
        )]);
        assert_snapshot!(text, @r"
        do
            local ____ok, ____signal = pcall(function()
                error(nil, 0)
            end)
            if not ____ok then
                ____ok, ____signal = pcall(function() end, ____signal)
            end
            if not ____ok then
                error(____signal, 0)
            end
            if ____signal then
                return
            end
        end
        ");
    }
}
