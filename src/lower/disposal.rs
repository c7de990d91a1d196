//! `using` / `await using` lowering.
//!
//! The statements after a `using` declaration form its body. Each binding
//! acquires its resource, runs the rest of the scope in a protected call,
//! disposes, and then re-raises or re-returns what the body signalled:
//!
//! ```text
//! do
//!     local a = make_a()
//!     local ____ok, ____signal = pcall(function()
//!         <next binding, or the rest of the block>
//!     end)
//!     a["Symbol.dispose"](a)
//!     if not ____ok then error(____signal, 0) end
//!     if ____signal then return end
//! end
//! ```
//!
//! Later bindings nest inside earlier ones, so disposal runs in reverse
//! declaration order whatever way the body exits. A disposer that throws
//! replaces the pending signal; the enclosing bindings still dispose.

use settle_ast::{self as ast, UsingBinding};
use settle_target::primitives::{self, ASYNC_DISPOSE_KEY, DISPOSE_KEY};
use settle_target::{BinOp, Block, Expr, Stmt};
use smallvec::smallvec;
use tracing::debug;

use crate::classify::DisposableBinding;
use crate::errors::{LoweringError, LoweringResult};
use crate::lower::context::LowerCtx;
use crate::lower::expr::lower_expr;
use crate::lower::region::SignalSlots;
use crate::lower::stmt::lower_stmts;
use crate::lower::try_finally::{protected_call, with_origin};

pub fn lower_using(
    ctx: &mut LowerCtx<'_>,
    stmt: &ast::Stmt,
    decl: &ast::UsingDecl,
    rest: &[ast::Stmt],
) -> LoweringResult<Stmt> {
    if decl.bindings.is_empty() {
        return Err(LoweringError::invariant(stmt.id, "using declaration without bindings"));
    }
    let lowered = lower_bindings(ctx, &decl.bindings, rest)?;
    Ok(lowered.with_origin(ctx.origin(stmt.id)))
}

fn lower_bindings(
    ctx: &mut LowerCtx<'_>,
    bindings: &[UsingBinding],
    rest: &[ast::Stmt],
) -> LoweringResult<Stmt> {
    let Some((binding, inner)) = bindings.split_first() else {
        return Err(LoweringError::invariant(
            ctx.frame().id,
            "disposal scope without bindings",
        ));
    };
    let record = ctx
        .classification
        .binding(binding.id)
        .cloned()
        .ok_or_else(|| LoweringError::unclassified(binding.id, "disposable binding"))?;
    debug!(
        binding = %record.name,
        order = record.declaration_order,
        is_async = record.is_async,
        "lowering disposable"
    );

    let init = lower_expr(ctx, &binding.init)?;
    let body = ctx.protected(|ctx| match inner {
        [] => lower_stmts(ctx, rest),
        inner => Ok(vec![lower_bindings(ctx, inner, rest)?]),
    })?;

    let slots = SignalSlots::new(ctx.frame().slots);
    let origin = ctx.origin(binding.id);
    let mut stmts = vec![Stmt::local([record.name.clone()], smallvec![init])];
    stmts.extend(slots.capture(protected_call(body.into(), vec![], vec![])));
    stmts.push(dispose(&record));
    stmts.push(slots.rethrow_if_failed());
    stmts.push(slots.propagate_return(ctx.in_protected()));
    Ok(Stmt::do_block(with_origin(stmts, origin).into()))
}

/// The disposer call for one binding, guarded when the resource may be
/// absent.
fn dispose(binding: &DisposableBinding) -> Stmt {
    let name = binding.name.as_str();
    let call = if binding.is_async {
        let key = if binding.capability.asynchronous {
            ASYNC_DISPOSE_KEY
        } else {
            DISPOSE_KEY
        };
        primitives::await_value(primitives::dispose_call(name, key))
    } else {
        primitives::dispose_call(name, DISPOSE_KEY)
    };
    let stmt = Stmt::call(call);
    if binding.nullable {
        Stmt::if_then(
            Expr::binary(BinOp::NotEq, Expr::name(name), Expr::Nil),
            Block::new(vec![stmt]),
        )
    } else {
        stmt
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use settle_ast::build::*;
    use settle_ast::{DisposeCapability, Ty, TypeTable};
    use settle_target::{Chunk, render};

    use super::*;
    use crate::classify::classify_program;
    use crate::errors::LoweringErrorKind;
    use crate::lower::stmt::lower_block_stmts;

    fn lowered(stmts: Vec<ast::Stmt>) -> String {
        let facts = TypeTable::standard().with_disposable("Both", DisposeCapability::BOTH);
        let program = program(stmts);
        let (classification, diagnostics) = classify_program(&program, &facts).unwrap();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let mut ctx = LowerCtx::new(&classification, &program.spans).unwrap();
        let stmts = lower_block_stmts(&mut ctx, &program.body).unwrap();
        render(&Chunk {
            block: Block::new(stmts),
        })
        .text
    }

    fn resource(name: &str, ty: &str) -> ast::Expr {
        call_named("make", vec![str_(name)]).with_ty(Ty::named(ty))
    }

    #[test]
    fn test_bindings_nest_in_declaration_order() {
        let text = lowered(vec![
            using(vec![("a", resource("a", "Disposable")), ("b", resource("b", "Disposable"))]),
            expr_stmt(call_named("log", vec![str_("content")])),
        ]);
        assert_snapshot!(text, @r#"
        do
            local a = make("a")
            local ____ok, ____signal = pcall(function()
                do
                    local b = make("b")
                    local ____ok, ____signal = pcall(function()
                        log("content")
                    end)
                    b["Symbol.dispose"](b)
                    if not ____ok then
                        error(____signal, 0)
                    end
                    if ____signal then
                        return true
                    end
                end
            end)
            a["Symbol.dispose"](a)
            if not ____ok then
                error(____signal, 0)
            end
            if ____signal then
                return
            end
        end
        "#);
    }

    #[test]
    fn test_await_using_prefers_async_disposer() {
        let text = lowered(vec![async_function(
            "f",
            &[],
            vec![
                await_using(vec![
                    ("a", resource("a", "AsyncDisposable")),
                    ("b", resource("b", "Disposable")),
                    ("c", resource("c", "Both")),
                ]),
            ],
        )]);
        assert!(text.contains(r#"__await(a["Symbol.asyncDispose"](a))"#));
        assert!(text.contains(r#"__await(b["Symbol.dispose"](b))"#));
        assert!(text.contains(r#"__await(c["Symbol.asyncDispose"](c))"#));
    }

    #[test]
    fn test_nullable_resource_is_guarded() {
        let init = call_named("maybe", vec![]).with_ty(Ty::named("Disposable").nullable());
        let text = lowered(vec![using(vec![("r", init)])]);
        assert!(text.contains("if r ~= nil then\n        r[\"Symbol.dispose\"](r)\n    end"));
    }

    #[test]
    fn test_empty_using_is_invariant_violation() {
        let stmt = using(vec![]);
        let id = stmt.id;
        let program = program(vec![stmt]);
        let err = classify_program(&program, &TypeTable::standard()).unwrap_err();
        assert_eq!(err.node(), id);
    }

    #[test]
    fn test_block_without_recorded_scope_is_unclassified() {
        let classified = program(vec![]);
        let (classification, _) =
            classify_program(&classified, &TypeTable::standard()).unwrap();
        let mut ctx = LowerCtx::new(&classification, &classified.spans).unwrap();

        let body = block(vec![using(vec![("a", resource("a", "Disposable"))])]);
        let err = lower_block_stmts(&mut ctx, &body).unwrap_err();
        assert_eq!(err.node(), body.id);
        assert!(matches!(
            err.kind(),
            LoweringErrorKind::Unclassified { what: "disposable scope", .. }
        ));
    }
}
