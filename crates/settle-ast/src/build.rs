//! Tree builders.
//!
//! Front ends and tests assemble typed trees through these helpers; every
//! node receives a fresh [`NodeId`].

use crate::{
    BinaryOp, Block, CatchClause, Expr, ExprKind, FunctionDecl, Identifier, Literal, NodeId,
    ObjectMember, Pattern, Program, PropertyKey, SpanMap, Stmt, StmtKind, TryStmt, Ty, UnaryOp,
    UsingBinding, UsingDecl,
};

// ============================================================================
// Program structure
// ============================================================================

pub fn program(stmts: Vec<Stmt>) -> Program {
    program_with_spans(stmts, SpanMap::default())
}

pub fn program_with_spans(stmts: Vec<Stmt>, spans: SpanMap) -> Program {
    Program {
        id: NodeId::fresh(),
        body: block(stmts),
        spans,
    }
}

pub fn block(stmts: Vec<Stmt>) -> Block {
    Block {
        id: NodeId::fresh(),
        stmts,
    }
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt {
        id: NodeId::fresh(),
        kind,
    }
}

// ============================================================================
// Statements
// ============================================================================

pub fn let_(name: &str, init: Expr) -> Stmt {
    stmt(StmtKind::Let {
        pattern: Pattern::Binding(name.into()),
        init: Some(init),
    })
}

/// `let name;`
pub fn declare(name: &str) -> Stmt {
    stmt(StmtKind::Let {
        pattern: Pattern::Binding(name.into()),
        init: None,
    })
}

/// `const [a, b, ..] = init`
pub fn let_tuple(names: &[&str], init: Expr) -> Stmt {
    stmt(StmtKind::Let {
        pattern: Pattern::Tuple(names.iter().map(|n| Identifier::from(*n)).collect()),
        init: Some(init),
    })
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    stmt(StmtKind::Assign { target, value })
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    stmt(StmtKind::Expr(expr))
}

pub fn ret(value: Expr) -> Stmt {
    stmt(StmtKind::Return(Some(value)))
}

pub fn ret_void() -> Stmt {
    stmt(StmtKind::Return(None))
}

pub fn throw(value: Expr) -> Stmt {
    stmt(StmtKind::Throw(Some(value)))
}

pub fn throw_bare() -> Stmt {
    stmt(StmtKind::Throw(None))
}

pub fn if_(cond: Expr, then_stmts: Vec<Stmt>, else_stmts: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_block: block(then_stmts),
        else_block: else_stmts.map(block),
    })
}

/// Nested `{ .. }` block statement.
pub fn scope(stmts: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(block(stmts)))
}

pub fn catch(binding: Option<&str>, stmts: Vec<Stmt>) -> CatchClause {
    CatchClause {
        id: NodeId::fresh(),
        binding: binding.map(Identifier::from),
        body: block(stmts),
    }
}

pub fn try_stmt(
    body: Vec<Stmt>,
    catch: Option<CatchClause>,
    finally: Option<Vec<Stmt>>,
) -> Stmt {
    stmt(StmtKind::Try(TryStmt {
        body: block(body),
        catch,
        finally: finally.map(block),
    }))
}

pub fn try_catch(body: Vec<Stmt>, binding: Option<&str>, handler: Vec<Stmt>) -> Stmt {
    try_stmt(body, Some(catch(binding, handler)), None)
}

pub fn try_finally(body: Vec<Stmt>, finally: Vec<Stmt>) -> Stmt {
    try_stmt(body, None, Some(finally))
}

pub fn using(bindings: Vec<(&str, Expr)>) -> Stmt {
    using_decl(false, bindings)
}

pub fn await_using(bindings: Vec<(&str, Expr)>) -> Stmt {
    using_decl(true, bindings)
}

fn using_decl(is_await: bool, bindings: Vec<(&str, Expr)>) -> Stmt {
    stmt(StmtKind::Using(UsingDecl {
        is_await,
        bindings: bindings
            .into_iter()
            .map(|(name, init)| UsingBinding {
                id: NodeId::fresh(),
                name: name.into(),
                init,
            })
            .collect(),
    }))
}

pub fn function(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Function(function_decl(Some(name), params, body, false)))
}

pub fn async_function(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Function(function_decl(Some(name), params, body, true)))
}

fn function_decl(
    name: Option<&str>,
    params: &[&str],
    body: Vec<Stmt>,
    is_async: bool,
) -> FunctionDecl {
    FunctionDecl {
        id: NodeId::fresh(),
        name: name.map(Identifier::from),
        params: params.iter().map(|p| Identifier::from(*p)).collect(),
        body: block(body),
        is_async,
    }
}

// ============================================================================
// Expressions
// ============================================================================

fn expr(kind: ExprKind) -> Expr {
    Expr {
        id: NodeId::fresh(),
        kind,
        ty: Ty::Unknown,
    }
}

pub fn undefined() -> Expr {
    expr(ExprKind::Literal(Literal::Undefined))
}

pub fn bool_(value: bool) -> Expr {
    expr(ExprKind::Literal(Literal::Bool(value)))
}

pub fn int(value: i64) -> Expr {
    expr(ExprKind::Literal(Literal::Int(value)))
}

pub fn str_(value: &str) -> Expr {
    expr(ExprKind::Literal(Literal::Str(value.into())))
}

pub fn var(name: &str) -> Expr {
    expr(ExprKind::Var(name.into()))
}

pub fn this() -> Expr {
    expr(ExprKind::This)
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        callee: Box::new(callee),
        args,
    })
}

/// Call of a named function: `name(args)`.
pub fn call_named(name: &str, args: Vec<Expr>) -> Expr {
    call(var(name), args)
}

pub fn method_call(receiver: Expr, method: PropertyKey, args: Vec<Expr>) -> Expr {
    expr(ExprKind::MethodCall {
        receiver: Box::new(receiver),
        method,
        args,
    })
}

pub fn member(object: Expr, property: PropertyKey) -> Expr {
    expr(ExprKind::Member {
        object: Box::new(object),
        property,
    })
}

pub fn named(name: &str) -> PropertyKey {
    PropertyKey::Named(name.into())
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn concat(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Concat, lhs, rhs)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs)
}

pub fn not(operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op: UnaryOp::Not,
        operand: Box::new(operand),
    })
}

/// `$multi(values..)`
pub fn multi(values: Vec<Expr>) -> Expr {
    let ty = Ty::multi(values.len());
    expr(ExprKind::Multi(values)).with_ty(ty)
}

pub fn func_expr(params: &[&str], body: Vec<Stmt>) -> Expr {
    expr(ExprKind::Function(Box::new(function_decl(
        None, params, body, false,
    ))))
}

pub fn async_func_expr(params: &[&str], body: Vec<Stmt>) -> Expr {
    expr(ExprKind::Function(Box::new(function_decl(
        None, params, body, true,
    ))))
}

pub fn await_(operand: Expr) -> Expr {
    expr(ExprKind::Await(Box::new(operand)))
}

pub fn object(members: Vec<ObjectMember>) -> Expr {
    expr(ExprKind::Object(members))
}

pub fn property(key: PropertyKey, value: Expr) -> ObjectMember {
    ObjectMember::Property { key, value }
}

pub fn method(key: PropertyKey, params: &[&str], body: Vec<Stmt>) -> ObjectMember {
    ObjectMember::Method {
        key,
        function: function_decl(None, params, body, false),
    }
}

pub fn async_method(key: PropertyKey, params: &[&str], body: Vec<Stmt>) -> ObjectMember {
    ObjectMember::Method {
        key,
        function: function_decl(None, params, body, true),
    }
}

pub fn array(elements: Vec<Expr>) -> Expr {
    expr(ExprKind::Array(elements))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_allocate_distinct_ids() {
        let a = var("a");
        let b = var("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_multi_is_typed_by_arity() {
        let m = multi(vec![str_("foo"), str_("bar")]);
        assert_eq!(m.ty, Ty::multi(2));
    }

    #[test]
    fn test_try_builders() {
        let stmt = try_catch(vec![throw(str_("x"))], None, vec![]);
        let StmtKind::Try(region) = stmt.kind else {
            panic!("expected try statement");
        };
        assert!(region.finally.is_none());
        assert_eq!(region.catch.map(|c| c.binding), Some(None));
    }
}
