//! Expression lowering.

use settle_ast::{self as ast, ExprKind, Literal, PropertyKey};
use settle_target::primitives::{self, SELF};
use settle_target::{BinOp, Block, Expr, Function, Stmt, TableField, UnOp};
use smallvec::smallvec;

use crate::errors::LoweringResult;
use crate::lower::context::LowerCtx;
use crate::lower::stmt::lower_block;

/// Lower an expression to a single value.
///
/// A multi-valued call here is collected into a table, so it keeps its
/// values without spilling into the surrounding list.
pub fn lower_expr(ctx: &mut LowerCtx<'_>, expr: &ast::Expr) -> LoweringResult<Expr> {
    let lowered = lower_raw(ctx, expr)?;
    if ctx.classification.multi_valued_call(expr.id).is_some() {
        return Ok(Expr::Table(vec![TableField::Positional(lowered)]));
    }
    Ok(lowered)
}

/// Lower an expression without collecting multi-valued results, for
/// positions that forward every value: returns and destructuring.
pub fn lower_raw(ctx: &mut LowerCtx<'_>, expr: &ast::Expr) -> LoweringResult<Expr> {
    Ok(match &expr.kind {
        ExprKind::Literal(literal) => match literal {
            Literal::Undefined => Expr::Nil,
            Literal::Bool(b) => Expr::Bool(*b),
            Literal::Int(n) => Expr::Int(*n),
            Literal::Str(s) => Expr::str(s.as_str()),
        },
        ExprKind::Var(name) => Expr::name(name.as_str()),
        ExprKind::This => Expr::name(SELF),
        ExprKind::Call { callee, args } => {
            let callee = lower_expr(ctx, callee)?;
            Expr::call(callee, lower_args(ctx, args)?)
        }
        ExprKind::MethodCall {
            receiver,
            method,
            args,
        } => {
            let receiver = lower_expr(ctx, receiver)?;
            let args = lower_args(ctx, args)?;
            lower_method_call(receiver, method, args)
        }
        ExprKind::Member { object, property } => {
            Expr::index(lower_expr(ctx, object)?, Expr::str(property_key(property)))
        }
        ExprKind::Binary { op, lhs, rhs } => Expr::binary(
            binary_op(*op),
            lower_expr(ctx, lhs)?,
            lower_expr(ctx, rhs)?,
        ),
        ExprKind::Unary { op, operand } => Expr::Unary {
            op: match op {
                ast::UnaryOp::Not => UnOp::Not,
                ast::UnaryOp::Neg => UnOp::Neg,
            },
            operand: Box::new(lower_expr(ctx, operand)?),
        },
        // Outside a return or destructuring this is already diagnosed; keep
        // the values as a list.
        ExprKind::Multi(values) => Expr::Table(
            values
                .iter()
                .map(|v| lower_expr(ctx, v).map(TableField::Positional))
                .collect::<LoweringResult<_>>()?,
        ),
        ExprKind::Function(function) => Expr::Function(Box::new(lower_function(ctx, function, false)?)),
        ExprKind::Await(operand) => primitives::await_value(lower_expr(ctx, operand)?),
        ExprKind::Object(members) => {
            let mut fields = Vec::with_capacity(members.len());
            for member in members {
                fields.push(match member {
                    ast::ObjectMember::Property { key, value } => {
                        TableField::Keyed(property_key(key).to_owned(), lower_expr(ctx, value)?)
                    }
                    ast::ObjectMember::Method { key, function } => TableField::Keyed(
                        property_key(key).to_owned(),
                        Expr::Function(Box::new(lower_function(ctx, function, true)?)),
                    ),
                });
            }
            Expr::Table(fields)
        }
        ExprKind::Array(elements) => Expr::Table(
            elements
                .iter()
                .map(|e| lower_expr(ctx, e).map(TableField::Positional))
                .collect::<LoweringResult<_>>()?,
        ),
    })
}

fn lower_args(ctx: &mut LowerCtx<'_>, args: &[ast::Expr]) -> LoweringResult<Vec<Expr>> {
    args.iter().map(|arg| lower_expr(ctx, arg)).collect()
}

fn lower_method_call(receiver: Expr, method: &PropertyKey, mut args: Vec<Expr>) -> Expr {
    match method {
        PropertyKey::Named(name) => Expr::MethodCall {
            receiver: Box::new(receiver),
            method: name.clone(),
            args,
        },
        key => {
            let key = Expr::str(property_key(key));
            if let Expr::Name(_) = receiver {
                args.insert(0, receiver.clone());
                return Expr::call(Expr::index(receiver, key), args);
            }
            // Evaluate the receiver once: (function(o) return o[key](o, ..) end)(receiver)
            let object = "____object".to_owned();
            let mut inner_args = vec![Expr::name(object.as_str())];
            inner_args.extend(args);
            let body = Block::new(vec![Stmt::ret(smallvec![Expr::call(
                Expr::index(Expr::name(object.as_str()), key),
                inner_args,
            )])]);
            Expr::call(Expr::function(vec![object], body), vec![receiver])
        }
    }
}

/// Key a property is stored under in the target table.
pub fn property_key(key: &PropertyKey) -> &str {
    match key {
        PropertyKey::Named(name) => name,
        PropertyKey::Dispose => primitives::DISPOSE_KEY,
        PropertyKey::AsyncDispose => primitives::ASYNC_DISPOSE_KEY,
    }
}

fn binary_op(op: ast::BinaryOp) -> BinOp {
    match op {
        ast::BinaryOp::Add => BinOp::Add,
        ast::BinaryOp::Sub => BinOp::Sub,
        ast::BinaryOp::Concat => BinOp::Concat,
        ast::BinaryOp::Eq => BinOp::Eq,
        ast::BinaryOp::NotEq => BinOp::NotEq,
        ast::BinaryOp::Lt => BinOp::Lt,
        ast::BinaryOp::And => BinOp::And,
        ast::BinaryOp::Or => BinOp::Or,
    }
}

/// Lower a function body in its own frame.
///
/// Methods take their object as a leading `self` parameter. An async
/// function returns the task running its body:
/// `function(..) return __async(function() <body> end) end`.
pub fn lower_function(
    ctx: &mut LowerCtx<'_>,
    function: &ast::FunctionDecl,
    is_method: bool,
) -> LoweringResult<Function> {
    let body = ctx.in_function(function.id, is_method, |ctx| lower_block(ctx, &function.body))?;

    let mut params = Vec::with_capacity(function.params.len() + 1);
    if is_method {
        params.push(SELF.to_owned());
    }
    params.extend(function.params.iter().cloned());

    let body = if function.is_async {
        let task = primitives::async_task(Expr::function(vec![], body));
        Block::new(vec![Stmt::ret(smallvec![task])])
    } else {
        body
    };
    Ok(Function { params, body })
}

#[cfg(test)]
mod tests {
    use settle_ast::build::*;
    use settle_ast::{Ty, TypeTable};
    use settle_target::{Chunk, render};

    use super::*;
    use crate::classify::classify_program;

    fn lowered(expr: ast::Expr) -> String {
        let program = program(vec![expr_stmt(expr.clone())]);
        let (classification, _) = classify_program(&program, &TypeTable::standard()).unwrap();
        let mut ctx = LowerCtx::new(&classification, &program.spans).unwrap();
        let expr = lower_expr(&mut ctx, &expr).unwrap();
        let chunk = Chunk {
            block: Block::new(vec![Stmt::local(["x".to_owned()], smallvec![expr])]),
        };
        render(&chunk).text.trim_end().to_owned()
    }

    #[test]
    fn test_named_method_call_uses_colon_syntax() {
        let call = method_call(var("obj"), named("greet"), vec![str_("hi")]);
        assert_eq!(lowered(call), r#"local x = obj:greet("hi")"#);
    }

    #[test]
    fn test_symbol_method_on_name_indexes_receiver() {
        let call = method_call(var("res"), ast::PropertyKey::Dispose, vec![]);
        assert_eq!(lowered(call), r#"local x = res["Symbol.dispose"](res)"#);
    }

    #[test]
    fn test_symbol_method_on_call_evaluates_receiver_once() {
        let call = method_call(call_named("make", vec![]), ast::PropertyKey::Dispose, vec![]);
        assert_eq!(
            lowered(call),
            "local x = (function(____object)\n    return ____object[\"Symbol.dispose\"](____object)\nend)(make())"
        );
    }

    #[test]
    fn test_multi_valued_call_is_collected() {
        let call = call_named("pair", vec![]).with_ty(Ty::multi(2));
        assert_eq!(lowered(call), "local x = {pair()}");
    }

    #[test]
    fn test_object_methods_take_self() {
        let obj = object(vec![
            property(named("name"), str_("a")),
            method(ast::PropertyKey::Dispose, &[], vec![expr_stmt(call_named(
                "log",
                vec![member(this(), named("name"))],
            ))]),
        ]);
        assert_eq!(
            lowered(obj),
            "local x = {name = \"a\", [\"Symbol.dispose\"] = function(self)\n    log(self.name)\nend}"
        );
    }

    #[test]
    fn test_async_function_wraps_body_in_task() {
        let f = async_func_expr(&["p"], vec![ret(await_(var("p")))]);
        assert_eq!(
            lowered(f),
            "local x = function(p)\n    return __async(function()\n        return __await(p)\n    end)\nend"
        );
    }
}
