//! Runtime behavior of lowered try/catch/finally regions.

mod common;

use common::*;
use settle_ast::build::*;
use settle_ast::Expr;
use settle_runtime::{RuntimeError, Value};

fn evaluate_fn() -> settle_ast::Stmt {
    // function evaluate(arg) { x = "evaluated"; return arg; }
    function(
        "evaluate",
        &["arg"],
        vec![assign(var("x"), str_("evaluated")), ret(var("arg"))],
    )
}

fn joined(parts: Vec<Expr>) -> Expr {
    let mut parts = parts.into_iter();
    let first = parts.next().unwrap();
    parts.fold(first, concat)
}

#[test]
fn test_uncaught_throw_surfaces_value() {
    let run = run(vec![throw(str_("Some Error"))]);
    match run.result {
        Err(RuntimeError::Thrown(value)) => assert_eq!(value, Value::str("Some Error")),
        other => panic!("expected thrown value, got {other:?}"),
    }
}

#[test]
fn test_rethrow_without_catch_variable() {
    let run = run(vec![
        let_("result", str_("x")),
        try_catch(
            vec![try_catch(vec![throw(str_("y"))], None, vec![throw(str_("z"))])],
            Some("e"),
            vec![assign(var("result"), var("e"))],
        ),
        ret(var("result")),
    ]);
    assert_eq!(run.values(), &[Value::str("z")]);
}

#[test]
fn test_return_from_try() {
    let run = run(vec![
        function(
            "foobar",
            &[],
            vec![try_catch(vec![ret(str_("foobar"))], None, vec![])],
        ),
        ret(call_named("foobar", vec![])),
    ]);
    assert_eq!(run.values(), &[Value::str("foobar")]);
}

#[test]
fn test_return_nil_from_try_skips_rest() {
    let run = run(vec![
        let_("x", str_("unset")),
        function(
            "foobar",
            &[],
            vec![
                try_catch(vec![ret_void()], None, vec![]),
                assign(var("x"), str_("set")),
            ],
        ),
        expr_stmt(call_named("foobar", vec![])),
        ret(var("x")),
    ]);
    assert_eq!(run.values(), &[Value::str("unset")]);
}

#[test]
fn test_return_nil_from_catch_skips_rest() {
    let run = run(vec![
        let_("x", str_("unset")),
        function(
            "foobar",
            &[],
            vec![
                try_catch(vec![throw(str_("foobar"))], Some("e"), vec![ret_void()]),
                assign(var("x"), str_("set")),
            ],
        ),
        expr_stmt(call_named("foobar", vec![])),
        ret(var("x")),
    ]);
    assert_eq!(run.values(), &[Value::str("unset")]);
}

#[test]
fn test_return_from_catch() {
    let run = run(vec![
        function(
            "foobar",
            &[],
            vec![try_catch(
                vec![throw(str_("foobar"))],
                Some("e"),
                vec![ret(concat(var("e"), str_(" catch")))],
            )],
        ),
        ret(call_named("foobar", vec![])),
    ]);
    assert_eq!(run.values(), &[Value::str("foobar catch")]);
}

#[test]
fn test_return_from_nested_try() {
    let run = run(vec![
        function(
            "foobar",
            &[],
            vec![try_catch(
                vec![try_catch(vec![ret(str_("foobar"))], None, vec![])],
                None,
                vec![],
            )],
        ),
        ret(call_named("foobar", vec![])),
    ]);
    assert_eq!(run.values(), &[Value::str("foobar")]);
}

#[test]
fn test_return_from_nested_catch() {
    let run = run(vec![
        function(
            "foobar",
            &[],
            vec![try_catch(
                vec![throw(str_("foobar"))],
                Some("e"),
                vec![try_catch(
                    vec![throw(concat(var("e"), str_(" catch1")))],
                    Some("f"),
                    vec![ret(concat(var("f"), str_(" catch2")))],
                )],
            )],
        ),
        ret(call_named("foobar", vec![])),
    ]);
    assert_eq!(run.values(), &[Value::str("foobar catch1 catch2")]);
}

#[test]
fn test_finally_return_overrides_try_return() {
    let run = run(vec![
        let_("x", str_("unevaluated")),
        evaluate_fn(),
        function(
            "foobar",
            &[],
            vec![try_stmt(
                vec![ret(call_named("evaluate", vec![str_("foobar")]))],
                Some(catch(None, vec![])),
                Some(vec![ret(str_("finally"))]),
            )],
        ),
        ret(joined(vec![call_named("foobar", vec![]), str_(" "), var("x")])),
    ]);
    assert_eq!(run.values(), &[Value::str("finally evaluated")]);
}

#[test]
fn test_finally_return_overrides_catch_return() {
    let run = run(vec![
        let_("x", str_("unevaluated")),
        evaluate_fn(),
        function(
            "foobar",
            &[],
            vec![try_stmt(
                vec![throw(str_("foobar"))],
                Some(catch(Some("e"), vec![ret(call_named("evaluate", vec![var("e")]))])),
                Some(vec![ret(str_("finally"))]),
            )],
        ),
        ret(joined(vec![call_named("foobar", vec![]), str_(" "), var("x")])),
    ]);
    assert_eq!(run.values(), &[Value::str("finally evaluated")]);
}

#[test]
fn test_return_from_nested_finally() {
    let run = run(vec![
        let_("x", str_("")),
        function(
            "foobar",
            &[],
            vec![try_finally(
                vec![try_finally(
                    vec![],
                    vec![
                        assign(var("x"), concat(var("x"), str_("A"))),
                        ret(str_("foobar")),
                    ],
                )],
                vec![
                    assign(var("x"), concat(var("x"), str_("B"))),
                    ret(str_("finally")),
                ],
            )],
        ),
        ret(joined(vec![call_named("foobar", vec![]), str_(" "), var("x")])),
    ]);
    assert_eq!(run.values(), &[Value::str("finally AB")]);
}

#[test]
fn test_finally_return_swallows_pending_throw() {
    let run = run(vec![
        function(
            "foobar",
            &[],
            vec![try_finally(vec![throw(str_("lost"))], vec![ret(str_("kept"))])],
        ),
        ret(call_named("foobar", vec![])),
    ]);
    assert_eq!(run.values(), &[Value::str("kept")]);
}

#[test]
fn test_finally_throw_replaces_pending_throw() {
    // The inner catch rethrows, the outer catch rethrows, and the outer
    // finally's throw wins.
    for inner in [true, false] {
        let inner_body = if inner {
            vec![throw(str_("z"))]
        } else {
            vec![]
        };
        let run = run(vec![
            function(
                "foo",
                &[],
                vec![try_stmt(
                    vec![try_stmt(
                        inner_body,
                        Some(catch(Some("e"), vec![throw(str_("a"))])),
                        Some(vec![if_(bool_(!inner), vec![throw(str_("b"))], None)]),
                    )],
                    Some(catch(Some("e"), vec![throw(concat(var("e"), str_("!")))])),
                    Some(vec![throw(str_("C"))]),
                )],
            ),
            let_("result", str_("x")),
            try_catch(
                vec![expr_stmt(call_named("foo", vec![]))],
                Some("e"),
                vec![assign(var("result"), var("e"))],
            ),
            ret(var("result")),
        ]);
        assert_eq!(run.values(), &[Value::str("C")]);
    }
}

#[test]
fn test_finally_runs_once_on_normal_completion() {
    let run = run(vec![
        try_finally(vec![log("try")], vec![log("finally")]),
        log("after"),
    ]);
    run.values();
    assert_eq!(run.log, vec!["try", "finally", "after"]);
}

#[test]
fn test_try_side_effects_run_once_when_catch_rethrows() {
    let run = run(vec![
        try_catch(
            vec![try_stmt(
                vec![log("try"), throw(str_("first"))],
                Some(catch(Some("e"), vec![log_expr(var("e")), throw(str_("second"))])),
                Some(vec![log("finally")]),
            )],
            Some("e"),
            vec![log_expr(var("e"))],
        ),
    ]);
    run.values();
    assert_eq!(run.log, vec!["try", "first", "finally", "second"]);
}

#[test]
fn test_thrown_table_keeps_identity() {
    let run = run(vec![
        let_("err", object(vec![property(named("x"), str_("error object"))])),
        try_catch(
            vec![try_finally(vec![throw(var("err"))], vec![log("finally")])],
            Some("e"),
            vec![ret(eq(var("e"), var("err")))],
        ),
    ]);
    assert_eq!(run.values(), &[Value::Bool(true)]);
    assert_eq!(run.log, vec!["finally"]);
}

#[test]
fn test_throw_and_catch_values() {
    let cases: Vec<(Expr, Value)> = vec![
        (str_("error string"), Value::str("error string")),
        (int(42), Value::Int(42)),
        (bool_(true), Value::Bool(true)),
        (bool_(false), Value::Bool(false)),
        (undefined(), Value::Nil),
    ];
    for (thrown, expected) in cases {
        let run = run(vec![try_catch(
            vec![throw(thrown)],
            Some("caught"),
            vec![ret(var("caught"))],
        )]);
        assert_eq!(run.values(), &[expected]);
    }
}

#[test]
fn test_thrown_function_can_be_called_by_handler() {
    let run = run(vec![try_catch(
        vec![throw(func_expr(&[], vec![ret(str_("error function"))]))],
        Some("caught"),
        vec![ret(call(var("caught"), vec![]))],
    )]);
    assert_eq!(run.values(), &[Value::str("error function")]);
}

#[test]
fn test_bare_throw_raises_nil() {
    let run = run(vec![try_catch(
        vec![throw_bare()],
        Some("e"),
        vec![ret(eq(var("e"), undefined()))],
    )]);
    assert_eq!(run.values(), &[Value::Bool(true)]);
}
