//! Line-faithful renderer.
//!
//! Produces target text and, for every statement that carries an origin,
//! the generated line it starts on. Those facts feed the source map.

use settle_core::Span;

use crate::{BinOp, Block, Chunk, Expr, Function, Stmt, StmtKind, TableField, UnOp};

const INDENT: &str = "    ";

const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Rendered text plus `(generated line, origin span)` facts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub origins: Vec<(u32, Span)>,
}

pub fn render(chunk: &Chunk) -> Rendered {
    render_from_line(chunk, 1)
}

/// Render a chunk whose first line will appear at `first_line` of the
/// final file, so recorded line numbers account for any preamble.
pub fn render_from_line(chunk: &Chunk, first_line: u32) -> Rendered {
    let mut printer = Printer {
        out: String::new(),
        line: first_line,
        indent: 0,
        origins: Vec::new(),
    };
    printer.block(&chunk.block);
    Rendered {
        text: printer.out,
        origins: printer.origins,
    }
}

struct Printer {
    out: String,
    line: u32,
    indent: usize,
    origins: Vec<(u32, Span)>,
}

impl Printer {
    fn newline(&mut self) {
        self.out.push('\n');
        self.line += 1;
    }

    fn pad(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn nested(&mut self, block: &Block) {
        self.indent += 1;
        self.block(block);
        self.indent -= 1;
    }

    fn block(&mut self, block: &Block) {
        let last = block.stmts.len().saturating_sub(1);
        for (i, stmt) in block.stmts.iter().enumerate() {
            self.stmt(stmt, i == last);
        }
    }

    fn stmt(&mut self, stmt: &Stmt, is_last: bool) {
        self.pad();
        if let Some(span) = stmt.origin {
            self.origins.push((self.line, span));
        }
        match &stmt.kind {
            StmtKind::Local { names, values } => {
                self.out.push_str("local ");
                self.out.push_str(&names.join(", "));
                if !values.is_empty() {
                    self.out.push_str(" = ");
                    self.list(values);
                }
            }
            StmtKind::LocalFunction { name, function } => {
                self.out.push_str("local ");
                self.function(Some(name), function);
            }
            StmtKind::Assign { targets, values } => {
                self.list(targets);
                self.out.push_str(" = ");
                self.list(values);
            }
            StmtKind::Call(expr) => self.expr(expr),
            StmtKind::Do(body) => {
                self.out.push_str("do");
                self.newline();
                self.nested(body);
                self.pad();
                self.out.push_str("end");
            }
            StmtKind::If { clauses, otherwise } => {
                for (i, (cond, body)) in clauses.iter().enumerate() {
                    if i > 0 {
                        self.pad();
                        self.out.push_str("else");
                    }
                    self.out.push_str("if ");
                    self.expr(cond);
                    self.out.push_str(" then");
                    self.newline();
                    self.nested(body);
                }
                if let Some(body) = otherwise {
                    self.pad();
                    self.out.push_str("else");
                    self.newline();
                    self.nested(body);
                }
                self.pad();
                self.out.push_str("end");
            }
            StmtKind::Return(values) => {
                // `return` must close its block.
                if !is_last {
                    self.out.push_str("do ");
                }
                self.out.push_str("return");
                if !values.is_empty() {
                    self.out.push(' ');
                    self.list(values);
                }
                if !is_last {
                    self.out.push_str(" end");
                }
            }
        }
        self.newline();
    }

    fn function(&mut self, name: Option<&str>, function: &Function) {
        self.out.push_str("function");
        if let Some(name) = name {
            self.out.push(' ');
            self.out.push_str(name);
        }
        self.out.push('(');
        self.out.push_str(&function.params.join(", "));
        self.out.push(')');
        if function.body.stmts.is_empty() {
            self.out.push_str(" end");
            return;
        }
        self.newline();
        self.nested(&function.body);
        self.pad();
        self.out.push_str("end");
    }

    fn list(&mut self, exprs: &[Expr]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        self.expr_prec(expr, 0);
    }

    fn expr_prec(&mut self, expr: &Expr, min_prec: u8) {
        match expr {
            Expr::Nil => self.out.push_str("nil"),
            Expr::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Expr::Int(n) => self.out.push_str(&n.to_string()),
            Expr::Str(s) => self.out.push_str(&quote(s)),
            Expr::Name(name) => self.out.push_str(name),
            Expr::Index { object, key } => {
                self.prefix(object);
                match key.as_ref() {
                    Expr::Str(field) if is_identifier(field) => {
                        self.out.push('.');
                        self.out.push_str(field);
                    }
                    key => {
                        self.out.push('[');
                        self.expr(key);
                        self.out.push(']');
                    }
                }
            }
            Expr::Call { callee, args } => {
                self.prefix(callee);
                self.out.push('(');
                self.list(args);
                self.out.push(')');
            }
            Expr::MethodCall {
                receiver,
                method,
                args,
            } => {
                self.prefix(receiver);
                self.out.push(':');
                self.out.push_str(method);
                self.out.push('(');
                self.list(args);
                self.out.push(')');
            }
            Expr::Function(function) => self.function(None, function),
            Expr::Table(fields) => {
                self.out.push('{');
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    match field {
                        TableField::Positional(value) => self.expr(value),
                        TableField::Keyed(key, value) => {
                            if is_identifier(key) {
                                self.out.push_str(key);
                            } else {
                                self.out.push('[');
                                self.out.push_str(&quote(key));
                                self.out.push(']');
                            }
                            self.out.push_str(" = ");
                            self.expr(value);
                        }
                    }
                }
                self.out.push('}');
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = precedence(*op);
                let paren = prec < min_prec;
                if paren {
                    self.out.push('(');
                }
                let (left_prec, right_prec) = if *op == BinOp::Concat {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                self.expr_prec(lhs, left_prec);
                self.out.push(' ');
                self.out.push_str(op_text(*op));
                self.out.push(' ');
                self.expr_prec(rhs, right_prec);
                if paren {
                    self.out.push(')');
                }
            }
            Expr::Unary { op, operand } => {
                let paren = UNARY_PREC < min_prec;
                if paren {
                    self.out.push('(');
                }
                match op {
                    UnOp::Not => {
                        self.out.push_str("not ");
                        self.expr_prec(operand, UNARY_PREC);
                    }
                    UnOp::Neg => {
                        self.out.push('-');
                        let negative = matches!(
                            operand.as_ref(),
                            Expr::Int(n) if *n < 0
                        ) || matches!(
                            operand.as_ref(),
                            Expr::Unary { op: UnOp::Neg, .. }
                        );
                        if negative {
                            self.out.push('(');
                            self.expr(operand);
                            self.out.push(')');
                        } else {
                            self.expr_prec(operand, UNARY_PREC);
                        }
                    }
                }
                if paren {
                    self.out.push(')');
                }
            }
        }
    }

    /// Callee or indexed object position.
    fn prefix(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(_) | Expr::Index { .. } | Expr::Call { .. } | Expr::MethodCall { .. } => {
                self.expr(expr)
            }
            _ => {
                self.out.push('(');
                self.expr(expr);
                self.out.push(')');
            }
        }
    }
}

const UNARY_PREC: u8 = 6;

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => 2,
        BinOp::Eq | BinOp::NotEq | BinOp::Lt => 3,
        BinOp::Concat => 4,
        BinOp::Add | BinOp::Sub => 5,
    }
}

fn op_text(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Concat => "..",
        BinOp::Eq => "==",
        BinOp::NotEq => "~=",
        BinOp::Lt => "<",
        BinOp::And => "and",
        BinOp::Or => "or",
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&s)
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\{}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use smallvec::smallvec;

    fn chunk(stmts: Vec<Stmt>) -> Chunk {
        Chunk {
            block: Block::new(stmts),
        }
    }

    #[test]
    fn test_render_protected_region() {
        let body = Block::new(vec![Stmt::call(primitives::raise(Expr::str("boom")))]);
        let region = Stmt::do_block(Block::new(vec![Stmt::local(
            [primitives::OK.to_string(), primitives::SIGNAL.to_string()],
            smallvec![primitives::pcall(Expr::function(vec![], body), vec![])],
        )]));
        let rendered = render(&chunk(vec![region]));
        insta::assert_snapshot!(rendered.text, @r#"
        do
            local ____ok, ____signal = pcall(function()
                error("boom", 0)
            end)
        end
        "#);
    }

    #[test]
    fn test_non_final_return_is_wrapped() {
        let rendered = render(&chunk(vec![
            Stmt::ret(smallvec![Expr::str("early")]),
            Stmt::call(Expr::call_named("log", vec![])),
        ]));
        assert_eq!(rendered.text, "do return \"early\" end\nlog()\n");
    }

    #[test]
    fn test_origins_track_lines() {
        let rendered = render_from_line(
            &chunk(vec![
                Stmt::call(Expr::call_named("a", vec![])).with_origin(Some(Span::new(0, 3))),
                Stmt::do_block(Block::new(vec![
                    Stmt::call(Expr::call_named("b", vec![]))
                        .with_origin(Some(Span::new(4, 7))),
                ])),
            ]),
            2,
        );
        assert_eq!(
            rendered.origins,
            vec![(2, Span::new(0, 3)), (4, Span::new(4, 7))]
        );
    }

    #[test]
    fn test_table_keys_and_indexing() {
        let table = Expr::Table(vec![
            TableField::Keyed("5".into(), Expr::Int(1)),
            TableField::Keyed("name".into(), Expr::str("a")),
        ]);
        let dispose = primitives::dispose_call("a", primitives::DISPOSE_KEY);
        let rendered = render(&chunk(vec![
            Stmt::local(["t".to_string()], smallvec![table]),
            Stmt::call(dispose),
        ]));
        assert_eq!(
            rendered.text,
            "local t = {[\"5\"] = 1, name = \"a\"}\na[\"Symbol.dispose\"](a)\n"
        );
    }

    #[test]
    fn test_binary_precedence() {
        let expr = Expr::binary(
            BinOp::Concat,
            Expr::binary(BinOp::Concat, Expr::name("a"), Expr::name("b")),
            Expr::binary(BinOp::Or, Expr::name("c"), Expr::name("d")),
        );
        let rendered = render(&chunk(vec![Stmt::local(
            ["x".to_string()],
            smallvec![expr],
        )]));
        assert_eq!(rendered.text, "local x = (a .. b) .. (c or d)\n");
    }
}
