//! Target tree nodes.

use settle_core::Span;
use smallvec::SmallVec;

pub type Identifier = String;

/// Right-hand sides and return lists; most carry one or two values.
pub type ExprList = SmallVec<[Expr; 2]>;
pub type NameList = SmallVec<[Identifier; 2]>;

/// A compiled unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chunk {
    pub block: Block,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

/// A statement with the source span it was lowered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub origin: Option<Span>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StmtKind {
    Local { names: NameList, values: ExprList },
    LocalFunction { name: Identifier, function: Function },
    Assign { targets: ExprList, values: ExprList },
    /// Call used as a statement.
    Call(Expr),
    Do(Block),
    If {
        clauses: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    Return(ExprList),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Name(Identifier),
    Index {
        object: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `receiver:method(args)`
    MethodCall {
        receiver: Box<Expr>,
        method: Identifier,
        args: Vec<Expr>,
    },
    Function(Box<Function>),
    Table(Vec<TableField>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Function {
    pub params: Vec<Identifier>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableField {
    Positional(Expr),
    /// `key = value` or `["key"] = value`.
    Keyed(String, Expr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Concat,
    Eq,
    NotEq,
    Lt,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
    Neg,
}

// ============================================================================
// Construction helpers
// ============================================================================

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, origin: None }
    }

    pub fn with_origin(mut self, origin: Option<Span>) -> Self {
        self.origin = origin;
        self
    }

    pub fn local(names: impl IntoIterator<Item = Identifier>, values: ExprList) -> Self {
        Self::new(StmtKind::Local {
            names: names.into_iter().collect(),
            values,
        })
    }

    pub fn assign(targets: ExprList, values: ExprList) -> Self {
        Self::new(StmtKind::Assign { targets, values })
    }

    pub fn call(expr: Expr) -> Self {
        Self::new(StmtKind::Call(expr))
    }

    pub fn ret(values: ExprList) -> Self {
        Self::new(StmtKind::Return(values))
    }

    pub fn do_block(block: Block) -> Self {
        Self::new(StmtKind::Do(block))
    }

    pub fn if_then(cond: Expr, then_block: Block) -> Self {
        Self::new(StmtKind::If {
            clauses: vec![(cond, then_block)],
            otherwise: None,
        })
    }
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }

    /// Whether control can fall off the end of this block.
    pub fn ends_with_return(&self) -> bool {
        matches!(
            self.stmts.last().map(|s| &s.kind),
            Some(StmtKind::Return(_))
        )
    }
}

impl From<Vec<Stmt>> for Block {
    fn from(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

impl Expr {
    pub fn name(name: impl Into<Identifier>) -> Self {
        Expr::Name(name.into())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    /// `object.field`, for a plain identifier field.
    pub fn field(object: Expr, field: &str) -> Self {
        Expr::Index {
            object: Box::new(object),
            key: Box::new(Expr::str(field)),
        }
    }

    pub fn index(object: Expr, key: Expr) -> Self {
        Expr::Index {
            object: Box::new(object),
            key: Box::new(key),
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn call_named(name: &str, args: Vec<Expr>) -> Self {
        Expr::call(Expr::name(name), args)
    }

    pub fn function(params: Vec<Identifier>, body: Block) -> Self {
        Expr::Function(Box::new(Function { params, body }))
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Unary {
            op: UnOp::Not,
            operand: Box::new(operand),
        }
    }

    /// Whether evaluating this expression may produce more than one value.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Expr::Call { .. } | Expr::MethodCall { .. })
    }
}
