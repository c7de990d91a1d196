//! Typed source tree consumed by the lowering engine.
//!
//! The tree is produced by the front end after type resolution. Every
//! expression carries its resolved [`Ty`]; spans live in the program's
//! [`SpanMap`] and are looked up by [`NodeId`].

use crate::{Identifier, NodeId, SpanMap, Ty};

// ============================================================================
// Program and statements
// ============================================================================

/// A compiled unit: the module body plus its span table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub id: NodeId,
    pub body: Block,
    pub spans: SpanMap,
}

/// A lexical block. Disposable scopes are keyed by the block id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StmtKind {
    /// `let x = e` / `const [a, b] = e`.
    Let {
        pattern: Pattern,
        init: Option<Expr>,
    },
    /// `x = e`, where the target is a variable or member.
    Assign { target: Expr, value: Expr },
    Expr(Expr),
    Return(Option<Expr>),
    /// `throw e`; `None` for a bare rethrow-less throw.
    Throw(Option<Expr>),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    Block(Block),
    Try(TryStmt),
    Using(UsingDecl),
    Function(FunctionDecl),
}

/// Binding target of a `let`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Binding(Identifier),
    /// Array destructuring `[a, b]`.
    Tuple(Vec<Identifier>),
}

/// `try { body } catch (binding) { .. } finally { .. }`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryStmt {
    pub body: Block,
    pub catch: Option<CatchClause>,
    pub finally: Option<Block>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchClause {
    pub id: NodeId,
    /// `None` for `catch { .. }` without a variable.
    pub binding: Option<Identifier>,
    pub body: Block,
}

/// `using a = .., b = ..` or `await using ..`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsingDecl {
    pub is_await: bool,
    pub bindings: Vec<UsingBinding>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsingBinding {
    pub id: NodeId,
    pub name: Identifier,
    pub init: Expr,
}

/// Function declaration or function expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDecl {
    pub id: NodeId,
    pub name: Option<Identifier>,
    pub params: Vec<Identifier>,
    pub body: Block,
    pub is_async: bool,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub ty: Ty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Literal(Literal),
    Var(Identifier),
    /// `this` inside an object method.
    This,
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `receiver.method(args)`, passing the receiver as `this`.
    MethodCall {
        receiver: Box<Expr>,
        method: PropertyKey,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: PropertyKey,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `$multi(a, b, ..)`: a multi-valued result.
    Multi(Vec<Expr>),
    Function(Box<FunctionDecl>),
    Await(Box<Expr>),
    Object(Vec<ObjectMember>),
    Array(Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Undefined,
    Bool(bool),
    Int(i64),
    Str(String),
}

/// Property name, including the well-known disposal symbols.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Named(Identifier),
    /// `[Symbol.dispose]`
    Dispose,
    /// `[Symbol.asyncDispose]`
    AsyncDispose,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectMember {
    Property { key: PropertyKey, value: Expr },
    /// Method shorthand; `this` refers to the object.
    Method {
        key: PropertyKey,
        function: FunctionDecl,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    /// String concatenation, as decided by the type checker for `+`.
    Concat,
    Eq,
    NotEq,
    Lt,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl Expr {
    /// Attach a resolved type.
    pub fn with_ty(mut self, ty: Ty) -> Self {
        self.ty = ty;
        self
    }
}

impl Block {
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}
