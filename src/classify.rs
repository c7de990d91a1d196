//! Control-flow classification.
//!
//! A single walk over the typed tree records, in side tables keyed by
//! [`NodeId`], everything the lowering engines need to know up front:
//!
//! - every `try` region and whether it catches, binds and finalizes
//! - every block holding `using` declarations, with its bindings in order
//! - per function: async-ness, maximum return arity, region counts
//! - which call sites produce more than one value
//!
//! Misuse the front end should have rejected is reported as a
//! [`Diagnostic`] tied to the offending node. Malformed trees abort with a
//! [`LoweringError`].

use std::collections::{BTreeSet, HashMap};

use settle_ast::{
    Block, DisposeCapability, Expr, ExprKind, FunctionDecl, Identifier, NodeId, ObjectMember,
    Pattern, Program, ReturnArity, SpanMap, Stmt, StmtKind, TryStmt, TypeFacts, UsingDecl,
};
use settle_core::{CompilationPhase, Diagnostic};
use tracing::{debug, trace};

use crate::errors::{LoweringError, LoweringResult};

// ============================================================================
// Side tables
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionInfo {
    pub has_catch: bool,
    /// The catch clause names its thrown value.
    pub binds_catch: bool,
    pub has_finally: bool,
    /// Number of enclosing regions within the same function.
    pub depth: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisposableBinding {
    pub name: Identifier,
    /// Initializer expression.
    pub init: NodeId,
    pub is_async: bool,
    /// Position among the bindings of the enclosing block, from 0.
    pub declaration_order: usize,
    pub capability: DisposeCapability,
    pub nullable: bool,
}

/// Disposable bindings sharing one lexical block, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisposableScope {
    pub block: NodeId,
    pub bindings: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FunctionInfo {
    pub is_async: bool,
    /// Widest `return` in the function body.
    pub return_arity: ReturnArity,
    /// Some `return` produces several values.
    pub returns_multi: bool,
    pub region_count: usize,
    pub disposable_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    module: NodeId,
    regions: HashMap<NodeId, RegionInfo>,
    scopes: HashMap<NodeId, DisposableScope>,
    bindings: HashMap<NodeId, DisposableBinding>,
    functions: HashMap<NodeId, FunctionInfo>,
    multi_return_functions: BTreeSet<Identifier>,
    multi_valued_calls: HashMap<NodeId, ReturnArity>,
}

impl Classification {
    fn new(module: NodeId) -> Self {
        Self {
            module,
            regions: HashMap::new(),
            scopes: HashMap::new(),
            bindings: HashMap::new(),
            functions: HashMap::new(),
            multi_return_functions: BTreeSet::new(),
            multi_valued_calls: HashMap::new(),
        }
    }

    /// Id of the module frame; its record lives with the functions.
    pub fn module(&self) -> NodeId {
        self.module
    }

    pub fn region(&self, id: NodeId) -> Option<&RegionInfo> {
        self.regions.get(&id)
    }

    pub fn scope(&self, block: NodeId) -> Option<&DisposableScope> {
        self.scopes.get(&block)
    }

    pub fn binding(&self, id: NodeId) -> Option<&DisposableBinding> {
        self.bindings.get(&id)
    }

    pub fn function(&self, id: NodeId) -> Option<&FunctionInfo> {
        self.functions.get(&id)
    }

    pub fn multi_return_functions(&self) -> impl Iterator<Item = &str> {
        self.multi_return_functions.iter().map(String::as_str)
    }

    /// Arity of a call expression that produces several values.
    pub fn multi_valued_call(&self, call: NodeId) -> Option<ReturnArity> {
        self.multi_valued_calls.get(&call).copied()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn disposable_count(&self) -> usize {
        self.bindings.len()
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Classify a program, returning the side tables and any diagnostics.
pub fn classify_program(
    program: &Program,
    facts: &dyn TypeFacts,
) -> LoweringResult<(Classification, Vec<Diagnostic>)> {
    let mut classifier = Classifier {
        facts,
        spans: &program.spans,
        declared_arity: declared_multi_returns(&program.body, facts),
        classification: Classification::new(program.id),
        diagnostics: Vec::new(),
        frames: Vec::new(),
        lexical: Vec::new(),
    };

    // Top-level await is allowed, so the module frame counts as async.
    classifier.enter_function(program.id, true);
    classifier.walk_block(&program.body)?;
    classifier.exit_function(None);

    let Classifier {
        classification,
        diagnostics,
        ..
    } = classifier;
    debug!(
        regions = classification.region_count(),
        disposables = classification.disposable_count(),
        multi_return = classification.multi_return_functions.len(),
        diagnostics = diagnostics.len(),
        "classified program"
    );
    Ok((classification, diagnostics))
}

struct Frame {
    id: NodeId,
    info: FunctionInfo,
    region_depth: usize,
}

/// Names bound by one lexical scope. A name bound to a function
/// declaration that returns `$multi(..)` carries its arity.
type LexicalScope = HashMap<Identifier, Option<ReturnArity>>;

struct Classifier<'a> {
    facts: &'a dyn TypeFacts,
    spans: &'a SpanMap,
    /// Arity of function declarations that return `$multi(..)` directly.
    declared_arity: HashMap<NodeId, ReturnArity>,
    classification: Classification,
    diagnostics: Vec<Diagnostic>,
    frames: Vec<Frame>,
    lexical: Vec<LexicalScope>,
}

impl<'a> Classifier<'a> {
    fn enter_function(&mut self, id: NodeId, is_async: bool) {
        self.frames.push(Frame {
            id,
            info: FunctionInfo {
                is_async,
                ..FunctionInfo::default()
            },
            region_depth: 0,
        });
    }

    fn exit_function(&mut self, name: Option<&Identifier>) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        trace!(function = %frame.id, info = ?frame.info, "classified function");
        if frame.info.returns_multi
            && let Some(name) = name
        {
            self.classification
                .multi_return_functions
                .insert(name.clone());
        }
        self.classification.functions.insert(frame.id, frame.info);
    }

    fn frame(&mut self) -> LoweringResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| LoweringError::invariant(self.classification.module, "no function frame"))
    }

    fn in_async(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.info.is_async)
    }

    fn error(&mut self, node: NodeId, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(
            CompilationPhase::Classification,
            self.spans.get_or_default(node),
            message,
        ));
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn walk_block(&mut self, block: &Block) -> LoweringResult<()> {
        let scope = self.hoist(block);
        self.lexical.push(scope);
        let walked = block.stmts.iter().try_for_each(|stmt| {
            if let StmtKind::Using(decl) = &stmt.kind {
                self.record_using(block.id, stmt.id, decl)?;
            }
            self.walk_stmt(stmt)
        });
        self.lexical.pop();
        walked
    }

    /// Every name a block binds, visible from its first statement on.
    fn hoist(&self, block: &Block) -> LexicalScope {
        let mut scope = LexicalScope::new();
        for stmt in &block.stmts {
            match &stmt.kind {
                StmtKind::Function(function) => {
                    if let Some(name) = &function.name {
                        scope.insert(name.clone(), self.declared_arity.get(&function.id).copied());
                    }
                }
                StmtKind::Let { pattern, .. } => match pattern {
                    Pattern::Binding(name) => {
                        scope.insert(name.clone(), None);
                    }
                    Pattern::Tuple(names) => {
                        scope.extend(names.iter().map(|name| (name.clone(), None)));
                    }
                },
                StmtKind::Using(decl) => {
                    scope.extend(decl.bindings.iter().map(|binding| (binding.name.clone(), None)));
                }
                _ => {}
            }
        }
        scope
    }

    /// Run `walk` with `names` bound to plain values.
    fn with_bindings<'n>(
        &mut self,
        names: impl IntoIterator<Item = &'n Identifier>,
        walk: impl FnOnce(&mut Self) -> LoweringResult<()>,
    ) -> LoweringResult<()> {
        self.lexical
            .push(names.into_iter().map(|name| (name.clone(), None)).collect());
        let walked = walk(self);
        self.lexical.pop();
        walked
    }

    /// Arity recorded for the innermost binding of `name`, if it names a
    /// multi-return function declaration.
    fn resolve_arity(&self, name: &str) -> Option<ReturnArity> {
        self.lexical
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
            .flatten()
    }

    fn walk_stmt(&mut self, stmt: &Stmt) -> LoweringResult<()> {
        match &stmt.kind {
            StmtKind::Let { pattern, init } => match (pattern, init) {
                (Pattern::Tuple(_), Some(init)) => self.walk_multi_position(init),
                (_, Some(init)) => self.walk_expr(init),
                (_, None) => Ok(()),
            },
            StmtKind::Assign { target, value } => {
                self.walk_expr(target)?;
                self.walk_expr(value)
            }
            StmtKind::Expr(expr) => self.walk_expr(expr),
            StmtKind::Return(value) => {
                let arity = match value {
                    None => ReturnArity::Fixed(0),
                    Some(value) => {
                        self.walk_multi_position(value)?;
                        self.value_arity(value)
                    }
                };
                let frame = self.frame()?;
                frame.info.return_arity = frame.info.return_arity.join(arity);
                if arity != ReturnArity::SINGLE && arity != ReturnArity::Fixed(0) {
                    frame.info.returns_multi = true;
                }
                Ok(())
            }
            StmtKind::Throw(value) => match value {
                Some(value) => self.walk_expr(value),
                None => Ok(()),
            },
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.walk_expr(cond)?;
                self.walk_block(then_block)?;
                match else_block {
                    Some(block) => self.walk_block(block),
                    None => Ok(()),
                }
            }
            StmtKind::Block(block) => self.walk_block(block),
            StmtKind::Try(region) => self.walk_try(stmt.id, region),
            StmtKind::Using(decl) => {
                for binding in &decl.bindings {
                    self.walk_expr(&binding.init)?;
                }
                Ok(())
            }
            StmtKind::Function(function) => self.walk_function(function, false),
        }
    }

    fn walk_try(&mut self, id: NodeId, region: &TryStmt) -> LoweringResult<()> {
        if region.catch.is_none() && region.finally.is_none() {
            return Err(LoweringError::invariant(
                id,
                "try statement without catch or finally",
            ));
        }
        let frame = self.frame()?;
        let info = RegionInfo {
            has_catch: region.catch.is_some(),
            binds_catch: region
                .catch
                .as_ref()
                .is_some_and(|catch| catch.binding.is_some()),
            has_finally: region.finally.is_some(),
            depth: frame.region_depth,
        };
        frame.info.region_count += 1;
        frame.region_depth += 1;
        trace!(region = %id, ?info, "classified region");
        self.classification.regions.insert(id, info);

        self.walk_block(&region.body)?;
        if let Some(catch) = &region.catch {
            self.with_bindings(&catch.binding, |this| this.walk_block(&catch.body))?;
        }
        if let Some(finally) = &region.finally {
            self.walk_block(finally)?;
        }
        self.frame()?.region_depth -= 1;
        Ok(())
    }

    fn record_using(&mut self, block: NodeId, stmt: NodeId, decl: &UsingDecl) -> LoweringResult<()> {
        if decl.bindings.is_empty() {
            return Err(LoweringError::invariant(stmt, "using declaration without bindings"));
        }
        if decl.is_await && !self.in_async() {
            self.error(stmt, "`await using` is only allowed inside async functions");
        }
        for binding in &decl.bindings {
            let capability = self.facts.dispose_capability(&binding.init.ty);
            if !capability.is_disposable() {
                self.error(
                    binding.init.id,
                    format!(
                        "`{}` is not disposable: its type has no `[Symbol.dispose]` method",
                        binding.name
                    ),
                );
            } else if !decl.is_await && !capability.sync {
                self.error(
                    binding.init.id,
                    format!(
                        "`{}` only supports async disposal; declare it with `await using`",
                        binding.name
                    ),
                );
            }
            let scope = self
                .classification
                .scopes
                .entry(block)
                .or_insert_with(|| DisposableScope {
                    block,
                    bindings: Vec::new(),
                });
            let record = DisposableBinding {
                name: binding.name.clone(),
                init: binding.init.id,
                is_async: decl.is_await,
                declaration_order: scope.bindings.len(),
                capability,
                nullable: self.facts.is_nullable(&binding.init.ty),
            };
            scope.bindings.push(binding.id);
            trace!(binding = %binding.id, ?record, "classified disposable");
            self.classification.bindings.insert(binding.id, record);
            self.frame()?.info.disposable_count += 1;
        }
        Ok(())
    }

    fn walk_function(&mut self, function: &FunctionDecl, is_method: bool) -> LoweringResult<()> {
        self.enter_function(function.id, function.is_async);
        self.with_bindings(&function.params, |this| this.walk_block(&function.body))?;
        // Methods are reached through a receiver, never by bare name.
        let name = if is_method { None } else { function.name.as_ref() };
        self.exit_function(name);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// `return` values and destructuring initializers may be `$multi(..)`.
    fn walk_multi_position(&mut self, expr: &Expr) -> LoweringResult<()> {
        match &expr.kind {
            ExprKind::Multi(values) => values.iter().try_for_each(|v| self.walk_expr(v)),
            _ => self.walk_expr(expr),
        }
    }

    fn walk_expr(&mut self, expr: &Expr) -> LoweringResult<()> {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Var(_) | ExprKind::This => Ok(()),
            ExprKind::Call { callee, args } => {
                self.record_call(expr);
                self.walk_expr(callee)?;
                args.iter().try_for_each(|arg| self.walk_expr(arg))
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.record_call(expr);
                self.walk_expr(receiver)?;
                args.iter().try_for_each(|arg| self.walk_expr(arg))
            }
            ExprKind::Member { object, .. } => self.walk_expr(object),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs)?;
                self.walk_expr(rhs)
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand),
            ExprKind::Multi(values) => {
                self.error(
                    expr.id,
                    "`$multi` can only be used in a return statement or a destructuring declaration",
                );
                values.iter().try_for_each(|v| self.walk_expr(v))
            }
            ExprKind::Function(function) => self.walk_function(function, false),
            ExprKind::Await(operand) => {
                if !self.in_async() {
                    self.error(expr.id, "`await` is only allowed inside async functions");
                }
                self.walk_expr(operand)
            }
            ExprKind::Object(members) => {
                for member in members {
                    match member {
                        ObjectMember::Property { value, .. } => self.walk_expr(value)?,
                        ObjectMember::Method { function, .. } => {
                            self.walk_function(function, true)?
                        }
                    }
                }
                Ok(())
            }
            ExprKind::Array(elements) => elements.iter().try_for_each(|e| self.walk_expr(e)),
        }
    }

    fn record_call(&mut self, call: &Expr) {
        if let Some(arity) = self.call_arity(call) {
            self.classification.multi_valued_calls.insert(call.id, arity);
        }
    }

    /// Multi-valued arity of a call: from its resolved type, or from the
    /// function declaration a bare callee name resolves to.
    fn call_arity(&self, call: &Expr) -> Option<ReturnArity> {
        if let Some(arity) = self.facts.call_arity(&call.ty) {
            return Some(arity);
        }
        match &call.kind {
            ExprKind::Call { callee, .. } => match &callee.kind {
                ExprKind::Var(name) => self.resolve_arity(name),
                _ => None,
            },
            _ => None,
        }
    }

    fn value_arity(&self, value: &Expr) -> ReturnArity {
        match &value.kind {
            ExprKind::Multi(values) => multi_arity(values, |call| {
                self.classification.multi_valued_call(call.id)
            }),
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => self
                .classification
                .multi_valued_call(value.id)
                .unwrap_or(ReturnArity::SINGLE),
            _ => ReturnArity::SINGLE,
        }
    }
}

/// Arity of `$multi(values..)`; a trailing multi-valued call expands.
fn multi_arity(values: &[Expr], call: impl Fn(&Expr) -> Option<ReturnArity>) -> ReturnArity {
    match values.split_last() {
        Some((last, leading)) => call(last)
            .unwrap_or(ReturnArity::SINGLE)
            .after(leading.len()),
        None => ReturnArity::Fixed(0),
    }
}

// ============================================================================
// Declared multi-return functions
// ============================================================================

/// Pre-pass over named function declarations, so call sites that precede a
/// declaration, or carry no resolved type, still see its arity. Keyed by
/// declaration; call sites reach it through lexical resolution.
fn declared_multi_returns(body: &Block, facts: &dyn TypeFacts) -> HashMap<NodeId, ReturnArity> {
    let mut declared = HashMap::new();
    collect_declarations(body, facts, &mut declared);
    declared
}

fn collect_declarations(
    block: &Block,
    facts: &dyn TypeFacts,
    declared: &mut HashMap<NodeId, ReturnArity>,
) {
    for stmt in &block.stmts {
        match &stmt.kind {
            StmtKind::Function(function) => {
                if function.name.is_some() {
                    let mut arity = None;
                    direct_multi_returns(&function.body, facts, &mut arity);
                    if let Some(arity) = arity {
                        declared.insert(function.id, arity);
                    }
                }
                collect_declarations(&function.body, facts, declared);
            }
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                collect_declarations(then_block, facts, declared);
                if let Some(block) = else_block {
                    collect_declarations(block, facts, declared);
                }
            }
            StmtKind::Block(block) => collect_declarations(block, facts, declared),
            StmtKind::Try(region) => {
                collect_declarations(&region.body, facts, declared);
                if let Some(catch) = &region.catch {
                    collect_declarations(&catch.body, facts, declared);
                }
                if let Some(finally) = &region.finally {
                    collect_declarations(finally, facts, declared);
                }
            }
            _ => {}
        }
    }
}

/// Join of the `return $multi(..)` arities in one function body, not
/// descending into nested functions.
fn direct_multi_returns(block: &Block, facts: &dyn TypeFacts, arity: &mut Option<ReturnArity>) {
    for stmt in &block.stmts {
        match &stmt.kind {
            StmtKind::Return(Some(value)) => match &value.kind {
                ExprKind::Multi(values) => join_into(
                    arity,
                    multi_arity(values, |call| facts.call_arity(&call.ty)),
                ),
                _ => {
                    if let Some(found) = facts.call_arity(&value.ty) {
                        join_into(arity, found)
                    }
                }
            },
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                direct_multi_returns(then_block, facts, arity);
                if let Some(block) = else_block {
                    direct_multi_returns(block, facts, arity);
                }
            }
            StmtKind::Block(block) => direct_multi_returns(block, facts, arity),
            StmtKind::Try(region) => {
                direct_multi_returns(&region.body, facts, arity);
                if let Some(catch) = &region.catch {
                    direct_multi_returns(&catch.body, facts, arity);
                }
                if let Some(finally) = &region.finally {
                    direct_multi_returns(finally, facts, arity);
                }
            }
            _ => {}
        }
    }
}

fn join_into(arity: &mut Option<ReturnArity>, found: ReturnArity) {
    *arity = Some(arity.map_or(found, |a| a.join(found)));
}
