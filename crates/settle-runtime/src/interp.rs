//! Tree-walking evaluator for the target tree.
//!
//! Evaluation is asynchronous so that an async body can suspend at
//! `__await`. Each body started by `__async` runs as a task: a boxed local
//! future the runtime polls by hand. A task that awaits a pending promise is
//! parked and its starter gets control back; once the promise settles the
//! task is resumed from the job queue. The chunk itself is the root task.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::future::{Future, poll_fn};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use settle_target::{BinOp, Block, Chunk, Expr, Stmt, StmtKind, TableField, UnOp};
use tracing::trace;

use crate::value::{Closure, Native, Promise};
use crate::{PromiseState, RuntimeError, SourceMapRegistry, Table, TableKey, Value, builtins};

pub(crate) type Env = Rc<Scope>;

/// A boxed evaluation step.
pub type Eval<'a, T> = LocalBoxFuture<'a, Result<T, RuntimeError>>;

type TaskId = u64;

/// Name of an open call frame; `None` for anonymous functions.
type Frame = Option<Rc<str>>;

/// One lexical scope; locals shadow outer bindings.
pub(crate) struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
}

impl Scope {
    fn root() -> Env {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    fn child(parent: &Env) -> Env {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    pub(crate) fn declare(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_owned(), value);
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    /// Assign to the nearest binding; returns false when the name is unbound.
    fn assign(&self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.vars.borrow_mut().get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }
}

enum Flow {
    Normal,
    Return(Vec<Value>),
}

/// An async body that has not finished yet.
struct Task {
    future: Eval<'static, Vec<Value>>,
    outcome: Outcome,
    /// Frames the task had open when it last suspended.
    frames: Vec<Frame>,
}

/// Where a finished task delivers its result.
enum Outcome {
    Promise(Promise),
    /// The chunk: its error reaches the host unconverted.
    Root(Rc<RefCell<Option<Result<Vec<Value>, RuntimeError>>>>),
}

enum Job {
    /// Run `callback` as a task that settles `promise`.
    Settle { callback: Value, promise: Promise },
    /// Continue a parked task whose awaited promise settled.
    Resume(TaskId),
}

struct State {
    globals: Env,
    jobs: RefCell<VecDeque<Job>>,
    parked: RefCell<HashMap<TaskId, Task>>,
    /// Parked tasks by the promise they wait on, in suspension order.
    waiters: RefCell<Vec<(Promise, TaskId)>>,
    next_task: Cell<TaskId>,
    /// Set by `__await` right before the running task suspends.
    suspended_on: RefCell<Option<Promise>>,
    frames: RefCell<Vec<Frame>>,
    log: RefCell<Vec<String>>,
    raw_traceback: RefCell<Option<String>>,
    registry: Arc<SourceMapRegistry>,
}

/// Shared handle to the evaluator state, passed to builtins.
#[derive(Clone)]
pub struct Runtime {
    state: Rc<State>,
}

/// Evaluator entry point: globals, the job queue and the recorded log.
pub struct Interpreter {
    rt: Runtime,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(SourceMapRegistry::new()))
    }

    /// Interpreter sharing an existing trace registry.
    pub fn with_registry(registry: Arc<SourceMapRegistry>) -> Self {
        let globals = Scope::root();
        builtins::install(&globals);
        let state = State {
            globals,
            jobs: RefCell::new(VecDeque::new()),
            parked: RefCell::new(HashMap::new()),
            waiters: RefCell::new(Vec::new()),
            next_task: Cell::new(0),
            suspended_on: RefCell::new(None),
            frames: RefCell::new(Vec::new()),
            log: RefCell::new(Vec::new()),
            raw_traceback: RefCell::new(None),
            registry,
        };
        Self {
            rt: Runtime {
                state: Rc::new(state),
            },
        }
    }

    pub fn registry(&self) -> &Arc<SourceMapRegistry> {
        &self.rt.state.registry
    }

    /// Host trace returned by `debug.traceback` before reconciliation. Without
    /// one, traces list the open call frames.
    pub fn set_raw_traceback(&mut self, trace: impl Into<String>) {
        *self.rt.state.raw_traceback.borrow_mut() = Some(trace.into());
    }

    pub fn log(&self) -> Vec<String> {
        self.rt.state.log.borrow().clone()
    }

    pub fn take_log(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.rt.state.log.borrow_mut())
    }

    pub fn global(&self, name: &str) -> Value {
        self.rt.global(name)
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.rt.state.globals.declare(name, value);
    }

    /// Run a chunk as the root task, then drain the job queue.
    pub fn run(&mut self, chunk: &Chunk) -> Result<Vec<Value>, RuntimeError> {
        let rt = self.rt.clone();
        let block = chunk.block.clone();
        self.rt.run_root(Box::pin(async move {
            let globals = rt.state.globals.clone();
            match rt.exec_block(&block, &globals).await? {
                Flow::Return(values) => Ok(values),
                Flow::Normal => Ok(Vec::new()),
            }
        }))
    }

    /// Call a function as the root task, then drain the job queue.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        let future = self.rt.call(callee.clone(), args);
        self.rt.run_root(future)
    }

    pub fn run_pending_jobs(&mut self) -> Result<(), RuntimeError> {
        self.rt.run_pending_jobs()
    }
}

impl Runtime {
    pub fn global(&self, name: &str) -> Value {
        self.state.globals.lookup(name).unwrap_or(Value::Nil)
    }

    pub(crate) fn registry(&self) -> &SourceMapRegistry {
        &self.state.registry
    }

    pub(crate) fn push_log(&self, entry: String) {
        trace!(%entry, "log");
        self.state.log.borrow_mut().push(entry);
    }

    /// The trace seen from `level` (1 is the function asking), reconciled
    /// against registered tables.
    pub(crate) fn traceback(&self, level: usize) -> String {
        let raw = self.state.raw_traceback.borrow().clone();
        let raw = raw.unwrap_or_else(|| self.frame_trace());
        self.state.registry.rewrite_traceback(&skip_levels(&raw, level))
    }

    fn frame_trace(&self) -> String {
        let mut trace = String::from("stack traceback:");
        for frame in self.state.frames.borrow().iter().rev() {
            match frame {
                Some(name) => {
                    let _ = write!(trace, "\n\tin function '{name}'");
                }
                None => trace.push_str("\n\tin function <anonymous>"),
            }
        }
        trace.push_str("\n\t[C]: in ?");
        trace
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    fn run_root(&self, future: Eval<'static, Vec<Value>>) -> Result<Vec<Value>, RuntimeError> {
        let slot = Rc::new(RefCell::new(None));
        self.poll_task(Task {
            future,
            outcome: Outcome::Root(slot.clone()),
            frames: Vec::new(),
        })?;
        self.run_pending_jobs()?;
        let result = slot.borrow_mut().take();
        result.unwrap_or(Err(RuntimeError::Deadlock))
    }

    /// Start an async body. It runs until it first suspends or finishes;
    /// the returned promise settles with its result.
    pub(crate) fn spawn(&self, future: Eval<'static, Vec<Value>>) -> Result<Promise, RuntimeError> {
        let promise = Rc::new(RefCell::new(PromiseState::Pending));
        self.poll_task(Task {
            future,
            outcome: Outcome::Promise(promise.clone()),
            frames: Vec::new(),
        })?;
        Ok(promise)
    }

    fn poll_task(&self, mut task: Task) -> Result<(), RuntimeError> {
        let base = self.state.frames.borrow().len();
        self.state.frames.borrow_mut().append(&mut task.frames);
        self.state.suspended_on.borrow_mut().take();

        let mut cx = Context::from_waker(noop_waker_ref());
        let poll = task.future.as_mut().poll(&mut cx);
        task.frames = self.state.frames.borrow_mut().split_off(base);

        match poll {
            Poll::Ready(result) => self.complete(task.outcome, result),
            Poll::Pending => {
                let awaited = self.state.suspended_on.borrow_mut().take();
                let Some(awaited) = awaited else {
                    return Err(RuntimeError::bad_argument(
                        "__await",
                        "task suspended without awaiting a promise",
                    ));
                };
                let id = self.state.next_task.get();
                self.state.next_task.set(id + 1);
                trace!(task = id, frames = task.frames.len(), "task suspended");
                self.state.waiters.borrow_mut().push((awaited, id));
                self.state.parked.borrow_mut().insert(id, task);
                Ok(())
            }
        }
    }

    fn complete(
        &self,
        outcome: Outcome,
        result: Result<Vec<Value>, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        match outcome {
            Outcome::Root(slot) => {
                *slot.borrow_mut() = Some(result);
            }
            Outcome::Promise(promise) => {
                let settled = match result {
                    Ok(values) => PromiseState::Resolved(values),
                    Err(error) => PromiseState::Rejected(error.into_caught_value()?),
                };
                self.settle(&promise, settled);
            }
        }
        Ok(())
    }

    /// Settle `promise` and queue every task waiting on it.
    fn settle(&self, promise: &Promise, state: PromiseState) {
        *promise.borrow_mut() = state;
        let waiters = std::mem::take(&mut *self.state.waiters.borrow_mut());
        let (ready, waiting): (Vec<_>, Vec<_>) = waiters
            .into_iter()
            .partition(|(awaited, _)| Rc::ptr_eq(awaited, promise));
        *self.state.waiters.borrow_mut() = waiting;
        let mut jobs = self.state.jobs.borrow_mut();
        for (_, id) in ready {
            jobs.push_back(Job::Resume(id));
        }
    }

    /// Wait for `promise`, suspending the running task while it is pending.
    pub(crate) async fn wait(&self, promise: Promise) -> Result<Vec<Value>, RuntimeError> {
        poll_fn(|_| {
            let state = promise.borrow().clone();
            match state {
                PromiseState::Resolved(values) => Poll::Ready(Ok(values)),
                PromiseState::Rejected(reason) => Poll::Ready(Err(RuntimeError::Thrown(reason))),
                PromiseState::Pending => {
                    *self.state.suspended_on.borrow_mut() = Some(promise.clone());
                    Poll::Pending
                }
            }
        })
        .await
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub(crate) fn enqueue(&self, callback: Value, promise: Promise) {
        self.state
            .jobs
            .borrow_mut()
            .push_back(Job::Settle { callback, promise });
    }

    /// Run one queued job; returns false when the queue is empty.
    pub(crate) fn run_next_job(&self) -> Result<bool, RuntimeError> {
        let job = self.state.jobs.borrow_mut().pop_front();
        let Some(job) = job else {
            return Ok(false);
        };
        match job {
            Job::Settle { callback, promise } => {
                trace!(remaining = self.state.jobs.borrow().len(), "running job");
                self.poll_task(Task {
                    future: self.call(callback, Vec::new()),
                    outcome: Outcome::Promise(promise),
                    frames: Vec::new(),
                })?;
            }
            Job::Resume(id) => {
                let task = self.state.parked.borrow_mut().remove(&id);
                if let Some(task) = task {
                    trace!(task = id, "task resumed");
                    self.poll_task(task)?;
                }
            }
        }
        Ok(true)
    }

    pub(crate) fn run_pending_jobs(&self) -> Result<(), RuntimeError> {
        while self.run_next_job()? {}
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub(crate) fn call(&self, callee: Value, args: Vec<Value>) -> Eval<'static, Vec<Value>> {
        let rt = self.clone();
        Box::pin(async move {
            match callee {
                Value::Closure(closure) => {
                    let scope = Scope::child(&closure.env);
                    let mut args = args.into_iter();
                    for param in &closure.function.params {
                        scope.declare(param, args.next().unwrap_or(Value::Nil));
                    }
                    rt.state.frames.borrow_mut().push(closure.name.clone());
                    let flow = rt.exec_stmts(&closure.function.body.stmts, &scope).await;
                    rt.state.frames.borrow_mut().pop();
                    match flow? {
                        Flow::Return(values) => Ok(values),
                        Flow::Normal => Ok(Vec::new()),
                    }
                }
                Value::Builtin(_, Native::Sync(function)) => function(&rt, args),
                Value::Builtin(_, Native::Async(function)) => function(rt.clone(), args).await,
                other => Err(RuntimeError::NotCallable(other.type_name())),
            }
        })
    }

    /// Protected call: `true, results..` on success, `false, thrown` on error.
    pub(crate) async fn call_protected(
        &self,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, RuntimeError> {
        match self.call(callee, args).await {
            Ok(values) => {
                let mut results = Vec::with_capacity(values.len() + 1);
                results.push(Value::Bool(true));
                results.extend(values);
                Ok(results)
            }
            Err(error) => Ok(vec![Value::Bool(false), error.into_caught_value()?]),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block<'a>(&'a self, block: &'a Block, env: &'a Env) -> Eval<'a, Flow> {
        Box::pin(async move {
            let scope = Scope::child(env);
            self.exec_stmts(&block.stmts, &scope).await
        })
    }

    fn exec_stmts<'a>(&'a self, stmts: &'a [Stmt], env: &'a Env) -> Eval<'a, Flow> {
        Box::pin(async move {
            for stmt in stmts {
                if let Flow::Return(values) = self.exec_stmt(stmt, env).await? {
                    return Ok(Flow::Return(values));
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, env: &'a Env) -> Eval<'a, Flow> {
        Box::pin(async move {
            match &stmt.kind {
                StmtKind::Local { names, values } => {
                    let values = self.eval_list(values, env).await?;
                    for (i, name) in names.iter().enumerate() {
                        env.declare(name, values.get(i).cloned().unwrap_or(Value::Nil));
                    }
                }
                StmtKind::LocalFunction { name, function } => {
                    let closure = Value::Closure(Rc::new(Closure {
                        function: function.clone(),
                        env: env.clone(),
                        name: Some(Rc::from(name.as_str())),
                    }));
                    env.declare(name, closure);
                }
                StmtKind::Assign { targets, values } => {
                    let values = self.eval_list(values, env).await?;
                    for (i, target) in targets.iter().enumerate() {
                        let value = values.get(i).cloned().unwrap_or(Value::Nil);
                        self.assign(target, value, env).await?;
                    }
                }
                StmtKind::Call(expr) => {
                    self.eval_multi(expr, env).await?;
                }
                StmtKind::Do(block) => return self.exec_block(block, env).await,
                StmtKind::If { clauses, otherwise } => {
                    for (cond, body) in clauses {
                        if self.eval(cond, env).await?.is_truthy() {
                            return self.exec_block(body, env).await;
                        }
                    }
                    if let Some(body) = otherwise {
                        return self.exec_block(body, env).await;
                    }
                }
                StmtKind::Return(values) => {
                    return Ok(Flow::Return(self.eval_list(values, env).await?));
                }
            }
            Ok(Flow::Normal)
        })
    }

    async fn assign(&self, target: &Expr, value: Value, env: &Env) -> Result<(), RuntimeError> {
        match target {
            Expr::Name(name) => {
                if !env.assign(name, value.clone()) {
                    self.state.globals.declare(name, value);
                }
                Ok(())
            }
            Expr::Index { object, key } => {
                let object = self.eval(object, env).await?;
                let key = self.eval(key, env).await?;
                set_index(&object, &key, value)
            }
            other => Err(RuntimeError::bad_argument(
                "assignment",
                format!("cannot assign to {other:?}"),
            )),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluate an expression list; only the last expression may expand.
    fn eval_list<'a>(&'a self, exprs: &'a [Expr], env: &'a Env) -> Eval<'a, Vec<Value>> {
        Box::pin(async move {
            let mut values = Vec::with_capacity(exprs.len());
            let last = exprs.len().saturating_sub(1);
            for (i, expr) in exprs.iter().enumerate() {
                if i == last {
                    values.extend(self.eval_multi(expr, env).await?);
                } else {
                    values.push(self.eval(expr, env).await?);
                }
            }
            Ok(values)
        })
    }

    fn eval<'a>(&'a self, expr: &'a Expr, env: &'a Env) -> Eval<'a, Value> {
        Box::pin(async move {
            match expr {
                Expr::Call { .. } | Expr::MethodCall { .. } => Ok(self
                    .eval_multi(expr, env)
                    .await?
                    .into_iter()
                    .next()
                    .unwrap_or(Value::Nil)),
                Expr::Nil => Ok(Value::Nil),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Int(n) => Ok(Value::Int(*n)),
                Expr::Str(s) => Ok(Value::str(s)),
                Expr::Name(name) => Ok(env.lookup(name).unwrap_or(Value::Nil)),
                Expr::Index { object, key } => {
                    let object = self.eval(object, env).await?;
                    let key = self.eval(key, env).await?;
                    get_index(&object, &key)
                }
                Expr::Function(function) => Ok(Value::Closure(Rc::new(Closure {
                    function: function.as_ref().clone(),
                    env: env.clone(),
                    name: None,
                }))),
                Expr::Table(fields) => self.eval_table(fields, env).await,
                Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, env).await,
                Expr::Unary { op, operand } => {
                    let value = self.eval(operand, env).await?;
                    match op {
                        UnOp::Not => Ok(Value::Bool(!value.is_truthy())),
                        UnOp::Neg => match value {
                            Value::Int(n) => Ok(Value::Int(-n)),
                            other => Err(RuntimeError::bad_argument(
                                "-",
                                format!("number expected, got {}", other.type_name()),
                            )),
                        },
                    }
                }
            }
        })
    }

    fn eval_multi<'a>(&'a self, expr: &'a Expr, env: &'a Env) -> Eval<'a, Vec<Value>> {
        Box::pin(async move {
            match expr {
                Expr::Call { callee, args } => {
                    let callee = self.eval(callee, env).await?;
                    let args = self.eval_list(args, env).await?;
                    self.call(callee, args).await
                }
                Expr::MethodCall {
                    receiver,
                    method,
                    args,
                } => {
                    let receiver = self.eval(receiver, env).await?;
                    let callee = get_index(&receiver, &Value::str(method))?;
                    let mut all = vec![receiver];
                    all.extend(self.eval_list(args, env).await?);
                    self.call(callee, all).await
                }
                other => Ok(vec![self.eval(other, env).await?]),
            }
        })
    }

    async fn eval_table(&self, fields: &[TableField], env: &Env) -> Result<Value, RuntimeError> {
        let mut table = Table::new();
        let mut next = 1;
        let last = fields.len().saturating_sub(1);
        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(expr) => {
                    let values = if i == last {
                        self.eval_multi(expr, env).await?
                    } else {
                        vec![self.eval(expr, env).await?]
                    };
                    for value in values {
                        table.set(TableKey::Int(next), value);
                        next += 1;
                    }
                }
                TableField::Keyed(key, expr) => {
                    let value = self.eval(expr, env).await?;
                    table.set_field(key, value);
                }
            }
        }
        Ok(Value::table(table))
    }

    async fn eval_binary(
        &self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        let left = self.eval(lhs, env).await?;
        if matches!(op, BinOp::And | BinOp::Or) {
            let short_circuit = (op == BinOp::And) != left.is_truthy();
            return if short_circuit {
                Ok(left)
            } else {
                self.eval(rhs, env).await
            };
        }
        let right = self.eval(rhs, env).await?;
        binary(op, left, right)
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::NotEq => Ok(Value::Bool(left != right)),
        BinOp::Add | BinOp::Sub | BinOp::Lt => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(match op {
                BinOp::Add => Value::Int(a + b),
                BinOp::Sub => Value::Int(a - b),
                _ => Value::Bool(a < b),
            }),
            (Value::Str(a), Value::Str(b)) if op == BinOp::Lt => Ok(Value::Bool(a < b)),
            _ => Err(RuntimeError::bad_argument(
                "arithmetic",
                format!(
                    "cannot apply {op:?} to {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
            )),
        },
        BinOp::Concat => match (&left, &right) {
            (Value::Str(_) | Value::Int(_), Value::Str(_) | Value::Int(_)) => {
                Ok(Value::str(&format!("{left}{right}")))
            }
            _ => Err(RuntimeError::bad_argument(
                "..",
                format!(
                    "attempt to concatenate a {} value",
                    if matches!(left, Value::Str(_) | Value::Int(_)) {
                        right.type_name()
                    } else {
                        left.type_name()
                    }
                ),
            )),
        },
        BinOp::And | BinOp::Or => Ok(right),
    }
}

/// Drop the frames below `level`; the header line is kept.
fn skip_levels(trace: &str, level: usize) -> String {
    let mut lines = trace.lines();
    let header = lines.next().unwrap_or_default();
    std::iter::once(header)
        .chain(lines.skip(level.saturating_sub(1)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn get_index(object: &Value, key: &Value) -> Result<Value, RuntimeError> {
    match object {
        Value::Table(table) => Ok(key
            .to_key()
            .map(|key| table.borrow().get(&key))
            .unwrap_or(Value::Nil)),
        other => Err(RuntimeError::NotIndexable(other.type_name())),
    }
}

fn set_index(object: &Value, key: &Value, value: Value) -> Result<(), RuntimeError> {
    let Value::Table(table) = object else {
        return Err(RuntimeError::NotIndexable(object.type_name()));
    };
    let Some(key) = key.to_key() else {
        return Err(RuntimeError::bad_argument(
            "index",
            format!("invalid table key of type {}", key.type_name()),
        ));
    };
    table.borrow_mut().set(key, value);
    Ok(())
}
