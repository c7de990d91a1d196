use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use settle_target::Function;

use crate::RuntimeError;
use crate::interp::{Env, Eval, Runtime};

/// A builtin implemented by the host.
#[derive(Clone, Copy)]
pub enum Native {
    /// Runs to completion before returning.
    Sync(fn(&Runtime, Vec<Value>) -> Result<Vec<Value>, RuntimeError>),
    /// May suspend the task that calls it.
    Async(fn(Runtime, Vec<Value>) -> Eval<'static, Vec<Value>>),
}

pub type Promise = Rc<RefCell<PromiseState>>;

/// A runtime value.
///
/// Tables, closures and promises are reference values: cloning shares the
/// underlying object and equality is identity.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Table(Rc<RefCell<Table>>),
    Closure(Rc<Closure>),
    Builtin(&'static str, Native),
    Promise(Promise),
}

pub struct Closure {
    pub(crate) function: Function,
    pub(crate) env: Env,
    /// Declared name, shown in stack traces.
    pub(crate) name: Option<Rc<str>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TableKey {
    Int(i64),
    Str(Rc<str>),
    Bool(bool),
}

#[derive(Default)]
pub struct Table {
    entries: HashMap<TableKey, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PromiseState {
    Pending,
    Resolved(Vec<Value>),
    Rejected(Value),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn table(table: Table) -> Self {
        Value::Table(Rc::new(RefCell::new(table)))
    }

    pub fn pending_promise() -> Self {
        Value::Promise(Rc::new(RefCell::new(PromiseState::Pending)))
    }

    pub(crate) fn sync_builtin(
        name: &'static str,
        function: fn(&Runtime, Vec<Value>) -> Result<Vec<Value>, RuntimeError>,
    ) -> Self {
        Value::Builtin(name, Native::Sync(function))
    }

    pub(crate) fn async_builtin(
        name: &'static str,
        function: fn(Runtime, Vec<Value>) -> Eval<'static, Vec<Value>>,
    ) -> Self {
        Value::Builtin(name, Native::Async(function))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(..))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Closure(_) | Value::Builtin(..) => "function",
            Value::Promise(_) => "promise",
        }
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Key used to index a table with this value.
    pub fn to_key(&self) -> Option<TableKey> {
        match self {
            Value::Int(n) => Some(TableKey::Int(*n)),
            Value::Str(s) => Some(TableKey::Str(s.clone())),
            Value::Bool(b) => Some(TableKey::Bool(*b)),
            _ => None,
        }
    }

    /// Field lookup on a table value; non-tables yield `None`.
    pub fn get_field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Table(table) => Some(table.borrow().get(&TableKey::Str(Rc::from(name)))),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a, _), Value::Builtin(b, _)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Closure(c) => write!(f, "function: {:p}", Rc::as_ptr(c)),
            Value::Builtin(name, _) => write!(f, "function: builtin: {name}"),
            Value::Promise(p) => write!(f, "promise: {:p}", Rc::as_ptr(p)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => fmt::Display::fmt(other, f),
        }
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence table `{v1, v2, ..}`.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Self::new();
        for (i, value) in values.into_iter().enumerate() {
            table.set(TableKey::Int(i as i64 + 1), value);
        }
        table
    }

    pub fn get(&self, key: &TableKey) -> Value {
        self.entries.get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, key: TableKey, value: Value) {
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.set(TableKey::Str(Rc::from(name)), value);
    }

    /// Border of the sequence part: the first `n` with `t[n + 1] == nil`.
    pub fn len(&self) -> i64 {
        let mut n = 0;
        while self.entries.contains_key(&TableKey::Int(n + 1)) {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&TableKey, &Value)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_compare_by_identity() {
        let a = Value::table(Table::new());
        let b = Value::table(Table::new());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_nil_assignment_removes_entry() {
        let mut table = Table::from_values([Value::Int(1), Value::Int(2)]);
        assert_eq!(table.len(), 2);
        table.set(TableKey::Int(2), Value::Nil);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
    }
}
