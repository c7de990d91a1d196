//! Resolved types and the capability oracle.
//!
//! Disposal capability and call-site arity are decided from resolved type
//! information at lowering time, never by inspecting values at run time.

use std::collections::BTreeMap;

use crate::Identifier;

/// Resolved type of an expression, as far as lowering cares about it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Ty {
    #[default]
    Unknown,
    /// Nominal type (interface or class) such as `Disposable` or `Scoped`.
    Named(Identifier),
    /// `T | undefined`.
    Nullable(Box<Ty>),
    Promise(Box<Ty>),
    Array(Box<Ty>),
    /// Multi-value return with a fixed number of results.
    MultiReturn(Vec<Ty>),
    /// Multi-value return whose arity is only known at run time.
    VariadicReturn(Box<Ty>),
}

impl Ty {
    pub fn named(name: impl Into<Identifier>) -> Self {
        Ty::Named(name.into())
    }

    pub fn nullable(self) -> Self {
        Ty::Nullable(Box::new(self))
    }

    pub fn multi(n: usize) -> Self {
        Ty::MultiReturn(vec![Ty::Unknown; n])
    }
}

/// Number of values a `return` (or a call) produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnArity {
    Fixed(usize),
    Variadic,
}

impl ReturnArity {
    pub const SINGLE: ReturnArity = ReturnArity::Fixed(1);

    /// The wider of two arities; a variadic arity absorbs everything.
    pub fn join(self, other: ReturnArity) -> ReturnArity {
        match (self, other) {
            (ReturnArity::Fixed(a), ReturnArity::Fixed(b)) => ReturnArity::Fixed(a.max(b)),
            _ => ReturnArity::Variadic,
        }
    }

    /// Arity of `n` leading values followed by `self`.
    pub fn after(self, n: usize) -> ReturnArity {
        match self {
            ReturnArity::Fixed(k) => ReturnArity::Fixed(n + k),
            ReturnArity::Variadic => ReturnArity::Variadic,
        }
    }
}

impl Default for ReturnArity {
    fn default() -> Self {
        ReturnArity::Fixed(0)
    }
}

/// Which disposal methods a resource type exposes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DisposeCapability {
    pub sync: bool,
    pub asynchronous: bool,
}

impl DisposeCapability {
    pub const NONE: Self = Self {
        sync: false,
        asynchronous: false,
    };
    pub const SYNC: Self = Self {
        sync: true,
        asynchronous: false,
    };
    pub const ASYNC: Self = Self {
        sync: false,
        asynchronous: true,
    };
    pub const BOTH: Self = Self {
        sync: true,
        asynchronous: true,
    };

    pub fn is_disposable(&self) -> bool {
        self.sync || self.asynchronous
    }
}

/// Capability queries answered by the front end's type information.
pub trait TypeFacts {
    /// Disposal methods exposed by values of `ty`.
    fn dispose_capability(&self, ty: &Ty) -> DisposeCapability;

    /// Whether `ty` admits `undefined`, so disposal must be guarded.
    fn is_nullable(&self, ty: &Ty) -> bool {
        matches!(ty, Ty::Nullable(_))
    }

    /// Arity of a call whose result type is `ty`, if the call is multi-valued.
    fn call_arity(&self, ty: &Ty) -> Option<ReturnArity> {
        match ty {
            Ty::MultiReturn(values) => Some(ReturnArity::Fixed(values.len())),
            Ty::VariadicReturn(_) => Some(ReturnArity::Variadic),
            _ => None,
        }
    }
}

/// Table-driven [`TypeFacts`] implementation.
///
/// Nominal types are registered with the capability the type checker
/// resolved for them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeTable {
    capabilities: BTreeMap<Identifier, DisposeCapability>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with the standard library disposable interfaces.
    pub fn standard() -> Self {
        Self::new()
            .with_disposable("Disposable", DisposeCapability::SYNC)
            .with_disposable("AsyncDisposable", DisposeCapability::ASYNC)
    }

    pub fn with_disposable(
        mut self,
        name: impl Into<Identifier>,
        capability: DisposeCapability,
    ) -> Self {
        self.declare_disposable(name, capability);
        self
    }

    pub fn declare_disposable(&mut self, name: impl Into<Identifier>, capability: DisposeCapability) {
        self.capabilities.insert(name.into(), capability);
    }
}

impl TypeFacts for TypeTable {
    fn dispose_capability(&self, ty: &Ty) -> DisposeCapability {
        match ty {
            Ty::Named(name) => self
                .capabilities
                .get(name)
                .copied()
                .unwrap_or(DisposeCapability::NONE),
            Ty::Nullable(inner) => self.dispose_capability(inner),
            _ => DisposeCapability::NONE,
        }
    }
}
