//! Lowering context.
//!
//! Tracks the function frame being lowered: how many protected closures
//! the current statement sits inside, and how many result slots its
//! regions carry.

use settle_ast::{NodeId, ReturnArity, SpanMap};
use settle_core::Span;

use crate::classify::{Classification, FunctionInfo};
use crate::errors::{LoweringError, LoweringResult};

/// Storage for the values a protected call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultSlots {
    /// One local per statically known return value.
    Fixed(usize),
    /// Return arity only known at run time; the whole result list is packed.
    Packed,
}

impl From<ReturnArity> for ResultSlots {
    fn from(arity: ReturnArity) -> Self {
        match arity {
            ReturnArity::Fixed(n) => ResultSlots::Fixed(n),
            ReturnArity::Variadic => ResultSlots::Packed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionFrame {
    pub id: NodeId,
    /// Protected closures between the current statement and the frame.
    pub protected_depth: usize,
    pub slots: ResultSlots,
    pub is_async: bool,
    /// Object methods receive their object as `self`.
    pub is_method: bool,
}

impl FunctionFrame {
    fn new(id: NodeId, info: &FunctionInfo, is_method: bool) -> Self {
        Self {
            id,
            protected_depth: 0,
            slots: info.return_arity.into(),
            is_async: info.is_async,
            is_method,
        }
    }
}

pub struct LowerCtx<'a> {
    pub classification: &'a Classification,
    spans: &'a SpanMap,
    frame: FunctionFrame,
    outer: Vec<FunctionFrame>,
}

impl<'a> LowerCtx<'a> {
    pub fn new(classification: &'a Classification, spans: &'a SpanMap) -> LoweringResult<Self> {
        let module = classification.module();
        let info = classification
            .function(module)
            .ok_or_else(|| LoweringError::unclassified(module, "module"))?;
        Ok(Self {
            classification,
            spans,
            frame: FunctionFrame::new(module, info, false),
            outer: Vec::new(),
        })
    }

    pub fn frame(&self) -> &FunctionFrame {
        &self.frame
    }

    /// Whether a `return` here must be tagged for a protected call.
    pub fn in_protected(&self) -> bool {
        self.frame.protected_depth > 0
    }

    pub fn origin(&self, id: NodeId) -> Option<Span> {
        self.spans.get(id)
    }

    /// Run `f` with the current frame replaced by the function `id`.
    pub fn in_function<T>(
        &mut self,
        id: NodeId,
        is_method: bool,
        f: impl FnOnce(&mut Self) -> LoweringResult<T>,
    ) -> LoweringResult<T> {
        let info = self
            .classification
            .function(id)
            .ok_or_else(|| LoweringError::unclassified(id, "function"))?;
        let frame = FunctionFrame::new(id, info, is_method);
        self.outer.push(std::mem::replace(&mut self.frame, frame));
        let result = f(self);
        if let Some(frame) = self.outer.pop() {
            self.frame = frame;
        }
        result
    }

    /// Run `f` as the body of a protected closure.
    pub fn protected<T>(&mut self, f: impl FnOnce(&mut Self) -> LoweringResult<T>) -> LoweringResult<T> {
        self.frame.protected_depth += 1;
        let result = f(self);
        self.frame.protected_depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use settle_ast::build::*;
    use settle_ast::{StmtKind, TypeTable};

    use super::*;
    use crate::classify::classify_program;

    #[test]
    fn test_protected_depth_is_per_function() {
        let f = function("f", &[], vec![ret(multi(vec![int(1), int(2)]))]);
        let f_id = match &f.kind {
            StmtKind::Function(decl) => decl.id,
            _ => unreachable!(),
        };
        let program = program(vec![f]);
        let (classification, _) = classify_program(&program, &TypeTable::standard()).unwrap();
        let mut ctx = LowerCtx::new(&classification, &program.spans).unwrap();

        assert!(!ctx.in_protected());
        ctx.protected(|ctx| {
            assert!(ctx.in_protected());
            ctx.in_function(f_id, false, |ctx| {
                assert!(!ctx.in_protected());
                assert_eq!(ctx.frame().slots, ResultSlots::Fixed(2));
                Ok(())
            })?;
            assert!(ctx.in_protected());
            Ok(())
        })
        .unwrap();
        assert!(!ctx.in_protected());
        assert_eq!(ctx.frame().id, program.id);
    }

    #[test]
    fn test_unclassified_function_is_reported() {
        let program = program(vec![]);
        let (classification, _) = classify_program(&program, &TypeTable::standard()).unwrap();
        let mut ctx = LowerCtx::new(&classification, &program.spans).unwrap();
        let missing = NodeId::fresh();
        let err = ctx.in_function(missing, false, |_| Ok(())).unwrap_err();
        assert_eq!(err.node(), missing);
    }
}
