//! Protected-call emulation shared by `try` regions and disposal scopes.
//!
//! A protected body runs as `pcall(function() .. end)`. How it finished is
//! read back from the result list:
//!
//! ```text
//! ____ok = false                 thrown; ____signal holds the value
//! ____ok = true, ____signal set  returned; values follow the marker
//! ____ok = true, ____signal nil  completed normally
//! ```
//!
//! A `return` inside the closure therefore emits `return true, values..`.
//! The values land in `____result1..N`, sized from the function's widest
//! return, or in a packed `____outcome` table when the arity is variadic.

use derive_more::Display;
use settle_ast::NodeId;
use settle_target::primitives::{self, OK, OUTCOME, SIGNAL};
use settle_target::{Block, Expr, ExprList, Stmt};
use smallvec::smallvec;
use tracing::trace;

use crate::errors::{LoweringErrorKind, LoweringResult};
use crate::lower::context::ResultSlots;

// ============================================================================
// Region state machine
// ============================================================================

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum RegionState {
    Entered,
    TryRunning,
    CatchRunning,
    FinallyRunning,
    Settled,
}

impl RegionState {
    fn can_move_to(self, next: RegionState) -> bool {
        use RegionState::*;
        matches!(
            (self, next),
            (Entered, TryRunning)
                | (TryRunning, CatchRunning | FinallyRunning | Settled)
                | (CatchRunning, FinallyRunning | Settled)
                | (FinallyRunning, Settled)
        )
    }
}

/// Walks one region through its phases as its parts are lowered.
#[derive(Debug)]
pub struct RegionTracker {
    region: NodeId,
    state: RegionState,
}

impl RegionTracker {
    pub fn enter(region: NodeId) -> Self {
        Self {
            region,
            state: RegionState::Entered,
        }
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn advance(&mut self, next: RegionState) -> LoweringResult<()> {
        if !self.state.can_move_to(next) {
            return Err(LoweringErrorKind::IllegalTransition {
                region: self.region,
                from: self.state,
                to: next,
            }
            .into());
        }
        trace!(region = %self.region, from = %self.state, to = %next, "region transition");
        self.state = next;
        Ok(())
    }
}

// ============================================================================
// Signal slots
// ============================================================================

/// Emits the locals and checks around one protected call.
#[derive(Clone, Copy, Debug)]
pub struct SignalSlots {
    slots: ResultSlots,
}

impl SignalSlots {
    pub fn new(slots: ResultSlots) -> Self {
        Self { slots }
    }

    fn names(&self) -> Vec<String> {
        let mut names = vec![OK.to_owned(), SIGNAL.to_owned()];
        if let ResultSlots::Fixed(n) = self.slots {
            names.extend((1..=n).map(primitives::result_slot));
        }
        names
    }

    /// `local ____ok, ____signal, .. = <call>`
    pub fn capture(&self, call: Expr) -> Vec<Stmt> {
        match self.slots {
            ResultSlots::Fixed(_) => vec![Stmt::local(self.names(), smallvec![call])],
            ResultSlots::Packed => vec![
                Stmt::local([OUTCOME.to_owned()], smallvec![primitives::table_pack(call)]),
                Stmt::local([OK.to_owned(), SIGNAL.to_owned()], unpacked_head()),
            ],
        }
    }

    /// Overwrite the captured signal with the outcome of `call`.
    pub fn recapture(&self, call: Expr) -> Vec<Stmt> {
        match self.slots {
            ResultSlots::Fixed(_) => {
                let targets = self.names().into_iter().map(Expr::name).collect();
                vec![Stmt::assign(targets, smallvec![call])]
            }
            ResultSlots::Packed => vec![
                Stmt::assign(
                    smallvec![Expr::name(OUTCOME)],
                    smallvec![primitives::table_pack(call)],
                ),
                Stmt::assign(
                    smallvec![Expr::name(OK), Expr::name(SIGNAL)],
                    unpacked_head(),
                ),
            ],
        }
    }

    /// Values carried by a `Returned` signal.
    pub fn pending_values(&self) -> ExprList {
        match self.slots {
            ResultSlots::Fixed(n) => (1..=n)
                .map(|i| Expr::name(primitives::result_slot(i)))
                .collect(),
            ResultSlots::Packed => smallvec![primitives::table_unpack(
                Expr::name(OUTCOME),
                Some((Expr::Int(3), Expr::field(Expr::name(OUTCOME), "n"))),
            )],
        }
    }

    /// `if not ____ok then error(____signal, 0) end`
    pub fn rethrow_if_failed(&self) -> Stmt {
        Stmt::if_then(
            Expr::not(Expr::name(OK)),
            Block::new(vec![Stmt::call(primitives::raise(Expr::name(SIGNAL)))]),
        )
    }

    /// `if ____signal then return [true,] values end`
    pub fn propagate_return(&self, in_protected: bool) -> Stmt {
        Stmt::if_then(
            Expr::name(SIGNAL),
            Block::new(vec![self.return_pending(in_protected)]),
        )
    }

    /// Return the pending values, tagged when still inside a protected call.
    pub fn return_pending(&self, in_protected: bool) -> Stmt {
        let values = self.pending_values();
        Stmt::ret(if in_protected {
            primitives::returned(values)
        } else {
            values
        })
    }
}

/// `____outcome[1], ____outcome[2]`
fn unpacked_head() -> ExprList {
    smallvec![
        Expr::index(Expr::name(OUTCOME), Expr::Int(1)),
        Expr::index(Expr::name(OUTCOME), Expr::Int(2)),
    ]
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use settle_target::{Chunk, render};

    use super::*;

    fn text(stmts: Vec<Stmt>) -> String {
        render(&Chunk {
            block: Block::new(stmts),
        })
        .text
    }

    fn body() -> Expr {
        primitives::pcall(Expr::function(vec![], Block::default()), vec![])
    }

    #[test]
    fn test_legal_region_paths() {
        use RegionState::*;
        for path in [
            &[TryRunning, Settled][..],
            &[TryRunning, CatchRunning, Settled],
            &[TryRunning, FinallyRunning, Settled],
            &[TryRunning, CatchRunning, FinallyRunning, Settled],
        ] {
            let mut tracker = RegionTracker::enter(NodeId::fresh());
            for &state in path {
                tracker.advance(state).unwrap();
            }
            assert_eq!(tracker.state(), Settled);
        }
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let region = NodeId::fresh();
        let mut tracker = RegionTracker::enter(region);
        tracker.advance(RegionState::TryRunning).unwrap();
        tracker.advance(RegionState::FinallyRunning).unwrap();
        let err = tracker.advance(RegionState::CatchRunning).unwrap_err();
        assert_eq!(
            err.kind(),
            &LoweringErrorKind::IllegalTransition {
                region,
                from: RegionState::FinallyRunning,
                to: RegionState::CatchRunning,
            }
        );
        assert_eq!(tracker.state(), RegionState::FinallyRunning);
    }

    #[test]
    fn test_fixed_slots() {
        let slots = SignalSlots::new(ResultSlots::Fixed(2));
        let mut stmts = slots.capture(body());
        stmts.push(slots.rethrow_if_failed());
        stmts.push(slots.propagate_return(true));
        assert_snapshot!(text(stmts), @r"
        local ____ok, ____signal, ____result1, ____result2 = pcall(function() end)
        if not ____ok then
            error(____signal, 0)
        end
        if ____signal then
            return true, ____result1, ____result2
        end
        ");
    }

    #[test]
    fn test_packed_slots() {
        let slots = SignalSlots::new(ResultSlots::Packed);
        let mut stmts = slots.capture(body());
        stmts.extend(slots.recapture(body()));
        stmts.push(slots.propagate_return(false));
        assert_snapshot!(text(stmts), @r"
        local ____outcome = table.pack(pcall(function() end))
        local ____ok, ____signal = ____outcome[1], ____outcome[2]
        ____outcome = table.pack(pcall(function() end))
        ____ok, ____signal = ____outcome[1], ____outcome[2]
        if ____signal then
            return table.unpack(____outcome, 3, ____outcome.n)
        end
        ");
    }
}
