//! Lowering from the typed source tree to the target tree.
//!
//! The output contains no `try`, `catch`, `finally` or `using` constructs:
//! regions become protected calls ([`try_finally`]), disposal scopes become
//! nested guarded continuations ([`disposal`]), and multi-valued returns
//! cross both as native multiple results ([`multi_return`]).
//!
//! Nested constructs are lowered inner-first; the outer transform embeds the
//! finished inner block as an opaque statement.

mod context;
mod disposal;
mod expr;
mod multi_return;
pub(crate) mod region;
mod stmt;
mod try_finally;

use settle_ast::Program;
use settle_target::Chunk;
use tracing::debug;

pub use context::{FunctionFrame, ResultSlots};
pub use region::{RegionState, RegionTracker};

use crate::classify::Classification;
use crate::errors::LoweringResult;

/// Lower a classified program into a target chunk.
pub fn lower_program(program: &Program, classification: &Classification) -> LoweringResult<Chunk> {
    let mut ctx = context::LowerCtx::new(classification, &program.spans)?;
    let block = stmt::lower_block(&mut ctx, &program.body)?;
    debug!(statements = block.stmts.len(), "lowered program");
    Ok(Chunk { block })
}
