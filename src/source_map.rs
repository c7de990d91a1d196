//! Emission of lowered chunks with their position tables.
//!
//! The renderer reports the generated line each statement with an origin
//! starts on; origins resolve to source lines through a [`LineIndex`].
//! With trace reconciliation enabled, line 1 of the output registers the
//! table with the runtime:
//!
//! ```text
//! __sourcemap_traceback("main.lua", "main.ts", {["2"] = 1, ["3"] = 2})
//! ```
//!
//! and the body starts on line 2 so the recorded lines account for it.

use settle_core::{LineIndex, SourceMapTable};
use settle_target::primitives::SOURCEMAP_TRACEBACK;
use settle_target::{Block, Chunk, Expr, Stmt, TableField, render, render_from_line};
use tracing::debug;

/// Target text of one unit plus its position table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedUnit {
    pub code: String,
    pub source_map: SourceMapTable,
}

pub fn emit(
    chunk: &Chunk,
    generated_name: &str,
    source_name: &str,
    source_text: &str,
    register_traceback: bool,
) -> EmittedUnit {
    let first_line = if register_traceback { 2 } else { 1 };
    let rendered = render_from_line(chunk, first_line);

    let index = LineIndex::new(source_text);
    let mut source_map = SourceMapTable::new(generated_name, source_name);
    for (line, span) in &rendered.origins {
        source_map.record(*line, index.position(span.start));
    }
    debug!(
        file = generated_name,
        entries = source_map.len(),
        register_traceback,
        "emitted unit"
    );

    let code = if register_traceback {
        let registration = render(&Chunk {
            block: Block::new(vec![registration(&source_map)]),
        });
        registration.text + &rendered.text
    } else {
        rendered.text
    };
    EmittedUnit { code, source_map }
}

/// `__sourcemap_traceback(generated, source, {["line"] = source_line, ..})`
pub fn registration(table: &SourceMapTable) -> Stmt {
    let entries = table
        .entries()
        .map(|(line, position)| {
            TableField::Keyed(line.to_string(), Expr::Int(i64::from(position.line)))
        })
        .collect();
    Stmt::call(Expr::call_named(
        SOURCEMAP_TRACEBACK,
        vec![
            Expr::str(table.generated_file.as_str()),
            Expr::str(table.source_file.as_str()),
            Expr::Table(entries),
        ],
    ))
}
