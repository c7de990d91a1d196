//! Stack-trace reconciliation.
//!
//! Generated units register their position table once. A raw trace is then
//! rewritten by replacing every `file:line` location whose file is
//! registered and whose line has an entry. Locations appear bare
//! (`main.lua:8: in function ..`) or inside an anonymous-frame bracket
//! (`<main.lua:7>`); the bracket is kept as is.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use derive_more::{Display, Error};
use settle_core::SourceMapTable;
use tracing::debug;

#[derive(Debug, Display, Error)]
pub enum TracebackError {
    #[display("source map for {_0} is already registered")]
    AlreadyRegistered(#[error(not(source))] String),
}

/// Write-once registry of position tables, keyed by generated file.
#[derive(Debug, Default)]
pub struct SourceMapRegistry {
    tables: DashMap<String, Arc<SourceMapTable>>,
}

impl SourceMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit's table. A second registration for the same generated
    /// file is rejected and leaves the first table in place.
    pub fn register(&self, table: SourceMapTable) -> Result<(), TracebackError> {
        match self.tables.entry(table.generated_file.clone()) {
            Entry::Occupied(entry) => Err(TracebackError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(file = %table.generated_file, "source map registered");
                entry.insert(Arc::new(table));
                Ok(())
            }
        }
    }

    pub fn get(&self, generated_file: &str) -> Option<Arc<SourceMapTable>> {
        self.tables.get(generated_file).map(|entry| entry.value().clone())
    }

    pub fn is_registered(&self, generated_file: &str) -> bool {
        self.tables.contains_key(generated_file)
    }

    /// Rewrite every mapped `file:line` location in `trace`.
    pub fn rewrite_traceback(&self, trace: &str) -> String {
        let bytes = trace.as_bytes();
        let mut out = String::with_capacity(trace.len());
        // Everything before `copied` is already in `out`.
        let mut copied = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b':' {
                i += 1;
                continue;
            }
            let digits_end = i + 1 + bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
            if digits_end == i + 1 {
                i += 1;
                continue;
            }
            let mut start = i;
            while start > copied && !is_file_boundary(bytes[start - 1]) {
                start -= 1;
            }
            let file = &trace[start..i];
            let mapped = trace[i + 1..digits_end]
                .parse::<u32>()
                .ok()
                .and_then(|line| self.lookup(file, line));
            if let Some((source_file, source_line)) = mapped {
                out.push_str(&trace[copied..start]);
                out.push_str(&source_file);
                out.push(':');
                out.push_str(&source_line.to_string());
                copied = digits_end;
            }
            i = digits_end;
        }
        out.push_str(&trace[copied..]);
        out
    }

    fn lookup(&self, file: &str, line: u32) -> Option<(String, u32)> {
        if file.is_empty() {
            return None;
        }
        let table = self.tables.get(file)?;
        let position = table.lookup(line)?;
        Some((table.source_file.clone(), position.line))
    }
}

/// File tokens run up to whitespace or an anonymous-frame bracket.
fn is_file_boundary(byte: u8) -> bool {
    byte.is_ascii_whitespace() || byte == b'<'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SourceMapRegistry {
        let registry = SourceMapRegistry::new();
        let table = SourceMapTable::from_lines(
            "main.lua",
            "main.ts",
            [(5, 1), (6, 2), (7, 3), (8, 4), (9, 3), (10, 2), (11, 1)],
        )
        .unwrap();
        registry.register(table).unwrap();
        registry
    }

    #[test]
    fn test_rewrites_bare_and_bracketed_locations() {
        let trace = [
            "stack traceback:",
            "\tmain.lua:8: in function <main.lua:7>",
            "\tmain.lua:7: in function <main.lua:6>",
            "\t[C]: in ?",
        ]
        .join("\n");
        let rewritten = registry().rewrite_traceback(&trace);
        assert_eq!(
            rewritten,
            [
                "stack traceback:",
                "\tmain.ts:4: in function <main.ts:3>",
                "\tmain.ts:3: in function <main.ts:2>",
                "\t[C]: in ?",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_unmapped_locations_are_left_alone() {
        let trace = "\tmain.lua:99: in function <other.lua:7>\n\tmain.lua:5: in main chunk";
        let rewritten = registry().rewrite_traceback(trace);
        assert_eq!(
            rewritten,
            "\tmain.lua:99: in function <other.lua:7>\n\tmain.ts:1: in main chunk"
        );
    }

    #[test]
    fn test_named_frames_keep_function_names() {
        let trace = "\tmain.lua:10: in function 'outer'";
        assert_eq!(
            registry().rewrite_traceback(trace),
            "\tmain.ts:2: in function 'outer'"
        );
    }

    #[test]
    fn test_registration_is_write_once() {
        let registry = registry();
        let replacement = SourceMapTable::from_lines("main.lua", "other.ts", [(5, 40)]).unwrap();
        let err = registry.register(replacement).unwrap_err();
        assert!(matches!(err, TracebackError::AlreadyRegistered(ref f) if f == "main.lua"));
        let err: &dyn std::error::Error = &err;
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "source map for main.lua is already registered");
        assert_eq!(registry.get("main.lua").unwrap().source_file, "main.ts");
    }
}
