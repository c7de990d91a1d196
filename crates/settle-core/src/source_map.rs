//! Generated-line to source-position tables.
//!
//! One table exists per compiled unit. It is built once when the unit is
//! emitted and is read-only afterwards; the runtime consumes it to rewrite
//! stack traces into source coordinates.
//!
//! The embedded shape maps a generated line (string or integer key) to either
//! a bare source line or `{ "line": .., "column": .. }`.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A position in the original source file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePosition {
    /// 1-based line number.
    pub line: u32,
    /// 0-based byte column, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl SourcePosition {
    pub const fn line(line: u32) -> Self {
        Self { line, column: None }
    }
}

#[derive(Debug, Display)]
pub enum SourceMapError {
    #[display("invalid source map table: {_0}")]
    Json(serde_json::Error),

    #[display("generated line numbers start at 1")]
    ZeroLine,
}

impl From<serde_json::Error> for SourceMapError {
    fn from(error: serde_json::Error) -> Self {
        SourceMapError::Json(error)
    }
}

impl std::error::Error for SourceMapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceMapError::Json(e) => Some(e),
            SourceMapError::ZeroLine => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPosition {
    Line(u32),
    Full(SourcePosition),
}

/// Mapping from generated lines of one compiled unit to source positions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceMapTable {
    /// Identifier of the generated file (e.g. `main.lua`).
    pub generated_file: String,
    /// Name of the source file the unit was compiled from (e.g. `main.ts`).
    pub source_file: String,
    entries: BTreeMap<u32, SourcePosition>,
}

impl SourceMapTable {
    pub fn new(generated_file: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            generated_file: generated_file.into(),
            source_file: source_file.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Record the source position for a generated line.
    ///
    /// The first position recorded for a line wins: a generated line maps to
    /// the statement that starts on it.
    pub fn record(&mut self, generated_line: u32, position: SourcePosition) {
        if generated_line == 0 {
            return;
        }
        self.entries.entry(generated_line).or_insert(position);
    }

    /// Build a table from `(generated line, source line)` pairs.
    pub fn from_lines(
        generated_file: impl Into<String>,
        source_file: impl Into<String>,
        lines: impl IntoIterator<Item = (u32, u32)>,
    ) -> Result<Self, SourceMapError> {
        let mut table = Self::new(generated_file, source_file);
        for (generated, source) in lines {
            if generated == 0 {
                return Err(SourceMapError::ZeroLine);
            }
            table.record(generated, SourcePosition::line(source));
        }
        Ok(table)
    }

    /// Parse the embedded JSON shape.
    pub fn from_json(
        generated_file: impl Into<String>,
        source_file: impl Into<String>,
        json: &str,
    ) -> Result<Self, SourceMapError> {
        let raw: BTreeMap<u32, RawPosition> = serde_json::from_str(json)?;
        let mut table = Self::new(generated_file, source_file);
        for (generated, position) in raw {
            if generated == 0 {
                return Err(SourceMapError::ZeroLine);
            }
            let position = match position {
                RawPosition::Line(line) => SourcePosition::line(line),
                RawPosition::Full(position) => position,
            };
            table.record(generated, position);
        }
        Ok(table)
    }

    /// Serialize the entries in the embedded JSON shape.
    pub fn entries_to_json(&self) -> String {
        let keyed: BTreeMap<String, &SourcePosition> = self
            .entries
            .iter()
            .map(|(line, pos)| (line.to_string(), pos))
            .collect();
        serde_json::to_string(&keyed).unwrap_or_default()
    }

    pub fn lookup(&self, generated_line: u32) -> Option<SourcePosition> {
        self.entries.get(&generated_line).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, SourcePosition)> + '_ {
        self.entries.iter().map(|(line, pos)| (*line, *pos))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_record_wins() {
        let mut table = SourceMapTable::new("main.lua", "main.ts");
        table.record(3, SourcePosition::line(1));
        table.record(3, SourcePosition::line(9));
        assert_eq!(table.lookup(3), Some(SourcePosition::line(1)));
    }

    #[test]
    fn test_from_json_accepts_both_value_shapes() {
        let table = SourceMapTable::from_json(
            "main.lua",
            "main.ts",
            r#"{"5": 1, "6": {"line": 2, "column": 4}}"#,
        )
        .unwrap();
        assert_eq!(table.lookup(5), Some(SourcePosition::line(1)));
        assert_eq!(
            table.lookup(6),
            Some(SourcePosition {
                line: 2,
                column: Some(4)
            })
        );
        assert_eq!(table.lookup(7), None);
    }

    #[test]
    fn test_from_json_rejects_zero_line() {
        let err = SourceMapTable::from_json("main.lua", "main.ts", r#"{"0": 1}"#).unwrap_err();
        assert!(matches!(err, SourceMapError::ZeroLine));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = SourceMapTable::from_json("main.lua", "main.ts", "[1, 2]").unwrap_err();
        assert!(matches!(err, SourceMapError::Json(_)));
    }

    #[test]
    fn test_entries_to_json_round_trip() {
        let table =
            SourceMapTable::from_lines("main.lua", "main.ts", [(2, 1), (3, 1), (4, 2)]).unwrap();
        let json = table.entries_to_json();
        let parsed = SourceMapTable::from_json("main.lua", "main.ts", &json).unwrap();
        assert_eq!(parsed, table);
    }
}
