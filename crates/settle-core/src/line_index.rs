//! Line index for converting byte offsets into source-map positions.
//!
//! Source maps count lines from 1 and columns in bytes from 0, while spans
//! carry raw byte offsets. This module provides the conversion.

use crate::source_map::SourcePosition;

/// Line index for a source file.
///
/// Caches line start positions for efficient position conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineIndex {
    /// Byte offset of the start of each line (0-indexed).
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    /// Create a line index from source text.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Number of lines, counting a trailing partial line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to a 0-based (line, byte column) pair.
    pub fn byte_line_col(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.len);
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line];
        (line as u32, (offset - line_start) as u32)
    }

    /// Convert a byte offset to a source-map position (1-based line).
    pub fn position(&self, offset: usize) -> SourcePosition {
        let (line, column) = self.byte_line_col(offset);
        SourcePosition {
            line: line + 1,
            column: Some(column),
        }
    }
}
