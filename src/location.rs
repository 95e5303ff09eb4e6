//! Source positions and ranges.
//!
//! All values are zero-indexed. Offsets and columns are UTF-8 byte based so
//! they can slice the original `&str` directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    pub const ZERO: Position = Position {
        line: 0,
        column: 0,
        offset: 0,
    };

    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Position {
            line,
            column,
            offset,
        }
    }

    /// Offsets past the end of `text` are clamped to its length.
    pub fn from_offset(offset: usize, text: &str) -> Position {
        LineIndex::new(text).position(offset)
    }

    /// Returns `None` when the line does not exist or the column runs past
    /// the end of that line.
    pub fn from_line_and_column(line: u32, column: u32, text: &str) -> Option<Position> {
        let offset = LineIndex::new(text).offset(line, column)?;
        Some(Position::new(line, column, offset as u32))
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// A half-open span `[start, end)` between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const ZERO: Range = Range {
        start: Position::ZERO,
        end: Position::ZERO,
    };

    pub fn new(start: Position, end: Position) -> Self {
        debug_assert!(start.offset <= end.offset, "range start after end");
        Range { start, end }
    }

    pub fn from_offsets(start: usize, end: usize, text: &str) -> Range {
        let index = LineIndex::new(text);
        index.range(start, end)
    }

    pub fn is_empty(&self) -> bool {
        self.start.offset == self.end.offset
    }

    pub fn offsets(&self) -> (usize, usize) {
        (self.start.offset(), self.end.offset())
    }

    pub fn len(&self) -> usize {
        (self.end.offset - self.start.offset) as usize
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start.offset() <= offset && offset <= self.end.offset()
    }

    /// Slice of `text` covered by this range.
    pub fn slice<'t>(&self, text: &'t str) -> &'t str {
        let (start, end) = self.offsets();
        text.get(start..end).unwrap_or("")
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Precomputed line starts for repeated offset <-> line/column conversion.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = offset - self.line_starts[line];
        Position::new(line as u32, column as u32, offset as u32)
    }

    pub fn range(&self, start: usize, end: usize) -> Range {
        Range::new(self.position(start), self.position(end.max(start)))
    }

    pub fn offset(&self, line: u32, column: u32) -> Option<usize> {
        let start = *self.line_starts.get(line as usize)?;
        let line_end = self
            .line_starts
            .get(line as usize + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        let offset = start + column as usize;
        (offset <= line_end).then_some(offset)
    }
}
