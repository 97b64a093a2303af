//! Line/column positions.

use std::fmt;

/// A 1-based line and column position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextLocation {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column (character index within the line plus one).
    pub column: usize,
}

impl TextLocation {
    /// Create a location from a line and a column.
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for TextLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Line {} Col {})", self.line, self.column)
    }
}
