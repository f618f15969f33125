//! Positions in the source program, carried for diagnostics.

use std::fmt;

/// A position in the surface program.
///
/// The elaborator that produces the intermediate tree records one location
/// per node; every error message points back to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SourceLocation {
    line: u32,
    column: u32,
}

impl SourceLocation {
    /// Creates a location from a 1-based line and column.
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The 1-based line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// The 1-based column number.
    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
