use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location range — tracks the exact position of every AST node so
/// diagnostics can point at the offending characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRange {
    /// 1-based line of the first character.
    pub first_line: u32,
    /// 1-based column of the first character.
    pub first_column: u32,
    /// 1-based line of the last character (inclusive).
    pub last_line: u32,
    /// 1-based column of the last character (inclusive).
    pub last_column: u32,
}

impl FileRange {
    pub fn new(first_line: u32, first_column: u32, last_line: u32, last_column: u32) -> Self {
        Self {
            first_line,
            first_column,
            last_line,
            last_column,
        }
    }

    /// A zero-width range for compiler-generated nodes.
    pub fn synthetic() -> Self {
        Self {
            first_line: 0,
            first_column: 0,
            last_line: 0,
            last_column: 0,
        }
    }

    /// Merge two ranges into one that covers both.
    pub fn merge(self, other: FileRange) -> FileRange {
        let (first_line, first_column) =
            if (self.first_line, self.first_column) <= (other.first_line, other.first_column) {
                (self.first_line, self.first_column)
            } else {
                (other.first_line, other.first_column)
            };
        let (last_line, last_column) =
            if (self.last_line, self.last_column) >= (other.last_line, other.last_column) {
                (self.last_line, self.last_column)
            } else {
                (other.last_line, other.last_column)
            };
        FileRange {
            first_line,
            first_column,
            last_line,
            last_column,
        }
    }
}

impl fmt::Display for FileRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first_line, self.first_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_covers_both() {
        let a = FileRange::new(1, 5, 1, 9);
        let b = FileRange::new(1, 12, 2, 3);
        assert_eq!(a.merge(b), FileRange::new(1, 5, 2, 3));
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = FileRange::new(3, 1, 3, 4);
        let b = FileRange::new(2, 7, 2, 9);
        assert_eq!(a.merge(b), b.merge(a));
    }
}
