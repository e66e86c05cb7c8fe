use crate::compiler::span::FileRange;
use std::fmt;
use std::fs;
use std::io::Write;

// ═══════════════════════════════════════════════════════════════
//  Error type
// ═══════════════════════════════════════════════════════════════

/// A fatal compilation error. The first error aborts the build; callers
/// propagate it upward with `?` and the driver reports it once.
#[derive(Debug, Clone)]
pub struct CompileError {
    /// Path of the file the offending range belongs to.
    pub path: String,
    pub range: FileRange,
    pub message: String,
}

pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn new(path: impl Into<String>, range: FileRange, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            range,
            message: message.into(),
        }
    }

    /// Print the diagnostic to stderr, followed by the offending source line
    /// with the range marked underneath. The file is read on demand; if it
    /// cannot be read the excerpt is silently omitted.
    pub fn report(&self) {
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(
            out,
            "Error: {}({},{}): {}",
            self.path, self.range.first_line, self.range.first_column, self.message
        );

        if self.range.first_line == 0 || self.range.first_line != self.range.last_line {
            return;
        }

        let source = match fs::read_to_string(&self.path) {
            Ok(source) => source,
            Err(_) => return,
        };

        let line = match source.lines().nth(self.range.first_line as usize - 1) {
            Some(line) => line,
            None => return,
        };

        let trimmed = line.trim_start();
        let skipped = (line.len() - trimmed.len()) as u32;
        let _ = writeln!(out, "{}", trimmed);

        let mut marker = String::new();
        for _ in 1..self.range.first_column.saturating_sub(skipped) {
            marker.push(' ');
        }
        if self.range.last_column == self.range.first_column {
            marker.push('^');
        } else {
            for _ in self.range.first_column..=self.range.last_column {
                marker.push('-');
            }
        }
        let _ = writeln!(out, "{}", marker);
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error: {}({},{}): {}",
            self.path, self.range.first_line, self.range.first_column, self.message
        )
    }
}

impl std::error::Error for CompileError {}
