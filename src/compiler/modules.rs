//! The parsed-file table and import path resolution. Each file is read,
//! lexed and parsed at most once; later imports of the same canonical path
//! reuse the stored statements.

use crate::compiler::ast::Statement;
use crate::compiler::diagnostics::{CompileError, CompileResult};
use crate::compiler::lexer::Lexer;
use crate::compiler::parser;
use crate::compiler::span::FileRange;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The stem an import binds in scope: `import "lib/math.cin";` declares
/// `math`.
pub fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: Rc<str>,
    pub statements: Rc<Vec<Rc<Statement>>>,
}

#[derive(Debug, Default)]
pub struct ModuleTable {
    files: Vec<LoadedFile>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    pub fn files(&self) -> &[LoadedFile] {
        &self.files
    }

    /// Register a file that has already been parsed (the root file).
    pub fn insert(&mut self, path: Rc<str>, statements: Rc<Vec<Rc<Statement>>>) -> LoadedFile {
        let file = LoadedFile { path, statements };
        self.files.push(file.clone());
        file
    }

    /// Resolve `import_path` relative to the importing file and parse it on
    /// demand. The parsed-file table is consulted first so each file is
    /// parsed at most once.
    pub fn load(
        &mut self,
        importer_path: &str,
        import_range: FileRange,
        import_path: &str,
    ) -> CompileResult<LoadedFile> {
        let directory = Path::new(importer_path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(PathBuf::new);
        let joined = directory.join(import_path);

        let absolute = joined.canonicalize().map_err(|_| {
            CompileError::new(
                importer_path,
                import_range,
                format!("Cannot find module '{}'", import_path),
            )
        })?;
        let absolute = absolute.to_string_lossy().into_owned();

        for file in &self.files {
            if file.path.as_ref() == absolute {
                return Ok(file.clone());
            }
        }

        let source = std::fs::read_to_string(&absolute).map_err(|error| {
            CompileError::new(
                importer_path,
                import_range,
                format!("Cannot read module '{}': {}", import_path, error),
            )
        })?;

        tracing::debug!(path = %absolute, "parsing imported module");

        let tokens = Lexer::new(&absolute, &source).tokenize()?;
        let statements = Rc::new(parser::parse_tokens(&absolute, tokens)?);

        Ok(self.insert(Rc::from(absolute.as_str()), statements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("lib/math.cin"), "math");
        assert_eq!(file_stem("a.cin"), "a");
        assert_eq!(file_stem("plain"), "plain");
    }
}
