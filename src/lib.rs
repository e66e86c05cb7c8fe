pub mod compiler;

use compiler::codegen::Codegen;
use compiler::constant::GlobalInfo;
use compiler::diagnostics::CompileResult;
use compiler::ir::{ArchitectureInfo, RuntimeStatic};
use compiler::lexer::Lexer;
use compiler::modules::ModuleTable;
use compiler::parser;
use std::rc::Rc;

/// Compile a root source file into runtime statics (functions and constant
/// data) for the given architecture.
pub fn compile_file(
    path: &str,
    architecture: ArchitectureInfo,
) -> CompileResult<Vec<RuntimeStatic>> {
    let absolute = std::fs::canonicalize(path)
        .map(|absolute| absolute.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string());

    let source = std::fs::read_to_string(&absolute).map_err(|error| {
        compiler::diagnostics::CompileError::new(
            absolute.clone(),
            compiler::span::FileRange::synthetic(),
            format!("Cannot read source file: {}", error),
        )
    })?;

    compile_source(&absolute, &source, architecture)
}

/// Compile already-loaded source text. `path` is used for diagnostics and
/// for resolving imports relative to the file.
pub fn compile_source(
    path: &str,
    source: &str,
    architecture: ArchitectureInfo,
) -> CompileResult<Vec<RuntimeStatic>> {
    tracing::debug!(path, "compiling root file");

    let tokens = Lexer::new(path, source).tokenize()?;
    let statements = Rc::new(parser::parse_tokens(path, tokens)?);

    let mut files = ModuleTable::new();
    let root = files.insert(Rc::from(path), statements);

    let info = GlobalInfo::new(architecture);
    let codegen = Codegen::new(info, files, &root);
    codegen.generate(&root)
}

/// Parse a source file and return its AST as pretty-printed JSON.
pub fn source_to_ast_json(path: &str, source: &str) -> Result<String, String> {
    let tokens = Lexer::new(path, source)
        .tokenize()
        .map_err(|error| error.to_string())?;
    let statements = parser::parse_tokens(path, tokens).map_err(|error| error.to_string())?;
    serde_json::to_string_pretty(&statements).map_err(|error| error.to_string())
}
