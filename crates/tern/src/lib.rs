//! The Tern front end pipeline.
//!
//! Tern is a small, purely functional expression language with extensible
//! records and polymorphic variants. This crate wires the phases together:
//!
//! ```text
//! source text -> tokens -> AST (+ synonyms) -> imports spliced -> principal scheme
//! ```
//!
//! Each entry point owns a fresh inference state, so calls are independent
//! and deterministic. Failures short-circuit: the first diagnostic of the
//! first failing phase comes back as a [`DiagnosticError`].

use std::path::{Path, PathBuf};

use tern_ast::{Expr, FileId, SynonymDecl};
use tern_diag::{Category, Diagnostic, DiagnosticError};
use tern_infer::typeck::type_inference;
use tern_syntax::{Sources, parse_program_source, resolve_imports};

pub use tern_infer::typeck::{SynonymTable, TypeEnv};
pub use tern_types::{Scheme, Type, TypeKind};

/// A parsed program: its synonym declarations and its body expression, with
/// imports already spliced in.
#[derive(Debug)]
pub struct Program {
    pub synonyms: Vec<SynonymDecl>,
    pub expr: Expr,
    /// Every source file read while resolving the program.
    pub sources: Sources,
}

/// Parse a program from source text and resolve its imports against
/// `lib_dirs`.
pub fn load_source(
    name: &str,
    source: &str,
    lib_dirs: &[PathBuf],
) -> Result<Program, DiagnosticError> {
    let mut sources = Sources::new();
    let file = sources.add(name, source);
    let (mut synonyms, expr) = parse_program_source(source, file)?;
    let expr = resolve_imports(&mut sources, lib_dirs, expr, &mut synonyms)?;
    Ok(Program {
        synonyms,
        expr,
        sources,
    })
}

/// Parse a program from a file on disk and resolve its imports.
pub fn load_file(path: &Path, lib_dirs: &[PathBuf]) -> Result<Program, DiagnosticError> {
    let source = std::fs::read_to_string(path).map_err(|err| {
        DiagnosticError::single(Diagnostic::error(
            Category::ImportIo,
            format!("failed to read `{}`: {err}", path.display()),
        ))
    })?;
    load_source(&path.display().to_string(), &source, lib_dirs)
}

/// Infer the principal scheme of a loaded program against an environment.
pub fn infer_program(program: &Program, env: &TypeEnv) -> Result<Scheme, DiagnosticError> {
    let synonyms = SynonymTable::from_decls(&program.synonyms)?;
    Ok(type_inference(env, &synonyms, &program.expr)?)
}

/// Parse, resolve and infer source text in one step, with no imports and an
/// empty environment.
pub fn infer_source(source: &str) -> Result<Scheme, DiagnosticError> {
    infer_source_with_env(source, &TypeEnv::new())
}

/// Parse, resolve and infer source text against a pre-seeded environment.
pub fn infer_source_with_env(source: &str, env: &TypeEnv) -> Result<Scheme, DiagnosticError> {
    let program = load_source("<input>", source, &[])?;
    infer_program(&program, env)
}

/// Parse, resolve and infer a file against library directories and a
/// pre-seeded environment.
pub fn infer_file(
    path: &Path,
    lib_dirs: &[PathBuf],
    env: &TypeEnv,
) -> Result<Scheme, DiagnosticError> {
    let program = load_file(path, lib_dirs)?;
    infer_program(&program, env)
}

/// Parse source text without inferring, returning synonyms and the
/// elaborated body. Convenience for callers that only need syntax.
pub fn parse_source(source: &str) -> Result<(Vec<SynonymDecl>, Expr), DiagnosticError> {
    let (synonyms, expr) = parse_program_source(source, FileId(0))?;
    Ok((synonyms, expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_infers_a_simple_scheme() {
        let scheme = infer_source("\\x -> x").expect("types");
        assert_eq!(scheme.to_string(), "forall a. a -> a");
    }

    #[test]
    fn pipeline_threads_synonyms_through_annotations() {
        let scheme = infer_source("type Point = {x: Int, y: Int};\n\\p -> (p : Point).x")
            .expect("types");
        assert_eq!(scheme.to_string(), "{x: Int, y: Int} -> Int");
    }

    #[test]
    fn pipeline_reports_the_first_failure() {
        let err = infer_source("{ x = 1 }.y").expect_err("must fail");
        assert_eq!(err.diagnostics()[0].category, Category::MissingLabel);
    }
}
