//! Recursive import resolution.
//!
//! Imports are textual splicing, not linking: each `import "path"` node is
//! replaced by the parsed body of the named file, and the file's synonym
//! declarations are appended to a flat accumulator. Relative paths are
//! searched through the library directories in order; absolute paths are
//! read directly. Imports of imports resolve recursively.

use std::path::{Path, PathBuf};

use tern_ast::{Expr, ExprKind, FileId, SynonymDecl};
use tern_diag::{Category, Diagnostic};

use crate::{lexer, parser};

/// Registry of source files seen during one resolution session, so spans can
/// be mapped back to file names and text.
#[derive(Debug, Default)]
pub struct Sources {
    files: Vec<SourceFile>,
}

#[derive(Debug)]
struct SourceFile {
    name: String,
    text: String,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return its id.
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    pub fn name(&self, id: FileId) -> Option<&str> {
        self.files.get(id.0 as usize).map(|f| f.name.as_str())
    }

    pub fn text(&self, id: FileId) -> Option<&str> {
        self.files.get(id.0 as usize).map(|f| f.text.as_str())
    }
}

/// Resolve every `Import` node in `expr`, appending imported synonym
/// declarations to `synonyms`.
pub fn resolve_imports(
    sources: &mut Sources,
    lib_dirs: &[PathBuf],
    expr: Expr,
    synonyms: &mut Vec<SynonymDecl>,
) -> Result<Expr, Diagnostic> {
    let mut in_flight = Vec::new();
    resolve(sources, lib_dirs, expr, synonyms, &mut in_flight)
}

fn resolve(
    sources: &mut Sources,
    lib_dirs: &[PathBuf],
    expr: Expr,
    synonyms: &mut Vec<SynonymDecl>,
    in_flight: &mut Vec<PathBuf>,
) -> Result<Expr, Diagnostic> {
    let span = expr.span;
    let kind = match expr.node {
        ExprKind::Import(path) => {
            let resolved = locate(lib_dirs, &path)?;
            if in_flight.contains(&resolved) {
                return Err(Diagnostic::error(
                    Category::ImportNotFound,
                    format!("import cycle detected at `{}`", resolved.display()),
                ));
            }

            let text = std::fs::read_to_string(&resolved).map_err(|err| {
                Diagnostic::error(
                    Category::ImportIo,
                    format!("failed to read `{}`: {err}", resolved.display()),
                )
            })?;
            let file_id = sources.add(resolved.display().to_string(), text);
            let text = sources
                .text(file_id)
                .expect("file was just registered")
                .to_string();

            let tokens = lexer::lex(&text, file_id)
                .map_err(|diag| in_file(diag, &resolved))?;
            let (file_synonyms, body) =
                parser::parse_program(tokens, file_id).map_err(|diag| in_file(diag, &resolved))?;
            synonyms.extend(file_synonyms);

            in_flight.push(resolved);
            let body = resolve(sources, lib_dirs, body, synonyms, in_flight)?;
            in_flight.pop();
            return Ok(body);
        }
        ExprKind::App(f, arg) => ExprKind::App(
            Box::new(resolve(sources, lib_dirs, *f, synonyms, in_flight)?),
            Box::new(resolve(sources, lib_dirs, *arg, synonyms, in_flight)?),
        ),
        ExprKind::Lam(binder, body) => ExprKind::Lam(
            binder,
            Box::new(resolve(sources, lib_dirs, *body, synonyms, in_flight)?),
        ),
        ExprKind::AnnLam(binder, ann, body) => ExprKind::AnnLam(
            binder,
            ann,
            Box::new(resolve(sources, lib_dirs, *body, synonyms, in_flight)?),
        ),
        ExprKind::Let(binder, value, body) => ExprKind::Let(
            binder,
            Box::new(resolve(sources, lib_dirs, *value, synonyms, in_flight)?),
            Box::new(resolve(sources, lib_dirs, *body, synonyms, in_flight)?),
        ),
        ExprKind::AnnLet(binder, ann, value, body) => ExprKind::AnnLet(
            binder,
            ann,
            Box::new(resolve(sources, lib_dirs, *value, synonyms, in_flight)?),
            Box::new(resolve(sources, lib_dirs, *body, synonyms, in_flight)?),
        ),
        ExprKind::Ann(inner, ann) => ExprKind::Ann(
            Box::new(resolve(sources, lib_dirs, *inner, synonyms, in_flight)?),
            ann,
        ),
        leaf @ (ExprKind::Var(_) | ExprKind::Prim(_)) => leaf,
    };
    Ok(Expr::new(kind, span))
}

/// Find the file an import path refers to.
fn locate(lib_dirs: &[PathBuf], path: &str) -> Result<PathBuf, Diagnostic> {
    let as_path = Path::new(path);
    if as_path.is_absolute() {
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }
        return Err(Diagnostic::error(
            Category::ImportNotFound,
            format!("imported file `{path}` does not exist"),
        ));
    }

    for dir in lib_dirs {
        let candidate = dir.join(as_path);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let searched = if lib_dirs.is_empty() {
        "no library directories were given".to_string()
    } else {
        format!(
            "searched: {}",
            lib_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    Err(Diagnostic::error(
        Category::ImportNotFound,
        format!("imported file `{path}` not found ({searched})"),
    ))
}

fn in_file(mut diag: Diagnostic, path: &Path) -> Diagnostic {
    diag.message = format!("in imported file `{}`: {}", path.display(), diag.message);
    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_import_lists_searched_dirs() {
        let dirs = vec![PathBuf::from("/nonexistent/a"), PathBuf::from("/nonexistent/b")];
        let err = locate(&dirs, "prelude.tn").unwrap_err();
        assert_eq!(err.category, Category::ImportNotFound);
        assert!(err.message.contains("/nonexistent/a"));
        assert!(err.message.contains("/nonexistent/b"));
    }

    #[test]
    fn sources_registry_hands_out_sequential_ids() {
        let mut sources = Sources::new();
        let a = sources.add("a.tn", "1");
        let b = sources.add("b.tn", "2");
        assert_eq!(a, FileId(0));
        assert_eq!(b, FileId(1));
        assert_eq!(sources.name(b), Some("b.tn"));
        assert_eq!(sources.text(a), Some("1"));
    }
}
