//! Error reporting and diagnostics for Tern.
//!
//! This crate provides structured diagnostics with source location tracking.
//! Diagnostics are created by the other crates (`tern-syntax`, `tern-infer`,
//! the pipeline crate) and rendered here for display.
//!
//! Every phase of the front end fails fast: the first diagnostic aborts the
//! current parse or inference call, so a `Diagnostic` is also the error type
//! threaded through `Result`s inside the compiler.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Source text does not lex or parse.
    Syntax,
    /// A referenced term variable is not bound.
    UnboundVariable,
    /// A type annotation mentions a type variable outside any `forall`.
    UnboundTypeVariable,
    /// A constraint names a type variable missing from the binder list.
    ConstraintScope,
    /// Two types do not unify.
    TypeMismatch,
    /// A type variable would have to contain itself.
    OccursCheck,
    /// A star-kinded entity met a row-kinded one (or vice versa).
    KindMismatch,
    /// A label occurs twice in one row.
    RepeatedLabel,
    /// A label cannot be inserted into a closed row.
    MissingLabel,
    /// Row rewriting would identify a row with one of its own tails.
    RecursiveRow,
    /// A record wildcard pattern met a non-record or open-record type.
    RecordWildcard,
    /// An imported file was not found in any library directory.
    ImportNotFound,
    /// Reading an imported file failed.
    ImportIo,
    /// A type synonym is unknown at its use site.
    UnknownSynonym,
    /// The same synonym name is declared more than once.
    DuplicateSynonym,
    /// A synonym was applied to the wrong number of arguments.
    SynonymArity,
    /// Synonym expansion does not terminate.
    RecursiveSynonym,
}

impl Category {
    pub const ALL: [Category; 17] = [
        Category::Syntax,
        Category::UnboundVariable,
        Category::UnboundTypeVariable,
        Category::ConstraintScope,
        Category::TypeMismatch,
        Category::OccursCheck,
        Category::KindMismatch,
        Category::RepeatedLabel,
        Category::MissingLabel,
        Category::RecursiveRow,
        Category::RecordWildcard,
        Category::ImportNotFound,
        Category::ImportIo,
        Category::UnknownSynonym,
        Category::DuplicateSynonym,
        Category::SynonymArity,
        Category::RecursiveSynonym,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Syntax => "syntax",
            Category::UnboundVariable => "unbound_variable",
            Category::UnboundTypeVariable => "unbound_type_variable",
            Category::ConstraintScope => "constraint_scope",
            Category::TypeMismatch => "type_mismatch",
            Category::OccursCheck => "occurs_check",
            Category::KindMismatch => "kind_mismatch",
            Category::RepeatedLabel => "repeated_label",
            Category::MissingLabel => "missing_label",
            Category::RecursiveRow => "recursive_row",
            Category::RecordWildcard => "record_wildcard",
            Category::ImportNotFound => "import_not_found",
            Category::ImportIo => "import_io",
            Category::UnknownSynonym => "unknown_synonym",
            Category::DuplicateSynonym => "duplicate_synonym",
            Category::SynonymArity => "synonym_arity",
            Category::RecursiveSynonym => "recursive_synonym",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::Syntax => "E0001",
            Category::UnboundVariable => "E0002",
            Category::UnboundTypeVariable => "E0003",
            Category::ConstraintScope => "E0004",
            Category::TypeMismatch => "E0101",
            Category::OccursCheck => "E0102",
            Category::KindMismatch => "E0103",
            Category::RepeatedLabel => "E0104",
            Category::MissingLabel => "E0105",
            Category::RecursiveRow => "E0106",
            Category::RecordWildcard => "E0107",
            Category::ImportNotFound => "E0201",
            Category::ImportIo => "E0202",
            Category::UnknownSynonym => "E0301",
            Category::DuplicateSynonym => "E0302",
            Category::SynonymArity => "E0303",
            Category::RecursiveSynonym => "E0304",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Syntax => "Source text is not valid Tern syntax.",
            Category::UnboundVariable => "A referenced term variable is not in scope.",
            Category::UnboundTypeVariable => {
                "A type annotation mentions a variable not bound by any forall."
            }
            Category::ConstraintScope => {
                "A constraint refers to a type variable missing from the binder list."
            }
            Category::TypeMismatch => "Two types were required to be equal but are not.",
            Category::OccursCheck => "A type variable would have to contain itself.",
            Category::KindMismatch => "A row was used as an ordinary type or vice versa.",
            Category::RepeatedLabel => "A row contains the same label more than once.",
            Category::MissingLabel => "A label cannot be inserted into a closed row.",
            Category::RecursiveRow => "Row unification produced a row containing itself.",
            Category::RecordWildcard => {
                "A record wildcard binder requires a closed record type."
            }
            Category::ImportNotFound => "An imported file exists in no library directory.",
            Category::ImportIo => "An imported file could not be read.",
            Category::UnknownSynonym => "A type synonym is used but never declared.",
            Category::DuplicateSynonym => "A type synonym is declared more than once.",
            Category::SynonymArity => {
                "A type synonym was applied to the wrong number of arguments."
            }
            Category::RecursiveSynonym => "A type synonym unfolds into itself forever.",
        }
    }
}

// ---------------------------------------------------------------------------
// Source locations (independent of tern-ast's Span)
// ---------------------------------------------------------------------------

/// A source location for diagnostics.
///
/// Uses byte offsets. Callers convert from `tern-ast` spans to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

/// Convert a byte offset into a 1-based (line, column) pair.
///
/// Columns count bytes, which is exact for the ASCII-operator-heavy sources
/// Tern programs tend to be.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let clamped = offset.min(source.len());
    let before = &source[..clamped];
    let line = before.bytes().filter(|b| *b == b'\n').count() + 1;
    let col = before.rfind('\n').map_or(clamped + 1, |nl| clamped - nl);
    (line, col)
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
///
/// Every diagnostic carries enough context to produce an actionable error
/// message without exposing internal compiler state.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0101).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// Additional labeled spans (e.g. "the other type came from here").
    pub labels: Vec<DiagLabel>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone)]
pub struct DiagLabel {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Warning,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_label(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            location,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}

impl From<Diagnostic> for DiagnosticError {
    fn from(diag: Diagnostic) -> Self {
        Self::single(diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let loc = SourceLocation {
            file_id: 0,
            start: 10,
            end: 20,
        };
        let diag = Diagnostic::error(Category::TypeMismatch, "expected Int, got Bool")
            .at(loc)
            .with_help("annotate the expression");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("E0101"));
        assert_eq!(diag.category, Category::TypeMismatch);
        assert!(diag.message.contains("expected Int"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(Category::OccursCheck, "occurs check fails");
        let s = format!("{diag}");
        assert!(s.starts_with("error[E0102]: occurs check fails"));
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }

    #[test]
    fn line_col_counts_from_one() {
        let src = "ab\ncd\nef";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 1), (1, 2));
        assert_eq!(line_col(src, 3), (2, 1));
        assert_eq!(line_col(src, 7), (3, 2));
    }
}
