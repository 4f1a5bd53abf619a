//! AST node definitions and source spans for Tern.
//!
//! This crate defines the abstract syntax tree produced by the parser.
//! Every node carries a [`Span`] for source location tracking.
//!
//! The expression AST is deliberately small: the parser compiles all surface
//! sugar (record literals, variant constructors, `case`, lists, operators)
//! down to applications of the closed [`Prim`] set, so the inferencer only
//! ever sees `Var`/`Prim`/`App`/`Lam`/`Let` and the annotated variants.
//! Type annotations stay syntactic here ([`TypeAnn`]); the semantic types
//! live in `tern-types`.

use std::fmt;

/// Identifies a source file in the compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A byte offset range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// Create a span that covers both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(
            self.file, other.file,
            "cannot merge spans from different files"
        );
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// A synthetic span for compiler-generated nodes.
    pub fn synthetic() -> Self {
        Self {
            file: FileId(u32::MAX),
            start: 0,
            end: 0,
        }
    }
}

/// A value paired with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            node: f(self.node),
            span: self.span,
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Variable reference.
    Var(String),

    /// A primitive constant or operation.
    Prim(Prim),

    /// Function application.
    App(Box<Expr>, Box<Expr>),

    /// Unary lambda. Multi-binder surface lambdas are folded into a nest of
    /// these at parse time.
    Lam(Binder, Box<Expr>),

    /// Lambda with an annotated binder: `\(x : T) -> e`.
    AnnLam(Binder, TypeAnn, Box<Expr>),

    /// `let b = e1 in e2`. A `let x = e1; y = e2 in b` chain right-folds
    /// into nested `Let`s.
    Let(Binder, Box<Expr>, Box<Expr>),

    /// `let b : T = e1 in e2`.
    AnnLet(Binder, TypeAnn, Box<Expr>, Box<Expr>),

    /// Type ascription: `e : T`.
    Ann(Box<Expr>, TypeAnn),

    /// `import "path"`. Only present before import resolution; the resolver
    /// splices the imported expression in place of this node.
    Import(String),
}

/// Binder forms accepted by lambdas and lets.
pub type Binder = Spanned<BinderKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum BinderKind {
    /// A single name: `x`.
    Arg(String),

    /// Record destructuring: `{l1 = x1, l2}`. Each entry is
    /// `(label, local name)`; a pun binds the label to itself.
    RecArg(Vec<(String, String)>),

    /// Record wildcard `{..}`: binds every field of a closed record.
    RecWildcard,
}

impl BinderKind {
    /// Names this binder introduces, where they are statically known.
    ///
    /// `RecWildcard` binds names only the inferencer can discover, so it
    /// contributes nothing here.
    pub fn bound_names(&self) -> Vec<&str> {
        match self {
            BinderKind::Arg(name) => vec![name.as_str()],
            BinderKind::RecArg(entries) => entries.iter().map(|(_, n)| n.as_str()).collect(),
            BinderKind::RecWildcard => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// The closed primitive set. Everything the surface language can express
/// desugars to applications of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Prim {
    // -- Literal injectors --
    Int(i64),
    Dbl(f64),
    Bool(bool),
    Char(char),
    Text(String),

    // -- Arithmetic --
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Mod,
    Abs,
    Floor,
    Ceiling,
    Double,

    // -- Relational --
    Eq,
    NEq,
    Gt,
    Gte,
    Lt,
    Lte,

    // -- Logical --
    And,
    Or,
    Not,

    /// `if`/`then`/`else`.
    Cond,

    // -- Lists --
    ListEmpty,
    ListCons,
    ListUncons,
    ListAppend,
    ListFoldr,
    ListNull,

    // -- Text --
    TextAppend,
    Pack,
    Unpack,
    Show,

    // -- Records --
    RecordEmpty,
    RecordSelect(String),
    RecordExtend(String),
    RecordRestrict(String),

    // -- Variants --
    VariantInject(String),
    VariantEmbed(String),
    VariantElim(String),
    /// Eliminator for the empty variant; terminates every `case` chain.
    Absurd,

    // -- Composition --
    FwdComp,
    BwdComp,

    /// Fixed point combinator.
    Fix,

    // -- Diagnostics --
    ErrorPrim,
    Trace,
}

impl Prim {
    /// The identifier this primitive is reachable through in source text,
    /// if it has one. Operators and sugar-only primitives return `None`.
    pub fn surface_name(&self) -> Option<&'static str> {
        Some(match self {
            Prim::Abs => "abs",
            Prim::Mod => "mod",
            Prim::Floor => "floor",
            Prim::Ceiling => "ceiling",
            Prim::Double => "double",
            Prim::Not => "not",
            Prim::ListUncons => "uncons",
            Prim::ListFoldr => "foldr",
            Prim::ListNull => "null",
            Prim::Pack => "pack",
            Prim::Unpack => "unpack",
            Prim::Show => "show",
            Prim::Fix => "fix",
            Prim::ErrorPrim => "error",
            Prim::Trace => "trace",
            Prim::Absurd => "absurd",
            _ => return None,
        })
    }

    /// Map a surface identifier to its primitive, for the parser.
    pub fn from_surface_name(name: &str) -> Option<Prim> {
        Some(match name {
            "abs" => Prim::Abs,
            "mod" => Prim::Mod,
            "floor" => Prim::Floor,
            "ceiling" => Prim::Ceiling,
            "double" => Prim::Double,
            "not" => Prim::Not,
            "uncons" => Prim::ListUncons,
            "foldr" => Prim::ListFoldr,
            "null" => Prim::ListNull,
            "pack" => Prim::Pack,
            "unpack" => Prim::Unpack,
            "show" => Prim::Show,
            "fix" => Prim::Fix,
            "error" => Prim::ErrorPrim,
            "trace" => Prim::Trace,
            "absurd" => Prim::Absurd,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Syntactic type annotations
// ---------------------------------------------------------------------------

/// A class constraint name: `Eq`, `Ord`, or `Num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassName {
    Eq,
    Ord,
    Num,
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassName::Eq => write!(f, "Eq"),
            ClassName::Ord => write!(f, "Ord"),
            ClassName::Num => write!(f, "Num"),
        }
    }
}

/// A syntactic type annotation (not a semantic type — that's in `tern-types`).
pub type TypeAnn = Spanned<TypeAnnKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnKind {
    Int,
    Dbl,
    Bool,
    Char,
    Text,
    List(Box<TypeAnn>),
    Fun(Box<TypeAnn>, Box<TypeAnn>),
    /// `{ row }`. The payload is a row annotation.
    Record(Box<TypeAnn>),
    /// `< row >`.
    Variant(Box<TypeAnn>),
    /// A synonym use: `C T1 T2`.
    Synonym(String, Vec<TypeAnn>),
    /// A named type variable.
    Var(String),
    /// `_`: a hole the inferencer fills freely.
    Wildcard,
    /// The empty row.
    RowEmpty,
    /// `l : T | rest` inside `{}` or `<>`.
    RowExtend(String, Box<TypeAnn>, Box<TypeAnn>),
    /// `forall a b. (C1, C2) => T`.
    Forall(Vec<AnnBinder>, Box<TypeAnn>),
}

/// One variable bound by a `forall`, with the constraints attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnBinder {
    pub name: String,
    pub constraint: AnnConstraint,
    pub span: Span,
}

/// Constraint attached to a forall binder after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnConstraint {
    None,
    /// `Eq a | Ord a | Num a`.
    Class(ClassName),
    /// `a \ l1`, possibly several: the variable lacks these labels.
    Lacks(std::collections::BTreeSet<String>),
}

impl TypeAnnKind {
    fn is_fun(&self) -> bool {
        matches!(self, TypeAnnKind::Fun(_, _))
    }

    fn is_atom(&self) -> bool {
        match self {
            TypeAnnKind::Fun(_, _) | TypeAnnKind::Forall(_, _) => false,
            TypeAnnKind::Synonym(_, args) => args.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Display for TypeAnnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeAnnKind::Int => write!(f, "Int"),
            TypeAnnKind::Dbl => write!(f, "Dbl"),
            TypeAnnKind::Bool => write!(f, "Bool"),
            TypeAnnKind::Char => write!(f, "Char"),
            TypeAnnKind::Text => write!(f, "Text"),
            TypeAnnKind::List(elem) => write!(f, "[{}]", elem.node),
            TypeAnnKind::Fun(dom, cod) => {
                if dom.node.is_fun() || matches!(dom.node, TypeAnnKind::Forall(_, _)) {
                    write!(f, "({}) -> {}", dom.node, cod.node)
                } else {
                    write!(f, "{} -> {}", dom.node, cod.node)
                }
            }
            TypeAnnKind::Record(row) => {
                write!(f, "{{")?;
                write_row_ann(f, row)?;
                write!(f, "}}")
            }
            TypeAnnKind::Variant(row) => {
                write!(f, "<")?;
                write_row_ann(f, row)?;
                write!(f, ">")
            }
            TypeAnnKind::Synonym(name, args) => {
                write!(f, "{name}")?;
                for arg in args {
                    if arg.node.is_atom() {
                        write!(f, " {}", arg.node)?;
                    } else {
                        write!(f, " ({})", arg.node)?;
                    }
                }
                Ok(())
            }
            TypeAnnKind::Var(name) => write!(f, "{name}"),
            TypeAnnKind::Wildcard => write!(f, "_"),
            TypeAnnKind::RowEmpty => Ok(()),
            TypeAnnKind::RowExtend(_, _, _) => write_row_ann_kind(f, self),
            TypeAnnKind::Forall(binders, body) => {
                write!(f, "forall")?;
                for b in binders {
                    write!(f, " {}", b.name)?;
                }
                write!(f, ".")?;
                let constraints = collect_binder_constraints(binders);
                if !constraints.is_empty() {
                    write!(f, " ({})", constraints.join(", "))?;
                    write!(f, " =>")?;
                }
                write!(f, " {}", body.node)
            }
        }
    }
}

fn collect_binder_constraints(binders: &[AnnBinder]) -> Vec<String> {
    let mut out = Vec::new();
    for b in binders {
        match &b.constraint {
            AnnConstraint::None => {}
            AnnConstraint::Class(class) => out.push(format!("{class} {}", b.name)),
            AnnConstraint::Lacks(labels) => {
                for label in labels {
                    out.push(format!("{}\\{label}", b.name));
                }
            }
        }
    }
    out
}

fn write_row_ann(f: &mut fmt::Formatter<'_>, row: &TypeAnn) -> fmt::Result {
    write_row_ann_kind(f, &row.node)
}

fn write_row_ann_kind(f: &mut fmt::Formatter<'_>, row: &TypeAnnKind) -> fmt::Result {
    let mut current = row;
    let mut first = true;
    loop {
        match current {
            TypeAnnKind::RowEmpty => return Ok(()),
            TypeAnnKind::RowExtend(label, ty, rest) => {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{label}: {}", ty.node)?;
                first = false;
                current = &rest.node;
            }
            tail => {
                if !first {
                    write!(f, " | ")?;
                }
                return write!(f, "{tail}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Synonym declarations
// ---------------------------------------------------------------------------

/// A top-level type synonym declaration: `type C a b = T;`.
///
/// Synonyms are transparent: they are unfolded at use and never partially
/// applied. Conflict detection across files happens when the accumulated
/// list is turned into a table, not at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct SynonymDecl {
    pub span: Span,
    pub name: Spanned<String>,
    /// Formal type parameters, in declaration order.
    pub params: Vec<Spanned<String>>,
    pub body: TypeAnn,
}
