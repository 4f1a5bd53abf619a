//! Type representations for Tern.
//!
//! This crate defines the semantic types used by the unifier and the
//! inference engine. These are distinct from syntactic type annotations
//! (which live in `tern-ast`).
//!
//! Rows are kept as right-nested [`TypeKind::RowExtend`] spines terminating
//! in [`TypeKind::RowEmpty`] or a row-kinded variable. Spines are linearised
//! on demand and never sorted destructively; display sorts labels for
//! readability only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tern_ast::{ClassName, Span};

// ---------------------------------------------------------------------------
// Labels and type variables
// ---------------------------------------------------------------------------

/// A record/variant field label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a type variable during inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVarId(pub u32);

/// Kind of a type-level entity: ordinary type or row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Star,
    Row,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Star => write!(f, "*"),
            Kind::Row => write!(f, "row"),
        }
    }
}

/// Where a type variable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Flavour {
    /// Bound by a `forall` in an annotation or synonym declaration.
    Bound,
    /// A `_` hole in an annotation; instantiated freely.
    Wildcard,
    /// Allocated by the inferencer.
    Inferred,
}

/// Constraint carried on a type variable.
///
/// Class constraints apply only to star-kinded variables, lacks constraints
/// only to row-kinded ones. Class constraints are parsed and carried but not
/// enforced during unification.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TyVarConstraint {
    None,
    Class(ClassName),
    /// Labels the row variable must never contain.
    Lacks(BTreeSet<Label>),
}

impl TyVarConstraint {
    pub fn lacks(labels: impl IntoIterator<Item = Label>) -> Self {
        Self::Lacks(labels.into_iter().collect())
    }

    /// The lacked label set, empty for non-row constraints.
    pub fn lacks_labels(&self) -> BTreeSet<Label> {
        match self {
            TyVarConstraint::Lacks(labels) => labels.clone(),
            _ => BTreeSet::new(),
        }
    }
}

/// A unification variable. The id is the identity; prefix, kind, flavour and
/// constraint ride along with it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TyVar {
    pub id: TyVarId,
    /// One-character display prefix.
    pub prefix: char,
    pub kind: Kind,
    pub flavour: Flavour,
    pub constraint: TyVarConstraint,
}

impl TyVar {
    pub fn display_name(&self) -> String {
        format!("{}{}", self.prefix, self.id.0)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type with its source position.
///
/// Equality ignores the span: positions are provenance, not identity.
#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    pub span: Span,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Type {}

impl Type {
    pub fn new(kind: TypeKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn var(tv: TyVar, span: Span) -> Self {
        Self::new(TypeKind::Var(tv), span)
    }

    pub fn fun(dom: Type, cod: Type, span: Span) -> Self {
        Self::new(TypeKind::Fun(Box::new(dom), Box::new(cod)), span)
    }

    pub fn list(elem: Type, span: Span) -> Self {
        Self::new(TypeKind::List(Box::new(elem)), span)
    }

    pub fn record(row: Type, span: Span) -> Self {
        Self::new(TypeKind::Record(Box::new(row)), span)
    }

    pub fn variant(row: Type, span: Span) -> Self {
        Self::new(TypeKind::Variant(Box::new(row)), span)
    }

    /// The variable at the root of this type, if any.
    pub fn as_var(&self) -> Option<&TyVar> {
        match &self.kind {
            TypeKind::Var(tv) => Some(tv),
            _ => None,
        }
    }

    /// Whether this node is row-kinded (a spine node or a row variable).
    pub fn is_row(&self) -> bool {
        match &self.kind {
            TypeKind::RowEmpty | TypeKind::RowExtend(_, _, _) => true,
            TypeKind::Var(tv) => tv.kind == Kind::Row,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    // -- Ground types --
    Int,
    Dbl,
    Bool,
    Char,
    Text,

    // -- Constructors --
    List(Box<Type>),
    Fun(Box<Type>, Box<Type>),
    Record(Box<Type>),
    Variant(Box<Type>),
    /// A not-yet-unfolded synonym use. The annotation resolver expands these
    /// before inference; the unifier treats a surviving one nominally.
    Synonym(String, Vec<Type>),

    // -- Variables --
    Var(TyVar),

    // -- Rows --
    RowEmpty,
    RowExtend(Label, Box<Type>, Box<Type>),

    // -- Quantification --
    Forall(Vec<TyVar>, Box<Type>),
}

// ---------------------------------------------------------------------------
// Row spine helpers
// ---------------------------------------------------------------------------

/// Linearise a row spine into its fields and optional tail variable.
///
/// The spine invariant (every row ends in `RowEmpty` or a row-kinded
/// variable) is established by the parser and preserved by unification.
pub fn row_to_list(row: &Type) -> (Vec<(Label, Type)>, Option<TyVar>) {
    let mut fields = Vec::new();
    let mut current = row;
    loop {
        match &current.kind {
            TypeKind::RowEmpty => return (fields, None),
            TypeKind::RowExtend(label, ty, rest) => {
                fields.push((label.clone(), (**ty).clone()));
                current = rest;
            }
            TypeKind::Var(tv) => {
                debug_assert_eq!(tv.kind, Kind::Row, "row spine tail must be row-kinded");
                return (fields, Some(tv.clone()));
            }
            _ => {
                debug_assert!(false, "malformed row spine: {current}");
                return (fields, None);
            }
        }
    }
}

/// Build a canonical right-nested spine over `tail` from `fields`.
pub fn mk_row_type(tail: Type, fields: Vec<(Label, Type)>, span: Span) -> Type {
    fields.into_iter().rev().fold(tail, |rest, (label, ty)| {
        Type::new(TypeKind::RowExtend(label, Box::new(ty), Box::new(rest)), span)
    })
}

/// The `label -> type` mapping of a row. Rejects duplicate labels, returning
/// the first repeated one.
pub fn row_to_map(row: &Type) -> Result<(BTreeMap<Label, Type>, Option<TyVar>), Label> {
    let (fields, tail) = row_to_list(row);
    let mut map = BTreeMap::new();
    for (label, ty) in fields {
        if map.insert(label.clone(), ty).is_some() {
            return Err(label);
        }
    }
    Ok((map, tail))
}

// ---------------------------------------------------------------------------
// Free variable computation
// ---------------------------------------------------------------------------

/// Collect all free type variables of a type, ordered by id.
///
/// The map form (id to variable) keeps the kind/constraint metadata that
/// generalisation needs when quantifying.
pub fn free_ty_vars(ty: &Type) -> BTreeMap<TyVarId, TyVar> {
    let mut vars = BTreeMap::new();
    collect_free_ty_vars(ty, &mut vars);
    vars
}

fn collect_free_ty_vars(ty: &Type, vars: &mut BTreeMap<TyVarId, TyVar>) {
    match &ty.kind {
        TypeKind::Var(tv) => {
            vars.entry(tv.id).or_insert_with(|| tv.clone());
        }
        TypeKind::List(inner) | TypeKind::Record(inner) | TypeKind::Variant(inner) => {
            collect_free_ty_vars(inner, vars);
        }
        TypeKind::Fun(dom, cod) => {
            collect_free_ty_vars(dom, vars);
            collect_free_ty_vars(cod, vars);
        }
        TypeKind::Synonym(_, args) => {
            for arg in args {
                collect_free_ty_vars(arg, vars);
            }
        }
        TypeKind::RowExtend(_, field, rest) => {
            collect_free_ty_vars(field, vars);
            collect_free_ty_vars(rest, vars);
        }
        TypeKind::Forall(bound, body) => {
            let mut inner = free_ty_vars(body);
            for tv in bound {
                inner.remove(&tv.id);
            }
            vars.extend(inner);
        }
        TypeKind::Int
        | TypeKind::Dbl
        | TypeKind::Bool
        | TypeKind::Char
        | TypeKind::Text
        | TypeKind::RowEmpty => {}
    }
}

// ---------------------------------------------------------------------------
// Type schemes
// ---------------------------------------------------------------------------

/// A type scheme: `forall vs. T`.
///
/// Schemes arise from let-generalisation. The quantified [`TyVar`]s keep
/// their kinds and constraints so instantiation can mint fresh variables
/// with identical metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    pub vars: Vec<TyVar>,
    pub ty: Type,
}

impl Scheme {
    /// Create a monomorphic scheme (no quantified variables).
    pub fn mono(ty: Type) -> Self {
        Self {
            vars: Vec::new(),
            ty,
        }
    }

    pub fn is_mono(&self) -> bool {
        self.vars.is_empty()
    }

    /// Free variables of the scheme body minus the quantified ones.
    pub fn free_ty_vars(&self) -> BTreeMap<TyVarId, TyVar> {
        let mut vars = free_ty_vars(&self.ty);
        for tv in &self.vars {
            vars.remove(&tv.id);
        }
        vars
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// A finite mapping from type-variable ids to types.
///
/// `apply` chases bindings to a fixed point, so compositions stay
/// observationally idempotent even when targets are themselves variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    map: BTreeMap<TyVarId, Type>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(id: TyVarId, ty: Type) -> Self {
        let mut map = BTreeMap::new();
        map.insert(id, ty);
        Self { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn bind(&mut self, id: TyVarId, ty: Type) {
        self.map.insert(id, ty);
    }

    pub fn lookup(&self, id: TyVarId) -> Option<&Type> {
        self.map.get(&id)
    }

    pub fn domain(&self) -> impl Iterator<Item = TyVarId> + '_ {
        self.map.keys().copied()
    }

    pub fn contains(&self, id: TyVarId) -> bool {
        self.map.contains_key(&id)
    }

    /// Apply this substitution to a type, replacing all bound variables.
    pub fn apply(&self, ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Var(tv) => match self.lookup(tv.id) {
                Some(resolved) => self.apply(resolved),
                None => ty.clone(),
            },
            TypeKind::List(inner) => Type::new(
                TypeKind::List(Box::new(self.apply(inner))),
                ty.span,
            ),
            TypeKind::Record(row) => Type::new(
                TypeKind::Record(Box::new(self.apply(row))),
                ty.span,
            ),
            TypeKind::Variant(row) => Type::new(
                TypeKind::Variant(Box::new(self.apply(row))),
                ty.span,
            ),
            TypeKind::Fun(dom, cod) => Type::new(
                TypeKind::Fun(Box::new(self.apply(dom)), Box::new(self.apply(cod))),
                ty.span,
            ),
            TypeKind::Synonym(name, args) => Type::new(
                TypeKind::Synonym(name.clone(), args.iter().map(|t| self.apply(t)).collect()),
                ty.span,
            ),
            TypeKind::RowExtend(label, field, rest) => Type::new(
                TypeKind::RowExtend(
                    label.clone(),
                    Box::new(self.apply(field)),
                    Box::new(self.apply(rest)),
                ),
                ty.span,
            ),
            TypeKind::Forall(bound, body) => {
                let mut shadowed = self.clone();
                for tv in bound {
                    shadowed.map.remove(&tv.id);
                }
                Type::new(
                    TypeKind::Forall(bound.clone(), Box::new(shadowed.apply(body))),
                    ty.span,
                )
            }
            TypeKind::Int
            | TypeKind::Dbl
            | TypeKind::Bool
            | TypeKind::Char
            | TypeKind::Text
            | TypeKind::RowEmpty => ty.clone(),
        }
    }

    /// Apply this substitution to a scheme body, shadowing its quantified
    /// variables.
    pub fn apply_scheme(&self, scheme: &Scheme) -> Scheme {
        let mut shadowed = self.clone();
        for tv in &scheme.vars {
            shadowed.map.remove(&tv.id);
        }
        Scheme {
            vars: scheme.vars.clone(),
            ty: shadowed.apply(&scheme.ty),
        }
    }

    /// Compose two substitutions: `self` is the newer one.
    ///
    /// `self.compose(&older)` applies `self` to the range of `older`, then
    /// unions, preferring `self`'s bindings on key conflicts. Satisfies
    /// `compose(s2, s1).apply(t) == s2.apply(&s1.apply(t))`.
    pub fn compose(&self, older: &Substitution) -> Substitution {
        let mut map: BTreeMap<TyVarId, Type> = older
            .map
            .iter()
            .map(|(id, ty)| (*id, self.apply(ty)))
            .collect();
        for (id, ty) in &self.map {
            map.insert(*id, ty.clone());
        }
        Substitution { map }
    }
}

// ---------------------------------------------------------------------------
// Display (user-facing surface syntax)
// ---------------------------------------------------------------------------

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(f, self, &BTreeMap::new())
    }
}

/// Render a type using explicit display names for some variables.
pub fn display_with_names(ty: &Type, names: &BTreeMap<TyVarId, String>) -> String {
    struct Helper<'a>(&'a Type, &'a BTreeMap<TyVarId, String>);
    impl fmt::Display for Helper<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write_type(f, self.0, self.1)
        }
    }
    Helper(ty, names).to_string()
}

fn var_name(tv: &TyVar, names: &BTreeMap<TyVarId, String>) -> String {
    names
        .get(&tv.id)
        .cloned()
        .unwrap_or_else(|| tv.display_name())
}

fn write_type(f: &mut fmt::Formatter<'_>, ty: &Type, names: &BTreeMap<TyVarId, String>) -> fmt::Result {
    match &ty.kind {
        TypeKind::Int => write!(f, "Int"),
        TypeKind::Dbl => write!(f, "Dbl"),
        TypeKind::Bool => write!(f, "Bool"),
        TypeKind::Char => write!(f, "Char"),
        TypeKind::Text => write!(f, "Text"),
        TypeKind::List(inner) => {
            write!(f, "[")?;
            write_type(f, inner, names)?;
            write!(f, "]")
        }
        TypeKind::Fun(dom, cod) => {
            let parens = matches!(dom.kind, TypeKind::Fun(_, _) | TypeKind::Forall(_, _));
            if parens {
                write!(f, "(")?;
            }
            write_type(f, dom, names)?;
            if parens {
                write!(f, ")")?;
            }
            write!(f, " -> ")?;
            write_type(f, cod, names)
        }
        TypeKind::Record(row) => {
            write!(f, "{{")?;
            write_row(f, row, names)?;
            write!(f, "}}")
        }
        TypeKind::Variant(row) => {
            write!(f, "<")?;
            write_row(f, row, names)?;
            write!(f, ">")
        }
        TypeKind::Synonym(name, args) => {
            write!(f, "{name}")?;
            for arg in args {
                let atom = !matches!(
                    arg.kind,
                    TypeKind::Fun(_, _) | TypeKind::Forall(_, _) | TypeKind::Synonym(_, _)
                );
                if atom {
                    write!(f, " ")?;
                    write_type(f, arg, names)?;
                } else {
                    write!(f, " (")?;
                    write_type(f, arg, names)?;
                    write!(f, ")")?;
                }
            }
            Ok(())
        }
        TypeKind::Var(tv) => write!(f, "{}", var_name(tv, names)),
        TypeKind::RowEmpty | TypeKind::RowExtend(_, _, _) => {
            write!(f, "(")?;
            write_row(f, ty, names)?;
            write!(f, ")")
        }
        TypeKind::Forall(vars, body) => {
            write!(f, "forall")?;
            for tv in vars {
                write!(f, " {}", var_name(tv, names))?;
            }
            write!(f, ". ")?;
            write_type(f, body, names)
        }
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, row: &Type, names: &BTreeMap<TyVarId, String>) -> fmt::Result {
    let (mut fields, tail) = row_to_list(row);
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (i, (label, ty)) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{label}: ")?;
        write_type(f, ty, names)?;
    }
    if let Some(tv) = tail {
        if !fields.is_empty() {
            write!(f, " | ")?;
        }
        write!(f, "{}", var_name(&tv, names))?;
    }
    Ok(())
}

/// Generate alphabetic variable names: a, b, c, ..., z, a1, b1, ...
fn alphabetic_var_name(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    let suffix = index / 26;
    if suffix == 0 {
        letter.to_string()
    } else {
        format!("{letter}{suffix}")
    }
}

/// Canonical display names for a scheme's quantified variables: star-kinded
/// variables become `a`, `b`, ...; row-kinded variables become `ra`, `rb`, ...
pub fn scheme_display_names(scheme: &Scheme) -> BTreeMap<TyVarId, String> {
    let mut names = BTreeMap::new();
    let mut star = 0usize;
    let mut row = 0usize;
    for tv in &scheme.vars {
        let name = match tv.kind {
            Kind::Star => {
                let n = alphabetic_var_name(star);
                star += 1;
                n
            }
            Kind::Row => {
                let n = format!("r{}", alphabetic_var_name(row));
                row += 1;
                n
            }
        };
        names.insert(tv.id, name);
    }
    names
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vars.is_empty() {
            return write!(f, "{}", self.ty);
        }
        let names = scheme_display_names(self);

        // Star variables first, then row variables; purely cosmetic.
        let mut ordered: Vec<&TyVar> = self.vars.iter().filter(|v| v.kind == Kind::Star).collect();
        ordered.extend(self.vars.iter().filter(|v| v.kind == Kind::Row));

        write!(f, "forall")?;
        for tv in &ordered {
            write!(f, " {}", names[&tv.id])?;
        }
        write!(f, ".")?;

        let mut constraints = Vec::new();
        for tv in &ordered {
            match &tv.constraint {
                TyVarConstraint::None => {}
                TyVarConstraint::Class(class) => {
                    constraints.push(format!("{class} {}", names[&tv.id]));
                }
                TyVarConstraint::Lacks(labels) => {
                    for label in labels {
                        constraints.push(format!("{}\\{label}", names[&tv.id]));
                    }
                }
            }
        }
        if !constraints.is_empty() {
            write!(f, " ({}) =>", constraints.join(", "))?;
        }
        write!(f, " {}", display_with_names(&self.ty, &names))
    }
}

// ---------------------------------------------------------------------------
// Alpha equivalence
// ---------------------------------------------------------------------------

/// Canonicalise a scheme for alpha-equality comparison: quantified variables
/// are renumbered from zero in order of appearance.
///
/// Renaming is a direct simultaneous walk, not a substitution: renumbering
/// can swap ids, which a chasing `apply` would follow in circles.
pub fn canonicalize_scheme(scheme: &Scheme) -> Scheme {
    let mut mapping = BTreeMap::new();
    let mut canonical_vars = Vec::with_capacity(scheme.vars.len());
    for (idx, tv) in scheme.vars.iter().enumerate() {
        let canonical = TyVar {
            id: TyVarId(idx as u32),
            ..tv.clone()
        };
        mapping.insert(tv.id, canonical.clone());
        canonical_vars.push(canonical);
    }
    Scheme {
        vars: canonical_vars,
        ty: rename_vars(&scheme.ty, &mapping),
    }
}

fn rename_vars(ty: &Type, mapping: &BTreeMap<TyVarId, TyVar>) -> Type {
    let kind = match &ty.kind {
        TypeKind::Var(tv) => match mapping.get(&tv.id) {
            Some(renamed) => TypeKind::Var(renamed.clone()),
            None => TypeKind::Var(tv.clone()),
        },
        TypeKind::List(inner) => TypeKind::List(Box::new(rename_vars(inner, mapping))),
        TypeKind::Record(row) => TypeKind::Record(Box::new(rename_vars(row, mapping))),
        TypeKind::Variant(row) => TypeKind::Variant(Box::new(rename_vars(row, mapping))),
        TypeKind::Fun(dom, cod) => TypeKind::Fun(
            Box::new(rename_vars(dom, mapping)),
            Box::new(rename_vars(cod, mapping)),
        ),
        TypeKind::Synonym(name, args) => TypeKind::Synonym(
            name.clone(),
            args.iter().map(|arg| rename_vars(arg, mapping)).collect(),
        ),
        TypeKind::RowExtend(label, field, rest) => TypeKind::RowExtend(
            label.clone(),
            Box::new(rename_vars(field, mapping)),
            Box::new(rename_vars(rest, mapping)),
        ),
        TypeKind::Forall(bound, body) => {
            let mut shadowed = mapping.clone();
            for tv in bound {
                shadowed.remove(&tv.id);
            }
            TypeKind::Forall(bound.clone(), Box::new(rename_vars(body, &shadowed)))
        }
        ground @ (TypeKind::Int
        | TypeKind::Dbl
        | TypeKind::Bool
        | TypeKind::Char
        | TypeKind::Text
        | TypeKind::RowEmpty) => ground.clone(),
    };
    Type::new(kind, ty.span)
}

/// Whether two schemes are equal up to renaming of quantified variables.
pub fn alpha_equivalent(left: &Scheme, right: &Scheme) -> bool {
    canonicalize_scheme(left) == canonicalize_scheme(right)
}
