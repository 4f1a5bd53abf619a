//! Expression-level type inference with let-generalisation.
//!
//! This module walks elaborated expressions and infers principal types with
//! Algorithm W:
//!
//! - `let` bindings generalise over variables not free in the environment,
//! - each use of a polymorphic binding instantiates fresh variables that
//!   keep the quantified variables' kinds and constraints,
//! - primitives are typed from a closed table, with row variables carrying
//!   the lacks constraints their labels require.
//!
//! Type annotations arrive as syntactic trees; [`resolve_annotation`] turns
//! them into semantic types, minting fresh variables for `forall` binders
//! and wildcards and unfolding synonyms along the way.

use std::collections::{BTreeMap, BTreeSet};

use tern_ast::{
    AnnConstraint, Binder, BinderKind, Expr, ExprKind, Prim, Span, SynonymDecl, TypeAnn,
    TypeAnnKind,
};
use tern_diag::{Category, Diagnostic};
use tern_types::{
    Flavour, Kind, Label, Scheme, Substitution, TyVarConstraint, TyVarId, Type, TypeKind,
    free_ty_vars, mk_row_type, row_to_list,
};

use crate::{Inferencer, span_to_location};

// ---------------------------------------------------------------------------
// Type environment
// ---------------------------------------------------------------------------

/// Mapping from term names to type schemes.
///
/// Environments are small and short-lived; extension clones, which keeps the
/// reader-style scoping of Algorithm W obvious.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    bindings: BTreeMap<String, Scheme>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, scheme: Scheme) {
        self.bindings.insert(name.into(), scheme);
    }

    pub fn remove(&mut self, name: &str) {
        self.bindings.remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<&Scheme> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scheme)> {
        self.bindings.iter()
    }

    /// Ids free in the environment after applying `subst` to every scheme.
    pub fn free_ty_var_ids(&self, subst: &Substitution) -> BTreeSet<TyVarId> {
        let mut ids = BTreeSet::new();
        for scheme in self.bindings.values() {
            let resolved = subst.apply_scheme(scheme);
            ids.extend(resolved.free_ty_vars().into_keys());
        }
        ids
    }
}

// ---------------------------------------------------------------------------
// Synonym table
// ---------------------------------------------------------------------------

/// Synonym declarations indexed by name, with duplicate detection.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    map: BTreeMap<String, SynonymDecl>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a flat accumulator of declarations. The same name
    /// declared twice is a conflict, reported with both positions.
    pub fn from_decls(decls: &[SynonymDecl]) -> Result<Self, Diagnostic> {
        let mut table = Self::new();
        for decl in decls {
            if let Some(existing) = table.map.get(&decl.name.node) {
                return Err(Diagnostic::error(
                    Category::DuplicateSynonym,
                    format!("type synonym `{}` is declared more than once", decl.name.node),
                )
                .at(span_to_location(decl.name.span))
                .with_label(span_to_location(existing.name.span), "first declared here"));
            }
            table.map.insert(decl.name.node.clone(), decl.clone());
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&SynonymDecl> {
        self.map.get(name)
    }
}

// ---------------------------------------------------------------------------
// Annotation resolution
// ---------------------------------------------------------------------------

/// Depth guard for synonym unfolding; anything deeper is a cycle.
const MAX_SYNONYM_DEPTH: u32 = 64;

struct ResolveScope {
    /// Binders declared by an enclosing `forall`, not yet used.
    pending: BTreeMap<String, AnnConstraint>,
    /// Binders already materialised as fresh variables.
    resolved: BTreeMap<String, Type>,
}

impl ResolveScope {
    fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            resolved: BTreeMap::new(),
        }
    }
}

/// Turn a syntactic annotation into a semantic type.
///
/// Every `forall` binder and every wildcard becomes a fresh variable, so the
/// returned type is already instantiated and can be unified directly. Binder
/// variables keep the kinds and constraints their declarations imply; a
/// binder without a constraint takes its kind from its first use site.
pub fn resolve_annotation(
    inf: &mut Inferencer,
    synonyms: &SynonymTable,
    ann: &TypeAnn,
) -> Result<Type, Diagnostic> {
    let mut scope = ResolveScope::new();
    resolve_ann(inf, synonyms, ann, &mut scope, Kind::Star, 0)
}

fn resolve_ann(
    inf: &mut Inferencer,
    synonyms: &SynonymTable,
    ann: &TypeAnn,
    scope: &mut ResolveScope,
    position: Kind,
    depth: u32,
) -> Result<Type, Diagnostic> {
    let span = ann.span;
    match &ann.node {
        TypeAnnKind::Int => Ok(Type::new(TypeKind::Int, span)),
        TypeAnnKind::Dbl => Ok(Type::new(TypeKind::Dbl, span)),
        TypeAnnKind::Bool => Ok(Type::new(TypeKind::Bool, span)),
        TypeAnnKind::Char => Ok(Type::new(TypeKind::Char, span)),
        TypeAnnKind::Text => Ok(Type::new(TypeKind::Text, span)),

        TypeAnnKind::List(elem) => {
            let elem = resolve_ann(inf, synonyms, elem, scope, Kind::Star, depth)?;
            Ok(Type::list(elem, span))
        }
        TypeAnnKind::Fun(dom, cod) => {
            let dom = resolve_ann(inf, synonyms, dom, scope, Kind::Star, depth)?;
            let cod = resolve_ann(inf, synonyms, cod, scope, Kind::Star, depth)?;
            Ok(Type::fun(dom, cod, span))
        }
        TypeAnnKind::Record(row) => {
            let row = resolve_row_ann(inf, synonyms, row, scope, depth)?;
            Ok(Type::record(row, span))
        }
        TypeAnnKind::Variant(row) => {
            let row = resolve_row_ann(inf, synonyms, row, scope, depth)?;
            Ok(Type::variant(row, span))
        }
        TypeAnnKind::RowEmpty | TypeAnnKind::RowExtend(_, _, _) => {
            resolve_row_ann(inf, synonyms, ann, scope, depth)
        }

        TypeAnnKind::Var(name) => {
            if let Some(existing) = scope.resolved.get(name) {
                let var = existing.as_var().expect("binders resolve to variables");
                if var.kind != position {
                    return Err(Diagnostic::error(
                        Category::KindMismatch,
                        format!(
                            "type variable `{name}` is used both as an ordinary type and as a row"
                        ),
                    )
                    .at(span_to_location(span)));
                }
                let mut ty = existing.clone();
                ty.span = span;
                return Ok(ty);
            }
            let Some(constraint) = scope.pending.remove(name) else {
                return Err(Diagnostic::error(
                    Category::UnboundTypeVariable,
                    format!("unbound type variable(s): {name}"),
                )
                .at(span_to_location(span)));
            };
            let (kind, constraint) = match constraint {
                AnnConstraint::Class(class) => {
                    if position == Kind::Row {
                        return Err(Diagnostic::error(
                            Category::KindMismatch,
                            format!(
                                "type variable `{name}` has a class constraint but is used as a row"
                            ),
                        )
                        .at(span_to_location(span)));
                    }
                    (Kind::Star, TyVarConstraint::Class(class))
                }
                AnnConstraint::Lacks(labels) => {
                    if position == Kind::Star {
                        return Err(Diagnostic::error(
                            Category::KindMismatch,
                            format!(
                                "type variable `{name}` has a lacks constraint but is used as an ordinary type"
                            ),
                        )
                        .at(span_to_location(span)));
                    }
                    (
                        Kind::Row,
                        TyVarConstraint::lacks(labels.into_iter().map(Label::new)),
                    )
                }
                AnnConstraint::None => match position {
                    Kind::Star => (Kind::Star, TyVarConstraint::None),
                    Kind::Row => (Kind::Row, TyVarConstraint::lacks([])),
                },
            };
            let prefix = name.chars().next().unwrap_or('a');
            let fresh = inf.fresh_flavoured(span, kind, constraint, Flavour::Bound, prefix);
            scope.resolved.insert(name.clone(), fresh.clone());
            Ok(fresh)
        }

        TypeAnnKind::Wildcard => {
            let constraint = match position {
                Kind::Star => TyVarConstraint::None,
                Kind::Row => TyVarConstraint::lacks([]),
            };
            Ok(inf.fresh_flavoured(span, position, constraint, Flavour::Wildcard, '_'))
        }

        TypeAnnKind::Forall(binders, body) => {
            // Shadow outer binders of the same name for the body.
            let mut saved = Vec::new();
            for binder in binders {
                let old_pending = scope
                    .pending
                    .insert(binder.name.clone(), binder.constraint.clone());
                let old_resolved = scope.resolved.remove(&binder.name);
                saved.push((binder.name.clone(), old_pending, old_resolved));
            }
            let result = resolve_ann(inf, synonyms, body, scope, position, depth);
            for (name, old_pending, old_resolved) in saved.into_iter().rev() {
                match old_pending {
                    Some(c) => {
                        scope.pending.insert(name.clone(), c);
                    }
                    None => {
                        scope.pending.remove(&name);
                    }
                }
                match old_resolved {
                    Some(ty) => {
                        scope.resolved.insert(name, ty);
                    }
                    None => {
                        scope.resolved.remove(&name);
                    }
                }
            }
            result
        }

        TypeAnnKind::Synonym(name, args) => {
            if depth >= MAX_SYNONYM_DEPTH {
                return Err(Diagnostic::error(
                    Category::RecursiveSynonym,
                    format!("type synonym `{name}` expands recursively"),
                )
                .at(span_to_location(span)));
            }
            let Some(decl) = synonyms.get(name) else {
                return Err(Diagnostic::error(
                    Category::UnknownSynonym,
                    format!("unknown type synonym `{name}`"),
                )
                .at(span_to_location(span)));
            };
            if args.len() != decl.params.len() {
                return Err(Diagnostic::error(
                    Category::SynonymArity,
                    format!(
                        "type synonym `{name}` expects {} argument(s), got {}",
                        decl.params.len(),
                        args.len()
                    ),
                )
                .at(span_to_location(span)));
            }
            let decl = decl.clone();

            // Resolve the body with the formals in scope; their kinds are
            // fixed by how the body uses them. Then resolve each argument at
            // its formal's kind and substitute it in.
            let mut body_scope = ResolveScope::new();
            for param in &decl.params {
                body_scope
                    .pending
                    .insert(param.node.clone(), AnnConstraint::None);
            }
            let body = resolve_ann(inf, synonyms, &decl.body, &mut body_scope, position, depth + 1)?;

            let mut subst = Substitution::new();
            for (param, arg_ann) in decl.params.iter().zip(args.iter()) {
                match body_scope.resolved.get(&param.node) {
                    Some(formal) => {
                        let formal = formal.as_var().expect("formals resolve to variables");
                        let arg =
                            resolve_ann(inf, synonyms, arg_ann, scope, formal.kind, depth + 1)?;
                        subst.bind(formal.id, arg);
                    }
                    None => {
                        // The body never mentions this formal; still resolve
                        // the argument so its own errors surface.
                        resolve_ann(inf, synonyms, arg_ann, scope, Kind::Star, depth + 1)?;
                    }
                }
            }
            Ok(subst.apply(&body))
        }
    }
}

/// Resolve a row annotation spine.
///
/// An open tail inherits a lacks constraint for every label written above
/// it, in addition to any `r \ l` constraints its binder declares. This is
/// what keeps the row-spine invariant true for annotation-supplied rows.
fn resolve_row_ann(
    inf: &mut Inferencer,
    synonyms: &SynonymTable,
    row: &TypeAnn,
    scope: &mut ResolveScope,
    depth: u32,
) -> Result<Type, Diagnostic> {
    let mut fields = Vec::new();
    let mut current = row;
    loop {
        match &current.node {
            TypeAnnKind::RowExtend(label, field, rest) => {
                let field = resolve_ann(inf, synonyms, field, scope, Kind::Star, depth)?;
                fields.push((Label::new(label.clone()), field));
                current = rest;
            }
            TypeAnnKind::RowEmpty => {
                let tail = Type::new(TypeKind::RowEmpty, current.span);
                return Ok(mk_row_type(tail, fields, row.span));
            }
            TypeAnnKind::Var(name) => {
                let span = current.span;
                let labels_above: BTreeSet<Label> =
                    fields.iter().map(|(l, _)| l.clone()).collect();
                let tail = if let Some(existing) = scope.resolved.get(name) {
                    let var = existing.as_var().expect("binders resolve to variables");
                    if var.kind != Kind::Row {
                        return Err(Diagnostic::error(
                            Category::KindMismatch,
                            format!(
                                "type variable `{name}` is used both as an ordinary type and as a row"
                            ),
                        )
                        .at(span_to_location(span)));
                    }
                    existing.clone()
                } else {
                    let Some(constraint) = scope.pending.remove(name) else {
                        return Err(Diagnostic::error(
                            Category::UnboundTypeVariable,
                            format!("unbound type variable(s): {name}"),
                        )
                        .at(span_to_location(span)));
                    };
                    let mut lacks = labels_above;
                    match constraint {
                        AnnConstraint::None => {}
                        AnnConstraint::Lacks(declared) => {
                            lacks.extend(declared.into_iter().map(Label::new));
                        }
                        AnnConstraint::Class(_) => {
                            return Err(Diagnostic::error(
                                Category::KindMismatch,
                                format!(
                                    "type variable `{name}` has a class constraint but is used as a row"
                                ),
                            )
                            .at(span_to_location(span)));
                        }
                    }
                    let prefix = name.chars().next().unwrap_or('r');
                    let fresh = inf.fresh_flavoured(
                        span,
                        Kind::Row,
                        TyVarConstraint::Lacks(lacks),
                        Flavour::Bound,
                        prefix,
                    );
                    scope.resolved.insert(name.clone(), fresh.clone());
                    fresh
                };
                return Ok(mk_row_type(tail, fields, row.span));
            }
            TypeAnnKind::Wildcard => {
                let labels_above: BTreeSet<Label> =
                    fields.iter().map(|(l, _)| l.clone()).collect();
                let tail = inf.fresh_flavoured(
                    current.span,
                    Kind::Row,
                    TyVarConstraint::Lacks(labels_above),
                    Flavour::Wildcard,
                    '_',
                );
                return Ok(mk_row_type(tail, fields, row.span));
            }
            _ => {
                let tail = resolve_ann(inf, synonyms, current, scope, Kind::Row, depth)?;
                return Ok(mk_row_type(tail, fields, row.span));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Generalisation and instantiation
// ---------------------------------------------------------------------------

/// Generalise a type into a scheme by quantifying over variables free in
/// the type but not free in the environment.
pub fn generalize(inf: &Inferencer, env: &TypeEnv, ty: &Type) -> Scheme {
    let ty = inf.apply(ty);
    let env_ids = env.free_ty_var_ids(inf.substitution());
    let vars = free_ty_vars(&ty)
        .into_values()
        .filter(|tv| !env_ids.contains(&tv.id))
        .collect();
    Scheme { vars, ty }
}

/// Instantiate a scheme: each quantified variable is replaced by a fresh
/// one of the same kind and constraint, via a zip substitution.
pub fn instantiate(inf: &mut Inferencer, scheme: &Scheme, span: Span) -> Type {
    if scheme.is_mono() {
        return scheme.ty.clone();
    }
    let mut subst = Substitution::new();
    for tv in &scheme.vars {
        let fresh = inf.fresh_flavoured(
            span,
            tv.kind,
            tv.constraint.clone(),
            Flavour::Inferred,
            tv.prefix,
        );
        subst.bind(tv.id, fresh);
    }
    subst.apply(&scheme.ty)
}

// ---------------------------------------------------------------------------
// Primitive types
// ---------------------------------------------------------------------------

/// The type of a primitive, minted with fresh variables at `span`.
pub fn prim_type(inf: &mut Inferencer, span: Span, prim: &Prim) -> Type {
    let int = || Type::new(TypeKind::Int, span);
    let dbl = || Type::new(TypeKind::Dbl, span);
    let boolean = || Type::new(TypeKind::Bool, span);
    let char_ty = || Type::new(TypeKind::Char, span);
    let text = || Type::new(TypeKind::Text, span);
    let fun = |dom: Type, cod: Type| Type::fun(dom, cod, span);
    let fun2 = |a: Type, b: Type, c: Type| Type::fun(a, Type::fun(b, c, span), span);
    let fun3 =
        |a: Type, b: Type, c: Type, d: Type| Type::fun(a, Type::fun(b, Type::fun(c, d, span), span), span);

    match prim {
        // Literal injectors.
        Prim::Int(_) => int(),
        Prim::Dbl(_) => dbl(),
        Prim::Bool(_) => boolean(),
        Prim::Char(_) => char_ty(),
        Prim::Text(_) => text(),

        // Integer arithmetic.
        Prim::Neg => fun(int(), int()),
        Prim::Add | Prim::Sub | Prim::Mul | Prim::Div | Prim::Mod => fun2(int(), int(), int()),
        Prim::Abs => {
            let a = inf.fresh_ty_var(span, 'a');
            fun(a.clone(), a)
        }
        Prim::Double => fun(int(), dbl()),
        Prim::Floor | Prim::Ceiling => fun(dbl(), int()),

        // Relational and logical.
        Prim::Eq | Prim::NEq | Prim::Gt | Prim::Gte | Prim::Lt | Prim::Lte => {
            let a = inf.fresh_ty_var(span, 'a');
            fun2(a.clone(), a, boolean())
        }
        Prim::And | Prim::Or => fun2(boolean(), boolean(), boolean()),
        Prim::Not => fun(boolean(), boolean()),

        Prim::Cond => {
            let a = inf.fresh_ty_var(span, 'a');
            fun3(boolean(), a.clone(), a.clone(), a)
        }

        // Composition and fixed point.
        Prim::FwdComp => {
            let a = inf.fresh_ty_var(span, 'a');
            let b = inf.fresh_ty_var(span, 'b');
            let c = inf.fresh_ty_var(span, 'c');
            fun2(
                fun(a.clone(), b.clone()),
                fun(b, c.clone()),
                fun(a, c),
            )
        }
        Prim::BwdComp => {
            let a = inf.fresh_ty_var(span, 'a');
            let b = inf.fresh_ty_var(span, 'b');
            let c = inf.fresh_ty_var(span, 'c');
            fun2(
                fun(b.clone(), c.clone()),
                fun(a.clone(), b),
                fun(a, c),
            )
        }
        Prim::Fix => {
            let a = inf.fresh_ty_var(span, 'a');
            fun(fun(a.clone(), a.clone()), a)
        }

        // Lists.
        Prim::ListEmpty => {
            let a = inf.fresh_ty_var(span, 'a');
            Type::list(a, span)
        }
        Prim::ListCons => {
            let a = inf.fresh_ty_var(span, 'a');
            fun2(a.clone(), Type::list(a.clone(), span), Type::list(a, span))
        }
        Prim::ListUncons => {
            let a = inf.fresh_ty_var(span, 'a');
            let empty_record = Type::record(Type::new(TypeKind::RowEmpty, span), span);
            let cons_payload = Type::record(
                mk_row_type(
                    Type::new(TypeKind::RowEmpty, span),
                    vec![
                        (Label::new("head"), a.clone()),
                        (Label::new("tail"), Type::list(a.clone(), span)),
                    ],
                    span,
                ),
                span,
            );
            let outcome = Type::variant(
                mk_row_type(
                    Type::new(TypeKind::RowEmpty, span),
                    vec![
                        (Label::new("Nil"), empty_record),
                        (Label::new("Cons"), cons_payload),
                    ],
                    span,
                ),
                span,
            );
            fun(Type::list(a, span), outcome)
        }
        Prim::ListAppend => {
            let a = inf.fresh_ty_var(span, 'a');
            let list = Type::list(a, span);
            fun2(list.clone(), list.clone(), list)
        }
        Prim::ListFoldr => {
            let a = inf.fresh_ty_var(span, 'a');
            let b = inf.fresh_ty_var(span, 'b');
            fun3(
                fun2(a.clone(), b.clone(), b.clone()),
                b.clone(),
                Type::list(a, span),
                b,
            )
        }
        Prim::ListNull => {
            let a = inf.fresh_ty_var(span, 'a');
            fun(Type::list(a, span), boolean())
        }

        // Text.
        Prim::TextAppend => fun2(text(), text(), text()),
        Prim::Pack => fun(Type::list(char_ty(), span), text()),
        Prim::Unpack => fun(text(), Type::list(char_ty(), span)),
        Prim::Show => {
            let a = inf.fresh_ty_var(span, 'a');
            fun(a, text())
        }

        // Records.
        Prim::RecordEmpty => Type::record(Type::new(TypeKind::RowEmpty, span), span),
        Prim::RecordSelect(label) => {
            let label = Label::new(label.clone());
            let a = inf.fresh_ty_var(span, 'a');
            let row = inf.fresh_row_var(span, [label.clone()]);
            let record = Type::record(
                mk_row_type(row, vec![(label, a.clone())], span),
                span,
            );
            fun(record, a)
        }
        Prim::RecordExtend(label) => {
            let label = Label::new(label.clone());
            let a = inf.fresh_ty_var(span, 'a');
            let row = inf.fresh_row_var(span, [label.clone()]);
            let smaller = Type::record(row.clone(), span);
            let bigger = Type::record(
                mk_row_type(row, vec![(label, a.clone())], span),
                span,
            );
            fun2(a, smaller, bigger)
        }
        Prim::RecordRestrict(label) => {
            let label = Label::new(label.clone());
            let a = inf.fresh_ty_var(span, 'a');
            let row = inf.fresh_row_var(span, [label.clone()]);
            let bigger = Type::record(
                mk_row_type(row.clone(), vec![(label, a)], span),
                span,
            );
            fun(bigger, Type::record(row, span))
        }

        // Variants.
        Prim::VariantInject(label) => {
            let label = Label::new(label.clone());
            let a = inf.fresh_ty_var(span, 'a');
            let row = inf.fresh_row_var(span, [label.clone()]);
            let variant = Type::variant(
                mk_row_type(row, vec![(label, a.clone())], span),
                span,
            );
            fun(a, variant)
        }
        Prim::VariantEmbed(label) => {
            let label = Label::new(label.clone());
            let a = inf.fresh_ty_var(span, 'a');
            let row = inf.fresh_row_var(span, [label.clone()]);
            let smaller = Type::variant(row.clone(), span);
            let bigger = Type::variant(
                mk_row_type(row, vec![(label, a)], span),
                span,
            );
            fun(smaller, bigger)
        }
        Prim::VariantElim(label) => {
            let label = Label::new(label.clone());
            let a = inf.fresh_ty_var(span, 'a');
            let b = inf.fresh_ty_var(span, 'b');
            let row = inf.fresh_row_var(span, [label.clone()]);
            let handler = fun(a.clone(), b.clone());
            let fallback = fun(Type::variant(row.clone(), span), b.clone());
            let scrutinee = Type::variant(
                mk_row_type(row, vec![(label, a)], span),
                span,
            );
            fun3(handler, fallback, scrutinee, b)
        }
        Prim::Absurd => {
            let b = inf.fresh_ty_var(span, 'b');
            fun(Type::variant(Type::new(TypeKind::RowEmpty, span), span), b)
        }

        // Diagnostics.
        Prim::ErrorPrim => {
            let a = inf.fresh_ty_var(span, 'a');
            fun(text(), a)
        }
        Prim::Trace => {
            let a = inf.fresh_ty_var(span, 'a');
            fun(fun(text(), a.clone()), a)
        }
    }
}

// ---------------------------------------------------------------------------
// Binder typing
// ---------------------------------------------------------------------------

/// Type the names a binder introduces against the type of the bound value.
pub fn ti_binds(
    inf: &mut Inferencer,
    binder: &Binder,
    ty: &Type,
) -> Result<Vec<(String, Type)>, Diagnostic> {
    match &binder.node {
        BinderKind::Arg(name) => Ok(vec![(name.clone(), ty.clone())]),

        BinderKind::RecArg(entries) => {
            let mut seen = BTreeSet::new();
            for (label, _) in entries {
                if !seen.insert(label.clone()) {
                    return Err(Diagnostic::error(
                        Category::RepeatedLabel,
                        format!("repeated label(s): {label}"),
                    )
                    .at(span_to_location(binder.span)));
                }
            }

            let mut binds = Vec::new();
            let mut fields = Vec::new();
            for (label, local) in entries {
                let var = inf.fresh_ty_var(binder.span, 'a');
                fields.push((Label::new(label.clone()), var.clone()));
                binds.push((local.clone(), var));
            }
            let tail = inf.fresh_row_var(
                binder.span,
                entries.iter().map(|(label, _)| Label::new(label.clone())),
            );
            let expected = Type::record(mk_row_type(tail, fields, binder.span), binder.span);
            inf.unify(ty, &expected)?;
            Ok(binds)
        }

        BinderKind::RecWildcard => {
            let resolved = inf.apply(ty);
            if let TypeKind::Record(row) = &resolved.kind {
                let (fields, tail) = row_to_list(row);
                if tail.is_none() {
                    return Ok(fields
                        .into_iter()
                        .map(|(label, field_ty)| (label.0, field_ty))
                        .collect());
                }
            }
            Err(Diagnostic::error(
                Category::RecordWildcard,
                format!("record wildcard cannot bind to type: `{resolved}`"),
            )
            .at(span_to_location(binder.span)))
        }
    }
}

// ---------------------------------------------------------------------------
// Algorithm W
// ---------------------------------------------------------------------------

/// Infer the type of an elaborated expression.
pub fn infer(
    inf: &mut Inferencer,
    env: &TypeEnv,
    synonyms: &SynonymTable,
    expr: &Expr,
) -> Result<Type, Diagnostic> {
    let span = expr.span;
    match &expr.node {
        ExprKind::Var(name) => {
            let Some(scheme) = env.lookup(name) else {
                return Err(Diagnostic::error(
                    Category::UnboundVariable,
                    format!("unbound variable `{name}`"),
                )
                .at(span_to_location(span)));
            };
            Ok(instantiate(inf, &scheme.clone(), span))
        }

        ExprKind::Prim(prim) => Ok(prim_type(inf, span, prim)),

        ExprKind::App(f, arg) => {
            let fun_ty = infer(inf, env, synonyms, f)?;
            let arg_ty = infer(inf, env, synonyms, arg)?;
            let result = inf.fresh_ty_var(span, 'a');
            let expected = Type::fun(arg_ty, result.clone(), span);
            inf.unify(&fun_ty, &expected)?;
            Ok(result)
        }

        ExprKind::Lam(binder, body) => {
            let arg = inf.fresh_ty_var(binder.span, 'a');
            infer_lambda(inf, env, synonyms, binder, arg, body, span)
        }

        ExprKind::AnnLam(binder, ann, body) => {
            let arg = resolve_annotation(inf, synonyms, ann)?;
            infer_lambda(inf, env, synonyms, binder, arg, body, span)
        }

        ExprKind::Let(binder, value, body) => {
            let value_ty = infer(inf, env, synonyms, value)?;
            infer_let_body(inf, env, synonyms, binder, value_ty, body)
        }

        ExprKind::AnnLet(binder, ann, value, body) => {
            let value_ty = infer(inf, env, synonyms, value)?;
            let want = resolve_annotation(inf, synonyms, ann)?;
            inf.unify(&value_ty, &want)?;
            infer_let_body(inf, env, synonyms, binder, want, body)
        }

        ExprKind::Ann(inner, ann) => {
            let inner_ty = infer(inf, env, synonyms, inner)?;
            let want = resolve_annotation(inf, synonyms, ann)?;
            inf.unify(&inner_ty, &want)?;
            Ok(want)
        }

        ExprKind::Import(path) => Err(Diagnostic::error(
            Category::Syntax,
            format!("import `{path}` was not resolved before inference"),
        )
        .at(span_to_location(span))),
    }
}

fn infer_lambda(
    inf: &mut Inferencer,
    env: &TypeEnv,
    synonyms: &SynonymTable,
    binder: &Binder,
    arg: Type,
    body: &Expr,
    span: Span,
) -> Result<Type, Diagnostic> {
    let binds = ti_binds(inf, binder, &arg)?;
    let mut inner = env.clone();
    for name in binder.node.bound_names() {
        inner.remove(name);
    }
    for (name, ty) in binds {
        inner.insert(name, Scheme::mono(ty));
    }
    let body_ty = infer(inf, &inner, synonyms, body)?;
    Ok(Type::fun(arg, body_ty, span))
}

fn infer_let_body(
    inf: &mut Inferencer,
    env: &TypeEnv,
    synonyms: &SynonymTable,
    binder: &Binder,
    value_ty: Type,
    body: &Expr,
) -> Result<Type, Diagnostic> {
    let binds = ti_binds(inf, binder, &value_ty)?;
    let mut inner = env.clone();
    for name in binder.node.bound_names() {
        inner.remove(name);
    }
    for (name, _) in &binds {
        inner.remove(name);
    }
    // Generalise against the environment without the new names, then extend.
    let schemes: Vec<(String, Scheme)> = binds
        .into_iter()
        .map(|(name, ty)| {
            let scheme = generalize(inf, &inner, &ty);
            (name, scheme)
        })
        .collect();
    for (name, scheme) in schemes {
        inner.insert(name, scheme);
    }
    infer(inf, &inner, synonyms, body)
}

/// Infer the principal scheme of a whole program expression.
pub fn type_inference(
    env: &TypeEnv,
    synonyms: &SynonymTable,
    expr: &Expr,
) -> Result<Scheme, Diagnostic> {
    let mut inf = Inferencer::new();
    let ty = infer(&mut inf, env, synonyms, expr)?;
    Ok(generalize(&inf, env, &ty))
}
