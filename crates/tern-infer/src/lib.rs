//! HM type inference with row unification for Tern.
//!
//! This crate implements:
//! - a most-general unifier with an occurs check and kind discipline,
//! - row rewriting with lacks-constraint propagation,
//! - Algorithm W with let-generalisation (in [`typeck`]).
//!
//! The [`Inferencer`] owns the mutable state of one inference call: the
//! fresh-variable supply and the global substitution. Errors are fatal for
//! the current call — every function short-circuits on the first
//! [`Diagnostic`], so callers see exactly one positioned failure.

pub mod typeck;

#[cfg(test)]
mod prop_tests;
#[cfg(test)]
mod typeck_tests;

use std::collections::BTreeSet;

use tern_ast::Span;
use tern_diag::{Category, Diagnostic, SourceLocation};
use tern_types::{
    Flavour, Kind, Label, Substitution, TyVar, TyVarConstraint, TyVarId, Type, TypeKind,
    free_ty_vars, row_to_list, row_to_map,
};

// Re-export for convenience.
pub use tern_diag::DiagnosticError;
pub use tern_types::Scheme;

/// Convert an AST span into a diagnostic location.
pub fn span_to_location(span: Span) -> SourceLocation {
    SourceLocation {
        file_id: span.file.0,
        start: span.start,
        end: span.end,
    }
}

// ---------------------------------------------------------------------------
// Inferencer state
// ---------------------------------------------------------------------------

/// The mutable state of one type-inference call: a monotonically increasing
/// fresh-variable supply and the global substitution.
///
/// One `Inferencer` per top-level call; never share across calls or threads.
/// Fresh-variable numbering is derived from the supply alone, so inference
/// is fully deterministic.
#[derive(Debug, Default)]
pub struct Inferencer {
    supply: u32,
    subst: Substitution,
}

impl Inferencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an inferencer whose supply starts at `offset`.
    ///
    /// Unit tests that hand-build types with small variable ids use this to
    /// keep generated fresh variables out of their id range.
    pub fn with_supply(offset: u32) -> Self {
        Self {
            supply: offset,
            subst: Substitution::new(),
        }
    }

    /// Read-only access to the current substitution.
    pub fn substitution(&self) -> &Substitution {
        &self.subst
    }

    /// Apply the current substitution to a type.
    pub fn apply(&self, ty: &Type) -> Type {
        self.subst.apply(ty)
    }

    /// Allocate a fresh star-kinded, unconstrained variable.
    pub fn fresh_ty_var(&mut self, span: Span, prefix: char) -> Type {
        self.fresh_flavoured(span, Kind::Star, TyVarConstraint::None, Flavour::Inferred, prefix)
    }

    /// Allocate a fresh row-kinded variable lacking the given labels.
    pub fn fresh_row_var(
        &mut self,
        span: Span,
        lacks: impl IntoIterator<Item = Label>,
    ) -> Type {
        self.fresh_flavoured(
            span,
            Kind::Row,
            TyVarConstraint::lacks(lacks),
            Flavour::Inferred,
            'r',
        )
    }

    /// Allocate a fresh variable with explicit kind, constraint and flavour.
    pub fn fresh_flavoured(
        &mut self,
        span: Span,
        kind: Kind,
        constraint: TyVarConstraint,
        flavour: Flavour,
        prefix: char,
    ) -> Type {
        let id = TyVarId(self.supply);
        self.supply += 1;
        Type::var(
            TyVar {
                id,
                prefix,
                kind,
                flavour,
                constraint,
            },
            span,
        )
    }

    // -----------------------------------------------------------------------
    // Unification
    // -----------------------------------------------------------------------

    /// Unify two types under the current substitution, composing the result
    /// back into it.
    pub fn unify(&mut self, t1: &Type, t2: &Type) -> Result<(), Diagnostic> {
        let a = self.subst.apply(t1);
        let b = self.subst.apply(t2);
        let s = self.mgu(&a, &b)?;
        self.subst = s.compose(&self.subst);
        Ok(())
    }

    /// Most-general unifier. Inputs are assumed substitution-normal.
    fn mgu(&mut self, t1: &Type, t2: &Type) -> Result<Substitution, Diagnostic> {
        match (&t1.kind, &t2.kind) {
            (TypeKind::Fun(a1, b1), TypeKind::Fun(a2, b2)) => {
                let s1 = self.mgu(a1, a2)?;
                let s2 = self.mgu(&s1.apply(b1), &s1.apply(b2))?;
                Ok(s2.compose(&s1))
            }

            (TypeKind::Var(u), TypeKind::Var(v)) => self.union_constraints(u, v, t2.span),

            (TypeKind::Var(v), _) => self.var_bind(v, t1.span, t2),
            (_, TypeKind::Var(v)) => self.var_bind(v, t2.span, t1),

            (TypeKind::Int, TypeKind::Int)
            | (TypeKind::Dbl, TypeKind::Dbl)
            | (TypeKind::Bool, TypeKind::Bool)
            | (TypeKind::Char, TypeKind::Char)
            | (TypeKind::Text, TypeKind::Text) => Ok(Substitution::new()),

            (TypeKind::List(a), TypeKind::List(b)) => self.mgu(a, b),

            (TypeKind::Record(r1), TypeKind::Record(r2)) => self.mgu(r1, r2),
            (TypeKind::Variant(r1), TypeKind::Variant(r2)) => self.mgu(r1, r2),

            (TypeKind::RowEmpty, TypeKind::RowEmpty) => Ok(Substitution::new()),

            (TypeKind::RowExtend(_, _, _), TypeKind::RowEmpty | TypeKind::RowExtend(_, _, _)) => {
                self.mgu_row(t1, t2)
            }
            (TypeKind::RowEmpty, TypeKind::RowExtend(_, _, _)) => self.mgu_row(t2, t1),

            // Synonyms are expanded before inference; a surviving pair
            // unifies nominally.
            (TypeKind::Synonym(n1, args1), TypeKind::Synonym(n2, args2))
                if n1 == n2 && args1.len() == args2.len() =>
            {
                let mut s = Substitution::new();
                for (a, b) in args1.iter().zip(args2.iter()) {
                    let next = self.mgu(&s.apply(a), &s.apply(b))?;
                    s = next.compose(&s);
                }
                Ok(s)
            }

            _ => Err(self.mismatch(t1, t2)),
        }
    }

    /// Case 8: unify `{l1 : f1 | rest1}` with another row by rewriting the
    /// right-hand row to expose `l1`.
    fn mgu_row(&mut self, row1: &Type, row2: &Type) -> Result<Substitution, Diagnostic> {
        let TypeKind::RowExtend(l1, f1, rest1) = &row1.kind else {
            unreachable!("mgu_row is only called with a row extension on the left");
        };
        let (f2, rest2, s1) = self.rewrite_row(row2, l1, f1.span)?;

        // If rewriting bound our own tail we would be equating a row with a
        // row containing it.
        let (_, tail1) = row_to_list(rest1);
        if let Some(tv) = tail1
            && s1.contains(tv.id)
        {
            return Err(Diagnostic::error(
                Category::RecursiveRow,
                format!("recursive row type: `{row1}` and `{row2}`"),
            )
            .at(span_to_location(row1.span))
            .with_label(span_to_location(row2.span), "while unifying with this row"));
        }

        let s2 = self.mgu(&s1.apply(f1), &s1.apply(&f2))?;
        let s21 = s2.compose(&s1);
        let s3 = self.mgu(&s21.apply(rest1), &s21.apply(&rest2))?;
        Ok(s3.compose(&s21))
    }

    /// Rewrite `row` so the field `label` is at its head: returns
    /// `(t, rest, s)` with `s(row) == {label : t | rest}`.
    fn rewrite_row(
        &mut self,
        row: &Type,
        label: &Label,
        label_span: Span,
    ) -> Result<(Type, Type, Substitution), Diagnostic> {
        match &row.kind {
            TypeKind::RowEmpty => Err(Diagnostic::error(
                Category::MissingLabel,
                format!("label `{label}` cannot be inserted into the closed row"),
            )
            .at(span_to_location(label_span))
            .with_label(span_to_location(row.span), "this row has no such field")),

            TypeKind::RowExtend(l, field, rest) if l == label => {
                Ok(((**field).clone(), (**rest).clone(), Substitution::new()))
            }

            TypeKind::RowExtend(l, field, rest) => {
                if let TypeKind::Var(alpha) = &rest.kind {
                    // The spine invariant guarantees every label above
                    // `alpha` is absent from it; inserting `label` needs the
                    // same guarantee.
                    let alpha_lacks = alpha.constraint.lacks_labels();
                    if alpha_lacks.contains(label) {
                        return Err(Diagnostic::error(
                            Category::RepeatedLabel,
                            format!("repeated label(s): {label}"),
                        )
                        .at(span_to_location(label_span)));
                    }
                    let mut beta_lacks = alpha_lacks;
                    beta_lacks.insert(label.clone());
                    let beta = self.fresh_row_var(row.span, beta_lacks);
                    let gamma = self.fresh_ty_var(label_span, 'a');

                    let grown = Type::new(
                        TypeKind::RowExtend(
                            label.clone(),
                            Box::new(gamma.clone()),
                            Box::new(beta.clone()),
                        ),
                        row.span,
                    );
                    let s = Substitution::singleton(alpha.id, grown);
                    let rest = Type::new(
                        TypeKind::RowExtend(l.clone(), field.clone(), Box::new(beta)),
                        row.span,
                    );
                    return Ok((gamma, rest, s));
                }

                let (t, rewritten, s) = self.rewrite_row(rest, label, label_span)?;
                let rest = Type::new(
                    TypeKind::RowExtend(l.clone(), field.clone(), Box::new(rewritten)),
                    row.span,
                );
                Ok((t, rest, s))
            }

            TypeKind::Var(alpha) if alpha.kind == Kind::Row => {
                let alpha_lacks = alpha.constraint.lacks_labels();
                if alpha_lacks.contains(label) {
                    return Err(Diagnostic::error(
                        Category::RepeatedLabel,
                        format!("repeated label(s): {label}"),
                    )
                    .at(span_to_location(label_span)));
                }
                let mut beta_lacks = alpha_lacks;
                beta_lacks.insert(label.clone());
                let beta = self.fresh_row_var(row.span, beta_lacks);
                let gamma = self.fresh_ty_var(label_span, 'a');
                let grown = Type::new(
                    TypeKind::RowExtend(
                        label.clone(),
                        Box::new(gamma.clone()),
                        Box::new(beta.clone()),
                    ),
                    row.span,
                );
                let s = Substitution::singleton(alpha.id, grown);
                Ok((gamma, beta, s))
            }

            _ => Err(Diagnostic::error(
                Category::KindMismatch,
                format!("`{row}` is not a row type"),
            )
            .at(span_to_location(row.span))),
        }
    }

    /// Bind a variable to a type, enforcing the occurs check and the
    /// star/row kind split.
    fn var_bind(&mut self, var: &TyVar, var_span: Span, ty: &Type) -> Result<Substitution, Diagnostic> {
        if free_ty_vars(ty).contains_key(&var.id) {
            return Err(Diagnostic::error(
                Category::OccursCheck,
                format!(
                    "occurs check fails: `{}` occurs in `{ty}`",
                    var.display_name()
                ),
            )
            .at(span_to_location(var_span))
            .with_label(span_to_location(ty.span), "the infinite type arises here"));
        }
        match var.kind {
            Kind::Star => {
                if ty.is_row() {
                    return Err(self.kind_mismatch(var, var_span, ty));
                }
                Ok(Substitution::singleton(var.id, ty.clone()))
            }
            Kind::Row => {
                if !ty.is_row() {
                    return Err(self.kind_mismatch(var, var_span, ty));
                }
                self.var_bind_row(var, var_span, ty)
            }
        }
    }

    /// Bind a row variable to a row: its lacked labels must be absent from
    /// the row, and an open tail inherits the union of both lacks sets.
    fn var_bind_row(
        &mut self,
        var: &TyVar,
        var_span: Span,
        row: &Type,
    ) -> Result<Substitution, Diagnostic> {
        let (fields, tail) = match row_to_map(row) {
            Ok(parts) => parts,
            Err(label) => {
                return Err(Diagnostic::error(
                    Category::RepeatedLabel,
                    format!("repeated label(s): {label}"),
                )
                .at(span_to_location(row.span)));
            }
        };

        let lacks = var.constraint.lacks_labels();
        let collisions: Vec<String> = fields
            .keys()
            .filter(|l| lacks.contains(*l))
            .map(|l| l.to_string())
            .collect();
        if !collisions.is_empty() {
            return Err(Diagnostic::error(
                Category::RepeatedLabel,
                format!("repeated label(s): {}", collisions.join(", ")),
            )
            .at(span_to_location(var_span))
            .with_label(span_to_location(row.span), "already present in this row"));
        }

        match tail {
            Some(r1) => {
                let mut merged: BTreeSet<Label> = lacks;
                merged.extend(r1.constraint.lacks_labels());
                let r2 = self.fresh_row_var(row.span, merged);
                let s1 = Substitution::singleton(r1.id, r2);
                let rebound = s1.apply(row);
                Ok(Substitution::singleton(var.id, rebound).compose(&s1))
            }
            None => Ok(Substitution::singleton(var.id, row.clone())),
        }
    }

    /// Unify two variables by merging their constraints.
    fn union_constraints(
        &mut self,
        u: &TyVar,
        v: &TyVar,
        v_span: Span,
    ) -> Result<Substitution, Diagnostic> {
        if u.id == v.id {
            return Ok(Substitution::new());
        }
        match (u.kind, v.kind) {
            // Class constraints are carried, not merged: the surviving
            // variable keeps its own.
            (Kind::Star, Kind::Star) => {
                Ok(Substitution::singleton(u.id, Type::var(v.clone(), v_span)))
            }
            (Kind::Row, Kind::Row) => {
                let mut merged = u.constraint.lacks_labels();
                merged.extend(v.constraint.lacks_labels());
                let fresh = self.fresh_row_var(v_span, merged);
                let mut s = Substitution::new();
                s.bind(u.id, fresh.clone());
                s.bind(v.id, fresh);
                Ok(s)
            }
            _ => Err(Diagnostic::error(
                Category::KindMismatch,
                format!(
                    "kind mismatch: `{}` has kind {} but `{}` has kind {}",
                    u.display_name(),
                    u.kind,
                    v.display_name(),
                    v.kind
                ),
            )
            .at(span_to_location(v_span))),
        }
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    fn mismatch(&self, t1: &Type, t2: &Type) -> Diagnostic {
        Diagnostic::error(
            Category::TypeMismatch,
            format!("types do not unify: `{t1}` vs `{t2}`"),
        )
        .at(span_to_location(t1.span))
        .with_label(span_to_location(t2.span), "expected because of this")
    }

    fn kind_mismatch(&self, var: &TyVar, var_span: Span, ty: &Type) -> Diagnostic {
        Diagnostic::error(
            Category::KindMismatch,
            format!(
                "kind mismatch: `{}` has kind {} but `{ty}` does not",
                var.display_name(),
                var.kind
            ),
        )
        .at(span_to_location(var_span))
        .with_label(span_to_location(ty.span), "while unifying with this type")
    }
}
