//! Property tests for the unifier using proptest.
//!
//! These stress invariants that must hold for ANY input types, not just
//! hand-picked examples:
//!
//! 1. Substitution composition matches sequential application
//! 2. Unification is reflexive
//! 3. Unification is sound: after success both sides resolve equal
//! 4. The occurs check rejects self-containing bindings
//! 5. Row spines survive a linearise/rebuild round trip
//! 6. Generalisation never quantifies environment variables
//! 7. Lacks constraints block exactly the labels they name
//!
//! Hand-built variables use ids below 100; inferencers in these tests start
//! their supply at 1000 so fresh variables never collide.

use proptest::prelude::*;

use tern_ast::{FileId, Span};
use tern_types::{
    Flavour, Kind, Label, Scheme, Substitution, TyVar, TyVarConstraint, TyVarId, Type, TypeKind,
    display_with_names, mk_row_type, row_to_list,
};

use crate::Inferencer;
use crate::typeck::{SynonymTable, TypeEnv, generalize, infer};

fn s() -> Span {
    Span::new(FileId(0), 0, 1)
}

fn star(id: u32) -> TyVar {
    TyVar {
        id: TyVarId(id),
        prefix: 'a',
        kind: Kind::Star,
        flavour: Flavour::Inferred,
        constraint: TyVarConstraint::None,
    }
}

fn row_tail(id: u32) -> TyVar {
    TyVar {
        id: TyVarId(id),
        prefix: 'r',
        kind: Kind::Row,
        flavour: Flavour::Inferred,
        constraint: TyVarConstraint::lacks([]),
    }
}

/// Resolved types rendered for comparison. Display sorts row labels, so two
/// rows that differ only in spine order render identically.
fn rendered(inf: &Inferencer, ty: &Type) -> String {
    display_with_names(&inf.apply(ty), &std::collections::BTreeMap::new())
}

// ---------------------------------------------------------------------------
// Strategies for generating types
// ---------------------------------------------------------------------------

const LABEL_POOL: &[&str] = &["a", "b", "c", "x", "y", "name", "age"];

fn arb_label() -> impl Strategy<Value = Label> {
    prop::sample::select(LABEL_POOL).prop_map(Label::new)
}

fn arb_ground() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::new(TypeKind::Int, s())),
        Just(Type::new(TypeKind::Dbl, s())),
        Just(Type::new(TypeKind::Bool, s())),
        Just(Type::new(TypeKind::Char, s())),
        Just(Type::new(TypeKind::Text, s())),
    ]
}

fn arb_star_var() -> impl Strategy<Value = Type> {
    (0u32..6).prop_map(|id| Type::var(star(id), s()))
}

/// Rows: distinct labels drawn from the pool, optionally an open tail with
/// an id range disjoint from star ids.
fn arb_row(inner: impl Strategy<Value = Type> + Clone) -> impl Strategy<Value = Type> {
    (
        prop::collection::btree_map(arb_label(), inner, 0..3),
        prop::option::of(10u32..14),
    )
        .prop_map(|(fields, tail)| {
            let tail = match tail {
                Some(id) => Type::var(row_tail(id), s()),
                None => Type::new(TypeKind::RowEmpty, s()),
            };
            mk_row_type(tail, fields.into_iter().collect(), s())
        })
}

fn arb_type() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![arb_ground(), arb_star_var()];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| Type::list(t, s())),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Type::fun(a, b, s())),
            arb_row(inner.clone()).prop_map(|row| Type::record(row, s())),
            arb_row(inner).prop_map(|row| Type::variant(row, s())),
        ]
    })
}

/// A substitution binding a few star variables to generated types.
fn arb_subst() -> impl Strategy<Value = Substitution> {
    prop::collection::btree_map(0u32..6, arb_ground(), 0..4).prop_map(|map| {
        let mut subst = Substitution::new();
        for (id, ty) in map {
            subst.bind(TyVarId(id), ty);
        }
        subst
    })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// apply(compose(s2, s1), t) == apply(s2, apply(s1, t))
    #[test]
    fn substitution_composition(s1 in arb_subst(), s2 in arb_subst(), t in arb_type()) {
        let composed = s2.compose(&s1);
        prop_assert_eq!(composed.apply(&t), s2.apply(&s1.apply(&t)));
    }

    /// Unifying a type with itself always succeeds and changes nothing.
    #[test]
    fn unification_is_reflexive(t in arb_type()) {
        let mut inf = Inferencer::with_supply(1000);
        prop_assert!(inf.unify(&t, &t).is_ok());
        prop_assert_eq!(rendered(&inf, &t), rendered(&Inferencer::with_supply(1000), &t));
    }

    /// If unification succeeds, both sides resolve to the same type.
    #[test]
    fn unification_is_sound(t1 in arb_type(), t2 in arb_type()) {
        let mut inf = Inferencer::with_supply(1000);
        if inf.unify(&t1, &t2).is_ok() {
            prop_assert_eq!(rendered(&inf, &t1), rendered(&inf, &t2));
        }
    }

    /// Binding a variable to a type properly containing it must fail.
    #[test]
    fn occurs_check_fires(id in 0u32..6, wrap_in_list in any::<bool>()) {
        let alpha = Type::var(star(id), s());
        let bigger = if wrap_in_list {
            Type::list(alpha.clone(), s())
        } else {
            Type::fun(alpha.clone(), Type::new(TypeKind::Int, s()), s())
        };
        let mut inf = Inferencer::with_supply(1000);
        let err = inf.unify(&alpha, &bigger).unwrap_err();
        prop_assert_eq!(err.category, tern_diag::Category::OccursCheck);
    }

    /// row_to_list inverts mk_row_type exactly.
    #[test]
    fn row_round_trips(
        fields in prop::collection::btree_map(arb_label(), arb_ground(), 0..4),
        tail_id in prop::option::of(10u32..14),
    ) {
        let fields: Vec<(Label, Type)> = fields.into_iter().collect();
        let tail = match tail_id {
            Some(id) => Type::var(row_tail(id), s()),
            None => Type::new(TypeKind::RowEmpty, s()),
        };
        let row = mk_row_type(tail, fields.clone(), s());
        let (listed, tail_var) = row_to_list(&row);
        prop_assert_eq!(listed, fields);
        prop_assert_eq!(tail_var.map(|tv| tv.id.0), tail_id);
    }

    /// generalize never quantifies a variable free in the environment.
    #[test]
    fn generalisation_is_fresh(env_id in 0u32..3, free_id in 3u32..6) {
        let inf = Inferencer::with_supply(1000);
        let mut env = TypeEnv::new();
        env.insert("pinned", Scheme::mono(Type::var(star(env_id), s())));
        let ty = Type::fun(
            Type::var(star(env_id), s()),
            Type::var(star(free_id), s()),
            s(),
        );
        let scheme = generalize(&inf, &env, &ty);
        for tv in &scheme.vars {
            prop_assert!(tv.id.0 != env_id);
        }
        prop_assert!(scheme.vars.iter().any(|tv| tv.id.0 == free_id));
    }

    /// A row variable lacking `l` rejects rows containing `l` and accepts
    /// rows without it; the merged tail carries the union of lacks sets.
    #[test]
    fn lacks_constraints_propagate(label in arb_label(), other in arb_label()) {
        prop_assume!(label != other);

        // Violation: r lacks `label`, row contains `label`.
        let lacking = TyVar {
            constraint: TyVarConstraint::lacks([label.clone()]),
            ..row_tail(20)
        };
        let offending = mk_row_type(
            Type::new(TypeKind::RowEmpty, s()),
            vec![(label.clone(), Type::new(TypeKind::Int, s()))],
            s(),
        );
        let mut inf = Inferencer::with_supply(1000);
        prop_assert!(inf.unify(&Type::var(lacking.clone(), s()), &offending).is_err());

        // Acceptance: the row carries a different label, over an open tail
        // that lacks `other`. The bound tail must lack both labels.
        let open = mk_row_type(
            Type::var(TyVar {
                constraint: TyVarConstraint::lacks([other.clone()]),
                ..row_tail(21)
            }, s()),
            vec![(other.clone(), Type::new(TypeKind::Int, s()))],
            s(),
        );
        let mut inf = Inferencer::with_supply(1000);
        prop_assert!(inf.unify(&Type::var(lacking.clone(), s()), &open).is_ok());

        let resolved = inf.apply(&Type::var(lacking, s()));
        let (_, tail) = row_to_list(&resolved);
        let tail = tail.expect("tail stays open");
        let lacks = tail.constraint.lacks_labels();
        prop_assert!(lacks.contains(&label));
        prop_assert!(lacks.contains(&other));
    }
}

// ---------------------------------------------------------------------------
// Deterministic numbering
// ---------------------------------------------------------------------------

#[test]
fn inference_is_deterministic() {
    use tern_ast::{Binder, BinderKind, Expr, ExprKind, Spanned};

    let expr = Expr::new(
        ExprKind::Lam(
            Binder::new(BinderKind::Arg("r".into()), s()),
            Box::new(Spanned::new(
                ExprKind::App(
                    Box::new(Spanned::new(
                        ExprKind::Prim(tern_ast::Prim::RecordSelect("x".into())),
                        s(),
                    )),
                    Box::new(Spanned::new(ExprKind::Var("r".into()), s())),
                ),
                s(),
            )),
        ),
        s(),
    );

    let env = TypeEnv::new();
    let synonyms = SynonymTable::new();
    let mut first = Inferencer::new();
    let mut second = Inferencer::new();
    let a = infer(&mut first, &env, &synonyms, &expr).expect("types");
    let b = infer(&mut second, &env, &synonyms, &expr).expect("types");
    assert_eq!(first.apply(&a), second.apply(&b));
}
