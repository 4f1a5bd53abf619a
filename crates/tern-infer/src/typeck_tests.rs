//! Tests for expression-level type inference and let-generalisation.
//!
//! Each test constructs an elaborated AST by hand and checks the inferred
//! scheme. This is verbose but precise — no parser in the loop.

use std::collections::BTreeSet;

use tern_ast::{
    AnnBinder, AnnConstraint, Binder, BinderKind, Expr, ExprKind, FileId, Prim, Span, Spanned,
    SynonymDecl, TypeAnn, TypeAnnKind,
};
use tern_diag::Category;
use tern_types::{
    Flavour, Kind, Label, Scheme, TyVar, TyVarConstraint, TyVarId, Type, TypeKind, mk_row_type,
};

use crate::typeck::*;
use crate::Inferencer;

// ---------------------------------------------------------------------------
// Helpers for constructing AST nodes
// ---------------------------------------------------------------------------

fn s() -> Span {
    Span::new(FileId(0), 0, 1)
}

fn sp<T>(node: T) -> Spanned<T> {
    Spanned::new(node, s())
}

fn var(name: &str) -> Expr {
    sp(ExprKind::Var(name.to_string()))
}

fn prim(p: Prim) -> Expr {
    sp(ExprKind::Prim(p))
}

fn int(n: i64) -> Expr {
    prim(Prim::Int(n))
}

fn boolean(b: bool) -> Expr {
    prim(Prim::Bool(b))
}

fn app(f: Expr, x: Expr) -> Expr {
    sp(ExprKind::App(Box::new(f), Box::new(x)))
}

fn app2(f: Expr, x: Expr, y: Expr) -> Expr {
    app(app(f, x), y)
}

fn lam(name: &str, body: Expr) -> Expr {
    sp(ExprKind::Lam(
        Binder::new(BinderKind::Arg(name.to_string()), s()),
        Box::new(body),
    ))
}

fn let_(name: &str, value: Expr, body: Expr) -> Expr {
    sp(ExprKind::Let(
        Binder::new(BinderKind::Arg(name.to_string()), s()),
        Box::new(value),
        Box::new(body),
    ))
}

fn select(label: &str, record: Expr) -> Expr {
    app(prim(Prim::RecordSelect(label.to_string())), record)
}

fn extend(label: &str, value: Expr, rest: Expr) -> Expr {
    app2(prim(Prim::RecordExtend(label.to_string())), value, rest)
}

fn restrict(label: &str, record: Expr) -> Expr {
    app(prim(Prim::RecordRestrict(label.to_string())), record)
}

fn infer_scheme(expr: &Expr) -> Scheme {
    type_inference(&TypeEnv::new(), &SynonymTable::new(), expr).expect("expression should type")
}

fn infer_err(expr: &Expr) -> tern_diag::Diagnostic {
    type_inference(&TypeEnv::new(), &SynonymTable::new(), expr).expect_err("expression should not type")
}

// ---------------------------------------------------------------------------
// Principal schemes
// ---------------------------------------------------------------------------

#[test]
fn identity_lambda() {
    let scheme = infer_scheme(&lam("x", var("x")));
    assert_eq!(scheme.to_string(), "forall a. a -> a");
}

#[test]
fn record_select_is_row_polymorphic() {
    let scheme = infer_scheme(&lam("r", select("x", var("r"))));
    assert_eq!(
        scheme.to_string(),
        "forall a ra. (ra\\x) => {x: a | ra} -> a"
    );
}

#[test]
fn closed_record_literal() {
    let expr = extend(
        "x",
        int(1),
        extend("y", boolean(true), prim(Prim::RecordEmpty)),
    );
    let scheme = infer_scheme(&expr);
    assert_eq!(scheme.to_string(), "{x: Int, y: Bool}");
}

#[test]
fn record_update_preserves_the_row() {
    // \r -> {x := r.x + 1 | r}
    let bump = app2(prim(Prim::Add), select("x", var("r")), int(1));
    let body = extend("x", bump, restrict("x", var("r")));
    let scheme = infer_scheme(&lam("r", body));
    assert_eq!(
        scheme.to_string(),
        "forall ra. (ra\\x) => {x: Int | ra} -> {x: Int | ra}"
    );
}

#[test]
fn let_generalisation_allows_two_instantiations() {
    // let id = \x -> x in {a = id 1, b = id True}
    let body = extend(
        "a",
        app(var("id"), int(1)),
        extend("b", app(var("id"), boolean(true)), prim(Prim::RecordEmpty)),
    );
    let expr = let_("id", lam("x", var("x")), body);
    let scheme = infer_scheme(&expr);
    assert_eq!(scheme.to_string(), "{a: Int, b: Bool}");
}

#[test]
fn lambda_bound_variables_stay_monomorphic() {
    // \f -> {a = f 1, b = f True} must fail: f is not generalised.
    let body = extend(
        "a",
        app(var("f"), int(1)),
        extend("b", app(var("f"), boolean(true)), prim(Prim::RecordEmpty)),
    );
    let err = infer_err(&lam("f", body));
    assert_eq!(err.category, Category::TypeMismatch);
}

#[test]
fn case_over_injected_variant() {
    // case Foo 1 of { Foo -> \n -> n + 1, Bar -> \b -> if b then 0 else 1 }
    let scrutinee = app(prim(Prim::VariantInject("Foo".into())), int(1));
    let foo_handler = lam("n", app2(prim(Prim::Add), var("n"), int(1)));
    let bar_handler = lam(
        "b",
        app(app2(prim(Prim::Cond), var("b"), int(0)), int(1)),
    );
    let chain = app2(
        prim(Prim::VariantElim("Foo".into())),
        foo_handler,
        app2(
            prim(Prim::VariantElim("Bar".into())),
            bar_handler,
            prim(Prim::Absurd),
        ),
    );
    let scheme = infer_scheme(&app(chain, scrutinee));
    assert_eq!(scheme.to_string(), "Int");
}

#[test]
fn variant_embed_widens_the_row() {
    // \v -> VariantEmbed Foo v : takes a variant without Foo.
    let scheme = infer_scheme(&lam("v", app(prim(Prim::VariantEmbed("Foo".into())), var("v"))));
    assert_eq!(
        scheme.to_string(),
        "forall a ra. (ra\\Foo) => <ra> -> <Foo: a | ra>"
    );
}

#[test]
fn list_literal_elements_unify() {
    let expr = app2(
        prim(Prim::ListCons),
        int(1),
        app2(prim(Prim::ListCons), int(2), prim(Prim::ListEmpty)),
    );
    assert_eq!(infer_scheme(&expr).to_string(), "[Int]");
}

#[test]
fn record_destructuring_binder() {
    let binder = Binder::new(
        BinderKind::RecArg(vec![("x".into(), "x".into()), ("y".into(), "local".into())]),
        s(),
    );
    let expr = sp(ExprKind::Lam(binder, Box::new(var("local"))));
    let scheme = infer_scheme(&expr);
    assert_eq!(
        scheme.to_string(),
        "forall a b ra. (ra\\x, ra\\y) => {x: a, y: b | ra} -> b"
    );
}

#[test]
fn record_wildcard_over_closed_record() {
    // let {..} = {x = 1, y = True} in y
    let record = extend(
        "x",
        int(1),
        extend("y", boolean(true), prim(Prim::RecordEmpty)),
    );
    let expr = sp(ExprKind::Let(
        Binder::new(BinderKind::RecWildcard, s()),
        Box::new(record),
        Box::new(var("y")),
    ));
    assert_eq!(infer_scheme(&expr).to_string(), "Bool");
}

#[test]
fn record_wildcard_needs_a_closed_record() {
    // \{..} -> 1 : the binder type is an unresolved variable.
    let expr = sp(ExprKind::Lam(
        Binder::new(BinderKind::RecWildcard, s()),
        Box::new(int(1)),
    ));
    let err = infer_err(&expr);
    assert_eq!(err.category, Category::RecordWildcard);
    assert!(err.message.contains("record wildcard cannot bind to type"));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn self_application_fails_the_occurs_check() {
    let err = infer_err(&lam("x", app(var("x"), var("x"))));
    assert_eq!(err.category, Category::OccursCheck);
}

#[test]
fn selecting_an_absent_label_fails() {
    let record = extend("x", int(1), prim(Prim::RecordEmpty));
    let err = infer_err(&select("y", record));
    assert_eq!(err.category, Category::MissingLabel);
    assert!(err.message.contains('y'));
}

#[test]
fn unbound_variable_is_reported_with_its_name() {
    let err = infer_err(&var("ghost"));
    assert_eq!(err.category, Category::UnboundVariable);
    assert!(err.message.contains("ghost"));
}

#[test]
fn unresolved_import_is_rejected() {
    let err = infer_err(&sp(ExprKind::Import("prelude.tn".into())));
    assert_eq!(err.category, Category::Syntax);
}

#[test]
fn branches_of_cond_must_agree() {
    let expr = app(app2(prim(Prim::Cond), boolean(true), int(1)), boolean(false));
    let err = infer_err(&expr);
    assert_eq!(err.category, Category::TypeMismatch);
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

fn ann_ty(kind: TypeAnnKind) -> TypeAnn {
    sp(kind)
}

#[test]
fn annotation_narrows_a_polymorphic_type() {
    // (\x -> x) : Int -> Int
    let ann = ann_ty(TypeAnnKind::Fun(
        Box::new(ann_ty(TypeAnnKind::Int)),
        Box::new(ann_ty(TypeAnnKind::Int)),
    ));
    let expr = sp(ExprKind::Ann(Box::new(lam("x", var("x"))), ann));
    assert_eq!(infer_scheme(&expr).to_string(), "Int -> Int");
}

#[test]
fn annotation_mismatch_is_fatal() {
    let expr = sp(ExprKind::Ann(Box::new(int(1)), ann_ty(TypeAnnKind::Bool)));
    let err = infer_err(&expr);
    assert_eq!(err.category, Category::TypeMismatch);
}

#[test]
fn forall_annotation_keeps_the_type_general() {
    // (\x -> x) : forall a. a -> a
    let body = ann_ty(TypeAnnKind::Fun(
        Box::new(ann_ty(TypeAnnKind::Var("a".into()))),
        Box::new(ann_ty(TypeAnnKind::Var("a".into()))),
    ));
    let ann = ann_ty(TypeAnnKind::Forall(
        vec![AnnBinder {
            name: "a".into(),
            constraint: AnnConstraint::None,
            span: s(),
        }],
        Box::new(body),
    ));
    let expr = sp(ExprKind::Ann(Box::new(lam("x", var("x"))), ann));
    assert_eq!(infer_scheme(&expr).to_string(), "forall a. a -> a");
}

#[test]
fn annotated_lambda_binder_is_used() {
    // \(x : Int) -> x
    let expr = sp(ExprKind::AnnLam(
        Binder::new(BinderKind::Arg("x".into()), s()),
        ann_ty(TypeAnnKind::Int),
        Box::new(var("x")),
    ));
    assert_eq!(infer_scheme(&expr).to_string(), "Int -> Int");
}

#[test]
fn annotated_let_checks_the_value() {
    // let x : Bool = 1 in x
    let expr = sp(ExprKind::AnnLet(
        Binder::new(BinderKind::Arg("x".into()), s()),
        ann_ty(TypeAnnKind::Bool),
        Box::new(int(1)),
        Box::new(var("x")),
    ));
    let err = infer_err(&expr);
    assert_eq!(err.category, Category::TypeMismatch);
}

#[test]
fn wildcard_annotation_is_inferred_freely() {
    let expr = sp(ExprKind::Ann(Box::new(int(1)), ann_ty(TypeAnnKind::Wildcard)));
    assert_eq!(infer_scheme(&expr).to_string(), "Int");
}

#[test]
fn lacks_constraint_in_annotation_survives_generalisation() {
    // (\r -> r.x) : forall a r. (r\x) => {x: a | r} -> a
    let row = ann_ty(TypeAnnKind::RowExtend(
        "x".into(),
        Box::new(ann_ty(TypeAnnKind::Var("a".into()))),
        Box::new(ann_ty(TypeAnnKind::Var("r".into()))),
    ));
    let fun = ann_ty(TypeAnnKind::Fun(
        Box::new(ann_ty(TypeAnnKind::Record(Box::new(row)))),
        Box::new(ann_ty(TypeAnnKind::Var("a".into()))),
    ));
    let ann = ann_ty(TypeAnnKind::Forall(
        vec![
            AnnBinder {
                name: "a".into(),
                constraint: AnnConstraint::None,
                span: s(),
            },
            AnnBinder {
                name: "r".into(),
                constraint: AnnConstraint::Lacks(["x".to_string()].into_iter().collect()),
                span: s(),
            },
        ],
        Box::new(fun),
    ));
    let expr = sp(ExprKind::Ann(
        Box::new(lam("r", select("x", var("r")))),
        ann,
    ));
    assert_eq!(
        infer_scheme(&expr).to_string(),
        "forall a ra. (ra\\x) => {x: a | ra} -> a"
    );
}

// ---------------------------------------------------------------------------
// Synonyms
// ---------------------------------------------------------------------------

fn pair_synonym() -> SynonymDecl {
    // type Pair a = {fst: a, snd: a};
    let row = sp(TypeAnnKind::RowExtend(
        "fst".into(),
        Box::new(sp(TypeAnnKind::Var("a".into()))),
        Box::new(sp(TypeAnnKind::RowExtend(
            "snd".into(),
            Box::new(sp(TypeAnnKind::Var("a".into()))),
            Box::new(sp(TypeAnnKind::RowEmpty)),
        ))),
    ));
    SynonymDecl {
        span: s(),
        name: sp("Pair".to_string()),
        params: vec![sp("a".to_string())],
        body: sp(TypeAnnKind::Record(Box::new(row))),
    }
}

#[test]
fn synonyms_unfold_transparently() {
    let table = SynonymTable::from_decls(&[pair_synonym()]).expect("no duplicates");
    let mut inf = Inferencer::new();
    let ann = sp(TypeAnnKind::Synonym(
        "Pair".into(),
        vec![sp(TypeAnnKind::Int)],
    ));
    let ty = resolve_annotation(&mut inf, &table, &ann).expect("resolves");
    assert_eq!(ty.to_string(), "{fst: Int, snd: Int}");
}

#[test]
fn synonym_arity_must_match() {
    let table = SynonymTable::from_decls(&[pair_synonym()]).expect("no duplicates");
    let mut inf = Inferencer::new();
    let ann = sp(TypeAnnKind::Synonym("Pair".into(), vec![]));
    let err = resolve_annotation(&mut inf, &table, &ann).unwrap_err();
    assert_eq!(err.category, Category::SynonymArity);
}

#[test]
fn unknown_synonym_is_reported() {
    let mut inf = Inferencer::new();
    let ann = sp(TypeAnnKind::Synonym("Mystery".into(), vec![]));
    let err = resolve_annotation(&mut inf, &SynonymTable::new(), &ann).unwrap_err();
    assert_eq!(err.category, Category::UnknownSynonym);
}

#[test]
fn duplicate_synonyms_conflict() {
    let err = SynonymTable::from_decls(&[pair_synonym(), pair_synonym()]).unwrap_err();
    assert_eq!(err.category, Category::DuplicateSynonym);
}

#[test]
fn self_referential_synonym_is_rejected() {
    // type Loop = Loop;
    let decl = SynonymDecl {
        span: s(),
        name: sp("Loop".to_string()),
        params: vec![],
        body: sp(TypeAnnKind::Synonym("Loop".into(), vec![])),
    };
    let table = SynonymTable::from_decls(&[decl]).expect("no duplicates");
    let mut inf = Inferencer::new();
    let ann = sp(TypeAnnKind::Synonym("Loop".into(), vec![]));
    let err = resolve_annotation(&mut inf, &table, &ann).unwrap_err();
    assert_eq!(err.category, Category::RecursiveSynonym);
}

// ---------------------------------------------------------------------------
// Unifier internals through the public surface
// ---------------------------------------------------------------------------

fn star(id: u32) -> TyVar {
    TyVar {
        id: TyVarId(id),
        prefix: 'a',
        kind: Kind::Star,
        flavour: Flavour::Inferred,
        constraint: TyVarConstraint::None,
    }
}

fn row_var(id: u32, lacks: &[&str]) -> TyVar {
    TyVar {
        id: TyVarId(id),
        prefix: 'r',
        kind: Kind::Row,
        flavour: Flavour::Inferred,
        constraint: TyVarConstraint::lacks(lacks.iter().map(|l| Label::new(*l))),
    }
}

fn int_ty() -> Type {
    Type::new(TypeKind::Int, s())
}

#[test]
fn binding_a_lacking_row_to_a_row_with_that_label_fails() {
    let mut inf = Inferencer::with_supply(1000);
    let r = Type::var(row_var(0, &["x"]), s());
    let row = mk_row_type(
        Type::new(TypeKind::RowEmpty, s()),
        vec![(Label::new("x"), int_ty())],
        s(),
    );
    let err = inf.unify(&r, &row).unwrap_err();
    assert_eq!(err.category, Category::RepeatedLabel);
    assert!(err.message.contains('x'));
}

#[test]
fn open_tails_merge_lacks_constraints() {
    let mut inf = Inferencer::with_supply(1000);
    let r1 = Type::var(row_var(0, &["x"]), s());
    let r2 = Type::var(row_var(1, &["y"]), s());
    inf.unify(&r1, &r2).expect("row variables unify");

    let resolved = inf.apply(&r1);
    let TypeKind::Var(merged) = &resolved.kind else {
        panic!("expected a fresh row variable, got {resolved}");
    };
    let lacks = merged.constraint.lacks_labels();
    assert!(lacks.contains(&Label::new("x")));
    assert!(lacks.contains(&Label::new("y")));
    assert_eq!(inf.apply(&r2), resolved);
}

#[test]
fn star_and_row_variables_do_not_mix() {
    let mut inf = Inferencer::with_supply(1000);
    let a = Type::var(star(0), s());
    let empty_row = Type::new(TypeKind::RowEmpty, s());
    let err = inf.unify(&a, &empty_row).unwrap_err();
    assert_eq!(err.category, Category::KindMismatch);
}

#[test]
fn unifying_rows_sharing_a_tail_detects_recursion() {
    let mut inf = Inferencer::with_supply(1000);
    let shared = row_var(0, &[]);
    let left = mk_row_type(
        Type::var(shared.clone(), s()),
        vec![(Label::new("x"), int_ty())],
        s(),
    );
    let right = mk_row_type(
        Type::var(shared, s()),
        vec![(Label::new("y"), Type::new(TypeKind::Bool, s()))],
        s(),
    );
    let err = inf.unify(&left, &right).unwrap_err();
    assert_eq!(err.category, Category::RecursiveRow);
}

#[test]
fn instantiate_preserves_kind_and_constraint() {
    let mut inf = Inferencer::with_supply(1000);
    let r = row_var(0, &["x"]);
    let scheme = Scheme {
        vars: vec![r.clone()],
        ty: Type::record(Type::var(r, s()), s()),
    };
    let ty = instantiate(&mut inf, &scheme, s());
    let TypeKind::Record(row) = &ty.kind else {
        panic!("expected record, got {ty}");
    };
    let TypeKind::Var(fresh) = &row.kind else {
        panic!("expected row variable");
    };
    assert!(fresh.id.0 >= 1000, "instantiation must mint a fresh variable");
    assert_eq!(fresh.kind, Kind::Row);
    assert!(fresh.constraint.lacks_labels().contains(&Label::new("x")));
}

#[test]
fn generalize_skips_variables_free_in_the_environment() {
    let inf = Inferencer::with_supply(1000);
    let pinned = star(0);
    let mut env = TypeEnv::new();
    env.insert("pinned", Scheme::mono(Type::var(pinned.clone(), s())));

    let free = star(1);
    let ty = Type::fun(
        Type::var(pinned.clone(), s()),
        Type::var(free.clone(), s()),
        s(),
    );
    let scheme = generalize(&inf, &env, &ty);
    let quantified: BTreeSet<u32> = scheme.vars.iter().map(|v| v.id.0).collect();
    assert!(!quantified.contains(&pinned.id.0));
    assert!(quantified.contains(&free.id.0));
}

#[test]
fn pre_seeded_environment_is_respected() {
    // With `n : Int` in scope, `n + 1` is Int.
    let mut env = TypeEnv::new();
    env.insert("n", Scheme::mono(int_ty()));
    let expr = app2(prim(Prim::Add), var("n"), int(1));
    let scheme =
        type_inference(&env, &SynonymTable::new(), &expr).expect("expression should type");
    assert_eq!(scheme.to_string(), "Int");
}
