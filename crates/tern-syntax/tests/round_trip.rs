//! Parse → pretty → parse round trips.
//!
//! The pretty printer re-sugars the elaborated AST; re-parsing its output
//! must reach a fixed point after one round. Exact expected strings pin the
//! canonical form for a set of representative programs; a wider corpus and
//! a generated-AST property check idempotence only.

use proptest::prelude::*;

use tern_ast::{Binder, BinderKind, Expr, ExprKind, FileId, Prim, Span, Spanned};
use tern_syntax::{parse_expr_source, pretty_expr};

fn roundtrip(source: &str) -> (String, String) {
    let first = parse_expr_source(source, FileId(0))
        .unwrap_or_else(|err| panic!("`{source}` should parse: {err}"));
    let printed = pretty_expr(&first);
    let second = parse_expr_source(&printed, FileId(1))
        .unwrap_or_else(|err| panic!("printed form `{printed}` should re-parse: {err}"));
    (printed, pretty_expr(&second))
}

/// Assert the canonical printed form, and that it is a fixed point.
fn assert_canonical(source: &str, expected: &str) {
    let (first, second) = roundtrip(source);
    assert_eq!(first, expected, "canonical form of `{source}`");
    assert_eq!(first, second, "printing must be idempotent for `{source}`");
}

fn assert_stable(source: &str) {
    let (first, second) = roundtrip(source);
    assert_eq!(first, second, "printing must be idempotent for `{source}`");
}

#[test]
fn canonical_forms() {
    assert_canonical("\\x -> x", "\\x -> x");
    assert_canonical("\\x y -> x", "\\x y -> x");
    assert_canonical("if a then 1 else 2", "if a then 1 else 2");
    assert_canonical("1 + 2 * 3", "1 + 2 * 3");
    assert_canonical("(1 + 2) * 3", "(1 + 2) * 3");
    assert_canonical("{x = 1, y = True}", "{x = 1, y = True}");
    assert_canonical("{x}", "{x}");
    assert_canonical("{x := 2 | r}", "{x := 2 | r}");
    assert_canonical("r.x.y", "r.x.y");
    assert_canonical("f r \\ x", "f r \\ x");
    assert_canonical("[1, 2, 3]", "[1, 2, 3]");
    assert_canonical("1 :: xs", "1 :: xs");
    assert_canonical("Foo 1", "Foo 1");
    assert_canonical(
        "case s of {Foo -> f, Bar -> g}",
        "case s of {Foo -> f, Bar -> g}",
    );
    assert_canonical(
        "case s of {override Foo -> f}",
        "case s of {override Foo -> f}",
    );
    assert_canonical("{|x = 1|}", "{|x = 1|}");
    assert_canonical("<|A, B|>", "<|A, B|>");
    assert_canonical("let x = 1; y = 2 in x + y", "let x = 1; y = 2 in x + y");
    assert_canonical("let x : Int = 1 in x", "let x : Int = 1 in x");
    assert_canonical("\\(x : Int) -> x", "\\(x : Int) -> x");
    assert_canonical("x : Bool", "x : Bool");
    assert_canonical("-f x", "-f x");
    assert_canonical("show 1 <> show 2", "show 1 <> show 2");
    assert_canonical("let {..} = r in x", "let {..} = r in x");
    assert_canonical("\\{a, b = y} -> y", "\\{a, b = y} -> y");
}

#[test]
fn section_prints_as_annotated_identity() {
    assert_canonical("(: Int)", "(\\x -> x) : Int -> Int");
}

#[test]
fn wider_corpus_is_stable() {
    let corpus = [
        "\\r -> r.x",
        "\\r -> { x := r.x + 1 | r }",
        "let id = \\x -> x in { a = id 1, b = id True }",
        "case Foo 1 of { Foo -> \\n -> n + 1, Bar -> \\b -> if b then 0 else 1 }",
        "case s of { override Foo -> f, Bar -> g, Foo -> h }",
        "{|y = True, x := 1|} { x = 0 }",
        "<|Baz|> v",
        "foldr (\\c acc -> acc) \"\" (unpack \"hi\")",
        "pack ['h', 'i', '\\n']",
        "a || b && c == d + e * f",
        "f >> g >> h",
        "f << g",
        "[[1], [2, 3]] ++ []",
        "if null xs then error \"empty\" else show xs",
        "\\x -> x : forall a. a -> a",
        "(\\r -> r.x) : forall a r. (r\\x) => {x: a | r} -> a",
        "{ p = 1 } : {p: Int | _}",
        "let f = \\x -> fix (\\go -> go) in f",
        "trace (\\msg -> 1)",
        "- (1 + 2)",
        "{x = {y = {z = 1}}}.x.y.z",
        "import \"lib/prelude.tn\"",
    ];
    for source in corpus {
        assert_stable(source);
    }
}

// ---------------------------------------------------------------------------
// Generated ASTs
// ---------------------------------------------------------------------------

fn sp(kind: ExprKind) -> Expr {
    Spanned::new(kind, Span::new(FileId(9), 0, 0))
}

fn app(f: Expr, x: Expr) -> Expr {
    sp(ExprKind::App(Box::new(f), Box::new(x)))
}

fn arb_name() -> impl Strategy<Value = String> {
    prop::sample::select(&["x", "y", "z", "acc"][..]).prop_map(str::to_string)
}

fn arb_label() -> impl Strategy<Value = String> {
    prop::sample::select(&["a", "b", "c"][..]).prop_map(str::to_string)
}

/// Expressions whose shape the printer can fully re-sugar.
fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0i64..100).prop_map(|n| sp(ExprKind::Prim(Prim::Int(n)))),
        any::<bool>().prop_map(|b| sp(ExprKind::Prim(Prim::Bool(b)))),
        arb_name().prop_map(|n| sp(ExprKind::Var(n))),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            // Binary operator application.
            (inner.clone(), inner.clone()).prop_map(|(a, b)| {
                app(app(sp(ExprKind::Prim(Prim::Add)), a), b)
            }),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| {
                app(app(sp(ExprKind::Prim(Prim::Eq)), a), b)
            }),
            // Conditional.
            (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, t, e)| {
                app(app(app(sp(ExprKind::Prim(Prim::Cond)), c), t), e)
            }),
            // Lambda and let.
            (arb_name(), inner.clone()).prop_map(|(name, body)| {
                sp(ExprKind::Lam(
                    Binder::new(BinderKind::Arg(name), Span::new(FileId(9), 0, 0)),
                    Box::new(body),
                ))
            }),
            (arb_name(), inner.clone(), inner.clone()).prop_map(|(name, value, body)| {
                sp(ExprKind::Let(
                    Binder::new(BinderKind::Arg(name), Span::new(FileId(9), 0, 0)),
                    Box::new(value),
                    Box::new(body),
                ))
            }),
            // Record literal over distinct labels.
            prop::collection::btree_map(arb_label(), inner.clone(), 0..3).prop_map(|fields| {
                fields.into_iter().rev().fold(
                    sp(ExprKind::Prim(Prim::RecordEmpty)),
                    |acc, (label, value)| {
                        app(app(sp(ExprKind::Prim(Prim::RecordExtend(label))), value), acc)
                    },
                )
            }),
            // Projection.
            (arb_label(), inner.clone()).prop_map(|(label, record)| {
                app(sp(ExprKind::Prim(Prim::RecordSelect(label))), record)
            }),
            // List literal.
            prop::collection::vec(inner, 0..3).prop_map(|elems| {
                elems.into_iter().rev().fold(
                    sp(ExprKind::Prim(Prim::ListEmpty)),
                    |acc, elem| app(app(sp(ExprKind::Prim(Prim::ListCons)), elem), acc),
                )
            }),
        ]
    })
}

proptest! {
    /// pretty(parse(pretty(e))) == pretty(e) for any printable expression.
    #[test]
    fn printing_generated_asts_is_idempotent(expr in arb_expr()) {
        let printed = pretty_expr(&expr);
        let reparsed = parse_expr_source(&printed, FileId(0))
            .unwrap_or_else(|err| panic!("printed `{printed}` should parse: {err}"));
        prop_assert_eq!(pretty_expr(&reparsed), printed);
    }
}
