//! Lexing, parsing, desugaring and import resolution for Tern.

pub mod imports;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod token;

use tern_ast::{Expr, FileId, SynonymDecl, TypeAnn};
use tern_diag::Diagnostic;

pub use imports::{Sources, resolve_imports};
pub use lexer::lex;
pub use parser::{HIDDEN_ROW_BINDER, parse_expr, parse_program, parse_type};
pub use pretty::pretty_expr;
pub use token::{Token, TokenKind};

/// Lex and parse a whole program (synonym declarations plus one expression).
pub fn parse_program_source(
    source: &str,
    file: FileId,
) -> Result<(Vec<SynonymDecl>, Expr), Diagnostic> {
    let tokens = lex(source, file)?;
    parse_program(tokens, file)
}

/// Lex and parse a single expression.
pub fn parse_expr_source(source: &str, file: FileId) -> Result<Expr, Diagnostic> {
    let tokens = lex(source, file)?;
    parse_expr(tokens, file)
}

/// Lex and parse a standalone type annotation.
pub fn parse_type_source(source: &str, file: FileId) -> Result<TypeAnn, Diagnostic> {
    let tokens = lex(source, file)?;
    parse_type(tokens, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_ast::{BinderKind, ExprKind, Prim, TypeAnnKind};
    use tern_diag::Category;

    fn parse(source: &str) -> Expr {
        parse_expr_source(source, FileId(0)).expect("parses")
    }

    fn parse_err(source: &str) -> Diagnostic {
        parse_expr_source(source, FileId(0)).expect_err("should not parse")
    }

    /// Collapse an application spine into `(head, args)`.
    fn spine(expr: &Expr) -> (&Expr, Vec<&Expr>) {
        let mut head = expr;
        let mut args = Vec::new();
        while let ExprKind::App(f, arg) = &head.node {
            args.push(arg.as_ref());
            head = f;
        }
        args.reverse();
        (head, args)
    }

    #[test]
    fn lambda_folds_left_into_unary_nest() {
        let expr = parse("\\x y -> x");
        let ExprKind::Lam(outer, body) = &expr.node else {
            panic!("expected lambda, got {expr:?}");
        };
        assert_eq!(outer.node, BinderKind::Arg("x".into()));
        let ExprKind::Lam(inner, _) = &body.node else {
            panic!("expected nested lambda");
        };
        assert_eq!(inner.node, BinderKind::Arg("y".into()));
    }

    #[test]
    fn if_desugars_to_cond() {
        let expr = parse("if True then 1 else 2");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::Cond));
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].node, ExprKind::Prim(Prim::Bool(true)));
    }

    #[test]
    fn record_literal_folds_extends_over_empty() {
        let expr = parse("{x = 1, y = True}");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::RecordExtend("x".into())));
        assert_eq!(args.len(), 2);
        let (inner_head, inner_args) = spine(args[1]);
        assert_eq!(
            inner_head.node,
            ExprKind::Prim(Prim::RecordExtend("y".into()))
        );
        assert_eq!(inner_args[1].node, ExprKind::Prim(Prim::RecordEmpty));
    }

    #[test]
    fn field_pun_expands_to_variable() {
        let expr = parse("{x}");
        let (_, args) = spine(&expr);
        assert_eq!(args[0].node, ExprKind::Var("x".into()));
    }

    #[test]
    fn record_update_extends_over_restriction() {
        let expr = parse("{x := 2 | r}");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::RecordExtend("x".into())));
        let (restrict_head, restrict_args) = spine(args[1]);
        assert_eq!(
            restrict_head.node,
            ExprKind::Prim(Prim::RecordRestrict("x".into()))
        );
        assert_eq!(restrict_args[0].node, ExprKind::Var("r".into()));
    }

    #[test]
    fn projection_binds_tighter_than_application() {
        // `f r.x` applies f to the projection.
        let expr = parse("f r.x");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Var("f".into()));
        let (proj_head, _) = spine(args[0]);
        assert_eq!(
            proj_head.node,
            ExprKind::Prim(Prim::RecordSelect("x".into()))
        );
    }

    #[test]
    fn restriction_applies_to_whole_application() {
        let expr = parse("f r \\ x");
        let (head, args) = spine(&expr);
        assert_eq!(
            head.node,
            ExprKind::Prim(Prim::RecordRestrict("x".into()))
        );
        let (inner_head, _) = spine(args[0]);
        assert_eq!(inner_head.node, ExprKind::Var("f".into()));
    }

    #[test]
    fn operators_follow_the_precedence_table() {
        // `1 + 2 * 3` is `Add 1 (Mul 2 3)`.
        let expr = parse("1 + 2 * 3");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::Add));
        let (rhs_head, _) = spine(args[1]);
        assert_eq!(rhs_head.node, ExprKind::Prim(Prim::Mul));

        // `a == b && c` is `And (Eq a b) c`.
        let expr = parse("a == b && c");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::And));
        let (lhs_head, _) = spine(args[0]);
        assert_eq!(lhs_head.node, ExprKind::Prim(Prim::Eq));
    }

    #[test]
    fn cons_is_right_associative() {
        let expr = parse("1 :: 2 :: xs");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::ListCons));
        let (rhs_head, _) = spine(args[1]);
        assert_eq!(rhs_head.node, ExprKind::Prim(Prim::ListCons));
    }

    #[test]
    fn prefix_minus_negates_the_application() {
        let expr = parse("-f x");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::Neg));
        let (inner_head, _) = spine(args[0]);
        assert_eq!(inner_head.node, ExprKind::Var("f".into()));
    }

    #[test]
    fn list_literal_folds_cons_over_empty() {
        let expr = parse("[1, 2]");
        let (head, args) = spine(&expr);
        assert_eq!(head.node, ExprKind::Prim(Prim::ListCons));
        let (tail_head, tail_args) = spine(args[1]);
        assert_eq!(tail_head.node, ExprKind::Prim(Prim::ListCons));
        assert_eq!(tail_args[1].node, ExprKind::Prim(Prim::ListEmpty));
    }

    #[test]
    fn variant_constructor_is_an_injection() {
        let expr = parse("Foo 1");
        let (head, args) = spine(&expr);
        assert_eq!(
            head.node,
            ExprKind::Prim(Prim::VariantInject("Foo".into()))
        );
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn case_builds_elim_chain_terminated_by_absurd() {
        let expr = parse("case s of {Foo -> f, Bar -> g}");
        let ExprKind::App(chain, scrutinee) = &expr.node else {
            panic!("expected application to scrutinee");
        };
        assert_eq!(scrutinee.node, ExprKind::Var("s".into()));
        let (head, args) = spine(chain);
        assert_eq!(
            head.node,
            ExprKind::Prim(Prim::VariantElim("Foo".into()))
        );
        let (tail_head, tail_args) = spine(args[1]);
        assert_eq!(
            tail_head.node,
            ExprKind::Prim(Prim::VariantElim("Bar".into()))
        );
        assert_eq!(tail_args[1].node, ExprKind::Prim(Prim::Absurd));
    }

    #[test]
    fn override_arm_reembeds_into_continuation() {
        let expr = parse("case s of {override Foo -> f}");
        let ExprKind::App(chain, _) = &expr.node else {
            panic!("expected application");
        };
        let (_, args) = spine(chain);
        let ExprKind::Lam(binder, body) = &args[1].node else {
            panic!("expected hidden-row lambda continuation, got {:?}", args[1]);
        };
        assert_eq!(binder.node, BinderKind::Arg(HIDDEN_ROW_BINDER.into()));
        let ExprKind::App(_, embedded) = &body.node else {
            panic!("expected application in continuation");
        };
        let (embed_head, _) = spine(embedded);
        assert_eq!(
            embed_head.node,
            ExprKind::Prim(Prim::VariantEmbed("Foo".into()))
        );
    }

    #[test]
    fn difference_record_wraps_hidden_row_lambda() {
        let expr = parse("{|x = 1|}");
        let ExprKind::Lam(binder, body) = &expr.node else {
            panic!("expected lambda");
        };
        assert_eq!(binder.node, BinderKind::Arg(HIDDEN_ROW_BINDER.into()));
        let (head, args) = spine(body);
        assert_eq!(head.node, ExprKind::Prim(Prim::RecordExtend("x".into())));
        assert_eq!(args[1].node, ExprKind::Var(HIDDEN_ROW_BINDER.into()));
    }

    #[test]
    fn variant_embed_chains_over_hidden_row() {
        let expr = parse("<|A, B|>");
        let ExprKind::Lam(_, body) = &expr.node else {
            panic!("expected lambda");
        };
        let (head, args) = spine(body);
        assert_eq!(head.node, ExprKind::Prim(Prim::VariantEmbed("A".into())));
        let (inner_head, _) = spine(args[0]);
        assert_eq!(
            inner_head.node,
            ExprKind::Prim(Prim::VariantEmbed("B".into()))
        );
    }

    #[test]
    fn string_literal_becomes_text_prim() {
        let expr = parse("\"hi\"");
        assert_eq!(expr.node, ExprKind::Prim(Prim::Text("hi".into())));
    }

    #[test]
    fn let_chain_right_folds() {
        let expr = parse("let x = 1; y = 2 in y");
        let ExprKind::Let(first, _, body) = &expr.node else {
            panic!("expected let");
        };
        assert_eq!(first.node, BinderKind::Arg("x".into()));
        assert!(matches!(&body.node, ExprKind::Let(second, _, _)
            if second.node == BinderKind::Arg("y".into())));
    }

    #[test]
    fn annotated_let_keeps_annotation() {
        let expr = parse("let x : Int = 1 in x");
        assert!(matches!(&expr.node, ExprKind::AnnLet(_, ann, _, _)
            if ann.node == TypeAnnKind::Int));
    }

    #[test]
    fn signature_section_wraps_identity() {
        let expr = parse("(: Int)");
        let ExprKind::Ann(inner, ann) = &expr.node else {
            panic!("expected annotation");
        };
        assert!(matches!(&inner.node, ExprKind::Lam(_, _)));
        assert_eq!(ann.node.to_string(), "Int -> Int");
    }

    #[test]
    fn signature_section_lifts_under_forall() {
        let expr = parse("(: forall a. a)");
        let ExprKind::Ann(_, ann) = &expr.node else {
            panic!("expected annotation");
        };
        assert_eq!(ann.node.to_string(), "forall a. a -> a");
    }

    #[test]
    fn primitive_identifiers_resolve() {
        assert_eq!(parse("show").node, ExprKind::Prim(Prim::Show));
        assert_eq!(parse("fix").node, ExprKind::Prim(Prim::Fix));
        assert_eq!(parse("map").node, ExprKind::Var("map".into()));
    }

    #[test]
    fn program_collects_synonym_declarations() {
        let (synonyms, expr) =
            parse_program_source("type Pair a b = {fst: a, snd: b};\n{fst = 1, snd = True}", FileId(0))
                .expect("parses");
        assert_eq!(synonyms.len(), 1);
        assert_eq!(synonyms[0].name.node, "Pair");
        assert_eq!(synonyms[0].params.len(), 2);
        assert!(matches!(expr.node, ExprKind::App(_, _)));
    }

    #[test]
    fn annotation_parses_forall_constraints() {
        let ann = parse_type_source("forall a r. (Eq a, r\\x) => {x: a | r} -> a", FileId(0))
            .expect("parses");
        let TypeAnnKind::Forall(binders, _) = &ann.node else {
            panic!("expected forall");
        };
        assert_eq!(binders.len(), 2);
        assert!(matches!(
            binders[0].constraint,
            tern_ast::AnnConstraint::Class(tern_ast::ClassName::Eq)
        ));
        assert!(matches!(&binders[1].constraint,
            tern_ast::AnnConstraint::Lacks(labels) if labels.contains("x")));
    }

    #[test]
    fn unbound_type_variable_is_rejected() {
        let err = parse_err("1 : {x: a | r}");
        assert_eq!(err.category, Category::UnboundTypeVariable);
        assert!(err.message.contains('a'));
        assert!(err.message.contains('r'));
    }

    #[test]
    fn wildcards_are_exempt_from_the_unbound_check() {
        let expr = parse("1 : _");
        assert!(matches!(&expr.node, ExprKind::Ann(_, ann)
            if ann.node == TypeAnnKind::Wildcard));
    }

    #[test]
    fn constraint_on_unknown_variable_is_rejected() {
        let err = parse_type_source("forall a. (Eq b) => a", FileId(0)).unwrap_err();
        assert_eq!(err.category, Category::ConstraintScope);
    }

    #[test]
    fn parenthesised_type_is_not_mistaken_for_constraints() {
        let ann = parse_type_source("forall a. (a -> a) -> a", FileId(0)).expect("parses");
        let TypeAnnKind::Forall(_, body) = &ann.node else {
            panic!("expected forall");
        };
        assert_eq!(body.node.to_string(), "(a -> a) -> a");
    }

    #[test]
    fn nested_variant_types_split_double_gt() {
        let ann = parse_type_source("<A: <B: Int>>", FileId(0)).expect("parses");
        assert_eq!(ann.node.to_string(), "<A: <B: Int>>");
    }

    #[test]
    fn import_atom_parses() {
        let expr = parse("import \"lib/prelude.tn\"");
        assert_eq!(expr.node, ExprKind::Import("lib/prelude.tn".into()));
    }

    #[test]
    fn record_wildcard_binder_parses_in_let_and_lambda() {
        let expr = parse("\\{..} -> x");
        assert!(matches!(&expr.node, ExprKind::Lam(binder, _)
            if binder.node == BinderKind::RecWildcard));

        let expr = parse("let {..} = r in x");
        assert!(matches!(&expr.node, ExprKind::Let(binder, _, _)
            if binder.node == BinderKind::RecWildcard));
    }
}
