//! Recursive descent parser with precedence climbing for Tern.
//!
//! The parser compiles every piece of surface sugar down to the primitive
//! AST as it goes: record literals become `RecordExtend` chains, `case`
//! becomes a `VariantElim` chain over the scrutinee, operators become
//! primitive applications, and so on. Inference never sees sugar.
//!
//! Type annotations are parsed into the syntactic [`TypeAnn`] tree. The
//! parser attaches constraints to their `forall` binders and runs the
//! unbound-type-variable check before an annotation escapes.

use std::collections::BTreeSet;

use tern_ast::{
    AnnBinder, AnnConstraint, Binder, BinderKind, ClassName, Expr, ExprKind, FileId, Prim, Span,
    Spanned, SynonymDecl, TypeAnn, TypeAnnKind,
};
use tern_diag::{Category, Diagnostic, SourceLocation};

use crate::token::{Token, TokenKind};

/// Internal binder name used by difference-record and variant-embed
/// desugaring. `#` is not an identifier character, so no user-written
/// program can mention or shadow it.
pub const HIDDEN_ROW_BINDER: &str = "#row";

/// Parse a whole program: synonym declarations followed by one expression.
pub fn parse_program(
    tokens: Vec<Token>,
    file: FileId,
) -> Result<(Vec<SynonymDecl>, Expr), Diagnostic> {
    let mut parser = Parser::new(tokens, file);
    let mut synonyms = Vec::new();
    while parser.check(&TokenKind::TypeKw) {
        synonyms.push(parser.synonym_decl()?);
    }
    let expr = parser.expression()?;
    parser.expect_eof()?;
    Ok((synonyms, expr))
}

/// Parse a single expression from a token stream.
pub fn parse_expr(tokens: Vec<Token>, file: FileId) -> Result<Expr, Diagnostic> {
    let mut parser = Parser::new(tokens, file);
    let expr = parser.expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a standalone type annotation from a token stream.
pub fn parse_type(tokens: Vec<Token>, file: FileId) -> Result<TypeAnn, Diagnostic> {
    let mut parser = Parser::new(tokens, file);
    let ann = parser.type_ann_checked()?;
    parser.expect_eof()?;
    Ok(ann)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: FileId,
}

impl Parser {
    fn new(tokens: Vec<Token>, file: FileId) -> Self {
        Self {
            tokens,
            pos: 0,
            file,
        }
    }

    // -- Synonym declarations --

    /// `type C a b = T;`
    fn synonym_decl(&mut self) -> Result<SynonymDecl, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::TypeKw, "expected `type`")?;
        let name = self.upper_ident("expected a synonym name")?;
        let mut params = Vec::new();
        while matches!(self.current_kind(), TokenKind::Ident(_)) {
            let param = self.lower_ident("expected a type parameter")?;
            params.push(param);
        }
        self.expect(&TokenKind::Equals, "expected `=` in synonym declaration")?;
        let body = self.type_ann()?;
        let bound: BTreeSet<String> = params.iter().map(|p| p.node.clone()).collect();
        self.check_unbound_ty_vars(&body, &bound)?;
        let end = self.current_span();
        self.expect(&TokenKind::Semi, "expected `;` after synonym declaration")?;
        Ok(SynonymDecl {
            span: start.merge(end),
            name,
            params,
            body,
        })
    }

    // -- Expressions --

    fn expression(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.binary_expr(0)?;
        if self.match_token(&TokenKind::Colon) {
            let ann = self.type_ann_checked()?;
            let span = expr.span.merge(ann.span);
            return Ok(Expr::new(ExprKind::Ann(Box::new(expr), ann), span));
        }
        Ok(expr)
    }

    fn binary_expr(&mut self, min_bp: u8) -> Result<Expr, Diagnostic> {
        let mut lhs = self.unary_expr()?;
        loop {
            let Some((prim, bp, right_assoc)) = binary_op(self.current_kind()) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            let op_span = self.current_span();
            self.advance();
            let next_bp = if right_assoc { bp } else { bp + 1 };
            let rhs = self.binary_expr(next_bp)?;
            let span = lhs.span.merge(rhs.span);
            let op = Expr::new(ExprKind::Prim(prim), op_span);
            lhs = app(app(op, lhs), rhs);
            lhs.span = span;
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, Diagnostic> {
        if self.check(&TokenKind::Minus) {
            let op_span = self.current_span();
            self.advance();
            let operand = self.unary_expr()?;
            let span = op_span.merge(operand.span);
            let mut expr = app(Expr::new(ExprKind::Prim(Prim::Neg), op_span), operand);
            expr.span = span;
            return Ok(expr);
        }
        self.app_expr()
    }

    fn app_expr(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.postfix_expr()?;
        while starts_atom(self.current_kind()) {
            let arg = self.postfix_expr()?;
            let span = expr.span.merge(arg.span);
            expr = app(expr, arg);
            expr.span = span;
        }
        // Record restriction binds to the whole application chain.
        while self.check(&TokenKind::Backslash)
            && matches!(self.peek_kind(1), Some(TokenKind::Ident(_)))
        {
            let op_span = self.current_span();
            self.advance();
            let label = self.lower_ident("expected a label after `\\`")?;
            let span = expr.span.merge(label.span);
            expr = app(
                Expr::new(ExprKind::Prim(Prim::RecordRestrict(label.node)), op_span),
                expr,
            );
            expr.span = span;
        }
        Ok(expr)
    }

    fn postfix_expr(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.atom()?;
        while self.check(&TokenKind::Dot) {
            self.advance();
            let label = self.lower_ident("expected a field label after `.`")?;
            let span = expr.span.merge(label.span);
            expr = app(
                Expr::new(ExprKind::Prim(Prim::RecordSelect(label.node)), label.span),
                expr,
            );
            expr.span = span;
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, Diagnostic> {
        let span = self.current_span();
        match self.current_kind().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Prim(Prim::Int(n)), span))
            }
            TokenKind::Dbl(d) => {
                self.advance();
                Ok(Expr::new(ExprKind::Prim(Prim::Dbl(d)), span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Prim(Prim::Text(s)), span))
            }
            TokenKind::CharLit(c) => {
                self.advance();
                Ok(Expr::new(ExprKind::Prim(Prim::Char(c)), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Prim(Prim::Bool(true)), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Prim(Prim::Bool(false)), span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                let kind = match Prim::from_surface_name(&name) {
                    Some(prim) => ExprKind::Prim(prim),
                    None => ExprKind::Var(name),
                };
                Ok(Expr::new(kind, span))
            }
            TokenKind::UpperIdent(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Prim(Prim::VariantInject(name)), span))
            }
            TokenKind::LParen => self.paren_expr(),
            TokenKind::LBrace => self.record_literal(),
            TokenKind::LBracePipe => self.difference_record(),
            TokenKind::LBracket => self.list_literal(),
            TokenKind::LAnglePipe => self.variant_embed(),
            TokenKind::Backslash => self.lambda(),
            TokenKind::If => self.if_expr(),
            TokenKind::Case => self.case_expr(),
            TokenKind::Let => self.let_expr(),
            TokenKind::Import => {
                self.advance();
                let path_span = self.current_span();
                let TokenKind::Str(path) = self.current_kind().clone() else {
                    return Err(self.error_at_current("expected a file path string after `import`"));
                };
                self.advance();
                Ok(Expr::new(ExprKind::Import(path), span.merge(path_span)))
            }
            TokenKind::Underscore => {
                Err(self.error_at_current("`_` is only valid inside type annotations"))
            }
            other => Err(self.error_at_current(format!("expected an expression, found {}", other.describe()))),
        }
    }

    /// `( expr )` or the signature section `(: T)`.
    fn paren_expr(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::LParen, "expected `(`")?;

        if self.check(&TokenKind::Colon) {
            self.advance();
            let ann = self.type_ann_checked()?;
            let end = self.current_span();
            self.expect(&TokenKind::RParen, "expected `)` after signature section")?;
            let span = start.merge(end);
            return Ok(signature_section(ann, span));
        }

        let expr = self.expression()?;
        self.expect(&TokenKind::RParen, "expected `)`")?;
        Ok(expr)
    }

    /// `{ l1 = e1, l2, l3 := e3 | base }`
    fn record_literal(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace, "expected `{`")?;

        if self.check(&TokenKind::RBrace) {
            let end = self.current_span();
            self.advance();
            return Ok(Expr::new(
                ExprKind::Prim(Prim::RecordEmpty),
                start.merge(end),
            ));
        }

        let items = self.record_items()?;
        let base = if self.match_token(&TokenKind::Pipe) {
            self.expression()?
        } else {
            Expr::new(ExprKind::Prim(Prim::RecordEmpty), start)
        };
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "expected `}` to close record")?;

        let mut expr = desugar_record_items(items, base);
        expr.span = start.merge(end);
        Ok(expr)
    }

    /// `{| l1 = e1, l2 := e2 |}` desugars to a function over a hidden row.
    fn difference_record(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::LBracePipe, "expected `{|`")?;
        let items = if self.check(&TokenKind::PipeRBrace) {
            Vec::new()
        } else {
            self.record_items()?
        };
        let end = self.current_span();
        self.expect(&TokenKind::PipeRBrace, "expected `|}` to close difference record")?;
        let span = start.merge(end);

        let base = Expr::new(ExprKind::Var(HIDDEN_ROW_BINDER.to_string()), span);
        let body = desugar_record_items(items, base);
        Ok(Expr::new(
            ExprKind::Lam(
                Binder::new(BinderKind::Arg(HIDDEN_ROW_BINDER.to_string()), span),
                Box::new(body),
            ),
            span,
        ))
    }

    fn record_items(&mut self) -> Result<Vec<RecItem>, Diagnostic> {
        let mut items = Vec::new();
        loop {
            let label = self.lower_ident("expected a record label")?;
            if self.match_token(&TokenKind::Equals) {
                let value = self.expression()?;
                items.push(RecItem::Extend(label.node, value, label.span));
            } else if self.match_token(&TokenKind::ColonEq) {
                let value = self.expression()?;
                items.push(RecItem::Update(label.node, value, label.span));
            } else {
                // Field pun: `{l}` means `{l = l}`.
                let value = Expr::new(ExprKind::Var(label.node.clone()), label.span);
                items.push(RecItem::Extend(label.node, value, label.span));
            }
            if !self.match_token(&TokenKind::Comma) {
                return Ok(items);
            }
        }
    }

    /// `[e1, e2, ...]`
    fn list_literal(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::LBracket, "expected `[`")?;
        let mut elems = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elems.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBracket, "expected `]` to close list")?;
        let span = start.merge(end);

        let mut expr = Expr::new(ExprKind::Prim(Prim::ListEmpty), span);
        for elem in elems.into_iter().rev() {
            let cons = Expr::new(ExprKind::Prim(Prim::ListCons), elem.span);
            let mut next = app(app(cons, elem), expr);
            next.span = span;
            expr = next;
        }
        Ok(expr)
    }

    /// `<| C1, C2 |>` desugars to a function embedding a hidden row.
    fn variant_embed(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::LAnglePipe, "expected `<|`")?;
        let mut ctors = Vec::new();
        loop {
            let ctor = self.upper_ident("expected a variant constructor")?;
            ctors.push(ctor);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::PipeRAngle, "expected `|>` to close variant embed")?;
        let span = start.merge(end);

        let mut body = Expr::new(ExprKind::Var(HIDDEN_ROW_BINDER.to_string()), span);
        for ctor in ctors.into_iter().rev() {
            let embed = Expr::new(
                ExprKind::Prim(Prim::VariantEmbed(ctor.node)),
                ctor.span,
            );
            let mut next = app(embed, body);
            next.span = span;
            body = next;
        }
        Ok(Expr::new(
            ExprKind::Lam(
                Binder::new(BinderKind::Arg(HIDDEN_ROW_BINDER.to_string()), span),
                Box::new(body),
            ),
            span,
        ))
    }

    /// `\x {a, b} (y : T) -> body`
    fn lambda(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::Backslash, "expected `\\`")?;
        let mut binders = Vec::new();
        loop {
            binders.push(self.lambda_binder()?);
            if self.check(&TokenKind::Arrow) {
                break;
            }
            if !starts_binder(self.current_kind()) {
                return Err(self.error_at_current("expected a binder or `->` in lambda"));
            }
        }
        self.expect(&TokenKind::Arrow, "expected `->` after lambda binders")?;
        let body = self.expression()?;
        let span = start.merge(body.span);

        let mut expr = body;
        for (binder, ann) in binders.into_iter().rev() {
            let kind = match ann {
                Some(ann) => ExprKind::AnnLam(binder, ann, Box::new(expr)),
                None => ExprKind::Lam(binder, Box::new(expr)),
            };
            expr = Expr::new(kind, span);
        }
        Ok(expr)
    }

    /// One lambda binder; annotated binders must be parenthesised.
    fn lambda_binder(&mut self) -> Result<(Binder, Option<TypeAnn>), Diagnostic> {
        if self.check(&TokenKind::LParen) {
            let start = self.current_span();
            self.advance();
            let name = self.lower_ident("expected a binder name")?;
            self.expect(&TokenKind::Colon, "expected `:` in annotated binder")?;
            let ann = self.type_ann_checked()?;
            let end = self.current_span();
            self.expect(&TokenKind::RParen, "expected `)` after annotated binder")?;
            return Ok((
                Binder::new(BinderKind::Arg(name.node), start.merge(end)),
                Some(ann),
            ));
        }
        Ok((self.binder()?, None))
    }

    /// A bare binder: name, record destructuring or record wildcard.
    fn binder(&mut self) -> Result<Binder, Diagnostic> {
        let span = self.current_span();
        match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Binder::new(BinderKind::Arg(name), span))
            }
            TokenKind::RecordWildcard => {
                self.advance();
                Ok(Binder::new(BinderKind::RecWildcard, span))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let label = self.lower_ident("expected a label in record binder")?;
                        let local = if self.match_token(&TokenKind::Equals) {
                            self.lower_ident("expected a name after `=`")?.node
                        } else {
                            label.node.clone()
                        };
                        entries.push((label.node, local));
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let end = self.current_span();
                self.expect(&TokenKind::RBrace, "expected `}` to close record binder")?;
                Ok(Binder::new(BinderKind::RecArg(entries), span.merge(end)))
            }
            other => Err(self.error_at_current(format!(
                "expected a binder, found {}",
                other.describe()
            ))),
        }
    }

    fn if_expr(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::If, "expected `if`")?;
        let cond = self.expression()?;
        self.expect(&TokenKind::Then, "expected `then`")?;
        let then_branch = self.expression()?;
        self.expect(&TokenKind::Else, "expected `else`")?;
        let else_branch = self.expression()?;
        let span = start.merge(else_branch.span);

        let prim = Expr::new(ExprKind::Prim(Prim::Cond), start);
        let mut expr = app(app(app(prim, cond), then_branch), else_branch);
        expr.span = span;
        Ok(expr)
    }

    /// `case s of { C1 -> f1, override C2 -> f2, ... }`
    fn case_expr(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::Case, "expected `case`")?;
        let scrutinee = self.expression()?;
        self.expect(&TokenKind::Of, "expected `of`")?;
        self.expect(&TokenKind::LBrace, "expected `{` to open case alternatives")?;

        let mut arms = Vec::new();
        loop {
            let is_override = self.match_token(&TokenKind::Override);
            let ctor = self.upper_ident("expected a variant constructor in case alternative")?;
            self.expect(&TokenKind::Arrow, "expected `->` in case alternative")?;
            let handler = self.expression()?;
            arms.push((is_override, ctor, handler));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "expected `}` to close case alternatives")?;
        let span = start.merge(end);

        // Fold alternatives from the last to the first. A plain arm chains
        // onto the eliminator built so far; an `override` arm re-embeds its
        // constructor into the continuation so an inner alternative can win.
        let mut chain = Expr::new(ExprKind::Prim(Prim::Absurd), span);
        for (is_override, ctor, handler) in arms.into_iter().rev() {
            let elim = Expr::new(
                ExprKind::Prim(Prim::VariantElim(ctor.node.clone())),
                ctor.span,
            );
            let tail = if is_override {
                let row_var = Expr::new(ExprKind::Var(HIDDEN_ROW_BINDER.to_string()), ctor.span);
                let embed = Expr::new(
                    ExprKind::Prim(Prim::VariantEmbed(ctor.node.clone())),
                    ctor.span,
                );
                let mut body = app(chain, app(embed, row_var));
                body.span = span;
                Expr::new(
                    ExprKind::Lam(
                        Binder::new(BinderKind::Arg(HIDDEN_ROW_BINDER.to_string()), ctor.span),
                        Box::new(body),
                    ),
                    span,
                )
            } else {
                chain
            };
            let mut next = app(app(elim, handler), tail);
            next.span = span;
            chain = next;
        }

        let mut expr = app(chain, scrutinee);
        expr.span = span;
        Ok(expr)
    }

    /// `let b1 = e1; b2 = e2 in body`, with optional `: T` per binding.
    fn let_expr(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::Let, "expected `let`")?;

        let mut bindings = Vec::new();
        loop {
            let binder = self.binder()?;
            let ann = if self.match_token(&TokenKind::Colon) {
                Some(self.type_ann_checked()?)
            } else {
                None
            };
            self.expect(&TokenKind::Equals, "expected `=` in let binding")?;
            let value = self.expression()?;
            bindings.push((binder, ann, value));
            if !self.match_token(&TokenKind::Semi) {
                break;
            }
        }
        self.expect(&TokenKind::In, "expected `in` after let bindings")?;
        let body = self.expression()?;
        let span = start.merge(body.span);

        let mut expr = body;
        for (binder, ann, value) in bindings.into_iter().rev() {
            let kind = match ann {
                Some(ann) => ExprKind::AnnLet(binder, ann, Box::new(value), Box::new(expr)),
                None => ExprKind::Let(binder, Box::new(value), Box::new(expr)),
            };
            expr = Expr::new(kind, span);
        }
        Ok(expr)
    }

    // -- Types --

    /// Parse a type annotation and run the unbound-variable check on it.
    fn type_ann_checked(&mut self) -> Result<TypeAnn, Diagnostic> {
        let ann = self.type_ann()?;
        self.check_unbound_ty_vars(&ann, &BTreeSet::new())?;
        Ok(ann)
    }

    fn type_ann(&mut self) -> Result<TypeAnn, Diagnostic> {
        if self.check(&TokenKind::Forall) {
            return self.forall_type();
        }
        self.fun_type()
    }

    /// `forall a b. (C1, C2) => T`
    fn forall_type(&mut self) -> Result<TypeAnn, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::Forall, "expected `forall`")?;
        let mut binders = Vec::new();
        loop {
            let name = self.lower_ident("expected a type variable after `forall`")?;
            binders.push(AnnBinder {
                name: name.node,
                constraint: AnnConstraint::None,
                span: name.span,
            });
            if self.check(&TokenKind::Dot) {
                break;
            }
        }
        self.expect(&TokenKind::Dot, "expected `.` after forall binders")?;

        self.parse_constraints(&mut binders)?;

        let body = self.fun_type()?;
        let span = start.merge(body.span);
        Ok(TypeAnn::new(
            TypeAnnKind::Forall(binders, Box::new(body)),
            span,
        ))
    }

    /// Parse an optional constraint prefix `C => ` or `(C1, C2, ...) => `
    /// and attach each constraint to its binder.
    fn parse_constraints(&mut self, binders: &mut Vec<AnnBinder>) -> Result<(), Diagnostic> {
        let single_constraint = matches!(
            self.current_kind(),
            TokenKind::EqKw | TokenKind::OrdKw | TokenKind::NumKw
        ) || (matches!(self.current_kind(), TokenKind::Ident(_))
            && matches!(self.peek_kind(1), Some(TokenKind::Backslash)));

        let raw = if single_constraint {
            let item = self.raw_constraint()?;
            self.expect(&TokenKind::FatArrow, "expected `=>` after constraint")?;
            vec![item]
        } else if self.check(&TokenKind::LParen) {
            // `(` may open a constraint list or a parenthesised type;
            // commit only if the shape `(...) =>` parses through.
            let save = self.pos;
            match self.speculative_constraint_list() {
                Some(items) => items,
                None => {
                    self.pos = save;
                    return Ok(());
                }
            }
        } else {
            return Ok(());
        };

        for item in raw {
            self.attach_constraint(binders, item)?;
        }
        Ok(())
    }

    fn speculative_constraint_list(&mut self) -> Option<Vec<RawConstraint>> {
        self.advance(); // `(`
        let mut items = Vec::new();
        loop {
            items.push(self.raw_constraint().ok()?);
            if self.check(&TokenKind::RParen) {
                break;
            }
            if !self.match_token(&TokenKind::Comma) {
                return None;
            }
        }
        self.advance(); // `)`
        if !self.match_token(&TokenKind::FatArrow) {
            return None;
        }
        Some(items)
    }

    /// `Eq a`, `Ord a`, `Num a` or `r \ l`.
    fn raw_constraint(&mut self) -> Result<RawConstraint, Diagnostic> {
        let span = self.current_span();
        match self.current_kind().clone() {
            TokenKind::EqKw | TokenKind::OrdKw | TokenKind::NumKw => {
                let class = match self.current_kind() {
                    TokenKind::EqKw => ClassName::Eq,
                    TokenKind::OrdKw => ClassName::Ord,
                    _ => ClassName::Num,
                };
                self.advance();
                let var = self.lower_ident("expected a type variable in class constraint")?;
                Ok(RawConstraint::Class(class, var.node, span.merge(var.span)))
            }
            TokenKind::Ident(var) => {
                self.advance();
                self.expect(&TokenKind::Backslash, "expected `\\` in row constraint")?;
                let label = self.lower_ident("expected a label in row constraint")?;
                Ok(RawConstraint::Lacks(var, label.node, span.merge(label.span)))
            }
            other => Err(self.error_at_current(format!(
                "expected a constraint, found {}",
                other.describe()
            ))),
        }
    }

    fn attach_constraint(
        &self,
        binders: &mut [AnnBinder],
        item: RawConstraint,
    ) -> Result<(), Diagnostic> {
        let (var, span) = match &item {
            RawConstraint::Class(_, var, span) | RawConstraint::Lacks(var, _, span) => {
                (var.clone(), *span)
            }
        };
        let Some(binder) = binders.iter_mut().find(|b| b.name == var) else {
            return Err(Diagnostic::error(
                Category::ConstraintScope,
                format!("constraint references `{var}`, which is not bound by this forall"),
            )
            .at(self.location(span)));
        };
        match item {
            RawConstraint::Class(class, _, _) => match &binder.constraint {
                AnnConstraint::None => binder.constraint = AnnConstraint::Class(class),
                AnnConstraint::Class(existing) if *existing == class => {}
                _ => {
                    return Err(Diagnostic::error(
                        Category::ConstraintScope,
                        format!("conflicting constraints for type variable `{var}`"),
                    )
                    .at(self.location(span)));
                }
            },
            RawConstraint::Lacks(_, label, _) => match &mut binder.constraint {
                AnnConstraint::None => {
                    binder.constraint = AnnConstraint::Lacks([label].into_iter().collect());
                }
                AnnConstraint::Lacks(labels) => {
                    labels.insert(label);
                }
                AnnConstraint::Class(_) => {
                    return Err(Diagnostic::error(
                        Category::ConstraintScope,
                        format!("conflicting constraints for type variable `{var}`"),
                    )
                    .at(self.location(span)));
                }
            },
        }
        Ok(())
    }

    fn fun_type(&mut self) -> Result<TypeAnn, Diagnostic> {
        let dom = self.app_type()?;
        if self.match_token(&TokenKind::Arrow) {
            let cod = self.fun_type()?;
            let span = dom.span.merge(cod.span);
            return Ok(TypeAnn::new(
                TypeAnnKind::Fun(Box::new(dom), Box::new(cod)),
                span,
            ));
        }
        Ok(dom)
    }

    fn app_type(&mut self) -> Result<TypeAnn, Diagnostic> {
        let head = self.atom_type()?;
        // Only synonyms are applied; ground types and variables take no
        // arguments, so anything else falls through to the caller.
        if let TypeAnnKind::Synonym(name, args) = &head.node
            && args.is_empty()
            && starts_atom_type(self.current_kind())
        {
            let name = name.clone();
            let mut args = Vec::new();
            let mut span = head.span;
            while starts_atom_type(self.current_kind()) {
                let arg = self.atom_type()?;
                span = span.merge(arg.span);
                args.push(arg);
            }
            return Ok(TypeAnn::new(TypeAnnKind::Synonym(name, args), span));
        }
        Ok(head)
    }

    fn atom_type(&mut self) -> Result<TypeAnn, Diagnostic> {
        let span = self.current_span();
        match self.current_kind().clone() {
            TokenKind::UpperIdent(name) => {
                self.advance();
                let kind = match name.as_str() {
                    "Int" => TypeAnnKind::Int,
                    "Dbl" => TypeAnnKind::Dbl,
                    "Bool" => TypeAnnKind::Bool,
                    "Char" => TypeAnnKind::Char,
                    "Text" => TypeAnnKind::Text,
                    _ => TypeAnnKind::Synonym(name, Vec::new()),
                };
                Ok(TypeAnn::new(kind, span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(TypeAnn::new(TypeAnnKind::Var(name), span))
            }
            TokenKind::Underscore => {
                self.advance();
                Ok(TypeAnn::new(TypeAnnKind::Wildcard, span))
            }
            TokenKind::LBracket => {
                self.advance();
                let elem = self.type_ann()?;
                let end = self.current_span();
                self.expect(&TokenKind::RBracket, "expected `]` to close list type")?;
                Ok(TypeAnn::new(
                    TypeAnnKind::List(Box::new(elem)),
                    span.merge(end),
                ))
            }
            TokenKind::LBrace => self.record_type(),
            TokenKind::Lt => self.variant_type(),
            TokenKind::Diamond => {
                self.advance();
                Ok(TypeAnn::new(
                    TypeAnnKind::Variant(Box::new(TypeAnn::new(TypeAnnKind::RowEmpty, span))),
                    span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.type_ann()?;
                self.expect(&TokenKind::RParen, "expected `)` in type")?;
                Ok(inner)
            }
            other => Err(self.error_at_current(format!(
                "expected a type, found {}",
                other.describe()
            ))),
        }
    }

    /// `{ l1: T1, l2: T2 | tail }`
    fn record_type(&mut self) -> Result<TypeAnn, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace, "expected `{`")?;
        let mut fields = Vec::new();
        if !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Pipe) {
            loop {
                let label = self.lower_ident("expected a field label")?;
                self.expect(&TokenKind::Colon, "expected `:` after field label")?;
                let ty = self.type_ann()?;
                fields.push((label.node, ty, label.span));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let tail = if self.match_token(&TokenKind::Pipe) {
            self.row_tail()?
        } else {
            TypeAnn::new(TypeAnnKind::RowEmpty, self.current_span())
        };
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "expected `}` to close record type")?;
        let span = start.merge(end);
        Ok(TypeAnn::new(
            TypeAnnKind::Record(Box::new(build_row_ann(fields, tail))),
            span,
        ))
    }

    /// `< C1: T1, C2: T2 | tail >`. `|` is also accepted between entries.
    fn variant_type(&mut self) -> Result<TypeAnn, Diagnostic> {
        let start = self.current_span();
        self.expect(&TokenKind::Lt, "expected `<`")?;
        let mut fields = Vec::new();
        let mut tail = None;
        if !self.check_gt() {
            loop {
                match self.current_kind().clone() {
                    TokenKind::UpperIdent(label) => {
                        let label_span = self.current_span();
                        self.advance();
                        self.expect(&TokenKind::Colon, "expected `:` after variant constructor")?;
                        let ty = self.type_ann()?;
                        fields.push((label, ty, label_span));
                    }
                    TokenKind::Ident(name) => {
                        let var_span = self.current_span();
                        self.advance();
                        tail = Some(TypeAnn::new(TypeAnnKind::Var(name), var_span));
                        break;
                    }
                    TokenKind::Underscore => {
                        let var_span = self.current_span();
                        self.advance();
                        tail = Some(TypeAnn::new(TypeAnnKind::Wildcard, var_span));
                        break;
                    }
                    other => {
                        return Err(self.error_at_current(format!(
                            "expected a variant constructor or row variable, found {}",
                            other.describe()
                        )));
                    }
                }
                if !(self.match_token(&TokenKind::Comma) || self.match_token(&TokenKind::Pipe)) {
                    break;
                }
            }
        }
        let tail = tail.unwrap_or_else(|| TypeAnn::new(TypeAnnKind::RowEmpty, self.current_span()));
        let end = self.current_span();
        self.expect_gt()?;
        let span = start.merge(end);
        Ok(TypeAnn::new(
            TypeAnnKind::Variant(Box::new(build_row_ann(fields, tail))),
            span,
        ))
    }

    fn row_tail(&mut self) -> Result<TypeAnn, Diagnostic> {
        let span = self.current_span();
        match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(TypeAnn::new(TypeAnnKind::Var(name), span))
            }
            TokenKind::Underscore => {
                self.advance();
                Ok(TypeAnn::new(TypeAnnKind::Wildcard, span))
            }
            other => Err(self.error_at_current(format!(
                "expected a row variable after `|`, found {}",
                other.describe()
            ))),
        }
    }

    // -- Unbound-variable check --

    /// The free type variables of an annotation, minus wildcards, must all
    /// be bound by some enclosing `forall` (or, for synonym bodies, by the
    /// declaration's formal parameters).
    fn check_unbound_ty_vars(
        &self,
        ann: &TypeAnn,
        bound: &BTreeSet<String>,
    ) -> Result<(), Diagnostic> {
        let mut unbound = Vec::new();
        collect_unbound(ann, bound, &mut unbound);
        if let Some((first_span, _)) = unbound.first() {
            let mut names: Vec<String> = unbound.iter().map(|(_, n)| n.clone()).collect();
            names.sort();
            names.dedup();
            return Err(Diagnostic::error(
                Category::UnboundTypeVariable,
                format!("unbound type variable(s): {}", names.join(", ")),
            )
            .at(self.location(*first_span))
            .with_help("bind them with `forall`, or use `_` for an inferred type"));
        }
        Ok(())
    }

    // -- Token helpers --

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn current_span(&self) -> Span {
        self.current().span
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current_kind() == kind
    }

    /// `>` also hides in `>>`: split the token in place when a variant type
    /// is being closed, the same way parsers of generics-heavy languages do.
    fn check_gt(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Gt | TokenKind::GtGt)
    }

    fn expect_gt(&mut self) -> Result<(), Diagnostic> {
        match self.current_kind() {
            TokenKind::Gt => {
                self.advance();
                Ok(())
            }
            TokenKind::GtGt => {
                let token = &mut self.tokens[self.pos];
                token.kind = TokenKind::Gt;
                token.span.start += 1;
                Ok(())
            }
            other => {
                let msg = format!("expected `>` to close variant type, found {}", other.describe());
                Err(self.error_at_current(msg))
            }
        }
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<(), Diagnostic> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_at_current(format!(
                "{message}, found {}",
                self.current_kind().describe()
            )))
        }
    }

    fn expect_eof(&mut self) -> Result<(), Diagnostic> {
        if self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error_at_current(format!(
                "unexpected {} after expression",
                self.current_kind().describe()
            )))
        }
    }

    fn lower_ident(&mut self, message: &str) -> Result<Spanned<String>, Diagnostic> {
        let span = self.current_span();
        if let TokenKind::Ident(name) = self.current_kind().clone() {
            self.advance();
            Ok(Spanned::new(name, span))
        } else {
            Err(self.error_at_current(format!(
                "{message}, found {}",
                self.current_kind().describe()
            )))
        }
    }

    fn upper_ident(&mut self, message: &str) -> Result<Spanned<String>, Diagnostic> {
        let span = self.current_span();
        if let TokenKind::UpperIdent(name) = self.current_kind().clone() {
            self.advance();
            Ok(Spanned::new(name, span))
        } else {
            Err(self.error_at_current(format!(
                "{message}, found {}",
                self.current_kind().describe()
            )))
        }
    }

    fn error_at_current(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(Category::Syntax, message).at(self.location(self.current_span()))
    }

    fn location(&self, span: Span) -> SourceLocation {
        SourceLocation {
            file_id: self.file.0,
            start: span.start,
            end: span.end,
        }
    }
}

// ---------------------------------------------------------------------------
// Desugaring helpers
// ---------------------------------------------------------------------------

enum RecItem {
    /// `l = e` and the pun `l`.
    Extend(String, Expr, Span),
    /// `l := e`: extend over a restriction of the base.
    Update(String, Expr, Span),
}

enum RawConstraint {
    Class(ClassName, String, Span),
    Lacks(String, String, Span),
}

fn app(f: Expr, arg: Expr) -> Expr {
    let span = f.span.merge(arg.span);
    Expr::new(ExprKind::App(Box::new(f), Box::new(arg)), span)
}

/// Right-fold record items over a base expression.
fn desugar_record_items(items: Vec<RecItem>, base: Expr) -> Expr {
    items.into_iter().rev().fold(base, |acc, item| match item {
        RecItem::Extend(label, value, span) => {
            let extend = Expr::new(ExprKind::Prim(Prim::RecordExtend(label)), span);
            app(app(extend, value), acc)
        }
        RecItem::Update(label, value, span) => {
            let restrict = Expr::new(
                ExprKind::Prim(Prim::RecordRestrict(label.clone())),
                span,
            );
            let extend = Expr::new(ExprKind::Prim(Prim::RecordExtend(label)), span);
            app(app(extend, value), app(restrict, acc))
        }
    })
}

/// `(: T)` becomes the identity function annotated at `T -> T`, with the
/// function arrow lifted under any leading `forall`.
fn signature_section(ann: TypeAnn, span: Span) -> Expr {
    let lifted = match ann.node {
        TypeAnnKind::Forall(binders, body) => {
            let fun = TypeAnn::new(
                TypeAnnKind::Fun(body.clone(), body),
                ann.span,
            );
            TypeAnn::new(TypeAnnKind::Forall(binders, Box::new(fun)), ann.span)
        }
        other => {
            let body = Box::new(TypeAnn::new(other, ann.span));
            TypeAnn::new(TypeAnnKind::Fun(body.clone(), body), ann.span)
        }
    };
    let identity = Expr::new(
        ExprKind::Lam(
            Binder::new(BinderKind::Arg("x".to_string()), span),
            Box::new(Expr::new(ExprKind::Var("x".to_string()), span)),
        ),
        span,
    );
    Expr::new(ExprKind::Ann(Box::new(identity), lifted), span)
}

fn build_row_ann(fields: Vec<(String, TypeAnn, Span)>, tail: TypeAnn) -> TypeAnn {
    fields
        .into_iter()
        .rev()
        .fold(tail, |rest, (label, ty, span)| {
            let span = span.merge(rest.span);
            TypeAnn::new(
                TypeAnnKind::RowExtend(label, Box::new(ty), Box::new(rest)),
                span,
            )
        })
}

fn collect_unbound(ann: &TypeAnn, bound: &BTreeSet<String>, out: &mut Vec<(Span, String)>) {
    match &ann.node {
        TypeAnnKind::Var(name) => {
            if !bound.contains(name) {
                out.push((ann.span, name.clone()));
            }
        }
        TypeAnnKind::List(inner) | TypeAnnKind::Record(inner) | TypeAnnKind::Variant(inner) => {
            collect_unbound(inner, bound, out);
        }
        TypeAnnKind::Fun(dom, cod) => {
            collect_unbound(dom, bound, out);
            collect_unbound(cod, bound, out);
        }
        TypeAnnKind::Synonym(_, args) => {
            for arg in args {
                collect_unbound(arg, bound, out);
            }
        }
        TypeAnnKind::RowExtend(_, field, rest) => {
            collect_unbound(field, bound, out);
            collect_unbound(rest, bound, out);
        }
        TypeAnnKind::Forall(binders, body) => {
            let mut inner = bound.clone();
            inner.extend(binders.iter().map(|b| b.name.clone()));
            collect_unbound(body, &inner, out);
        }
        TypeAnnKind::Int
        | TypeAnnKind::Dbl
        | TypeAnnKind::Bool
        | TypeAnnKind::Char
        | TypeAnnKind::Text
        | TypeAnnKind::Wildcard
        | TypeAnnKind::RowEmpty => {}
    }
}

/// Tokens that can begin an application argument. Lambdas, conditionals and
/// `let` need parentheses in argument position.
fn starts_atom(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Int(_)
            | TokenKind::Dbl(_)
            | TokenKind::Str(_)
            | TokenKind::CharLit(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Ident(_)
            | TokenKind::UpperIdent(_)
            | TokenKind::LParen
            | TokenKind::LBrace
            | TokenKind::LBracket
            | TokenKind::LBracePipe
            | TokenKind::LAnglePipe
    )
}

fn starts_binder(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident(_)
            | TokenKind::RecordWildcard
            | TokenKind::LBrace
            | TokenKind::LParen
    )
}

fn starts_atom_type(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::UpperIdent(_)
            | TokenKind::Ident(_)
            | TokenKind::Underscore
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Lt
            | TokenKind::Diamond
            | TokenKind::LParen
    )
}

/// Binary operator table: `(primitive, binding power, right-assoc)`.
/// Application binds tighter than all of these; `||` binds loosest.
fn binary_op(kind: &TokenKind) -> Option<(Prim, u8, bool)> {
    Some(match kind {
        TokenKind::OrOr => (Prim::Or, 1, true),
        TokenKind::AndAnd => (Prim::And, 2, true),
        TokenKind::EqEq => (Prim::Eq, 3, false),
        TokenKind::SlashEq => (Prim::NEq, 3, false),
        TokenKind::Gt => (Prim::Gt, 3, false),
        TokenKind::GtEq => (Prim::Gte, 3, false),
        TokenKind::Lt => (Prim::Lt, 3, false),
        TokenKind::LtEq => (Prim::Lte, 3, false),
        TokenKind::PlusPlus => (Prim::ListAppend, 4, false),
        TokenKind::ColonColon => (Prim::ListCons, 4, true),
        TokenKind::Diamond => (Prim::TextAppend, 4, false),
        TokenKind::Plus => (Prim::Add, 5, false),
        TokenKind::Minus => (Prim::Sub, 5, false),
        TokenKind::Star => (Prim::Mul, 6, false),
        TokenKind::Slash => (Prim::Div, 6, false),
        TokenKind::GtGt => (Prim::FwdComp, 7, true),
        TokenKind::LtLt => (Prim::BwdComp, 7, true),
        _ => return None,
    })
}
