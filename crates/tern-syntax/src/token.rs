//! Token types produced by the Tern lexer.

use tern_ast::Span;

/// A token with its kind and source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // -- Literals --
    Int(i64),
    Dbl(f64),
    Str(String),
    CharLit(char),

    // -- Identifiers --
    /// Lowercase-initial identifier: `foo`, `bar'`.
    Ident(String),
    /// Uppercase-initial identifier: `Just`, `Maybe`.
    UpperIdent(String),
    /// The wildcard `_`.
    Underscore,

    // -- Keywords --
    Let,
    In,
    If,
    Then,
    Else,
    Case,
    Of,
    True,
    False,
    Forall,
    TypeKw,
    Import,
    Override,
    EqKw,
    OrdKw,
    NumKw,

    // -- Operators --
    Arrow,     // ->
    Equals,    // =
    Minus,     // -
    Star,      // *
    Slash,     // /
    Plus,      // +
    PlusPlus,  // ++
    ColonColon, // ::
    Pipe,      // |
    Comma,     // ,
    Dot,       // .
    Backslash, // \
    ColonEq,   // :=
    EqEq,      // ==
    SlashEq,   // /=
    Gt,        // >
    GtEq,      // >=
    Lt,        // <
    LtEq,      // <=
    AndAnd,    // &&
    OrOr,      // ||
    Colon,     // :
    FatArrow,  // =>
    GtGt,      // >>
    LtLt,      // <<
    Diamond,   // <>
    Semi,      // ;

    // -- Delimiters --
    LParen,         // (
    RParen,         // )
    LBrace,         // {
    RBrace,         // }
    LBracket,       // [
    RBracket,       // ]
    LBracePipe,     // {|
    PipeRBrace,     // |}
    LAnglePipe,     // <|
    PipeRAngle,     // |>
    RecordWildcard, // {..}

    Eof,
}

impl TokenKind {
    /// A short human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(n) => format!("integer `{n}`"),
            TokenKind::Dbl(d) => format!("double `{d}`"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::CharLit(c) => format!("character `{c}`"),
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::UpperIdent(name) => format!("identifier `{name}`"),
            TokenKind::Underscore => "`_`".to_string(),
            TokenKind::Let => "`let`".to_string(),
            TokenKind::In => "`in`".to_string(),
            TokenKind::If => "`if`".to_string(),
            TokenKind::Then => "`then`".to_string(),
            TokenKind::Else => "`else`".to_string(),
            TokenKind::Case => "`case`".to_string(),
            TokenKind::Of => "`of`".to_string(),
            TokenKind::True => "`True`".to_string(),
            TokenKind::False => "`False`".to_string(),
            TokenKind::Forall => "`forall`".to_string(),
            TokenKind::TypeKw => "`type`".to_string(),
            TokenKind::Import => "`import`".to_string(),
            TokenKind::Override => "`override`".to_string(),
            TokenKind::EqKw => "`Eq`".to_string(),
            TokenKind::OrdKw => "`Ord`".to_string(),
            TokenKind::NumKw => "`Num`".to_string(),
            TokenKind::Arrow => "`->`".to_string(),
            TokenKind::Equals => "`=`".to_string(),
            TokenKind::Minus => "`-`".to_string(),
            TokenKind::Star => "`*`".to_string(),
            TokenKind::Slash => "`/`".to_string(),
            TokenKind::Plus => "`+`".to_string(),
            TokenKind::PlusPlus => "`++`".to_string(),
            TokenKind::ColonColon => "`::`".to_string(),
            TokenKind::Pipe => "`|`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Backslash => "`\\`".to_string(),
            TokenKind::ColonEq => "`:=`".to_string(),
            TokenKind::EqEq => "`==`".to_string(),
            TokenKind::SlashEq => "`/=`".to_string(),
            TokenKind::Gt => "`>`".to_string(),
            TokenKind::GtEq => "`>=`".to_string(),
            TokenKind::Lt => "`<`".to_string(),
            TokenKind::LtEq => "`<=`".to_string(),
            TokenKind::AndAnd => "`&&`".to_string(),
            TokenKind::OrOr => "`||`".to_string(),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::FatArrow => "`=>`".to_string(),
            TokenKind::GtGt => "`>>`".to_string(),
            TokenKind::LtLt => "`<<`".to_string(),
            TokenKind::Diamond => "`<>`".to_string(),
            TokenKind::Semi => "`;`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::LBrace => "`{`".to_string(),
            TokenKind::RBrace => "`}`".to_string(),
            TokenKind::LBracket => "`[`".to_string(),
            TokenKind::RBracket => "`]`".to_string(),
            TokenKind::LBracePipe => "`{|`".to_string(),
            TokenKind::PipeRBrace => "`|}`".to_string(),
            TokenKind::LAnglePipe => "`<|`".to_string(),
            TokenKind::PipeRAngle => "`|>`".to_string(),
            TokenKind::RecordWildcard => "`{..}`".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}
