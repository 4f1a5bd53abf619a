//! Hand-written lexer for Tern source code.
//!
//! Whitespace is insignificant (no layout). Line comments start with `--`,
//! block comments are `{- ... -}` and nest. Identifiers are a letter followed
//! by alphanumerics, `_` or `'`; the initial letter's case separates the two
//! identifier namespaces. Numeric literals produce `Int` unless a decimal
//! point or exponent is present.

use tern_ast::{FileId, Span};
use tern_diag::{Category, Diagnostic, SourceLocation};

use crate::token::{Token, TokenKind};

/// Lex source text into a sequence of tokens.
///
/// Returns `Ok(tokens)` where the last token is always `Eof`, or the first
/// lexical error.
pub fn lex(source: &str, file: FileId) -> Result<Vec<Token>, Diagnostic> {
    let mut lexer = Lexer::new(source, file);
    lexer.scan_all()?;
    Ok(lexer.tokens)
}

struct Lexer<'src> {
    source: &'src [u8],
    file: FileId,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str, file: FileId) -> Self {
        Self {
            source: source.as_bytes(),
            file,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn scan_all(&mut self) -> Result<(), Diagnostic> {
        loop {
            self.skip_whitespace_and_comments()?;
            if self.is_at_end() {
                self.emit(TokenKind::Eof, self.pos, self.pos);
                return Ok(());
            }
            self.scan_token()?;
        }
    }

    fn scan_token(&mut self) -> Result<(), Diagnostic> {
        let start = self.pos;
        let ch = self.advance();

        match ch {
            b'(' => self.emit(TokenKind::LParen, start, self.pos),
            b')' => self.emit(TokenKind::RParen, start, self.pos),
            b'[' => self.emit(TokenKind::LBracket, start, self.pos),
            b']' => self.emit(TokenKind::RBracket, start, self.pos),
            b',' => self.emit(TokenKind::Comma, start, self.pos),
            b';' => self.emit(TokenKind::Semi, start, self.pos),
            b'.' => self.emit(TokenKind::Dot, start, self.pos),
            b'*' => self.emit(TokenKind::Star, start, self.pos),
            b'\\' => self.emit(TokenKind::Backslash, start, self.pos),

            b'{' => {
                // `{-` was consumed as a comment before we got here.
                if self.match_char(b'|') {
                    self.emit(TokenKind::LBracePipe, start, self.pos);
                } else if self.peek() == Some(b'.')
                    && self.peek_at(1) == Some(b'.')
                    && self.peek_at(2) == Some(b'}')
                {
                    self.pos += 3;
                    self.emit(TokenKind::RecordWildcard, start, self.pos);
                } else {
                    self.emit(TokenKind::LBrace, start, self.pos);
                }
            }
            b'}' => self.emit(TokenKind::RBrace, start, self.pos),

            b'+' => {
                if self.match_char(b'+') {
                    self.emit(TokenKind::PlusPlus, start, self.pos);
                } else {
                    self.emit(TokenKind::Plus, start, self.pos);
                }
            }
            b'-' => {
                if self.match_char(b'>') {
                    self.emit(TokenKind::Arrow, start, self.pos);
                } else {
                    self.emit(TokenKind::Minus, start, self.pos);
                }
            }
            b'/' => {
                if self.match_char(b'=') {
                    self.emit(TokenKind::SlashEq, start, self.pos);
                } else {
                    self.emit(TokenKind::Slash, start, self.pos);
                }
            }
            b'=' => {
                if self.match_char(b'=') {
                    self.emit(TokenKind::EqEq, start, self.pos);
                } else if self.match_char(b'>') {
                    self.emit(TokenKind::FatArrow, start, self.pos);
                } else {
                    self.emit(TokenKind::Equals, start, self.pos);
                }
            }
            b':' => {
                if self.match_char(b':') {
                    self.emit(TokenKind::ColonColon, start, self.pos);
                } else if self.match_char(b'=') {
                    self.emit(TokenKind::ColonEq, start, self.pos);
                } else {
                    self.emit(TokenKind::Colon, start, self.pos);
                }
            }
            b'<' => {
                if self.match_char(b'|') {
                    self.emit(TokenKind::LAnglePipe, start, self.pos);
                } else if self.match_char(b'=') {
                    self.emit(TokenKind::LtEq, start, self.pos);
                } else if self.match_char(b'<') {
                    self.emit(TokenKind::LtLt, start, self.pos);
                } else if self.match_char(b'>') {
                    self.emit(TokenKind::Diamond, start, self.pos);
                } else {
                    self.emit(TokenKind::Lt, start, self.pos);
                }
            }
            b'>' => {
                if self.match_char(b'=') {
                    self.emit(TokenKind::GtEq, start, self.pos);
                } else if self.match_char(b'>') {
                    self.emit(TokenKind::GtGt, start, self.pos);
                } else {
                    self.emit(TokenKind::Gt, start, self.pos);
                }
            }
            b'|' => {
                if self.match_char(b'|') {
                    self.emit(TokenKind::OrOr, start, self.pos);
                } else if self.match_char(b'}') {
                    self.emit(TokenKind::PipeRBrace, start, self.pos);
                } else if self.match_char(b'>') {
                    self.emit(TokenKind::PipeRAngle, start, self.pos);
                } else {
                    self.emit(TokenKind::Pipe, start, self.pos);
                }
            }
            b'&' => {
                if self.match_char(b'&') {
                    self.emit(TokenKind::AndAnd, start, self.pos);
                } else {
                    return Err(self.error_at(start, "unexpected character `&`"));
                }
            }

            b'"' => return self.scan_string(start),
            b'\'' => return self.scan_char(start),

            b'_' => {
                if self.peek().is_some_and(is_ident_continue) {
                    return Err(self
                        .error_at(start, "identifiers must start with a letter")
                        .with_help("`_` alone is the type wildcard"));
                }
                self.emit(TokenKind::Underscore, start, self.pos);
            }

            c if c.is_ascii_digit() => return self.scan_number(start),
            c if c.is_ascii_alphabetic() => self.scan_identifier(start),

            c => {
                return Err(self.error_at(start, format!("unexpected character `{}`", c as char)));
            }
        }
        Ok(())
    }

    fn scan_identifier(&mut self, start: usize) {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("identifier bytes are ASCII")
            .to_string();
        let kind = match text.as_str() {
            "let" => TokenKind::Let,
            "in" => TokenKind::In,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "case" => TokenKind::Case,
            "of" => TokenKind::Of,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "forall" => TokenKind::Forall,
            "type" => TokenKind::TypeKw,
            "import" => TokenKind::Import,
            "override" => TokenKind::Override,
            "Eq" => TokenKind::EqKw,
            "Ord" => TokenKind::OrdKw,
            "Num" => TokenKind::NumKw,
            _ => {
                if text.as_bytes()[0].is_ascii_uppercase() {
                    TokenKind::UpperIdent(text)
                } else {
                    TokenKind::Ident(text)
                }
            }
        };
        self.emit(kind, start, self.pos);
    }

    fn scan_number(&mut self, start: usize) -> Result<(), Diagnostic> {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        let mut is_double = false;
        // A decimal part: `.` followed by a digit, so `1.x` stays projection.
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_double = true;
            self.advance();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                lookahead = 2;
            }
            if self.peek_at(lookahead).is_some_and(|b| b.is_ascii_digit()) {
                is_double = true;
                self.pos += lookahead;
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.advance();
                }
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("numeric literal bytes are ASCII");
        if is_double {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error_at(start, format!("invalid double literal `{text}`")))?;
            self.emit(TokenKind::Dbl(value), start, self.pos);
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error_at(start, format!("integer literal `{text}` is out of range")))?;
            self.emit(TokenKind::Int(value), start, self.pos);
        }
        Ok(())
    }

    fn scan_string(&mut self, start: usize) -> Result<(), Diagnostic> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "unterminated string literal")),
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let escaped = self.scan_escape(start)?;
                    value.push(escaped);
                }
                Some(_) => {
                    let ch = self.advance_char(start)?;
                    value.push(ch);
                }
            }
        }
        self.emit(TokenKind::Str(value), start, self.pos);
        Ok(())
    }

    fn scan_char(&mut self, start: usize) -> Result<(), Diagnostic> {
        let ch = match self.peek() {
            None => return Err(self.error_at(start, "unterminated character literal")),
            Some(b'\\') => {
                self.advance();
                self.scan_escape(start)?
            }
            Some(b'\'') => {
                return Err(self.error_at(start, "empty character literal"));
            }
            Some(_) => self.advance_char(start)?,
        };
        if self.peek() != Some(b'\'') {
            return Err(self.error_at(start, "unterminated character literal"));
        }
        self.advance();
        self.emit(TokenKind::CharLit(ch), start, self.pos);
        Ok(())
    }

    fn scan_escape(&mut self, start: usize) -> Result<char, Diagnostic> {
        let Some(code) = self.peek() else {
            return Err(self.error_at(start, "unterminated escape sequence"));
        };
        self.advance();
        Ok(match code {
            b'n' => '\n',
            b't' => '\t',
            b'r' => '\r',
            b'0' => '\0',
            b'\\' => '\\',
            b'\'' => '\'',
            b'"' => '"',
            other => {
                return Err(self.error_at(
                    start,
                    format!("unknown escape sequence `\\{}`", other as char),
                ));
            }
        })
    }

    /// Advance over one (possibly multi-byte) UTF-8 character.
    fn advance_char(&mut self, start: usize) -> Result<char, Diagnostic> {
        let rest = std::str::from_utf8(&self.source[self.pos..])
            .map_err(|_| self.error_at(start, "invalid UTF-8 in literal"))?;
        let ch = rest
            .chars()
            .next()
            .ok_or_else(|| self.error_at(start, "unexpected end of input"))?;
        self.pos += ch.len_utf8();
        Ok(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.advance();
                    }
                }
                Some(b'{') if self.peek_at(1) == Some(b'-') => {
                    self.skip_block_comment()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), Diagnostic> {
        let start = self.pos;
        self.pos += 2; // consume `{-`
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(self.error_at(start, "unterminated block comment")),
                Some(b'{') if self.peek_at(1) == Some(b'-') => {
                    depth += 1;
                    self.pos += 2;
                }
                Some(b'-') if self.peek_at(1) == Some(b'}') => {
                    depth -= 1;
                    self.pos += 2;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        Ok(())
    }

    // -- Low-level helpers --

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> u8 {
        let b = self.source[self.pos];
        self.pos += 1;
        b
    }

    fn match_char(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(self.file, start as u32, end as u32),
        });
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(Category::Syntax, message).at(SourceLocation {
            file_id: self.file.0,
            start: offset as u32,
            end: (offset + 1).min(self.source.len()) as u32,
        })
    }
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'\''
}
