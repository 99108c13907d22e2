//! Single-pass byte-stream lexer.
//!
//! Scans a source buffer directly into owned tokens: no intermediate
//! lexeme table, no unicode tables. Reserved words and the small
//! operator set are matched as each token is produced. `==` and `>=`
//! fully consume their second byte before returning; `<`/`<=` and `*`
//! round out the operator set the compiler's precedence table needs.

use nua_util::diagnostic::DiagnosticCode;
use nua_util::{Diagnostic, Handler, Span};

/// A reserved word or operator, or one of the four "general" token
/// shapes (`Ident`/`Number`/`Str`/`Eof`) carrying owned data.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(Box<[u8]>),
    Number(f64),
    Str(Box<[u8]>),

    Local,
    If,
    Then,
    Else,
    End,
    While,
    Do,
    Function,
    Return,
    Nil,
    Break,
    Continue,

    Assign,
    Eq,
    Plus,
    Minus,
    Star,
    Gt,
    Ge,
    Lt,
    Le,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Dot,

    Eof,
    /// Lexical error; the message has already been pushed to the
    /// `Handler` passed to `Lexer::next_token`.
    Error,
}

impl TokenKind {
    pub fn is_eof(&self) -> bool {
        matches!(self, TokenKind::Eof)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

fn keyword(bytes: &[u8]) -> Option<TokenKind> {
    Some(match bytes {
        b"local" => TokenKind::Local,
        b"if" => TokenKind::If,
        b"then" => TokenKind::Then,
        b"else" => TokenKind::Else,
        b"end" => TokenKind::End,
        b"while" => TokenKind::While,
        b"do" => TokenKind::Do,
        b"function" => TokenKind::Function,
        b"return" => TokenKind::Return,
        b"nil" => TokenKind::Nil,
        b"break" => TokenKind::Break,
        b"continue" => TokenKind::Continue,
        _ => return None,
    })
}

/// Byte-stream scanner. Holds no lookahead of its own; the compiler
/// keeps the "current" token and calls `next_token` to advance past
/// it, dropping the prior token's owned lexeme once it's no longer
/// referenced.
pub struct Lexer<'src> {
    src: &'src [u8],
    pos: usize,
    line: u32,
    line_start: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src [u8]) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    #[inline]
    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(b)
    }

    fn point_span(&self) -> Span {
        Span::new(self.pos, self.pos, self.line, (self.pos - self.line_start + 1) as u32)
    }

    fn span_from(&self, start: usize, start_line: u32, start_col: u32) -> Span {
        Span::new(start, self.pos, start_line, start_col)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn error(&mut self, handler: &Handler, message: impl Into<String>, code: DiagnosticCode, span: Span) -> Token {
        handler.emit_diagnostic(Diagnostic::error(message, span).with_code(code));
        Token::new(TokenKind::Error, span)
    }

    /// Scan and return the next token, reporting any lexical error to
    /// `handler` rather than panicking. It is the caller's job to stop
    /// calling `next_token` once an `Error`/`Eof` token comes back.
    pub fn next_token(&mut self, handler: &Handler) -> Token {
        self.skip_whitespace();

        let start = self.pos;
        let start_line = self.line;
        let start_col = (self.pos - self.line_start + 1) as u32;

        let Some(b) = self.peek() else {
            return Token::new(TokenKind::Eof, self.point_span());
        };

        if b == b'"' {
            return self.scan_string(handler, start, start_line, start_col);
        }
        if b.is_ascii_digit() {
            return self.scan_number(start, start_line, start_col);
        }
        if b.is_ascii_alphabetic() {
            return self.scan_ident(start, start_line, start_col);
        }
        self.scan_symbol(handler, start, start_line, start_col)
    }

    fn scan_ident(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        let bytes = &self.src[start..self.pos];
        let span = self.span_from(start, start_line, start_col);
        if let Some(kw) = keyword(bytes) {
            Token::new(kw, span)
        } else {
            Token::new(TokenKind::Ident(bytes.to_vec().into_boxed_slice()), span)
        }
    }

    fn scan_number(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b) if b.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mark = self.pos;
            self.bump();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.bump();
            }
            if matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = mark;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0");
        let value: f64 = text.parse().unwrap_or(0.0);
        let span = self.span_from(start, start_line, start_col);
        Token::new(TokenKind::Number(value), span)
    }

    fn scan_string(&mut self, handler: &Handler, start: usize, start_line: u32, start_col: u32) -> Token {
        self.bump(); // opening quote
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start, start_line, start_col);
                    return self.error(
                        handler,
                        "unterminated string literal",
                        DiagnosticCode::E_LEXER_UNTERMINATED_STRING,
                        span,
                    );
                }
                Some(b'\n') => {
                    self.bump();
                    let span = self.span_from(start, start_line, start_col);
                    return self.error(
                        handler,
                        "unexpected newline in string literal",
                        DiagnosticCode::E_LEXER_NEWLINE_IN_STRING,
                        span,
                    );
                }
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    match self.bump() {
                        Some(b'n') => out.push(b'\n'),
                        Some(other) => out.push(other),
                        None => {
                            let span = self.span_from(start, start_line, start_col);
                            return self.error(
                                handler,
                                "unterminated string literal",
                                DiagnosticCode::E_LEXER_UNTERMINATED_STRING,
                                span,
                            );
                        }
                    }
                }
                Some(other) => {
                    self.bump();
                    out.push(other);
                }
            }
        }
        let span = self.span_from(start, start_line, start_col);
        Token::new(TokenKind::Str(out.into_boxed_slice()), span)
    }

    fn scan_symbol(&mut self, handler: &Handler, start: usize, start_line: u32, start_col: u32) -> Token {
        let b = self.bump().expect("caller already peeked a byte");
        let kind = match b {
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            other => {
                let span = self.span_from(start, start_line, start_col);
                return self.error(
                    handler,
                    format!("unexpected character `{}`", other as char),
                    DiagnosticCode::E_LEXER_UNEXPECTED_CHAR,
                    span,
                );
            }
        };
        let span = self.span_from(start, start_line, start_col);
        Token::new(kind, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<TokenKind> {
        let handler = Handler::new();
        let mut lexer = Lexer::new(src.as_bytes());
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token(&handler);
            let done = tok.kind.is_eof() || matches!(tok.kind, TokenKind::Error);
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn keywords_are_recognized() {
        let toks = tokens("local if then else end while do function return nil break continue");
        assert_eq!(
            toks,
            vec![
                TokenKind::Local,
                TokenKind::If,
                TokenKind::Then,
                TokenKind::Else,
                TokenKind::End,
                TokenKind::While,
                TokenKind::Do,
                TokenKind::Function,
                TokenKind::Return,
                TokenKind::Nil,
                TokenKind::Break,
                TokenKind::Continue,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn operators_round_trip() {
        let toks = tokens("= == + - * > >= < <= { } [ ] ( ) , .");
        assert_eq!(
            toks,
            vec![
                TokenKind::Assign,
                TokenKind::Eq,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_literals_parse_as_f64() {
        let toks = tokens("42 3.5 0.25e2");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.5),
                TokenKind::Number(25.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let toks = tokens(r#""a\nb\\c\"d""#);
        assert_eq!(
            toks,
            vec![
                TokenKind::Str(b"a\nb\\c\"d".to_vec().into_boxed_slice()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let toks = tokens("\"abc");
        assert_eq!(toks, vec![TokenKind::Error]);
    }

    #[test]
    fn bare_newline_in_string_is_an_error() {
        let toks = tokens("\"abc\ndef\"");
        assert_eq!(toks, vec![TokenKind::Error]);
    }

    #[test]
    fn identifier_does_not_include_underscore() {
        let toks = tokens("foo_bar");
        // `_` is punctuation, not alnum, so the identifier stops before it.
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident(b"foo".to_vec().into_boxed_slice()),
                TokenKind::Error,
            ]
        );
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let handler = Handler::new();
        let mut lexer = Lexer::new(b"local\nx\n=\n1");
        lexer.next_token(&handler);
        assert_eq!(lexer.line(), 1);
        let tok = lexer.next_token(&handler);
        assert_eq!(tok.span.line, 2);
    }

    #[quickcheck_macros::quickcheck]
    fn number_round_trips_through_double(n: u32) -> bool {
        let src = n.to_string();
        let handler = Handler::new();
        let mut lexer = Lexer::new(src.as_bytes());
        matches!(lexer.next_token(&handler).kind, TokenKind::Number(v) if v == n as f64)
    }
}
