//! The lexer.
//!
//! Matches longest-prefix-first against a fixed table of regexes, rather
//! than a hand-written character-class switch.

use derive_more::Display;
use regex::Regex;

use crate::common::Span;

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("num")]
    Num,
    #[display("if")]
    KwIf,
    #[display("else")]
    KwElse,
    #[display("while")]
    KwWhile,
    #[display("return")]
    KwReturn,
    #[display("i8")]
    TyI8,
    #[display("i16")]
    TyI16,
    #[display("i32")]
    TyI32,
    #[display("i64")]
    TyI64,
    #[display(":")]
    Colon,
    #[display("=")]
    Assign,
    #[display(";")]
    Semi,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("<=")]
    Le,
    #[display("<")]
    Lt,
    #[display("!=")]
    Ne,
    #[display("==")]
    EqEq,
    #[display("eof")]
    Eof,
}

/// A token in the program.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub span: Span,
}

#[derive(thiserror::Error, Debug)]
#[error("line {line}: unexpected character {ch:?}")]
pub struct LexError {
    pub line: u32,
    pub ch: char,
    pub span: Span,
}

struct Matcher {
    regex: Regex,
    kind: TokenKind,
}

pub struct Lexer<'src> {
    input: &'src str,
    pos: usize,
    line: u32,
    whitespace: Regex,
    matchers: Vec<Matcher>,
    peeked: Option<Token<'src>>,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src str) -> Self {
        use TokenKind::*;

        // Keywords and multi-char operators are listed before the
        // generic identifier/operator patterns they would otherwise be
        // swallowed by, since matchers are tried in order.
        let matchers = vec![
            (r"\Aif\b", KwIf),
            (r"\Aelse\b", KwElse),
            (r"\Awhile\b", KwWhile),
            (r"\Areturn\b", KwReturn),
            (r"\Ai8\b", TyI8),
            (r"\Ai16\b", TyI16),
            (r"\Ai32\b", TyI32),
            (r"\Ai64\b", TyI64),
            (r"\A[A-Za-z_][A-Za-z0-9_]*", Id),
            (r"\A[0-9]+", Num),
            (r"\A<=", Le),
            (r"\A!=", Ne),
            (r"\A==", EqEq),
            (r"\A:", Colon),
            (r"\A=", Assign),
            (r"\A;", Semi),
            (r"\A\{", LBrace),
            (r"\A\}", RBrace),
            (r"\A\(", LParen),
            (r"\A\)", RParen),
            (r"\A\+", Plus),
            (r"\A-", Minus),
            (r"\A\*", Star),
            (r"\A/", Slash),
            (r"\A<", Lt),
        ]
        .into_iter()
        .map(|(pattern, kind)| Matcher {
            regex: Regex::new(pattern).unwrap(),
            kind,
        })
        .collect();

        Lexer {
            input,
            pos: 0,
            line: 1,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://[^\n]*))*").unwrap(),
            matchers,
            peeked: None,
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len() && self.peeked.is_none()
    }

    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.line += self.input[self.pos..self.pos + m.end()]
                .bytes()
                .filter(|&b| b == b'\n')
                .count() as u32;
            self.pos += m.end();
        }
    }

    /// Get the next token if possible, without consuming it.
    pub fn peek(&mut self) -> Result<Token<'src>, LexError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.advance()?);
        }
        Ok(self.peeked.unwrap())
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Token<'src>, LexError> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<Token<'src>, LexError> {
        self.skip_whitespace();

        let line = self.line;
        let start = self.pos;

        if self.pos == self.input.len() {
            return Ok(Token {
                kind: TokenKind::Eof,
                text: "",
                span: Span { start, end: start, line },
            });
        }

        let rest = &self.input[self.pos..];
        for m in &self.matchers {
            if let Some(found) = m.regex.find(rest) {
                let text = &rest[..found.end()];
                self.pos += found.end();
                return Ok(Token {
                    kind: m.kind,
                    text,
                    span: Span { start, end: self.pos, line },
                });
            }
        }

        let ch = rest.chars().next().unwrap();
        let span = Span {
            start,
            end: start + ch.len_utf8(),
            line,
        };
        Err(LexError { line, ch, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = vec![];
        loop {
            let tok = lexer.next().unwrap();
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn lexes_keywords_over_identifiers() {
        assert_eq!(kinds("if iffy"), vec![TokenKind::KwIf, TokenKind::Id]);
    }

    #[test]
    fn lexes_multichar_operators_before_prefixes() {
        assert_eq!(
            kinds("<= < != =="),
            vec![TokenKind::Le, TokenKind::Lt, TokenKind::Ne, TokenKind::EqEq]
        );
    }

    #[test]
    fn skips_comments_and_whitespace() {
        assert_eq!(
            kinds("x // comment\n  := 1"),
            vec![TokenKind::Id, TokenKind::Colon, TokenKind::Assign, TokenKind::Num]
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let mut lexer = Lexer::new("x y");
        assert_eq!(lexer.peek().unwrap().kind, TokenKind::Id);
        assert_eq!(lexer.next().unwrap().text, "x");
        assert_eq!(lexer.next().unwrap().text, "y");
    }

    #[test]
    fn reports_unexpected_character() {
        let mut lexer = Lexer::new("x @ y");
        lexer.next().unwrap();
        let err = lexer.next().unwrap_err();
        assert_eq!(err.ch, '@');
    }
}
