//! Лексер на базе logos.

use logos::Logos;

use super::error::ParseError;
use super::token::{Span, Spanned, Token};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r";[^\n]*")]
enum RawToken {
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    String(String),

    // Составные имена (`pkg.mod.NAME`) читаются одним токеном.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_\-]*(\.[a-zA-Z_][a-zA-Z0-9_\-]*)*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r":[a-zA-Z_][a-zA-Z0-9_\-]*", |lex| lex.slice()[1..].to_string())]
    Keyword(String),

    #[regex(r"==|!=|<=|>=|[+*/%<>]|-", |lex| lex.slice().to_string())]
    Symbol(String),
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other @ ('\\' | '"')) => out.push(other),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Поток токенов с просмотром на один вперёд.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, RawToken>,
    source: &'a str,
    peeked: Option<Spanned<Token>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: RawToken::lexer(source),
            source,
            peeked: None,
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned<Token>, ParseError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.read(),
        }
    }

    pub fn peek_token(&mut self) -> Result<&Spanned<Token>, ParseError> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.read()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn read(&mut self) -> Result<Spanned<Token>, ParseError> {
        let Some(raw) = self.inner.next() else {
            let end = self.source.len();
            return Ok(Spanned::new(Token::Eof, Span::new(end, end)));
        };

        let range = self.inner.span();
        let span = Span::new(range.start, range.end);

        let token = match raw {
            Ok(RawToken::LParen) => Token::LParen,
            Ok(RawToken::RParen) => Token::RParen,
            Ok(RawToken::Bool(b)) => Token::Bool(b),
            Ok(RawToken::Float(f)) => Token::Float(f),
            Ok(RawToken::Int(n)) => Token::Int(n),
            Ok(RawToken::String(s)) => Token::String(s),
            Ok(RawToken::Ident(s)) => Token::Ident(s),
            Ok(RawToken::Keyword(s)) => Token::Keyword(s),
            Ok(RawToken::Symbol(s)) => Token::Symbol(s),
            Err(()) => {
                let text = self.inner.slice();
                // Числовой литерал, не влезающий в i64.
                if text.trim_start_matches('-').starts_with(|c: char| c.is_ascii_digit()) {
                    return Err(ParseError::InvalidLiteral {
                        span,
                        text: text.to_string(),
                    });
                }
                return Err(ParseError::UnexpectedChar { span });
            }
        };

        Ok(Spanned::new(token, span))
    }
}
