//! Разбор потока токенов в дерево S-выражений.

use super::error::ParseError;
use super::lexer::Lexer;
use super::token::{Span, Spanned, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Atom(Spanned<Atom>),
    List(Spanned<Vec<SExpr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Ident(String),
    Keyword(String),
    Symbol(String),
}

impl SExpr {
    pub fn span(&self) -> Span {
        match self {
            SExpr::Atom(atom) => atom.span,
            SExpr::List(list) => list.span,
        }
    }

    fn atom(&self) -> Option<&Atom> {
        match self {
            SExpr::Atom(atom) => Some(&atom.value),
            SExpr::List(_) => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self.atom()? {
            Atom::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self.atom()? {
            Atom::Keyword(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self.atom()? {
            Atom::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List(list) => Some(&list.value),
            SExpr::Atom(_) => None,
        }
    }

    /// Имя формы: первый элемент списка, если это идентификатор или оператор.
    pub fn form_name(&self) -> Option<&str> {
        match self.as_list()?.first()?.atom()? {
            Atom::Ident(s) | Atom::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
        }
    }

    /// Разобрать все выражения верхнего уровня.
    pub fn parse_all(&mut self) -> Result<Vec<SExpr>, ParseError> {
        let mut exprs = Vec::new();
        while self.lexer.peek_token()?.value != Token::Eof {
            exprs.push(self.parse_sexpr()?);
        }
        Ok(exprs)
    }

    pub fn parse_sexpr(&mut self) -> Result<SExpr, ParseError> {
        let token = self.lexer.next_token()?;
        let atom = match token.value {
            Token::LParen => return self.parse_list(token.span),
            Token::Int(n) => Atom::Int(n),
            Token::Float(f) => Atom::Float(f),
            Token::String(s) => Atom::String(s),
            Token::Bool(b) => Atom::Bool(b),
            Token::Ident(s) => Atom::Ident(s),
            Token::Keyword(s) => Atom::Keyword(s),
            Token::Symbol(s) => Atom::Symbol(s),
            Token::RParen => {
                return Err(ParseError::unexpected_token(
                    token.span,
                    "expression",
                    &Token::RParen,
                ))
            }
            Token::Eof => {
                return Err(ParseError::UnexpectedEof {
                    span: token.span,
                    message: "expected expression".to_string(),
                })
            }
        };
        Ok(SExpr::Atom(Spanned::new(atom, token.span)))
    }

    fn parse_list(&mut self, open: Span) -> Result<SExpr, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.lexer.peek_token()?.value {
                Token::RParen => {
                    let close = self.lexer.next_token()?;
                    return Ok(SExpr::List(Spanned::new(items, open.merge(close.span))));
                }
                Token::Eof => return Err(ParseError::UnclosedParen { span: open }),
                _ => items.push(self.parse_sexpr()?),
            }
        }
    }
}
