//! Ошибки разбора исходника модуля.

use super::token::{Span, Token};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token at byte {}: expected {expected}, found {found}", span.start)]
    UnexpectedToken {
        span: Span,
        expected: String,
        found: String,
    },

    #[error("unexpected end of input at byte {}: {message}", span.start)]
    UnexpectedEof { span: Span, message: String },

    #[error("unclosed parenthesis opened at byte {}", span.start)]
    UnclosedParen { span: Span },

    #[error("invalid literal at byte {}: {text}", span.start)]
    InvalidLiteral { span: Span, text: String },

    #[error("unexpected character at byte {}", span.start)]
    UnexpectedChar { span: Span },
}

impl ParseError {
    pub fn unexpected_token(span: Span, expected: impl Into<String>, found: &Token) -> Self {
        Self::UnexpectedToken {
            span,
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. }
            | Self::UnexpectedEof { span, .. }
            | Self::UnclosedParen { span }
            | Self::InvalidLiteral { span, .. }
            | Self::UnexpectedChar { span } => *span,
        }
    }
}
