//! Парсер S-Expression для исходников модулей ASG.
//!
//! # Синтаксис
//!
//! ```lisp
//! ; комментарий до конца строки
//! 42  3.14  true  "text"  ()
//! pkg.mod.NAME            ; составное имя
//! :as                     ; ключевое слово
//! (let NAME (+ 1 2))
//! (fn square (x) (* x x))
//! (import pkg.util :as util)
//! ```

pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use error::ParseError;
pub use lexer::Lexer;
pub use parser::{Atom, Parser, SExpr};
pub use token::{Span, Spanned, Token};

/// Разобрать тело модуля в список форм верхнего уровня.
///
/// ```rust,ignore
/// use asg_loader::parser::parse_module;
///
/// let forms = parse_module("(let x 1) (let y x)").unwrap();
/// assert_eq!(forms.len(), 2);
/// ```
pub fn parse_module(source: &str) -> Result<Vec<SExpr>, ParseError> {
    Parser::new(source).parse_all()
}
