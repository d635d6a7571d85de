//! Expression language parser
//!
//! Parses the CEL subset used by rule and ruleset expressions.

pub mod lexer;
pub mod parse;
pub mod token;

pub use lexer::Lexer;
pub use parse::{parse, ParseError, ParseResult, Parser};
pub use token::{Token, TokenKind};
