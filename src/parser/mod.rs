/// Parser for `.gir` listings
///
/// Hand-written recursive descent parser for the textual form of the IR
/// and its declarations.

mod lexer;
mod parser;

pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{ParseError, Parser};
