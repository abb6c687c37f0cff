//! Rockstar Compiler
//!
//! Tokenizes Rockstar source into the `Token` stream the runtime evaluates.

pub mod lexer;
pub mod tokens;

pub use lexer::{tokenize, LexError};
pub use tokens::{Token, TokenKind};
