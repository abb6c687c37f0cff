//! Token kinds and the `Token` record the lexer emits and the evaluator
//! consumes.

use rockstar_core::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of token kinds. Aliases (`are`/`were`/`was`, `with`,
/// `of`, …) are folded onto their canonical kind during lexing, so the
/// evaluator never sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Article,
    Pronoun,
    Keyword,
    Identifier,
    String,
    Number,
    Variable,
    Is,
    Isnt,
    Into,
    Plus,
    Minus,
    Times,
    Over,
    True,
    False,
    Says,
    Shout,
    Let,
    Put,
    Be,
    Null,
    NewLine,
    Knock,
    Down,
    Build,
    Up,
    Comma,
    And,
    Or,
    Not,
    Takes,
    Taking,
    Give,
    Back,
    At,
    Mysterious,
    Rock,
    Like,
    Roll,
    Turn,
    If,
    Else,
    While,
    Until,
    Greater,
    Lower,
    As,
    Great,
    Little,
    Than,
    EndOfFile,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// `(kind, text, line)`: `text` is the canonical lower-cased lexeme for
/// identifiers, the verbatim body for strings, the decimal rendering for
/// numbers, or unused for pure keywords. `line` is 1-based.
///
/// `literal` is populated only by [`Token::from_value`] — it carries the
/// exact `Value` a computed sub-result was built from, so re-inserting it
/// into the expression reducer's postfix stream never has to round-trip
/// through `text` (which would lose booleans and arrays, since those
/// don't have a lossless token-kind encoding in the closed `TokenKind`
/// set above).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    #[serde(skip)]
    pub literal: Option<Value>,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            literal: None,
        }
    }

    /// Builds a token carrying a computed `Value`, for re-insertion into
    /// the expression reducer's token stream.
    pub fn from_value(value: Value, line: usize) -> Self {
        let (kind, text) = match &value {
            Value::Number(_) => (TokenKind::Number, value.as_string()),
            Value::String(s) => (TokenKind::String, s.clone()),
            Value::Null => (TokenKind::Null, value.as_string()),
            Value::Undefined => (TokenKind::Mysterious, value.as_string()),
            Value::Bool(true) => (TokenKind::True, value.as_string()),
            Value::Bool(false) => (TokenKind::False, value.as_string()),
            Value::Array(_) => (TokenKind::String, value.as_string()),
        };
        Self {
            kind,
            text,
            line,
            literal: Some(value),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} ({})", self.kind, self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_value_round_trips_booleans_without_text_parsing() {
        let tok = Token::from_value(Value::Bool(true), 1);
        assert_eq!(tok.kind, TokenKind::True);
        assert_eq!(tok.literal, Some(Value::Bool(true)));
    }

    #[test]
    fn from_value_preserves_arrays_that_text_cannot_encode() {
        let arr = Value::Array(vec![Value::Number(1.0), Value::String("a".into())]);
        let tok = Token::from_value(arr.clone(), 1);
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.literal, Some(arr));
    }

    #[test]
    fn display_includes_text_when_present() {
        let tok = Token::new(TokenKind::Variable, "tommy", 3);
        assert_eq!(tok.to_string(), "Variable (tommy)");
    }
}
