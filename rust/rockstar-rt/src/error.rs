//! Errors an [`crate::Evaluator`] can surface while running a line.
//!
//! Every variant carries the source line so the CLI can render a single
//! "line N: message" diagnostic (see rockstar-cli's error formatter)
//! without needing a multi-line cause chain.

use rockstar_core::ValueError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("line {line}: unexpected token at start of statement: {token}")]
    UnexpectedStatement { token: String, line: usize },

    #[error("line {line}: malformed '{statement}' statement")]
    MalformedStatement { statement: &'static str, line: usize },

    #[error("line {line}: unexpected token in expression: {token}")]
    UnexpectedToken { token: String, line: usize },

    #[error("line {line}: expression ended unexpectedly")]
    UnexpectedExpressionEnd { line: usize },

    #[error("line {line}: malformed comparator")]
    MalformedComparator { line: usize },

    #[error("line {line}: pronoun used with no prior named variable")]
    NoPronounAntecedent { line: usize },

    #[error("line {line}: undefined function '{name}'")]
    UndefinedFunction { name: String, line: usize },

    #[error("line {line}: function expects at least {want} argument(s), got {got}")]
    ArityMismatch { want: usize, got: usize, line: usize },

    #[error("line {line}: {source}")]
    Value {
        #[source]
        source: ValueError,
        line: usize,
    },

    #[error("line {line}: expected at least one 'up' or 'down'")]
    EmptyBuildKnock { line: usize },

    #[error("line {line}: can't build or knock a {type_name}")]
    NotBuildable { type_name: &'static str, line: usize },

    #[error("line {line}: can't turn a {type_name}, must be a number")]
    NotTurnable { type_name: &'static str, line: usize },

    #[error("line {line}: output error: {message}")]
    Io { message: String, line: usize },
}

impl RuntimeError {
    /// The 1-based source line the error occurred on.
    pub fn line(&self) -> usize {
        match self {
            RuntimeError::UnexpectedStatement { line, .. }
            | RuntimeError::MalformedStatement { line, .. }
            | RuntimeError::UnexpectedToken { line, .. }
            | RuntimeError::UnexpectedExpressionEnd { line }
            | RuntimeError::MalformedComparator { line }
            | RuntimeError::NoPronounAntecedent { line }
            | RuntimeError::UndefinedFunction { line, .. }
            | RuntimeError::ArityMismatch { line, .. }
            | RuntimeError::Value { line, .. }
            | RuntimeError::EmptyBuildKnock { line }
            | RuntimeError::NotBuildable { line, .. }
            | RuntimeError::NotTurnable { line, .. }
            | RuntimeError::Io { line, .. } => *line,
        }
    }
}
