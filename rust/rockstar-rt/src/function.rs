//! Function objects: an immutable parameter list plus a captured token
//! body, invoked by spawning a fresh [`crate::Evaluator`] per call.

use crate::error::RuntimeError;
use crate::evaluator::Evaluator;
use rockstar_compiler::{Token, TokenKind};
use rockstar_core::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

/// A declared Rockstar function: parameters plus a flat token body
/// (embedded `NewLine` tokens preserved, so the body re-splits into lines
/// exactly the way the top-level program does).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    parameters: Vec<String>,
    body: Vec<Token>,
}

impl Function {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn add_parameter(&mut self, name: impl Into<String>) {
        self.parameters.push(name.into());
    }

    pub fn add_token(&mut self, token: Token) {
        self.body.push(token);
    }

    /// The number of parameters this function requires.
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Runs the body in a fresh frame: a new `Environment` seeded with
    /// `arguments` bound to the declared parameters, the caller's
    /// variables visible only as a read-only fallback, and the shared,
    /// global function table carried through unchanged.
    pub fn call(
        &self,
        arguments: Vec<Value>,
        functions: Rc<RefCell<HashMap<String, Function>>>,
        caller_vars: HashMap<String, Value>,
        out: Rc<RefCell<dyn Write>>,
        call_line: usize,
    ) -> Result<Value, RuntimeError> {
        if arguments.len() < self.parameters.len() {
            return Err(RuntimeError::ArityMismatch {
                want: self.parameters.len(),
                got: arguments.len(),
                line: call_line,
            });
        }
        let mut env = crate::environment::Environment::new();
        for (name, value) in self.parameters.iter().zip(arguments) {
            env.set(name, value);
        }
        let mut tokens = self.body.clone();
        tokens.push(Token::new(TokenKind::EndOfFile, "", call_line));
        let mut frame = Evaluator::call_frame(tokens, env, caller_vars, functions, out);
        frame.run()
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::sink;

    #[test]
    fn arity_matches_declared_parameter_count() {
        let mut f = Function::new();
        f.add_parameter("a");
        f.add_parameter("b");
        assert_eq!(f.arity(), 2);
    }

    #[test]
    fn call_with_too_few_arguments_is_an_arity_mismatch() {
        let mut f = Function::new();
        f.add_parameter("a");
        f.add_parameter("b");
        let functions = Rc::new(RefCell::new(HashMap::new()));
        let out: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(sink()));
        let err = f
            .call(vec![Value::Number(1.0)], functions, HashMap::new(), out, 3)
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ArityMismatch { want: 2, got: 1, line: 3 }
        ));
    }
}
