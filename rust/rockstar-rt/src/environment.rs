//! The per-frame variable table a running [`crate::Evaluator`] reads and
//! writes. Every function call gets a fresh `Environment`; the caller's
//! environment is visible only as a read-only fallback (see
//! [`crate::Evaluator`]'s `parent` field), never shared or inherited.

use rockstar_core::{Value, ValueError};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Environment {
    variables: HashMap<String, Value>,
    pronoun: Option<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn pronoun(&self) -> Option<&str> {
        self.pronoun.as_deref()
    }

    pub fn set_pronoun(&mut self, name: &str) {
        self.pronoun = Some(name.to_string());
    }

    /// Writes array index `index` of `name`, auto-vivifying a non-array
    /// variable to an empty array first.
    pub fn set_index(&mut self, name: &str, index: i64, value: Value) -> Result<(), ValueError> {
        self.ensure_array(name);
        self.variables.get_mut(name).unwrap().set_index(index, value)
    }

    /// Appends to `name`, auto-vivifying a non-array variable to an empty
    /// array first.
    pub fn push(&mut self, name: &str, value: Value) {
        self.ensure_array(name);
        self.variables.get_mut(name).unwrap().push(value);
    }

    /// Replaces `name` with an empty array unless it already holds one.
    pub fn ensure_array(&mut self, name: &str) {
        let needs_array = !matches!(self.variables.get(name), Some(Value::Array(_)));
        if needs_array {
            self.variables.insert(name.to_string(), Value::Array(Vec::new()));
        }
    }

    /// Pops the front element of `name`. Does not auto-vivify: an unset
    /// or non-array variable is a [`ValueError::NotArrayForPop`].
    pub fn pop_front(&mut self, name: &str) -> Result<Value, ValueError> {
        self.variables
            .entry(name.to_string())
            .or_insert(Value::Null)
            .pop_front()
    }

    /// Clones the variable table for use as a callee's read-only parent
    /// fallback (see the evaluator's `parent_vars` field).
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.variables.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut env = Environment::new();
        env.set("x", Value::Number(5.0));
        assert_eq!(env.get("x"), Some(&Value::Number(5.0)));
    }

    #[test]
    fn pronoun_tracks_last_set_name() {
        let mut env = Environment::new();
        env.set_pronoun("tommy");
        assert_eq!(env.pronoun(), Some("tommy"));
    }

    #[test]
    fn push_auto_vivifies_non_array() {
        let mut env = Environment::new();
        env.set("x", Value::Number(5.0));
        env.push("x", Value::Number(1.0));
        assert_eq!(env.get("x"), Some(&Value::Array(vec![Value::Number(1.0)])));
    }

    #[test]
    fn pop_front_on_unset_variable_errors() {
        let mut env = Environment::new();
        let err = env.pop_front("ghost").unwrap_err();
        assert!(matches!(err, ValueError::NotArrayForPop(_)));
    }

    #[test]
    fn pop_front_on_empty_array_yields_undefined() {
        let mut env = Environment::new();
        env.set("x", Value::Array(Vec::new()));
        assert_eq!(env.pop_front("x").unwrap(), Value::Undefined);
    }

    #[test]
    fn set_index_auto_vivifies_and_extends() {
        let mut env = Environment::new();
        env.set_index("x", 2, Value::Number(9.0)).unwrap();
        assert_eq!(
            env.get("x"),
            Some(&Value::Array(vec![Value::Null, Value::Null, Value::Number(9.0)]))
        );
    }
}
