//! The dynamically-typed value every Rockstar variable, literal, and
//! expression result is represented as.

use std::fmt;
use thiserror::Error;

/// Errors that can arise from a pure `Value` operation (indexing,
/// ordering, popping). The evaluator attaches a source line before
/// surfacing these to the user.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("can't index a {0}, must be an array or a string")]
    NotIndexable(&'static str),
    #[error("can't index a {0} for writing, must be an array")]
    NotArray(&'static str),
    #[error("index out of bound, {index} >= {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("invalid index {0}, expecting a positive number")]
    NegativeIndex(i64),
    #[error("can't roll from a {0}, only from an array")]
    NotArrayForPop(&'static str),
    #[error("ordering involving booleans is undefined")]
    BoolOrdering,
}

/// A Rockstar value: exactly one of six variants is ever inhabited.
///
/// `Null` (the spoken "nothing"/"nowhere") and `Undefined` (the poetic
/// "mysterious") are distinct variants, matching the reference dialect's
/// three-way null/undefined/boolean split.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "mysterious",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Null | Value::Undefined => false,
        }
    }

    pub fn as_number(&self) -> f64 {
        match self {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(_) => 0.0,
            Value::Null | Value::Undefined => 0.0,
            Value::Array(items) => items.len() as f64,
        }
    }

    /// Decimal rendering with trailing zeros (and a trailing `.`) trimmed,
    /// e.g. `3.0` prints as `3`, `3.5` prints as `3.5`.
    pub fn as_string(&self) -> String {
        match self {
            Value::Bool(b) => {
                if *b {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Value::Number(n) => format!("{n}"),
            Value::Null => "null".to_string(),
            Value::Undefined => "mysterious".to_string(),
            Value::Array(_) => "Array".to_string(),
            Value::String(s) => s.clone(),
        }
    }

    pub fn add(&self, other: &Value) -> Value {
        if self.is_string() || other.is_string() {
            Value::String(format!("{}{}", self.as_string(), other.as_string()))
        } else {
            Value::Number(self.as_number() + other.as_number())
        }
    }

    pub fn sub(&self, other: &Value) -> Value {
        Value::Number(self.as_number() - other.as_number())
    }

    pub fn mul(&self, other: &Value) -> Value {
        if self.is_string() {
            if other.is_string() {
                return Value::Undefined;
            }
            let count = other.as_number().floor();
            if count <= 0.0 {
                return Value::String(String::new());
            }
            Value::String(self.as_string().repeat(count as usize))
        } else {
            Value::Number(self.as_number() * other.as_number())
        }
    }

    pub fn div(&self, other: &Value) -> Value {
        Value::Number(self.as_number() / other.as_number())
    }

    /// The language's `==`: same-type comparison where defined, plus a
    /// fixed set of cross-type coercions. Pairs not covered below (e.g.
    /// array vs. anything else, mysterious vs. anything else) are simply
    /// unequal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Undefined, Undefined) => true,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Array(a), Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (String(_), Null) | (Null, String(_)) => false,
            (Bool(_), String(_))
            | (String(_), Bool(_))
            | (Bool(_), Number(_))
            | (Number(_), Bool(_))
            | (Bool(_), Null)
            | (Null, Bool(_)) => self.as_bool() == other.as_bool(),
            (Number(_), String(_)) | (String(_), Number(_)) | (Number(_), Null) | (Null, Number(_)) => {
                self.as_number() == other.as_number()
            }
            _ => false,
        }
    }

    /// `<`. Undefined is incomparable (always `false`); booleans can't be
    /// ordered at all.
    pub fn less_than(&self, other: &Value) -> Result<bool, ValueError> {
        if self.is_bool() || other.is_bool() {
            return Err(ValueError::BoolOrdering);
        }
        if self.is_undefined() || other.is_undefined() {
            return Ok(false);
        }
        if self.is_string() && other.is_string() {
            return Ok(self.as_string() < other.as_string());
        }
        Ok(self.as_number() < other.as_number())
    }

    pub fn greater_than(&self, other: &Value) -> Result<bool, ValueError> {
        other.less_than(self)
    }

    pub fn less_or_equal(&self, other: &Value) -> Result<bool, ValueError> {
        Ok(self.less_than(other)? || self.loose_eq(other))
    }

    pub fn greater_or_equal(&self, other: &Value) -> Result<bool, ValueError> {
        Ok(self.greater_than(other)? || self.loose_eq(other))
    }

    /// Reads element `index` of an array, or the one-character substring
    /// at `index` of a string.
    pub fn get_index(&self, index: i64) -> Result<Value, ValueError> {
        match self {
            Value::Array(items) => {
                if index < 0 || index as usize >= items.len() {
                    Err(ValueError::OutOfBounds {
                        index,
                        len: items.len(),
                    })
                } else {
                    Ok(items[index as usize].clone())
                }
            }
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                if index < 0 || index as usize >= chars.len() {
                    Err(ValueError::OutOfBounds {
                        index,
                        len: chars.len(),
                    })
                } else {
                    Ok(Value::String(chars[index as usize].to_string()))
                }
            }
            _ => Err(ValueError::NotIndexable(self.type_name())),
        }
    }

    /// Writes element `index` of an array, extending with trailing
    /// `Null`s if needed. Requires `self` already be an array; callers
    /// that want "index an uninitialized variable" to auto-vivify an
    /// array do so before calling this.
    pub fn set_index(&mut self, index: i64, value: Value) -> Result<(), ValueError> {
        if index < 0 {
            return Err(ValueError::NegativeIndex(index));
        }
        match self {
            Value::Array(items) => {
                let idx = index as usize;
                if idx >= items.len() {
                    items.resize(idx + 1, Value::Null);
                }
                items[idx] = value;
                Ok(())
            }
            _ => Err(ValueError::NotArray(self.type_name())),
        }
    }

    /// Appends to an array, silently replacing a non-array value with a
    /// fresh empty array first.
    pub fn push(&mut self, value: Value) {
        if !self.is_array() {
            *self = Value::Array(Vec::new());
        }
        if let Value::Array(items) = self {
            items.push(value);
        }
    }

    /// Pops the *front* element (queue semantics, not stack, despite the
    /// `roll` keyword's connotation — see the reference dialect's `roll`
    /// behavior). Requires `self` already be an array.
    pub fn pop_front(&mut self) -> Result<Value, ValueError> {
        match self {
            Value::Array(items) => {
                if items.is_empty() {
                    Ok(Value::Undefined)
                } else {
                    Ok(items.remove(0))
                }
            }
            _ => Err(ValueError::NotArrayForPop(self.type_name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_predicate_is_true() {
        let values = [
            Value::Null,
            Value::Undefined,
            Value::Bool(true),
            Value::Number(1.0),
            Value::String("x".into()),
            Value::Array(vec![]),
        ];
        for v in values {
            let flags = [
                v.is_null(),
                v.is_undefined(),
                v.is_bool(),
                v.is_number(),
                v.is_string(),
                v.is_array(),
            ];
            assert_eq!(flags.iter().filter(|b| **b).count(), 1);
        }
    }

    #[test]
    fn number_formatting_trims_trailing_zeros() {
        assert_eq!(Value::Number(3.0).as_string(), "3");
        assert_eq!(Value::Number(3.5).as_string(), "3.5");
        assert_eq!(Value::Number(-2.0).as_string(), "-2");
    }

    #[test]
    fn as_bool_rules() {
        assert!(!Value::Number(0.0).as_bool());
        assert!(Value::Number(1.0).as_bool());
        assert!(!Value::String(String::new()).as_bool());
        assert!(Value::String("x".into()).as_bool());
        assert!(!Value::Array(vec![]).as_bool());
        assert!(Value::Array(vec![Value::Null]).as_bool());
        assert!(!Value::Null.as_bool());
        assert!(!Value::Undefined.as_bool());
    }

    #[test]
    fn as_number_rules() {
        assert_eq!(Value::Bool(true).as_number(), 1.0);
        assert_eq!(Value::Bool(false).as_number(), 0.0);
        assert_eq!(Value::String("whatever".into()).as_number(), 0.0);
        assert_eq!(Value::Null.as_number(), 0.0);
        assert_eq!(Value::Array(vec![Value::Null, Value::Null]).as_number(), 2.0);
    }

    #[test]
    fn addition_concatenates_when_either_side_is_a_string() {
        let r = Value::String("foo".into()).add(&Value::Number(3.0));
        assert_eq!(r, Value::String("foo3".into()));
        let r = Value::Number(1.0).add(&Value::Number(2.0));
        assert_eq!(r, Value::Number(3.0));
    }

    #[test]
    fn string_times_number_repeats() {
        let r = Value::String("na".into()).mul(&Value::Number(3.0));
        assert_eq!(r, Value::String("nanana".into()));
    }

    #[test]
    fn string_times_string_is_undefined() {
        let r = Value::String("a".into()).mul(&Value::String("b".into()));
        assert_eq!(r, Value::Undefined);
    }

    #[test]
    fn equality_cross_type_rules() {
        assert!(Value::Number(1.0).loose_eq(&Value::Bool(true)));
        assert!(!Value::Number(2.0).loose_eq(&Value::Bool(true)));
        assert!(!Value::String("x".into()).loose_eq(&Value::Null));
        assert!(Value::Number(0.0).loose_eq(&Value::Null));
        assert!(Value::Number(0.0).loose_eq(&Value::String("anything".into())));
    }

    #[test]
    fn equality_is_reflexive_and_symmetric() {
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Number(5.0),
            Value::String("hi".into()),
            Value::Array(vec![Value::Number(1.0)]),
        ];
        for v in &values {
            assert!(v.loose_eq(v));
        }
        assert_eq!(
            Value::Number(1.0).loose_eq(&Value::Bool(true)),
            Value::Bool(true).loose_eq(&Value::Number(1.0))
        );
    }

    #[test]
    fn array_equality_is_length_first() {
        let a = Value::Array(vec![Value::Number(1.0)]);
        let b = Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert!(!a.loose_eq(&b));
    }

    #[test]
    fn ordering_rejects_booleans() {
        assert!(Value::Bool(true).less_than(&Value::Number(1.0)).is_err());
    }

    #[test]
    fn ordering_treats_undefined_as_incomparable() {
        assert_eq!(Value::Undefined.less_than(&Value::Number(5.0)).unwrap(), false);
        assert_eq!(Value::Number(5.0).less_than(&Value::Undefined).unwrap(), false);
    }

    #[test]
    fn indexing_array_and_string() {
        let arr = Value::Array(vec![Value::Number(10.0), Value::Number(20.0)]);
        assert_eq!(arr.get_index(1).unwrap(), Value::Number(20.0));
        assert!(arr.get_index(2).is_err());

        let s = Value::String("hello".into());
        assert_eq!(s.get_index(1).unwrap(), Value::String("e".into()));
    }

    #[test]
    fn set_index_extends_with_nulls() {
        let mut arr = Value::Array(vec![]);
        arr.set_index(2, Value::Number(9.0)).unwrap();
        assert_eq!(
            arr,
            Value::Array(vec![Value::Null, Value::Null, Value::Number(9.0)])
        );
    }

    #[test]
    fn push_replaces_non_array_then_appends() {
        let mut v = Value::Number(5.0);
        v.push(Value::Number(1.0));
        v.push(Value::Number(2.0));
        assert_eq!(v, Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]));
    }

    #[test]
    fn pop_front_is_fifo_and_undefined_when_empty() {
        let mut v = Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(v.pop_front().unwrap(), Value::Number(1.0));
        assert_eq!(v.pop_front().unwrap(), Value::Number(2.0));
        assert_eq!(v.pop_front().unwrap(), Value::Undefined);
    }
}
