//! Value-kind schemas for state validation.
//!
//! A [`Schema`] maps keys to the [`ValueKind`] their values are expected
//! to have. Keys named in the schema but absent from the store are not
//! checked.

use crate::types::{StateMap, StateValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Expected kind of a state value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    /// A number representable as `i64` or `u64`.
    Integer,
    /// A number stored with a fractional representation.
    Float,
    /// Any number.
    Number,
    Bool,
    Null,
    Array,
    Object,
    /// Matches every value.
    Any,
}

impl ValueKind {
    /// The most specific kind describing `value`.
    pub fn of(value: &StateValue) -> Self {
        match value {
            StateValue::String(_) => Self::String,
            StateValue::Number(n) if n.is_f64() => Self::Float,
            StateValue::Number(_) => Self::Integer,
            StateValue::Bool(_) => Self::Bool,
            StateValue::Null => Self::Null,
            StateValue::Array(_) => Self::Array,
            StateValue::Object(_) => Self::Object,
        }
    }

    /// Check whether `value` is of this kind.
    pub fn matches(&self, value: &StateValue) -> bool {
        match self {
            Self::Any => true,
            Self::Number => value.is_number(),
            kind => *kind == Self::of(value),
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Null => "null",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        write!(f, "{}", s)
    }
}

/// Key → expected value kind.
pub type Schema = HashMap<String, ValueKind>;

/// A present key whose value does not match its schema kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub key: String,
    pub expected: ValueKind,
    pub actual: ValueKind,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: expected {}, found {}",
            self.key, self.expected, self.actual
        )
    }
}

/// Collect every violation of `schema` in `entries`, ordered by key.
pub fn check(entries: &StateMap, schema: &Schema) -> Vec<SchemaViolation> {
    let mut violations: Vec<SchemaViolation> = schema
        .iter()
        .filter_map(|(key, expected)| {
            let value = entries.get(key)?;
            if expected.matches(value) {
                None
            } else {
                Some(SchemaViolation {
                    key: key.clone(),
                    expected: *expected,
                    actual: ValueKind::of(value),
                })
            }
        })
        .collect();
    violations.sort_by(|a, b| a.key.cmp(&b.key));
    violations
}
