//! JSON matching: structural equality, partial containment and JSONPath.

use crate::error::{DecoyError, Result};
use serde_json::Value;
use serde_json_path::JsonPath;
use std::sync::Arc;

/// A parsed JSONPath query (RFC 9535) with its source text.
#[derive(Debug, Clone)]
pub struct JsonPathPattern {
    pub source: String,
    path: Arc<JsonPath>,
}

impl JsonPathPattern {
    pub fn parse(source: &str) -> Result<Self> {
        let path = JsonPath::parse(source)
            .map_err(|e| DecoyError::invalid_pattern("JsonPathMatcher", source, e))?;
        Ok(Self {
            source: source.to_string(),
            path: Arc::new(path),
        })
    }

    /// True when the query selects at least one node.
    pub fn selects_any(&self, value: &Value) -> bool {
        !self.path.query(value).is_empty()
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn strings_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

/// Full structural equality. Objects must have the same key set.
pub(crate) fn json_equals(actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::String(a), Value::String(b)) => strings_equal(a, b, case_sensitive),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| json_equals(x, y, case_sensitive))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && b.iter().all(|(key, expected_val)| {
                    a.get(key)
                        .is_some_and(|actual_val| json_equals(actual_val, expected_val, case_sensitive))
                })
        }
        _ => false,
    }
}

/// Containment: every expected field must be present and match.
///
/// Arrays match positionally; the actual array may be longer.
pub(crate) fn json_contains(actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
    match (actual, expected) {
        (Value::Array(a), Value::Array(b)) => {
            a.len() >= b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| json_contains(x, y, case_sensitive))
        }
        (Value::Object(a), Value::Object(b)) => b.iter().all(|(key, expected_val)| {
            a.get(key)
                .is_some_and(|actual_val| json_contains(actual_val, expected_val, case_sensitive))
        }),
        _ => json_equals(actual, expected, case_sensitive),
    }
}
