//! Pattern matchers.
//!
//! A [`PatternMatcher`] scores one request attribute against one or more
//! patterns and returns a value in `[0, 1]`. Every matcher carries a
//! [`MatchBehaviour`] (applied after scoring) and a [`MatchOperator`] that
//! folds the per-pattern scores into one.
//!
//! # Module Structure
//!
//! - `text` - exact, wildcard and regex matching over strings
//! - `json` - structural JSON equality, partial JSON and JSONPath
//! - `xml` - XPath evaluation over XML bodies
//! - `range` - numeric ranges and IP networks (CIDR)

mod json;
mod range;
mod text;
mod xml;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::error::{DecoyError, Result};

pub use json::JsonPathPattern;
pub use range::{IpNetwork, NumericRange};
pub use text::{CachedValue, CompiledPattern};

/// Score constants.
pub mod scores {
    pub const PERFECT: f64 = 1.0;
    pub const MISMATCH: f64 = 0.0;

    #[inline]
    pub fn from_bool(matched: bool) -> f64 {
        if matched {
            PERFECT
        } else {
            MISMATCH
        }
    }
}

/// A request attribute presented to a matcher.
#[derive(Debug, Clone, Copy)]
pub enum MatchInput<'a> {
    Missing,
    Text(&'a str),
    Json(&'a Value),
    Bytes(&'a [u8]),
}

impl<'a> MatchInput<'a> {
    /// Textual view. JSON strings are unwrapped; other JSON is serialized.
    pub fn as_text(&self) -> Option<Cow<'a, str>> {
        match *self {
            MatchInput::Missing => None,
            MatchInput::Text(text) => Some(Cow::Borrowed(text)),
            MatchInput::Json(Value::String(s)) => Some(Cow::Borrowed(s.as_str())),
            MatchInput::Json(value) => Some(Cow::Owned(value.to_string())),
            MatchInput::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
        }
    }

    /// Structured view. Text and bytes are parsed on demand.
    pub fn as_json(&self) -> Option<Cow<'a, Value>> {
        match *self {
            MatchInput::Missing => None,
            MatchInput::Json(value) => Some(Cow::Borrowed(value)),
            MatchInput::Text(text) => serde_json::from_str(text).ok().map(Cow::Owned),
            MatchInput::Bytes(bytes) => serde_json::from_slice(bytes).ok().map(Cow::Owned),
        }
    }

    pub fn as_bytes(&self) -> Option<Cow<'a, [u8]>> {
        match *self {
            MatchInput::Missing => None,
            MatchInput::Text(text) => Some(Cow::Borrowed(text.as_bytes())),
            MatchInput::Json(value) => Some(Cow::Owned(value.to_string().into_bytes())),
            MatchInput::Bytes(bytes) => Some(Cow::Borrowed(bytes)),
        }
    }
}

/// Whether a successful match accepts or rejects the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchBehaviour {
    #[default]
    AcceptOnMatch,
    RejectOnMatch,
}

impl MatchBehaviour {
    pub fn from_reject(reject_on_match: bool) -> Self {
        if reject_on_match {
            MatchBehaviour::RejectOnMatch
        } else {
            MatchBehaviour::AcceptOnMatch
        }
    }

    pub fn is_reject(self) -> bool {
        self == MatchBehaviour::RejectOnMatch
    }

    /// Apply the behaviour to a raw score.
    #[inline]
    pub fn apply(self, score: f64) -> f64 {
        match self {
            MatchBehaviour::AcceptOnMatch => score,
            MatchBehaviour::RejectOnMatch => scores::PERFECT - score,
        }
    }
}

/// How several scores for one dimension are folded into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOperator {
    /// Best score wins
    #[default]
    Or,
    /// Lowest score wins
    And,
    Average,
}

impl MatchOperator {
    /// Fold scores. No scores at all is a mismatch.
    pub fn combine(self, scores: impl IntoIterator<Item = f64>) -> f64 {
        let mut count = 0usize;
        let mut acc = match self {
            MatchOperator::Or | MatchOperator::Average => 0.0,
            MatchOperator::And => scores::PERFECT,
        };
        for score in scores {
            count += 1;
            acc = match self {
                MatchOperator::Or => acc.max(score),
                MatchOperator::And => acc.min(score),
                MatchOperator::Average => acc + score,
            };
        }
        match (count, self) {
            (0, _) => scores::MISMATCH,
            (n, MatchOperator::Average) => acc / n as f64,
            _ => acc,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "or" => Ok(MatchOperator::Or),
            "and" => Ok(MatchOperator::And),
            "average" => Ok(MatchOperator::Average),
            other => Err(DecoyError::MalformedMapping(format!(
                "Unknown MatchOperator '{other}'. Expected Or, And or Average"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchOperator::Or => "Or",
            MatchOperator::And => "And",
            MatchOperator::Average => "Average",
        }
    }
}

/// Compiled pattern set, one variant per matcher type.
#[derive(Debug, Clone)]
pub enum MatcherKind {
    Exact(Vec<CachedValue>),
    Wildcard(Vec<CompiledPattern>),
    Regex(Vec<CompiledPattern>),
    JsonPath(Vec<JsonPathPattern>),
    /// Structural equality
    Json(Value),
    /// Every field of the pattern must be present in the input
    JsonPartial(Value),
    XPath(Vec<String>),
    ExactObject(Bytes),
    NumericRange(NumericRange),
    Cidr(Vec<IpNetwork>),
    NotNullOrEmpty,
}

impl MatcherKind {
    /// The `Name` discriminator used in mapping JSON.
    pub fn name(&self) -> &'static str {
        match self {
            MatcherKind::Exact(_) => "ExactMatcher",
            MatcherKind::Wildcard(_) => "WildcardMatcher",
            MatcherKind::Regex(_) => "RegexMatcher",
            MatcherKind::JsonPath(_) => "JsonPathMatcher",
            MatcherKind::Json(_) => "JsonMatcher",
            MatcherKind::JsonPartial(_) => "JsonPartialMatcher",
            MatcherKind::XPath(_) => "XPathMatcher",
            MatcherKind::ExactObject(_) => "ExactObjectMatcher",
            MatcherKind::NumericRange(_) => "NumericRangeMatcher",
            MatcherKind::Cidr(_) => "CidrMatcher",
            MatcherKind::NotNullOrEmpty => "NotNullOrEmptyMatcher",
        }
    }
}

/// A compiled matcher with its behaviour and operator.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    kind: MatcherKind,
    ignore_case: bool,
    behaviour: MatchBehaviour,
    operator: MatchOperator,
}

impl PatternMatcher {
    fn from_kind(kind: MatcherKind, ignore_case: bool) -> Self {
        Self {
            kind,
            ignore_case,
            behaviour: MatchBehaviour::AcceptOnMatch,
            operator: MatchOperator::Or,
        }
    }

    /// Compile a matcher from its `Name` discriminator and raw patterns.
    pub fn compile(name: &str, patterns: &[Value], ignore_case: bool) -> Result<Self> {
        let strings = || string_patterns(name, patterns);
        let kind = match name {
            "ExactMatcher" => MatcherKind::Exact(strings()?.into_iter().map(CachedValue::new).collect()),
            "WildcardMatcher" => MatcherKind::Wildcard(
                strings()?
                    .iter()
                    .map(|p| CompiledPattern::wildcard(p, ignore_case))
                    .collect::<Result<_>>()?,
            ),
            "RegexMatcher" => MatcherKind::Regex(
                strings()?
                    .iter()
                    .map(|p| CompiledPattern::regex(p, ignore_case))
                    .collect::<Result<_>>()?,
            ),
            "JsonPathMatcher" => MatcherKind::JsonPath(
                strings()?
                    .iter()
                    .map(|p| JsonPathPattern::parse(p))
                    .collect::<Result<_>>()?,
            ),
            "JsonMatcher" => MatcherKind::Json(single_json_pattern(name, patterns)?),
            "JsonPartialMatcher" => MatcherKind::JsonPartial(single_json_pattern(name, patterns)?),
            "XPathMatcher" => {
                let paths = strings()?;
                if paths.iter().any(|p| p.trim().is_empty()) {
                    return Err(DecoyError::invalid_pattern(name, "", "empty XPath expression"));
                }
                MatcherKind::XPath(paths)
            }
            "ExactObjectMatcher" => {
                let encoded = strings()?;
                let [encoded] = encoded.as_slice() else {
                    return Err(DecoyError::invalid_pattern(
                        name,
                        format!("{patterns:?}"),
                        "exactly one base64 pattern is required",
                    ));
                };
                MatcherKind::ExactObject(decode_base64(name, encoded)?)
            }
            "NumericRangeMatcher" => {
                let [pattern] = patterns else {
                    return Err(DecoyError::invalid_pattern(
                        name,
                        format!("{patterns:?}"),
                        "exactly one range pattern is required",
                    ));
                };
                MatcherKind::NumericRange(NumericRange::from_value(pattern)?)
            }
            "CidrMatcher" => MatcherKind::Cidr(
                strings()?
                    .iter()
                    .map(|p| p.parse::<IpNetwork>())
                    .collect::<Result<_>>()?,
            ),
            "NotNullOrEmptyMatcher" => MatcherKind::NotNullOrEmpty,
            other => {
                return Err(DecoyError::MalformedMapping(format!(
                    "Unknown matcher type '{other}'"
                )))
            }
        };
        Ok(Self::from_kind(kind, ignore_case))
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::from_kind(MatcherKind::Exact(vec![CachedValue::new(pattern)]), false)
    }

    /// Exact match against any of several values.
    pub fn exact_any<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_kind(
            MatcherKind::Exact(patterns.into_iter().map(CachedValue::new).collect()),
            false,
        )
    }

    /// `*` matches any run of characters, `?` a single one.
    pub fn wildcard(pattern: &str) -> Result<Self> {
        Ok(Self::from_kind(
            MatcherKind::Wildcard(vec![CompiledPattern::wildcard(pattern, false)?]),
            false,
        ))
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::from_kind(
            MatcherKind::Regex(vec![CompiledPattern::regex(pattern, false)?]),
            false,
        ))
    }

    pub fn json_path(path: &str) -> Result<Self> {
        Ok(Self::from_kind(
            MatcherKind::JsonPath(vec![JsonPathPattern::parse(path)?]),
            false,
        ))
    }

    pub fn json(value: Value) -> Self {
        Self::from_kind(MatcherKind::Json(value), false)
    }

    pub fn json_partial(value: Value) -> Self {
        Self::from_kind(MatcherKind::JsonPartial(value), false)
    }

    pub fn xpath(path: impl Into<String>) -> Self {
        Self::from_kind(MatcherKind::XPath(vec![path.into()]), false)
    }

    pub fn exact_object(bytes: impl Into<Bytes>) -> Self {
        Self::from_kind(MatcherKind::ExactObject(bytes.into()), false)
    }

    pub fn numeric_range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::from_kind(
            MatcherKind::NumericRange(NumericRange { min, max }),
            false,
        )
    }

    pub fn cidr(network: &str) -> Result<Self> {
        Ok(Self::from_kind(
            MatcherKind::Cidr(vec![network.parse()?]),
            false,
        ))
    }

    pub fn not_null_or_empty() -> Self {
        Self::from_kind(MatcherKind::NotNullOrEmpty, false)
    }

    /// Invert the result: a match scores 0, a mismatch 1.
    pub fn reject_on_match(mut self) -> Self {
        self.behaviour = MatchBehaviour::RejectOnMatch;
        self
    }

    pub fn with_behaviour(mut self, behaviour: MatchBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn with_operator(mut self, operator: MatchOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn kind(&self) -> &MatcherKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn behaviour(&self) -> MatchBehaviour {
        self.behaviour
    }

    pub fn operator(&self) -> MatchOperator {
        self.operator
    }

    /// Patterns in their serialized form.
    pub fn patterns(&self) -> Vec<Value> {
        match &self.kind {
            MatcherKind::Exact(values) => values
                .iter()
                .map(|v| Value::String(v.value.clone()))
                .collect(),
            MatcherKind::Wildcard(patterns) | MatcherKind::Regex(patterns) => patterns
                .iter()
                .map(|p| Value::String(p.source.clone()))
                .collect(),
            MatcherKind::JsonPath(paths) => paths
                .iter()
                .map(|p| Value::String(p.source.clone()))
                .collect(),
            MatcherKind::Json(value) | MatcherKind::JsonPartial(value) => vec![value.clone()],
            MatcherKind::XPath(paths) => paths.iter().cloned().map(Value::String).collect(),
            MatcherKind::ExactObject(bytes) => {
                use base64::Engine;
                vec![Value::String(
                    base64::engine::general_purpose::STANDARD.encode(bytes),
                )]
            }
            MatcherKind::NumericRange(range) => vec![range.to_value()],
            MatcherKind::Cidr(networks) => networks
                .iter()
                .map(|n| Value::String(n.to_string()))
                .collect(),
            MatcherKind::NotNullOrEmpty => Vec::new(),
        }
    }

    /// Score `input`, behaviour applied.
    pub fn score(&self, input: &MatchInput<'_>) -> f64 {
        self.behaviour.apply(self.raw_score(input))
    }

    fn raw_score(&self, input: &MatchInput<'_>) -> f64 {
        let op = self.operator;
        match &self.kind {
            MatcherKind::Exact(values) => match input.as_text() {
                Some(text) => op.combine(
                    values
                        .iter()
                        .map(|v| scores::from_bool(v.equals(&text, !self.ignore_case))),
                ),
                None => scores::MISMATCH,
            },
            MatcherKind::Wildcard(patterns) | MatcherKind::Regex(patterns) => {
                match input.as_text() {
                    Some(text) => op.combine(
                        patterns
                            .iter()
                            .map(|p| scores::from_bool(p.is_match(&text))),
                    ),
                    None => scores::MISMATCH,
                }
            }
            MatcherKind::JsonPath(paths) => match input.as_json() {
                Some(value) => op.combine(
                    paths
                        .iter()
                        .map(|p| scores::from_bool(p.selects_any(&value))),
                ),
                None => scores::MISMATCH,
            },
            MatcherKind::Json(expected) => match input.as_json() {
                Some(actual) => {
                    scores::from_bool(json::json_equals(&actual, expected, !self.ignore_case))
                }
                None => scores::MISMATCH,
            },
            MatcherKind::JsonPartial(expected) => match input.as_json() {
                Some(actual) => {
                    scores::from_bool(json::json_contains(&actual, expected, !self.ignore_case))
                }
                None => scores::MISMATCH,
            },
            MatcherKind::XPath(paths) => match input.as_text() {
                Some(text) => {
                    op.combine(xml::evaluate_all(&text, paths).into_iter().map(scores::from_bool))
                }
                None => scores::MISMATCH,
            },
            MatcherKind::ExactObject(expected) => match input.as_bytes() {
                Some(actual) => scores::from_bool(actual.as_ref() == expected.as_ref()),
                None => scores::MISMATCH,
            },
            MatcherKind::NumericRange(range) => match input.as_text() {
                Some(text) => scores::from_bool(range.contains_str(&text)),
                None => scores::MISMATCH,
            },
            MatcherKind::Cidr(networks) => match input.as_text() {
                Some(text) => match range::parse_ip(&text) {
                    Some(ip) => op.combine(
                        networks
                            .iter()
                            .map(|n| scores::from_bool(n.contains(&ip))),
                    ),
                    None => scores::MISMATCH,
                },
                None => scores::MISMATCH,
            },
            MatcherKind::NotNullOrEmpty => scores::from_bool(match input {
                MatchInput::Missing => false,
                MatchInput::Text(text) => !text.is_empty(),
                MatchInput::Json(value) => !value.is_null(),
                MatchInput::Bytes(bytes) => !bytes.is_empty(),
            }),
        }
    }
}

fn string_patterns(name: &str, patterns: &[Value]) -> Result<Vec<String>> {
    if patterns.is_empty() {
        return Err(DecoyError::invalid_pattern(name, "", "at least one pattern is required"));
    }
    patterns
        .iter()
        .map(|p| match p {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(DecoyError::invalid_pattern(
                name,
                other.to_string(),
                "pattern must be a string",
            )),
        })
        .collect()
}

/// JSON matchers accept the pattern inline or as a JSON-encoded string.
fn single_json_pattern(name: &str, patterns: &[Value]) -> Result<Value> {
    match patterns {
        [Value::String(s)] => Ok(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))),
        [value] => Ok(value.clone()),
        _ => Err(DecoyError::invalid_pattern(
            name,
            format!("{patterns:?}"),
            "exactly one JSON pattern is required",
        )),
    }
}

fn decode_base64(name: &str, encoded: &str) -> Result<Bytes> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(|e| DecoyError::invalid_pattern(name, encoded, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_combine() {
        assert_eq!(MatchOperator::Or.combine([0.0, 1.0, 0.5]), 1.0);
        assert_eq!(MatchOperator::And.combine([0.0, 1.0, 0.5]), 0.0);
        assert_eq!(MatchOperator::Average.combine([0.0, 1.0, 0.5]), 0.5);
        assert_eq!(MatchOperator::Or.combine(std::iter::empty()), 0.0);
        assert_eq!(MatchOperator::And.combine(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(MatchOperator::parse("and").unwrap(), MatchOperator::And);
        assert_eq!(MatchOperator::parse("Average").unwrap(), MatchOperator::Average);
        assert!(MatchOperator::parse("xor").is_err());
    }

    #[test]
    fn test_reject_on_match_inverts() {
        let matcher = PatternMatcher::exact("abc").reject_on_match();
        assert_eq!(matcher.score(&MatchInput::Text("abc")), 0.0);
        assert_eq!(matcher.score(&MatchInput::Text("xyz")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Missing), 1.0);
    }

    #[test]
    fn test_exact_matcher() {
        let matcher = PatternMatcher::exact("Hello");
        assert_eq!(matcher.score(&MatchInput::Text("Hello")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Text("hello")), 0.0);
        assert_eq!(matcher.score(&MatchInput::Missing), 0.0);

        let ignore_case =
            PatternMatcher::compile("ExactMatcher", &[json!("Hello")], true).unwrap();
        assert_eq!(ignore_case.score(&MatchInput::Text("hELLO")), 1.0);
    }

    #[test]
    fn test_exact_any_with_and_operator() {
        let or = PatternMatcher::exact_any(["a", "b"]);
        assert_eq!(or.score(&MatchInput::Text("b")), 1.0);

        let and = PatternMatcher::exact_any(["a", "b"]).with_operator(MatchOperator::And);
        assert_eq!(and.score(&MatchInput::Text("b")), 0.0);
    }

    #[test]
    fn test_wildcard_matcher() {
        let matcher = PatternMatcher::wildcard("/api/*/items?").unwrap();
        assert_eq!(matcher.score(&MatchInput::Text("/api/v1/items1")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Text("/api/v1/items")), 0.0);
        assert_eq!(matcher.score(&MatchInput::Text("/other")), 0.0);

        let dots = PatternMatcher::wildcard("/a.b").unwrap();
        assert_eq!(dots.score(&MatchInput::Text("/axb")), 0.0);
    }

    #[test]
    fn test_regex_matcher() {
        let matcher = PatternMatcher::regex(r"^/users/\d+$").unwrap();
        assert_eq!(matcher.score(&MatchInput::Text("/users/42")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Text("/users/abc")), 0.0);
        assert!(PatternMatcher::regex("(unclosed").is_err());
    }

    #[test]
    fn test_json_path_matcher() {
        let matcher = PatternMatcher::json_path("$.things[?(@.name == 'x')]").unwrap();
        let hit = json!({"things": [{"name": "x"}]});
        let miss = json!({"things": [{"name": "y"}]});
        assert_eq!(matcher.score(&MatchInput::Json(&hit)), 1.0);
        assert_eq!(matcher.score(&MatchInput::Json(&miss)), 0.0);
        assert_eq!(
            matcher.score(&MatchInput::Text(r#"{"things":[{"name":"x"}]}"#)),
            1.0
        );
        assert!(PatternMatcher::json_path("not a path").is_err());
    }

    #[test]
    fn test_json_matchers() {
        let exact = PatternMatcher::json(json!({"a": 1}));
        let partial = PatternMatcher::json_partial(json!({"a": 1}));
        let extra = json!({"a": 1, "b": 2});

        assert_eq!(exact.score(&MatchInput::Json(&json!({"a": 1}))), 1.0);
        assert_eq!(exact.score(&MatchInput::Json(&extra)), 0.0);
        assert_eq!(partial.score(&MatchInput::Json(&extra)), 1.0);
        assert_eq!(partial.score(&MatchInput::Text("not json")), 0.0);
    }

    #[test]
    fn test_json_matcher_accepts_string_encoded_pattern() {
        let matcher =
            PatternMatcher::compile("JsonMatcher", &[json!(r#"{"p":42}"#)], false).unwrap();
        assert_eq!(matcher.score(&MatchInput::Text(r#"{ "p": 42 }"#)), 1.0);
    }

    #[test]
    fn test_xpath_matcher() {
        let matcher = PatternMatcher::xpath("/todo-list[count(todo-item) = 2]");
        let xml = "<todo-list><todo-item>a</todo-item><todo-item>b</todo-item></todo-list>";
        assert_eq!(matcher.score(&MatchInput::Text(xml)), 1.0);
        assert_eq!(
            matcher.score(&MatchInput::Text("<todo-list></todo-list>")),
            0.0
        );
        assert_eq!(matcher.score(&MatchInput::Text("not xml")), 0.0);
    }

    #[test]
    fn test_exact_object_matcher() {
        let matcher = PatternMatcher::exact_object(vec![1_u8, 2, 3]);
        assert_eq!(matcher.score(&MatchInput::Bytes(&[1, 2, 3])), 1.0);
        assert_eq!(matcher.score(&MatchInput::Bytes(&[1, 2])), 0.0);

        let from_model =
            PatternMatcher::compile("ExactObjectMatcher", &[json!("AQID")], false).unwrap();
        assert_eq!(from_model.score(&MatchInput::Bytes(&[1, 2, 3])), 1.0);
        assert_eq!(from_model.patterns(), vec![json!("AQID")]);
    }

    #[test]
    fn test_numeric_range_matcher() {
        let matcher = PatternMatcher::numeric_range(Some(10.0), Some(20.0));
        assert_eq!(matcher.score(&MatchInput::Text("15")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Text("20")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Text("21")), 0.0);
        assert_eq!(matcher.score(&MatchInput::Text("abc")), 0.0);
    }

    #[test]
    fn test_cidr_matcher() {
        let matcher = PatternMatcher::cidr("10.0.0.0/8").unwrap();
        assert_eq!(matcher.score(&MatchInput::Text("10.20.30.40")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Text("11.0.0.1")), 0.0);
        assert!(PatternMatcher::cidr("10.0.0.0/40").is_err());
    }

    #[test]
    fn test_not_null_or_empty() {
        let matcher = PatternMatcher::not_null_or_empty();
        assert_eq!(matcher.score(&MatchInput::Text("x")), 1.0);
        assert_eq!(matcher.score(&MatchInput::Text("")), 0.0);
        assert_eq!(matcher.score(&MatchInput::Json(&Value::Null)), 0.0);
        assert_eq!(matcher.score(&MatchInput::Missing), 0.0);
    }

    #[test]
    fn test_compile_rejects_unknown_and_empty() {
        assert!(PatternMatcher::compile("FuzzyMatcher", &[json!("x")], false).is_err());
        assert!(PatternMatcher::compile("ExactMatcher", &[], false).is_err());
        assert!(PatternMatcher::compile("RegexMatcher", &[json!({"a": 1})], false).is_err());
    }

    #[test]
    fn test_patterns_round_trip_names() {
        let matcher = PatternMatcher::wildcard("/x/*").unwrap();
        assert_eq!(matcher.name(), "WildcardMatcher");
        assert_eq!(matcher.patterns(), vec![json!("/x/*")]);
    }
}
