//! Per-dimension request matchers and their composite.

use super::result::RequestMatchResult;
use crate::matchers::{scores, MatchBehaviour, MatchInput, MatchOperator, PatternMatcher};
use crate::request::{BodyData, RequestValue};
use std::fmt;
use std::sync::Arc;

/// Programmatic request predicate.
pub type RequestPredicate = Arc<dyn Fn(&RequestValue) -> bool + Send + Sync>;

/// Several pattern matchers applied to one attribute, folded by `operator`.
#[derive(Debug, Clone)]
pub struct MatcherSet {
    pub matchers: Vec<PatternMatcher>,
    pub operator: MatchOperator,
}

impl MatcherSet {
    pub fn new(matchers: Vec<PatternMatcher>, operator: MatchOperator) -> Self {
        Self { matchers, operator }
    }

    pub fn single(matcher: PatternMatcher) -> Self {
        Self::new(vec![matcher], MatchOperator::Or)
    }

    pub fn score(&self, input: MatchInput<'_>) -> f64 {
        self.operator
            .combine(self.matchers.iter().map(|m| m.score(&input)))
    }
}

/// Matcher for a named header, cookie or query parameter.
///
/// With no pattern matchers it only checks presence. Each pattern matcher
/// takes its best score over all values; the operator then folds those.
#[derive(Debug, Clone)]
pub struct KeyedMatcher {
    pub name: String,
    pub matchers: Vec<PatternMatcher>,
    /// Case-insensitive name lookup (headers are always case-insensitive)
    pub ignore_case: bool,
    pub behaviour: MatchBehaviour,
    pub operator: MatchOperator,
}

impl KeyedMatcher {
    pub fn new(name: impl Into<String>, matchers: Vec<PatternMatcher>) -> Self {
        Self {
            name: name.into(),
            matchers,
            ignore_case: false,
            behaviour: MatchBehaviour::AcceptOnMatch,
            operator: MatchOperator::Or,
        }
    }

    /// Name must be present, any value.
    pub fn present(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn ignoring_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn reject_on_match(mut self) -> Self {
        self.behaviour = MatchBehaviour::RejectOnMatch;
        self
    }

    pub fn score_values(&self, values: Option<&[&str]>) -> f64 {
        let raw = match values {
            None => scores::MISMATCH,
            Some(_) if self.matchers.is_empty() => scores::PERFECT,
            Some(values) => self.operator.combine(self.matchers.iter().map(|matcher| {
                values
                    .iter()
                    .map(|v| matcher.score(&MatchInput::Text(v)))
                    .fold(scores::MISMATCH, f64::max)
            })),
        };
        self.behaviour.apply(raw)
    }
}

/// A named programmatic predicate.
#[derive(Clone)]
pub struct NamedPredicate {
    pub name: String,
    pub predicate: RequestPredicate,
}

impl fmt::Debug for NamedPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One constrained request dimension.
#[derive(Debug, Clone)]
pub enum DimensionMatcher {
    Methods(Vec<String>),
    Path(MatcherSet),
    Url(MatcherSet),
    ClientIp(MatcherSet),
    Header(KeyedMatcher),
    Cookie(KeyedMatcher),
    Param(KeyedMatcher),
    Body(MatcherSet),
    Predicate(NamedPredicate),
}

impl DimensionMatcher {
    /// Name used in match details.
    pub fn label(&self) -> String {
        match self {
            DimensionMatcher::Methods(_) => "Methods".to_string(),
            DimensionMatcher::Path(_) => "Path".to_string(),
            DimensionMatcher::Url(_) => "Url".to_string(),
            DimensionMatcher::ClientIp(_) => "ClientIP".to_string(),
            DimensionMatcher::Header(m) => format!("Header:{}", m.name),
            DimensionMatcher::Cookie(m) => format!("Cookie:{}", m.name),
            DimensionMatcher::Param(m) => format!("Param:{}", m.name),
            DimensionMatcher::Body(_) => "Body".to_string(),
            DimensionMatcher::Predicate(p) => format!("Predicate:{}", p.name),
        }
    }

    pub fn score(&self, request: &RequestValue) -> f64 {
        match self {
            DimensionMatcher::Methods(methods) => scores::from_bool(
                methods
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(&request.method)),
            ),
            DimensionMatcher::Path(set) => set.score(MatchInput::Text(&request.path)),
            DimensionMatcher::Url(set) => set.score(MatchInput::Text(request.url.as_str())),
            DimensionMatcher::ClientIp(set) => match request.client_ip {
                Some(ip) => set.score(MatchInput::Text(&ip.to_string())),
                None => set.score(MatchInput::Missing),
            },
            DimensionMatcher::Header(keyed) => {
                let values: Option<Vec<&str>> = request
                    .headers
                    .get_all(&keyed.name)
                    .map(|values| values.iter().map(String::as_str).collect());
                keyed.score_values(values.as_deref())
            }
            DimensionMatcher::Cookie(keyed) => {
                let value = request
                    .cookies
                    .iter()
                    .find(|(name, _)| names_equal(name, &keyed.name, keyed.ignore_case))
                    .map(|(_, value)| vec![value.as_str()]);
                keyed.score_values(value.as_deref())
            }
            DimensionMatcher::Param(keyed) => {
                let values: Vec<&str> = request
                    .query
                    .iter()
                    .filter(|(name, _)| names_equal(name, &keyed.name, keyed.ignore_case))
                    .flat_map(|(_, values)| values.iter().map(String::as_str))
                    .collect();
                let found = request
                    .query
                    .iter()
                    .any(|(name, _)| names_equal(name, &keyed.name, keyed.ignore_case));
                keyed.score_values(found.then_some(values.as_slice()))
            }
            DimensionMatcher::Body(set) => set.score(body_input(request)),
            DimensionMatcher::Predicate(p) => scores::from_bool((p.predicate)(request)),
        }
    }
}

fn names_equal(actual: &str, expected: &str, ignore_case: bool) -> bool {
    if ignore_case {
        actual.eq_ignore_ascii_case(expected)
    } else {
        actual == expected
    }
}

/// The request body as matcher input, in its detected representation.
pub(crate) fn body_input(request: &RequestValue) -> MatchInput<'_> {
    match &request.body_data {
        None => MatchInput::Missing,
        Some(BodyData::Json(value)) => MatchInput::Json(value),
        Some(BodyData::Text(text)) => MatchInput::Text(text),
        Some(BodyData::Bytes) => MatchInput::Bytes(&request.body),
    }
}

/// Ordered list of dimension matchers. Every dimension must match.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    dimensions: Vec<DimensionMatcher>,
}

impl RequestMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: DimensionMatcher) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_methods<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let methods = methods
            .into_iter()
            .map(|m| Into::<String>::into(m).to_ascii_uppercase())
            .collect();
        self.with_dimension(DimensionMatcher::Methods(methods))
    }

    pub fn with_path(self, matcher: PatternMatcher) -> Self {
        self.with_dimension(DimensionMatcher::Path(MatcherSet::single(matcher)))
    }

    pub fn with_url(self, matcher: PatternMatcher) -> Self {
        self.with_dimension(DimensionMatcher::Url(MatcherSet::single(matcher)))
    }

    pub fn with_client_ip(self, matcher: PatternMatcher) -> Self {
        self.with_dimension(DimensionMatcher::ClientIp(MatcherSet::single(matcher)))
    }

    pub fn with_header(self, name: &str, matcher: PatternMatcher) -> Self {
        self.with_dimension(DimensionMatcher::Header(
            KeyedMatcher::new(name, vec![matcher]).ignoring_case(),
        ))
    }

    pub fn with_cookie(self, name: &str, matcher: PatternMatcher) -> Self {
        self.with_dimension(DimensionMatcher::Cookie(KeyedMatcher::new(
            name,
            vec![matcher],
        )))
    }

    pub fn with_param(self, name: &str, matcher: PatternMatcher) -> Self {
        self.with_dimension(DimensionMatcher::Param(KeyedMatcher::new(
            name,
            vec![matcher],
        )))
    }

    pub fn with_body(self, matcher: PatternMatcher) -> Self {
        self.with_dimension(DimensionMatcher::Body(MatcherSet::single(matcher)))
    }

    pub fn with_predicate<F>(self, name: &str, predicate: F) -> Self
    where
        F: Fn(&RequestValue) -> bool + Send + Sync + 'static,
    {
        self.with_dimension(DimensionMatcher::Predicate(NamedPredicate {
            name: name.to_string(),
            predicate: Arc::new(predicate),
        }))
    }

    pub fn dimensions(&self) -> &[DimensionMatcher] {
        &self.dimensions
    }

    /// Score every dimension into `result`.
    pub fn score(&self, request: &RequestValue, result: &mut RequestMatchResult) {
        for dimension in &self.dimensions {
            result.add(dimension.label(), dimension.score(request));
        }
    }
}
