//! Aggregated score of one mapping against one request.

use crate::matchers::scores;
use serde::Serialize;

/// Score of a single request dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchDetail {
    pub name: String,
    pub score: f64,
}

/// Ordered per-dimension scores for one resolution attempt.
///
/// The total is the minimum over all attempted dimensions, so a mapping only
/// matches when every dimension does. A mapping that constrains nothing scores
/// a perfect 1.0. The average is kept to rank partial matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMatchResult {
    details: Vec<MatchDetail>,
}

impl RequestMatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dimension score and return it.
    pub fn add(&mut self, name: impl Into<String>, score: f64) -> f64 {
        self.details.push(MatchDetail {
            name: name.into(),
            score,
        });
        score
    }

    pub fn details(&self) -> &[MatchDetail] {
        &self.details
    }

    pub fn total_score(&self) -> f64 {
        self.details
            .iter()
            .map(|d| d.score)
            .fold(scores::PERFECT, f64::min)
    }

    pub fn average_score(&self) -> f64 {
        if self.details.is_empty() {
            return scores::PERFECT;
        }
        self.details.iter().map(|d| d.score).sum::<f64>() / self.details.len() as f64
    }

    pub fn is_perfect_match(&self) -> bool {
        self.total_score() == scores::PERFECT
    }

    /// Eligible to serve a response.
    pub fn is_match(&self) -> bool {
        self.total_score() > scores::MISMATCH
    }
}

/// Serialized summary, as it appears in the request log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchResultSummary {
    pub total_score: f64,
    pub average_score: f64,
    pub is_perfect_match: bool,
    pub match_details: Vec<MatchDetail>,
}

impl From<&RequestMatchResult> for MatchResultSummary {
    fn from(result: &RequestMatchResult) -> Self {
        Self {
            total_score: result.total_score(),
            average_score: result.average_score(),
            is_perfect_match: result.is_perfect_match(),
            match_details: result.details.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_perfect() {
        let result = RequestMatchResult::new();
        assert_eq!(result.total_score(), 1.0);
        assert!(result.is_perfect_match());
        assert!(result.is_match());
    }

    #[test]
    fn test_total_is_minimum() {
        let mut result = RequestMatchResult::new();
        result.add("Path", 1.0);
        result.add("Header:X-Id", 0.5);
        result.add("Method", 1.0);
        assert_eq!(result.total_score(), 0.5);
        assert!(!result.is_perfect_match());
        assert!(result.is_match());
        assert!((result.average_score() - 2.5 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_any_zero_dimension_is_no_match() {
        let mut result = RequestMatchResult::new();
        result.add("Path", 1.0);
        result.add("Scenario", 0.0);
        assert!(!result.is_match());
        assert_eq!(result.average_score(), 0.5);
    }

    #[test]
    fn test_summary() {
        let mut result = RequestMatchResult::new();
        result.add("Path", 1.0);
        let summary = MatchResultSummary::from(&result);
        assert!(summary.is_perfect_match);
        assert_eq!(summary.match_details.len(), 1);
        assert_eq!(summary.match_details[0].name, "Path");
    }
}
