//! String matching: exact, wildcard and regex patterns.

use crate::error::{DecoyError, Result};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

/// A string value with pre-computed lowercase for efficient case-insensitive matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    /// Original value (for case-sensitive matching)
    pub value: String,
    /// Pre-computed lowercase (for case-insensitive matching)
    pub lower: String,
}

impl CachedValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let lower = value.to_lowercase();
        Self { value, lower }
    }

    #[inline]
    pub fn equals(&self, value: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            value == self.value
        } else {
            value.to_lowercase() == self.lower
        }
    }
}

/// A regex compiled from either a wildcard or a regex pattern.
///
/// `source` keeps the pattern as written so mappings serialize back unchanged.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    regex: Arc<Regex>,
}

impl CompiledPattern {
    /// `*` matches any run of characters, `?` exactly one; everything else is literal.
    pub fn wildcard(pattern: &str, ignore_case: bool) -> Result<Self> {
        let escaped = regex::escape(pattern)
            .replace(r"\*", ".*")
            .replace(r"\?", ".");
        let regex = build(&format!("^{escaped}$"), ignore_case)
            .map_err(|e| DecoyError::invalid_pattern("WildcardMatcher", pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex: Arc::new(regex),
        })
    }

    pub fn regex(pattern: &str, ignore_case: bool) -> Result<Self> {
        let regex = build(pattern, ignore_case)
            .map_err(|e| DecoyError::invalid_pattern("RegexMatcher", pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex: Arc::new(regex),
        })
    }

    #[inline]
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

fn build(pattern: &str, ignore_case: bool) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .dot_matches_new_line(true)
        .build()
}
