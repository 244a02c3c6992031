//! Request matching.
//!
//! # Module Structure
//!
//! - `request_matcher` - per-dimension matchers (method, path, url, client IP,
//!   header, cookie, param, body, predicate) and the [`RequestMatcher`] composite
//! - `result` - [`RequestMatchResult`], the per-dimension score list

mod request_matcher;
mod result;

pub use request_matcher::{
    DimensionMatcher, KeyedMatcher, MatcherSet, NamedPredicate, RequestMatcher, RequestPredicate,
};
pub use result::{MatchDetail, MatchResultSummary, RequestMatchResult};
