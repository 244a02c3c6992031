//! Mappings: a request matcher paired with a response provider.
//!
//! # Module Structure
//!
//! - `builder` - [`MappingBuilder`], the programmatic way to create mappings
//! - `model` - serde model of the mapping JSON format (`Guid`, `Request`, `Response`, ...)
//! - `convert` - model <-> domain conversion with validation
//! - `files` - loading and saving mapping files

mod builder;
mod convert;
mod files;
mod model;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ProxyAndRecordSettings;
use crate::matching::{RequestMatchResult, RequestMatcher};
use crate::request::RequestValue;
use crate::response::{ResponseCallback, ResponseDefinition};
use crate::scenario::{ScenarioStep, ScenarioStore};

pub use builder::MappingBuilder;
pub use files::{load_mappings_from_dir, parse_mapping_models, save_mapping_to_file};
pub use model::{
    BodyModel, HeaderValueModel, KeyedMatcherModel, MappingModel, MatcherModel, MatchersModel,
    ReplaceSettingsModel, RequestModel, ResponseModel, ValueOrMatchers,
};

/// Priority of the administrative mappings; outranks everything.
pub const ADMIN_PRIORITY: i32 = i32::MIN;
/// Priority of the proxy catch-all mapping; loses to everything.
pub const PROXY_PRIORITY: i32 = i32::MAX;
/// Priority of mappings synthesized by recording: below user mappings, above the catch-all.
pub const RECORDED_PRIORITY: i32 = i32::MAX - 1;
pub const DEFAULT_PRIORITY: i32 = 0;

/// Where a mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MappingOrigin {
    /// Registered by a user (builder, admin API or static file)
    Configured,
    /// Administrative endpoint
    Admin,
    /// Catch-all created from the server's proxy settings
    Proxy,
    /// Synthesized from a proxied exchange
    Recorded,
}

/// How a mapping produces its response.
#[derive(Debug, Clone)]
pub enum ResponseProvider {
    Static(ResponseDefinition),
    Callback(ResponseCallback),
    Proxy(Arc<ProxyAndRecordSettings>),
}

/// One rule pairing a request matcher with a response provider.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub guid: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Lower wins ties
    pub priority: i32,
    pub request_matcher: RequestMatcher,
    pub provider: ResponseProvider,
    pub scenario: Option<String>,
    /// State the scenario must be in for this mapping to match
    pub when_state_is: Option<String>,
    /// State to move to after this mapping executes; `None` finishes the scenario
    pub set_state_to: Option<String>,
    pub times_in_same_state: Option<u32>,
    pub origin: MappingOrigin,
    pub updated_at: DateTime<Utc>,
}

impl Mapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::new()
    }

    /// Can fire without any prior scenario state.
    pub fn is_start_state(&self) -> bool {
        self.scenario.is_none() || (self.set_state_to.is_some() && self.when_state_is.is_none())
    }

    /// Survives `Reset`.
    pub fn is_permanent(&self) -> bool {
        matches!(self.origin, MappingOrigin::Admin | MappingOrigin::Proxy)
    }

    pub fn is_admin(&self) -> bool {
        self.origin == MappingOrigin::Admin
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.provider, ResponseProvider::Proxy(_))
    }

    pub fn scenario_step(&self) -> Option<ScenarioStep<'_>> {
        self.scenario.as_deref().map(|scenario| ScenarioStep {
            scenario,
            when_state_is: self.when_state_is.as_deref(),
            set_state_to: self.set_state_to.as_deref(),
            times_in_same_state: self.times_in_same_state,
        })
    }

    /// Score this mapping against a request. A scenario adds an implicit
    /// `Scenario` dimension read from the current scenario state.
    pub fn score(&self, request: &RequestValue, scenarios: &ScenarioStore) -> RequestMatchResult {
        let mut result = RequestMatchResult::new();
        self.request_matcher.score(request, &mut result);
        if let Some(step) = self.scenario_step() {
            result.add("Scenario", scenarios.score(&step));
        }
        result
    }

    /// Title, or the GUID when untitled.
    pub fn display_name(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.guid.to_string())
    }
}
