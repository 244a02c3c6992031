//! Programmatic mapping construction.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{Mapping, MappingOrigin, ResponseProvider, DEFAULT_PRIORITY};
use crate::config::ProxyAndRecordSettings;
use crate::error::{DecoyError, Result};
use crate::matching::RequestMatcher;
use crate::request::RequestValue;
use crate::response::{ResponseCallback, ResponseDefinition, ResponseMessage};

/// Builder for [`Mapping`]. Validation happens once, in [`MappingBuilder::build`].
#[derive(Debug, Clone)]
pub struct MappingBuilder {
    guid: Option<Uuid>,
    title: Option<String>,
    description: Option<String>,
    priority: i32,
    request_matcher: RequestMatcher,
    provider: Option<ResponseProvider>,
    scenario: Option<String>,
    when_state_is: Option<String>,
    set_state_to: Option<String>,
    times_in_same_state: Option<u32>,
    origin: MappingOrigin,
}

impl Default for MappingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self {
            guid: None,
            title: None,
            description: None,
            priority: DEFAULT_PRIORITY,
            request_matcher: RequestMatcher::new(),
            provider: None,
            scenario: None,
            when_state_is: None,
            set_state_to: None,
            times_in_same_state: None,
            origin: MappingOrigin::Configured,
        }
    }

    pub fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = Some(guid);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn at_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn given(mut self, request_matcher: RequestMatcher) -> Self {
        self.request_matcher = request_matcher;
        self
    }

    pub fn in_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn when_state_is(mut self, state: impl Into<String>) -> Self {
        self.when_state_is = Some(state.into());
        self
    }

    pub fn will_set_state_to(mut self, state: impl Into<String>) -> Self {
        self.set_state_to = Some(state.into());
        self
    }

    /// Only move to the next state after `times` executions in the current one.
    pub fn times_in_same_state(mut self, times: u32) -> Self {
        self.times_in_same_state = Some(times);
        self
    }

    pub fn respond_with(mut self, response: ResponseDefinition) -> Self {
        self.provider = Some(ResponseProvider::Static(response));
        self
    }

    pub fn respond_with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestValue) -> ResponseMessage + Send + Sync + 'static,
    {
        self.provider = Some(ResponseProvider::Callback(ResponseCallback::new(callback)));
        self
    }

    pub fn respond_with_proxy(mut self, settings: ProxyAndRecordSettings) -> Self {
        self.provider = Some(ResponseProvider::Proxy(Arc::new(settings)));
        self
    }

    pub(crate) fn with_provider(mut self, provider: ResponseProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub(crate) fn with_origin(mut self, origin: MappingOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Validate and build. Without a response the mapping answers `200` with an empty body.
    pub fn build(self) -> Result<Mapping> {
        if self.scenario.is_none()
            && (self.when_state_is.is_some()
                || self.set_state_to.is_some()
                || self.times_in_same_state.is_some())
        {
            return Err(DecoyError::MalformedMapping(
                "WhenStateIs, SetStateTo and TimesInSameState require a Scenario".to_string(),
            ));
        }
        if self.scenario.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(DecoyError::MalformedMapping(
                "Scenario name must not be empty".to_string(),
            ));
        }
        if self.times_in_same_state == Some(0) {
            return Err(DecoyError::MalformedMapping(
                "TimesInSameState must be at least 1".to_string(),
            ));
        }
        if let Some(ResponseProvider::Proxy(ref settings)) = self.provider {
            settings.validate().map_err(DecoyError::MalformedMapping)?;
        }
        if let Some(ResponseProvider::Static(ref response)) = self.provider {
            if hyper::StatusCode::from_u16(response.status).is_err() {
                return Err(DecoyError::MalformedMapping(format!(
                    "Invalid status code {}",
                    response.status
                )));
            }
        }

        Ok(Mapping {
            guid: self.guid.unwrap_or_else(Uuid::new_v4),
            title: self.title,
            description: self.description,
            priority: self.priority,
            request_matcher: self.request_matcher,
            provider: self
                .provider
                .unwrap_or_else(|| ResponseProvider::Static(ResponseDefinition::new(200))),
            scenario: self.scenario,
            when_state_is: self.when_state_is,
            set_state_to: self.set_state_to,
            times_in_same_state: self.times_in_same_state,
            origin: self.origin,
            updated_at: Utc::now(),
        })
    }
}
