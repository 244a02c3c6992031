//! Conversion between the mapping JSON model and compiled mappings.

use base64::Engine;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;

use super::model::{
    BodyModel, HeaderValueModel, KeyedMatcherModel, MappingModel, MatcherModel, MatchersModel,
    ReplaceSettingsModel, RequestModel, ResponseModel, ValueOrMatchers,
};
use super::{Mapping, MappingBuilder, ResponseProvider};
use crate::config::{ProxyAndRecordSettings, ReplaceSettings};
use crate::error::{DecoyError, Result};
use crate::matchers::{MatchBehaviour, MatchOperator, PatternMatcher};
use crate::matching::{DimensionMatcher, KeyedMatcher, MatcherSet, RequestMatcher};
use crate::response::{ResponseBody, ResponseDefinition};

impl PatternMatcher {
    pub fn from_model(model: &MatcherModel) -> Result<Self> {
        let patterns = match (&model.patterns, &model.pattern) {
            (Some(patterns), _) => patterns.clone(),
            (None, Some(pattern)) => vec![pattern.clone()],
            (None, None) => Vec::new(),
        };
        let matcher = PatternMatcher::compile(
            &model.name,
            &patterns,
            model.ignore_case.unwrap_or(false),
        )?
        .with_behaviour(MatchBehaviour::from_reject(
            model.reject_on_match.unwrap_or(false),
        ))
        .with_operator(parse_operator(model.match_operator.as_deref())?);
        Ok(matcher)
    }

    pub fn to_model(&self) -> MatcherModel {
        let mut patterns = self.patterns();
        let (pattern, patterns) = match patterns.len() {
            0 => (None, None),
            1 => (Some(patterns.remove(0)), None),
            _ => (None, Some(patterns)),
        };
        MatcherModel {
            name: self.name().to_string(),
            pattern,
            patterns,
            ignore_case: self.ignore_case().then_some(true),
            reject_on_match: self.behaviour().is_reject().then_some(true),
            match_operator: operator_to_model(self.operator()),
        }
    }
}

fn parse_operator(value: Option<&str>) -> Result<MatchOperator> {
    value.map_or(Ok(MatchOperator::Or), MatchOperator::parse)
}

fn operator_to_model(operator: MatchOperator) -> Option<String> {
    (operator != MatchOperator::Or).then(|| operator.as_str().to_string())
}

fn matchers_from_models(models: &[MatcherModel]) -> Result<Vec<PatternMatcher>> {
    models.iter().map(PatternMatcher::from_model).collect()
}

/// A bare string is a wildcard pattern.
fn matcher_set_from_model(model: &ValueOrMatchers) -> Result<MatcherSet> {
    match model {
        ValueOrMatchers::Value(pattern) => Ok(MatcherSet::single(PatternMatcher::wildcard(pattern)?)),
        ValueOrMatchers::Matchers(block) => {
            if block.matchers.is_empty() {
                return Err(DecoyError::MalformedMapping(
                    "Matchers must not be empty".to_string(),
                ));
            }
            Ok(MatcherSet::new(
                matchers_from_models(&block.matchers)?,
                parse_operator(block.match_operator.as_deref())?,
            ))
        }
    }
}

fn matcher_set_to_model(set: &MatcherSet) -> ValueOrMatchers {
    ValueOrMatchers::Matchers(MatchersModel {
        matchers: set.matchers.iter().map(PatternMatcher::to_model).collect(),
        match_operator: operator_to_model(set.operator),
    })
}

fn keyed_from_model(model: &KeyedMatcherModel, always_ignore_case: bool) -> Result<KeyedMatcher> {
    if model.name.trim().is_empty() {
        return Err(DecoyError::MalformedMapping(
            "Header, cookie and param matchers need a Name".to_string(),
        ));
    }
    let matchers = match model.matchers {
        Some(ref matchers) => matchers_from_models(matchers)?,
        None => Vec::new(),
    };
    Ok(KeyedMatcher {
        name: model.name.clone(),
        matchers,
        ignore_case: always_ignore_case || model.ignore_case.unwrap_or(false),
        behaviour: MatchBehaviour::from_reject(model.reject_on_match.unwrap_or(false)),
        operator: parse_operator(model.match_operator.as_deref())?,
    })
}

fn keyed_to_model(keyed: &KeyedMatcher) -> KeyedMatcherModel {
    KeyedMatcherModel {
        name: keyed.name.clone(),
        matchers: (!keyed.matchers.is_empty())
            .then(|| keyed.matchers.iter().map(PatternMatcher::to_model).collect()),
        ignore_case: keyed.ignore_case.then_some(true),
        reject_on_match: keyed.behaviour.is_reject().then_some(true),
        match_operator: operator_to_model(keyed.operator),
    }
}

fn body_from_model(model: &BodyModel) -> Result<MatcherSet> {
    let mut matchers = Vec::new();
    if let Some(ref matcher) = model.matcher {
        matchers.push(PatternMatcher::from_model(matcher)?);
    }
    if let Some(ref more) = model.matchers {
        matchers.extend(matchers_from_models(more)?);
    }
    if matchers.is_empty() {
        return Err(DecoyError::MalformedMapping(
            "Body needs a Matcher or Matchers".to_string(),
        ));
    }
    Ok(MatcherSet::new(
        matchers,
        parse_operator(model.match_operator.as_deref())?,
    ))
}

fn body_to_model(set: &MatcherSet) -> BodyModel {
    let mut models: Vec<MatcherModel> = set.matchers.iter().map(PatternMatcher::to_model).collect();
    if models.len() == 1 {
        BodyModel {
            matcher: models.pop(),
            matchers: None,
            match_operator: None,
        }
    } else {
        BodyModel {
            matcher: None,
            matchers: Some(models),
            match_operator: operator_to_model(set.operator),
        }
    }
}

impl RequestMatcher {
    /// Dimensions are added in a fixed order: client IP, methods, path, url,
    /// headers, cookies, params, body.
    pub fn from_model(model: &RequestModel) -> Result<Self> {
        let mut matcher = RequestMatcher::new();
        if let Some(ref client_ip) = model.client_ip {
            matcher = matcher.with_dimension(DimensionMatcher::ClientIp(matcher_set_from_model(client_ip)?));
        }
        if let Some(ref methods) = model.methods {
            if !methods.is_empty() {
                matcher = matcher.with_methods(methods.iter().cloned());
            }
        }
        if let Some(ref path) = model.path {
            matcher = matcher.with_dimension(DimensionMatcher::Path(matcher_set_from_model(path)?));
        }
        if let Some(ref url) = model.url {
            matcher = matcher.with_dimension(DimensionMatcher::Url(matcher_set_from_model(url)?));
        }
        for header in model.headers.iter().flatten() {
            matcher = matcher.with_dimension(DimensionMatcher::Header(keyed_from_model(header, true)?));
        }
        for cookie in model.cookies.iter().flatten() {
            matcher = matcher.with_dimension(DimensionMatcher::Cookie(keyed_from_model(cookie, false)?));
        }
        for param in model.params.iter().flatten() {
            matcher = matcher.with_dimension(DimensionMatcher::Param(keyed_from_model(param, false)?));
        }
        if let Some(ref body) = model.body {
            matcher = matcher.with_dimension(DimensionMatcher::Body(body_from_model(body)?));
        }
        Ok(matcher)
    }

    /// Programmatic predicates have no serialized form and are left out.
    pub fn to_model(&self) -> RequestModel {
        let mut model = RequestModel::default();
        for dimension in self.dimensions() {
            match dimension {
                DimensionMatcher::Methods(methods) => model.methods = Some(methods.clone()),
                DimensionMatcher::Path(set) => model.path = Some(matcher_set_to_model(set)),
                DimensionMatcher::Url(set) => model.url = Some(matcher_set_to_model(set)),
                DimensionMatcher::ClientIp(set) => {
                    model.client_ip = Some(matcher_set_to_model(set))
                }
                DimensionMatcher::Header(keyed) => model
                    .headers
                    .get_or_insert_with(Vec::new)
                    .push(keyed_to_model(keyed)),
                DimensionMatcher::Cookie(keyed) => model
                    .cookies
                    .get_or_insert_with(Vec::new)
                    .push(keyed_to_model(keyed)),
                DimensionMatcher::Param(keyed) => model
                    .params
                    .get_or_insert_with(Vec::new)
                    .push(keyed_to_model(keyed)),
                DimensionMatcher::Body(set) => model.body = Some(body_to_model(set)),
                DimensionMatcher::Predicate(_) => {}
            }
        }
        model
    }
}

impl ResponseDefinition {
    pub fn from_model(model: &ResponseModel) -> Result<Self> {
        let mut definition = ResponseDefinition::new(model.status_code.unwrap_or(200));
        for (name, value) in model.headers.clone().unwrap_or_default() {
            for value in value.into_values() {
                definition = definition.with_header(name.clone(), value);
            }
        }

        let bodies = [
            model.body.is_some(),
            model.body_as_json.is_some(),
            model.body_as_bytes.is_some(),
        ];
        if bodies.iter().filter(|set| **set).count() > 1 {
            return Err(DecoyError::MalformedMapping(
                "Only one of Body, BodyAsJson and BodyAsBytes may be set".to_string(),
            ));
        }
        definition.body = if let Some(ref text) = model.body {
            ResponseBody::Text(text.clone())
        } else if let Some(ref json) = model.body_as_json {
            ResponseBody::Json(json.clone())
        } else if let Some(ref encoded) = model.body_as_bytes {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| DecoyError::MalformedMapping(format!("BodyAsBytes is not base64: {e}")))?;
            ResponseBody::Bytes(Bytes::from(bytes))
        } else {
            ResponseBody::Empty
        };

        definition.delay = model.delay.map(Duration::from_millis);
        Ok(definition)
    }

    pub fn to_model(&self) -> ResponseModel {
        let headers: BTreeMap<String, HeaderValueModel> = self
            .headers
            .iter()
            .map(|(name, values)| (name.clone(), HeaderValueModel::from_values(values.clone())))
            .collect();
        let mut model = ResponseModel {
            status_code: Some(self.status),
            headers: (!headers.is_empty()).then_some(headers),
            delay: self
                .delay
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            ..Default::default()
        };
        match &self.body {
            ResponseBody::Empty => {}
            ResponseBody::Text(text) => model.body = Some(text.clone()),
            ResponseBody::Json(value) => model.body_as_json = Some(value.clone()),
            ResponseBody::Bytes(bytes) => {
                model.body_as_bytes = Some(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
        model
    }
}

fn proxy_from_model(url: &str, replace: Option<&ReplaceSettingsModel>) -> ProxyAndRecordSettings {
    let mut settings = ProxyAndRecordSettings::new(url);
    settings.replace_settings = replace.map(|r| ReplaceSettings {
        old_value: r.old_value.clone(),
        new_value: r.new_value.clone(),
        ignore_case: r.ignore_case,
    });
    settings
}

impl Mapping {
    /// Compile a mapping from its JSON model. Any invalid part rejects the whole mapping.
    pub fn from_model(model: MappingModel) -> Result<Mapping> {
        let request_matcher = RequestMatcher::from_model(&model.request)?;

        let mut builder = MappingBuilder::new().given(request_matcher);
        if let Some(guid) = model.guid {
            builder = builder.with_guid(guid);
        }
        if let Some(title) = model.title {
            builder = builder.with_title(title);
        }
        if let Some(description) = model.description {
            builder = builder.with_description(description);
        }
        if let Some(priority) = model.priority {
            builder = builder.at_priority(priority);
        }
        if let Some(scenario) = model.scenario {
            builder = builder.in_scenario(scenario);
        }
        if let Some(state) = model.when_state_is {
            builder = builder.when_state_is(state);
        }
        if let Some(state) = model.set_state_to {
            builder = builder.will_set_state_to(state);
        }
        if let Some(times) = model.times_in_same_state {
            builder = builder.times_in_same_state(times);
        }

        let provider = match model.response.proxy_url {
            Some(ref url) => ResponseProvider::Proxy(std::sync::Arc::new(proxy_from_model(
                url,
                model.response.proxy_url_replace_settings.as_ref(),
            ))),
            None => ResponseProvider::Static(ResponseDefinition::from_model(&model.response)?),
        };

        builder.with_provider(provider).build()
    }

    pub fn to_model(&self) -> MappingModel {
        let response = match &self.provider {
            ResponseProvider::Static(definition) => definition.to_model(),
            ResponseProvider::Proxy(settings) => ResponseModel {
                proxy_url: Some(settings.url.clone()),
                proxy_url_replace_settings: settings.replace_settings.as_ref().map(|r| {
                    ReplaceSettingsModel {
                        old_value: r.old_value.clone(),
                        new_value: r.new_value.clone(),
                        ignore_case: r.ignore_case,
                    }
                }),
                ..Default::default()
            },
            ResponseProvider::Callback(_) => ResponseModel::default(),
        };

        MappingModel {
            guid: Some(self.guid),
            title: self.title.clone(),
            description: self.description.clone(),
            priority: Some(self.priority),
            scenario: self.scenario.clone(),
            when_state_is: self.when_state_is.clone(),
            set_state_to: self.set_state_to.clone(),
            times_in_same_state: self.times_in_same_state,
            request: self.request_matcher.to_model(),
            response,
            updated_at: Some(self.updated_at),
        }
    }
}
