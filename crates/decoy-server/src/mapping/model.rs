//! Serialized mapping format.
//!
//! Field names follow the established mock-server mapping JSON (PascalCase,
//! matcher blocks discriminated by `Name`) so existing mapping files load
//! unchanged and recorded mappings can be replayed elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MappingModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_state_is: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_state_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times_in_same_state: Option<u32>,
    #[serde(default)]
    pub request: RequestModel,
    #[serde(default)]
    pub response: ResponseModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestModel {
    #[serde(rename = "ClientIP", default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<ValueOrMatchers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<ValueOrMatchers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<ValueOrMatchers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<KeyedMatcherModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Vec<KeyedMatcherModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<KeyedMatcherModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyModel>,
}

/// `"Path": "/x"` (wildcard shorthand) or `"Path": {"Matchers": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueOrMatchers {
    Value(String),
    Matchers(MatchersModel),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchersModel {
    pub matchers: Vec<MatcherModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_operator: Option<String>,
}

/// Header, cookie or query parameter matcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyedMatcherModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Vec<MatcherModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_case: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_on_match: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_operator: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BodyModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<MatcherModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Vec<MatcherModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_operator: Option<String>,
}

/// One pattern matcher, discriminated by `Name` (e.g. `"WildcardMatcher"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatcherModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_case: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_on_match: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_operator: Option<String>,
}

impl MatcherModel {
    pub fn new(name: &str, pattern: Value) -> Self {
        Self {
            name: name.to_string(),
            pattern: Some(pattern),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseModel {
    #[serde(
        default,
        deserialize_with = "deserialize_status_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, HeaderValueModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_as_json: Option<Value>,
    /// Base64-encoded bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_as_bytes: Option<String>,
    /// Delay in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url_replace_settings: Option<ReplaceSettingsModel>,
}

/// A header value is either a single string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValueModel {
    One(String),
    Many(Vec<String>),
}

impl HeaderValueModel {
    pub fn into_values(self) -> Vec<String> {
        match self {
            HeaderValueModel::One(value) => vec![value],
            HeaderValueModel::Many(values) => values,
        }
    }

    pub fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            HeaderValueModel::One(values.remove(0))
        } else {
            HeaderValueModel::Many(values)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplaceSettingsModel {
    pub old_value: String,
    pub new_value: String,
    #[serde(default)]
    pub ignore_case: bool,
}

/// Status codes arrive as numbers or numeric strings.
fn deserialize_status_code<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom("invalid StatusCode number")),
        Some(Value::String(s)) => s
            .parse::<u16>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid StatusCode string: {s}"))),
        Some(_) => Err(D::Error::custom("StatusCode must be a number or string")),
    }
}
