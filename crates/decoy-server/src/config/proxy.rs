//! Proxy-and-record configuration.

use super::upstream::WebProxySettings;
use serde::{Deserialize, Serialize};

/// Settings for forwarding unmatched (or explicitly proxied) requests and
/// turning the observed traffic into mappings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyAndRecordSettings {
    /// Upstream base URL
    pub url: String,

    /// Register a mapping for every recorded exchange
    #[serde(default)]
    pub save_mapping: bool,

    /// Write recorded mappings to the mappings directory
    #[serde(default)]
    pub save_mapping_to_file: bool,

    /// Status codes worth recording: `*`, `200`, `2xx`, `200-299` or a comma list
    #[serde(default = "default_status_code_pattern")]
    pub save_mapping_for_status_code_pattern: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_cookies: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_params: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_settings: Option<ReplaceSettings>,

    /// Only record these methods (empty = all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_methods: Vec<String>,

    /// Never record these methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_methods: Vec<String>,

    /// Record with the proxy mapping's own request matcher instead of an exact one
    #[serde(default)]
    pub use_defined_request_matchers: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_proxy_settings: Option<WebProxySettings>,

    /// Outbound call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_status_code_pattern() -> String {
    "*".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ProxyAndRecordSettings {
    /// Plain forwarding to `url` with every other option at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            save_mapping: false,
            save_mapping_to_file: false,
            save_mapping_for_status_code_pattern: default_status_code_pattern(),
            excluded_headers: Vec::new(),
            excluded_cookies: Vec::new(),
            excluded_params: Vec::new(),
            replace_settings: None,
            allowed_methods: Vec::new(),
            excluded_methods: Vec::new(),
            use_defined_request_matchers: false,
            web_proxy_settings: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| format!("Invalid proxy url '{}': {e}", self.url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "Unsupported proxy url scheme '{}'. Currently supported: http, https",
                parsed.scheme()
            ));
        }
        StatusCodeFilter::parse(&self.save_mapping_for_status_code_pattern)?;
        if self.timeout_ms == 0 {
            return Err("timeoutMs must be greater than zero".to_string());
        }
        if let Some(ref web_proxy) = self.web_proxy_settings {
            web_proxy.validate()?;
        }
        Ok(())
    }

    /// Whether recording is enabled at all.
    pub fn records(&self) -> bool {
        self.save_mapping || self.save_mapping_to_file
    }

    pub fn method_filter(&self) -> MethodFilter<'_> {
        MethodFilter {
            allowed: &self.allowed_methods,
            excluded: &self.excluded_methods,
        }
    }

    /// Status filter; an unparsable pattern (rejected by `validate`) records nothing.
    pub fn status_code_filter(&self) -> StatusCodeFilter {
        StatusCodeFilter::parse(&self.save_mapping_for_status_code_pattern)
            .unwrap_or(StatusCodeFilter::Ranges(Vec::new()))
    }

    pub fn is_excluded_header(&self, name: &str) -> bool {
        contains_ignore_case(&self.excluded_headers, name)
    }

    pub fn is_excluded_cookie(&self, name: &str) -> bool {
        contains_ignore_case(&self.excluded_cookies, name)
    }

    pub fn is_excluded_param(&self, name: &str) -> bool {
        contains_ignore_case(&self.excluded_params, name)
    }
}

fn contains_ignore_case(list: &[String], name: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(name))
}

/// Find/replace rule applied to the outbound path.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSettings {
    pub old_value: String,
    pub new_value: String,
    #[serde(default)]
    pub ignore_case: bool,
}

impl ReplaceSettings {
    /// Replace every occurrence of `old_value` in `input`.
    pub fn apply(&self, input: &str) -> String {
        if self.old_value.is_empty() {
            return input.to_string();
        }
        if !self.ignore_case {
            return input.replace(&self.old_value, &self.new_value);
        }
        let pattern = format!("(?i){}", regex::escape(&self.old_value));
        match regex::Regex::new(&pattern) {
            Ok(re) => re
                .replace_all(input, regex::NoExpand(self.new_value.as_str()))
                .into_owned(),
            Err(_) => input.to_string(),
        }
    }
}

/// Parsed form of `saveMappingForStatusCodePattern`.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusCodeFilter {
    Any,
    /// Inclusive ranges; a single code is a one-element range.
    Ranges(Vec<(u16, u16)>),
}

impl StatusCodeFilter {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern == "*" {
            return Ok(StatusCodeFilter::Any);
        }

        let mut ranges = Vec::new();
        for item in pattern.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let lower = item.to_ascii_lowercase();
            let range = if let Some(class) = lower.strip_suffix("xx") {
                let digit: u16 = class
                    .parse()
                    .ok()
                    .filter(|d| (1..=5).contains(d))
                    .ok_or_else(|| format!("Invalid status code class '{item}'"))?;
                (digit * 100, digit * 100 + 99)
            } else if let Some((from, to)) = lower.split_once('-') {
                let from = parse_code(from, item)?;
                let to = parse_code(to, item)?;
                if from > to {
                    return Err(format!("Invalid status code range '{item}'"));
                }
                (from, to)
            } else {
                let code = parse_code(&lower, item)?;
                (code, code)
            };
            ranges.push(range);
        }
        Ok(StatusCodeFilter::Ranges(ranges))
    }

    pub fn allows(&self, status: u16) -> bool {
        match self {
            StatusCodeFilter::Any => true,
            StatusCodeFilter::Ranges(ranges) => ranges
                .iter()
                .any(|(from, to)| (*from..=*to).contains(&status)),
        }
    }
}

fn parse_code(value: &str, item: &str) -> Result<u16, String> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|code| (100..=599).contains(code))
        .ok_or_else(|| format!("Invalid status code '{item}'"))
}

/// Allow/deny filter over HTTP methods for recording.
#[derive(Debug, Clone, Copy)]
pub struct MethodFilter<'a> {
    allowed: &'a [String],
    excluded: &'a [String],
}

impl MethodFilter<'_> {
    pub fn allows(&self, method: &str) -> bool {
        if contains_ignore_case(self.excluded, method) {
            return false;
        }
        self.allowed.is_empty() || contains_ignore_case(self.allowed, method)
    }
}
