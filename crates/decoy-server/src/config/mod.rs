//! Configuration types for the Decoy server.
//!
//! Settings are loaded from YAML or JSON (chosen by file extension) and may be
//! overridden from the command line.
//!
//! # Module Structure
//!
//! - `proxy` - proxy-and-record settings (target, exclusions, filters)
//! - `upstream` - outbound client settings (web proxy, timeout)

mod proxy;
mod upstream;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use proxy::{MethodFilter, ProxyAndRecordSettings, ReplaceSettings, StatusCodeFilter};
pub use upstream::WebProxySettings;

/// Top-level server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Listening port; `0` binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Register the `/__admin` mappings at start.
    #[serde(default = "default_true")]
    pub start_admin_interface: bool,

    /// Surface the best non-matching mapping in 404 responses and the request log.
    #[serde(default)]
    pub allow_partial_mapping: bool,

    /// Request log capacity; oldest entries are evicted past it.
    #[serde(
        default = "default_max_request_log_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_request_log_count: Option<usize>,

    /// Maximum age of request log entries, in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_log_expiration_duration: Option<u64>,

    /// Load every `*.json` file from `mappings_directory` at start.
    #[serde(default)]
    pub read_static_mappings: bool,

    #[serde(default = "default_mappings_directory")]
    pub mappings_directory: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_and_record_settings: Option<ProxyAndRecordSettings>,
}

fn default_port() -> u16 {
    9091
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Longest accepted request log expiration: one hundred years.
pub const MAX_REQUEST_LOG_EXPIRATION_HOURS: u64 = 876_000;

fn default_max_request_log_count() -> Option<usize> {
    Some(1000)
}

fn default_true() -> bool {
    true
}

fn default_mappings_directory() -> PathBuf {
    PathBuf::from("__admin/mappings")
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            start_admin_interface: true,
            allow_partial_mapping: false,
            max_request_log_count: default_max_request_log_count(),
            request_log_expiration_duration: None,
            read_static_mappings: false,
            mappings_directory: default_mappings_directory(),
            proxy_and_record_settings: None,
        }
    }
}

impl ServerSettings {
    /// Load settings from a YAML or JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let settings: ServerSettings = if is_json {
            serde_json::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.host.trim().is_empty() {
            anyhow::bail!("Server host must not be empty");
        }

        if self.max_request_log_count == Some(0) {
            anyhow::bail!("maxRequestLogCount must be greater than zero when set");
        }

        if let Some(hours) = self.request_log_expiration_duration {
            if hours > MAX_REQUEST_LOG_EXPIRATION_HOURS {
                anyhow::bail!(
                    "requestLogExpirationDuration must be at most {} hours, got {}",
                    MAX_REQUEST_LOG_EXPIRATION_HOURS,
                    hours
                );
            }
        }

        if let Some(ref proxy) = self.proxy_and_record_settings {
            proxy.validate().map_err(|e| anyhow::anyhow!(e))?;
        }

        Ok(())
    }

    /// Request log expiration as a duration, if configured and representable.
    pub fn request_log_expiration(&self) -> Option<chrono::Duration> {
        self.request_log_expiration_duration
            .and_then(|hours| i64::try_from(hours).ok())
            .and_then(chrono::Duration::try_hours)
    }
}
