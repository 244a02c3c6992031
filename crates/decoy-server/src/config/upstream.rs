//! Outbound connection settings for the proxy client.

use serde::{Deserialize, Serialize};

/// Optional forward proxy sitting between Decoy and the upstream.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebProxySettings {
    /// Proxy address, e.g. `http://corp-proxy:3128`
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl WebProxySettings {
    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.address)
            .map_err(|e| format!("Invalid web proxy address '{}': {e}", self.address))?;
        if self.password.is_some() && self.user_name.is_none() {
            return Err("webProxySettings.password requires userName".to_string());
        }
        Ok(())
    }
}
