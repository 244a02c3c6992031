//! HTTP client creation for the proxy pipeline.
//!
//! Clients are pooled per outbound web-proxy configuration; every mapping
//! that forwards through the same web proxy shares one connection pool.

use dashmap::DashMap;
use std::time::Duration;
use tracing::info;

use crate::config::WebProxySettings;
use crate::error::{DecoyError, Result};

/// Build a client that never follows redirects, so `Location` headers reach
/// the caller (after rewriting) instead of being chased upstream.
pub fn create_http_client(web_proxy: Option<&WebProxySettings>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_idle_timeout(Duration::from_secs(90));

    if let Some(settings) = web_proxy {
        let mut proxy = reqwest::Proxy::all(&settings.address)
            .map_err(|e| DecoyError::Config(format!("Invalid web proxy '{}': {e}", settings.address)))?;
        if let Some(ref user) = settings.user_name {
            proxy = proxy.basic_auth(user, settings.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(proxy);
        info!(address = %settings.address, "Proxy client routed through web proxy");
    }

    builder
        .build()
        .map_err(|e| DecoyError::Config(format!("Failed to create HTTP client: {e}")))
}

/// Lazily built clients keyed by web-proxy address and user.
#[derive(Debug, Default)]
pub struct ClientCache {
    clients: DashMap<Option<(String, Option<String>)>, reqwest::Client>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, web_proxy: Option<&WebProxySettings>) -> Result<reqwest::Client> {
        let key = web_proxy.map(|w| (w.address.clone(), w.user_name.clone()));
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }
        let client = create_http_client(web_proxy)?;
        Ok(self.clients.entry(key).or_insert(client).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_are_reused_per_key() {
        let cache = ClientCache::new();
        cache.get(None).unwrap();
        cache.get(None).unwrap();
        let web_proxy = WebProxySettings {
            address: "http://proxy.local:3128".to_string(),
            user_name: Some("u".to_string()),
            password: Some("p".to_string()),
        };
        cache.get(Some(&web_proxy)).unwrap();
        assert_eq!(cache.clients.len(), 2);
    }
}
