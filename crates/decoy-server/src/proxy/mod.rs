//! Proxy-and-record pipeline.
//!
//! # Module Structure
//!
//! - `client` - pooled outbound HTTP clients (reqwest), optional web proxy
//! - `forwarding` - outbound request construction, relay and `Location` rewrite
//! - `recorder` - mapping synthesis from proxied exchanges and idempotent registration
//! - `headers` - hop-by-hop filtering and the proxy error marker header

mod client;
mod forwarding;
mod headers;
mod recorder;

use std::sync::Arc;
use tracing::warn;

use crate::config::ProxyAndRecordSettings;
use crate::mapping::Mapping;
use crate::request::RequestValue;
use crate::response::ResponseMessage;

pub use client::{create_http_client, ClientCache};
pub use forwarding::{error_response, forward, rewrite_location, target_url};
pub use headers::X_DECOY_PROXY_ERROR;
pub use recorder::{synthesize_mapping, RecordContext, Recorder};

/// Forwarding plus recording, shared by every proxy mapping of a server.
#[derive(Debug, Default)]
pub struct ProxyPipeline {
    clients: ClientCache,
    recorder: Recorder,
}

impl ProxyPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `request`. On failure the synthetic 500 is returned as the error.
    pub async fn forward(
        &self,
        settings: &ProxyAndRecordSettings,
        request: &RequestValue,
    ) -> Result<ResponseMessage, ResponseMessage> {
        let client = self
            .clients
            .get(settings.web_proxy_settings.as_ref())
            .map_err(|e| {
                warn!(error = %e, "Cannot create proxy client");
                error_response(&e)
            })?;
        forwarding::forward_or_error(&client, settings, request).await
    }

    /// Record a completed exchange. Recording failures are logged, never surfaced.
    pub async fn record(
        &self,
        ctx: &RecordContext<'_>,
        request: &RequestValue,
        response: &ResponseMessage,
    ) -> Option<Arc<Mapping>> {
        match self.recorder.record(ctx, request, response).await {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!(error = %e, "Failed to record proxied exchange");
                None
            }
        }
    }
}
