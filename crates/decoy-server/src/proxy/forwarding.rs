//! Request forwarding to the upstream.
//!
//! The outbound request copies method, path and query, headers and the raw
//! body bytes. Excluded headers and cookies are dropped, and the configured
//! find/replace rule is applied to the path. The upstream response is relayed
//! as-is except for hop-by-hop headers and an absolute `Location` pointing
//! back at the upstream, which is rewritten to this server's origin.

use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::headers::{is_hop_by_hop, is_transport_header, X_DECOY_PROXY_ERROR};
use crate::config::ProxyAndRecordSettings;
use crate::error::{DecoyError, Result};
use crate::request::RequestValue;
use crate::response::ResponseMessage;

/// Synthetic 500 returned when the upstream cannot be reached.
pub fn error_response(error: &DecoyError) -> ResponseMessage {
    ResponseMessage::json(500, &serde_json::json!({ "error": error.to_string() }))
        .with_header(X_DECOY_PROXY_ERROR, "true")
}

/// Upstream URL for `request`: the base URL followed by the (rewritten) path and the query.
pub fn target_url(settings: &ProxyAndRecordSettings, request: &RequestValue) -> Result<Url> {
    let path = match settings.replace_settings {
        Some(ref replace) => replace.apply(request.url.path()),
        None => request.url.path().to_string(),
    };
    let base = settings.url.trim_end_matches('/');
    let mut target = format!("{base}{path}");
    if let Some(query) = request.url.query() {
        target.push('?');
        target.push_str(query);
    }
    Url::parse(&target).map_err(|e| DecoyError::Upstream(format!("Invalid target url '{target}': {e}")))
}

/// Point an absolute `Location` on the upstream's origin at `own_origin`,
/// keeping path, query and fragment. Anything else passes through unchanged.
pub fn rewrite_location(location: &str, upstream: &Url, own_origin: &str) -> String {
    match Url::parse(location) {
        Ok(absolute) if absolute.origin() == upstream.origin() => {
            let mut rewritten = format!("{}{}", own_origin.trim_end_matches('/'), absolute.path());
            if let Some(query) = absolute.query() {
                rewritten.push('?');
                rewritten.push_str(query);
            }
            if let Some(fragment) = absolute.fragment() {
                rewritten.push('#');
                rewritten.push_str(fragment);
            }
            rewritten
        }
        _ => location.to_string(),
    }
}

fn upstream_error(error: reqwest::Error, timeout_ms: u64) -> DecoyError {
    if error.is_timeout() {
        DecoyError::UpstreamTimeout(timeout_ms)
    } else {
        DecoyError::Upstream(error.to_string())
    }
}

/// Send `request` upstream and collect the relayed response.
pub async fn forward(
    client: &reqwest::Client,
    settings: &ProxyAndRecordSettings,
    request: &RequestValue,
) -> Result<ResponseMessage> {
    let target = target_url(settings, request)?;
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|e| DecoyError::InvalidRequest(format!("Invalid method '{}': {e}", request.method)))?;

    debug!(method = %request.method, target = %target, "Forwarding request upstream");

    let mut outbound = client
        .request(method, target)
        .timeout(Duration::from_millis(settings.timeout_ms));

    for (name, value) in &request.raw_headers {
        if is_transport_header(name)
            || name.eq_ignore_ascii_case("cookie")
            || settings.is_excluded_header(name)
        {
            continue;
        }
        match reqwest::header::HeaderValue::from_bytes(value) {
            Ok(value) => outbound = outbound.header(name.as_str(), value),
            Err(_) => debug!(header = %name, "Skipping unforwardable header value"),
        }
    }

    let cookies: Vec<String> = request
        .cookies
        .iter()
        .filter(|(name, _)| !settings.is_excluded_cookie(name))
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    if !cookies.is_empty() {
        outbound = outbound.header("cookie", cookies.join("; "));
    }

    if !request.body.is_empty() {
        outbound = outbound.body(request.body.clone());
    }

    let upstream = outbound
        .send()
        .await
        .map_err(|e| upstream_error(e, settings.timeout_ms))?;

    let upstream_url = Url::parse(&settings.url)
        .map_err(|e| DecoyError::Upstream(format!("Invalid proxy url '{}': {e}", settings.url)))?;
    let own_origin = request.origin();

    let mut response = ResponseMessage::new(upstream.status().as_u16());
    for (name, value) in upstream.headers() {
        let name = name.as_str();
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        match value.to_str() {
            Ok(location) if name.eq_ignore_ascii_case("location") => response
                .headers
                .push((name.to_string(), rewrite_location(location, &upstream_url, &own_origin))),
            _ => response.push_header_bytes(name, value.as_bytes()),
        }
    }

    response.body = upstream
        .bytes()
        .await
        .map_err(|e| upstream_error(e, settings.timeout_ms))?;

    debug!(status = response.status, bytes = response.body.len(), "Upstream responded");
    Ok(response)
}

/// Forward and convert any failure into the synthetic error response.
pub async fn forward_or_error(
    client: &reqwest::Client,
    settings: &ProxyAndRecordSettings,
    request: &RequestValue,
) -> std::result::Result<ResponseMessage, ResponseMessage> {
    forward(client, settings, request).await.map_err(|e| {
        warn!(url = %settings.url, error = %e, "Proxy request failed");
        error_response(&e)
    })
}
