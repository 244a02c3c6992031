//! Response definitions and the messages produced from them.
//!
//! # Module Structure
//!
//! - [`ResponseDefinition`] - static response configured on a mapping
//! - [`ResponseCallback`] - response computed from the request at call time
//! - [`ResponseMessage`] - the concrete response sent back to the client

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::request::RequestValue;

/// Body of a static response.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

/// Static response: status, headers, body and an optional delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDefinition {
    pub status: u16,
    /// Ordered header names with one or more values each
    pub headers: Vec<(String, Vec<String>)>,
    pub body: ResponseBody,
    pub delay: Option<Duration>,
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ResponseDefinition {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Empty,
            delay: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, values)) => values.push(value.into()),
            None => self.headers.push((name, vec![value.into()])),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = ResponseBody::Text(body.into());
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = ResponseBody::Json(body);
        self
    }

    pub fn with_bytes_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Bytes(body.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Materialize the response without waiting for the delay.
    pub fn to_message(&self) -> ResponseMessage {
        let mut message = ResponseMessage::new(self.status);
        for (name, values) in &self.headers {
            for value in values {
                message.headers.push((name.clone(), value.clone()));
            }
        }
        message.body = match &self.body {
            ResponseBody::Empty => Bytes::new(),
            ResponseBody::Text(text) => Bytes::from(text.clone()),
            ResponseBody::Json(value) => {
                if !self.has_header("content-type") {
                    message
                        .headers
                        .push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Bytes::from(value.to_string())
            }
            ResponseBody::Bytes(bytes) => bytes.clone(),
        };
        message
    }

    /// Wait for the configured delay, then produce the response.
    ///
    /// Dropping the returned future abandons the delay.
    pub async fn execute(&self) -> ResponseMessage {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.to_message()
    }
}

type CallbackFn = dyn Fn(&RequestValue) -> ResponseMessage + Send + Sync;

/// Response computed from the request.
#[derive(Clone)]
pub struct ResponseCallback(Arc<CallbackFn>);

impl ResponseCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&RequestValue) -> ResponseMessage + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn call(&self, request: &RequestValue) -> ResponseMessage {
        (self.0)(request)
    }
}

impl fmt::Debug for ResponseCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseCallback")
    }
}

/// A concrete HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Relayed header values that are not valid UTF-8, written byte for byte.
    pub binary_headers: Vec<(String, Bytes)>,
    pub body: Bytes,
}

impl ResponseMessage {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            binary_headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header from raw bytes, keeping it as text when it is UTF-8.
    pub fn push_header_bytes(&mut self, name: impl Into<String>, value: &[u8]) {
        match std::str::from_utf8(value) {
            Ok(text) => self.headers.push((name.into(), text.to_string())),
            Err(_) => self
                .binary_headers
                .push((name.into(), Bytes::copy_from_slice(value))),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON response with `Content-Type: application/json`.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec_pretty(value) {
            Ok(body) => Self::new(status)
                .with_header("Content-Type", "application/json")
                .with_body(body),
            Err(e) => Self::new(500)
                .with_header("Content-Type", "text/plain")
                .with_body(format!("Failed to serialize response: {e}")),
        }
    }

    /// JSON response carrying a single `Status` message.
    pub fn status_message(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "Status": message }))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Convert into a hyper response, falling back to a bare 500 on invalid parts.
    pub fn into_hyper(self) -> Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = Response::builder().status(status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        for (name, value) in &self.binary_headers {
            builder = builder.header(name.as_str(), &value[..]);
        }
        builder.body(Full::new(self.body)).unwrap_or_else(|_| {
            let mut fallback = Response::new(Full::new(Bytes::from("Invalid response headers")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}
