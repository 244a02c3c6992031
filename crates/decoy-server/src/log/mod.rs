//! Bounded in-memory request log.
//!
//! Append-mostly: every handled request adds one entry. The log keeps at
//! most `capacity` entries (oldest evicted first) and drops entries older
//! than the configured expiration.

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::matching::{MatchResultSummary, RequestMatchResult};
use crate::registry::Resolution;
use crate::request::{header_text, MultiMap, RequestValue};
use crate::response::ResponseMessage;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggedRequest {
    pub method: String,
    pub url: String,
    pub path: String,
    #[serde(rename = "ClientIP", skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    pub headers: MultiMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_as_bytes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggedResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_as_bytes: Option<String>,
}

/// Text if the body is UTF-8, base64 otherwise.
fn split_body(body: &Bytes) -> (Option<String>, Option<String>) {
    if body.is_empty() {
        return (None, None);
    }
    match std::str::from_utf8(body) {
        Ok(text) => (Some(text.to_string()), None),
        Err(_) => (
            None,
            Some(base64::engine::general_purpose::STANDARD.encode(body)),
        ),
    }
}

impl From<&RequestValue> for LoggedRequest {
    fn from(request: &RequestValue) -> Self {
        let (body, body_as_bytes) = split_body(&request.body);
        Self {
            method: request.method.clone(),
            url: request.url.to_string(),
            path: request.path.clone(),
            client_ip: request.client_ip.map(|ip| ip.to_string()),
            headers: request.headers.clone(),
            body,
            body_as_bytes,
            timestamp: request.timestamp,
        }
    }
}

impl From<&ResponseMessage> for LoggedResponse {
    fn from(response: &ResponseMessage) -> Self {
        let (body, body_as_bytes) = split_body(&response.body);
        Self {
            status_code: response.status,
            headers: response
                .headers
                .iter()
                .cloned()
                .chain(
                    response
                        .binary_headers
                        .iter()
                        .map(|(name, value)| (name.clone(), header_text(value))),
                )
                .collect(),
            body,
            body_as_bytes,
        }
    }
}

/// One handled request, immutable once appended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEntry {
    pub guid: Uuid,
    pub request: LoggedRequest,
    pub response: LoggedResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_guid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_match_result: Option<MatchResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_mapping_guid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_match_result: Option<MatchResultSummary>,
}

impl LogEntry {
    pub fn new(request: &RequestValue, response: &ResponseMessage, resolution: &Resolution) -> Self {
        let summary = |result: &RequestMatchResult| MatchResultSummary::from(result);
        Self {
            guid: Uuid::new_v4(),
            request: LoggedRequest::from(request),
            response: LoggedResponse::from(response),
            mapping_guid: resolution.matched.as_ref().map(|m| m.mapping.guid),
            mapping_title: resolution
                .matched
                .as_ref()
                .and_then(|m| m.mapping.title.clone()),
            request_match_result: resolution.matched.as_ref().map(|m| summary(&m.result)),
            partial_mapping_guid: resolution.partial.as_ref().map(|p| p.mapping.guid),
            partial_match_result: resolution.partial.as_ref().map(|p| summary(&p.result)),
        }
    }
}

/// Concurrent request log with oldest-first eviction.
#[derive(Debug)]
pub struct RequestLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: Option<usize>,
    max_age: Option<Duration>,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl RequestLog {
    pub fn new(capacity: Option<usize>, max_age: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            max_age,
        }
    }

    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        if let Some(capacity) = self.capacity {
            while entries.len() > capacity {
                entries.pop_front();
            }
        }
        self.expire(&mut entries);
    }

    fn expire(&self, entries: &mut VecDeque<LogEntry>) {
        let Some(max_age) = self.max_age else {
            return;
        };
        // An age reaching past the representable range never expires anything.
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return;
        };
        while entries
            .front()
            .is_some_and(|e| e.request.timestamp < cutoff)
        {
            entries.pop_front();
        }
    }

    /// Entries oldest first, after dropping expired ones.
    pub fn entries(&self) -> Vec<LogEntry> {
        let mut entries = self.entries.lock();
        self.expire(&mut entries);
        entries.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(path: &str) -> LogEntry {
        let request = RequestValue::builder("GET", &format!("http://localhost{path}"))
            .build()
            .unwrap();
        LogEntry::new(&request, &ResponseMessage::new(200), &Resolution::default())
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = RequestLog::new(Some(2), None);
        log.append(entry("/1"));
        log.append(entry("/2"));
        log.append(entry("/3"));

        let paths: Vec<_> = log.entries().into_iter().map(|e| e.request.path).collect();
        assert_eq!(paths, vec!["/2", "/3"]);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let log = RequestLog::new(None, Some(Duration::hours(1)));
        let mut old = entry("/old");
        old.request.timestamp = Utc::now() - Duration::hours(2);
        log.append(old);
        log.append(entry("/new"));

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request.path, "/new");
    }

    #[test]
    fn test_huge_expiration_keeps_entries() {
        let log = RequestLog::new(None, Some(Duration::hours(3_000_000_000)));
        log.append(entry("/1"));
        log.append(entry("/2"));
        assert_eq!(log.entries().len(), 2);

        let log = RequestLog::new(Some(1), Some(Duration::MAX));
        log.append(entry("/1"));
        log.append(entry("/2"));
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request.path, "/2");
    }

    #[test]
    fn test_serialized_entry_shape() {
        let request = RequestValue::builder("POST", "http://localhost/x")
            .body(vec![0_u8, 255])
            .build()
            .unwrap();
        let entry = LogEntry::new(
            &request,
            &ResponseMessage::new(404).with_body("nope"),
            &Resolution::default(),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["Request"]["Method"], "POST");
        assert_eq!(value["Request"]["BodyAsBytes"], "AP8=");
        assert_eq!(value["Response"]["StatusCode"], 404);
        assert_eq!(value["Response"]["Body"], "nope");
        assert!(value.get("MappingGuid").is_none());
    }

    #[test]
    fn test_concurrent_appends() {
        let log = Arc::new(RequestLog::new(Some(100), None));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        log.append(entry(&format!("/{i}/{j}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 100);
        log.clear();
        assert!(log.is_empty());
    }
}
