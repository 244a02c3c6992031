//! Mapping synthesis from proxied exchanges.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::headers::is_transport_header;
use crate::config::ProxyAndRecordSettings;
use crate::error::Result;
use crate::mapping::{save_mapping_to_file, Mapping, MappingOrigin, RECORDED_PRIORITY};
use crate::matchers::PatternMatcher;
use crate::matching::{DimensionMatcher, KeyedMatcher, RequestMatcher};
use crate::registry::MappingRegistry;
use crate::request::{BodyData, RequestValue};
use crate::response::{ResponseDefinition, ResponseMessage};
use crate::scenario::ScenarioStore;

/// Build the request matcher reproducing `request`, minus excluded names.
fn observed_request_matcher(settings: &ProxyAndRecordSettings, request: &RequestValue) -> RequestMatcher {
    let mut matcher = RequestMatcher::new()
        .with_methods([request.method.as_str()])
        .with_path(PatternMatcher::exact(request.path.as_str()));

    for (name, values) in request.headers.iter() {
        if is_transport_header(name)
            || name.eq_ignore_ascii_case("cookie")
            || settings.is_excluded_header(name)
        {
            continue;
        }
        matcher = matcher.with_dimension(DimensionMatcher::Header(
            KeyedMatcher::new(name, vec![PatternMatcher::exact_any(values.iter().cloned())])
                .ignoring_case(),
        ));
    }

    for (name, value) in &request.cookies {
        if settings.is_excluded_cookie(name) {
            continue;
        }
        matcher = matcher.with_cookie(name, PatternMatcher::exact(value.as_str()));
    }

    for (name, values) in request.query.iter() {
        if settings.is_excluded_param(name) {
            continue;
        }
        matcher = matcher.with_dimension(DimensionMatcher::Param(KeyedMatcher::new(
            name,
            vec![PatternMatcher::exact_any(values.iter().cloned())],
        )));
    }

    match request.body_data {
        Some(BodyData::Json(ref value)) => matcher.with_body(PatternMatcher::json(value.clone())),
        Some(BodyData::Text(ref text)) => matcher.with_body(PatternMatcher::exact(text.as_str())),
        Some(BodyData::Bytes) => matcher.with_body(PatternMatcher::exact_object(request.body.clone())),
        None => matcher,
    }
}

/// Static response replaying `response`. UTF-8 bodies are kept as text so
/// the replay is byte-identical; anything else is stored as raw bytes.
fn recorded_response(response: &ResponseMessage) -> ResponseDefinition {
    let mut definition = ResponseDefinition::new(response.status);
    for (name, value) in &response.headers {
        definition = definition.with_header(name.as_str(), value.as_str());
    }
    if response.body.is_empty() {
        return definition;
    }
    match std::str::from_utf8(&response.body) {
        Ok(text) => definition.with_body(text),
        Err(_) => definition.with_bytes_body(response.body.clone()),
    }
}

/// Synthesize a mapping that answers `request` with `response` directly.
///
/// With `use_defined_request_matchers` the proxy mapping's own matchers are
/// reused instead of matchers generated from the observed request.
pub fn synthesize_mapping(
    settings: &ProxyAndRecordSettings,
    proxy_mapping: &Mapping,
    request: &RequestValue,
    response: &ResponseMessage,
) -> Result<Mapping> {
    let request_matcher = if settings.use_defined_request_matchers {
        proxy_mapping.request_matcher.clone()
    } else {
        observed_request_matcher(settings, request)
    };

    Mapping::builder()
        .with_title(format!("Proxy Mapping for {} {}", request.method, request.path))
        .with_description(format!("Recorded from {}", settings.url))
        .at_priority(RECORDED_PRIORITY)
        .given(request_matcher)
        .respond_with(recorded_response(response))
        .with_origin(MappingOrigin::Recorded)
        .build()
}

/// Serializes recording so that two identical requests proxied at the same
/// time produce one mapping.
#[derive(Debug, Default)]
pub struct Recorder {
    lock: Mutex<()>,
}

/// Everything the recorder needs from the server for one exchange.
pub struct RecordContext<'a> {
    pub registry: &'a MappingRegistry,
    pub scenarios: &'a ScenarioStore,
    pub settings: &'a ProxyAndRecordSettings,
    pub proxy_mapping: &'a Mapping,
    pub mappings_dir: &'a Path,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the exchange if the settings and filters allow it and no
    /// recorded mapping already answers this request perfectly. Returns the
    /// registered mapping, if one was registered.
    ///
    /// The lock covers the duplicate check and registration only; the mapping
    /// file is written after it is released.
    pub async fn record(
        &self,
        ctx: &RecordContext<'_>,
        request: &RequestValue,
        response: &ResponseMessage,
    ) -> Result<Option<Arc<Mapping>>> {
        let settings = ctx.settings;
        if !settings.records() {
            return Ok(None);
        }
        if !settings.status_code_filter().allows(response.status) {
            debug!(status = response.status, "Status filtered out of recording");
            return Ok(None);
        }
        if !settings.method_filter().allows(&request.method) {
            debug!(method = %request.method, "Method filtered out of recording");
            return Ok(None);
        }

        let (model, stored) = {
            let _guard = self.lock.lock();

            let existing = ctx.registry.resolve_among(request, ctx.scenarios, false, |m| {
                m.origin == MappingOrigin::Recorded
            });
            if let Some(found) = existing.matched.filter(|m| m.result.is_perfect_match()) {
                debug!(guid = %found.mapping.guid, "Request already recorded");
                return Ok(None);
            }

            let mapping = synthesize_mapping(settings, ctx.proxy_mapping, request, response)?;
            let model = settings.save_mapping_to_file.then(|| mapping.to_model());
            let stored = if settings.save_mapping {
                let stored = ctx.registry.register(mapping);
                info!(guid = %stored.guid, method = %request.method, path = %request.path, "Recorded mapping");
                Some(stored)
            } else {
                None
            };
            (model, stored)
        };

        if let Some(model) = model {
            match save_mapping_to_file(ctx.mappings_dir, &model).await {
                Ok(path) => info!(file = %path.display(), "Saved recorded mapping"),
                Err(e) => warn!(error = %e, "Failed to save recorded mapping"),
            }
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ResponseProvider;
    use crate::response::ResponseBody;
    use std::future::Future;
    use tempfile::TempDir;

    fn proxy_mapping(settings: &ProxyAndRecordSettings) -> Mapping {
        Mapping::builder()
            .given(RequestMatcher::new().with_path(PatternMatcher::wildcard("/api/*").unwrap()))
            .respond_with_proxy(settings.clone())
            .build()
            .unwrap()
    }

    fn recording_settings() -> ProxyAndRecordSettings {
        let mut settings = ProxyAndRecordSettings::new("http://upstream");
        settings.save_mapping = true;
        settings
    }

    fn request() -> RequestValue {
        RequestValue::builder("POST", "http://localhost/api/users?page=1&trace=on")
            .header("Authorization", "BASIC xyz")
            .header("X-Internal", "skip")
            .header("Content-Type", "application/json")
            .header("Cookie", "sid=1; tracking=2")
            .body(r#"{"name":"a"}"#)
            .build()
            .unwrap()
    }

    fn json_response() -> ResponseMessage {
        ResponseMessage::new(200)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"p":42}"#)
    }

    fn labels(mapping: &Mapping) -> Vec<String> {
        mapping
            .request_matcher
            .dimensions()
            .iter()
            .map(|d| d.label())
            .collect()
    }

    #[test]
    fn test_synthesized_mapping_excludes_names() {
        let mut settings = recording_settings();
        settings.excluded_headers = vec!["x-internal".to_string()];
        settings.excluded_cookies = vec!["tracking".to_string()];
        settings.excluded_params = vec!["trace".to_string()];

        let mapping =
            synthesize_mapping(&settings, &proxy_mapping(&settings), &request(), &json_response())
                .unwrap();

        let labels = labels(&mapping);
        assert!(labels.contains(&"Header:Authorization".to_string()));
        assert!(!labels.iter().any(|l| l.eq_ignore_ascii_case("Header:X-Internal")));
        assert!(labels.contains(&"Cookie:sid".to_string()));
        assert!(!labels.contains(&"Cookie:tracking".to_string()));
        assert!(labels.contains(&"Param:page".to_string()));
        assert!(!labels.contains(&"Param:trace".to_string()));
        assert!(labels.contains(&"Body".to_string()));
        assert_eq!(mapping.priority, RECORDED_PRIORITY);
        assert_eq!(mapping.origin, MappingOrigin::Recorded);

        let result = mapping.score(&request(), &ScenarioStore::new());
        assert!(result.is_perfect_match(), "{:?}", result.details());
    }

    #[test]
    fn test_recorded_body_kinds() {
        let settings = recording_settings();
        let proxy = proxy_mapping(&settings);

        let text = synthesize_mapping(&settings, &proxy, &request(), &json_response()).unwrap();
        match text.provider {
            ResponseProvider::Static(ref r) => {
                assert_eq!(r.body, ResponseBody::Text(r#"{"p":42}"#.to_string()))
            }
            ref other => panic!("unexpected {other:?}"),
        }

        let binary = ResponseMessage::new(200).with_body(vec![0_u8, 159, 146, 150]);
        let bytes = synthesize_mapping(&settings, &proxy, &request(), &binary).unwrap();
        match bytes.provider {
            ResponseProvider::Static(ref r) => assert!(matches!(r.body, ResponseBody::Bytes(_))),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_binary_request_body_uses_exact_object() {
        let settings = recording_settings();
        let request = RequestValue::builder("PUT", "http://localhost/api/blob")
            .header("Content-Type", "application/octet-stream")
            .body(vec![0_u8, 255, 7])
            .build()
            .unwrap();
        let mapping =
            synthesize_mapping(&settings, &proxy_mapping(&settings), &request, &json_response())
                .unwrap();
        assert!(mapping.score(&request, &ScenarioStore::new()).is_perfect_match());
    }

    #[test]
    fn test_defined_request_matchers_are_reused() {
        let mut settings = recording_settings();
        settings.use_defined_request_matchers = true;
        let mapping =
            synthesize_mapping(&settings, &proxy_mapping(&settings), &request(), &json_response())
                .unwrap();
        assert_eq!(labels(&mapping), vec!["Path".to_string()]);
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let settings = recording_settings();
        let proxy = proxy_mapping(&settings);
        let registry = MappingRegistry::new();
        let scenarios = ScenarioStore::new();
        let dir = TempDir::new().unwrap();
        let ctx = RecordContext {
            registry: &registry,
            scenarios: &scenarios,
            settings: &settings,
            proxy_mapping: &proxy,
            mappings_dir: dir.path(),
        };
        let recorder = Recorder::new();

        assert!(recorder
            .record(&ctx, &request(), &json_response())
            .await
            .unwrap()
            .is_some());
        assert!(recorder
            .record(&ctx, &request(), &json_response())
            .await
            .unwrap()
            .is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_recordings_register_once() {
        let mut settings = recording_settings();
        settings.save_mapping_to_file = true;
        let settings = Arc::new(settings);
        let proxy = Arc::new(proxy_mapping(&settings));
        let registry = Arc::new(MappingRegistry::new());
        let scenarios = Arc::new(ScenarioStore::new());
        let recorder = Arc::new(Recorder::new());
        let dir = Arc::new(TempDir::new().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (settings, proxy, registry, scenarios, recorder, dir) = (
                    Arc::clone(&settings),
                    Arc::clone(&proxy),
                    Arc::clone(&registry),
                    Arc::clone(&scenarios),
                    Arc::clone(&recorder),
                    Arc::clone(&dir),
                );
                tokio::spawn(async move {
                    let ctx = RecordContext {
                        registry: &registry,
                        scenarios: &scenarios,
                        settings: &settings,
                        proxy_mapping: &proxy,
                        mappings_dir: dir.path(),
                    };
                    recorder
                        .record(&ctx, &request(), &json_response())
                        .await
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.len(), 1);
        let saved = crate::mapping::load_mappings_from_dir(dir.path()).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].guid, Some(registry.list()[0].guid));
    }

    #[tokio::test]
    async fn test_lock_is_free_while_mapping_file_is_written() {
        let mut settings = recording_settings();
        settings.save_mapping_to_file = true;
        let proxy = proxy_mapping(&settings);
        let registry = MappingRegistry::new();
        let scenarios = ScenarioStore::new();
        let dir = TempDir::new().unwrap();
        let ctx = RecordContext {
            registry: &registry,
            scenarios: &scenarios,
            settings: &settings,
            proxy_mapping: &proxy,
            mappings_dir: dir.path(),
        };
        let recorder = Recorder::new();

        let request = request();
        let response = json_response();
        let mut recording = Box::pin(recorder.record(&ctx, &request, &response));
        let waker = futures::task::noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        let mut observed_lock_free = false;
        loop {
            match recording.as_mut().poll(&mut cx) {
                std::task::Poll::Ready(result) => {
                    assert!(result.unwrap().is_some());
                    break;
                }
                std::task::Poll::Pending => {
                    observed_lock_free |= recorder.lock.try_lock().is_some();
                    tokio::task::yield_now().await;
                }
            }
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(crate::mapping::load_mappings_from_dir(dir.path()).unwrap().len(), 1);
        assert!(observed_lock_free);
    }

    #[tokio::test]
    async fn test_filters_and_file_only_recording() {
        let dir = TempDir::new().unwrap();
        let registry = MappingRegistry::new();
        let scenarios = ScenarioStore::new();
        let recorder = Recorder::new();

        let mut settings = ProxyAndRecordSettings::new("http://upstream");
        settings.save_mapping = true;
        settings.save_mapping_for_status_code_pattern = "2xx".to_string();
        settings.excluded_methods = vec!["DELETE".to_string()];
        let proxy = proxy_mapping(&settings);
        let ctx = RecordContext {
            registry: &registry,
            scenarios: &scenarios,
            settings: &settings,
            proxy_mapping: &proxy,
            mappings_dir: dir.path(),
        };

        let failed = ResponseMessage::new(503);
        assert!(recorder.record(&ctx, &request(), &failed).await.unwrap().is_none());
        let delete = RequestValue::builder("DELETE", "http://localhost/api/users/1")
            .build()
            .unwrap();
        assert!(recorder
            .record(&ctx, &delete, &json_response())
            .await
            .unwrap()
            .is_none());
        assert!(registry.is_empty());

        let mut file_only = ProxyAndRecordSettings::new("http://upstream");
        file_only.save_mapping_to_file = true;
        let ctx = RecordContext {
            settings: &file_only,
            ..ctx
        };
        assert!(recorder
            .record(&ctx, &request(), &json_response())
            .await
            .unwrap()
            .is_none());
        assert!(registry.is_empty());
        let saved = crate::mapping::load_mappings_from_dir(dir.path()).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].priority, Some(RECORDED_PRIORITY));
    }
}
