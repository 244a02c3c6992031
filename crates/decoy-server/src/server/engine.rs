//! MockEngine - the shared state of one server and the request control flow.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admin::register_admin_mappings;
use crate::config::ServerSettings;
use crate::error::{DecoyError, Result};
use crate::log::{LogEntry, RequestLog};
use crate::mapping::{
    load_mappings_from_dir, Mapping, MappingModel, MappingOrigin, ResponseProvider,
    PROXY_PRIORITY,
};
use crate::matching::RequestMatcher;
use crate::proxy::{ProxyPipeline, RecordContext};
use crate::registry::{MappingRegistry, Resolution};
use crate::request::RequestValue;
use crate::response::ResponseMessage;
use crate::scenario::{ScenarioState, ScenarioStore};

/// Registry, scenario store, request log and proxy pipeline of one server.
#[derive(Debug)]
pub struct MockEngine {
    settings: ServerSettings,
    registry: MappingRegistry,
    scenarios: ScenarioStore,
    log: RequestLog,
    proxy: ProxyPipeline,
}

impl MockEngine {
    /// Build an engine and install the administrative mappings, the proxy
    /// catch-all and the static mapping files the settings ask for.
    pub fn new(settings: ServerSettings) -> Result<Arc<Self>> {
        let log = RequestLog::new(
            settings.max_request_log_count,
            settings.request_log_expiration(),
        );
        let engine = Arc::new(Self {
            settings,
            registry: MappingRegistry::new(),
            scenarios: ScenarioStore::new(),
            log,
            proxy: ProxyPipeline::new(),
        });

        if engine.settings.start_admin_interface {
            register_admin_mappings(&engine)?;
        }
        if let Some(ref proxy) = engine.settings.proxy_and_record_settings {
            let catch_all = Mapping::builder()
                .with_title("Proxy catch-all")
                .with_description(format!("Forwards unmatched requests to {}", proxy.url))
                .at_priority(PROXY_PRIORITY)
                .given(RequestMatcher::new())
                .respond_with_proxy(proxy.clone())
                .with_origin(MappingOrigin::Proxy)
                .build()?;
            engine.register(catch_all);
        }
        if engine.settings.read_static_mappings {
            engine.load_static_mappings()?;
        }
        Ok(engine)
    }

    fn load_static_mappings(&self) -> Result<usize> {
        let dir = &self.settings.mappings_directory;
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Mappings directory does not exist; no static mappings loaded");
            return Ok(0);
        }
        let models = load_mappings_from_dir(dir)?;
        Ok(self.register_models(models)?.len())
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    pub fn scenarios(&self) -> &ScenarioStore {
        &self.scenarios
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.log
    }

    /// Select the mapping that answers `request`.
    pub fn resolve(&self, request: &RequestValue) -> Resolution {
        self.registry
            .resolve(request, &self.scenarios, self.settings.allow_partial_mapping)
    }

    /// Produce the response of `mapping` for `request`. Proxy failures
    /// become a synthetic 500; recording happens only after the upstream
    /// response has been fully read.
    pub async fn execute_response(&self, mapping: &Mapping, request: &RequestValue) -> ResponseMessage {
        match mapping.provider {
            ResponseProvider::Static(ref definition) => definition.execute().await,
            ResponseProvider::Callback(ref callback) => callback.call(request),
            ResponseProvider::Proxy(ref settings) => {
                match self.proxy.forward(settings, request).await {
                    Ok(response) => {
                        let ctx = RecordContext {
                            registry: &self.registry,
                            scenarios: &self.scenarios,
                            settings,
                            proxy_mapping: mapping,
                            mappings_dir: &self.settings.mappings_directory,
                        };
                        self.proxy.record(&ctx, request, &response).await;
                        response
                    }
                    Err(failure) => failure,
                }
            }
        }
    }

    /// Apply the scenario transition of an executed mapping.
    pub fn advance_scenario(&self, mapping: &Mapping) -> Option<ScenarioState> {
        mapping
            .scenario_step()
            .map(|step| self.scenarios.advance(&step))
    }

    pub fn register(&self, mapping: Mapping) -> Arc<Mapping> {
        self.registry.register(mapping)
    }

    /// Compile every model first; register only if all of them are valid.
    pub fn register_models(&self, models: Vec<MappingModel>) -> Result<Vec<Arc<Mapping>>> {
        let mappings = models
            .into_iter()
            .map(Mapping::from_model)
            .collect::<Result<Vec<_>>>()?;
        Ok(mappings.into_iter().map(|m| self.register(m)).collect())
    }

    /// Remove a user mapping. Administrative mappings cannot be removed.
    pub fn unregister(&self, guid: Uuid) -> Result<Arc<Mapping>> {
        match self.registry.get(guid) {
            Some(mapping) if !mapping.is_admin() => self.registry.unregister(guid),
            _ => Err(DecoyError::MappingNotFound(guid)),
        }
    }

    pub fn get_mapping(&self, guid: Uuid) -> Option<Arc<Mapping>> {
        self.registry.get(guid).filter(|m| !m.is_admin())
    }

    /// Every mapping except the administrative ones, in registration order.
    pub fn list_mappings(&self) -> Vec<Arc<Mapping>> {
        self.registry
            .list()
            .into_iter()
            .filter(|m| !m.is_admin())
            .collect()
    }

    /// Remove non-permanent mappings only.
    pub fn delete_mappings(&self) -> usize {
        self.registry.reset()
    }

    /// Remove non-permanent mappings, scenario states and logged requests.
    pub fn reset(&self) {
        let removed = self.registry.reset();
        self.scenarios.reset();
        self.log.clear();
        info!(removed, "Server reset");
    }

    pub fn get_scenario_state(&self, name: &str) -> Option<ScenarioState> {
        self.scenarios.get(name)
    }

    pub fn list_scenarios(&self) -> Vec<ScenarioState> {
        self.scenarios.list()
    }

    fn not_found(&self, resolution: &Resolution) -> ResponseMessage {
        let mut body = serde_json::json!({ "Status": "No matching mapping found" });
        if let Some(ref partial) = resolution.partial {
            body["PartialMapping"] = serde_json::json!({
                "Guid": partial.mapping.guid,
                "Title": partial.mapping.title,
                "Score": partial.result.average_score(),
            });
        }
        ResponseMessage::json(404, &body)
    }

    /// Resolve, execute, advance the scenario and log. Requests answered by
    /// administrative mappings are not logged.
    pub async fn handle(&self, request: RequestValue) -> ResponseMessage {
        let resolution = self.resolve(&request);

        let (response, is_admin) = match resolution.matched {
            Some(ref matched) => {
                let response = self.execute_response(&matched.mapping, &request).await;
                if let Some(state) = self.advance_scenario(&matched.mapping) {
                    debug!(scenario = %state.name, state = ?state.next_state, counter = state.counter, "Scenario advanced");
                }
                (response, matched.mapping.is_admin())
            }
            None => {
                debug!(method = %request.method, url = %request.url, "No matching mapping");
                (self.not_found(&resolution), false)
            }
        };

        if !is_admin {
            self.log.append(LogEntry::new(&request, &response, &resolution));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::PatternMatcher;
    use crate::response::ResponseDefinition;

    fn settings() -> ServerSettings {
        ServerSettings {
            start_admin_interface: false,
            ..ServerSettings::default()
        }
    }

    fn get(path: &str) -> RequestValue {
        RequestValue::builder("GET", &format!("http://localhost{path}"))
            .build()
            .unwrap()
    }

    fn scenario_mapping(when: Option<&str>, set: Option<&str>, body: &str) -> Mapping {
        let mut builder = Mapping::builder()
            .given(RequestMatcher::new().with_path(PatternMatcher::exact("/s")))
            .in_scenario("s1")
            .respond_with(ResponseDefinition::new(200).with_body(body));
        if let Some(when) = when {
            builder = builder.when_state_is(when);
        }
        if let Some(set) = set {
            builder = builder.will_set_state_to(set);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_scenario_sequence_is_terminal() {
        let engine = MockEngine::new(settings()).unwrap();
        engine.register(scenario_mapping(None, Some("started"), "A"));
        engine.register(scenario_mapping(Some("started"), None, "B"));

        let bodies = [
            engine.handle(get("/s")).await,
            engine.handle(get("/s")).await,
            engine.handle(get("/s")).await,
        ];
        let bodies: Vec<_> = bodies.iter().map(|r| r.body_text().unwrap().to_string()).collect();
        assert_eq!(bodies, vec!["A", "B", "B"]);

        let state = engine.get_scenario_state("s1").unwrap();
        assert!(state.finished);
        assert_eq!(state.counter, 3);
        assert_eq!(engine.list_scenarios().len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_with_partial_mapping() {
        let engine = MockEngine::new(ServerSettings {
            allow_partial_mapping: true,
            ..settings()
        })
        .unwrap();
        let mapping = engine.register(
            Mapping::builder()
                .with_title("users")
                .given(
                    RequestMatcher::new()
                        .with_methods(["GET"])
                        .with_path(PatternMatcher::exact("/users")),
                )
                .build()
                .unwrap(),
        );

        let response = engine.handle(get("/nobody")).await;
        assert_eq!(response.status, 404);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["Status"], "No matching mapping found");
        assert_eq!(body["PartialMapping"]["Guid"], mapping.guid.to_string());
        assert_eq!(body["PartialMapping"]["Title"], "users");
    }

    #[tokio::test]
    async fn test_requests_are_logged_with_mapping() {
        let engine = MockEngine::new(settings()).unwrap();
        let mapping = engine.register(
            Mapping::builder()
                .given(RequestMatcher::new().with_path(PatternMatcher::exact("/ok")))
                .build()
                .unwrap(),
        );
        engine.handle(get("/ok")).await;
        engine.handle(get("/missing")).await;

        let entries = engine.request_log().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mapping_guid, Some(mapping.guid));
        assert!(entries[1].mapping_guid.is_none());
        assert_eq!(entries[1].response.status_code, 404);
    }

    #[tokio::test]
    async fn test_callback_response() {
        let engine = MockEngine::new(settings()).unwrap();
        engine.register(
            Mapping::builder()
                .given(RequestMatcher::new().with_path(PatternMatcher::wildcard("/echo/*").unwrap()))
                .respond_with_callback(|request| {
                    ResponseMessage::new(200).with_body(request.path_segments.join(","))
                })
                .build()
                .unwrap(),
        );
        let response = engine.handle(get("/echo/a/b")).await;
        assert_eq!(response.body_text(), Some("echo,a,b"));
    }

    #[tokio::test]
    async fn test_proxy_catch_all_is_permanent_and_loses_to_mappings() {
        let mut settings = settings();
        settings.proxy_and_record_settings =
            Some(crate::config::ProxyAndRecordSettings::new("http://127.0.0.1:1"));
        let engine = MockEngine::new(settings).unwrap();
        engine.register(
            Mapping::builder()
                .given(RequestMatcher::new().with_path(PatternMatcher::exact("/local")))
                .respond_with(ResponseDefinition::new(200).with_body("local"))
                .build()
                .unwrap(),
        );

        assert_eq!(engine.handle(get("/local")).await.body_text(), Some("local"));
        let failed = engine.handle(get("/remote")).await;
        assert_eq!(failed.status, 500);
        assert_eq!(failed.header(crate::proxy::X_DECOY_PROXY_ERROR), Some("true"));

        engine.reset();
        let remaining = engine.list_mappings();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_proxy());
    }

    #[tokio::test]
    async fn test_default_request_log_is_bounded() {
        let engine = MockEngine::new(settings()).unwrap();
        for i in 0..1005 {
            engine.handle(get(&format!("/r/{i}"))).await;
        }

        let entries = engine.request_log().entries();
        assert_eq!(entries.len(), 1000);
        assert_eq!(entries[0].request.path, "/r/5");
        assert_eq!(entries[999].request.path, "/r/1004");
    }

    #[tokio::test]
    async fn test_huge_log_expiration_keeps_serving() {
        let engine = MockEngine::new(ServerSettings {
            request_log_expiration_duration: Some(3_000_000_000),
            ..settings()
        })
        .unwrap();
        engine.register(
            Mapping::builder()
                .given(RequestMatcher::new().with_path(PatternMatcher::exact("/ok")))
                .build()
                .unwrap(),
        );

        for _ in 0..3 {
            assert_eq!(engine.handle(get("/ok")).await.status, 200);
        }
        assert_eq!(engine.request_log().entries().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_request_leaves_no_trace() {
        let engine = MockEngine::new(settings()).unwrap();
        engine.register(
            Mapping::builder()
                .given(RequestMatcher::new().with_path(PatternMatcher::exact("/s")))
                .in_scenario("slow")
                .will_set_state_to("done")
                .respond_with(
                    ResponseDefinition::new(200).with_delay(std::time::Duration::from_secs(5)),
                )
                .build()
                .unwrap(),
        );

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            engine.handle(get("/s")),
        )
        .await;
        assert!(outcome.is_err());
        assert!(engine.get_scenario_state("slow").is_none());
        assert!(engine.request_log().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_proxy_request_records_nothing() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&upstream)
            .await;

        let mut proxy = crate::config::ProxyAndRecordSettings::new(upstream.uri());
        proxy.save_mapping = true;
        let engine = MockEngine::new(ServerSettings {
            proxy_and_record_settings: Some(proxy),
            ..settings()
        })
        .unwrap();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            engine.handle(get("/slow")),
        )
        .await;
        assert!(outcome.is_err());
        assert!(engine
            .list_mappings()
            .iter()
            .all(|m| m.origin != MappingOrigin::Recorded));
        assert!(engine.request_log().is_empty());
    }

    #[test]
    fn test_register_models_is_all_or_nothing() {
        let engine = MockEngine::new(settings()).unwrap();
        let models = crate::mapping::parse_mapping_models(
            r#"[{"Request": {"Path": "/a"}}, {"Request": {"Methods": ["GET"], "Path": {"Matchers": [{"Name": "Nope"}]}}}]"#,
        )
        .unwrap();
        assert!(engine.register_models(models).is_err());
        assert!(engine.list_mappings().is_empty());
    }

    #[test]
    fn test_static_mappings_loaded_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            r#"{"Title": "static", "Request": {"Path": "/static"}}"#,
        )
        .unwrap();
        let engine = MockEngine::new(ServerSettings {
            read_static_mappings: true,
            mappings_directory: dir.path().to_path_buf(),
            ..settings()
        })
        .unwrap();
        let mappings = engine.list_mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].title.as_deref(), Some("static"));
    }
}
