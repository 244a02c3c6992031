//! Administrative interface under `/__admin`.
//!
//! Every endpoint is an ordinary mapping with a callback response at
//! [`ADMIN_PRIORITY`], so it takes part in normal resolution and always
//! outranks the proxy catch-all. Callbacks hold a weak reference to the
//! engine to avoid a reference cycle through the registry.

use serde_json::json;
use std::sync::{Arc, Weak};
use tracing::info;
use uuid::Uuid;

use crate::error::{DecoyError, Result};
use crate::mapping::{
    parse_mapping_models, Mapping, MappingModel, MappingOrigin, ADMIN_PRIORITY,
};
use crate::matchers::PatternMatcher;
use crate::matching::RequestMatcher;
use crate::request::RequestValue;
use crate::response::ResponseMessage;
use crate::server::MockEngine;

pub const ADMIN_PREFIX: &str = "/__admin";

const GUID_PATH: &str = r"^/__admin/mappings/[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

type Handler = fn(&MockEngine, &RequestValue) -> ResponseMessage;

fn admin_mapping(
    engine: &Weak<MockEngine>,
    title: &str,
    method: &str,
    path: PatternMatcher,
    handler: Handler,
) -> Result<Mapping> {
    let engine = Weak::clone(engine);
    Mapping::builder()
        .with_title(title)
        .at_priority(ADMIN_PRIORITY)
        .given(RequestMatcher::new().with_methods([method]).with_path(path))
        .respond_with_callback(move |request| match engine.upgrade() {
            Some(engine) => handler(&engine, request),
            None => ResponseMessage::status_message(503, "Server is shutting down"),
        })
        .with_origin(MappingOrigin::Admin)
        .build()
}

/// Register the administrative mappings on `engine`.
pub fn register_admin_mappings(engine: &Arc<MockEngine>) -> Result<()> {
    let weak = Arc::downgrade(engine);
    let mappings_path = || PatternMatcher::exact("/__admin/mappings");
    let guid_path = || PatternMatcher::regex(GUID_PATH);

    let mappings = vec![
        admin_mapping(&weak, "admin: list mappings", "GET", mappings_path(), list_mappings)?,
        admin_mapping(&weak, "admin: add mappings", "POST", mappings_path(), add_mappings)?,
        admin_mapping(&weak, "admin: delete mappings", "DELETE", mappings_path(), delete_mappings)?,
        admin_mapping(&weak, "admin: get mapping", "GET", guid_path()?, get_mapping)?,
        admin_mapping(&weak, "admin: put mapping", "PUT", guid_path()?, put_mapping)?,
        admin_mapping(&weak, "admin: delete mapping", "DELETE", guid_path()?, delete_mapping)?,
        admin_mapping(
            &weak,
            "admin: reset",
            "POST",
            PatternMatcher::exact("/__admin/mappings/reset"),
            reset,
        )?,
        admin_mapping(
            &weak,
            "admin: list scenarios",
            "GET",
            PatternMatcher::exact("/__admin/scenarios"),
            list_scenarios,
        )?,
        admin_mapping(
            &weak,
            "admin: list requests",
            "GET",
            PatternMatcher::exact("/__admin/requests"),
            list_requests,
        )?,
        admin_mapping(
            &weak,
            "admin: delete requests",
            "DELETE",
            PatternMatcher::exact("/__admin/requests"),
            delete_requests,
        )?,
        admin_mapping(
            &weak,
            "admin: settings",
            "GET",
            PatternMatcher::exact("/__admin/settings"),
            settings,
        )?,
    ];

    let count = mappings.len();
    for mapping in mappings {
        engine.register(mapping);
    }
    info!(count, "Administrative interface enabled at {}", ADMIN_PREFIX);
    Ok(())
}

fn guid_from_path(request: &RequestValue) -> Option<Uuid> {
    request
        .path_segments
        .last()
        .and_then(|segment| Uuid::parse_str(segment).ok())
}

fn bad_request(error: &DecoyError) -> ResponseMessage {
    ResponseMessage::status_message(400, &error.to_string())
}

fn mapping_not_found(guid: Uuid) -> ResponseMessage {
    ResponseMessage::status_message(404, &format!("Mapping {guid} not found"))
}

fn list_mappings(engine: &MockEngine, _request: &RequestValue) -> ResponseMessage {
    let models: Vec<MappingModel> = engine
        .list_mappings()
        .iter()
        .map(|m| m.to_model())
        .collect();
    ResponseMessage::json(200, &models)
}

fn add_mappings(engine: &MockEngine, request: &RequestValue) -> ResponseMessage {
    let text = request.body_text().unwrap_or_default();
    let models = match parse_mapping_models(text) {
        Ok(models) => models,
        Err(e) => return bad_request(&e),
    };
    match engine.register_models(models) {
        Ok(registered) => {
            let guids: Vec<Uuid> = registered.iter().map(|m| m.guid).collect();
            match guids.as_slice() {
                [guid] => ResponseMessage::json(201, &json!({"Status": "Mapping added", "Guid": guid})),
                _ => ResponseMessage::json(201, &json!({"Status": "Mappings added", "Guids": guids})),
            }
        }
        Err(e) => bad_request(&e),
    }
}

fn delete_mappings(engine: &MockEngine, _request: &RequestValue) -> ResponseMessage {
    let removed = engine.delete_mappings();
    ResponseMessage::json(200, &json!({"Status": "Mappings deleted", "Count": removed}))
}

fn get_mapping(engine: &MockEngine, request: &RequestValue) -> ResponseMessage {
    let Some(guid) = guid_from_path(request) else {
        return ResponseMessage::status_message(400, "Invalid mapping guid");
    };
    match engine.get_mapping(guid) {
        Some(mapping) => ResponseMessage::json(200, &mapping.to_model()),
        None => mapping_not_found(guid),
    }
}

fn put_mapping(engine: &MockEngine, request: &RequestValue) -> ResponseMessage {
    let Some(guid) = guid_from_path(request) else {
        return ResponseMessage::status_message(400, "Invalid mapping guid");
    };
    let text = request.body_text().unwrap_or_default();
    let mut model: MappingModel = match serde_json::from_str(text) {
        Ok(model) => model,
        Err(e) => return bad_request(&DecoyError::from(e)),
    };
    model.guid = Some(guid);
    match engine.register_models(vec![model]) {
        Ok(_) => ResponseMessage::json(200, &json!({"Status": "Mapping added or updated", "Guid": guid})),
        Err(e) => bad_request(&e),
    }
}

fn delete_mapping(engine: &MockEngine, request: &RequestValue) -> ResponseMessage {
    let Some(guid) = guid_from_path(request) else {
        return ResponseMessage::status_message(400, "Invalid mapping guid");
    };
    match engine.unregister(guid) {
        Ok(_) => ResponseMessage::json(200, &json!({"Status": "Mapping removed", "Guid": guid})),
        Err(DecoyError::MappingNotFound(_)) => mapping_not_found(guid),
        Err(e) => bad_request(&e),
    }
}

fn reset(engine: &MockEngine, _request: &RequestValue) -> ResponseMessage {
    engine.reset();
    ResponseMessage::status_message(200, "Mappings reset")
}

fn list_scenarios(engine: &MockEngine, _request: &RequestValue) -> ResponseMessage {
    ResponseMessage::json(200, &engine.list_scenarios())
}

fn list_requests(engine: &MockEngine, _request: &RequestValue) -> ResponseMessage {
    ResponseMessage::json(200, &engine.request_log().entries())
}

fn delete_requests(engine: &MockEngine, _request: &RequestValue) -> ResponseMessage {
    engine.request_log().clear();
    ResponseMessage::status_message(200, "Requests deleted")
}

fn settings(engine: &MockEngine, _request: &RequestValue) -> ResponseMessage {
    ResponseMessage::json(200, engine.settings())
}
