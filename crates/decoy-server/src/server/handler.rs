//! hyper service function.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use super::engine::MockEngine;
use crate::request::RequestValue;
use crate::response::ResponseMessage;

/// Decode one inbound request and answer it. Never returns an error to hyper.
pub async fn handle_request(
    req: Request<Incoming>,
    engine: Arc<MockEngine>,
    client_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(client = %client_addr, error = %e, "Failed to read request body");
            return Ok(ResponseMessage::status_message(400, "Failed to read request body").into_hyper());
        }
    };

    let request = match RequestValue::from_parts(&parts, body, client_addr) {
        Ok(request) => request,
        Err(e) => {
            warn!(client = %client_addr, error = %e, "Rejected request");
            return Ok(ResponseMessage::status_message(400, &e.to_string()).into_hyper());
        }
    };

    Ok(engine.handle(request).await.into_hyper())
}
