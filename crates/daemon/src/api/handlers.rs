/// XML-RPC request handlers

use super::responses::*;
use crate::proxy::Upstream;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use rosproxy_common::{decode_call, decode_response, encode_call};
use rosproxy_core::ProxyEngine;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProxyEngine>,
    pub upstream: Upstream,
    pub master_uri: Arc<str>,
}

/// Handler for POST <master path>
///
/// Rewrites the call, forwards it to the real master and rewrites the answer.
pub async fn master_api(State(state): State<AppState>, uri: Uri, body: String) -> Result<Response, AppError> {
    let call = match decode_call(&body) {
        Ok(call) => call,
        Err(e) => {
            warn!("Got non-XML-RPC request to master API {}: {}", uri.path(), e);
            let reply = state.upstream.post(&state.master_uri, body).await?;
            return Ok(reply.into_response());
        }
    };
    debug!("Master API call: {}", call);

    let rewritten = match state.engine.rewrite_master_request(&call).await {
        Ok(rewritten) => rewritten,
        Err(e) => {
            warn!("Rejecting {}: {}", call.method, e);
            return Ok(XmlRpcReply::from_error(&e).into_response());
        }
    };

    let reply = state.upstream.post(&state.master_uri, encode_call(&rewritten)).await?;
    let response = match decode_response(&reply.body) {
        Ok(response) => response,
        Err(e) => {
            warn!("Master answered {} with non-XML-RPC body: {}", call.method, e);
            return Ok(reply.into_response());
        }
    };

    match state.engine.rewrite_master_response(&rewritten, &response).await {
        Ok(response) => Ok(XmlRpcReply(response).into_response()),
        Err(e) => {
            error!("Failed to rewrite master response to {}: {}", call.method, e);
            Ok(XmlRpcReply::from_error(&e).into_response())
        }
    }
}

/// Handler for POST <node path>/<node id>
///
/// Routes the call to the node's real slave API; calls for unknown nodes get
/// the failure fault.
pub async fn node_api(State(state): State<AppState>, uri: Uri, body: String) -> Result<Response, AppError> {
    let path = uri.path();
    let Some(target) = state.engine.resolve_routing_target(path).await else {
        return Ok(failure(path));
    };

    let call = match decode_call(&body) {
        Ok(call) => call,
        Err(e) => {
            warn!("Got non-XML-RPC request to slave API {}: {}", path, e);
            let reply = state.upstream.post(&target, body).await?;
            return Ok(reply.into_response());
        }
    };
    debug!("Slave API call to {}: {}", path, call);

    let rewritten = match state.engine.rewrite_node_request(path, &call).await {
        Ok(rewritten) => rewritten,
        Err(e) => {
            warn!("Rejecting {} to {}: {}", call.method, path, e);
            return Ok(XmlRpcReply::from_error(&e).into_response());
        }
    };

    let reply = state.upstream.post(&target, encode_call(&rewritten)).await?;
    let response = match decode_response(&reply.body) {
        Ok(response) if !response.is_fault() => response,
        Ok(_) => return Ok(reply.into_response()),
        Err(e) => {
            warn!("Node {} answered with non-XML-RPC body: {}", path, e);
            return Ok(reply.into_response());
        }
    };

    match state.engine.rewrite_node_response(path, &rewritten, &response).await {
        Ok(response) => Ok(XmlRpcReply(response).into_response()),
        Err(e) => {
            error!("{}", e);
            Ok(XmlRpcReply::from_error(&e).into_response())
        }
    }
}

/// Handler for <failure path>
pub async fn failure_route(uri: Uri) -> Response {
    failure(uri.path())
}

fn failure(path: &str) -> Response {
    warn!(
        "Could not resolve {}; node registration info may be stale. Enable automatic housekeeping or increase its frequency.",
        path
    );
    XmlRpcReply::unresolvable(path).into_response()
}

/// Application error type
pub struct AppError {
    message: String,
    status_code: StatusCode,
}

impl AppError {
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API Error: {}", self.message);

        let body = Json(ErrorResponse::new(self.message, self.status_code.as_u16()));

        (self.status_code, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::bad_gateway(format!("{:#}", err))
    }
}
