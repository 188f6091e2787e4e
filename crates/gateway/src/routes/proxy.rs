use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use wag_common::GatewayError;
use wag_proxy::{ProxiedResponse, intercept_qr_login};
use wag_queue::{Job, QueueResponse};

use crate::{
    error::ApiError,
    resolver::{self, ActiveSet},
    state::AppState,
};

const LOGIN_SUFFIX: &str = "app/login";

/// Catch-all reverse proxy for every endpoint not explicitly routed: the
/// `{app|send|user|message|chat|chats|group|newsletter}/...` family (§6).
///
/// Resolves the instance, validates it is active, forwards the request body
/// verbatim to the worker (through the send queue when the path is under
/// `send/`), then applies the QR login interceptor when the path is the
/// login endpoint.
pub async fn catch_all(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let path = uri.path();
    let suffix = path.strip_prefix("/api/").unwrap_or(path).trim_start_matches('/').to_string();
    let query_string = uri.query().map(str::to_string);

    let query_map: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let body_json: Option<Value> = serde_json::from_slice(&body).ok();

    let raw_hash = resolver::extract_hash(&headers, &query_map, body_json.as_ref())?;
    let instance = resolver::resolve(&state, &raw_hash).await?;

    let active_set = if suffix == LOGIN_SUFFIX { ActiveSet::Login } else { ActiveSet::Api };
    resolver::ensure_active(&instance, active_set)?;

    let port = instance.port.ok_or(GatewayError::ContainerUnreachable)?;
    let body_bytes = body.to_vec();

    let proxied = if suffix.starts_with("send/") {
        let proxy = state.proxy.clone();
        let method = method.clone();
        let forward_suffix = suffix.clone();
        let job: Job = Box::pin(async move {
            let resp = proxy.forward(method, port, &forward_suffix, query_string.as_deref(), body_bytes).await?;
            Ok(QueueResponse { status: resp.status, body: resp.body })
        });
        let resp = state.queues.add(&instance.hash, job, 5).await?;
        ProxiedResponse { status: resp.status, body: resp.body }
    } else {
        state.proxy.forward(method, port, &suffix, query_string.as_deref(), body_bytes).await?
    };

    let final_response = if suffix == LOGIN_SUFFIX {
        intercept_qr_login(&state.paths, &instance.hash, proxied).await
    } else {
        proxied
    };

    let status = StatusCode::from_u16(final_response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, [(header::CONTENT_TYPE, "application/json")], final_response.body).into_response())
}
