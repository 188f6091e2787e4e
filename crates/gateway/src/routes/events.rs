use std::collections::HashMap;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value;
use wag_common::{GatewayError, ids};
use wag_webhook::ContainerEvent;

use crate::{error::ApiError, resolver, state::AppState};

/// The wire shape of a container event as the worker process POSTs it.
#[derive(Deserialize)]
pub struct EventBody {
    pub code: String,
    pub message: Option<String>,
    pub result: Option<Value>,
}

/// `POST /api/internal/events` — the worker's side channel for lifecycle
/// events that drive the webhook dispatcher (§4.9). Distinct from the
/// websocket mirror (§4.8), which is a best-effort fan-out and does not
/// itself drive status transitions.
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EventBody>,
) -> Result<impl IntoResponse, ApiError> {
    let raw_hash = resolver::extract_hash(&headers, &HashMap::new(), None)?;
    if !ids::is_valid_instance_hash(&raw_hash) {
        return Err(GatewayError::InvalidInstanceId.into());
    }
    let hash = ids::normalize_instance_hash(&raw_hash);

    state
        .webhooks
        .dispatch(&hash, ContainerEvent { code: body.code, message: body.message, result: body.result })
        .await;
    state.instance_cache.invalidate(&hash);

    Ok(Json(serde_json::json!({ "success": true })))
}
