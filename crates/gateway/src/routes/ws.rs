use std::collections::HashMap;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tracing::debug;
use wag_ws_mirror::MirrorEnvelope;

use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct SubscribeQuery {
    #[serde(rename = "instance_id")]
    pub instance_id: Option<String>,
}

/// `GET /api/ws` — upgrade the caller to a read-only WebSocket that mirrors
/// every frame the gateway's worker connections produce (§4.8). Callers may
/// scope the stream to a single instance via `x-instance-id` or
/// `?instance_id=`; otherwise they see every instance's frames.
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SubscribeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let filter = headers
        .get("x-instance-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.instance_id);

    ws.on_upgrade(move |socket| handle_socket(socket, state, filter))
}

async fn handle_socket(socket: WebSocket, state: AppState, filter: Option<String>) {
    let mut receiver = state.mirror.subscribe();
    let (mut sender, mut client_rx) = socket.split();

    // We don't expect frames from the client; draining the read half keeps
    // the connection's close/ping machinery working.
    let drain = tokio::spawn(async move { while client_rx.next().await.is_some() {} });

    loop {
        let envelope = match receiver.recv().await {
            Ok(envelope) => envelope,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "ws subscriber fell behind the mirror broadcast");
                continue;
            },
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        if !matches_filter(&envelope, filter.as_deref()) {
            continue;
        }

        let Ok(text) = serde_json::to_string(&envelope) else {
            continue;
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }

    drain.abort();
}

fn matches_filter(envelope: &MirrorEnvelope, filter: Option<&str>) -> bool {
    match filter {
        Some(hash) => envelope.instance_hash() == hash,
        None => true,
    }
}
