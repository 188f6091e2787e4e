use std::{sync::Arc, time::Duration};

use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tracing::{info, warn};

use crate::envelope::MirrorEnvelope;

const CONNECT_DELAY: Duration = Duration::from_secs(5);

/// Opens one outbound WebSocket per running worker and re-broadcasts every
/// frame it receives to the gateway's own subscribers. Connections are not
/// retried: a fresh one is opened the next time the supervisor spawns that
/// worker.
pub struct WorkerMirror {
    basic_auth_header: String,
    sender: broadcast::Sender<MirrorEnvelope>,
    tasks: DashMap<String, tokio::task::JoinHandle<()>>,
}

impl WorkerMirror {
    #[must_use]
    pub fn new(basic_auth_header: String) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { basic_auth_header, sender, tasks: DashMap::new() }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEnvelope> {
        self.sender.subscribe()
    }

    /// Publish an envelope that didn't originate from a worker's own
    /// websocket stream, e.g. the supervisor's `process-stopped` event.
    pub fn publish(&self, envelope: MirrorEnvelope) {
        let _ = self.sender.send(envelope);
    }

    /// Spawn the mirror task for a worker that just started. Replaces (and
    /// aborts) any task already tracked for this hash.
    pub fn spawn(self: &Arc<Self>, hash: String, port: u16) {
        let mirror = self.clone();
        let task_hash = hash.clone();
        let handle = tokio::spawn(async move { mirror.run_for(task_hash, port).await });
        if let Some((_, previous)) = self.tasks.remove(&hash) {
            previous.abort();
        }
        self.tasks.insert(hash, handle);
    }

    /// Abort the mirror task for `hash`, if one is tracked. Called when the
    /// supervisor stops that worker.
    pub fn abort(&self, hash: &str) {
        if let Some((_, handle)) = self.tasks.remove(hash) {
            handle.abort();
        }
    }

    /// Wait five seconds, then connect to the worker's `/ws` endpoint and
    /// mirror frames until it closes or errors.
    async fn run_for(&self, hash: String, port: u16) {
        tokio::time::sleep(CONNECT_DELAY).await;

        let url = format!("ws://localhost:{port}/ws");
        let Ok(mut request) = url.as_str().into_client_request() else {
            warn!(instance = %hash, url, "failed to build websocket request");
            return;
        };
        let Ok(header_value) = self.basic_auth_header.parse() else {
            warn!(instance = %hash, "invalid basic auth header value");
            return;
        };
        request.headers_mut().insert("Authorization", header_value);

        let (stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(instance = %hash, port, error = %e, "failed to connect to worker websocket");
                return;
            },
        };

        info!(instance = %hash, port, "connected to worker websocket");
        let _ = self.sender.send(MirrorEnvelope::Connected {
            phone_number: hash.clone(),
            port,
            timestamp: Utc::now().to_rfc3339(),
        });

        // We never send frames upstream, only read; dropping the write half
        // outright (rather than sending a close frame) keeps the connection
        // open for the worker to push frames on.
        let (_write, mut read) = stream.split();

        let mut close_code = 1000u16;
        let mut close_reason = String::new();

        while let Some(message) = read.next().await {
            match message {
                Ok(tungstenite::Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(parsed) => {
                        let _ = self.sender.send(MirrorEnvelope::Message {
                            phone_number: hash.clone(),
                            port,
                            message: parsed,
                            timestamp: Utc::now().to_rfc3339(),
                        });
                    },
                    Err(e) => warn!(instance = %hash, error = %e, "worker sent a non-JSON frame"),
                },
                Ok(tungstenite::Message::Close(frame)) => {
                    if let Some(frame) = frame {
                        close_code = frame.code.into();
                        close_reason = frame.reason.to_string();
                    }
                    break;
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(instance = %hash, port, error = %e, "worker websocket error, dropping connection");
                    break;
                },
            }
        }

        info!(instance = %hash, port, close_code, "worker websocket closed");
        let _ = self.sender.send(MirrorEnvelope::Closed {
            phone_number: hash,
            port,
            code: close_code,
            reason: close_reason,
            timestamp: Utc::now().to_rfc3339(),
        });
    }
}
