use std::sync::Arc;

use wag_config::{GatewaySettings, Paths};
use wag_proxy::ReverseProxy;
use wag_queue::QueueManager;
use wag_store::SqliteInstanceStore;
use wag_supervisor::WorkerSupervisor;
use wag_webhook::WebhookDispatcher;
use wag_ws_mirror::WorkerMirror;

use crate::{cache::InstanceCache, rate_limit::RequestThrottle};

/// Every shared service the public HTTP surface needs, constructed once at
/// startup and threaded through the router as axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteInstanceStore>,
    pub supervisor: Arc<WorkerSupervisor>,
    pub queues: Arc<QueueManager>,
    pub proxy: Arc<ReverseProxy>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub mirror: Arc<WorkerMirror>,
    pub paths: Arc<Paths>,
    pub settings: Arc<GatewaySettings>,
    pub throttle: Arc<RequestThrottle>,
    pub instance_cache: Arc<InstanceCache>,
}
