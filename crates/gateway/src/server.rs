use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderValue, header},
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::{
    LatencyUnit,
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    sensitive_headers::SetSensitiveHeadersLayer,
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, warn};
use wag_common::Result as GatewayResult;
use wag_config::{GatewaySettings, Paths};
use wag_proxy::ReverseProxy;
use wag_queue::QueueManager;
use wag_store::{PortAllocator, SqliteInstanceStore};
use wag_supervisor::{DEFAULT_STOP_TIMEOUT, SupervisorEvent, WorkerSupervisor};
use wag_webhook::WebhookDispatcher;
use wag_ws_mirror::{MirrorEnvelope, WorkerMirror};

use crate::{cache::InstanceCache, rate_limit::RequestThrottle, routes, state::AppState};

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Build the CORS layer. Every origin is allowed: the gateway sits behind
/// its own auth gate, and the worker it fronts has no notion of browser
/// origins to restrict against.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

/// Apply the full middleware stack to the router.
///
/// Layer order (outermost -> innermost for requests):
/// 1. `CatchPanicLayer` - converts handler panics to 500s
/// 2. `SetSensitiveHeadersLayer` - marks Authorization as redacted
/// 3. `SetRequestIdLayer` - generates x-request-id before tracing
/// 4. `TraceLayer` - logs requests with redacted headers and the request id
/// 5. `CorsLayer` - handles preflight; logged by trace
/// 6. `PropagateRequestIdLayer` - copies x-request-id to the response
/// 7. Security response headers
fn apply_middleware_stack(router: Router, cors: CorsLayer) -> Router {
    router
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("deny"),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-")
                        .to_owned();
                    tracing::info_span!("http_request", method = %request.method(), uri = %request.uri(), request_id = %request_id)
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO).latency_unit(LatencyUnit::Millis)),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION]))
        .layer(CatchPanicLayer::new())
}

async fn open_pool(paths: &Paths) -> GatewayResult<sqlx::SqlitePool> {
    tokio::fs::create_dir_all(&paths.base_dir)
        .await
        .map_err(|e| wag_common::GatewayError::internal(format!("failed to create base dir: {e}")))?;
    let db_path = paths.base_dir.join("gateway.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    SqlitePoolOptions::new()
        .connect(&url)
        .await
        .map_err(|e| wag_common::GatewayError::internal(format!("failed to open gateway database: {e}")))
}

/// Wire every shared service, build the router, and serve until a shutdown
/// signal arrives.
pub async fn serve(bind: &str, paths: Paths, settings: GatewaySettings) -> anyhow::Result<()> {
    let paths = Arc::new(paths);
    let settings = Arc::new(settings);

    let pool = open_pool(&paths).await?;
    SqliteInstanceStore::init(&pool).await?;

    let ports = Arc::new(PortAllocator::new(settings.port_base, settings.port_window));
    let store = Arc::new(SqliteInstanceStore::new(pool, ports));
    store.seed_port_allocator().await?;

    let supervisor = Arc::new(WorkerSupervisor::new(store.clone(), paths.clone(), settings.clone()));
    let queues = Arc::new(QueueManager::new());
    let proxy = Arc::new(ReverseProxy::new(settings.basic_auth_header())?);
    let webhooks = Arc::new(WebhookDispatcher::new(store.clone()));
    let mirror = Arc::new(WorkerMirror::new(settings.basic_auth_header()));
    let throttle = Arc::new(RequestThrottle::new(settings.api_rate_limit, settings.api_rate_limit_window));
    let instance_cache = Arc::new(InstanceCache::new());

    info!("recovering workers from a previous run");
    supervisor.recover().await?;

    let state = AppState {
        store: store.clone(),
        supervisor: supervisor.clone(),
        queues: queues.clone(),
        proxy,
        webhooks,
        mirror: mirror.clone(),
        paths,
        settings: settings.clone(),
        throttle,
        instance_cache,
    };

    spawn_supervisor_event_bridge(supervisor.clone(), mirror);
    tokio::spawn(supervisor.clone().run_health_check_loop(settings.health_check_interval));
    tokio::spawn(queues.clone().run_idle_sweep_loop_with(IDLE_SWEEP_INTERVAL));

    let cors = build_cors_layer();
    let app = apply_middleware_stack(routes::router(state), cors);

    let addr: SocketAddr = format!("{bind}:{}", settings.api_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(supervisor))
        .await?;
    Ok(())
}

/// Forward worker lifecycle events onto the mirror's broadcast channel so
/// WebSocket subscribers see `process-stopped` without the mirror itself
/// needing to poll the supervisor.
fn spawn_supervisor_event_bridge(supervisor: Arc<WorkerSupervisor>, mirror: Arc<WorkerMirror>) {
    let mut events = supervisor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SupervisorEvent::Started { hash, port }) => mirror.spawn(hash, port),
                Ok(SupervisorEvent::ProcessStopped { hash }) => {
                    mirror.abort(&hash);
                    mirror.publish(MirrorEnvelope::ProcessStopped { phone_number: hash, timestamp: chrono::Utc::now().to_rfc3339() });
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal(supervisor: Arc<WorkerSupervisor>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!("shutdown signal received, stopping every worker");
    supervisor.stop_all(DEFAULT_STOP_TIMEOUT).await;
}
