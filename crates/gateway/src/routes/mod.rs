pub mod devices;
pub mod events;
pub mod proxy;
pub mod ws;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{auth::auth_gate, rate_limit::throttle_gate, state::AppState};

/// Builds the full `/api` surface: an unauthenticated health probe, the
/// device-management CRUD/lifecycle endpoints, the internal event receiver,
/// the client WebSocket subscription endpoint, and the reverse-proxy
/// catch-all fallback — all behind the throttle and (except `/health`) the
/// auth gate.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/devices", get(devices::list_devices).post(devices::create_device).put(devices::update_device).delete(devices::delete_device))
        .route("/devices/info", get(devices::device_info))
        .route("/devices/start", post(devices::start_device))
        .route("/devices/stop", post(devices::stop_device))
        .route("/devices/restart", post(devices::restart_device))
        .route("/internal/events", post(events::receive_event))
        .route("/ws", get(ws::upgrade))
        .fallback(proxy::catch_all)
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_gate));

    let public = Router::new().route("/health", get(devices::health));

    let api = public.merge(protected);

    Router::new()
        .nest("/api", api)
        .layer(axum::middleware::from_fn_with_state(state.clone(), throttle_gate))
        .with_state(state)
}
