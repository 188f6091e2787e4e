use std::{collections::HashMap, time::Duration};

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use wag_common::{GatewayError, InstanceStatus};
use wag_store::{InstanceUpdate, ListFilter, RegisterInput};

use crate::{error::ApiError, resolver, state::AppState};

const MAX_LIST_LIMIT: u32 = 100;
const DEFAULT_LIST_LIMIT: u32 = 20;

#[derive(Deserialize)]
pub struct CreateDeviceBody {
    #[serde(alias = "phoneNumber")]
    pub phone_number: String,
    pub name: Option<String>,
    #[serde(alias = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(alias = "webhookSecret")]
    pub webhook_secret: Option<String>,
    #[serde(alias = "statusWebhookUrl")]
    pub status_webhook_url: Option<String>,
    #[serde(alias = "statusWebhookSecret")]
    pub status_webhook_secret: Option<String>,
}

#[derive(Serialize)]
struct DeviceView {
    #[serde(rename = "deviceHash")]
    device_hash: String,
    #[serde(rename = "phoneNumber")]
    phone_number: String,
    name: Option<String>,
    status: &'static str,
    port: Option<u16>,
    #[serde(rename = "webhookUrl")]
    webhook_url: Option<String>,
    #[serde(rename = "statusWebhookUrl")]
    status_webhook_url: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: String,
    #[serde(rename = "updatedAt")]
    updated_at: String,
    #[serde(rename = "lastSeen")]
    last_seen: Option<String>,
}

impl From<wag_store::Instance> for DeviceView {
    fn from(i: wag_store::Instance) -> Self {
        Self {
            device_hash: i.hash,
            phone_number: i.phone_number,
            name: i.name,
            status: i.status.as_str(),
            port: i.port,
            webhook_url: i.webhook_url,
            status_webhook_url: i.status_webhook_url,
            created_at: i.created_at.to_rfc3339(),
            updated_at: i.updated_at.to_rfc3339(),
            last_seen: i.last_seen.map(|t| t.to_rfc3339()),
        }
    }
}

pub async fn create_device(
    State(state): State<AppState>,
    Json(body): Json<CreateDeviceBody>,
) -> Result<impl IntoResponse, ApiError> {
    let instance = state
        .store
        .register(RegisterInput {
            phone_number: body.phone_number,
            name: body.name,
            webhook_url: body.webhook_url,
            webhook_secret: body.webhook_secret,
            status_webhook_url: body.status_webhook_url,
            status_webhook_secret: body.status_webhook_secret,
        })
        .await?;
    state.instance_cache.put(instance.clone());
    Ok((StatusCode::CREATED, Json(DeviceView::from(instance))))
}

#[derive(Deserialize)]
pub struct ListDevicesQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<ListDevicesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(InstanceStatus::parse)
        .flatten();
    let filter = ListFilter {
        status,
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
        offset: query.offset.unwrap_or(0),
    };
    let instances = state.store.list(filter).await?;
    let views: Vec<DeviceView> = instances.into_iter().map(DeviceView::from).collect();
    Ok(Json(views))
}

pub async fn device_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let hash = resolver::extract_hash(&headers, &HashMap::new(), None)?;
    let instance = resolver::resolve(&state, &hash).await?;
    Ok(Json(DeviceView::from(instance)))
}

#[derive(Deserialize)]
pub struct UpdateDeviceBody {
    pub name: Option<String>,
    #[serde(alias = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(alias = "webhookSecret")]
    pub webhook_secret: Option<String>,
    #[serde(alias = "statusWebhookUrl")]
    pub status_webhook_url: Option<String>,
    #[serde(alias = "statusWebhookSecret")]
    pub status_webhook_secret: Option<String>,
}

pub async fn update_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateDeviceBody>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = resolver::extract_hash(&headers, &HashMap::new(), None)?;
    let instance = resolver::resolve(&state, &hash).await?;

    let updated = state
        .store
        .update(&instance.hash, InstanceUpdate {
            name: body.name.map(Some),
            webhook_url: body.webhook_url.map(Some),
            webhook_secret: body.webhook_secret.map(Some),
            status_webhook_url: body.status_webhook_url.map(Some),
            status_webhook_secret: body.status_webhook_secret.map(Some),
            ..Default::default()
        })
        .await?;
    state.instance_cache.put(updated.clone());
    Ok(Json(DeviceView::from(updated)))
}

#[derive(Deserialize)]
pub struct DeleteDeviceQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn delete_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DeleteDeviceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = resolver::extract_hash(&headers, &HashMap::new(), None)?;
    let instance = resolver::resolve(&state, &hash).await?;

    if query.force {
        let _ = state.supervisor.stop(&instance.hash, Duration::from_secs(10)).await;
    } else {
        state.supervisor.stop(&instance.hash, Duration::from_secs(10)).await?;
    }
    state.queues.remove(&instance.hash);
    state.mirror.abort(&instance.hash);

    let removed = state.store.delete(&instance.hash).await?;
    state.instance_cache.invalidate(&instance.hash);
    Ok(Json(serde_json::json!({ "success": true, "removed": removed })))
}

pub async fn start_device(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let hash = resolver::extract_hash(&headers, &HashMap::new(), None)?;
    let instance = resolver::resolve(&state, &hash).await?;
    state.supervisor.start(&instance.hash).await?;
    state.instance_cache.invalidate(&instance.hash);
    state.mirror.spawn(instance.hash.clone(), instance.port.unwrap_or_default());
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn stop_device(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let hash = resolver::extract_hash(&headers, &HashMap::new(), None)?;
    let instance = resolver::resolve(&state, &hash).await?;
    state.supervisor.stop(&instance.hash, Duration::from_secs(10)).await?;
    state.instance_cache.invalidate(&instance.hash);
    state.mirror.abort(&instance.hash);
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn restart_device(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let hash = resolver::extract_hash(&headers, &HashMap::new(), None)?;
    let instance = resolver::resolve(&state, &hash).await?;
    state.supervisor.restart(&instance.hash, Duration::from_secs(10)).await?;
    state.instance_cache.invalidate(&instance.hash);
    state.mirror.spawn(instance.hash.clone(), instance.port.unwrap_or_default());
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.stats().await {
        Ok(stats) => Json(serde_json::json!({ "status": "ok", "instances": stats.total })).into_response(),
        Err(_) => ApiError(GatewayError::internal("store unavailable")).into_response(),
    }
}
