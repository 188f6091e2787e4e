use std::{sync::Arc, time::Duration};

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, warn};
use wag_store::{InstanceUpdate, SqliteInstanceStore};

use crate::{event::ContainerEvent, signing::sign, status_mapping::map_event};

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const USER_AGENT: &str = "WhatsApp-Gateway-Webhook/1.0";

/// Applies the status transition implied by a container event and, if the
/// instance has a status webhook configured, POSTs the signed envelope with
/// retries. Never surfaces an error to its caller: a delivery failure is
/// logged and discarded.
pub struct WebhookDispatcher {
    client: Client,
    store: Arc<SqliteInstanceStore>,
}

impl WebhookDispatcher {
    #[must_use]
    pub fn new(store: Arc<SqliteInstanceStore>) -> Self {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, store }
    }

    pub async fn dispatch(&self, hash: &str, event: ContainerEvent) {
        let mapped = map_event(&event);

        let Ok(Some(mut instance)) = self.store.find_by_hash(hash).await else {
            warn!(instance = %hash, "dropping webhook event for unknown instance");
            return;
        };

        if let Some(new_status) = mapped.new_status {
            if let Err(e) = self
                .store
                .update(hash, InstanceUpdate {
                    status: Some(new_status),
                    last_seen: Some(Utc::now()),
                    ..Default::default()
                })
                .await
            {
                error!(instance = %hash, error = %e, "failed to persist status transition from container event");
            }
            instance.status = new_status;
        }

        let Some(url) = instance.status_webhook_url.clone() else {
            return;
        };

        let envelope = json!({
            "device": { "deviceHash": hash, "status": instance.status.as_str() },
            "event": {
                "type": mapped.event_type,
                "code": event.code,
                "message": event.message,
                "result": event.result,
            },
            "timestamp": Utc::now().to_rfc3339(),
        });
        let Ok(body) = serde_json::to_vec(&envelope) else {
            error!(instance = %hash, "failed to serialize webhook envelope");
            return;
        };

        self.send_with_retry(hash, &url, instance.status_webhook_secret.as_deref(), &body).await;
    }

    async fn send_with_retry(&self, hash: &str, url: &str, secret: Option<&str>, body: &[u8]) {
        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .header("User-Agent", USER_AGENT)
                .body(body.to_vec());
            if let Some(secret) = secret {
                request = request.header("X-Webhook-Signature", sign(secret, body));
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => warn!(instance = %hash, url, status = resp.status().as_u16(), attempt, "webhook delivery rejected"),
                Err(e) => warn!(instance = %hash, url, error = %e, attempt, "webhook delivery failed"),
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
            }
        }
        error!(instance = %hash, url, "webhook delivery exhausted all retries");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;
    use wag_common::InstanceStatus;
    use wag_store::{PortAllocator, RegisterInput};

    use super::*;

    async fn store_with_instance() -> (Arc<SqliteInstanceStore>, String) {
        let pool = SqlitePoolOptions::new().connect(":memory:").await.expect("pool");
        SqliteInstanceStore::init(&pool).await.expect("init");
        let ports = Arc::new(PortAllocator::new(8000, 10));
        let store = Arc::new(SqliteInstanceStore::new(pool, ports));
        let instance = store
            .register(RegisterInput {
                phone_number: "+15550001111".to_string(),
                name: None,
                webhook_url: None,
                webhook_secret: None,
                status_webhook_url: None,
                status_webhook_secret: None,
            })
            .await
            .expect("register");
        (store, instance.hash)
    }

    #[tokio::test]
    async fn dispatch_updates_status_even_without_a_webhook_url() {
        let (store, hash) = store_with_instance().await;
        let dispatcher = WebhookDispatcher::new(store.clone());
        dispatcher
            .dispatch(&hash, ContainerEvent { code: "LOGIN_SUCCESS".to_string(), message: None, result: None })
            .await;
        let instance = store.find_by_hash(&hash).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Connected);
    }

    #[tokio::test]
    async fn dispatch_ignores_events_for_unknown_instances() {
        let (store, _hash) = store_with_instance().await;
        let dispatcher = WebhookDispatcher::new(store);
        // Must not panic even though this hash was never registered.
        dispatcher
            .dispatch("0000000000000000", ContainerEvent { code: "LOGIN_SUCCESS".to_string(), message: None, result: None })
            .await;
    }
}
