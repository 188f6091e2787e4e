use std::collections::HashMap;

use serde_json::Value;
use wag_common::{GatewayError, Result, ids};
use wag_store::Instance;

use crate::state::AppState;

/// Which accepted-status set `ensure_active` checks against. Two variants
/// exist per the routing table: general API endpoints are stricter than the
/// login/QR flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSet {
    Api,
    Login,
}

/// Read the instance hash from, in order, the `x-instance-id` header, a
/// `instance_id` body field, then an `instance_id` query parameter.
pub fn extract_hash(
    headers: &http::HeaderMap,
    query: &HashMap<String, String>,
    body: Option<&Value>,
) -> Result<String> {
    if let Some(header) = headers.get("x-instance-id").and_then(|v| v.to_str().ok()) {
        return Ok(header.to_string());
    }
    if let Some(id) = body.and_then(|b| b.get("instance_id")).and_then(Value::as_str) {
        return Ok(id.to_string());
    }
    if let Some(id) = query.get("instance_id") {
        return Ok(id.clone());
    }
    Err(GatewayError::MissingInstanceId)
}

/// Resolve a request hash into a hydrated instance record: in-memory cache
/// first, falling through to the store on a miss.
pub async fn resolve(state: &AppState, raw_hash: &str) -> Result<Instance> {
    if !ids::is_valid_instance_hash(raw_hash) {
        return Err(GatewayError::InvalidInstanceId);
    }
    let hash = ids::normalize_instance_hash(raw_hash);

    if let Some(instance) = state.instance_cache.get(&hash) {
        return Ok(instance);
    }

    let instance = state.store.find_by_hash(&hash).await?.ok_or(GatewayError::InstanceNotFound)?;
    state.instance_cache.put(instance.clone());
    Ok(instance)
}

pub fn ensure_active(instance: &Instance, set: ActiveSet) -> Result<()> {
    let accepted = match set {
        ActiveSet::Api => instance.status.accepted_for_api(),
        ActiveSet::Login => instance.status.accepted_for_login(),
    };
    if accepted { Ok(()) } else { Err(GatewayError::InstanceNotActive) }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prefers_the_header_over_body_and_query() {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-instance-id", "abcdef0123456789".parse().unwrap());
        let mut query = HashMap::new();
        query.insert("instance_id".to_string(), "ffffffffffffffff".to_string());
        let body = json!({"instance_id": "1111111111111111"});
        let hash = extract_hash(&headers, &query, Some(&body)).unwrap();
        assert_eq!(hash, "abcdef0123456789");
    }

    #[test]
    fn falls_back_to_body_then_query() {
        let headers = http::HeaderMap::new();
        let body = json!({"instance_id": "1111111111111111"});
        assert_eq!(extract_hash(&headers, &HashMap::new(), Some(&body)).unwrap(), "1111111111111111");

        let mut query = HashMap::new();
        query.insert("instance_id".to_string(), "2222222222222222".to_string());
        assert_eq!(extract_hash(&headers, &query, None).unwrap(), "2222222222222222");
    }

    #[test]
    fn missing_everywhere_is_an_error() {
        let headers = http::HeaderMap::new();
        assert!(matches!(
            extract_hash(&headers, &HashMap::new(), None),
            Err(GatewayError::MissingInstanceId)
        ));
    }
}
