use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use tracing::warn;
use wag_config::Paths;

use crate::reverse_proxy::ProxiedResponse;

const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Inlines the worker's QR login image as a base64 data URL, if the proxied
/// login response references one.
///
/// The worker writes the QR PNG to disk asynchronously after returning its
/// response, so this sleeps briefly before checking for the file. Any
/// failure to find or read it leaves the response untouched; the original
/// status code is always relayed.
pub async fn intercept_qr_login(paths: &Paths, hash: &str, response: ProxiedResponse) -> ProxiedResponse {
    let Ok(mut json) = serde_json::from_slice::<Value>(&response.body) else {
        return response;
    };

    let qr_link = json
        .get("results")
        .and_then(|r| r.get("qr_link"))
        .and_then(Value::as_str)
        .filter(|link| link.contains("/statics/"))
        .map(str::to_string);

    let Some(qr_link) = qr_link else {
        return response;
    };

    let Some(filename) = qr_link.rsplit('/').next() else {
        return response;
    };

    tokio::time::sleep(SETTLE_DELAY).await;

    let qr_path = paths.qr_code_path(hash, filename);
    match tokio::fs::read(&qr_path).await {
        Ok(bytes) => {
            let data_url = format!("data:image/png;base64,{}", STANDARD.encode(bytes));
            if let Some(results) = json.get_mut("results").and_then(Value::as_object_mut) {
                results.insert("qr_code".to_string(), Value::String(data_url));
                results.remove("qr_link");
            }
        },
        Err(e) => {
            warn!(instance = %hash, path = %qr_path.display(), error = %e, "qr code file not ready, leaving response unchanged");
            return response;
        },
    }

    let Ok(body) = serde_json::to_vec(&json) else {
        return response;
    };
    ProxiedResponse { status: response.status, body }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(dir: &std::path::Path) -> Paths {
        let base = dir.to_string_lossy().into_owned();
        Paths::resolve_with(move |name| match name {
            "SESSIONS_DIR" => Some(base.clone()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn leaves_response_unchanged_without_a_qr_link() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(tmp.path());
        let body = serde_json::to_vec(&serde_json::json!({"results": {"foo": "bar"}})).expect("json");
        let response = ProxiedResponse { status: 200, body: body.clone() };
        let result = intercept_qr_login(&paths, "abc123", response).await;
        assert_eq!(result.body, body);
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn leaves_response_unchanged_when_the_qr_file_is_missing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(tmp.path());
        let body = serde_json::to_vec(&serde_json::json!({
            "results": {"qr_link": "http://localhost:3000/statics/qrcode/missing.png"}
        }))
        .expect("json");
        let response = ProxiedResponse { status: 200, body: body.clone() };
        let result = intercept_qr_login(&paths, "abc123", response).await;
        assert_eq!(result.body, body);
    }

    #[tokio::test]
    async fn inlines_the_qr_code_as_a_data_url_when_the_file_exists() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(tmp.path());
        let qr_dir = paths.qr_code_path("abc123", "code.png");
        tokio::fs::create_dir_all(qr_dir.parent().expect("parent")).await.expect("mkdir");
        tokio::fs::write(&qr_dir, b"fake-png-bytes").await.expect("write");

        let body = serde_json::to_vec(&serde_json::json!({
            "results": {"qr_link": "http://localhost:3000/statics/qrcode/code.png"}
        }))
        .expect("json");
        let response = ProxiedResponse { status: 200, body };
        let result = intercept_qr_login(&paths, "abc123", response).await;

        let parsed: Value = serde_json::from_slice(&result.body).expect("json");
        let results = &parsed["results"];
        assert!(results.get("qr_link").is_none());
        let qr_code = results["qr_code"].as_str().expect("qr_code string");
        assert!(qr_code.starts_with("data:image/png;base64,"));
    }
}
