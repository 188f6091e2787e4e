use std::time::Duration;

use reqwest::{Client, Method};
use wag_common::{GatewayError, Result};

const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// A worker's raw HTTP response, relayed back to the gateway's caller
/// verbatim.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Forwards resolved API calls onto a worker's local port.
pub struct ReverseProxy {
    client: Client,
    basic_auth_header: String,
}

impl ReverseProxy {
    /// `basic_auth_header` is the full header value, e.g. `"Basic dXNlcjpwYXNz"`.
    pub fn new(basic_auth_header: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(PROXY_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build proxy client: {e}")))?;
        Ok(Self { client, basic_auth_header })
    }

    /// Forward `method path_suffix?query` with `body` to `http://localhost:<port>`.
    pub async fn forward(
        &self,
        method: Method,
        port: u16,
        path_suffix: &str,
        query: Option<&str>,
        body: Vec<u8>,
    ) -> Result<ProxiedResponse> {
        let mut url = format!("http://localhost:{port}/{}", path_suffix.trim_start_matches('/'));
        if let Some(q) = query
            && !q.is_empty()
        {
            url.push('?');
            url.push_str(q);
        }

        let response = self
            .client
            .request(method, &url)
            .header("Authorization", &self.basic_auth_header)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(map_transport_error)?
            .to_vec();
        Ok(ProxiedResponse { status, body })
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_connect() || err.is_timeout() {
        GatewayError::ContainerUnreachable
    } else {
        GatewayError::ProxyError(err.to_string())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwarding_to_a_closed_port_is_container_unreachable() {
        let proxy = ReverseProxy::new("Basic dGVzdDp0ZXN0".to_string()).expect("client");
        // Port 1 is a privileged port almost never bound in test sandboxes.
        let err = proxy
            .forward(Method::GET, 1, "/app/devices", None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ContainerUnreachable));
    }

    #[test]
    fn strips_leading_slash_when_building_the_url() {
        assert_eq!(format!("http://localhost:3000/{}", "/app/login".trim_start_matches('/')), "http://localhost:3000/app/login");
    }
}
