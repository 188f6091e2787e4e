use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::state::AppState;

const CLEANUP_EVERY_REQUESTS: u64 = 512;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started_at: Instant,
    count: u32,
}

enum ThrottleDecision {
    Allowed,
    Denied { retry_after: Duration },
}

/// Per-IP sliding-window limiter for the public API surface.
pub struct RequestThrottle {
    max_requests: u32,
    window: Duration,
    buckets: DashMap<IpAddr, WindowState>,
    requests_seen: AtomicU64,
}

impl RequestThrottle {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: DashMap::new(),
            requests_seen: AtomicU64::new(0),
        }
    }

    fn check(&self, ip: IpAddr) -> ThrottleDecision {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> ThrottleDecision {
        if self.max_requests == 0 {
            return ThrottleDecision::Denied { retry_after: self.window.max(Duration::from_secs(1)) };
        }

        let decision = match self.buckets.entry(ip) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let elapsed = now.duration_since(state.started_at);
                if elapsed >= self.window {
                    state.started_at = now;
                    state.count = 1;
                    ThrottleDecision::Allowed
                } else if state.count < self.max_requests {
                    state.count += 1;
                    ThrottleDecision::Allowed
                } else {
                    ThrottleDecision::Denied { retry_after: self.window.saturating_sub(elapsed) }
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(WindowState { started_at: now, count: 1 });
                ThrottleDecision::Allowed
            },
        };

        self.cleanup_if_needed(now);
        decision
    }

    fn cleanup_if_needed(&self, now: Instant) {
        let seen = self.requests_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % CLEANUP_EVERY_REQUESTS != 0 {
            return;
        }
        let stale_after = self.window.saturating_mul(3);
        self.buckets.retain(|_, state| now.duration_since(state.started_at) <= stale_after);
    }
}

pub async fn throttle_gate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = resolve_client_ip(request.headers(), addr);
    match state.throttle.check(ip) {
        ThrottleDecision::Allowed => next.run(request).await,
        ThrottleDecision::Denied { retry_after } => rate_limited_response(retry_after),
    }
}

fn rate_limited_response(retry_after: Duration) -> Response {
    let retry_after_secs = retry_after.as_secs().max(1);
    let mut response = (
        http::StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "success": false,
            "message": "too many requests",
            "error": "RATE_LIMITED",
        })),
    )
        .into_response();
    if let Ok(value) = retry_after_secs.to_string().parse() {
        response.headers_mut().insert(http::header::RETRY_AFTER, value);
    }
    response
}

fn resolve_client_ip(headers: &HeaderMap, addr: SocketAddr) -> IpAddr {
    extract_forwarded_ip(headers).unwrap_or_else(|| addr.ip())
}

fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    if let Some(xff) = xff
        && let Some(ip) = xff.split(',').find_map(|candidate| parse_ip(candidate.trim()))
    {
        return Some(ip);
    }

    let xri = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    if let Some(xri) = xri
        && let Some(ip) = parse_ip(xri.trim())
    {
        return Some(ip);
    }

    let cf_ip = headers.get("cf-connecting-ip").and_then(|v| v.to_str().ok());
    if let Some(cf_ip) = cf_ip
        && let Some(ip) = parse_ip(cf_ip.trim())
    {
        return Some(ip);
    }

    None
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    if value.is_empty() {
        return None;
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_limit() {
        let throttle = RequestThrottle::new(2, Duration::from_secs(10));
        let ip = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        let now = Instant::now();
        assert!(matches!(throttle.check_at(ip, now), ThrottleDecision::Allowed));
        assert!(matches!(throttle.check_at(ip, now), ThrottleDecision::Allowed));
    }

    #[test]
    fn denies_once_the_window_is_exhausted() {
        let throttle = RequestThrottle::new(1, Duration::from_secs(10));
        let ip = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        let now = Instant::now();
        assert!(matches!(throttle.check_at(ip, now), ThrottleDecision::Allowed));
        match throttle.check_at(ip, now) {
            ThrottleDecision::Denied { retry_after } => assert_eq!(retry_after, Duration::from_secs(10)),
            ThrottleDecision::Allowed => unreachable!("second request within the window must be denied"),
        }
    }

    #[test]
    fn resets_after_the_window_elapses() {
        let throttle = RequestThrottle::new(1, Duration::from_secs(10));
        let ip = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        let now = Instant::now();
        assert!(matches!(throttle.check_at(ip, now), ThrottleDecision::Allowed));
        assert!(matches!(
            throttle.check_at(ip, now + Duration::from_secs(11)),
            ThrottleDecision::Allowed
        ));
    }

    #[test]
    fn forwarded_ip_uses_first_xff_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", http::HeaderValue::from_static("203.0.113.1, 198.51.100.9"));
        assert_eq!(extract_forwarded_ip(&headers), Some(IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 1))));
    }
}
