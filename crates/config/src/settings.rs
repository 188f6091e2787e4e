use std::time::Duration;

/// Tunables read from the environment at startup. Unlike [`crate::Paths`]
/// these are plain values rather than filesystem locations.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// `API_PORT`, default 3000.
    pub api_port: u16,
    /// `API_RATE_LIMIT`, requests allowed per IP per window. Default 100.
    pub api_rate_limit: u32,
    /// The window the rate limit above applies over. Fixed at 15 minutes,
    /// matching the source's `API_RATE_LIMIT` semantics.
    pub api_rate_limit_window: Duration,
    /// `HEALTH_CHECK_INTERVAL` in milliseconds, default 30s.
    pub health_check_interval: Duration,
    /// `DEFAULT_ADMIN_USER`, default "admin". Injected into the worker's
    /// Basic-auth environment and into the proxy's outbound Authorization header.
    pub default_admin_user: String,
    /// `DEFAULT_ADMIN_PASS`, default "admin".
    pub default_admin_pass: String,
    /// `UPDATE_CHECK_CRON`, the cron schedule for the external update
    /// checker. `None` disables the scheduled check entirely.
    pub update_check_cron: Option<String>,
    /// Lowest TCP port the port allocator may hand out.
    pub port_base: u16,
    /// Size of the port allocator's window, i.e. it allocates from
    /// `[port_base, port_base + port_window)`.
    pub port_window: u16,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            api_port: 3000,
            api_rate_limit: 100,
            api_rate_limit_window: Duration::from_secs(15 * 60),
            health_check_interval: Duration::from_secs(30),
            default_admin_user: "admin".to_string(),
            default_admin_pass: "admin".to_string(),
            update_check_cron: None,
            port_base: 8000,
            port_window: 1000,
        }
    }
}

impl GatewaySettings {
    /// Load settings from the process environment, falling back to defaults
    /// for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings using a custom lookup function, for testability.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_port: parse_or(&lookup, "API_PORT", defaults.api_port),
            api_rate_limit: parse_or(&lookup, "API_RATE_LIMIT", defaults.api_rate_limit),
            api_rate_limit_window: defaults.api_rate_limit_window,
            health_check_interval: lookup("HEALTH_CHECK_INTERVAL")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.health_check_interval),
            default_admin_user: lookup("DEFAULT_ADMIN_USER").unwrap_or(defaults.default_admin_user),
            default_admin_pass: lookup("DEFAULT_ADMIN_PASS").unwrap_or(defaults.default_admin_pass),
            update_check_cron: lookup("UPDATE_CHECK_CRON"),
            port_base: defaults.port_base,
            port_window: defaults.port_window,
        }
    }

    /// The `Authorization: Basic base64(user:pass)` header value the proxy
    /// injects on every forwarded request, and the value the worker is
    /// started with via `APP_BASIC_AUTH`.
    #[must_use]
    pub fn basic_auth_header(&self) -> String {
        use base64::{Engine, engine::general_purpose::STANDARD};
        let raw = format!("{}:{}", self.default_admin_user, self.default_admin_pass);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    lookup(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.api_port, 3000);
        assert_eq!(settings.api_rate_limit, 100);
        assert_eq!(settings.default_admin_user, "admin");
        assert_eq!(settings.default_admin_pass, "admin");
        assert_eq!(settings.health_check_interval, Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_parsed_values() {
        let settings = GatewaySettings::from_lookup(|name| match name {
            "API_PORT" => Some("4000".to_string()),
            "HEALTH_CHECK_INTERVAL" => Some("5000".to_string()),
            _ => None,
        });
        assert_eq!(settings.api_port, 4000);
        assert_eq!(settings.health_check_interval, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_override_falls_back_to_default() {
        let settings = GatewaySettings::from_lookup(|name| match name {
            "API_PORT" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(settings.api_port, 3000);
    }

    #[test]
    fn basic_auth_header_encodes_admin_admin() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.basic_auth_header(), "Basic YWRtaW46YWRtaW4=");
    }
}
