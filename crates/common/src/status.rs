use serde::{Deserialize, Serialize};

/// Lifecycle status of an instance, shared by the store, the supervisor, and
/// the webhook dispatcher so all three agree on the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Registered,
    Running,
    Active,
    Connected,
    Disconnected,
    WaitingQr,
    Stopped,
    Error,
}

impl InstanceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Running => "running",
            Self::Active => "active",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::WaitingQr => "waiting_qr",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "registered" => Self::Registered,
            "running" => Self::Running,
            "active" => Self::Active,
            "connected" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "waiting_qr" => Self::WaitingQr,
            "stopped" => Self::Stopped,
            "error" => Self::Error,
            _ => return None,
        })
    }

    /// The status set accepted by endpoints that proxy general API calls.
    #[must_use]
    pub fn accepted_for_api(self) -> bool {
        matches!(self, Self::Active | Self::Connected)
    }

    /// The status set accepted by the login/QR flow, which additionally
    /// allows an instance that is mid-handshake.
    #[must_use]
    pub fn accepted_for_login(self) -> bool {
        self.accepted_for_api() || matches!(self, Self::WaitingQr)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for status in [
            InstanceStatus::Registered,
            InstanceStatus::Running,
            InstanceStatus::Active,
            InstanceStatus::Connected,
            InstanceStatus::Disconnected,
            InstanceStatus::WaitingQr,
            InstanceStatus::Stopped,
            InstanceStatus::Error,
        ] {
            assert_eq!(InstanceStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn login_accepts_waiting_qr_but_api_does_not() {
        assert!(InstanceStatus::WaitingQr.accepted_for_login());
        assert!(!InstanceStatus::WaitingQr.accepted_for_api());
    }

    #[test]
    fn unknown_status_fails_to_parse() {
        assert_eq!(InstanceStatus::parse("bogus"), None);
    }
}
