use serde::Serialize;
use serde_json::Value;

/// Frames the gateway re-broadcasts to its own WebSocket subscribers, one
/// per worker-level event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum MirrorEnvelope {
    #[serde(rename = "whatsapp-websocket-message")]
    Message {
        #[serde(rename = "phoneNumber")]
        phone_number: String,
        port: u16,
        message: Value,
        timestamp: String,
    },
    #[serde(rename = "container-websocket-connected")]
    Connected {
        #[serde(rename = "phoneNumber")]
        phone_number: String,
        port: u16,
        timestamp: String,
    },
    #[serde(rename = "container-websocket-closed")]
    Closed {
        #[serde(rename = "phoneNumber")]
        phone_number: String,
        port: u16,
        code: u16,
        reason: String,
        timestamp: String,
    },
    /// Emitted by the supervisor's health check (not by the websocket loop
    /// itself) when a tracked worker is found dead.
    #[serde(rename = "process-stopped")]
    ProcessStopped {
        #[serde(rename = "phoneNumber")]
        phone_number: String,
        timestamp: String,
    },
}

impl MirrorEnvelope {
    /// The instance hash this frame belongs to, for subscriber-side
    /// filtering.
    #[must_use]
    pub fn instance_hash(&self) -> &str {
        match self {
            Self::Message { phone_number, .. }
            | Self::Connected { phone_number, .. }
            | Self::Closed { phone_number, .. }
            | Self::ProcessStopped { phone_number, .. } => phone_number,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_envelope_serializes_with_a_type_tag() {
        let envelope = MirrorEnvelope::Message {
            phone_number: "abc123".to_string(),
            port: 8000,
            message: json!({"hello": "world"}),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value["type"], "whatsapp-websocket-message");
        assert_eq!(value["phoneNumber"], "abc123");
        assert_eq!(value["message"]["hello"], "world");
    }

    #[test]
    fn instance_hash_is_extracted_for_every_variant() {
        let connected = MirrorEnvelope::Connected { phone_number: "h".to_string(), port: 1, timestamp: "t".to_string() };
        assert_eq!(connected.instance_hash(), "h");
    }
}
