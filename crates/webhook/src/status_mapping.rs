use serde_json::Value;
use wag_common::InstanceStatus;

use crate::event::ContainerEvent;

/// The outcome of mapping a container event: the label to report in the
/// outbound webhook envelope's `event.type` field, and the instance status
/// transition it implies (`None` leaves the status unchanged).
pub struct MappedEvent {
    pub event_type: &'static str,
    pub new_status: Option<InstanceStatus>,
}

#[must_use]
pub fn map_event(event: &ContainerEvent) -> MappedEvent {
    match event.code.as_str() {
        "LOGIN_SUCCESS" => MappedEvent {
            event_type: "login_success",
            new_status: Some(InstanceStatus::Connected),
        },
        "LIST_DEVICES" if result_is_non_empty(event.result.as_ref()) => MappedEvent {
            event_type: "connected",
            new_status: Some(InstanceStatus::Connected),
        },
        "LIST_DEVICES" => MappedEvent {
            event_type: "disconnected",
            new_status: Some(InstanceStatus::Disconnected),
        },
        "AUTH_FAILURE" => MappedEvent {
            event_type: "auth_failed",
            new_status: Some(InstanceStatus::Error),
        },
        "CONTAINER_START" => MappedEvent {
            event_type: "container_event",
            new_status: Some(InstanceStatus::Running),
        },
        "CONTAINER_STOP" => MappedEvent {
            event_type: "container_event",
            new_status: Some(InstanceStatus::Stopped),
        },
        _ => MappedEvent {
            event_type: "container_event",
            new_status: None,
        },
    }
}

fn result_is_non_empty(result: Option<&Value>) -> bool {
    match result {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(code: &str, result: Option<Value>) -> ContainerEvent {
        ContainerEvent { code: code.to_string(), message: None, result }
    }

    #[test]
    fn login_success_maps_to_connected() {
        let mapped = map_event(&event("LOGIN_SUCCESS", None));
        assert_eq!(mapped.event_type, "login_success");
        assert_eq!(mapped.new_status, Some(InstanceStatus::Connected));
    }

    #[test]
    fn list_devices_with_results_maps_to_connected() {
        let mapped = map_event(&event("LIST_DEVICES", Some(json!([{"id": 1}]))));
        assert_eq!(mapped.event_type, "connected");
        assert_eq!(mapped.new_status, Some(InstanceStatus::Connected));
    }

    #[test]
    fn list_devices_with_empty_results_maps_to_disconnected() {
        let mapped = map_event(&event("LIST_DEVICES", Some(json!([]))));
        assert_eq!(mapped.event_type, "disconnected");
        assert_eq!(mapped.new_status, Some(InstanceStatus::Disconnected));
    }

    #[test]
    fn list_devices_with_no_result_maps_to_disconnected() {
        let mapped = map_event(&event("LIST_DEVICES", None));
        assert_eq!(mapped.new_status, Some(InstanceStatus::Disconnected));
    }

    #[test]
    fn auth_failure_maps_to_error() {
        let mapped = map_event(&event("AUTH_FAILURE", None));
        assert_eq!(mapped.event_type, "auth_failed");
        assert_eq!(mapped.new_status, Some(InstanceStatus::Error));
    }

    #[test]
    fn unknown_code_leaves_status_unchanged() {
        let mapped = map_event(&event("SOMETHING_ELSE", None));
        assert_eq!(mapped.event_type, "container_event");
        assert_eq!(mapped.new_status, None);
    }
}
