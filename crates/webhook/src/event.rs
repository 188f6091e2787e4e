use serde_json::Value;

/// A lifecycle event raised by a worker (login succeeded, device list
/// changed, auth failed, container started/stopped, ...).
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    pub code: String,
    pub message: Option<String>,
    pub result: Option<Value>,
}
