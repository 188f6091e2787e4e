/// Lifecycle events the supervisor emits for downstream subscribers (the
/// WebSocket mirror and any future listener), filtered by instance hash at
/// the subscriber.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A worker finished spawning and is ready for the WebSocket mirror to
    /// connect to its `/ws` endpoint.
    Started { hash: String, port: u16 },
    /// The health check (or an out-of-band wait) found a previously running
    /// worker dead.
    ProcessStopped { hash: String },
}
