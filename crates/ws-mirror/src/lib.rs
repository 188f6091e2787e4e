//! Mirrors each worker's WebSocket stream onto the gateway's own
//! subscribers.

pub mod envelope;
pub mod mirror;

pub use envelope::MirrorEnvelope;
pub use mirror::WorkerMirror;
