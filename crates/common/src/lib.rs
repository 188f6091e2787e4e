//! Shared error taxonomy and domain primitives used across every gateway crate.

pub mod error;
pub mod ids;
pub mod status;

pub use error::{GatewayError, Result};
pub use status::InstanceStatus;
