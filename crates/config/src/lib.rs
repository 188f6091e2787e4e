//! Filesystem path resolution and environment-driven settings.
//!
//! Everything here is pure (no I/O beyond reading env vars and, for
//! [`Paths::ensure_session_dir`], creating a directory) so the rest of the
//! gateway can construct it once at startup and pass it down by reference.

pub mod paths;
pub mod settings;

pub use paths::Paths;
pub use settings::GatewaySettings;
