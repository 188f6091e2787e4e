//! Spawns, tracks, and tears down worker processes on behalf of the instance
//! store.

pub mod events;
pub mod process;
pub mod supervisor;

pub use events::SupervisorEvent;
pub use process::{AdoptedWorker, OwnedWorker, WorkerHandle, WorkerProcess};
pub use supervisor::{DEFAULT_STOP_TIMEOUT, WorkerSnapshot, WorkerSupervisor};
