//! Transactional persistence for instance records and the TCP ports
//! allocated to their worker processes.

pub mod instance;
pub mod port_allocator;
pub mod sqlite;

pub use instance::{Instance, InstanceStats, InstanceUpdate, ListFilter, RegisterInput};
pub use port_allocator::PortAllocator;
pub use sqlite::SqliteInstanceStore;
