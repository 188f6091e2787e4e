use std::{
    collections::BTreeSet,
    sync::Mutex,
};

use wag_common::{GatewayError, Result};

/// Hands out TCP ports in `[base, base + window)`, always the lowest free
/// port rather than the next after the last assigned one — this keeps
/// allocations compact, which is what callers and tests rely on when they
/// assert on the "next" port.
pub struct PortAllocator {
    base: u16,
    window: u16,
    allocated: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    #[must_use]
    pub fn new(base: u16, window: u16) -> Self {
        Self {
            base,
            window,
            allocated: Mutex::new(BTreeSet::new()),
        }
    }

    /// Seed the allocator's in-use set from ports already assigned to
    /// instances (called once at startup after loading the store).
    pub fn seed(&self, ports: impl IntoIterator<Item = u16>) {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        allocated.extend(ports);
    }

    /// Allocate the lowest free port in the window.
    pub fn allocate(&self) -> Result<u16> {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        for candidate in self.base..self.base.saturating_add(self.window) {
            if !allocated.contains(&candidate) {
                allocated.insert(candidate);
                return Ok(candidate);
            }
        }
        Err(GatewayError::PortsExhausted)
    }

    /// Return a port to the free set. Idempotent: releasing a port that was
    /// never allocated (or already released) is a no-op.
    pub fn release(&self, port: u16) {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        allocated.remove(&port);
    }

    /// Whether a port is currently tracked as allocated.
    #[must_use]
    pub fn is_allocated(&self, port: u16) -> bool {
        self.allocated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&port)
    }

    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.allocated.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_port_first() {
        let allocator = PortAllocator::new(8000, 10);
        assert_eq!(allocator.allocate().unwrap(), 8000);
        assert_eq!(allocator.allocate().unwrap(), 8001);
        allocator.release(8000);
        // The freed low port, not the next sequential one, comes back first.
        assert_eq!(allocator.allocate().unwrap(), 8000);
    }

    #[test]
    fn exhausts_the_window() {
        let allocator = PortAllocator::new(9000, 2);
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();
        assert!(matches!(allocator.allocate(), Err(GatewayError::PortsExhausted)));
    }

    #[test]
    fn release_is_idempotent() {
        let allocator = PortAllocator::new(8000, 5);
        let port = allocator.allocate().unwrap();
        allocator.release(port);
        allocator.release(port);
        assert_eq!(allocator.allocated_count(), 0);
    }

    #[test]
    fn seed_marks_ports_in_use() {
        let allocator = PortAllocator::new(8000, 5);
        allocator.seed([8000, 8001]);
        assert_eq!(allocator.allocate().unwrap(), 8002);
    }
}
