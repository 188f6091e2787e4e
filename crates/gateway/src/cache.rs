use dashmap::DashMap;
use wag_store::Instance;

/// The in-memory view the resolver consults before falling through to the
/// store. Single-writer: every write goes through the store first and is
/// mirrored here afterward.
#[derive(Default)]
pub struct InstanceCache {
    by_hash: DashMap<String, Instance>,
}

impl InstanceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<Instance> {
        self.by_hash.get(hash).map(|entry| entry.clone())
    }

    pub fn put(&self, instance: Instance) {
        self.by_hash.insert(instance.hash.clone(), instance);
    }

    pub fn invalidate(&self, hash: &str) {
        self.by_hash.remove(hash);
    }
}
