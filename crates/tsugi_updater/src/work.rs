use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// In-flight work keyed by resource id. Call sites only see this trait, so
/// a multi-instance deployment can swap in a lease-based implementation
/// without touching them.
pub trait WorkRegistry: Send + Sync {
    /// Claim a resource. `false` means another update of the same resource
    /// is still running in this process.
    fn try_begin(&self, resource_id: &str) -> bool;

    fn finish(&self, resource_id: &str);

    fn in_flight(&self) -> Vec<String>;
}

/// Single-process registry: a mutex-guarded set of active resource ids.
#[derive(Default)]
pub struct InProcessWorkRegistry {
    active: Mutex<HashSet<String>>,
}

impl WorkRegistry for InProcessWorkRegistry {
    fn try_begin(&self, resource_id: &str) -> bool {
        self.active
            .lock()
            .expect("work registry lock poisoned")
            .insert(resource_id.to_string())
    }

    fn finish(&self, resource_id: &str) {
        self.active
            .lock()
            .expect("work registry lock poisoned")
            .remove(resource_id);
    }

    fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .active
            .lock()
            .expect("work registry lock poisoned")
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// RAII claim on a resource; releases on drop even when an update fails.
pub struct WorkClaim {
    registry: Arc<dyn WorkRegistry>,
    resource_id: String,
}

impl WorkClaim {
    pub fn acquire(registry: Arc<dyn WorkRegistry>, resource_id: &str) -> Option<Self> {
        if registry.try_begin(resource_id) {
            Some(Self {
                registry,
                resource_id: resource_id.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for WorkClaim {
    fn drop(&mut self) {
        self.registry.finish(&self.resource_id);
    }
}
