use crate::models::Store;
use std::sync::Arc;

mod registry;

pub use registry::DeviceRegistry;

/// Everything a message handler needs to persist data
pub struct IngestContext {
    store: Arc<dyn Store>,
    registry: DeviceRegistry,
}

impl IngestContext {
    pub fn new(store: Arc<dyn Store>) -> Self {
        IngestContext {
            store,
            registry: DeviceRegistry::new(),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }
}
