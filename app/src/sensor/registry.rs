use crate::error::PersistenceError;
use crate::models::Store;
use fastscale_core::{EnviroSensor, Record};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Cache of the enviro device ids that exist in the store
///
/// Registration of an unknown uid is serialized per uid, so concurrent
/// readings of a new device create a single row.
#[derive(Default)]
pub struct DeviceRegistry {
    known: RwLock<HashSet<String>>,
    loaded: AtomicBool,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the known ids, loaded from the store on first use
    pub async fn known_ids(
        &self,
        store: &dyn Store,
    ) -> Result<HashSet<String>, PersistenceError> {
        if !self.loaded.load(Ordering::Acquire) {
            self.refresh(store).await?;
        }
        Ok(self.known.read().clone())
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, store: &dyn Store) -> Result<usize, PersistenceError> {
        let ids: HashSet<String> = store.known_device_ids().await?.into_iter().collect();
        let count = ids.len();
        *self.known.write() = ids;
        self.loaded.store(true, Ordering::Release);
        info!(count = count, "Loaded known devices");
        Ok(count)
    }

    pub fn is_known(&self, uid: &str) -> bool {
        self.known.read().contains(uid)
    }

    pub fn len(&self) -> usize {
        self.known.read().len()
    }

    /// Persists the device unless it is already known
    ///
    /// Returns `true` only if this call created the row.
    pub async fn register_if_unknown(
        &self,
        store: &dyn Store,
        device: &EnviroSensor,
    ) -> Result<bool, PersistenceError> {
        if self.is_known(&device.uid) {
            return Ok(false);
        }

        let lock = self.lock_for(&device.uid);
        let _guard = lock.lock().await;
        if self.is_known(&device.uid) {
            self.locks.lock().remove(&device.uid);
            return Ok(false);
        }

        let res = store.insert(&Record::EnviroSensor(device.clone())).await;
        if res.is_ok() {
            self.known.write().insert(device.uid.clone());
        }
        // removed on success and failure
        self.locks.lock().remove(&device.uid);
        let created = res? > 0;

        if created {
            info!(uid = %device.uid, nickname = %device.nickname, "Registered new device");
        } else {
            debug!(uid = %device.uid, "Device already persisted");
        }
        Ok(created)
    }

    /// Drops a stale id, the next registration hits the store again
    pub fn forget(&self, uid: &str) -> bool {
        self.known.write().remove(uid)
    }

    #[cfg(test)]
    pub(crate) fn pending_locks(&self) -> usize {
        self.locks.lock().len()
    }

    fn lock_for(&self, uid: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(uid.to_owned())
            .or_default()
            .clone()
    }
}
