use super::Store;
use crate::error::PersistenceError;
use async_trait::async_trait;
use fastscale_core::{EnviroGrowReading, EnviroSensor, Record, Sensor, TestDeviceReading};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Tables {
    sensors: Vec<Sensor>,
    sensor_data: Vec<TestDeviceReading>,
    enviro_sensors: BTreeMap<String, EnviroSensor>,
    enviro_grow: Vec<EnviroGrowReading>,
}

/// In-process store enforcing the same keys and references as postgres
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    insert_latency: Option<Duration>,
    unavailable: AtomicBool,
    device_inserts: AtomicUsize,
    schema_calls: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps inside every insert, to widen race windows
    pub fn with_latency(latency: Duration) -> Self {
        MemoryStore {
            insert_latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn enviro_sensors(&self) -> Vec<EnviroSensor> {
        self.tables.lock().enviro_sensors.values().cloned().collect()
    }

    pub fn enviro_grow(&self) -> Vec<EnviroGrowReading> {
        self.tables.lock().enviro_grow.clone()
    }

    pub fn sensors(&self) -> Vec<Sensor> {
        self.tables.lock().sensors.clone()
    }

    pub fn sensor_data(&self) -> Vec<TestDeviceReading> {
        self.tables.lock().sensor_data.clone()
    }

    pub fn row_count(&self) -> usize {
        let tables = self.tables.lock();
        tables.sensors.len()
            + tables.sensor_data.len()
            + tables.enviro_sensors.len()
            + tables.enviro_grow.len()
    }

    /// Number of device inserts that reached the store
    pub fn device_inserts(&self) -> usize {
        self.device_inserts.load(Ordering::SeqCst)
    }

    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Removes a device behind the cache's back
    pub fn delete_enviro_sensor(&self, uid: &str) {
        self.tables.lock().enviro_sensors.remove(uid);
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.unavailable.load(Ordering::SeqCst) || self.is_closed() {
            return Err(PersistenceError::Timeout(0));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        self.check_available()?;
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, record: &Record) -> Result<u64, PersistenceError> {
        self.check_available()?;
        if let Some(latency) = self.insert_latency {
            tokio::time::sleep(latency).await;
        }

        let mut tables = self.tables.lock();
        match record {
            Record::Sensor(sensor) => {
                let id = match sensor.id {
                    Some(id) if tables.sensors.iter().any(|s| s.id == Some(id)) => return Ok(0),
                    Some(id) => id,
                    None => tables.sensors.iter().filter_map(|s| s.id).max().unwrap_or(0) + 1,
                };
                tables.sensors.push(Sensor {
                    id: Some(id),
                    ..sensor.clone()
                });
            }
            Record::TestDevice(reading) => {
                if let Some(sensor_id) = reading.sensor_id {
                    if !tables.sensors.iter().any(|s| s.id == Some(sensor_id)) {
                        let reason = format!("sensor_id={}", sensor_id);
                        return Err(PersistenceError::ForeignKey(reason));
                    }
                }
                tables.sensor_data.push(reading.clone());
            }
            Record::EnviroSensor(sensor) => {
                self.device_inserts.fetch_add(1, Ordering::SeqCst);
                if tables.enviro_sensors.contains_key(&sensor.uid) {
                    return Ok(0);
                }
                tables
                    .enviro_sensors
                    .insert(sensor.uid.clone(), sensor.clone());
            }
            Record::EnviroGrow(reading) => {
                if !tables.enviro_sensors.contains_key(&reading.uid) {
                    return Err(PersistenceError::ForeignKey(format!("uid={}", reading.uid)));
                }
                tables.enviro_grow.push(reading.clone());
            }
        }
        Ok(1)
    }

    async fn known_device_ids(&self) -> Result<Vec<String>, PersistenceError> {
        self.check_available()?;
        Ok(self.tables.lock().enviro_sensors.keys().cloned().collect())
    }

    async fn count_sensors(&self) -> Result<i64, PersistenceError> {
        self.check_available()?;
        Ok(self.tables.lock().sensors.len() as i64)
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        self.check_available()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
