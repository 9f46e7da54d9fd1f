use crate::config::Config;
use crate::error::PersistenceError;
use async_trait::async_trait;
use fastscale_core::Record;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

macro_rules! sql_stmnt {
    ($ret:ident, $stmt:expr) => {
        sqlx::query_as::<_ ,$ret>($stmt)
    };
    ($stmt:expr) => {
        sqlx::query($stmt)
    };
    ($ret:ident, $stmt:expr, $($bind:expr),*) => {
        sqlx::query_as::<_ ,$ret>($stmt)$(.bind($bind))*
    };
    ($stmt:expr, $($bind:expr),*) => {
        sqlx::query($stmt)$(.bind($bind))*
    };
}

pub mod enviro_grow;
pub mod enviro_sensor;
pub mod sensor;
pub mod sensor_data;

#[cfg(test)]
pub mod memory;

/// Persistence seam of the ingest pipeline
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates every table that does not exist yet, safe to call on each startup
    async fn ensure_schema(&self) -> Result<(), PersistenceError>;

    /// Writes a single record in its own transaction, returns the affected rows
    async fn insert(&self, record: &Record) -> Result<u64, PersistenceError>;

    async fn known_device_ids(&self) -> Result<Vec<String>, PersistenceError>;

    async fn count_sensors(&self) -> Result<i64, PersistenceError>;

    async fn ping(&self) -> Result<(), PersistenceError>;

    async fn close(&self);
}

pub async fn establish_db_connection(config: &Config) -> Result<PgPool, PersistenceError> {
    Ok(PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(config.db_timeout())
        .connect(config.database_url())
        .await?)
}

#[derive(sqlx::FromRow)]
pub(crate) struct CountRecord {
    pub count: Option<i64>,
}

impl CountRecord {
    pub fn count(self) -> i64 {
        self.count.unwrap_or(0)
    }
}

/// Delay applied before the next operation after connection failures
#[derive(Debug, Default)]
pub struct ConnectionBackoff {
    failures: AtomicU32,
}

impl ConnectionBackoff {
    const BASE_MS: u64 = 100;
    const MAX_MS: u64 = 5_000;

    pub fn delay(&self) -> Option<Duration> {
        let failures = self.failures.load(Ordering::Relaxed);
        if failures == 0 {
            return None;
        }
        let exp = (failures - 1).min(16);
        let ms = Self::BASE_MS.saturating_mul(1 << exp).min(Self::MAX_MS);
        Some(Duration::from_millis(ms))
    }

    pub fn record<T>(&self, res: &Result<T, PersistenceError>) {
        match res {
            Err(e) if e.is_connection() => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => self.failures.store(0, Ordering::Relaxed),
        }
    }
}

pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
    hypertables: bool,
    backoff: ConnectionBackoff,
}

impl PgStore {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        PgStore {
            pool,
            timeout: config.db_timeout(),
            hypertables: config.timescale_hypertables(),
            backoff: ConnectionBackoff::default(),
        }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs a storage operation bounded by the configured timeout
    async fn bounded<T, F>(&self, op: F) -> Result<T, PersistenceError>
    where
        F: Future<Output = Result<T, PersistenceError>>,
    {
        if let Some(delay) = self.backoff.delay() {
            debug!(delay_ms = delay.as_millis() as u64, "Backing off database");
            tokio::time::sleep(delay).await;
        }
        let res = match tokio::time::timeout(self.timeout, op).await {
            Ok(res) => res,
            Err(_) => Err(PersistenceError::Timeout(self.timeout.as_millis())),
        };
        self.backoff.record(&res);
        res
    }

    async fn insert_record(&self, record: &Record) -> Result<u64, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let affected = match record {
            Record::Sensor(s) => sensor::insert(&mut tx, s).await?,
            Record::TestDevice(r) => sensor_data::insert(&mut tx, r).await?,
            Record::EnviroSensor(s) => enviro_sensor::insert(&mut tx, s).await?,
            Record::EnviroGrow(r) => enviro_grow::insert(&mut tx, r).await?,
        };
        tx.commit().await?;
        Ok(affected)
    }

    async fn create_tables(&self) -> Result<(), PersistenceError> {
        // referenced tables first
        sensor::create_table(&self.pool).await?;
        sensor_data::create_table(&self.pool).await?;
        enviro_sensor::create_table(&self.pool).await?;
        enviro_grow::create_table(&self.pool).await?;

        if self.hypertables {
            for (table, column) in [
                (sensor_data::TABLE, "time"),
                (enviro_grow::TABLE, "timestamp"),
            ] {
                sql_stmnt!(
                    "SELECT create_hypertable($1::regclass, by_range($2::name), \
                     if_not_exists => TRUE)",
                    table,
                    column
                )
                .execute(&self.pool)
                .await?;
                info!(table = table, "Ensured hypertable");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        self.bounded(self.create_tables()).await
    }

    async fn insert(&self, record: &Record) -> Result<u64, PersistenceError> {
        self.bounded(self.insert_record(record)).await
    }

    async fn known_device_ids(&self) -> Result<Vec<String>, PersistenceError> {
        self.bounded(enviro_sensor::read_uids(&self.pool)).await
    }

    async fn count_sensors(&self) -> Result<i64, PersistenceError> {
        self.bounded(sensor::count(&self.pool)).await
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        self.bounded(async {
            sql_stmnt!("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        if self.pool.is_closed() {
            warn!("Database pool already closed");
            return;
        }
        self.pool.close().await;
        info!("Closed database pool");
    }
}
