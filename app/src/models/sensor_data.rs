use crate::error::PersistenceError;
#[cfg(test)]
use chrono::{DateTime, Utc};
use fastscale_core::TestDeviceReading;
use sqlx::{PgConnection, PgPool};

pub const TABLE: &str = "sensor_data";

#[cfg(test)]
#[derive(sqlx::FromRow, Debug)]
pub struct SensorDataDao {
    pub(crate) time: DateTime<Utc>,
    pub(crate) sensor_id: Option<i32>,
    pub(crate) temperature: Option<f64>,
}

#[cfg(test)]
impl From<SensorDataDao> for TestDeviceReading {
    fn from(val: SensorDataDao) -> Self {
        TestDeviceReading {
            time: val.time,
            sensor_id: val.sensor_id,
            temperature: val.temperature.unwrap_or(f64::NAN),
        }
    }
}

pub async fn create_table(conn: &PgPool) -> Result<(), PersistenceError> {
    sql_stmnt!(
        r#"CREATE TABLE IF NOT EXISTS sensor_data (
            time TIMESTAMPTZ NOT NULL,
            sensor_id INTEGER,
            temperature DOUBLE PRECISION,
            FOREIGN KEY (sensor_id) REFERENCES sensors (id)
        )"#
    )
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert(
    conn: &mut PgConnection,
    reading: &TestDeviceReading,
) -> Result<u64, PersistenceError> {
    let result = sql_stmnt!(
        "INSERT INTO sensor_data (time, sensor_id, temperature) VALUES ($1, $2, $3)",
        reading.time,
        reading.sensor_id,
        reading.temperature
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

// READ sensor_data
#[cfg(test)]
pub async fn get(
    conn: &PgPool,
    sensor_id: i32,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<SensorDataDao>, PersistenceError> {
    Ok(sql_stmnt!(
        SensorDataDao,
        r#"SELECT time, sensor_id, temperature
            FROM sensor_data
            WHERE sensor_id = $1
            AND time >= $2 AND time < $3
            ORDER BY time ASC"#,
        sensor_id,
        from,
        until
    )
    .fetch_all(conn)
    .await?)
}
