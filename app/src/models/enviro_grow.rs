use crate::error::PersistenceError;
#[cfg(test)]
use chrono::{DateTime, Utc};
use fastscale_core::EnviroGrowReading;
use sqlx::{PgConnection, PgPool};

pub const TABLE: &str = "enviro_grow";

#[cfg(test)]
#[derive(sqlx::FromRow, Debug)]
pub struct EnviroGrowDao {
    pub(crate) nickname: String,
    pub(crate) uid: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) temperature: Option<f64>,
    pub(crate) humidity: Option<f64>,
    pub(crate) pressure: Option<f64>,
    pub(crate) luminance: Option<f64>,
    pub(crate) moisture_a: Option<f64>,
    pub(crate) moisture_b: Option<f64>,
    pub(crate) moisture_c: Option<f64>,
    pub(crate) voltage: Option<f64>,
}

pub async fn create_table(conn: &PgPool) -> Result<(), PersistenceError> {
    sql_stmnt!(
        r#"CREATE TABLE IF NOT EXISTS enviro_grow (
            nickname TEXT NOT NULL,
            uid TEXT NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            temperature DOUBLE PRECISION,
            humidity DOUBLE PRECISION,
            pressure DOUBLE PRECISION,
            luminance DOUBLE PRECISION,
            moisture_a DOUBLE PRECISION,
            moisture_b DOUBLE PRECISION,
            moisture_c DOUBLE PRECISION,
            voltage DOUBLE PRECISION,
            FOREIGN KEY (uid) REFERENCES enviro_sensors (uid)
        )"#
    )
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert(
    conn: &mut PgConnection,
    reading: &EnviroGrowReading,
) -> Result<u64, PersistenceError> {
    let result = sql_stmnt!(
        r#"INSERT INTO enviro_grow
            (nickname, uid, timestamp, temperature, humidity, pressure, luminance,
             moisture_a, moisture_b, moisture_c, voltage)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        &reading.nickname,
        &reading.uid,
        reading.timestamp,
        reading.temperature,
        reading.humidity,
        reading.pressure,
        reading.luminance,
        reading.moisture_a,
        reading.moisture_b,
        reading.moisture_c,
        reading.voltage
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

// READ enviro_grow
#[cfg(test)]
pub async fn get_by_uid(
    conn: &PgPool,
    uid: &str,
) -> Result<Vec<EnviroGrowDao>, PersistenceError> {
    Ok(sql_stmnt!(
        EnviroGrowDao,
        r#"SELECT nickname, uid, timestamp, temperature, humidity, pressure, luminance,
                moisture_a, moisture_b, moisture_c, voltage
            FROM enviro_grow
            WHERE uid = $1
            ORDER BY timestamp ASC"#,
        uid
    )
    .fetch_all(conn)
    .await?)
}
