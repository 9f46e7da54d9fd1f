use crate::error::PersistenceError;
use fastscale_core::EnviroSensor;
use sqlx::{PgConnection, PgPool};

#[cfg(test)]
#[derive(sqlx::FromRow, Debug)]
pub struct EnviroSensorDao {
    pub(crate) uid: String,
    pub(crate) nickname: String,
    pub(crate) model: String,
    pub(crate) location: Option<String>,
}

#[cfg(test)]
impl From<EnviroSensorDao> for EnviroSensor {
    fn from(val: EnviroSensorDao) -> Self {
        EnviroSensor {
            uid: val.uid,
            nickname: val.nickname,
            model: val.model,
            location: val.location,
        }
    }
}

pub async fn create_table(conn: &PgPool) -> Result<(), PersistenceError> {
    sql_stmnt!(
        r#"CREATE TABLE IF NOT EXISTS enviro_sensors (
            uid VARCHAR(16) PRIMARY KEY,
            nickname TEXT NOT NULL,
            model TEXT NOT NULL,
            location TEXT
        )"#
    )
    .execute(conn)
    .await?;
    Ok(())
}

/// Inserts the device unless its uid is already taken
///
/// Returns 1 if the row got created, 0 if it existed before
pub async fn insert(
    conn: &mut PgConnection,
    sensor: &EnviroSensor,
) -> Result<u64, PersistenceError> {
    let result = sql_stmnt!(
        r#"INSERT INTO enviro_sensors (uid, nickname, model, location)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (uid) DO NOTHING"#,
        &sensor.uid,
        &sensor.nickname,
        &sensor.model,
        &sensor.location
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// READ all device uids
pub async fn read_uids(conn: &PgPool) -> Result<Vec<String>, PersistenceError> {
    Ok(
        sqlx::query_scalar::<_, String>("SELECT uid FROM enviro_sensors ORDER BY uid")
            .fetch_all(conn)
            .await?,
    )
}

#[cfg(test)]
pub async fn get(
    conn: &PgPool,
    uid: &str,
) -> Result<Option<EnviroSensorDao>, PersistenceError> {
    Ok(sql_stmnt!(
        EnviroSensorDao,
        "SELECT uid, nickname, model, location FROM enviro_sensors WHERE uid = $1",
        uid
    )
    .fetch_optional(conn)
    .await?)
}
