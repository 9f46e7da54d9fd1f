use super::CountRecord;
use crate::error::PersistenceError;
use fastscale_core::Sensor;
use sqlx::{PgConnection, PgPool};

#[cfg(test)]
#[derive(sqlx::FromRow, Debug)]
pub struct SensorDao {
    pub(crate) id: i32,
    pub(crate) name: Option<String>,
    pub(crate) location: Option<String>,
}

#[cfg(test)]
impl SensorDao {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

pub async fn create_table(conn: &PgPool) -> Result<(), PersistenceError> {
    sql_stmnt!(
        r#"CREATE TABLE IF NOT EXISTS sensors (
            id SERIAL PRIMARY KEY,
            name TEXT,
            location TEXT
        )"#
    )
    .execute(conn)
    .await?;
    Ok(())
}

/// CREATE sensor, an explicit id is kept and never overwritten
///
/// After an explicit id the serial sequence is moved past the highest id,
/// so later inserts without an id don't collide.
pub async fn insert(conn: &mut PgConnection, sensor: &Sensor) -> Result<u64, PersistenceError> {
    let result = match sensor.id {
        Some(id) => {
            let result = sql_stmnt!(
                "INSERT INTO sensors (id, name, location) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO NOTHING",
                id,
                &sensor.name,
                &sensor.location
            )
            .execute(&mut *conn)
            .await?;
            sql_stmnt!(
                "SELECT setval(pg_get_serial_sequence('sensors', 'id'), \
                 GREATEST((SELECT MAX(id) FROM sensors), 1))"
            )
            .execute(&mut *conn)
            .await?;
            result
        }
        None => {
            sql_stmnt!(
                "INSERT INTO sensors (name, location) VALUES ($1, $2)",
                &sensor.name,
                &sensor.location
            )
            .execute(&mut *conn)
            .await?
        }
    };
    Ok(result.rows_affected())
}

/// READ sensors
#[cfg(test)]
pub async fn read(conn: &PgPool) -> Result<Vec<SensorDao>, PersistenceError> {
    Ok(
        sql_stmnt!(SensorDao, "SELECT id, name, location FROM sensors ORDER BY id")
            .fetch_all(conn)
            .await?,
    )
}

pub async fn count(conn: &PgPool) -> Result<i64, PersistenceError> {
    let rows = sql_stmnt!(CountRecord, "SELECT count(*) as count FROM sensors")
        .fetch_one(conn)
        .await?;
    Ok(rows.count())
}
