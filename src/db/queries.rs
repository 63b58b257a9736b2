use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::models::{Forecast, ForecastRecord, SyncMeta};

const FORECAST_COLUMNS: &str = "location, forecast_date, condition_id, min_temp_c, max_temp_c,
                                humidity_pct, pressure_hpa, wind_speed, wind_direction_deg, generation";

/// Atomically replace the cached forecast set.
///
/// Deletes every existing row (the cache holds one location at a time), inserts
/// `records` tagged with a fresh generation id, and rewrites the sync metadata,
/// all in one transaction. On any error the transaction is rolled back when
/// dropped and the previous generation stays visible.
pub async fn replace_all(
    pool: &SqlitePool,
    location: &str,
    records: &[ForecastRecord],
    synced_at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    stage_replace(pool, location, records, synced_at)
        .await?
        .commit()
        .await
}

/// A fully written replace that readers cannot see until [`commit`](Self::commit).
///
/// Holds the SQLite write lock; dropping it rolls back.
pub struct StagedReplace {
    tx: Transaction<'static, Sqlite>,
    pub generation: Uuid,
}

impl StagedReplace {
    pub async fn commit(self) -> Result<Uuid, sqlx::Error> {
        self.tx.commit().await?;
        Ok(self.generation)
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

/// Write a replace inside an open transaction without committing it.
///
/// The statements here are the ones that wait on the write lock, so callers
/// can re-check their preconditions after this returns and before committing.
pub async fn stage_replace(
    pool: &SqlitePool,
    location: &str,
    records: &[ForecastRecord],
    synced_at: DateTime<Utc>,
) -> Result<StagedReplace, sqlx::Error> {
    let generation = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM forecasts").execute(&mut *tx).await?;

    for record in records {
        sqlx::query(
            "INSERT INTO forecasts (
                location, forecast_date, condition_id, min_temp_c, max_temp_c,
                humidity_pct, pressure_hpa, wind_speed, wind_direction_deg, generation
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(location)
        .bind(record.date)
        .bind(record.condition_id)
        .bind(record.min_temp_c)
        .bind(record.max_temp_c)
        .bind(record.humidity_pct)
        .bind(record.pressure_hpa)
        .bind(record.wind_speed)
        .bind(record.wind_direction_deg)
        .bind(generation)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM sync_meta").execute(&mut *tx).await?;
    sqlx::query(
        "INSERT INTO sync_meta (location, generation, synced_at, record_count) VALUES (?, ?, ?, ?)",
    )
    .bind(location)
    .bind(generation)
    .bind(synced_at)
    .bind(records.len() as i64)
    .execute(&mut *tx)
    .await?;

    Ok(StagedReplace { tx, generation })
}

/// All forecasts for `location` on or after `start_date`, ascending by date.
pub async fn query_from(
    pool: &SqlitePool,
    location: &str,
    start_date: NaiveDate,
) -> Result<Vec<Forecast>, sqlx::Error> {
    sqlx::query_as::<_, Forecast>(&format!(
        "SELECT {FORECAST_COLUMNS}
         FROM forecasts
         WHERE location = ? AND forecast_date >= ?
         ORDER BY forecast_date ASC"
    ))
    .bind(location)
    .bind(start_date)
    .fetch_all(pool)
    .await
}

/// The forecast for a single date, if cached.
pub async fn query_by_date(
    pool: &SqlitePool,
    location: &str,
    date: NaiveDate,
) -> Result<Option<Forecast>, sqlx::Error> {
    sqlx::query_as::<_, Forecast>(&format!(
        "SELECT {FORECAST_COLUMNS}
         FROM forecasts
         WHERE location = ? AND forecast_date = ?"
    ))
    .bind(location)
    .bind(date)
    .fetch_optional(pool)
    .await
}

/// Whether nothing at all is cached for `location` (cold start).
pub async fn is_empty(pool: &SqlitePool, location: &str) -> Result<bool, sqlx::Error> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM forecasts WHERE location = ?)")
            .bind(location)
            .fetch_one(pool)
            .await?;
    Ok(!exists)
}

/// Number of cached days for `location` on or after `start_date`.
pub async fn count_from(
    pool: &SqlitePool,
    location: &str,
    start_date: NaiveDate,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM forecasts WHERE location = ? AND forecast_date >= ?")
        .bind(location)
        .bind(start_date)
        .fetch_one(pool)
        .await
}

/// Remove rows dated before `cutoff`. Returns the number of rows deleted.
pub async fn purge_before(
    pool: &SqlitePool,
    location: &str,
    cutoff: NaiveDate,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM forecasts WHERE location = ? AND forecast_date < ?")
        .bind(location)
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Metadata of the last committed replace for `location`.
pub async fn last_sync(pool: &SqlitePool, location: &str) -> Result<Option<SyncMeta>, sqlx::Error> {
    sqlx::query_as::<_, SyncMeta>(
        "SELECT location, generation, synced_at, record_count FROM sync_meta WHERE location = ?",
    )
    .bind(location)
    .fetch_optional(pool)
    .await
}
