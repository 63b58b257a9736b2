use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// One day's normalized forecast, as produced by the parser and written by
/// `replace_all`. Carries no location or generation; those are assigned at commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    /// Calendar day in UTC.
    pub date: NaiveDate,
    /// OpenWeatherMap condition code (e.g. 800 = clear sky).
    pub condition_id: i32,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub wind_speed: f64,
    /// Meteorological bearing the wind blows from, 0–360.
    pub wind_direction_deg: f64,
}

/// A stored forecast row for the cached location.
#[derive(Debug, Clone, FromRow)]
pub struct Forecast {
    pub location: String,
    pub forecast_date: NaiveDate,
    pub condition_id: i32,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub wind_speed: f64,
    pub wind_direction_deg: f64,
    /// Shared by every row written in the same `replace_all`.
    pub generation: Uuid,
}

/// Bookkeeping for the last committed replace, used for staleness checks.
#[derive(Debug, Clone, FromRow)]
pub struct SyncMeta {
    pub location: String,
    pub generation: Uuid,
    pub synced_at: DateTime<Utc>,
    pub record_count: i64,
}
