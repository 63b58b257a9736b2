//! Daily forecast decoding and validation.
//!
//! Pure functions (no I/O). Input is the provider's daily-forecast JSON
//! (OpenWeatherMap `forecast/daily` shape):
//!
//! ```json
//! { "cod": "200", "list": [ { "dt": 1772323200, "temp": { "min": 2.1, "max": 9.4 },
//!   "pressure": 1015.2, "humidity": 72, "weather": [ { "id": 801 } ],
//!   "speed": 4.1, "deg": 250 } ] }
//! ```
//!
//! Each day may carry its date as a unix `dt` or an ISO `date` string. The
//! whole batch is rejected on the first invalid day; callers never see a
//! partially valid list.

use std::collections::HashSet;

use chrono::{DateTime, Days, NaiveDate};
use serde::Deserialize;

use crate::db::models::ForecastRecord;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid forecast data: {0}")]
    Validation(String),
}

/// Window of days to keep, starting at `today` (UTC).
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub today: NaiveDate,
    pub window_days: u32,
}

// --- provider JSON response types ---

#[derive(Debug, Deserialize)]
struct DailyResponse {
    list: Vec<DailyEntry>,
}

#[derive(Debug, Deserialize)]
struct DailyEntry {
    dt: Option<i64>,
    date: Option<String>,
    temp: DailyTemp,
    pressure: f64,
    humidity: f64,
    #[serde(default)]
    weather: Vec<DailyCondition>,
    speed: f64,
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct DailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct DailyCondition {
    id: i32,
}

/// Decode and validate a raw payload into records inside the window,
/// ascending by date.
pub fn parse(body: &str, options: &ParseOptions) -> Result<Vec<ForecastRecord>, ParseError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ParseError::Malformed(format!("not valid JSON: {}", e)))?;

    check_provider_code(&json)?;

    let response: DailyResponse = serde_json::from_value(json)
        .map_err(|e| ParseError::Malformed(format!("unexpected structure: {}", e)))?;

    // Saturates so an oversized window cannot overflow the calendar
    let window_end = options
        .today
        .checked_add_days(Days::new(u64::from(options.window_days)))
        .unwrap_or(NaiveDate::MAX);
    let mut seen = HashSet::with_capacity(response.list.len());
    let mut records = Vec::with_capacity(response.list.len());

    for (index, entry) in response.list.iter().enumerate() {
        let record = validate_entry(index, entry)?;

        if !seen.insert(record.date) {
            return Err(ParseError::Validation(format!(
                "day {}: duplicate date {}",
                index, record.date
            )));
        }

        if record.date >= options.today && record.date < window_end {
            records.push(record);
        }
    }

    if records.is_empty() {
        return Err(ParseError::Validation(format!(
            "no forecast days between {} and {}",
            options.today, window_end
        )));
    }

    records.sort_by_key(|r| r.date);
    Ok(records)
}

/// The provider reports lookup failures (unknown city, bad key) in the body
/// as a non-200 `cod`, sometimes as a string and sometimes as a number.
fn check_provider_code(json: &serde_json::Value) -> Result<(), ParseError> {
    let Some(cod) = json.get("cod") else {
        return Ok(());
    };

    let code = match cod {
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    };

    match code {
        Some(200) => Ok(()),
        _ => {
            let message = json
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("no message");
            Err(ParseError::Malformed(format!(
                "provider reported code {}: {}",
                cod, message
            )))
        }
    }
}

fn validate_entry(index: usize, entry: &DailyEntry) -> Result<ForecastRecord, ParseError> {
    let invalid = |msg: String| ParseError::Validation(format!("day {}: {}", index, msg));

    let date = entry_date(entry).ok_or_else(|| invalid("missing or unparseable date".into()))?;

    if entry.temp.min > entry.temp.max {
        return Err(invalid(format!(
            "min temperature {} above max {}",
            entry.temp.min, entry.temp.max
        )));
    }
    if !(0.0..=100.0).contains(&entry.humidity) {
        return Err(invalid(format!("humidity {} outside 0-100", entry.humidity)));
    }
    if entry.pressure <= 0.0 {
        return Err(invalid(format!("pressure {} not positive", entry.pressure)));
    }
    if entry.speed < 0.0 {
        return Err(invalid(format!("negative wind speed {}", entry.speed)));
    }
    if !(0.0..=360.0).contains(&entry.deg) {
        return Err(invalid(format!("wind direction {} outside 0-360", entry.deg)));
    }

    let condition_id = entry
        .weather
        .first()
        .map(|c| c.id)
        .ok_or_else(|| invalid("no weather condition".into()))?;

    Ok(ForecastRecord {
        date,
        condition_id,
        min_temp_c: entry.temp.min,
        max_temp_c: entry.temp.max,
        humidity_pct: entry.humidity,
        pressure_hpa: entry.pressure,
        wind_speed: entry.speed,
        wind_direction_deg: entry.deg,
    })
}

/// Calendar day in UTC. An explicit `date` string wins over `dt`.
fn entry_date(entry: &DailyEntry) -> Option<NaiveDate> {
    match (&entry.date, entry.dt) {
        (Some(s), _) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
        (None, Some(ts)) => DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()),
        (None, None) => None,
    }
}
