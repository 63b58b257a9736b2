//! Fixtures shared by the unit tests: forecast records, provider payloads
//! and a scripted fetcher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::db::models::ForecastRecord;
use crate::services::fetcher::{FetchError, ForecastFetcher, RawPayload};
use crate::settings::Location;

pub fn record(date: NaiveDate, min: f64, max: f64) -> ForecastRecord {
    ForecastRecord {
        date,
        condition_id: 800,
        min_temp_c: min,
        max_temp_c: max,
        humidity_pct: 80.0,
        pressure_hpa: 1013.0,
        wind_speed: 3.5,
        wind_direction_deg: 220.0,
    }
}

/// `n` consecutive valid records starting at `start`.
pub fn days_from(start: NaiveDate, n: i64) -> Vec<ForecastRecord> {
    (0..n)
        .map(|i| record(start + Duration::days(i), 5.0 + i as f64, 15.0 + i as f64))
        .collect()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// One entry of the daily-forecast `list` array.
pub fn payload_day(date: NaiveDate, min: f64, max: f64) -> serde_json::Value {
    serde_json::json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "temp": { "min": min, "max": max },
        "pressure": 1015.2,
        "humidity": 72,
        "weather": [ { "id": 801, "main": "Clouds", "description": "few clouds" } ],
        "speed": 4.1,
        "deg": 250
    })
}

/// A well-formed payload with `n` days starting today.
pub fn valid_payload(n: i64) -> String {
    let start = today();
    let list: Vec<_> = (0..n)
        .map(|i| payload_day(start + Duration::days(i), 2.0 + i as f64, 9.0 + i as f64))
        .collect();
    serde_json::json!({ "cod": "200", "cnt": n, "list": list }).to_string()
}

/// Fetcher returning scripted results in order, recording each requested
/// location. When gated, every fetch waits for a permit from `release()`.
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<Result<String, FetchError>>>,
    calls: Mutex<Vec<String>>,
    started: AtomicUsize,
    gate: Option<Semaphore>,
}

impl ScriptedFetcher {
    pub fn new(responses: Vec<Result<String, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            gate: None,
        })
    }

    pub fn gated(responses: Vec<Result<String, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            gate: Some(Semaphore::new(0)),
        })
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of fetches that have entered `fetch` (including gated ones).
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self, n: usize) {
        while self.started() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl ForecastFetcher for ScriptedFetcher {
    async fn fetch(&self, location: &Location, _days: u32) -> Result<RawPayload, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.calls.lock().push(location.cache_key());
        let next = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(valid_payload(7)));
        next.map(|body| RawPayload {
            body,
            fetched_at: Utc::now(),
        })
    }
}
