//! Runtime preferences consumed by the sync core.
//!
//! Seeded from [`AppConfig`](crate::config::AppConfig) at startup and edited
//! through the settings routes. Readers take cheap snapshots; writers publish
//! through a `watch` channel so the scheduler can react to location changes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use utoipa::ToSchema;

/// Where the forecast is for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    /// Free-form provider query: postal code, city name, ...
    Query { query: String },
    /// WGS84 coordinates.
    Coordinates { latitude: f64, longitude: f64 },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LocationError {
    #[error("location must not be empty")]
    Empty,
    #[error("coordinates out of range: {0}")]
    OutOfRange(String),
}

impl Location {
    /// Parse user input. `"lat,lon"` with two numbers becomes coordinates,
    /// anything else is treated as a query string.
    pub fn parse(input: &str) -> Result<Self, LocationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(LocationError::Empty);
        }

        if let Some((lat, lon)) = trimmed.split_once(',') {
            if let (Ok(latitude), Ok(longitude)) =
                (lat.trim().parse::<f64>(), lon.trim().parse::<f64>())
            {
                return Self::coordinates(latitude, longitude);
            }
        }

        Ok(Self::Query {
            query: trimmed.to_string(),
        })
    }

    pub fn coordinates(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationError::OutOfRange(format!("latitude {}", latitude)));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::OutOfRange(format!("longitude {}", longitude)));
        }
        Ok(Self::Coordinates {
            latitude,
            longitude,
        })
    }

    /// Key the store scopes rows by. Coordinates are limited to 4 decimal
    /// places, matching the precision sent to the provider.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Query { query } => query.clone(),
            Self::Coordinates {
                latitude,
                longitude,
            } => format!("{:.4},{:.4}", latitude, longitude),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Snapshot of everything the sync core reads from preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub location: Location,
    /// A successful sync older than this makes the cache stale.
    pub refresh_interval: Duration,
    /// Forecast window length in days, starting today.
    pub forecast_days: u32,
}

/// Shared, observable settings.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: Arc<watch::Sender<SyncSettings>>,
}

impl SettingsHandle {
    pub fn new(initial: SyncSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> SyncSettings {
        self.tx.borrow().clone()
    }

    pub fn location(&self) -> Location {
        self.tx.borrow().location.clone()
    }

    /// Update the configured location. Returns `true` if it actually changed;
    /// subscribers are only notified in that case.
    pub fn set_location(&self, location: Location) -> bool {
        self.tx.send_if_modified(|s| {
            if s.location == location {
                false
            } else {
                s.location = location;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSettings> {
        self.tx.subscribe()
    }
}
