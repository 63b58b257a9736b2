use std::time::Duration;

use crate::settings::{Location, SyncSettings};

/// OpenWeatherMap daily forecast endpoint. `{query}` and `{days}` are expanded
/// per request; set `FORECAST_URL_TEMPLATE` to add an `appid` or point elsewhere.
const DEFAULT_FORECAST_URL_TEMPLATE: &str =
    "https://api.openweathermap.org/data/2.5/forecast/daily?{query}&mode=json&units=metric&cnt={days}";

/// Largest window the daily endpoint serves.
const MAX_FORECAST_DAYS: u32 = 16;

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub forecast_url_template: String,
    pub user_agent: String,
    /// Initial location; later edits go through the settings routes.
    pub location: Location,
    /// A successful sync older than this makes the cache stale.
    pub refresh_interval: Duration,
    /// How often the scheduler checks whether a sync is due.
    pub sync_check_interval: Duration,
    pub forecast_days: u32,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://weather-cache.db".to_string()),
            port: env_or("PORT", "8080")
                .parse()
                .expect("PORT must be a valid u16"),
            forecast_url_template: std::env::var("FORECAST_URL_TEMPLATE")
                .unwrap_or_else(|_| DEFAULT_FORECAST_URL_TEMPLATE.to_string()),
            user_agent: std::env::var("WEATHER_USER_AGENT")
                .unwrap_or_else(|_| format!("weather-cache/{}", env!("CARGO_PKG_VERSION"))),
            location: Location::parse(&env_or("WEATHER_LOCATION", "94043"))
                .expect("WEATHER_LOCATION must be a query or \"lat,lon\""),
            refresh_interval: Duration::from_secs(
                env_or("REFRESH_INTERVAL_SECS", "10800")
                    .parse()
                    .expect("REFRESH_INTERVAL_SECS must be a number of seconds"),
            ),
            sync_check_interval: Duration::from_secs(
                env_or("SYNC_CHECK_INTERVAL_SECS", "900")
                    .parse()
                    .expect("SYNC_CHECK_INTERVAL_SECS must be a number of seconds"),
            ),
            forecast_days: parse_forecast_days(&env_or("FORECAST_DAYS", "14"))
                .expect("FORECAST_DAYS must be a valid window"),
            http_timeout: Duration::from_secs(
                env_or("HTTP_TIMEOUT_SECS", "10")
                    .parse()
                    .expect("HTTP_TIMEOUT_SECS must be a number of seconds"),
            ),
        }
    }

    /// Initial runtime settings for the sync core.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            location: self.location.clone(),
            refresh_interval: self.refresh_interval,
            forecast_days: self.forecast_days,
        }
    }
}

fn parse_forecast_days(value: &str) -> Result<u32, String> {
    let days: u32 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{}' is not a number of days: {}", value, e))?;
    if !(1..=MAX_FORECAST_DAYS).contains(&days) {
        return Err(format!("{} outside 1-{}", days, MAX_FORECAST_DAYS));
    }
    Ok(days)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
