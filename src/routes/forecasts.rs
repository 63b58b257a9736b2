//! Forecast HTTP endpoints.
//!
//! - GET /api/v1/forecasts?from=YYYY-MM-DD
//! - GET /api/v1/forecasts/:date
//! - GET /api/v1/forecasts/events (server-sent events)

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{NaiveDate, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::models;
use crate::errors::{AppError, ErrorResponse};
use crate::services::conditions::{self, ConditionIcon};
use crate::services::events::ForecastEvent;
use crate::services::facade::ForecastFacade;
use crate::services::sync::SyncStatus;

/// Keep-alive interval for the event stream.
const SSE_KEEP_ALIVE_SECS: u64 = 15;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForecastListQuery {
    /// First day to return (YYYY-MM-DD, UTC). Defaults to today.
    pub from: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One day of forecast, with presentation fields derived from the stored values.
#[derive(Debug, Serialize, ToSchema)]
pub struct DailyForecast {
    /// Calendar day (YYYY-MM-DD, UTC)
    pub date: String,
    /// OpenWeatherMap condition code
    pub condition_id: i32,
    /// Short condition text (e.g. "Few clouds")
    pub description: String,
    pub icon: ConditionIcon,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    /// Relative humidity in percent
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    /// Wind speed in metres per second
    pub wind_speed_ms: f64,
    /// Wind direction in degrees (0 = north, 90 = east)
    pub wind_direction_deg: f64,
    /// Eight-point compass direction (e.g. "SW")
    pub wind_compass: String,
    /// Generation of the replace that wrote this row
    pub generation: Uuid,
}

impl From<&models::Forecast> for DailyForecast {
    fn from(f: &models::Forecast) -> Self {
        Self {
            date: f.forecast_date.format("%Y-%m-%d").to_string(),
            condition_id: f.condition_id,
            description: conditions::description_for(f.condition_id).to_string(),
            icon: conditions::icon_for(f.condition_id),
            min_temp_c: f.min_temp_c,
            max_temp_c: f.max_temp_c,
            humidity_pct: f.humidity_pct,
            pressure_hpa: f.pressure_hpa,
            wind_speed_ms: f.wind_speed,
            wind_direction_deg: f.wind_direction_deg,
            wind_compass: conditions::compass_point(f.wind_direction_deg).to_string(),
            generation: f.generation,
        }
    }
}

/// Response for GET /api/v1/forecasts.
#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastListResponse {
    /// Location the days belong to
    pub location: String,
    /// True when serving cached data while the last sync failed
    pub stale: bool,
    /// Sync status at read time
    pub sync_status: SyncStatus,
    /// Days from the requested start date onward, ascending
    pub days: Vec<DailyForecast>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List cached forecast days from a start date onward.
///
/// Never waits for the provider. If the cache is due for a refresh a sync is
/// triggered in the background and the current contents are returned. Returns
/// 503 only when nothing is cached for the location and the last sync failed.
/// A start date past the cached window gives an empty list, not an error.
#[utoipa::path(
    get,
    path = "/api/v1/forecasts",
    tag = "Forecasts",
    params(ForecastListQuery),
    responses(
        (status = 200, description = "Cached forecast days", body = ForecastListResponse,
         headers(
             ("X-Forecast-Stale" = String, description = "Set to 'true' when serving cached data because the last sync failed")
         )),
        (status = 400, description = "Invalid date format", body = ErrorResponse),
        (status = 503, description = "Nothing cached and the last sync failed", body = ErrorResponse),
    )
)]
pub async fn list_forecasts(
    State(facade): State<ForecastFacade>,
    Query(params): Query<ForecastListQuery>,
) -> Result<(HeaderMap, Json<ForecastListResponse>), AppError> {
    let from = match params.from.as_deref() {
        Some(s) => parse_date(s)?,
        None => Utc::now().date_naive(),
    };

    let view = facade.forecast_from(from).await?;

    if view.is_error_state() {
        let message = match &view.status {
            SyncStatus::Failed { message, .. } => message.clone(),
            _ => "no forecast available".to_string(),
        };
        return Err(AppError::Unavailable(format!(
            "No forecast cached for {}: {}",
            view.location, message
        )));
    }

    let stale = view.is_stale();
    let mut headers = HeaderMap::new();
    if stale {
        headers.insert("X-Forecast-Stale", HeaderValue::from_static("true"));
    }

    let response = ForecastListResponse {
        location: view.location,
        stale,
        sync_status: view.status,
        days: view.records.iter().map(DailyForecast::from).collect(),
    };

    Ok((headers, Json(response)))
}

/// Get the cached forecast for a single day.
#[utoipa::path(
    get,
    path = "/api/v1/forecasts/{date}",
    tag = "Forecasts",
    params(
        ("date" = String, Path, description = "Calendar day (YYYY-MM-DD)"),
    ),
    responses(
        (status = 200, description = "Forecast for the day", body = DailyForecast),
        (status = 400, description = "Invalid date format", body = ErrorResponse),
        (status = 404, description = "No forecast cached for that day", body = ErrorResponse),
    )
)]
pub async fn get_forecast_for_date(
    State(facade): State<ForecastFacade>,
    Path(date): Path<String>,
) -> Result<Json<DailyForecast>, AppError> {
    let date = parse_date(&date)?;

    let forecast = facade
        .forecast_for(date)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No forecast cached for {}", date)))?;

    Ok(Json(DailyForecast::from(&forecast)))
}

/// Stream forecast change notifications.
///
/// Emits a `forecast_updated` event each time a new forecast generation is
/// committed. Clients re-read `/api/v1/forecasts` on each event.
#[utoipa::path(
    get,
    path = "/api/v1/forecasts/events",
    tag = "Forecasts",
    responses(
        (status = 200, description = "text/event-stream of forecast_updated events",
         body = ForecastEvent, content_type = "text/event-stream"),
    )
)]
pub async fn forecast_events(
    State(facade): State<ForecastFacade>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = facade.subscribe();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event("forecast_updated").json_data(&event) {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(e) => tracing::warn!("Failed to encode forecast event: {}", e),
                },
                // Only the latest generation matters to a client
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream lagged, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS)))
}

fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| AppError::BadRequest(format!("Invalid date '{}': {}", s, e)))
}
