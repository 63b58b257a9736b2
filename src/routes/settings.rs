//! Settings HTTP endpoints.
//!
//! - GET /api/v1/settings
//! - PUT /api/v1/settings/location
//!
//! Editing the location here is picked up by the scheduler, which triggers
//! a sync for the new location.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::services::sync::SyncCoordinator;
use crate::settings::{Location, SyncSettings};

#[derive(Debug, Serialize, ToSchema)]
pub struct SettingsResponse {
    pub location: Location,
    /// Key the cache is scoped by
    pub cache_key: String,
    /// Seconds after a successful sync before the cache counts as stale
    pub refresh_interval_secs: u64,
    /// Forecast window length in days
    pub forecast_days: u32,
}

impl From<SyncSettings> for SettingsResponse {
    fn from(s: SyncSettings) -> Self {
        Self {
            cache_key: s.location.cache_key(),
            location: s.location,
            refresh_interval_secs: s.refresh_interval.as_secs(),
            forecast_days: s.forecast_days,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLocationRequest {
    /// Postal code, city name, or "lat,lon"
    pub location: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateLocationResponse {
    /// False when the location was already configured
    pub changed: bool,
    pub settings: SettingsResponse,
}

#[utoipa::path(
    get,
    path = "/api/v1/settings",
    tag = "Settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse),
    )
)]
pub async fn get_settings(State(sync): State<SyncCoordinator>) -> Json<SettingsResponse> {
    Json(sync.settings().current().into())
}

/// Change the forecast location.
///
/// The cache is replaced on the next sync, which starts in the background.
#[utoipa::path(
    put,
    path = "/api/v1/settings/location",
    tag = "Settings",
    request_body = UpdateLocationRequest,
    responses(
        (status = 200, description = "Location updated", body = UpdateLocationResponse),
        (status = 400, description = "Empty location or coordinates out of range", body = ErrorResponse),
    )
)]
pub async fn update_location(
    State(sync): State<SyncCoordinator>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<UpdateLocationResponse>, AppError> {
    let location = Location::parse(&request.location)
        .map_err(|e| AppError::BadRequest(format!("Invalid location: {}", e)))?;

    let changed = sync.settings().set_location(location);
    if changed {
        tracing::info!("Settings: location set to {}", sync.settings().location());
    }

    Ok(Json(UpdateLocationResponse {
        changed,
        settings: sync.settings().current().into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::services::events::event_channel;
    use crate::settings::SettingsHandle;
    use crate::test_support::ScriptedFetcher;
    use std::time::Duration;

    async fn coordinator() -> SyncCoordinator {
        let settings = SettingsHandle::new(SyncSettings {
            location: Location::parse("94043").unwrap(),
            refresh_interval: Duration::from_secs(10800),
            forecast_days: 14,
        });
        SyncCoordinator::new(
            connect_in_memory().await,
            ScriptedFetcher::new(vec![]),
            settings,
            event_channel(),
        )
    }

    #[tokio::test]
    async fn test_get_settings() {
        let Json(settings) = get_settings(State(coordinator().await)).await;
        assert_eq!(settings.cache_key, "94043");
        assert_eq!(settings.refresh_interval_secs, 10800);
        assert_eq!(settings.forecast_days, 14);
    }

    #[tokio::test]
    async fn test_update_location_to_coordinates() {
        let sync = coordinator().await;
        let mut rx = sync.settings().subscribe();

        let Json(resp) = update_location(
            State(sync.clone()),
            Json(UpdateLocationRequest {
                location: "47.3769, 8.5417".to_string(),
            }),
        )
        .await
        .unwrap();

        assert!(resp.changed);
        assert_eq!(resp.settings.cache_key, "47.3769,8.5417");
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_update_location_same_value_unchanged() {
        let sync = coordinator().await;
        let Json(resp) = update_location(
            State(sync),
            Json(UpdateLocationRequest {
                location: "94043".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!resp.changed);
    }

    #[tokio::test]
    async fn test_update_location_rejects_empty() {
        let err = update_location(
            State(coordinator().await),
            Json(UpdateLocationRequest {
                location: "  ".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
