//! Sync HTTP endpoints.
//!
//! - GET /api/v1/sync/status: coordinator state as JSON
//! - POST /api/v1/sync: run a sync now and wait for it

use axum::extract::State;
use axum::Json;

use crate::errors::{AppError, ErrorResponse};
use crate::services::sync::{SyncCoordinator, SyncOutcome, SyncState};

/// Get the current sync status.
///
/// Returns the status (idle, syncing, or failed with a reason), the last
/// trigger, success and attempt timestamps, and counters.
#[utoipa::path(
    get,
    path = "/api/v1/sync/status",
    tag = "Sync",
    responses(
        (status = 200, description = "Current sync status", body = SyncState),
    )
)]
pub async fn get_sync_status(State(sync): State<SyncCoordinator>) -> Json<SyncState> {
    Json(sync.snapshot().await)
}

/// Refresh the forecast now.
///
/// Joins the running sync if there is one. Responds once the cycle finishes.
#[utoipa::path(
    post,
    path = "/api/v1/sync",
    tag = "Sync",
    responses(
        (status = 200, description = "Sync finished", body = SyncOutcome),
        (status = 500, description = "Local storage failed", body = ErrorResponse),
        (status = 502, description = "Provider unreachable or returned bad data", body = ErrorResponse),
    )
)]
pub async fn trigger_sync(
    State(sync): State<SyncCoordinator>,
) -> Result<Json<SyncOutcome>, AppError> {
    let outcome = sync.sync_now().await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::services::events::event_channel;
    use crate::services::fetcher::FetchError;
    use crate::services::sync::{SyncStatus, TriggerReason};
    use crate::settings::{Location, SettingsHandle, SyncSettings};
    use crate::test_support::{valid_payload, ScriptedFetcher};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Arc;
    use std::time::Duration;

    async fn coordinator(fetcher: Arc<ScriptedFetcher>) -> SyncCoordinator {
        let settings = SettingsHandle::new(SyncSettings {
            location: Location::parse("94043").unwrap(),
            refresh_interval: Duration::from_secs(3600),
            forecast_days: 14,
        });
        SyncCoordinator::new(connect_in_memory().await, fetcher, settings, event_channel())
    }

    #[tokio::test]
    async fn test_trigger_sync_returns_report() {
        let sync = coordinator(ScriptedFetcher::new(vec![Ok(valid_payload(6))])).await;

        let Json(outcome) = trigger_sync(State(sync.clone())).await.unwrap();
        let SyncOutcome::Committed(report) = outcome else {
            panic!("expected a committed cycle");
        };
        assert_eq!(report.records, 6);
        assert_eq!(report.trigger, TriggerReason::UserRequested);

        let Json(state) = get_sync_status(State(sync)).await;
        assert_eq!(state.status, SyncStatus::Idle);
        assert_eq!(state.total_syncs, 1);
        assert_eq!(state.location.as_deref(), Some("94043"));
    }

    #[tokio::test]
    async fn test_trigger_sync_network_failure_is_bad_gateway() {
        let sync = coordinator(ScriptedFetcher::new(vec![Err(FetchError::Status(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
        ))]))
        .await;

        let err = trigger_sync(State(sync.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

        let Json(state) = get_sync_status(State(sync)).await;
        assert!(matches!(state.status, SyncStatus::Failed { .. }));
    }

    #[test]
    fn test_status_serializes_with_reason() {
        let status = SyncStatus::Failed {
            reason: crate::errors::FailureReason::MalformedData,
            message: "bad".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "malformed_data");
    }
}
