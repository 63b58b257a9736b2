use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::fetcher::FetchError;
use crate::services::parser::ParseError;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Sync(err) => match err.reason() {
                FailureReason::Storage => {
                    tracing::error!("Sync storage failure: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
                _ => (StatusCode::BAD_GATEWAY, err.to_string()),
            },
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

/// Category of a failed sync cycle, reported in the sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Connectivity failure, timeout or non-success HTTP status.
    Network,
    /// Payload could not be decoded.
    MalformedData,
    /// Payload decoded but failed a validation rule.
    Validation,
    /// Local storage failed; the cache itself may be impaired.
    Storage,
}

/// Failure of one fetch → parse → replace cycle.
///
/// `Clone` so that a single in-flight cycle can hand the same error to every
/// coalesced waiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn reason(&self) -> FailureReason {
        match self {
            SyncError::Network(_) => FailureReason::Network,
            SyncError::MalformedData(_) => FailureReason::MalformedData,
            SyncError::Validation(_) => FailureReason::Validation,
            SyncError::Storage(_) => FailureReason::Storage,
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<ParseError> for SyncError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Malformed(msg) => SyncError::MalformedData(msg),
            ParseError::Validation(msg) => SyncError::Validation(msg),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}
