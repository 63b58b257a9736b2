//! GET /api/v1/health
//!
//! Reports whether the forecast cache database answers, and how many days
//! it currently holds. The background sync is not consulted; use
//! `/api/v1/sync/status` for that.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the cache database cannot be read
    pub status: String,
    pub version: String,
    /// Whether the cache database answered
    pub database: bool,
    /// Forecast days in the cache, absent when the database did not answer
    pub cached_days: Option<i64>,
}

/// Cache health.
///
/// Counts the cached forecast rows. A failed count still answers 200 with
/// status "degraded"; an empty cache is healthy.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Cache database status", body = HealthResponse),
    )
)]
pub async fn health_check(State(pool): State<SqlitePool>) -> Json<HealthResponse> {
    let cached_days = match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM forecasts")
        .fetch_one(&pool)
        .await
    {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!("Health: cache database unreachable: {}", e);
            None
        }
    };
    let db_ok = cached_days.is_some();

    Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_ok,
        cached_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, queries};
    use crate::test_support::{days_from, today};
    use chrono::Utc;

    #[tokio::test]
    async fn test_health_ok_on_empty_cache() {
        let Json(resp) = health_check(State(connect_in_memory().await)).await;
        assert_eq!(resp.status, "ok");
        assert!(resp.database);
        assert_eq!(resp.cached_days, Some(0));
    }

    #[tokio::test]
    async fn test_health_counts_cached_days() {
        let pool = connect_in_memory().await;
        queries::replace_all(&pool, "94043", &days_from(today(), 5), Utc::now())
            .await
            .unwrap();

        let Json(resp) = health_check(State(pool)).await;
        assert_eq!(resp.cached_days, Some(5));
    }

    #[tokio::test]
    async fn test_health_degraded_when_pool_closed() {
        let pool = connect_in_memory().await;
        pool.close().await;
        let Json(resp) = health_check(State(pool)).await;
        assert_eq!(resp.status, "degraded");
        assert!(!resp.database);
        assert!(resp.cached_days.is_none());
    }
}
