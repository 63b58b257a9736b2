//! Read-only query interface for display collaborators.
//!
//! Reads never wait on the network: each read checks whether the cache is
//! due for a refresh, fires a trigger if so, and returns what is stored now.

use chrono::NaiveDate;

use crate::db::models::Forecast;
use crate::db::queries;
use crate::services::events::EventReceiver;
use crate::services::sync::{SyncCoordinator, SyncStatus};

/// Cached forecast for the configured location, with the sync status at read time.
#[derive(Debug, Clone)]
pub struct ForecastView {
    /// Cache key of the location the rows belong to.
    pub location: String,
    /// Rows from the requested start date onward.
    pub records: Vec<Forecast>,
    /// Nothing cached for the location at all, whatever the start date.
    pub cache_empty: bool,
    pub status: SyncStatus,
}

impl ForecastView {
    /// The cache is empty and the last sync failed.
    pub fn is_error_state(&self) -> bool {
        self.cache_empty && matches!(self.status, SyncStatus::Failed { .. })
    }

    /// Serving cached data while the last sync failed.
    pub fn is_stale(&self) -> bool {
        !self.cache_empty && matches!(self.status, SyncStatus::Failed { .. })
    }
}

#[derive(Clone)]
pub struct ForecastFacade {
    sync: SyncCoordinator,
}

impl ForecastFacade {
    pub fn new(sync: SyncCoordinator) -> Self {
        Self { sync }
    }

    /// All cached days from `start_date` onward, ascending.
    pub async fn forecast_from(&self, start_date: NaiveDate) -> Result<ForecastView, sqlx::Error> {
        self.trigger_if_due().await;

        let location = self.sync.settings().location().cache_key();
        let records = queries::query_from(self.sync.pool(), &location, start_date).await?;
        // A start date past the cached window filters everything out; that is not an empty cache
        let cache_empty =
            records.is_empty() && queries::is_empty(self.sync.pool(), &location).await?;
        let status = self.sync.status().await;

        Ok(ForecastView {
            location,
            records,
            cache_empty,
            status,
        })
    }

    pub async fn forecast_for(&self, date: NaiveDate) -> Result<Option<Forecast>, sqlx::Error> {
        self.trigger_if_due().await;

        let location = self.sync.settings().location().cache_key();
        queries::query_by_date(self.sync.pool(), &location, date).await
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sync.subscribe()
    }

    pub async fn status(&self) -> SyncStatus {
        self.sync.status().await
    }

    /// Fire-and-forget: the ticket is dropped, the cycle keeps running.
    async fn trigger_if_due(&self) {
        match self.sync.refresh_if_due().await {
            Ok(Some(_ticket)) => tracing::debug!("Read found cache due, sync triggered"),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to check cache freshness: {}", e),
        }
    }
}
