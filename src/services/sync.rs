//! Sync coordinator: the only writer of the forecast cache.
//!
//! One cycle is `fetch → parse → replace_all`. Cycles are single-flight: a
//! trigger while a cycle is running returns the in-flight [`SyncTicket`]
//! instead of starting another, so overlapping replaces can never interleave.
//!
//! The target location is captured when a cycle starts. If the configured
//! location has moved on by commit time the result is discarded, and before
//! releasing the single-flight slot the coordinator re-checks the location
//! and chains a fresh cycle, so a location change coalesced into a running
//! cycle is never lost.
//!
//! There is no retry loop: each trigger is one attempt. Failures leave the
//! store untouched and are reported through [`SyncStatus::Failed`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::{FailureReason, SyncError};
use crate::services::events::{EventReceiver, EventSender, ForecastEvent};
use crate::services::fetcher::ForecastFetcher;
use crate::services::parser::{self, ParseOptions};
use crate::settings::{Location, SettingsHandle};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum follow-up cycles chained after a location change within one ticket.
const MAX_CHAINED_CYCLES: u32 = 3;

/// After a failure, due-ness checks (reads, periodic ticks) wait this long
/// before asking for another attempt. Explicit triggers are never delayed.
const FAILURE_BACKOFF_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Status types
// ---------------------------------------------------------------------------

/// Why a cycle was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Nothing cached for the configured location.
    ColdStart,
    /// Last successful sync is older than the refresh interval, or every
    /// cached day is in the past.
    Stale,
    /// Explicit "sync now".
    UserRequested,
    /// The configured location changed.
    LocationChanged,
    /// The scheduler tick found the cache due.
    Periodic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Failed {
        reason: FailureReason,
        message: String,
    },
}

/// Coordinator state, exposed via the status endpoint.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SyncState {
    pub status: SyncStatus,
    /// Cache key of the location of the current or last cycle.
    pub location: Option<String>,
    pub last_trigger: Option<TriggerReason>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_generation: Option<Uuid>,
    pub total_syncs: u64,
    pub total_failures: u64,
    /// Results dropped because the location changed before commit.
    pub discarded_results: u64,
    /// Triggers that joined an already running cycle.
    pub coalesced_triggers: u64,
}

/// A committed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SyncReport {
    pub location: String,
    pub generation: Uuid,
    pub records: usize,
    pub synced_at: DateTime<Utc>,
    pub trigger: TriggerReason,
}

/// Final result of a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Committed(SyncReport),
    /// The location kept changing; the last fetched result was dropped.
    Superseded { location: String },
}

/// Handle on an in-flight cycle. Cloneable; every clone resolves to the same result.
pub type SyncTicket = Shared<BoxFuture<'static, Result<SyncOutcome, SyncError>>>;

enum CycleOutcome {
    Committed(SyncReport),
    Superseded,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    pool: SqlitePool,
    fetcher: Arc<dyn ForecastFetcher>,
    settings: SettingsHandle,
    events: EventSender,
    state: RwLock<SyncState>,
    coalesced: AtomicU64,
    in_flight: Mutex<Option<SyncTicket>>,
}

impl SyncCoordinator {
    pub fn new(
        pool: SqlitePool,
        fetcher: Arc<dyn ForecastFetcher>,
        settings: SettingsHandle,
        events: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                pool,
                fetcher,
                settings,
                events,
                state: RwLock::new(SyncState::default()),
                coalesced: AtomicU64::new(0),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.inner.settings
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    pub async fn status(&self) -> SyncStatus {
        self.inner.state.read().await.status.clone()
    }

    pub async fn snapshot(&self) -> SyncState {
        let mut state = self.inner.state.read().await.clone();
        state.coalesced_triggers = self.inner.coalesced.load(Ordering::Relaxed);
        state
    }

    /// Start a cycle, or join the one already running.
    ///
    /// Never blocks: the cycle runs on a spawned task and the returned ticket
    /// may be awaited or dropped.
    pub fn trigger(&self, reason: TriggerReason) -> SyncTicket {
        let mut slot = self.inner.in_flight.lock();
        if let Some(ticket) = slot.as_ref() {
            self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Sync: {:?} trigger coalesced into in-flight cycle", reason);
            return ticket.clone();
        }

        let ticket = self.clone().run(reason).boxed().shared();
        *slot = Some(ticket.clone());
        drop(slot);

        tokio::spawn(ticket.clone());
        ticket
    }

    /// User-initiated refresh; waits for the (possibly shared) cycle to finish.
    pub async fn sync_now(&self) -> Result<SyncOutcome, SyncError> {
        self.trigger(TriggerReason::UserRequested).await
    }

    /// Whether the cache for the configured location needs a refresh.
    pub async fn refresh_due(&self) -> Result<Option<TriggerReason>, sqlx::Error> {
        let settings = self.inner.settings.current();
        let key = settings.location.cache_key();
        let pool = &self.inner.pool;
        let now = Utc::now();

        {
            let state = self.inner.state.read().await;
            if let (SyncStatus::Failed { .. }, Some(attempt)) = (&state.status, state.last_attempt_at)
            {
                if now - attempt < Duration::seconds(FAILURE_BACKOFF_SECS) {
                    return Ok(None);
                }
            }
        }

        if queries::is_empty(pool, &key).await? {
            return Ok(Some(TriggerReason::ColdStart));
        }

        if queries::count_from(pool, &key, now.date_naive()).await? == 0 {
            return Ok(Some(TriggerReason::Stale));
        }

        let interval =
            Duration::from_std(settings.refresh_interval).unwrap_or_else(|_| Duration::days(365));
        match queries::last_sync(pool, &key).await? {
            Some(meta) if now - meta.synced_at <= interval => Ok(None),
            _ => Ok(Some(TriggerReason::Stale)),
        }
    }

    /// Trigger a cycle if one is due. Returns the ticket when triggered.
    pub async fn refresh_if_due(&self) -> Result<Option<SyncTicket>, sqlx::Error> {
        Ok(self.refresh_due().await?.map(|reason| self.trigger(reason)))
    }

    async fn run(self, first_reason: TriggerReason) -> Result<SyncOutcome, SyncError> {
        let mut reason = first_reason;
        let mut chained = 0;

        loop {
            let target = self.inner.settings.location();
            self.begin_attempt(&target, reason).await;

            let result = self.run_cycle(&target, reason).await;

            let superseded = matches!(result, Ok(CycleOutcome::Superseded));
            let will_chain = chained < MAX_CHAINED_CYCLES
                && (superseded || self.inner.settings.location() != target);

            let outcome = self.finish_attempt(&target, result, will_chain).await;

            {
                let mut slot = self.inner.in_flight.lock();
                let moved = self.inner.settings.location() != target;
                if !(will_chain || (moved && chained < MAX_CHAINED_CYCLES)) {
                    *slot = None;
                    return outcome;
                }
            }

            chained += 1;
            reason = TriggerReason::LocationChanged;
            tracing::info!(
                "Sync: location changed during cycle for {}, starting follow-up cycle {}/{}",
                target,
                chained,
                MAX_CHAINED_CYCLES
            );
        }
    }

    async fn run_cycle(
        &self,
        target: &Location,
        reason: TriggerReason,
    ) -> Result<CycleOutcome, SyncError> {
        let settings = self.inner.settings.current();

        let payload = self
            .inner
            .fetcher
            .fetch(target, settings.forecast_days)
            .await?;
        tracing::debug!(
            "Sync: fetched {} bytes for {} at {}",
            payload.body.len(),
            target,
            payload.fetched_at
        );

        let options = ParseOptions {
            today: Utc::now().date_naive(),
            window_days: settings.forecast_days,
        };
        let records = parser::parse(&payload.body, &options)?;

        if self.inner.settings.location() != *target {
            tracing::info!(
                "Sync: discarding {} days fetched for {}, location changed",
                records.len(),
                target
            );
            return Ok(CycleOutcome::Superseded);
        }

        let location = target.cache_key();
        let synced_at = Utc::now();
        let staged =
            queries::stage_replace(&self.inner.pool, &location, &records, synced_at).await?;

        // Staging may have waited on the write lock; the location can have moved meanwhile
        if self.inner.settings.location() != *target {
            tracing::info!(
                "Sync: rolling back {} days staged for {}, location changed",
                records.len(),
                target
            );
            staged.rollback().await?;
            return Ok(CycleOutcome::Superseded);
        }

        let generation = staged.commit().await?;

        Ok(CycleOutcome::Committed(SyncReport {
            location,
            generation,
            records: records.len(),
            synced_at,
            trigger: reason,
        }))
    }

    async fn begin_attempt(&self, target: &Location, reason: TriggerReason) {
        tracing::info!("Sync: starting {:?} cycle for {}", reason, target);
        let mut s = self.inner.state.write().await;
        s.status = SyncStatus::Syncing;
        s.location = Some(target.cache_key());
        s.last_trigger = Some(reason);
        s.last_attempt_at = Some(Utc::now());
    }

    /// Record the cycle result in the shared state and emit the change event.
    /// When another cycle follows, the status stays `Syncing`.
    async fn finish_attempt(
        &self,
        target: &Location,
        result: Result<CycleOutcome, SyncError>,
        will_chain: bool,
    ) -> Result<SyncOutcome, SyncError> {
        match result {
            Ok(CycleOutcome::Committed(report)) => {
                {
                    let mut s = self.inner.state.write().await;
                    if !will_chain {
                        s.status = SyncStatus::Idle;
                    }
                    s.last_success_at = Some(report.synced_at);
                    s.last_generation = Some(report.generation);
                    s.total_syncs += 1;
                }

                tracing::info!(
                    "Sync: committed {} days for {} (generation {})",
                    report.records,
                    report.location,
                    report.generation
                );

                // Readers are scoped to the configured location; nothing to announce otherwise
                if self.inner.settings.location().cache_key() == report.location {
                    // No subscribers is not an error
                    let _ = self.inner.events.send(ForecastEvent::Updated {
                        location: report.location.clone(),
                        generation: report.generation,
                        records: report.records,
                        synced_at: report.synced_at,
                    });
                }

                Ok(SyncOutcome::Committed(report))
            }
            Ok(CycleOutcome::Superseded) => {
                let mut s = self.inner.state.write().await;
                s.discarded_results += 1;
                if !will_chain {
                    tracing::warn!(
                        "Sync: giving up on follow-up cycles after {} location changes",
                        MAX_CHAINED_CYCLES
                    );
                    s.status = SyncStatus::Idle;
                }
                Ok(SyncOutcome::Superseded {
                    location: target.cache_key(),
                })
            }
            Err(err) => {
                match err.reason() {
                    FailureReason::Storage => {
                        tracing::error!("Sync: cycle for {} failed: {}", target, err)
                    }
                    _ => tracing::warn!("Sync: cycle for {} failed: {}", target, err),
                }

                let mut s = self.inner.state.write().await;
                s.total_failures += 1;
                if !will_chain {
                    s.status = SyncStatus::Failed {
                        reason: err.reason(),
                        message: err.to_string(),
                    };
                }
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
