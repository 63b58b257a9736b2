//! Background trigger sources for the sync coordinator.
//!
//! Two tasks run until shutdown:
//! - a periodic tick that purges past days and triggers a cycle when the
//!   cache is due (cold, stale, or only holding past days)
//! - a settings watcher that triggers `LocationChanged` whenever the
//!   configured location is edited
//!
//! Both only call into the coordinator, so they inherit its single-flight
//! guarantee; a tick that lands during a running cycle just joins it.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::queries;
use crate::services::sync::{SyncCoordinator, SyncOutcome, TriggerReason};
use crate::settings::{Location, SyncSettings};

/// Handle on the running background tasks.
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the periodic tick and the settings watcher.
    ///
    /// The first tick fires immediately, so a cold cache is filled at startup.
    pub fn start(sync: SyncCoordinator, check_interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        // Subscribe before spawning so no edit made after `start` returns is missed
        let settings_rx = sync.settings().subscribe();
        let location = settings_rx.borrow().location.clone();

        let tasks = vec![
            tokio::spawn(run_periodic(sync.clone(), check_interval, cancel.clone())),
            tokio::spawn(watch_location(sync, settings_rx, location, cancel.clone())),
        ];

        tracing::info!(
            "Scheduler started (check interval {}s)",
            check_interval.as_secs()
        );

        Self { cancel, tasks }
    }

    /// Stop both tasks. A cycle already in flight runs to completion on its
    /// own task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Scheduler: task ended abnormally: {}", e);
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

async fn run_periodic(sync: SyncCoordinator, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick(&sync) => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// One scheduler pass: purge past days, then sync if due and wait for it.
async fn tick(sync: &SyncCoordinator) {
    let location = sync.settings().location().cache_key();
    let today = Utc::now().date_naive();

    match queries::purge_before(sync.pool(), &location, today).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!("Scheduler: purged {} past days for {}", n, location),
        Err(e) => tracing::error!("Scheduler: failed to purge past days: {}", e),
    }

    let reason = match sync.refresh_due().await {
        Ok(Some(reason)) => reason,
        Ok(None) => {
            tracing::debug!("Scheduler: cache for {} is fresh", location);
            return;
        }
        Err(e) => {
            tracing::error!("Scheduler: failed to check cache freshness: {}", e);
            return;
        }
    };

    tracing::debug!("Scheduler: cache for {} due ({:?})", location, reason);
    match sync.trigger(TriggerReason::Periodic).await {
        Ok(SyncOutcome::Committed(report)) => tracing::debug!(
            "Scheduler: cycle committed {} days for {}",
            report.records,
            report.location
        ),
        Ok(SyncOutcome::Superseded { location }) => {
            tracing::debug!("Scheduler: cycle for {} superseded", location)
        }
        // Already logged by the coordinator
        Err(_) => {}
    }
}

async fn watch_location(
    sync: SyncCoordinator,
    mut rx: watch::Receiver<SyncSettings>,
    mut current: Location,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    // Sender dropped: settings are gone, nothing left to watch
                    break;
                }
            }
        }

        let location = rx.borrow_and_update().location.clone();
        if location == current {
            continue;
        }

        tracing::info!("Scheduler: location changed from {} to {}", current, location);
        current = location;
        // Fire-and-forget; the coordinator chains a cycle if one is running
        drop(sync.trigger(TriggerReason::LocationChanged));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::services::events::{event_channel, ForecastEvent};
    use crate::settings::SettingsHandle;
    use crate::test_support::{days_from, today, valid_payload, ScriptedFetcher};
    use chrono::Duration as ChronoDuration;

    async fn coordinator(fetcher: std::sync::Arc<ScriptedFetcher>) -> SyncCoordinator {
        let pool = connect_in_memory().await;
        let settings = SettingsHandle::new(SyncSettings {
            location: Location::parse("94043").unwrap(),
            refresh_interval: Duration::from_secs(3 * 3600),
            forecast_days: 14,
        });
        SyncCoordinator::new(pool, fetcher, settings, event_channel())
    }

    #[tokio::test]
    async fn test_tick_fills_cold_cache() {
        let fetcher = ScriptedFetcher::new(vec![Ok(valid_payload(7))]);
        let sync = coordinator(fetcher.clone()).await;

        tick(&sync).await;

        assert_eq!(fetcher.calls(), vec!["94043".to_string()]);
        assert_eq!(
            queries::count_from(sync.pool(), "94043", today()).await.unwrap(),
            7
        );
        assert_eq!(
            sync.snapshot().await.last_trigger,
            Some(TriggerReason::Periodic)
        );
    }

    #[tokio::test]
    async fn test_tick_purges_past_days_and_skips_fresh_cache() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let sync = coordinator(fetcher.clone()).await;
        let start = today() - ChronoDuration::days(2);
        queries::replace_all(sync.pool(), "94043", &days_from(start, 9), Utc::now())
            .await
            .unwrap();

        tick(&sync).await;

        let rows = queries::query_from(sync.pool(), "94043", start).await.unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].forecast_date, today());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_location_change_triggers_sync() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let sync = coordinator(fetcher.clone()).await;
        queries::replace_all(sync.pool(), "94043", &days_from(today(), 7), Utc::now())
            .await
            .unwrap();
        let mut events = sync.subscribe();

        let scheduler = Scheduler::start(sync.clone(), Duration::from_secs(3600));
        assert!(sync
            .settings()
            .set_location(Location::parse("10001").unwrap()));

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        let ForecastEvent::Updated { location, .. } = event;
        assert_eq!(location, "10001");

        scheduler.shutdown().await;
        assert!(queries::is_empty(sync.pool(), "94043").await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_stops_tasks() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let sync = coordinator(fetcher).await;
        let scheduler = Scheduler::start(sync, Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
            .await
            .unwrap();
    }
}
