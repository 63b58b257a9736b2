//! Forecast change notifications.
//!
//! Emitted once per committed `replace_all` so display collaborators can
//! re-read instead of polling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;
use uuid::Uuid;

/// Default capacity; slow subscribers skip ahead (they only need the latest).
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForecastEvent {
    /// A new forecast generation was committed.
    Updated {
        /// Cache key of the location the forecast applies to
        location: String,
        generation: Uuid,
        records: usize,
        synced_at: DateTime<Utc>,
    },
}

pub type EventSender = broadcast::Sender<ForecastEvent>;
pub type EventReceiver = broadcast::Receiver<ForecastEvent>;

pub fn event_channel() -> EventSender {
    let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
