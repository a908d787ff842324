//! Download progress events
//!
//! The download pipeline reports what it is doing through an [`EventBus`].
//! The command layer subscribes and renders progress; tests subscribe to
//! assert on the sequence of attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Download pipeline events
///
/// Every event carries the album release id so a subscriber can follow one
/// job through search, source attempts and commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    /// Network search issued for an album
    SearchStarted {
        album_id: Uuid,
        query: String,
        timestamp: DateTime<Utc>,
    },

    /// Search finished and responses were matched
    SourcesLocated {
        album_id: Uuid,
        /// Raw peer responses received
        responses: usize,
        /// Responses that passed validation
        sources: usize,
        timestamp: DateTime<Utc>,
    },

    /// Transfer supervisor started on one source
    SourceAttemptStarted {
        album_id: Uuid,
        username: String,
        /// 1-based rank of this source
        rank: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Progress update for one file transfer
    TransferProgress {
        album_id: Uuid,
        username: String,
        filename: String,
        /// Display label of the transfer state
        state: String,
        bytes_transferred: u64,
        size: u64,
        /// 0-100, with an empty file counting as complete once it succeeds
        percent: f64,
        average_speed: f64,
        timestamp: DateTime<Utc>,
    },

    /// A file transfer reached a terminal state
    TransferFinished {
        album_id: Uuid,
        username: String,
        filename: String,
        state: String,
        succeeded: bool,
        timestamp: DateTime<Utc>,
    },

    /// Watchdog cancelled a transfer
    WatchdogTriggered {
        album_id: Uuid,
        username: String,
        filename: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// One source attempt failed; the next ranked source may follow
    SourceFailed {
        album_id: Uuid,
        username: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Album committed to the library
    AlbumDownloaded {
        album_id: Uuid,
        username: String,
        directory: String,
        timestamp: DateTime<Utc>,
    },

    /// Album attempt failed as a whole
    AlbumFailed {
        album_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl DownloadEvent {
    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &str {
        match self {
            DownloadEvent::SearchStarted { .. } => "SearchStarted",
            DownloadEvent::SourcesLocated { .. } => "SourcesLocated",
            DownloadEvent::SourceAttemptStarted { .. } => "SourceAttemptStarted",
            DownloadEvent::TransferProgress { .. } => "TransferProgress",
            DownloadEvent::TransferFinished { .. } => "TransferFinished",
            DownloadEvent::WatchdogTriggered { .. } => "WatchdogTriggered",
            DownloadEvent::SourceFailed { .. } => "SourceFailed",
            DownloadEvent::AlbumDownloaded { .. } => "AlbumDownloaded",
            DownloadEvent::AlbumFailed { .. } => "AlbumFailed",
        }
    }

    /// Album release id the event belongs to
    pub fn album_id(&self) -> Uuid {
        match self {
            DownloadEvent::SearchStarted { album_id, .. }
            | DownloadEvent::SourcesLocated { album_id, .. }
            | DownloadEvent::SourceAttemptStarted { album_id, .. }
            | DownloadEvent::TransferProgress { album_id, .. }
            | DownloadEvent::TransferFinished { album_id, .. }
            | DownloadEvent::WatchdogTriggered { album_id, .. }
            | DownloadEvent::SourceFailed { album_id, .. }
            | DownloadEvent::AlbumDownloaded { album_id, .. }
            | DownloadEvent::AlbumFailed { album_id, .. } => *album_id,
        }
    }
}

/// Broadcast bus for [`DownloadEvent`]s
pub struct EventBus {
    tx: broadcast::Sender<DownloadEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DownloadEvent,
    ) -> Result<usize, broadcast::error::SendError<DownloadEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
