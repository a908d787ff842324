//! Transfer supervisor
//!
//! Downloads every file of one [`DownloadSource`] into a fresh scratch
//! directory, one file at a time. Any failed file fails the whole source and
//! the scratch directory is deleted before returning.
//!
//! Cancellation is layered:
//!
//! ```text
//! global token            operator shutdown, every source of every album
//!   └─ source token       one attempt against one peer (Ctrl+C, timeout)
//!        └─ watchdog      one file transfer (too slow, queued remotely)
//! ```

use crate::network::{NetworkError, NetworkSession, Transfer, TransferRequest, TransferState};
use crate::services::source_locator::{DownloadSource, TrackMatch};
use crate::services::watchdog::{WatchdogPolicy, WatchdogReason};
use chrono::Utc;
use seekr_common::events::{DownloadEvent, EventBus};
use seekr_common::naming::{remote_extension, remote_file_name, LibraryLayout};
use seekr_common::{Album, Track};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often a transfer is re-checked when the peer reports nothing
const WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// Why a source attempt failed
#[derive(Debug, Error)]
pub enum SourceFailure {
    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("transfer of '{filename}' ended in state {state}")]
    TransferFailed {
        filename: String,
        state: TransferState,
    },

    #[error("'{filename}' is {actual} bytes, peer advertised {expected}")]
    SizeMismatch {
        filename: String,
        expected: u64,
        actual: u64,
    },

    #[error("transfer of '{filename}' reported success but left no file: {error}")]
    MissingFile {
        filename: String,
        error: std::io::Error,
    },

    #[error("watchdog cancelled '{filename}': {reason}")]
    Watchdog {
        filename: String,
        reason: WatchdogReason,
    },

    #[error("source attempt cancelled")]
    Cancelled,

    #[error("source attempt timed out")]
    TimedOut,

    #[error("download cancelled globally")]
    GlobalCancellation,

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("scratch directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// One downloaded track inside the scratch directory
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub track: Track,
    pub path: PathBuf,
}

/// A complete source download, owned until commit
///
/// Dropping it deletes the scratch directory.
#[derive(Debug)]
pub struct DownloadResult {
    pub username: String,
    pub scratch: TempDir,
    /// Files in album track order
    pub files: Vec<DownloadedFile>,
}

impl DownloadResult {
    pub fn directory(&self) -> &Path {
        self.scratch.path()
    }
}

// ============================================================================
// Keyboard cancel
// ============================================================================

/// Shared slot holding the token of the source attempt in flight
///
/// The command layer keeps a clone so an interrupt can abandon the current
/// peer without stopping the whole run.
#[derive(Debug, Clone, Default)]
pub struct SourceCancelHandle {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl SourceCancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn activate(&self, token: CancellationToken) -> ActiveSource {
        *self.slot() = Some(token);
        ActiveSource {
            handle: self.clone(),
        }
    }

    /// Whether a source attempt is running
    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// Cancel the attempt in flight; false if none is running
    pub fn cancel_current(&self) -> bool {
        match self.slot().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Clears the handle when the attempt ends
struct ActiveSource {
    handle: SourceCancelHandle,
}

impl Drop for ActiveSource {
    fn drop(&mut self) {
        *self.handle.slot() = None;
    }
}

// ============================================================================
// Supervisor
// ============================================================================

pub struct TransferSupervisor {
    layout: LibraryLayout,
    scratch_root: PathBuf,
    watchdog: WatchdogPolicy,
    source_timeout: Option<Duration>,
    events: Arc<EventBus>,
    cancel_handle: SourceCancelHandle,
}

impl TransferSupervisor {
    pub fn new(
        layout: LibraryLayout,
        scratch_root: impl Into<PathBuf>,
        watchdog: WatchdogPolicy,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            layout,
            scratch_root: scratch_root.into(),
            watchdog,
            source_timeout: None,
            events,
            cancel_handle: SourceCancelHandle::new(),
        }
    }

    /// Wall-clock limit for one source attempt
    pub fn with_source_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn cancel_handle(&self) -> SourceCancelHandle {
        self.cancel_handle.clone()
    }

    /// Download every file of `source` into a new scratch directory
    pub async fn download_source(
        &self,
        session: &dyn NetworkSession,
        album: &Album,
        source: &DownloadSource,
        global: &CancellationToken,
    ) -> Result<DownloadResult, SourceFailure> {
        if global.is_cancelled() {
            return Err(SourceFailure::GlobalCancellation);
        }

        std::fs::create_dir_all(&self.scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("seekr-")
            .tempdir_in(&self.scratch_root)?;

        let source_token = global.child_token();
        let _active = self.cancel_handle.activate(source_token.clone());

        debug!(
            username = %source.username,
            scratch = %scratch.path().display(),
            "Starting source attempt"
        );

        let attempt = self.download_files(session, album, source, scratch.path(), &source_token);
        let outcome = match self.source_timeout {
            Some(limit) => {
                tokio::pin!(attempt);
                tokio::select! {
                    result = &mut attempt => result,
                    _ = tokio::time::sleep(limit) => {
                        warn!(
                            username = %source.username,
                            limit_secs = limit.as_secs(),
                            "Source attempt timed out"
                        );
                        source_token.cancel();
                        let _ = attempt.await;
                        Err(SourceFailure::TimedOut)
                    }
                }
            }
            None => attempt.await,
        };

        match outcome {
            Ok(files) => Ok(DownloadResult {
                username: source.username.clone(),
                scratch,
                files,
            }),
            Err(failure) => {
                let failure = if global.is_cancelled() {
                    SourceFailure::GlobalCancellation
                } else {
                    failure
                };
                let path = scratch.path().to_path_buf();
                if let Err(e) = scratch.close() {
                    warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
                }
                Err(failure)
            }
        }
    }

    async fn download_files(
        &self,
        session: &dyn NetworkSession,
        album: &Album,
        source: &DownloadSource,
        scratch: &Path,
        source_token: &CancellationToken,
    ) -> Result<Vec<DownloadedFile>, SourceFailure> {
        let mut files = Vec::with_capacity(source.files.len());

        for track_match in &source.files {
            if source_token.is_cancelled() {
                return Err(SourceFailure::Cancelled);
            }

            let extension = remote_extension(&track_match.file.filename).unwrap_or_default();
            let destination =
                scratch.join(self.layout.track_file_name(&track_match.track, album, &extension));
            if destination.exists() {
                return Err(SourceFailure::DestinationExists(destination));
            }

            self.download_file(
                session,
                album,
                &source.username,
                track_match,
                &destination,
                source_token,
            )
            .await?;

            files.push(DownloadedFile {
                track: track_match.track.clone(),
                path: destination,
            });
        }

        Ok(files)
    }

    async fn download_file(
        &self,
        session: &dyn NetworkSession,
        album: &Album,
        username: &str,
        track_match: &TrackMatch,
        destination: &Path,
        source_token: &CancellationToken,
    ) -> Result<(), SourceFailure> {
        let request = TransferRequest {
            username: username.to_string(),
            filename: track_match.file.filename.clone(),
            destination: destination.to_path_buf(),
            size: track_match.file.size,
        };
        let display_name = remote_file_name(&request.filename);

        let watchdog_token = source_token.child_token();
        let latest = Mutex::new(Transfer::requested(&request));
        let triggered: Mutex<Option<WatchdogReason>> = Mutex::new(None);
        let started = Instant::now();

        let check = |transfer: &Transfer| {
            if watchdog_token.is_cancelled() {
                return;
            }
            if let Some(reason) = self.watchdog.should_cancel(transfer, started.elapsed()) {
                warn!(
                    username = %username,
                    file = %display_name,
                    reason = %reason,
                    "Watchdog cancelling transfer"
                );
                self.events.emit_lossy(DownloadEvent::WatchdogTriggered {
                    album_id: album.id,
                    username: username.to_string(),
                    filename: request.filename.clone(),
                    reason: reason.to_string(),
                    timestamp: Utc::now(),
                });
                *triggered.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
                watchdog_token.cancel();
            }
        };

        let on_progress = |transfer: &Transfer| {
            *latest.lock().unwrap_or_else(|e| e.into_inner()) = transfer.clone();
            self.events.emit_lossy(DownloadEvent::TransferProgress {
                album_id: album.id,
                username: username.to_string(),
                filename: transfer.filename.clone(),
                state: transfer.state.to_string(),
                bytes_transferred: transfer.bytes_transferred,
                size: transfer.size,
                percent: transfer.percent_complete(),
                average_speed: transfer.average_speed,
                timestamp: Utc::now(),
            });
            check(transfer);
        };

        info!(username = %username, file = %display_name, size = request.size, "Downloading");

        let download = session.download(&request, &on_progress, &watchdog_token);
        tokio::pin!(download);
        let mut tick = tokio::time::interval(WATCHDOG_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                result = &mut download => break result,
                _ = tick.tick(), if self.watchdog.is_enabled() => {
                    let snapshot = latest.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    check(&stalled_snapshot(snapshot, started.elapsed()));
                }
            }
        };

        let reason = triggered.lock().unwrap_or_else(|e| e.into_inner()).take();
        let outcome = match (result, reason) {
            (_, Some(reason)) => Err(SourceFailure::Watchdog {
                filename: request.filename.clone(),
                reason,
            }),
            (Err(NetworkError::Cancelled), None) => Err(SourceFailure::Cancelled),
            (Err(e), None) => Err(SourceFailure::Network(e)),
            (Ok(transfer), None) => self.verify(&request, &transfer, source_token),
        };

        let final_state = latest.lock().unwrap_or_else(|e| e.into_inner()).state;
        self.events.emit_lossy(DownloadEvent::TransferFinished {
            album_id: album.id,
            username: username.to_string(),
            filename: request.filename.clone(),
            state: final_state.to_string(),
            succeeded: outcome.is_ok(),
            timestamp: Utc::now(),
        });

        match &outcome {
            Ok(()) => info!(username = %username, file = %display_name, "Download complete"),
            Err(failure) => warn!(
                username = %username,
                file = %display_name,
                reason = %failure,
                "Download failed"
            ),
        }

        outcome
    }

    /// Accept a finished transfer only if it succeeded with the advertised size
    fn verify(
        &self,
        request: &TransferRequest,
        transfer: &Transfer,
        source_token: &CancellationToken,
    ) -> Result<(), SourceFailure> {
        if transfer.state == TransferState::Cancelled && source_token.is_cancelled() {
            return Err(SourceFailure::Cancelled);
        }
        if !transfer.state.is_success() {
            return Err(SourceFailure::TransferFailed {
                filename: request.filename.clone(),
                state: transfer.state,
            });
        }

        let actual = match std::fs::metadata(&request.destination) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                return Err(SourceFailure::MissingFile {
                    filename: request.filename.clone(),
                    error: e,
                })
            }
        };
        if actual != request.size {
            return Err(SourceFailure::SizeMismatch {
                filename: request.filename.clone(),
                expected: request.size,
                actual,
            });
        }

        Ok(())
    }
}

/// Latest snapshot with the average speed decayed by the time since it was taken
fn stalled_snapshot(mut transfer: Transfer, elapsed: Duration) -> Transfer {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        let overall = transfer.bytes_transferred as f64 / secs;
        transfer.average_speed = transfer.average_speed.min(overall);
    }
    transfer
}
