//! Peer-to-peer network client contract
//!
//! The download pipeline never speaks the wire protocol itself. It consumes a
//! [`NetworkClient`] that hands out connected [`NetworkSession`]s capable of
//! searching and downloading. [`local::LocalPeerClient`] serves a directory
//! tree as a set of peers.

pub mod local;

pub use local::LocalPeerClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Errors
// ============================================================================

/// Network client errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Search
// ============================================================================

/// Credentials handed to [`NetworkClient::connect`]
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Search filter
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Accepted extensions, lowercase without dot; empty accepts everything
    pub file_extensions: Vec<String>,
}

impl SearchOptions {
    pub fn accepts(&self, filename: &str) -> bool {
        if self.file_extensions.is_empty() {
            return true;
        }
        seekr_common::naming::remote_extension(filename)
            .map(|ext| self.file_extensions.contains(&ext))
            .unwrap_or(false)
    }
}

/// A file advertised by a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Path with network (`\`) separators
    pub filename: String,
    /// Size in bytes
    pub size: u64,
}

impl RemoteFile {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
        }
    }
}

/// One peer's answer to a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub username: String,
    pub has_free_upload_slot: bool,
    /// Advertised upload speed in bytes per second
    pub upload_speed: u64,
    pub files: Vec<RemoteFile>,
}

// ============================================================================
// Transfers
// ============================================================================

/// Sub-state of an in-progress transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    Transferring,
    QueuedRemotely,
    QueuedLocally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    Succeeded,
    Errored,
}

/// Transfer state machine
///
/// `Requested -> Initializing -> InProgress -> terminal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Requested,
    Initializing,
    InProgress(Activity),
    Completed(Completion),
    Aborted,
    Cancelled,
    Rejected,
    TimedOut,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            TransferState::Requested | TransferState::Initializing | TransferState::InProgress(_)
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransferState::Completed(Completion::Succeeded))
    }

    pub fn is_queued_remotely(&self) -> bool {
        matches!(self, TransferState::InProgress(Activity::QueuedRemotely))
    }

    /// Short label for progress output
    pub fn label(&self) -> &'static str {
        match self {
            TransferState::Requested => "Requested",
            TransferState::Initializing => "Initializing",
            TransferState::InProgress(Activity::Transferring) => "Downloading",
            TransferState::InProgress(Activity::QueuedRemotely) => "Queued (Remotely)",
            TransferState::InProgress(Activity::QueuedLocally) => "Queued (Locally)",
            TransferState::Completed(Completion::Succeeded) => "Completed",
            TransferState::Completed(Completion::Errored) => "Errored",
            TransferState::Aborted => "Aborted",
            TransferState::Cancelled => "Cancelled",
            TransferState::Rejected => "Rejected",
            TransferState::TimedOut => "Timed Out",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Download request for one remote file
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub username: String,
    pub filename: String,
    /// Local path the file is written to
    pub destination: PathBuf,
    /// Size advertised by the peer
    pub size: u64,
}

/// Snapshot of a transfer
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub username: String,
    pub filename: String,
    pub state: TransferState,
    pub size: u64,
    pub bytes_transferred: u64,
    /// Average speed since the transfer started, bytes per second
    pub average_speed: f64,
}

impl Transfer {
    /// Initial snapshot for a request
    pub fn requested(request: &TransferRequest) -> Self {
        Self {
            username: request.username.clone(),
            filename: request.filename.clone(),
            state: TransferState::Requested,
            size: request.size,
            bytes_transferred: 0,
            average_speed: 0.0,
        }
    }

    pub fn percent_complete(&self) -> f64 {
        if self.size == 0 {
            return if self.state.is_success() { 100.0 } else { 0.0 };
        }
        (self.bytes_transferred as f64 / self.size as f64) * 100.0
    }
}

// ============================================================================
// Client traits
// ============================================================================

/// Progress callback handed to [`NetworkSession::download`], called with
/// every snapshot
pub type ProgressFn<'a> = dyn for<'t> Fn(&'t Transfer) + Send + Sync + 'a;

#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn connect(&self, credentials: &Credentials)
        -> Result<Box<dyn NetworkSession>, NetworkError>;
}

/// Connected network session
#[async_trait]
pub trait NetworkSession: Send + Sync {
    /// Search the network; `options` filters files by extension
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        token: &CancellationToken,
    ) -> Result<Vec<SearchResponse>, NetworkError>;

    /// Download one file to `request.destination`
    ///
    /// `on_progress` is invoked on every state change and progress update.
    /// Returns the final snapshot. Cancellation through `token` yields either
    /// a `Cancelled` snapshot or [`NetworkError::Cancelled`].
    async fn download(
        &self,
        request: &TransferRequest,
        on_progress: &ProgressFn<'_>,
        token: &CancellationToken,
    ) -> Result<Transfer, NetworkError>;
}
