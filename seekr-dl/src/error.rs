//! Error types for seekr-dl
//!
//! [`DownloadError`] is the job-level outcome reported back to the worker.
//! Per-peer and per-file failures live next to the services producing them
//! and never escape the album downloader.

use crate::network::NetworkError;
use thiserror::Error;

/// Result type for album download jobs
pub type JobResult<T> = std::result::Result<T, DownloadError>;

/// Job-level download failure
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Search produced no usable source, even with the fallback query
    #[error("No download sources found")]
    NoSourcesFound,

    /// Every ranked source failed
    #[error("All {attempted} download sources failed")]
    SourcesExhausted { attempted: usize },

    /// Global cancellation (operator shutdown)
    #[error("Download cancelled")]
    Cancelled,

    /// Could not connect or search
    #[error("Network error: {0}")]
    Connection(#[from] NetworkError),

    /// Moving files into the library failed
    #[error("Failed to commit album to library: {0}")]
    Commit(String),

    /// Writing tags to the downloaded files failed
    #[error("Failed to write tags: {0}")]
    Tagging(String),

    /// Album metadata rejected before any network activity
    #[error("Invalid album: {0}")]
    Common(#[from] seekr_common::Error),
}

impl DownloadError {
    /// Whether the worker should put the album back on the queue
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownloadError::Cancelled | DownloadError::Common(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_and_invalid_album_are_not_retryable() {
        assert!(!DownloadError::Cancelled.is_retryable());
        let invalid = seekr_common::Error::InvalidInput("album has no tracks".to_string());
        assert!(!DownloadError::from(invalid).is_retryable());
        assert!(DownloadError::NoSourcesFound.is_retryable());
        assert!(DownloadError::SourcesExhausted { attempted: 3 }.is_retryable());
        assert!(DownloadError::Commit("disk full".to_string()).is_retryable());
    }

    #[test]
    fn test_exhausted_message_names_count() {
        let err = DownloadError::SourcesExhausted { attempted: 2 };
        assert_eq!(err.to_string(), "All 2 download sources failed");
    }
}
