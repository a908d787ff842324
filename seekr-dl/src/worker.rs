//! Queue-draining worker
//!
//! A single worker drains the [`RetryableQueue`] sequentially. Failed albums go
//! back on the queue (and so into the retry tier) unless the failure cannot
//! change on a retry; global cancellation stops the run without re-enqueueing
//! the album in flight.

use crate::error::DownloadError;
use crate::queue::RetryableQueue;
use crate::services::album_downloader::{AlbumDownloader, DownloadOutcome};
use seekr_common::Album;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// What one run of the worker did
#[derive(Debug, Clone, Default)]
pub struct WorkerSummary {
    pub downloaded: usize,
    pub already_present: usize,
    /// Failed passes, counting every retry
    pub failed_attempts: usize,
    /// Albums dropped after reaching the attempt limit
    pub abandoned: Vec<Album>,
    /// Whether the run was stopped by global cancellation
    pub cancelled: bool,
    /// Albums left undone when the run was cancelled
    pub remaining: usize,
}

impl WorkerSummary {
    /// Every enqueued album ended up in the library
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.abandoned.is_empty() && self.remaining == 0
    }
}

pub struct DownloadWorker {
    downloader: Arc<AlbumDownloader>,
    global: CancellationToken,
    replace: bool,
    max_attempts: Option<u32>,
}

impl DownloadWorker {
    pub fn new(downloader: Arc<AlbumDownloader>, global: CancellationToken) -> Self {
        Self {
            downloader,
            global,
            replace: false,
            max_attempts: None,
        }
    }

    /// Replace albums already in the library
    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    /// Abandon an album after this many failed passes
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Drain `queue` until it is empty or the global token is cancelled
    pub async fn run(&self, queue: &mut RetryableQueue<Album>) -> WorkerSummary {
        let mut summary = WorkerSummary::default();
        let mut attempts: HashMap<Uuid, u32> = HashMap::new();

        loop {
            let album = tokio::select! {
                biased;
                _ = self.global.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                next = queue.try_dequeue() => match next {
                    Some(album) => album,
                    None => break,
                },
            };

            match self
                .downloader
                .download(&album, self.replace, &self.global)
                .await
            {
                Ok(DownloadOutcome::Downloaded { .. }) => summary.downloaded += 1,
                Ok(DownloadOutcome::AlreadyInLibrary { .. }) => summary.already_present += 1,
                Err(DownloadError::Cancelled) => {
                    info!(album = %album, "Download cancelled, stopping");
                    summary.cancelled = true;
                    summary.remaining += 1;
                    break;
                }
                Err(e) => {
                    summary.failed_attempts += 1;
                    let count = attempts.entry(album.id).or_insert(0);
                    *count += 1;

                    if !e.is_retryable() || self.max_attempts.is_some_and(|max| *count >= max) {
                        warn!(album = %album, attempts = *count, error = %e, "Giving up on album");
                        summary.abandoned.push(album);
                    } else {
                        info!(album = %album, attempts = *count, "Re-enqueueing album for retry");
                        queue.enqueue(album);
                    }
                }
            }
        }

        summary.remaining += queue.len();
        info!(
            downloaded = summary.downloaded,
            already_present = summary.already_present,
            failed_attempts = summary.failed_attempts,
            abandoned = summary.abandoned.len(),
            remaining = summary.remaining,
            cancelled = summary.cancelled,
            "Worker finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_completeness() {
        assert!(WorkerSummary::default().is_complete());

        let cancelled = WorkerSummary {
            cancelled: true,
            ..Default::default()
        };
        assert!(!cancelled.is_complete());

        let leftover = WorkerSummary {
            remaining: 1,
            ..Default::default()
        };
        assert!(!leftover.is_complete());
    }
}
