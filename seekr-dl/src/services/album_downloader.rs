//! Album downloader
//!
//! End-to-end decision for one album:
//!
//! 1. Skip if the album directory already exists (unless replacing)
//! 2. Connect, locate ranked sources
//! 3. Try sources in rank order until one downloads completely
//! 4. Fetch cover art, tag every file, commit the directory with its sidecar
//!
//! Per-peer failures are logged and reported as events; only job-level
//! outcomes ([`DownloadError`]) reach the caller.

use crate::error::{DownloadError, JobResult};
use crate::network::{Credentials, NetworkClient, NetworkError, NetworkSession};
use crate::services::cover_art::{CoverArtProvider, NoCoverArt};
use crate::services::source_locator::{DownloadSource, SourceLocator};
use crate::services::tagging::{LoftyTagWriter, TagWriter};
use crate::services::transfer_supervisor::{
    DownloadResult, SourceCancelHandle, SourceFailure, TransferSupervisor,
};
use crate::services::watchdog::WatchdogPolicy;
use chrono::Utc;
use seekr_common::config::TomlConfig;
use seekr_common::events::{DownloadEvent, EventBus};
use seekr_common::models::{write_album_file, SIDECAR_FILE_NAME};
use seekr_common::naming::LibraryLayout;
use seekr_common::Album;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Successful outcome of one album job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Downloaded from `username` and committed to `directory`
    Downloaded { directory: PathBuf, username: String },
    /// Directory already present, nothing downloaded
    AlreadyInLibrary { directory: PathBuf },
}

pub struct AlbumDownloader {
    client: Arc<dyn NetworkClient>,
    credentials: Credentials,
    layout: LibraryLayout,
    file_types: Vec<String>,
    supervisor: TransferSupervisor,
    cover_art: Arc<dyn CoverArtProvider>,
    tagger: Arc<dyn TagWriter>,
    events: Arc<EventBus>,
}

impl AlbumDownloader {
    pub fn new(
        client: Arc<dyn NetworkClient>,
        credentials: Credentials,
        layout: LibraryLayout,
        file_types: Vec<String>,
        supervisor: TransferSupervisor,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            client,
            credentials,
            layout,
            file_types,
            supervisor,
            cover_art: Arc::new(NoCoverArt),
            tagger: Arc::new(LoftyTagWriter::default()),
            events,
        }
    }

    /// Downloader wired from configuration
    pub fn from_config(
        config: &TomlConfig,
        client: Arc<dyn NetworkClient>,
        events: Arc<EventBus>,
    ) -> Self {
        let supervisor = TransferSupervisor::new(
            config.layout(),
            config.scratch_root(),
            WatchdogPolicy::from(&config.watchdog),
            events.clone(),
        )
        .with_source_timeout(config.watchdog.timeout());

        Self::new(
            client,
            Credentials {
                username: config.network.username.clone(),
                password: config.network.password.clone(),
            },
            config.layout(),
            config.search.file_types.clone(),
            supervisor,
            events,
        )
        .with_tag_writer(Arc::new(LoftyTagWriter::new(
            config.tagging.strip_existing_metadata,
        )))
    }

    pub fn with_cover_art(mut self, provider: Arc<dyn CoverArtProvider>) -> Self {
        self.cover_art = provider;
        self
    }

    pub fn with_tag_writer(mut self, tagger: Arc<dyn TagWriter>) -> Self {
        self.tagger = tagger;
        self
    }

    /// Handle for cancelling the source attempt in flight
    pub fn cancel_handle(&self) -> SourceCancelHandle {
        self.supervisor.cancel_handle()
    }

    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }

    /// Download `album` into the library
    pub async fn download(
        &self,
        album: &Album,
        replace: bool,
        global: &CancellationToken,
    ) -> JobResult<DownloadOutcome> {
        let result = self.run(album, replace, global).await;

        match &result {
            Ok(DownloadOutcome::Downloaded {
                directory,
                username,
            }) => {
                info!(
                    album = %album,
                    username = %username,
                    directory = %directory.display(),
                    "Album downloaded"
                );
                self.events.emit_lossy(DownloadEvent::AlbumDownloaded {
                    album_id: album.id,
                    username: username.clone(),
                    directory: directory.display().to_string(),
                    timestamp: Utc::now(),
                });
            }
            Ok(DownloadOutcome::AlreadyInLibrary { directory }) => {
                info!(album = %album, directory = %directory.display(), "Album already in library");
            }
            Err(e) => {
                error!(album = %album, error = %e, "Album download failed");
                self.events.emit_lossy(DownloadEvent::AlbumFailed {
                    album_id: album.id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    async fn run(
        &self,
        album: &Album,
        replace: bool,
        global: &CancellationToken,
    ) -> JobResult<DownloadOutcome> {
        album.validate()?;

        let directory = self.layout.album_dir(album);
        if directory.exists() && !replace {
            return Ok(DownloadOutcome::AlreadyInLibrary { directory });
        }
        if global.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let session = self.client.connect(&self.credentials).await?;

        let locator = SourceLocator::new(session.as_ref(), &self.file_types, &self.events);
        let sources = match locator.locate(album, global).await {
            Ok(sources) => sources,
            Err(_) if global.is_cancelled() => return Err(DownloadError::Cancelled),
            Err(NetworkError::Cancelled) => return Err(DownloadError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        if sources.is_empty() {
            return Err(DownloadError::NoSourcesFound);
        }

        let result = self
            .try_sources(session.as_ref(), album, &sources, global)
            .await?;
        let username = result.username.clone();

        let cover = self.cover_art.fetch(album, result.directory()).await;
        for file in &result.files {
            self.tagger
                .write_tags(&file.path, &file.track, album, cover.as_deref())
                .map_err(|e| DownloadError::Tagging(e.to_string()))?;
        }

        let directory = commit(&self.layout, album, result, replace)?;
        Ok(DownloadOutcome::Downloaded {
            directory,
            username,
        })
    }

    /// First source that downloads completely, in rank order
    async fn try_sources(
        &self,
        session: &dyn NetworkSession,
        album: &Album,
        sources: &[DownloadSource],
        global: &CancellationToken,
    ) -> JobResult<DownloadResult> {
        let total = sources.len();

        for (rank, source) in sources.iter().enumerate() {
            if global.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            info!(
                album = %album,
                username = %source.username,
                rank = rank + 1,
                total,
                bytes = source.total_size(),
                "Trying source"
            );
            self.events.emit_lossy(DownloadEvent::SourceAttemptStarted {
                album_id: album.id,
                username: source.username.clone(),
                rank: rank + 1,
                total,
                timestamp: Utc::now(),
            });

            match self
                .supervisor
                .download_source(session, album, source, global)
                .await
            {
                Ok(result) => return Ok(result),
                Err(SourceFailure::GlobalCancellation) => return Err(DownloadError::Cancelled),
                Err(failure) => {
                    warn!(
                        album = %album,
                        username = %source.username,
                        reason = %failure,
                        "Source failed"
                    );
                    self.events.emit_lossy(DownloadEvent::SourceFailed {
                        album_id: album.id,
                        username: source.username.clone(),
                        reason: failure.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        if global.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        Err(DownloadError::SourcesExhausted { attempted: total })
    }
}

// ============================================================================
// Commit
// ============================================================================

fn commit_error(action: &str, path: &Path, e: impl std::fmt::Display) -> DownloadError {
    DownloadError::Commit(format!("{} {}: {}", action, path.display(), e))
}

/// Move a completed download into the library
///
/// Files are staged in a hidden sibling directory and renamed into place, so
/// the album directory only ever appears complete. An existing directory is
/// removed only when `replace` is set. The scratch directory is deleted.
pub fn commit(
    layout: &LibraryLayout,
    album: &Album,
    result: DownloadResult,
    replace: bool,
) -> JobResult<PathBuf> {
    let artist_dir = layout.artist_dir(album);
    let target = layout.album_dir(album);
    let dir_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = artist_dir.join(format!(".{}.partial", dir_name));

    std::fs::create_dir_all(&artist_dir).map_err(|e| commit_error("create", &artist_dir, e))?;
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| commit_error("clear", &staging, e))?;
    }

    if let Err(e) = stage(album, result.directory(), &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    if target.exists() {
        if !replace {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(DownloadError::Commit(format!(
                "{} already exists",
                target.display()
            )));
        }
        debug!(directory = %target.display(), "Replacing existing album directory");
        std::fs::remove_dir_all(&target).map_err(|e| commit_error("remove", &target, e))?;
    }

    std::fs::rename(&staging, &target).map_err(|e| commit_error("rename", &staging, e))?;

    let scratch = result.scratch.path().to_path_buf();
    if let Err(e) = result.scratch.close() {
        warn!(path = %scratch.display(), error = %e, "Failed to remove scratch directory");
    }

    Ok(target)
}

fn stage(album: &Album, scratch: &Path, staging: &Path) -> JobResult<()> {
    std::fs::create_dir(staging).map_err(|e| commit_error("create", staging, e))?;

    for entry in std::fs::read_dir(scratch).map_err(|e| commit_error("read", scratch, e))? {
        let entry = entry.map_err(|e| commit_error("read", scratch, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let destination = staging.join(entry.file_name());
        std::fs::copy(&path, &destination).map_err(|e| commit_error("copy", &path, e))?;
    }

    let sidecar = staging.join(SIDECAR_FILE_NAME);
    write_album_file(album, &sidecar).map_err(|e| commit_error("write", &sidecar, e))?;
    Ok(())
}
