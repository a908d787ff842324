//! Test helpers
//!
//! Scripted peer network, album fixtures and a recording tag writer shared by
//! the seekr-dl integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use seekr_common::events::{DownloadEvent, EventBus};
use seekr_common::naming::LibraryLayout;
use seekr_common::{Album, Artist, Track};
use seekr_dl::network::{
    Activity, Completion, Credentials, NetworkClient, NetworkError, NetworkSession, ProgressFn,
    RemoteFile, SearchOptions, SearchResponse, Transfer, TransferRequest, TransferState,
};
use seekr_dl::services::{
    AlbumDownloader, NoCoverArt, TagError, TagWriter, TransferSupervisor, WatchdogPolicy,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

/// Album by "Artist" released 2001-05-01, tracks numbered from 1
pub fn album(title: &str, tracks: &[&str]) -> Album {
    Album {
        artists: vec![Artist::new(Uuid::new_v4(), "Artist")],
        id: Uuid::new_v4(),
        title: title.to_string(),
        date: NaiveDate::from_ymd_opt(2001, 5, 1).unwrap(),
        tracks: tracks
            .iter()
            .enumerate()
            .map(|(i, t)| Track::new(Uuid::new_v4(), i as u32 + 1, *t))
            .collect(),
    }
}

/// Remote file names `Music\<dir>\NN Title.<ext>` for every track
pub fn track_files(album: &Album, dir: &str, ext: &str) -> Vec<String> {
    album
        .tracks
        .iter()
        .map(|t| format!("Music\\{}\\{:02} {}.{}", dir, t.number, t.title, ext))
        .collect()
}

pub fn layout(library: &Path) -> LibraryLayout {
    LibraryLayout::new(library, "%A", "%T (%Y)", "%n %t")
}

/// Watchdog: 30 s grace delay, 1000 B/s minimum
pub fn strict_watchdog() -> WatchdogPolicy {
    WatchdogPolicy {
        delay: Some(Duration::from_secs(30)),
        minimum_speed: Some(1000),
        cancel_when_queued_remotely: true,
    }
}

/// Every event received so far
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Scripted network
// ============================================================================

/// How a peer serves one file
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Write the full content and succeed
    Complete,
    /// Write one byte short but report success
    WrongSize,
    /// Report success without writing anything
    NothingWritten,
    /// Write half the content and end in `state`
    Fail(TransferState),
    /// Report progress at `average_speed` every second until cancelled
    Slow { average_speed: f64 },
    /// Never get past `state` until cancelled
    Stall(TransferState),
}

#[derive(Debug, Clone)]
pub struct MockPeer {
    pub username: String,
    pub has_free_upload_slot: bool,
    pub upload_speed: u64,
    pub files: Vec<(String, Vec<u8>)>,
    pub behaviors: HashMap<String, Behavior>,
}

impl MockPeer {
    /// Peer sharing `files`, each with distinct 1 KiB content
    pub fn new(username: &str, files: &[String]) -> Self {
        Self {
            username: username.to_string(),
            has_free_upload_slot: true,
            upload_speed: 1_000_000,
            files: files
                .iter()
                .enumerate()
                .map(|(i, f)| (f.clone(), vec![b'a' + (i % 26) as u8; 1024]))
                .collect(),
            behaviors: HashMap::new(),
        }
    }

    pub fn with_speed(mut self, upload_speed: u64) -> Self {
        self.upload_speed = upload_speed;
        self
    }

    /// Behavior for the `index`-th shared file
    pub fn with_behavior(mut self, index: usize, behavior: Behavior) -> Self {
        let name = self.files[index].0.clone();
        self.behaviors.insert(name, behavior);
        self
    }
}

#[derive(Debug, Default)]
pub struct MockNetwork {
    pub peers: Vec<MockPeer>,
    /// Queries that must be answered with nothing
    pub unanswered: Vec<String>,
    pub fail_connect: bool,
    /// The first N downloads are rejected
    pub reject_first: AtomicUsize,
    pub searches: Mutex<Vec<String>>,
    /// `(username, filename)` of every download request
    pub downloads: Mutex<Vec<(String, String)>>,
}

impl MockNetwork {
    pub fn new(peers: Vec<MockPeer>) -> Arc<Self> {
        Arc::new(Self {
            peers,
            ..Default::default()
        })
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<(String, String)> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn downloads_from(&self, username: &str) -> Vec<String> {
        self.downloads()
            .into_iter()
            .filter(|(u, _)| u == username)
            .map(|(_, f)| f)
            .collect()
    }
}

pub struct MockClient {
    pub network: Arc<MockNetwork>,
}

impl MockClient {
    pub fn new(network: Arc<MockNetwork>) -> Arc<Self> {
        Arc::new(Self { network })
    }
}

#[async_trait]
impl NetworkClient for MockClient {
    async fn connect(
        &self,
        _credentials: &Credentials,
    ) -> Result<Box<dyn NetworkSession>, NetworkError> {
        if self.network.fail_connect {
            return Err(NetworkError::Connection("server unreachable".to_string()));
        }
        Ok(Box::new(MockSession {
            network: self.network.clone(),
        }))
    }
}

pub struct MockSession {
    network: Arc<MockNetwork>,
}

fn snapshot(request: &TransferRequest, state: TransferState, bytes: u64, speed: f64) -> Transfer {
    Transfer {
        username: request.username.clone(),
        filename: request.filename.clone(),
        state,
        size: request.size,
        bytes_transferred: bytes,
        average_speed: speed,
    }
}

#[async_trait]
impl NetworkSession for MockSession {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        _token: &CancellationToken,
    ) -> Result<Vec<SearchResponse>, NetworkError> {
        self.network.searches.lock().unwrap().push(query.to_string());
        if self.network.unanswered.iter().any(|q| q == query) {
            return Ok(Vec::new());
        }

        Ok(self
            .network
            .peers
            .iter()
            .map(|peer| SearchResponse {
                username: peer.username.clone(),
                has_free_upload_slot: peer.has_free_upload_slot,
                upload_speed: peer.upload_speed,
                files: peer
                    .files
                    .iter()
                    .filter(|(name, _)| options.accepts(name))
                    .map(|(name, content)| RemoteFile::new(name.clone(), content.len() as u64))
                    .collect(),
            })
            .filter(|r| !r.files.is_empty())
            .collect())
    }

    async fn download(
        &self,
        request: &TransferRequest,
        on_progress: &ProgressFn<'_>,
        token: &CancellationToken,
    ) -> Result<Transfer, NetworkError> {
        self.network
            .downloads
            .lock()
            .unwrap()
            .push((request.username.clone(), request.filename.clone()));
        on_progress(&snapshot(request, TransferState::Requested, 0, 0.0));

        let rejected = self
            .network
            .reject_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let peer = self
            .network
            .peers
            .iter()
            .find(|p| p.username == request.username);
        let content = peer.and_then(|p| {
            p.files
                .iter()
                .find(|(name, _)| *name == request.filename)
                .map(|(_, c)| c.clone())
        });
        let (peer, content) = match (peer, content) {
            (Some(peer), Some(content)) if !rejected => (peer, content),
            _ => {
                let transfer = snapshot(request, TransferState::Rejected, 0, 0.0);
                on_progress(&transfer);
                return Ok(transfer);
            }
        };

        let behavior = peer
            .behaviors
            .get(&request.filename)
            .cloned()
            .unwrap_or(Behavior::Complete);
        let transferring = TransferState::InProgress(Activity::Transferring);

        let transfer = match behavior {
            Behavior::Complete => {
                std::fs::write(&request.destination, &content)?;
                snapshot(
                    request,
                    TransferState::Completed(Completion::Succeeded),
                    content.len() as u64,
                    1_000_000.0,
                )
            }
            Behavior::WrongSize => {
                std::fs::write(&request.destination, &content[..content.len() - 1])?;
                snapshot(
                    request,
                    TransferState::Completed(Completion::Succeeded),
                    content.len() as u64 - 1,
                    1_000_000.0,
                )
            }
            Behavior::NothingWritten => snapshot(
                request,
                TransferState::Completed(Completion::Succeeded),
                0,
                0.0,
            ),
            Behavior::Fail(state) => {
                let half = &content[..content.len() / 2];
                std::fs::write(&request.destination, half)?;
                on_progress(&snapshot(request, transferring, half.len() as u64, 1_000_000.0));
                snapshot(request, state, half.len() as u64, 1_000_000.0)
            }
            Behavior::Slow { average_speed } => {
                std::fs::write(&request.destination, &content[..1])?;
                loop {
                    on_progress(&snapshot(request, transferring, 1, average_speed));
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
                snapshot(request, TransferState::Cancelled, 1, average_speed)
            }
            Behavior::Stall(state) => {
                on_progress(&snapshot(request, state, 0, 0.0));
                token.cancelled().await;
                snapshot(request, TransferState::Cancelled, 0, 0.0)
            }
        };

        on_progress(&transfer);
        Ok(transfer)
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Records every tagged file; optionally fails
#[derive(Debug, Default)]
pub struct RecordingTagWriter {
    pub fail: bool,
    pub tagged: Mutex<Vec<(PathBuf, u32, Option<PathBuf>)>>,
}

impl RecordingTagWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn tagged(&self) -> Vec<(PathBuf, u32, Option<PathBuf>)> {
        self.tagged.lock().unwrap().clone()
    }
}

impl TagWriter for RecordingTagWriter {
    fn write_tags(
        &self,
        file: &Path,
        track: &Track,
        _album: &Album,
        cover: Option<&Path>,
    ) -> Result<(), TagError> {
        if self.fail {
            return Err(TagError::NoWritableTag(file.display().to_string()));
        }
        self.tagged.lock().unwrap().push((
            file.to_path_buf(),
            track.number,
            cover.map(Path::to_path_buf),
        ));
        Ok(())
    }
}

/// Everything an album download test needs
pub struct Harness {
    pub library: tempfile::TempDir,
    pub scratch: tempfile::TempDir,
    pub events: Arc<EventBus>,
    pub tagger: Arc<RecordingTagWriter>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            library: tempfile::TempDir::new().unwrap(),
            scratch: tempfile::TempDir::new().unwrap(),
            events: Arc::new(EventBus::new(10_000)),
            tagger: RecordingTagWriter::new(),
        }
    }

    pub fn layout(&self) -> LibraryLayout {
        layout(self.library.path())
    }

    pub fn supervisor(&self, watchdog: WatchdogPolicy) -> TransferSupervisor {
        TransferSupervisor::new(self.layout(), self.scratch.path(), watchdog, self.events.clone())
    }

    pub fn downloader(&self, client: Arc<dyn NetworkClient>) -> AlbumDownloader {
        self.downloader_with(client, WatchdogPolicy::default())
    }

    pub fn downloader_with(
        &self,
        client: Arc<dyn NetworkClient>,
        watchdog: WatchdogPolicy,
    ) -> AlbumDownloader {
        AlbumDownloader::new(
            client,
            Credentials::default(),
            self.layout(),
            vec!["flac".to_string(), "mp3".to_string()],
            self.supervisor(watchdog),
            self.events.clone(),
        )
        .with_cover_art(Arc::new(NoCoverArt))
        .with_tag_writer(self.tagger.clone())
    }

    /// Entries left in the scratch root
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}
