//! Directory-backed peer network
//!
//! Every subdirectory of the root is one peer, named after the directory:
//!
//! ```text
//! <root>/<username>/Music/Artist/Album/01 Intro.flac
//! ```
//!
//! Search matches files whose path below the peer directory contains every
//! query word (case-insensitive). Paths are reported with network (`\`)
//! separators. Downloads copy the file in chunks and report progress.

use super::{
    Activity, Completion, Credentials, NetworkClient, NetworkError, NetworkSession, ProgressFn,
    RemoteFile, SearchOptions, SearchResponse, Transfer, TransferRequest, TransferState,
};
use async_trait::async_trait;
use seekr_common::naming::normalize_remote_path;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

const CHUNK_SIZE: usize = 64 * 1024;

/// Network client serving a local directory tree
#[derive(Debug, Clone)]
pub struct LocalPeerClient {
    root: PathBuf,
    chunk_delay: Option<Duration>,
}

impl LocalPeerClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_delay: None,
        }
    }

    /// Sleep between chunks to simulate a slow peer
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }
}

#[async_trait]
impl NetworkClient for LocalPeerClient {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn NetworkSession>, NetworkError> {
        if !self.root.is_dir() {
            return Err(NetworkError::Connection(format!(
                "peer directory {} does not exist",
                self.root.display()
            )));
        }

        info!(
            root = %self.root.display(),
            username = %credentials.username,
            "Connected to local peer directory"
        );

        Ok(Box::new(LocalPeerSession {
            root: self.root.clone(),
            chunk_delay: self.chunk_delay,
        }))
    }
}

struct LocalPeerSession {
    root: PathBuf,
    chunk_delay: Option<Duration>,
}

impl LocalPeerSession {
    fn peers(&self) -> Result<Vec<(String, PathBuf)>, NetworkError> {
        let mut peers = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                peers.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
            }
        }
        peers.sort();
        Ok(peers)
    }

    fn search_peer(
        &self,
        peer_dir: &Path,
        words: &[String],
        options: &SearchOptions,
    ) -> Vec<RemoteFile> {
        let mut files = Vec::new();

        for entry in WalkDir::new(peer_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let relative = match entry.path().strip_prefix(peer_dir) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let filename = to_network_path(relative);
            let haystack = filename.to_lowercase();

            if !words.iter().all(|w| haystack.contains(w.as_str())) {
                continue;
            }
            if !options.accepts(&filename) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(RemoteFile::new(filename, size));
        }

        files
    }

    fn resolve(&self, username: &str, filename: &str) -> Option<PathBuf> {
        let relative = PathBuf::from(normalize_remote_path(filename));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || username.contains(&['/', '\\'][..]) || username == ".." {
            return None;
        }
        Some(self.root.join(username).join(relative))
    }
}

fn to_network_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("\\")
}

fn average_speed(bytes: u64, started: Instant) -> f64 {
    let elapsed = started.elapsed().as_secs_f64();
    if elapsed <= 0.0 {
        0.0
    } else {
        bytes as f64 / elapsed
    }
}

#[async_trait]
impl NetworkSession for LocalPeerSession {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        token: &CancellationToken,
    ) -> Result<Vec<SearchResponse>, NetworkError> {
        let words: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
        if words.is_empty() {
            return Err(NetworkError::Search("empty query".to_string()));
        }

        let mut responses = Vec::new();
        for (username, peer_dir) in self.peers()? {
            if token.is_cancelled() {
                return Err(NetworkError::Cancelled);
            }
            let files = self.search_peer(&peer_dir, &words, options);
            if !files.is_empty() {
                responses.push(SearchResponse {
                    username,
                    has_free_upload_slot: true,
                    upload_speed: 0,
                    files,
                });
            }
        }

        debug!(query = %query, responses = responses.len(), "Local search finished");
        Ok(responses)
    }

    async fn download(
        &self,
        request: &TransferRequest,
        on_progress: &ProgressFn<'_>,
        token: &CancellationToken,
    ) -> Result<Transfer, NetworkError> {
        let mut transfer = Transfer::requested(request);
        on_progress(&transfer);

        let source = match self.resolve(&request.username, &request.filename) {
            Some(path) if path.is_file() => path,
            _ => {
                transfer.state = TransferState::Rejected;
                on_progress(&transfer);
                return Ok(transfer);
            }
        };

        transfer.state = TransferState::Initializing;
        on_progress(&transfer);

        let mut input = tokio::fs::File::open(&source).await?;
        let mut output = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&request.destination)
            .await?;

        let started = Instant::now();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        transfer.state = TransferState::InProgress(Activity::Transferring);

        loop {
            if token.is_cancelled() {
                transfer.state = TransferState::Cancelled;
                on_progress(&transfer);
                return Ok(transfer);
            }

            let read = input.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            output.write_all(&buffer[..read]).await?;

            transfer.bytes_transferred += read as u64;
            transfer.average_speed = average_speed(transfer.bytes_transferred, started);
            on_progress(&transfer);

            if let Some(delay) = self.chunk_delay {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        output.flush().await?;
        transfer.state = TransferState::Completed(Completion::Succeeded);
        on_progress(&transfer);
        Ok(transfer)
    }
}
