//! Front cover lookup
//!
//! Cover art is optional: every failure is logged and yields `None` so a
//! missing cover never fails a download.

use async_trait::async_trait;
use seekr_common::Album;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const COVER_ART_ARCHIVE_URL: &str = "https://coverartarchive.org";
const USER_AGENT: &str = concat!("seekr/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum CoverArtError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("No cover art for release {0}")]
    NotFound(String),

    #[error("API error {0}")]
    Api(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches an album's front cover into a directory
#[async_trait]
pub trait CoverArtProvider: Send + Sync {
    /// Path of the written cover image, if one was found
    async fn fetch(&self, album: &Album, directory: &Path) -> Option<PathBuf>;
}

/// Provider that never finds a cover
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCoverArt;

#[async_trait]
impl CoverArtProvider for NoCoverArt {
    async fn fetch(&self, _album: &Album, _directory: &Path) -> Option<PathBuf> {
        None
    }
}

/// Cover Art Archive client
pub struct CoverArtArchiveClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl CoverArtArchiveClient {
    pub fn new() -> Result<Self, CoverArtError> {
        Self::with_base_url(COVER_ART_ARCHIVE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CoverArtError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoverArtError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    fn front_url(&self, album: &Album) -> String {
        format!("{}/release/{}/front", self.base_url.trim_end_matches('/'), album.id)
    }

    async fn download_front(&self, album: &Album, directory: &Path) -> Result<PathBuf, CoverArtError> {
        let url = self.front_url(album);
        tracing::debug!(album = %album, url = %url, "Fetching front cover");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoverArtError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CoverArtError::NotFound(album.id.to_string()));
        }
        if !status.is_success() {
            return Err(CoverArtError::Api(status.as_u16()));
        }

        let extension = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(image_extension)
            .unwrap_or("jpg");

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoverArtError::Network(e.to_string()))?;

        let path = directory.join(format!("cover.{}", extension));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

#[async_trait]
impl CoverArtProvider for CoverArtArchiveClient {
    async fn fetch(&self, album: &Album, directory: &Path) -> Option<PathBuf> {
        match self.download_front(album, directory).await {
            Ok(path) => {
                tracing::info!(album = %album, path = %path.display(), "Saved front cover");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(album = %album, error = %e, "No front cover");
                None
            }
        }
    }
}

/// File extension for an image content type
fn image_extension(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}
