//! Release metadata models
//!
//! Albums are resolved externally (metadata catalog) and are immutable inputs to
//! the download pipeline. The same JSON shape is written next to every committed
//! album as the `.metadata.json` sidecar.

use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use uuid::Uuid;

/// File name of the per-album sidecar record
pub const SIDECAR_FILE_NAME: &str = ".metadata.json";

/// Credited artist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    /// Artist identifier (MusicBrainz artist id)
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Name used for alphabetical sorting ("Beatles, The")
    pub sort_name: String,
}

impl Artist {
    /// Create an artist, deriving the sort name from the display name
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        let name = name.into();
        let sort_name = sort_name(&name);
        Self { id, name, sort_name }
    }
}

/// Move a leading "The " to the end of the name
pub fn sort_name(name: &str) -> String {
    match name.strip_prefix("The ") {
        Some(rest) => format!("{rest}, The"),
        None => name.to_string(),
    }
}

/// One track of an album, in playback order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Track identifier (MusicBrainz track id)
    pub id: Uuid,
    /// 1-based position on the release
    pub number: u32,
    /// Track title
    pub title: String,
}

impl Track {
    pub fn new(id: Uuid, number: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            number,
            title: title.into(),
        }
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02} - {}", self.number, self.title)
    }
}

/// A release to download
///
/// Equality and hashing use the release id only, so the same logical album
/// constructed twice is recognised as one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    /// Credited artists, primary artist first
    pub artists: Vec<Artist>,
    /// Release identifier (MusicBrainz release id)
    pub id: Uuid,
    /// Release title
    pub title: String,
    /// Release date
    pub date: NaiveDate,
    /// Tracks in canonical order
    pub tracks: Vec<Track>,
}

impl Album {
    /// First credited artist, used for network searches
    pub fn primary_artist(&self) -> Option<&Artist> {
        self.artists.first()
    }

    /// Artist names joined with ", "
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Release year
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Check the invariants the download pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.artists.is_empty() {
            return Err(Error::InvalidInput(format!(
                "album {} has no credited artists",
                self.id
            )));
        }
        if self.tracks.is_empty() {
            return Err(Error::InvalidInput(format!("album {} has no tracks", self.id)));
        }

        let mut numbers = HashSet::new();
        for track in &self.tracks {
            if track.number == 0 {
                return Err(Error::InvalidInput(format!(
                    "track '{}' has number 0 (numbers are 1-based)",
                    track.title
                )));
            }
            if !numbers.insert(track.number) {
                return Err(Error::InvalidInput(format!(
                    "album {} has duplicate track number {}",
                    self.id, track.number
                )));
            }
        }

        Ok(())
    }
}

impl PartialEq for Album {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Album {}

impl Hash for Album {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Album {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist_names(), self.title, self.year())
    }
}

/// Read an album from a JSON file (sidecar or hand-written album description)
pub fn read_album_file(path: &Path) -> Result<Album> {
    let content = std::fs::read_to_string(path)?;
    let album: Album = serde_json::from_str(&content)?;
    album.validate()?;
    Ok(album)
}

/// Write an album as pretty-printed JSON
pub fn write_album_file(album: &Album, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(album)?;
    std::fs::write(path, content)?;
    Ok(())
}
