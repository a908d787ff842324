//! Audio tag writing
//!
//! Downloaded files carry whatever tags the peer gave them. Before commit every
//! file is tagged from the resolved release metadata so the library is
//! consistent regardless of the source.

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};
use seekr_common::{Album, Track};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Failed to read tags from {path}: {message}")]
    Read { path: String, message: String },

    #[error("No writable tag for {0}")]
    NoWritableTag(String),

    #[error("Failed to read cover image: {0}")]
    Picture(String),

    #[error("Failed to write tags to {path}: {message}")]
    Write { path: String, message: String },
}

/// Writes release metadata into one audio file
pub trait TagWriter: Send + Sync {
    fn write_tags(
        &self,
        file: &Path,
        track: &Track,
        album: &Album,
        cover: Option<&Path>,
    ) -> Result<(), TagError>;
}

/// [`TagWriter`] backed by `lofty`
#[derive(Debug, Clone, Default)]
pub struct LoftyTagWriter {
    /// Drop every existing tag before writing
    pub strip_existing: bool,
}

impl LoftyTagWriter {
    pub fn new(strip_existing: bool) -> Self {
        Self { strip_existing }
    }
}

fn load_picture(cover: &Path) -> Result<Picture, TagError> {
    let mut reader = std::fs::File::open(cover)
        .map_err(|e| TagError::Picture(format!("{}: {}", cover.display(), e)))?;
    let mut picture =
        Picture::from_reader(&mut reader).map_err(|e| TagError::Picture(e.to_string()))?;
    picture.set_pic_type(PictureType::CoverFront);
    Ok(picture)
}

fn apply_release(tag: &mut Tag, track: &Track, album: &Album) {
    tag.set_title(track.title.clone());
    tag.set_album(album.title.clone());
    tag.set_artist(album.artist_names());
    tag.set_track(track.number);
    tag.set_track_total(album.tracks.len() as u32);
    tag.set_year(album.year() as u32);

    tag.insert_text(ItemKey::AlbumArtist, album.artist_names());
    let sort_names: Vec<&str> = album.artists.iter().map(|a| a.sort_name.as_str()).collect();
    tag.insert_text(ItemKey::TrackArtistSortOrder, sort_names.join("; "));
    tag.insert_text(ItemKey::AlbumArtistSortOrder, sort_names.join("; "));

    tag.insert_text(ItemKey::MusicBrainzReleaseId, album.id.to_string());
    tag.insert_text(ItemKey::MusicBrainzTrackId, track.id.to_string());
    if let Some(artist) = album.primary_artist() {
        tag.insert_text(ItemKey::MusicBrainzArtistId, artist.id.to_string());
        tag.insert_text(ItemKey::MusicBrainzReleaseArtistId, artist.id.to_string());
    }
}

impl TagWriter for LoftyTagWriter {
    fn write_tags(
        &self,
        file: &Path,
        track: &Track,
        album: &Album,
        cover: Option<&Path>,
    ) -> Result<(), TagError> {
        let path = file.display().to_string();
        let mut tagged_file = read_from_path(file).map_err(|e| TagError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;

        if self.strip_existing {
            tagged_file.clear();
        }

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let picture = cover.map(load_picture).transpose()?;

        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| TagError::NoWritableTag(path.clone()))?;
        apply_release(tag, track, album);
        if let Some(picture) = picture {
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(picture);
        }

        tagged_file
            .save_to_path(file, WriteOptions::default())
            .map_err(|e| TagError::Write {
                path: path.clone(),
                message: e.to_string(),
            })?;

        debug!(file = %path, track = %track, "Wrote tags");
        Ok(())
    }
}
