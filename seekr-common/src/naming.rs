//! Library naming rules
//!
//! Formats artist/album/track names from `%`-token templates and computes the
//! final library layout (`<library>/<artist>/<album>/<track>.<ext>`).
//!
//! Also hosts the helpers for remote (network) paths, which always use `\`
//! separators regardless of the peer's platform.

use crate::models::{Album, Track};
use std::path::{Path, PathBuf};

/// Characters that are not allowed in a single path component
const INVALID_PATH_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replace `%X` tokens in a single left-to-right pass
///
/// Unknown tokens are copied through unchanged, `%%` yields a literal `%`.
fn replace_tokens(format: &str, lookup: impl Fn(char) -> Option<String>) -> String {
    let mut result = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                result.push('%');
            }
            Some(token) => match lookup(token) {
                Some(value) => {
                    chars.next();
                    result.push_str(&value);
                }
                None => result.push('%'),
            },
            None => result.push('%'),
        }
    }

    result
}

fn sort_names(album: &Album) -> String {
    album
        .artists
        .iter()
        .map(|a| a.sort_name.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Format the artist directory name
///
/// Tokens: `%A` artist names, `%S` artist sort names
pub fn format_artist(album: &Album, format: &str) -> String {
    replace_tokens(format, |token| match token {
        'A' => Some(album.artist_names()),
        'S' => Some(sort_names(album)),
        _ => None,
    })
}

/// Format the album directory name
///
/// Tokens: `%A`, `%S`, `%T` album title, `%Y` release year
pub fn format_album(album: &Album, format: &str) -> String {
    replace_tokens(format, |token| match token {
        'A' => Some(album.artist_names()),
        'S' => Some(sort_names(album)),
        'T' => Some(album.title.clone()),
        'Y' => Some(album.year().to_string()),
        _ => None,
    })
}

/// Format a track file stem
///
/// Tokens: `%A`, `%S`, `%T`, `%Y`, `%t` track title, `%n` track number,
/// `%N` track count (both zero-padded to two digits)
pub fn format_track(track: &Track, album: &Album, format: &str) -> String {
    replace_tokens(format, |token| match token {
        'A' => Some(album.artist_names()),
        'S' => Some(sort_names(album)),
        'T' => Some(album.title.clone()),
        'Y' => Some(album.year().to_string()),
        't' => Some(track.title.clone()),
        'n' => Some(format!("{:02}", track.number)),
        'N' => Some(format!("{:02}", album.tracks.len())),
        _ => None,
    })
}

/// Make a string safe to use as a single path component
pub fn sanitize_path_component(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_PATH_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Final library layout for committed albums
#[derive(Debug, Clone)]
pub struct LibraryLayout {
    pub library_path: PathBuf,
    pub artist_format: String,
    pub album_format: String,
    pub track_format: String,
}

impl LibraryLayout {
    pub fn new(
        library_path: impl Into<PathBuf>,
        artist_format: impl Into<String>,
        album_format: impl Into<String>,
        track_format: impl Into<String>,
    ) -> Self {
        Self {
            library_path: library_path.into(),
            artist_format: artist_format.into(),
            album_format: album_format.into(),
            track_format: track_format.into(),
        }
    }

    /// `<library>/<artist>`
    pub fn artist_dir(&self, album: &Album) -> PathBuf {
        self.library_path
            .join(sanitize_path_component(&format_artist(album, &self.artist_format)))
    }

    /// `<library>/<artist>/<album>`
    pub fn album_dir(&self, album: &Album) -> PathBuf {
        self.artist_dir(album)
            .join(sanitize_path_component(&format_album(album, &self.album_format)))
    }

    /// Sanitised track file name; `extension` is given without the leading dot
    pub fn track_file_name(&self, track: &Track, album: &Album, extension: &str) -> String {
        let stem = format_track(track, album, &self.track_format);
        if extension.is_empty() {
            sanitize_path_component(&stem)
        } else {
            sanitize_path_component(&format!("{stem}.{extension}"))
        }
    }
}

/// Convert network path separators (`\`) to `/`
pub fn normalize_remote_path(filename: &str) -> String {
    filename.replace('\\', "/")
}

/// Last component of a remote path
pub fn remote_file_name(filename: &str) -> String {
    let normalized = normalize_remote_path(filename);
    match normalized.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => normalized,
    }
}

/// Parent directory of a remote path ("" for a bare file name)
pub fn remote_parent_dir(filename: &str) -> String {
    let normalized = normalize_remote_path(filename);
    match normalized.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Lowercase extension of a remote path, without the dot
pub fn remote_extension(filename: &str) -> Option<String> {
    let name = remote_file_name(filename);
    Path::new(&name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Normalise a configured file type (".FLAC" -> "flac")
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artist;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn album() -> Album {
        Album {
            artists: vec![
                Artist::new(Uuid::new_v4(), "The Artist"),
                Artist::new(Uuid::new_v4(), "Guest"),
            ],
            id: Uuid::new_v4(),
            title: "Title: Deluxe".to_string(),
            date: NaiveDate::from_ymd_opt(2001, 3, 4).unwrap(),
            tracks: vec![
                Track::new(Uuid::new_v4(), 1, "One"),
                Track::new(Uuid::new_v4(), 2, "Two/Three"),
            ],
        }
    }

    #[test]
    fn test_format_artist_tokens() {
        let album = album();
        assert_eq!(format_artist(&album, "%A"), "The Artist, Guest");
        assert_eq!(format_artist(&album, "%S"), "Artist, The; Guest");
        assert_eq!(format_artist(&album, "100%% %A"), "100% The Artist, Guest");
    }

    #[test]
    fn test_format_album_and_track_tokens() {
        let album = album();
        assert_eq!(format_album(&album, "%T (%Y)"), "Title: Deluxe (2001)");
        assert_eq!(
            format_track(&album.tracks[1], &album, "%n of %N - %t"),
            "02 of 02 - Two/Three"
        );
    }

    #[test]
    fn test_escaped_percent_is_not_a_token() {
        let album = album();
        assert_eq!(format_album(&album, "%%T"), "%T");
        assert_eq!(format_album(&album, "%Q%"), "%Q%");
    }

    #[test]
    fn test_layout_sanitizes_components() {
        let album = album();
        let layout = LibraryLayout::new("/music", "%A", "%T (%Y)", "%n %t");

        assert_eq!(
            layout.album_dir(&album),
            PathBuf::from("/music/The Artist, Guest/Title_ Deluxe (2001)")
        );
        assert_eq!(
            layout.track_file_name(&album.tracks[1], &album, "flac"),
            "02 Two_Three.flac"
        );
    }

    #[test]
    fn test_remote_path_helpers() {
        let path = "@@share\\Music\\Artist\\Album\\01 Intro.FLAC";
        assert_eq!(remote_file_name(path), "01 Intro.FLAC");
        assert_eq!(remote_parent_dir(path), "@@share/Music/Artist/Album");
        assert_eq!(remote_extension(path).as_deref(), Some("flac"));
        assert_eq!(remote_extension("README"), None);
        assert_eq!(remote_parent_dir("file.mp3"), "");
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".FLAC"), "flac");
        assert_eq!(normalize_extension("mp3"), "mp3");
    }
}
