//! Library consistency check
//!
//! Walks `<library>/<artist>/<album>/` and compares each album directory with
//! its `.metadata.json` sidecar.

use seekr_common::models::{read_album_file, SIDECAR_FILE_NAME};
use seekr_common::naming::{normalize_extension, LibraryLayout};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions counted as audio files
const AUDIO_EXTENSIONS: &[&str] = &["flac", "mp3", "ogg", "opus", "m4a", "wav", "aac", "wma"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumProblem {
    MissingSidecar,
    UnreadableSidecar(String),
    NoAudioFiles,
    MissingTracks(Vec<String>),
    ExtraFiles(Vec<String>),
}

impl fmt::Display for AlbumProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlbumProblem::MissingSidecar => write!(f, "missing {}", SIDECAR_FILE_NAME),
            AlbumProblem::UnreadableSidecar(e) => write!(f, "unreadable {}: {}", SIDECAR_FILE_NAME, e),
            AlbumProblem::NoAudioFiles => write!(f, "no audio files"),
            AlbumProblem::MissingTracks(names) => write!(f, "missing tracks: {}", names.join(", ")),
            AlbumProblem::ExtraFiles(names) => write!(f, "unexpected files: {}", names.join(", ")),
        }
    }
}

/// Problems found in one album directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumReport {
    pub directory: PathBuf,
    pub problems: Vec<AlbumProblem>,
}

impl AlbumReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .map(|ext| AUDIO_EXTENSIONS.contains(&normalize_extension(&ext.to_string_lossy()).as_str()))
        .unwrap_or(false)
}

fn file_names(directory: &Path) -> Vec<PathBuf> {
    WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Check one album directory
pub fn check_album(layout: &LibraryLayout, directory: &Path) -> AlbumReport {
    let mut problems = Vec::new();
    let sidecar = directory.join(SIDECAR_FILE_NAME);
    let files = file_names(directory);
    let audio: Vec<&PathBuf> = files.iter().filter(|p| is_audio(p)).collect();

    if audio.is_empty() {
        problems.push(AlbumProblem::NoAudioFiles);
    }

    if !sidecar.is_file() {
        problems.push(AlbumProblem::MissingSidecar);
    } else {
        match read_album_file(&sidecar) {
            Err(e) => problems.push(AlbumProblem::UnreadableSidecar(e.to_string())),
            Ok(album) => {
                if let Some(first) = audio.first() {
                    let extension = first
                        .extension()
                        .map(|e| normalize_extension(&e.to_string_lossy()))
                        .unwrap_or_default();
                    let expected: BTreeSet<String> = album
                        .tracks
                        .iter()
                        .map(|t| layout.track_file_name(t, &album, &extension))
                        .collect();
                    let actual: BTreeSet<String> = audio
                        .iter()
                        .filter_map(|p| p.file_name())
                        .map(|n| n.to_string_lossy().to_string())
                        .collect();

                    let missing: Vec<String> = expected.difference(&actual).cloned().collect();
                    let extra: Vec<String> = actual.difference(&expected).cloned().collect();
                    if !missing.is_empty() {
                        problems.push(AlbumProblem::MissingTracks(missing));
                    }
                    if !extra.is_empty() {
                        problems.push(AlbumProblem::ExtraFiles(extra));
                    }
                }
            }
        }
    }

    AlbumReport {
        directory: directory.to_path_buf(),
        problems,
    }
}

/// Check every `<artist>/<album>` directory of the library
pub fn check_library(layout: &LibraryLayout) -> Vec<AlbumReport> {
    WalkDir::new(&layout.library_path)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| {
            let report = check_album(layout, e.path());
            if report.is_ok() {
                tracing::debug!(directory = %e.path().display(), "Album OK");
            } else {
                for problem in &report.problems {
                    tracing::warn!(directory = %e.path().display(), problem = %problem, "Album problem");
                }
            }
            report
        })
        .collect()
}
