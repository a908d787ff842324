//! Source locator
//!
//! Turns one album into a ranked list of [`DownloadSource`]s:
//! 1. Search `"{primary artist} {title}"`, falling back to the title cut at
//!    the first `:` or `-` when nothing answers
//! 2. Rank responses: free upload slot first, then upload speed (both descending)
//! 3. Match every track to exactly one file per response, greedily in album
//!    order, rejecting the whole response on any failed check
//!
//! Greedy matching is not a globally optimal assignment. Listings are small
//! and the threshold plus the directory/extension checks keep false
//! positives out.

use crate::network::{NetworkError, NetworkSession, RemoteFile, SearchOptions, SearchResponse};
use crate::services::fuzzy::partial_ratio;
use chrono::Utc;
use seekr_common::events::{DownloadEvent, EventBus};
use seekr_common::naming::{remote_extension, remote_file_name, remote_parent_dir};
use seekr_common::{Album, Track};
use std::collections::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Minimum partial-ratio score for a track/file match
pub const MATCH_THRESHOLD: u8 = 70;

/// One track assigned to one remote file
#[derive(Debug, Clone)]
pub struct TrackMatch {
    pub track: Track,
    pub file: RemoteFile,
    pub score: u8,
}

/// A validated peer: every album track mapped to one of its files
#[derive(Debug, Clone)]
pub struct DownloadSource {
    pub username: String,
    /// Matches in album track order
    pub files: Vec<TrackMatch>,
}

impl DownloadSource {
    /// Shared extension of the matched files
    pub fn extension(&self) -> Option<String> {
        self.files
            .first()
            .and_then(|m| remote_extension(&m.file.filename))
    }

    /// Total advertised size in bytes
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|m| m.file.size).sum()
    }
}

/// Why a peer response was not turned into a source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchRejection {
    #[error("peer offers {found} files, album has {expected} tracks")]
    FileCountMismatch { expected: usize, found: usize },

    #[error("no unclaimed file left for track '{track}'")]
    NoCandidate { track: String },

    #[error("best match for track '{track}' is '{filename}' with score {score}")]
    BelowThreshold {
        track: String,
        filename: String,
        score: u8,
    },

    #[error("matched files span {0} directories")]
    MixedDirectories(usize),

    #[error("matched files have {0} different extensions")]
    MixedExtensions(usize),
}

/// Search queries for an album, primary first
pub fn search_queries(album: &Album) -> Vec<String> {
    let artist = album
        .primary_artist()
        .map(|a| a.name.as_str())
        .unwrap_or_default();

    let mut queries = vec![format!("{} {}", artist, album.title).trim().to_string()];

    if album.title.contains(&[':', '-'][..]) {
        let truncated = album
            .title
            .split(&[':', '-'][..])
            .next()
            .unwrap_or_default()
            .trim();
        if !truncated.is_empty() {
            queries.push(format!("{} {}", artist, truncated).trim().to_string());
        }
    }

    queries
}

/// Order responses by free upload slot, then upload speed (stable)
pub fn rank_responses(responses: &mut [SearchResponse]) {
    responses.sort_by(|a, b| {
        b.has_free_upload_slot
            .cmp(&a.has_free_upload_slot)
            .then(b.upload_speed.cmp(&a.upload_speed))
    });
}

/// String each remote file name is scored against
fn match_target(track: &Track) -> String {
    format!("{:02} {}", track.number, track.title)
}

/// Map every album track to one file of `response`
///
/// Files outside `options` are ignored. The filtered pool must have exactly
/// as many files as the album has tracks. Each track takes the best-scoring
/// unclaimed file; on equal scores the file listed first wins.
pub fn match_tracks(
    album: &Album,
    response: &SearchResponse,
    options: &SearchOptions,
) -> Result<DownloadSource, MatchRejection> {
    let pool: Vec<&RemoteFile> = response
        .files
        .iter()
        .filter(|f| options.accepts(&f.filename))
        .collect();

    if pool.len() != album.tracks.len() {
        return Err(MatchRejection::FileCountMismatch {
            expected: album.tracks.len(),
            found: pool.len(),
        });
    }

    let mut claimed = vec![false; pool.len()];
    let mut matches = Vec::with_capacity(album.tracks.len());

    for track in &album.tracks {
        let target = match_target(track);

        let best = pool
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed[*i])
            .map(|(i, file)| (i, partial_ratio(&remote_file_name(&file.filename), &target)))
            .fold(None, |best: Option<(usize, u8)>, (i, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((i, score)),
            });

        let (index, score) = best.ok_or_else(|| MatchRejection::NoCandidate {
            track: track.to_string(),
        })?;
        let file = pool[index];

        if score < MATCH_THRESHOLD {
            return Err(MatchRejection::BelowThreshold {
                track: track.to_string(),
                filename: remote_file_name(&file.filename),
                score,
            });
        }

        debug!(
            track = %track,
            file = %remote_file_name(&file.filename),
            score,
            "Matched track"
        );

        claimed[index] = true;
        matches.push(TrackMatch {
            track: track.clone(),
            file: file.clone(),
            score,
        });
    }

    let directories: HashSet<String> = matches
        .iter()
        .map(|m| remote_parent_dir(&m.file.filename))
        .collect();
    if directories.len() > 1 {
        return Err(MatchRejection::MixedDirectories(directories.len()));
    }

    let extensions: HashSet<Option<String>> = matches
        .iter()
        .map(|m| remote_extension(&m.file.filename))
        .collect();
    if extensions.len() > 1 {
        return Err(MatchRejection::MixedExtensions(extensions.len()));
    }

    Ok(DownloadSource {
        username: response.username.clone(),
        files: matches,
    })
}

/// Build sources from ranked responses, skipping rejected ones
pub fn build_sources(
    album: &Album,
    responses: &[SearchResponse],
    options: &SearchOptions,
) -> Vec<DownloadSource> {
    responses
        .iter()
        .filter_map(|response| match match_tracks(album, response, options) {
            Ok(source) => {
                debug!(
                    username = %response.username,
                    files = source.files.len(),
                    "Accepted source"
                );
                Some(source)
            }
            Err(rejection) => {
                debug!(
                    username = %response.username,
                    reason = %rejection,
                    "Rejected source"
                );
                None
            }
        })
        .collect()
}

/// Searches a session and matches the responses against an album
pub struct SourceLocator<'a> {
    session: &'a dyn NetworkSession,
    options: SearchOptions,
    events: &'a EventBus,
}

impl<'a> SourceLocator<'a> {
    pub fn new(session: &'a dyn NetworkSession, file_types: &[String], events: &'a EventBus) -> Self {
        Self {
            session,
            options: SearchOptions {
                file_extensions: file_types.to_vec(),
            },
            events,
        }
    }

    /// Ranked, validated sources for `album` (empty if nothing matched)
    pub async fn locate(
        &self,
        album: &Album,
        token: &CancellationToken,
    ) -> Result<Vec<DownloadSource>, NetworkError> {
        let responses = self.search(album, token).await?;
        let sources = build_sources(album, &responses, &self.options);

        info!(
            album = %album,
            responses = responses.len(),
            sources = sources.len(),
            "Located download sources"
        );
        self.events.emit_lossy(DownloadEvent::SourcesLocated {
            album_id: album.id,
            responses: responses.len(),
            sources: sources.len(),
            timestamp: Utc::now(),
        });

        Ok(sources)
    }

    /// Ranked responses for the first query that gets any
    async fn search(
        &self,
        album: &Album,
        token: &CancellationToken,
    ) -> Result<Vec<SearchResponse>, NetworkError> {
        for query in search_queries(album) {
            self.events.emit_lossy(DownloadEvent::SearchStarted {
                album_id: album.id,
                query: query.clone(),
                timestamp: Utc::now(),
            });

            let mut responses = self.session.search(&query, &self.options, token).await?;
            if !responses.is_empty() {
                rank_responses(&mut responses);
                debug!(query = %query, responses = responses.len(), "Search answered");
                return Ok(responses);
            }
            debug!(query = %query, "No results");
        }

        Ok(Vec::new())
    }
}
