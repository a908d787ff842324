//! Download pipeline services
//!
//! - [`source_locator`]: search and match peer listings against an album
//! - [`transfer_supervisor`]: download one source with layered cancellation
//! - [`album_downloader`]: orchestrate one album end to end
//! - [`cover_art`], [`tagging`]: post-download collaborators
//! - [`library_check`]: verify committed albums against their sidecars

pub mod album_downloader;
pub mod cover_art;
pub mod fuzzy;
pub mod library_check;
pub mod source_locator;
pub mod tagging;
pub mod transfer_supervisor;
pub mod watchdog;

pub use album_downloader::{commit, AlbumDownloader, DownloadOutcome};
pub use cover_art::{CoverArtArchiveClient, CoverArtError, CoverArtProvider, NoCoverArt};
pub use library_check::{check_album, check_library, AlbumProblem, AlbumReport};
pub use source_locator::{
    build_sources, match_tracks, rank_responses, search_queries, DownloadSource, MatchRejection,
    SourceLocator, TrackMatch, MATCH_THRESHOLD,
};
pub use tagging::{LoftyTagWriter, TagError, TagWriter};
pub use transfer_supervisor::{
    DownloadResult, DownloadedFile, SourceCancelHandle, SourceFailure, TransferSupervisor,
};
pub use watchdog::{WatchdogPolicy, WatchdogReason};
