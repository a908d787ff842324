//! seekr-dl library interface
//!
//! Album download orchestration:
//! - [`queue`]: deduplicating retry queue of album jobs
//! - [`services::source_locator`]: search + fuzzy matching of peer listings
//! - [`services::transfer_supervisor`]: per-source downloads with cancellation
//! - [`services::album_downloader`]: end-to-end decision for one album
//! - [`worker`]: drains the queue through the album downloader

pub mod error;
pub mod network;
pub mod queue;
pub mod services;
pub mod worker;

pub use crate::error::{DownloadError, JobResult};
