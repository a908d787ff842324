//! # Seekr Common Library
//!
//! Shared code for the seekr crates including:
//! - Release metadata models (Album, Artist, Track)
//! - Library naming and path sanitising
//! - Configuration loading
//! - Download progress events (DownloadEvent enum, EventBus)

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod naming;

pub use error::{Error, Result};
pub use models::{Album, Artist, Track};
