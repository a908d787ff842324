//! Common error types for seekr

use thiserror::Error;

/// Common result type for seekr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across seekr crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error, e.g. a malformed album sidecar
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or malformed release metadata
    #[error("Invalid input: {0}")]
    InvalidInput(String),}
