//! Configuration loading
//!
//! Seekr is configured from a single TOML file. The file location is resolved
//! in priority order:
//! 1. Command-line argument (`--config`)
//! 2. `SEEKR_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/seekr/config.toml` on Linux)
//!
//! Only `library_path` is required; every section has built-in defaults.
//! The file carries network credentials, so [`write_toml_config`] creates it
//! with 0600 permissions on unix.

use crate::naming::{normalize_extension, LibraryLayout};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "SEEKR_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root of the music library (`<library>/<artist>/<album>/`)
    pub library_path: PathBuf,

    /// Parent directory for per-attempt scratch directories
    ///
    /// Default: OS temp directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_path: Option<PathBuf>,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub tagging: TaggingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Library naming formats (see [`crate::naming`] for tokens)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "default_artist_format")]
    pub artist_format: String,
    #[serde(default = "default_album_format")]
    pub album_format: String,
    #[serde(default = "default_track_format")]
    pub track_format: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            artist_format: default_artist_format(),
            album_format: default_album_format(),
            track_format: default_track_format(),
        }
    }
}

/// Network credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Search options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Accepted file extensions, without leading dot
    #[serde(default = "default_file_types")]
    pub file_types: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            file_types: default_file_types(),
        }
    }
}

/// Transfer watchdog thresholds
///
/// Unset `delay_seconds` disables the watchdog entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Wall-clock limit for one source attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,

    /// Grace delay after a transfer starts before thresholds apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u64>,

    /// Minimum average speed in bytes per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_speed_bytes: Option<u64>,

    /// Cancel transfers still queued by the peer after the grace delay
    #[serde(default)]
    pub cancel_when_queued_remotely: bool,
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_minutes.map(|m| Duration::from_secs(m * 60))
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_seconds.map(Duration::from_secs)
    }
}

/// Retry queue options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Wait before retrying deferred albums
    #[serde(default = "default_retry_wait_seconds")]
    pub retry_wait_seconds: u64,
    /// Failed passes before an album is abandoned; unset retries forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_wait_seconds: default_retry_wait_seconds(),
            max_attempts: None,
        }
    }
}

impl QueueConfig {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingConfig {
    /// Remove tags written by the uploader before writing ours
    #[serde(default)]
    pub strip_existing_metadata: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_artist_format() -> String {
    "%A".to_string()
}

fn default_album_format() -> String {
    "%T (%Y)".to_string()
}

fn default_track_format() -> String {
    "%n %t".to_string()
}

fn default_file_types() -> Vec<String> {
    vec!["flac".to_string(), "mp3".to_string()]
}

fn default_retry_wait_seconds() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Example configuration written by `seekr config init`
    pub fn example(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            scratch_path: None,
            naming: NamingConfig::default(),
            network: NetworkConfig {
                username: "username".to_string(),
                password: "password".to_string(),
            },
            search: SearchConfig::default(),
            watchdog: WatchdogConfig {
                timeout_minutes: Some(30),
                delay_seconds: Some(30),
                minimum_speed_bytes: Some(50_000),
                cancel_when_queued_remotely: true,
            },
            queue: QueueConfig::default(),
            tagging: TaggingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Library layout built from `library_path` and `[naming]`
    pub fn layout(&self) -> LibraryLayout {
        LibraryLayout::new(
            self.library_path.clone(),
            self.naming.artist_format.clone(),
            self.naming.album_format.clone(),
            self.naming.track_format.clone(),
        )
    }

    /// Parent directory for scratch directories
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_path
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    fn normalize(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        self.search.file_types = self
            .search
            .file_types
            .iter()
            .map(|t| normalize_extension(t))
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();

        if self.search.file_types.is_empty() {
            return Err(Error::Config(
                "search.file_types must list at least one extension".to_string(),
            ));
        }
        if self.library_path.as_os_str().is_empty() {
            return Err(Error::Config("library_path must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Resolve the config file path (CLI > `SEEKR_CONFIG` > platform default)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("seekr").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let mut config: TomlConfig = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    config.normalize()?;

    #[cfg(unix)]
    {
        let loose = check_toml_permissions_loose(path).unwrap_or(false);
        if loose && !config.network.password.is_empty() {
            warn!(
                path = %path.display(),
                "Config file contains a password and is readable by other users (expected 0600)"
            );
        }
    }

    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write config atomically (temp file + rename), 0600 on unix
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

/// True if group or other users can read or write the file
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: TomlConfig = toml::from_str(r#"library_path = "/music""#).unwrap();

        assert_eq!(config.library_path, PathBuf::from("/music"));
        assert_eq!(config.naming, NamingConfig::default());
        assert_eq!(config.search.file_types, vec!["flac", "mp3"]);
        assert_eq!(config.queue.retry_wait(), Duration::from_secs(300));
        assert_eq!(config.watchdog.delay(), None);
        assert!(!config.watchdog.cancel_when_queued_remotely);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_library_path_is_rejected() {
        let result = toml::from_str::<TomlConfig>("[logging]\nlevel = \"debug\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_normalizes_file_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "library_path = \"/music\"\n[search]\nfile_types = [\".FLAC\", \"Mp3\", \"flac\"]\n",
        )
        .unwrap();

        let config = load_toml_config(&path).unwrap();
        assert_eq!(config.search.file_types, vec!["flac", "mp3"]);
    }

    #[test]
    fn test_load_rejects_empty_file_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "library_path = \"/music\"\n[search]\nfile_types = []\n").unwrap();

        assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = load_toml_config(Path::new("/nonexistent/seekr.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/seekr.toml"));
    }

    #[test]
    fn test_watchdog_durations() {
        let watchdog = WatchdogConfig {
            timeout_minutes: Some(2),
            delay_seconds: Some(30),
            minimum_speed_bytes: Some(1000),
            cancel_when_queued_remotely: false,
        };
        assert_eq!(watchdog.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(watchdog.delay(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_write_then_load_example() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = TomlConfig::example("/srv/music");

        write_toml_config(&config, &path).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = load_toml_config(&path).unwrap();
        assert_eq!(loaded.library_path, PathBuf::from("/srv/music"));
        assert_eq!(loaded.watchdog, config.watchdog);
        assert_eq!(loaded.network, config.network);
    }

    #[test]
    #[cfg(unix)]
    fn test_write_sets_owner_only_permissions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        write_toml_config(&TomlConfig::example("/music"), &path).unwrap();
        assert!(!check_toml_permissions_loose(&path).unwrap());
    }

    #[test]
    fn test_layout_uses_naming_section() {
        let mut config = TomlConfig::example("/music");
        config.naming.album_format = "%Y - %T".to_string();

        let layout = config.layout();
        assert_eq!(layout.library_path, PathBuf::from("/music"));
        assert_eq!(layout.album_format, "%Y - %T");
    }
}
