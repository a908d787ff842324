//! Integration tests for config file resolution and loading
//!
//! Tests that manipulate SEEKR_CONFIG are marked with #[serial] so they do
//! not race each other.

use seekr_common::config::{
    load_toml_config, resolve_config_path, write_toml_config, TomlConfig, CONFIG_ENV_VAR,
};
use seekr_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/seekr-env.toml");

    let path = resolve_config_path(Some(Path::new("/tmp/seekr-cli.toml"))).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/seekr-cli.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_overrides_default_location() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/seekr-env.toml");

    let path = resolve_config_path(None).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/seekr-env.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_default_location_is_under_config_dir() {
    env::remove_var(CONFIG_ENV_VAR);

    if let Some(config_dir) = dirs::config_dir() {
        let path = resolve_config_path(None).unwrap();
        assert_eq!(path, config_dir.join("seekr").join("config.toml"));
    }
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");

    let path = resolve_config_path(None);
    if dirs::config_dir().is_some() {
        assert!(path.unwrap().ends_with("seekr/config.toml"));
    }

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_full_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
library_path = "/music"
scratch_path = "/var/tmp/seekr"

[naming]
album_format = "%Y - %T"

[network]
username = "listener"
password = "secret"

[search]
file_types = ["FLAC"]

[watchdog]
timeout_minutes = 20
delay_seconds = 30
minimum_speed_bytes = 1000
cancel_when_queued_remotely = true

[queue]
retry_wait_seconds = 60

[tagging]
strip_existing_metadata = true

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.scratch_root(), PathBuf::from("/var/tmp/seekr"));
    assert_eq!(config.naming.album_format, "%Y - %T");
    assert_eq!(config.naming.artist_format, "%A");
    assert_eq!(config.network.username, "listener");
    assert_eq!(config.search.file_types, vec!["flac"]);
    assert_eq!(config.watchdog.minimum_speed_bytes, Some(1000));
    assert!(config.watchdog.cancel_when_queued_remotely);
    assert_eq!(config.queue.retry_wait_seconds, 60);
    assert!(config.tagging.strip_existing_metadata);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_config_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "library_path = [not toml").unwrap();

    match load_toml_config(&path) {
        Err(Error::Config(msg)) => assert!(msg.contains("config.toml")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_write_overwrites_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "old contents").unwrap();

    let config = TomlConfig::example("/library");
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.library_path, PathBuf::from("/library"));
}
