//! Unit tests for configuration loading and graceful degradation
//!
//! Tests that manipulate TUNECAST_CONFIG are marked with #[serial] so they
//! run sequentially, not in parallel.

use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;
use tunecast_common::config::{resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use tunecast_common::Error;

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    let dir = tempfile::tempdir().unwrap();
    let cli = write_config(dir.path(), "[cache]\nttl_secs = 60\n");
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/tunecast.toml");

    let resolved = resolve_config_path(Some(&cli)).unwrap();
    assert_eq!(resolved, cli);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[batch]\nchunk_size = 25\n");
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = TomlConfig::load(None).unwrap();
    assert_eq!(config.batch.chunk_size, 25);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let config = TomlConfig::load(Some(&missing)).unwrap();
    assert_eq!(config.batch.chunk_size, 50);
    assert_eq!(config.cache.max_entries, 5000);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[cache\nttl_secs = ");

    let err = TomlConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, Error::TomlParse(_)));
}

#[test]
fn test_full_config_parses_credentials() {
    let config = TomlConfig::from_toml_str(
        r#"
        [logging]
        level = "debug"

        [resolver]
        ytdlp_path = "/usr/local/bin/yt-dlp"
        retry_attempts = 5

        [autoplay]
        related_limit = 4

        [spotify]
        client_id = "abc"
        client_secret = "def"

        [tidal]
        token = "tok"
        "#,
    )
    .unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.resolver.retry_attempts, 5);
    assert_eq!(config.autoplay.related_limit, 4);
    assert_eq!(config.spotify.unwrap().client_id, "abc");
    assert_eq!(config.tidal.unwrap().token, "tok");
}
