//! Config loader integration tests.
//!
//! Exercises `ConfigLoader::load` against TOML files on disk, since unit
//! tests in `src/config.rs` already cover the in-memory error paths.

use evo_common::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
use serde::Deserialize;
use std::fs;
use tempfile::TempDir;

#[derive(Debug, Deserialize)]
struct AppConfig {
    shared: SharedConfig,
}

#[test]
fn loads_config_from_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.toml");
    fs::write(
        &path,
        r#"
[shared]
log_level = "warn"
service_name = "remote-trigger-server"
"#,
    )
    .unwrap();

    let config = AppConfig::load(&path).unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Warn);
    assert_eq!(config.shared.service_name, "remote-trigger-server");
    assert!(config.shared.validate().is_ok());
}

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = AppConfig::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound));
}

#[test]
fn invalid_toml_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[shared\nlog_level = \"warn\"").unwrap();

    let err = AppConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}
