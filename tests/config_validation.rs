//! Integration tests for configuration loading and validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::Level;
use world_sync::config::{BackupConfig, RconConfig, StoreBackend, StoreConfig, SyncConfig};
use world_sync::error::SyncError;

fn complete_env() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("R2_ACCOUNT_ID", "acct"),
        ("R2_ACCESS_KEY_ID", "AKID"),
        ("R2_SECRET_ACCESS_KEY", "secret"),
        ("R2_BUCKET_NAME", "worlds"),
        ("R2_ENDPOINT", "https://acct.r2.cloudflarestorage.com"),
    ])
}

fn from_map(vars: &HashMap<&'static str, &'static str>) -> Result<SyncConfig, SyncError> {
    SyncConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
}

#[test]
fn test_defaults_with_only_credentials() {
    let config = from_map(&complete_env()).expect("config");
    assert_eq!(config.store.region, "auto");
    assert_eq!(config.data.local_dir, PathBuf::from("./data"));
    assert_eq!(config.rcon.host, "server");
    assert_eq!(config.rcon.port, 25575);
    assert_eq!(config.rcon.password, "minecraft");
    assert_eq!(config.rcon.max_retries, 30);
    assert_eq!(config.rcon.retry_interval, Duration::from_secs(5));
    assert_eq!(config.backup.interval, Duration::from_secs(30 * 60));
    assert_eq!(config.backup.max_backups, 3);
    assert_eq!(config.backup.host_display_name, "Unknown");
    assert_eq!(config.watch.log_file, PathBuf::from("/app/logs/latest.log"));
    assert_eq!(config.logging.log_level, Level::INFO);

    let errors = config.validate();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn test_environment_overrides() {
    let mut vars = complete_env();
    vars.insert("RCON_PORT", "25576");
    vars.insert("MAX_BACKUPS", "7");
    vars.insert("BACKUP_INTERVAL_MINUTES", "15");
    vars.insert("LOCAL_DATA_DIR", "/srv/world");
    vars.insert("LOG_LEVEL", "debug");
    vars.insert("LOG_FORMAT", "json");

    let config = from_map(&vars).expect("config");
    assert_eq!(config.rcon.port, 25576);
    assert_eq!(config.backup.max_backups, 7);
    assert_eq!(config.backup.interval, Duration::from_secs(15 * 60));
    assert_eq!(config.data.local_dir, PathBuf::from("/srv/world"));
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.logging.json_format);
}

#[test]
fn test_missing_credentials_are_listed() {
    let mut vars = complete_env();
    vars.remove("R2_SECRET_ACCESS_KEY");
    vars.remove("R2_BUCKET_NAME");

    let config = from_map(&vars).expect("config");
    let errors = config.validate();
    assert!(errors.iter().any(|e| e
        == "Missing required environment variables: R2_SECRET_ACCESS_KEY, R2_BUCKET_NAME"));

    match config.validate_strict() {
        Err(SyncError::ConfigError(msg)) => assert!(msg.contains("R2_BUCKET_NAME")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_blank_variables_count_as_missing() {
    let mut vars = complete_env();
    vars.insert("R2_ENDPOINT", "   ");
    let config = from_map(&vars).expect("config");
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("R2_ENDPOINT")));
}

#[test]
fn test_unparsable_number_is_an_error() {
    let mut vars = complete_env();
    vars.insert("RCON_PORT", "not-a-port");
    assert!(matches!(from_map(&vars), Err(SyncError::ConfigError(_))));
}

#[test]
fn test_huge_backup_interval_is_an_error() {
    let mut vars = complete_env();
    vars.insert("BACKUP_INTERVAL_MINUTES", "18446744073709551615");
    match from_map(&vars) {
        Err(SyncError::ConfigError(msg)) => assert!(msg.contains("BACKUP_INTERVAL_MINUTES")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_local_backend_needs_no_credentials() {
    let vars = HashMap::from([
        ("STORE_BACKEND", "local"),
        ("STORE_LOCAL_ROOT", "/mnt/shared/worlds"),
    ]);
    let config = from_map(&vars).expect("config");
    assert_eq!(config.store.backend, StoreBackend::Local);
    assert_eq!(config.store.local_root, PathBuf::from("/mnt/shared/worlds"));
    assert!(config.validate().is_empty(), "{:?}", config.validate());
}

#[test]
fn test_local_backend_requires_root() {
    let config = from_map(&HashMap::from([("STORE_BACKEND", "local")])).expect("config");
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("STORE_LOCAL_ROOT")));
}

#[test]
fn test_unknown_backend_is_an_error() {
    let vars = HashMap::from([("STORE_BACKEND", "ftp")]);
    assert!(matches!(from_map(&vars), Err(SyncError::ConfigError(_))));
}

#[test]
fn test_endpoint_must_be_http_url() {
    let config = SyncConfig::default_with_overrides(|c| {
        c.store = StoreConfig {
            account_id: "a".into(),
            access_key_id: "b".into(),
            secret_access_key: "c".into(),
            bucket: "d".into(),
            endpoint: "ftp://example.com".into(),
            ..Default::default()
        };
    });
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Invalid store endpoint")));
}

#[test]
fn test_rcon_validation() {
    let rcon = RconConfig {
        host: String::new(),
        port: 0,
        max_retries: 0,
        ..Default::default()
    };
    let errors = rcon.validate();
    assert!(errors.iter().any(|e| e.contains("host cannot be empty")));
    assert!(errors.iter().any(|e| e.contains("port must be greater than 0")));
    assert!(errors.iter().any(|e| e.contains("Max retries")));
}

#[test]
fn test_backup_validation() {
    let backup = BackupConfig {
        interval: Duration::from_secs(10),
        max_backups: 0,
        ..Default::default()
    };
    let errors = backup.validate();
    assert!(errors.iter().any(|e| e.contains("interval too short")));
    assert!(errors.iter().any(|e| e.contains("greater than 0")));
}

#[test]
fn test_toml_sections_are_optional() {
    let config = SyncConfig::from_toml(
        r#"
[rcon]
host = "mc.internal"
port = 25580

[store]
backend = "local"
local_root = "/srv/bucket"

[backup]
max_backups = 10
"#,
    )
    .expect("parse");
    assert_eq!(config.rcon.host, "mc.internal");
    assert_eq!(config.rcon.port, 25580);
    assert_eq!(config.rcon.password, "minecraft");
    assert_eq!(config.backup.max_backups, 10);
    assert_eq!(config.store.region, "auto");
    assert_eq!(config.store.backend, StoreBackend::Local);
    assert_eq!(config.store.local_root, PathBuf::from("/srv/bucket"));
}

#[test]
fn test_invalid_toml_is_config_error() {
    assert!(matches!(
        SyncConfig::from_toml("[rcon\nport = "),
        Err(SyncError::ConfigError(_))
    ));
}
