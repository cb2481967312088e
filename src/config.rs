//! # Configuration Management
//!
//! One explicit configuration value, built once at process start and handed to
//! each component constructor.
//!
//! ## Configuration Sources
//! - Environment variables via `from_env()` (after an optional `.env` file)
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//!
//! Missing object-store credentials are a startup-fatal error; see
//! [`SyncConfig::validate_strict`].

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Max allowed RCON packet length (1 MB)
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Object key of the lock record
pub const LOCK_KEY: &str = "server.lock";

/// Object key of the current dataset archive
pub const DATA_ARCHIVE_KEY: &str = "server-data.tar.gz";

/// Key prefix for timestamped backups
pub const BACKUP_PREFIX: &str = "backups/";

/// Suffix every snapshot archive carries
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SyncConfig {
    /// Object store connectivity
    #[serde(default)]
    pub store: StoreConfig,

    /// Local dataset location
    #[serde(default)]
    pub data: DataConfig,

    /// RCON connection settings
    #[serde(default)]
    pub rcon: RconConfig,

    /// Backup scheduling and retention
    #[serde(default)]
    pub backup: BackupConfig,

    /// Server log watching
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| SyncError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| SyncError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| SyncError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// Unparsable numeric values are configuration errors rather than being
    /// silently replaced by defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("STORE_BACKEND") {
            config.store.backend = parse_var("STORE_BACKEND", &v)?;
        }
        if let Some(v) = get("STORE_LOCAL_ROOT") {
            config.store.local_root = PathBuf::from(v);
        }
        if let Some(v) = get("R2_ACCOUNT_ID") {
            config.store.account_id = v;
        }
        if let Some(v) = get("R2_ACCESS_KEY_ID") {
            config.store.access_key_id = v;
        }
        if let Some(v) = get("R2_SECRET_ACCESS_KEY") {
            config.store.secret_access_key = v;
        }
        if let Some(v) = get("R2_BUCKET_NAME") {
            config.store.bucket = v;
        }
        if let Some(v) = get("R2_ENDPOINT") {
            config.store.endpoint = v;
        }
        if let Some(v) = get("R2_REGION") {
            config.store.region = v;
        }

        if let Some(v) = get("LOCAL_DATA_DIR") {
            config.data.local_dir = PathBuf::from(v);
        }

        if let Some(v) = get("RCON_HOST") {
            config.rcon.host = v;
        }
        if let Some(v) = get("RCON_PORT") {
            config.rcon.port = parse_var("RCON_PORT", &v)?;
        }
        if let Some(v) = get("RCON_PASSWORD") {
            config.rcon.password = v;
        }
        if let Some(v) = get("MAX_RETRIES") {
            config.rcon.max_retries = parse_var("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_INTERVAL") {
            config.rcon.retry_interval = Duration::from_secs(parse_var("RETRY_INTERVAL", &v)?);
        }

        if let Some(v) = get("BACKUP_INTERVAL_MINUTES") {
            let minutes: u64 = parse_var("BACKUP_INTERVAL_MINUTES", &v)?;
            let secs = minutes.checked_mul(60).ok_or_else(|| {
                SyncError::ConfigError(format!("BACKUP_INTERVAL_MINUTES out of range: {v}"))
            })?;
            config.backup.interval = Duration::from_secs(secs);
        }
        if let Some(v) = get("MAX_BACKUPS") {
            config.backup.max_backups = parse_var("MAX_BACKUPS", &v)?;
        }
        if let Some(v) = get("HOST_DISPLAY_NAME") {
            config.backup.host_display_name = v;
        }

        if let Some(v) = get("LOG_FILE_PATH") {
            config.watch.log_file = PathBuf::from(v);
        }

        if let Some(v) = get("LOG_LEVEL") {
            config.logging.log_level = v
                .parse::<Level>()
                .map_err(|_| SyncError::ConfigError(format!("Invalid LOG_LEVEL: {v}")))?;
        }
        if let Some(v) = get("LOG_FORMAT") {
            config.logging.json_format = v.eq_ignore_ascii_case("json");
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.store.validate());
        errors.extend(self.data.validate());
        errors.extend(self.rcon.validate());
        errors.extend(self.backup.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SyncError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| SyncError::ConfigError(format!("Invalid value for {key}: '{value}'")))
}

/// Which object store implementation holds the lock and archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// S3-compatible HTTP endpoint
    #[default]
    S3,
    /// Directory tree, e.g. a mount shared by every host
    Local,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" | "r2" => Ok(StoreBackend::S3),
            "local" => Ok(StoreBackend::Local),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Object store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store implementation
    pub backend: StoreBackend,

    /// Root directory for the `local` backend
    pub local_root: PathBuf,

    /// Account identifier (required by the hosting provider)
    pub account_id: String,

    /// Access key id
    pub access_key_id: String,

    /// Secret access key
    pub secret_access_key: String,

    /// Bucket holding the lock, archive and backups
    pub bucket: String,

    /// Endpoint URL, e.g. `https://<account>.r2.cloudflarestorage.com`
    pub endpoint: String,

    /// Signing region
    pub region: String,

    /// Use the store's conditional create for the lock record when available
    pub conditional_lock: bool,

    /// Per-request timeout
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::S3,
            local_root: PathBuf::new(),
            account_id: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: String::new(),
            endpoint: String::new(),
            region: String::from("auto"),
            conditional_lock: true,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl StoreConfig {
    /// Validate store configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.request_timeout.as_secs() < 1 {
            errors.push("Store request timeout too short (minimum: 1s)".to_string());
        }

        if self.backend == StoreBackend::Local {
            if self.local_root.as_os_str().is_empty() {
                errors.push("Local store root cannot be empty (set STORE_LOCAL_ROOT)".to_string());
            }
            return errors;
        }

        let required = [
            ("R2_ACCOUNT_ID", &self.account_id),
            ("R2_ACCESS_KEY_ID", &self.access_key_id),
            ("R2_SECRET_ACCESS_KEY", &self.secret_access_key),
            ("R2_BUCKET_NAME", &self.bucket),
            ("R2_ENDPOINT", &self.endpoint),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            errors.push(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            ));
        }

        if !self.endpoint.is_empty()
            && !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://"))
        {
            errors.push(format!(
                "Invalid store endpoint: '{}' (expected an http(s) URL)",
                self.endpoint
            ));
        }

        errors
    }
}

/// Local dataset settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the live world data
    pub local_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::from("./data"),
        }
    }
}

impl DataConfig {
    /// Validate data configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.local_dir.as_os_str().is_empty() {
            errors.push("Local data directory cannot be empty".to_string());
        }
        errors
    }
}

/// RCON connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RconConfig {
    /// Server host name or address
    pub host: String,

    /// RCON port
    pub port: u16,

    /// RCON password
    pub password: String,

    /// Timeout for a single TCP connect attempt
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Attempts made while waiting for the server to come up
    pub max_retries: u32,

    /// Delay between those attempts
    #[serde(with = "duration_secs")]
    pub retry_interval: Duration,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: String::from("server"),
            port: 25575,
            password: String::from("minecraft"),
            connect_timeout: Duration::from_secs(10),
            max_retries: 30,
            retry_interval: Duration::from_secs(5),
        }
    }
}

impl RconConfig {
    /// Validate RCON configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("RCON host cannot be empty".to_string());
        }
        if self.port == 0 {
            errors.push("RCON port must be greater than 0".to_string());
        }
        if self.password.is_empty() {
            errors.push("RCON password cannot be empty".to_string());
        }
        if self.max_retries == 0 {
            errors.push("Max retries must be greater than 0".to_string());
        }
        if self.connect_timeout.as_secs() < 1 {
            errors.push("Connect timeout too short (minimum: 1s)".to_string());
        }
        if self.retry_interval.as_secs() > 300 {
            errors.push("Retry interval too long (maximum: 300s)".to_string());
        }

        errors
    }

    /// `host:port` form used in diagnostics
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Backup scheduling and retention
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Time between scheduled backups
    #[serde(with = "duration_secs")]
    pub interval: Duration,

    /// Number of timestamped backups to keep
    pub max_backups: usize,

    /// Key prefix for timestamped backups
    pub prefix: String,

    /// Name shown to players for the current host
    pub host_display_name: String,

    /// Pause after `save-all flush` so the server finishes writing
    #[serde(with = "duration_secs")]
    pub flush_grace: Duration,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            max_backups: 3,
            prefix: String::from(BACKUP_PREFIX),
            host_display_name: String::from("Unknown"),
            flush_grace: Duration::from_secs(2),
        }
    }
}

impl BackupConfig {
    /// Validate backup configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.interval.as_secs() < 60 {
            errors.push("Backup interval too short (minimum: 1 minute)".to_string());
        }
        if self.max_backups == 0 {
            errors.push("Max backups must be greater than 0".to_string());
        }
        if self.prefix.is_empty() {
            errors.push("Backup prefix cannot be empty".to_string());
        } else if self.prefix == LOCK_KEY || self.prefix == DATA_ARCHIVE_KEY {
            errors.push(format!(
                "Backup prefix '{}' collides with a reserved key",
                self.prefix
            ));
        }

        errors
    }
}

/// Server log watching
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Path of the server's rolling log
    pub log_file: PathBuf,

    /// How often to poll for new lines
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/app/logs/latest.log"),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

/// Helper module for whole-second Duration serialization
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Helper module for millisecond Duration serialization
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
