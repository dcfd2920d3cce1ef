//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::ApiConfig;
use crate::cursor::CursorConfig;
use crate::events::ERROR_NAMESPACE;
use crate::hub::HubConfig;
use crate::storage::{
    Backend, CompressionType, FileBackend, FileBackendConfig, MemoryBackend, SqliteBackend,
    StorageResult, SyncMode,
};
use crate::store::StoreConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub cursor: CursorConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which backing medium to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    File,
    Sqlite,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "sqlite" => Ok(BackendKind::Sqlite),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Backing medium and store options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub compression: CompressionType,

    #[serde(default)]
    pub sync_mode: SyncMode,

    #[serde(default = "default_sync_threshold")]
    pub sync_threshold_bytes: usize,

    /// Reject the whole envelope when any sample is invalid
    #[serde(default = "default_atomic_envelopes")]
    pub atomic_envelopes: bool,

    /// Namespace that receives failure events; empty disables recording
    #[serde(default = "default_error_namespace")]
    pub error_namespace: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("keyseries").to_string_lossy().to_string())
        .unwrap_or_else(|| "./keyseries_data".to_string())
}

fn default_sync_threshold() -> usize {
    64 * 1024 // 64 KB
}

fn default_atomic_envelopes() -> bool {
    true
}

fn default_error_namespace() -> String {
    ERROR_NAMESPACE.to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
            compression: CompressionType::default(),
            sync_mode: SyncMode::default(),
            sync_threshold_bytes: default_sync_threshold(),
            atomic_envelopes: default_atomic_envelopes(),
            error_namespace: default_error_namespace(),
        }
    }
}

impl StorageSection {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            atomic_envelopes: self.atomic_envelopes,
        }
    }

    /// Open the configured backing medium
    pub fn open_backend(&self) -> StorageResult<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self.backend {
            BackendKind::File => {
                let config = FileBackendConfig {
                    data_dir: self.data_path(),
                    sync_mode: self.sync_mode,
                    compression: self.compression,
                    sync_threshold: self.sync_threshold_bytes,
                };
                Arc::new(FileBackend::open(config)?)
            }
            BackendKind::Sqlite => {
                Arc::new(SqliteBackend::open(&self.data_path(), self.compression)?)
            }
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(backend)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Defaults plus environment variable overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("keyseries").join("config.toml")),
            Some(PathBuf::from("/etc/keyseries/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(data_dir) = var("KEYSERIES_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Some(backend) = var("KEYSERIES_BACKEND") {
            match backend.parse() {
                Ok(kind) => self.storage.backend = kind,
                Err(e) => tracing::warn!("Ignoring KEYSERIES_BACKEND: {}", e),
            }
        }

        if let Some(host) = var("KEYSERIES_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("KEYSERIES_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        if let Some(level) = var("KEYSERIES_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("KEYSERIES_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# keyseries Configuration
#
# Environment variables override these settings:
# - KEYSERIES_DATA_DIR
# - KEYSERIES_BACKEND
# - KEYSERIES_API_HOST
# - KEYSERIES_API_PORT
# - KEYSERIES_LOG_LEVEL
# - KEYSERIES_LOG_FORMAT

[storage]
# Backing medium: file, sqlite or memory
backend = "file"

# Directory for data files
data_dir = "~/.local/share/keyseries"

# Batch compression: lz4 or none
compression = "lz4"

# File backend fsync policy: every_write, batched or none
sync_mode = "batched"

# Bytes appended between fsyncs in batched mode
sync_threshold_bytes = 65536

# Reject a whole envelope when any sample fails validation
atomic_envelopes = true

# Failures are recorded as entries under this namespace ("" disables)
error_namespace = "_errors"

[hub]
# Maximum concurrent live-update connections
max_connections = 1000

# Notifications buffered per connection before deliveries fail
channel_capacity = 256

[cursor]
# Abandon a reload after this many milliseconds (0 = wait forever)
reload_timeout_ms = 0

# Entries per page for index cursors
page_size = 100

# Seconds per page for time cursors
page_span_secs = 3600

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8082

# Maximum request body (bytes)
max_body_size = 10485760

# Maximum samples per envelope
max_envelope_entries = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
