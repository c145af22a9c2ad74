//! Application configuration
//!
//! Stored as JSON next to the app data (`data_items_config.json`). A missing
//! file means defaults: in-memory collection, no log directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "data_items_config.json";
pub const DEFAULT_COLLECTION: &str = "dataItems";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which document collection backs the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    Sqlite {
        path: PathBuf,
    },
    Firestore(FirestoreConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::Sqlite { .. } => "sqlite",
            BackendConfig::Firestore(_) => "firestore",
        }
    }

    /// True when items are shared beyond this device
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendConfig::Firestore(_))
    }
}

/// Cloud Firestore project settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// REST endpoint, overridable for emulators
    #[serde(default = "default_api_root")]
    pub api_root: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_root: default_api_root(),
            api_key,
            database: default_database(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_api_root() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

/// Backoff used when a subscription's live feed drops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 250,
            max_backoff_ms: 8_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt: doubles each time, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub collection: String,
    pub backend: BackendConfig,
    pub operation_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            backend: BackendConfig::default(),
            operation_timeout_ms: 10_000,
            reconnect: ReconnectPolicy::default(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load, or fall back to defaults when the file doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("collection name is empty".into()));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid("operation_timeout_ms must be positive".into()));
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "reconnect.initial_backoff_ms exceeds max_backoff_ms".into(),
            ));
        }
        match &self.backend {
            BackendConfig::Firestore(fs) if fs.project_id.trim().is_empty() => {
                Err(ConfigError::Invalid("firestore project_id is empty".into()))
            }
            BackendConfig::Firestore(fs) if !fs.api_root.starts_with("http") => {
                Err(ConfigError::Invalid("firestore api_root must be an http(s) url".into()))
            }
            BackendConfig::Firestore(fs) if fs.poll_interval_ms == 0 => {
                Err(ConfigError::Invalid("firestore poll_interval_ms must be positive".into()))
            }
            _ => Ok(()),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Switch the configured backend, keeping other settings
pub fn configure_backend(path: &Path, backend: BackendConfig) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load_or_default(path)?;
    config.backend = backend;
    config.save(path)?;
    tracing::info!(backend = config.backend.kind(), "backend configuration saved");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.collection, "dataItems");
        assert_eq!(config.backend, BackendConfig::Memory);
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "backend": { "kind": "firestore", "project_id": "demo", "api_key": "k" } }"#,
        )
        .unwrap();

        assert_eq!(config.collection, "dataItems");
        match &config.backend {
            BackendConfig::Firestore(fs) => {
                assert_eq!(fs.project_id, "demo");
                assert_eq!(fs.database, "(default)");
                assert_eq!(fs.poll_interval_ms, 2_000);
                assert_eq!(fs.api_root, "https://firestore.googleapis.com/v1");
            }
            other => panic!("unexpected backend {other:?}"),
        }
        assert!(config.backend.is_remote());
    }

    #[test]
    fn test_configure_backend_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let saved = configure_backend(
            &path,
            BackendConfig::Sqlite {
                path: dir.path().join("items.db"),
            },
        )
        .unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.backend.kind(), "sqlite");
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let mut config = AppConfig::default();
        config.backend = BackendConfig::Firestore(FirestoreConfig::new(" ", None));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut emulator = FirestoreConfig::new("demo", None);
        emulator.api_root = "localhost:8080".into();
        config.backend = BackendConfig::Firestore(emulator);
        assert!(config.validate().is_err());

        let config = AppConfig {
            operation_timeout_ms: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(80), Duration::from_millis(1_000));
    }
}
