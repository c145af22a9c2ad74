//! Data Items Backend
//!
//! Layered architecture:
//! - domain: Item entity, categories and validation rules
//! - repository: Document collections (memory, SQLite, Firestore)
//! - gateway: Bounded CRUD and live subscriptions over one collection
//! - config: JSON app configuration

use std::path::PathBuf;
use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod repository;

pub use config::{AppConfig, BackendConfig, ConfigError, CONFIG_FILE_NAME};
pub use gateway::{Gateway, GatewayOptions};

use repository::{DocumentCollection, FirestoreCollection, MemoryCollection, SqliteCollection};

/// App name used for log files
pub const APP_NAME: &str = "DataItems";

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open {backend} collection: {source}")]
    Collection {
        backend: &'static str,
        #[source]
        source: error::CollectionError,
    },

    #[error(transparent)]
    Logger(#[from] rolling_logger::LoggerError),
}

/// Application state shared with the view models
#[derive(Debug, Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub config: AppConfig,
}

/// Build the collection named by the config
pub fn open_collection(config: &AppConfig) -> Result<Arc<dyn DocumentCollection>, InitError> {
    let name = config.collection.clone();
    let opened: Result<Arc<dyn DocumentCollection>, _> = match &config.backend {
        BackendConfig::Memory => {
            Ok(Arc::new(MemoryCollection::new(name)) as Arc<dyn DocumentCollection>)
        }
        BackendConfig::Sqlite { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            SqliteCollection::open(path, name).map(|c| Arc::new(c) as Arc<dyn DocumentCollection>)
        }
        BackendConfig::Firestore(fs) => {
            FirestoreCollection::new(fs, name, config.operation_timeout())
                .map(|c| Arc::new(c) as Arc<dyn DocumentCollection>)
        }
    };

    opened.map_err(|source| InitError::Collection {
        backend: config.backend.kind(),
        source,
    })
}

/// Install the rolling logger when a log directory is configured.
///
/// A logger installed earlier in the process is kept.
pub fn init_logging(
    config: &AppConfig,
) -> Result<Option<rolling_logger::RollingLogger>, InitError> {
    let Some(dir) = &config.log_dir else {
        return Ok(None);
    };
    match rolling_logger::init_logger(dir, APP_NAME) {
        Ok(logger) => Ok(Some(logger)),
        Err(rolling_logger::LoggerError::AlreadyInitialized) => {
            tracing::debug!("logger already installed");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Validate the config, start logging and open the gateway
pub fn init(config: AppConfig) -> Result<AppState, InitError> {
    config.validate()?;
    init_logging(&config)?;

    let collection = open_collection(&config)?;
    let gateway = Gateway::new(collection, GatewayOptions::from(&config));

    let _ = rolling_logger::info(&format!(
        "Gateway ready: {} collection '{}'",
        config.backend.kind(),
        config.collection
    ));
    tracing::info!(
        backend = config.backend.kind(),
        collection = %config.collection,
        "gateway initialized"
    );

    Ok(AppState { gateway, config })
}

/// Load `data_items_config.json` from `app_dir` and initialize from it
pub fn init_from_dir(app_dir: impl Into<PathBuf>) -> Result<AppState, InitError> {
    let path = app_dir.into().join(CONFIG_FILE_NAME);
    let config = AppConfig::load_or_default(&path)?;
    init(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, NewItem};

    #[tokio::test]
    async fn test_init_memory_backend() {
        let state = init(AppConfig::default()).expect("init failed");
        assert_eq!(state.gateway.collection_name(), "dataItems");

        let id = state
            .gateway
            .create(NewItem::new("Trip", "Pack bags", Category::Travel))
            .await
            .unwrap();
        let items = state.gateway.fetch_all().await.unwrap();
        assert_eq!(items[0].id, id);
    }

    #[tokio::test]
    async fn test_init_sqlite_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            backend: BackendConfig::Sqlite {
                path: dir.path().join("data").join("items.db"),
            },
            ..AppConfig::default()
        };

        let state = init(config).expect("init failed");
        assert!(state.gateway.fetch_all().await.unwrap().is_empty());
        assert!(dir.path().join("data").join("items.db").exists());
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = AppConfig {
            collection: "  ".into(),
            ..AppConfig::default()
        };
        assert!(matches!(init(config), Err(InitError::Config(_))));
    }

    #[test]
    fn test_init_from_dir_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = init_from_dir(dir.path()).unwrap();
        assert_eq!(state.config, AppConfig::default());
    }

    #[test]
    fn test_no_log_dir_skips_logger() {
        assert!(init_logging(&AppConfig::default()).unwrap().is_none());
    }
}
