//! Settings Screen Actions

use std::path::Path;

use serde::Serialize;

use data_items_lib::config::{configure_backend, AppConfig, BackendConfig, ConfigError};

use crate::models::{Gateway, GatewayResult};

pub const APP_NAME: &str = "Data Items";

/// Delete every item. Returns how many were removed.
pub async fn clear_all_data(gateway: &Gateway) -> GatewayResult<usize> {
    let removed = gateway.clear_all().await?;
    tracing::info!(removed, "all data cleared from settings");
    Ok(removed)
}

/// Shown under "Data Management"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSummary {
    pub kind: &'static str,
    pub collection: String,
    pub remote: bool,
    /// False for a remote store missing its credentials
    pub configured: bool,
    pub detail: String,
}

pub fn backend_summary(config: &AppConfig) -> BackendSummary {
    let (configured, detail) = match &config.backend {
        BackendConfig::Memory => (true, "Items are kept in memory on this device".to_string()),
        BackendConfig::Sqlite { path } => (true, format!("Local database at {}", path.display())),
        BackendConfig::Firestore(fs) => {
            let has_key = fs.api_key.as_deref().is_some_and(|key| !key.trim().is_empty());
            let detail = if has_key {
                format!("Firestore project {} ({})", fs.project_id, fs.database)
            } else {
                format!("Firestore project {} has no API key", fs.project_id)
            };
            (has_key, detail)
        }
    };

    BackendSummary {
        kind: config.backend.kind(),
        collection: config.collection.clone(),
        remote: config.backend.is_remote(),
        configured,
        detail,
    }
}

/// Save a new backend choice to the config file.
///
/// Takes effect the next time the app initializes its gateway.
pub fn save_backend(
    config_path: &Path,
    backend: BackendConfig,
) -> Result<BackendSummary, ConfigError> {
    let config = configure_backend(config_path, backend)?;
    Ok(backend_summary(&config))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AboutInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

pub fn about() -> AboutInfo {
    AboutInfo {
        name: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
        description: "Centralized data management with live synchronization and CRUD operations.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewItem};
    use data_items_lib::config::{FirestoreConfig, CONFIG_FILE_NAME};
    use data_items_lib::gateway::GatewayOptions;
    use data_items_lib::repository::MemoryCollection;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_clear_all_data() {
        let collection = Arc::new(MemoryCollection::new("dataItems"));
        let gateway = Gateway::new(collection, GatewayOptions::default());
        for title in ["Trip", "Budget", "Gym"] {
            gateway
                .create(NewItem::new(title, "something", Category::Other))
                .await
                .unwrap();
        }

        assert_eq!(clear_all_data(&gateway).await.unwrap(), 3);
        assert!(gateway.fetch_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_default_backend_summary() {
        let summary = backend_summary(&AppConfig::default());
        assert_eq!(summary.kind, "memory");
        assert_eq!(summary.collection, "dataItems");
        assert!(!summary.remote);
        assert!(summary.configured);
    }

    #[test]
    fn test_firestore_without_key_is_not_configured() {
        let config = AppConfig {
            backend: BackendConfig::Firestore(FirestoreConfig::new("demo", None)),
            ..AppConfig::default()
        };
        let summary = backend_summary(&config);
        assert!(summary.remote);
        assert!(!summary.configured);
        assert!(summary.detail.contains("demo"));
    }

    #[test]
    fn test_save_backend_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let summary = save_backend(
            &path,
            BackendConfig::Firestore(FirestoreConfig::new("demo", Some("key".into()))),
        )
        .unwrap();

        assert!(summary.configured);
        assert!(AppConfig::load(&path).unwrap().backend.is_remote());
    }

    #[test]
    fn test_about() {
        let info = about();
        assert_eq!(info.name, "Data Items");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
