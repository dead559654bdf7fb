use std::sync::Arc;

use tracing::info;

use relay_core::config::{StorageBackend, StorageConfig};
use relay_store::{JsonFileStore, MemoryStore, RelayStore, SqliteStore};

/// Open the configured storage backend.
pub fn open(config: &StorageConfig) -> anyhow::Result<Arc<dyn RelayStore>> {
    let store: Arc<dyn RelayStore> = match config.backend {
        StorageBackend::Sqlite => {
            ensure_parent_dir(&config.path);
            info!(path = %config.path, "opening SQLite database");
            Arc::new(SqliteStore::open(&config.path)?)
        }
        StorageBackend::Json => {
            info!(dir = %config.path, "using JSON file storage");
            Arc::new(JsonFileStore::open(&config.path)?)
        }
        StorageBackend::Memory => {
            info!("using in-memory storage, nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
