//! TTL-bounded cross-invocation state.
//!
//! Entries carry their write time and are removed either explicitly
//! (`take`) or by an externally scheduled `sweep`. Reads never expire.

mod correlation;
mod entry;
mod file;
mod memory;
mod store;

pub use correlation::{Callback, CallbackTokens, Correlation, CorrelationHandler, Decision};
pub use entry::PendingEntry;
pub use file::FileStateStore;
pub use memory::InMemoryStateStore;
pub use store::{StateStore, StateStoreExt};

use crate::config::StoreConfig;
use std::sync::Arc;

/// Opens the store described by `config`: file-backed when a path is set.
#[must_use]
pub fn open_store(config: &StoreConfig) -> Arc<dyn StateStore> {
    match &config.path {
        Some(path) => Arc::new(FileStateStore::new(path)),
        None => Arc::new(InMemoryStateStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_store_picks_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            ttl_seconds: 60,
            path: Some(dir.path().join("state.json")),
        };
        let store = open_store(&config);
        store.put("k", serde_json::json!(1)).await.unwrap();
        assert!(dir.path().join("state.json").exists());

        let memory = open_store(&StoreConfig::default());
        assert_eq!(memory.len().await.unwrap(), 0);
    }
}
