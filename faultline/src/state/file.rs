//! JSON-file state store for runtimes that do not keep processes alive.

use super::entry::PendingEntry;
use super::store::StateStore;
use crate::errors::StoreError;
use crate::utils::{system_clock, Clock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, PendingEntry>,
}

/// State store persisted as one JSON document.
///
/// Operations are serialized by an async mutex and every write replaces the
/// file through a temp file and rename, so readers never see a torn document.
/// Only one process may own a given path.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl FileStateStore {
    /// Opens a store at `path`; the file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            clock: system_clock(),
        }
    }

    /// Sets the clock used to stamp and expire entries.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_string(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StoreDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(StoreError::io(self.path_string(), e)),
        }
    }

    async fn save(&self, mut document: StoreDocument) -> Result<(), StoreError> {
        document.version = DOCUMENT_VERSION;
        let bytes = serde_json::to_vec_pretty(&document)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(self.path_string(), e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::io(tmp.display().to_string(), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(self.path_string(), e))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn put(&self, key: &str, payload: serde_json::Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        document.entries.insert(
            key.to_string(),
            PendingEntry::new(key, payload, self.clock.now()),
        );
        self.save(document).await
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        Ok(document.entries.remove(key).map(|e| e.payload))
    }

    async fn take(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let taken = document.entries.remove(key);
        if taken.is_some() {
            self.save(document).await?;
        }
        Ok(taken.map(|e| e.payload))
    }

    async fn entry(&self, key: &str) -> Result<Option<PendingEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        Ok(document.entries.remove(key))
    }

    async fn sweep(&self, ttl: Duration) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let now = self.clock.now();
        let before = document.entries.len();
        document.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let removed = before - document.entries.len();
        if removed > 0 {
            tracing::debug!(path = %self.path.display(), removed, "Swept expired entries");
            self.save(document).await?;
        }
        Ok(removed)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.entries.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");

        FileStateStore::new(&path)
            .put("job-1", serde_json::json!({"title": "Rust CLI"}))
            .await
            .unwrap();

        let reopened = FileStateStore::new(&path);
        assert_eq!(
            reopened.take("job-1").await.unwrap(),
            Some(serde_json::json!({"title": "Rust CLI"}))
        );
        assert_eq!(FileStateStore::new(&path).take("job-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/state.json"));
        assert_eq!(store.get("x").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0);
        assert_eq!(store.sweep(Duration::from_secs(1)).await.unwrap(), 0);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_sweep_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let clock = Arc::new(ManualClock::starting_now());
        let store = FileStateStore::new(&path).with_clock(clock.clone());

        store.put("a", serde_json::json!(1)).await.unwrap();
        clock.advance(Duration::from_secs(120));
        store.put("b", serde_json::json!(2)).await.unwrap();
        clock.advance(Duration::from_secs(1));

        assert_eq!(store.sweep(Duration::from_secs(120)).await.unwrap(), 1);
        assert_eq!(FileStateStore::new(&path).keys().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{broken").unwrap();

        let err = FileStateStore::new(&path).get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
