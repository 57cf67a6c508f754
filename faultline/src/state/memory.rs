//! In-memory state store.

use super::entry::PendingEntry;
use super::store::StateStore;
use crate::errors::StoreError;
use crate::utils::{system_clock, Clock};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// State store backed by a single mutex-guarded map.
///
/// Every operation runs under the one lock, so a `sweep` and a `take` racing
/// on the same key are ordered by whichever acquires the lock first.
#[derive(Debug)]
pub struct InMemoryStateStore {
    entries: Mutex<HashMap<String, PendingEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStateStore {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: system_clock(),
        }
    }

    /// Sets the clock used to stamp and expire entries.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn put(&self, key: &str, payload: serde_json::Value) -> Result<(), StoreError> {
        let entry = PendingEntry::new(key, payload, self.clock.now());
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.entries.lock().get(key).map(|e| e.payload.clone()))
    }

    async fn take(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.entries.lock().remove(key).map(|e| e.payload))
    }

    async fn entry(&self, key: &str) -> Result<Option<PendingEntry>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn sweep(&self, ttl: Duration) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            let expired = entry.is_expired(now, ttl);
            if expired {
                tracing::debug!(key = %key, "Sweeping expired entry");
            }
            !expired
        });
        Ok(before - entries.len())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<_> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.lock().len())
    }
}
