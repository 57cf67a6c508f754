//! State store trait and typed helpers.

use super::entry::PendingEntry;
use crate::errors::StoreError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Key-value store for state that must outlive one invocation.
///
/// Reads never expire entries; only [`StateStore::sweep`] does, on whatever
/// schedule the host runs it.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Inserts or replaces `key`, stamping it with the current time.
    async fn put(&self, key: &str, payload: serde_json::Value) -> Result<(), StoreError>;

    /// Returns the payload for `key` without side effects.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Removes `key` and returns its payload.
    async fn take(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Returns the full entry for `key`.
    async fn entry(&self, key: &str) -> Result<Option<PendingEntry>, StoreError>;

    /// Deletes entries older than `ttl` and returns how many were removed.
    async fn sweep(&self, ttl: Duration) -> Result<usize, StoreError>;

    /// Returns the stored keys in sorted order.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Returns the number of entries.
    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.keys().await?.len())
    }
}

/// Serde helpers over any [`StateStore`].
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Serializes `value` and stores it.
    async fn put_json<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_value(value)?;
        self.put(key, payload).await
    }

    /// Reads and deserializes `key`.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        match self.get(key).await? {
            Some(payload) => Ok(Some(serde_json::from_value(payload)?)),
            None => Ok(None),
        }
    }

    /// Takes and deserializes `key`.
    ///
    /// The entry is removed even if it fails to deserialize.
    async fn take_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        match self.take(key).await? {
            Some(payload) => Ok(Some(serde_json::from_value(payload)?)),
            None => Ok(None),
        }
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}
