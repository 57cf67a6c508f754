//! Stored entry type.

use crate::utils::{to_chrono, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A short-lived piece of cross-invocation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Store key.
    pub key: String,
    /// Stored value.
    pub payload: serde_json::Value,
    /// When the entry was last written.
    pub created_at: Timestamp,
}

impl PendingEntry {
    /// Creates an entry stamped at `created_at`.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: serde_json::Value, created_at: Timestamp) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at,
        }
    }

    /// Returns true if `now - created_at > ttl`.
    ///
    /// An entry exactly `ttl` old is still live.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp, ttl: Duration) -> bool {
        now - self.created_at > to_chrono(ttl)
    }
}
