//! Append-only error audit trail.

use crate::core::CallOutcome;
use crate::utils::{system_clock, to_chrono, Clock, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One recorded error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Where the error happened (workflow, step or dependency).
    pub source: String,
    /// Error message.
    pub message: String,
    /// When it happened.
    pub occurred_at: Timestamp,
    /// Extra context such as job id or HTTP status.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl ErrorRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(source: impl Into<String>, message: impl Into<String>, occurred_at: Timestamp) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            occurred_at,
            context: HashMap::new(),
        }
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Returns the grouping fingerprint of `(source, message)`.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.source, &self.message)
    }
}

/// Errors grouped by `(source, message)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSignature {
    /// Error source.
    pub source: String,
    /// Error message.
    pub message: String,
    /// Occurrences in the window.
    pub count: u64,
    /// Latest occurrence.
    pub last_seen: Timestamp,
    /// Short stable hash of source and message.
    pub fingerprint: String,
}

/// Returns the first 16 hex chars of SHA-256 over `source` and `message`.
#[must_use]
pub fn fingerprint(source: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(message.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Groups records at or after `since`, most frequent first.
///
/// Ties are ordered by most recent occurrence.
#[must_use]
pub fn group_signatures<'a, I>(records: I, since: Timestamp) -> Vec<ErrorSignature>
where
    I: IntoIterator<Item = &'a ErrorRecord>,
{
    let mut groups: HashMap<String, ErrorSignature> = HashMap::new();
    for record in records.into_iter().filter(|r| r.occurred_at >= since) {
        let key = record.fingerprint();
        groups
            .entry(key.clone())
            .and_modify(|sig| {
                sig.count += 1;
                sig.last_seen = sig.last_seen.max(record.occurred_at);
            })
            .or_insert_with(|| ErrorSignature {
                source: record.source.clone(),
                message: record.message.clone(),
                count: 1,
                last_seen: record.occurred_at,
                fingerprint: key,
            });
    }
    let mut signatures: Vec<_> = groups.into_values().collect();
    signatures.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
    });
    signatures
}

/// Destination for error records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends a record.
    async fn append(&self, record: ErrorRecord) -> CallOutcome<()>;

    /// Returns signatures seen within `window` of now, most frequent first.
    async fn query_recent(&self, window: Duration) -> CallOutcome<Vec<ErrorSignature>>;
}

/// In-memory audit sink.
#[derive(Debug)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<ErrorRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditSink {
    /// Creates an empty sink on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            clock: system_clock(),
        }
    }

    /// Sets the clock used for window queries.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns all records.
    #[must_use]
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.read().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: ErrorRecord) -> CallOutcome<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn query_recent(&self, window: Duration) -> CallOutcome<Vec<ErrorSignature>> {
        let since = self.clock.now() - to_chrono(window);
        Ok(group_signatures(self.records.read().iter(), since))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    #[test]
    fn test_fingerprint_stable_and_separated() {
        assert_eq!(fingerprint("claude", "timeout"), fingerprint("claude", "timeout"));
        assert_eq!(fingerprint("claude", "timeout").len(), 16);
        assert_ne!(fingerprint("ab", "c"), fingerprint("a", "bc"));
    }

    #[tokio::test]
    async fn test_query_recent_groups_and_orders() {
        let clock = Arc::new(ManualClock::starting_now());
        let sink = InMemoryAuditSink::new().with_clock(clock.clone());
        let now = clock.now();

        for _ in 0..3 {
            sink.append(ErrorRecord::new("clickup", "503 Service Unavailable", now))
                .await
                .unwrap();
        }
        sink.append(ErrorRecord::new("claude", "rate limited", now)).await.unwrap();
        sink.append(ErrorRecord::new(
            "claude",
            "rate limited",
            now - chrono::Duration::days(8),
        ))
        .await
        .unwrap();

        let signatures = sink.query_recent(Duration::from_secs(7 * 86_400)).await.unwrap();
        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0].source, "clickup");
        assert_eq!(signatures[0].count, 3);
        assert_eq!(signatures[1].count, 1);
        assert_eq!(sink.len(), 5);
    }

    #[test]
    fn test_group_ties_by_recency() {
        let now = chrono::Utc::now();
        let records = vec![
            ErrorRecord::new("a", "x", now - chrono::Duration::hours(2)),
            ErrorRecord::new("b", "y", now),
        ];
        let signatures = group_signatures(&records, now - chrono::Duration::days(1));
        assert_eq!(signatures[0].source, "b");
    }
}
