//! Persistent archive of run results and manual-review markers.

use crate::core::CallOutcome;
use crate::utils::Timestamp;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// What an archive record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// A finished pipeline result.
    PipelineResult,
    /// A job a human has to finish by hand.
    ManualReview,
}

/// One archived document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Record id.
    pub id: String,
    /// Record kind.
    pub kind: ArchiveKind,
    /// Job the record belongs to.
    pub job_id: String,
    /// Record body.
    pub payload: serde_json::Value,
    /// Insertion time.
    pub created_at: Timestamp,
}

/// Filter for [`ArchiveStore::query`]; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveCriteria {
    /// Restrict to one kind.
    pub kind: Option<ArchiveKind>,
    /// Restrict to one job.
    pub job_id: Option<String>,
    /// Only records created at or after this time.
    pub since: Option<Timestamp>,
    /// Maximum records returned.
    pub limit: Option<usize>,
}

impl ArchiveCriteria {
    /// Matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to a kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ArchiveKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restricts to a job.
    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Restricts to records created at or after `since`.
    #[must_use]
    pub fn with_since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Caps the result size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &ArchiveRecord) -> bool {
        self.kind.map_or(true, |k| k == record.kind)
            && self.job_id.as_ref().map_or(true, |j| *j == record.job_id)
            && self.since.map_or(true, |s| record.created_at >= s)
    }
}

/// Long-lived record storage.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Inserts a record.
    async fn insert(&self, record: ArchiveRecord) -> CallOutcome<()>;

    /// Returns matching records in insertion order.
    async fn query(&self, criteria: &ArchiveCriteria) -> CallOutcome<Vec<ArchiveRecord>>;
}

/// In-memory archive.
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    records: RwLock<Vec<ArchiveRecord>>,
}

impl InMemoryArchive {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the archive is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchive {
    async fn insert(&self, record: ArchiveRecord) -> CallOutcome<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn query(&self, criteria: &ArchiveCriteria) -> CallOutcome<Vec<ArchiveRecord>> {
        let records = self.records.read();
        let matching = records.iter().filter(|r| criteria.matches(r)).cloned();
        Ok(match criteria.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(kind: ArchiveKind, job: &str) -> ArchiveRecord {
        ArchiveRecord {
            id: crate::utils::generate_run_id().to_string(),
            kind,
            job_id: job.to_string(),
            payload: serde_json::json!({"job": job}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_query_filters() {
        let archive = InMemoryArchive::new();
        archive.insert(record(ArchiveKind::PipelineResult, "a")).await.unwrap();
        archive.insert(record(ArchiveKind::ManualReview, "a")).await.unwrap();
        archive.insert(record(ArchiveKind::ManualReview, "b")).await.unwrap();

        let reviews = archive
            .query(&ArchiveCriteria::all().with_kind(ArchiveKind::ManualReview))
            .await
            .unwrap();
        assert_eq!(reviews.len(), 2);

        let job_a = archive
            .query(&ArchiveCriteria::all().with_job_id("a").with_limit(1))
            .await
            .unwrap();
        assert_eq!(job_a.len(), 1);
        assert_eq!(job_a[0].kind, ArchiveKind::PipelineResult);
    }

    #[test]
    fn test_since_filter() {
        let r = record(ArchiveKind::PipelineResult, "a");
        let later = r.created_at + chrono::Duration::seconds(1);
        assert!(!ArchiveCriteria::all().with_since(later).matches(&r));
        assert!(ArchiveCriteria::all().with_since(r.created_at).matches(&r));
    }
}
