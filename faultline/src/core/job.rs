//! Job identity carried through runs, alerts and stored state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies the job a pipeline run is processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRef {
    /// Stable job identifier; also the default state store key.
    pub id: String,
    /// Human readable title for alerts.
    pub title: String,
    /// Extra job attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl JobRef {
    /// Creates a job reference.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let job = JobRef::new("abc123", "Build a Rust CLI");
        assert_eq!(job.to_string(), "Build a Rust CLI (abc123)");
    }

    #[test]
    fn test_metadata_skipped_when_empty() {
        let json = serde_json::to_value(JobRef::new("1", "t")).unwrap();
        assert!(json.get("metadata").is_none());

        let job = JobRef::new("1", "t").with_metadata("budget", serde_json::json!(500));
        assert_eq!(serde_json::to_value(job).unwrap()["metadata"]["budget"], 500);
    }
}
