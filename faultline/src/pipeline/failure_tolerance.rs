//! Continue-on-failure bookkeeping for pipeline runs.
//!
//! Records failures but keeps executing unrelated steps: a step may run as
//! long as none of its dependencies failed or was skipped.

use crate::core::{CallFailure, FailureKind};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Record of a step whose action failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Step name.
    pub step: String,
    /// Error message.
    pub error: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// HTTP status, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Whether the run absorbed the failure with a fallback.
    pub absorbed: bool,
    /// When the failure was observed.
    pub occurred_at: Timestamp,
    /// Additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl FailureRecord {
    /// Creates a record from a call failure.
    #[must_use]
    pub fn new(step: impl Into<String>, failure: &CallFailure, occurred_at: Timestamp) -> Self {
        Self {
            step: step.into(),
            error: failure.message.clone(),
            kind: failure.kind,
            status: failure.status,
            absorbed: false,
            occurred_at,
            context: failure.context.clone(),
        }
    }

    /// Marks the failure as absorbed by a fallback.
    #[must_use]
    pub fn absorbed(mut self) -> Self {
        self.absorbed = true;
        self
    }
}

/// Collects failures during a run and decides which steps may still run.
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<FailureRecord>,
    blocked: HashSet<String>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure. Unabsorbed failures block dependents.
    pub fn record_failure(&mut self, record: FailureRecord) {
        if !record.absorbed {
            self.blocked.insert(record.step.clone());
        }
        self.failures.push(record);
    }

    /// Records a step skipped because of a blocked dependency.
    pub fn record_skip(&mut self, step: &str) {
        self.blocked.insert(step.to_string());
    }

    /// Returns the first dependency that prevents a step from running.
    #[must_use]
    pub fn blocking_dependency<'a>(&self, dependencies: &'a [String]) -> Option<&'a str> {
        dependencies
            .iter()
            .find(|dep| self.blocked.contains(*dep))
            .map(String::as_str)
    }

    /// Returns true if a step with these dependencies can run.
    #[must_use]
    pub fn can_run(&self, dependencies: &[String]) -> bool {
        self.blocking_dependency(dependencies).is_none()
    }

    /// Returns true if any failure was recorded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns all failures in order.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Consumes the collector, returning the failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<FailureRecord> {
        self.failures
    }
}
