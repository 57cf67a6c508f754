//! Results of a pipeline run.

use super::failure_tolerance::FailureRecord;
use crate::core::{JobRef, PipelineStatus, StepStatus};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step name.
    pub name: String,
    /// Status.
    pub status: StepStatus,
    /// Value placed in the context (real output or fallback).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Error message when the action failed or the step was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time spent in the action.
    pub duration_ms: f64,
}

impl StepOutcome {
    /// A successful step.
    #[must_use]
    pub fn success(name: impl Into<String>, value: serde_json::Value, duration_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Success,
            value: Some(value),
            error: None,
            duration_ms,
        }
    }

    /// A failed step whose fallback was substituted.
    #[must_use]
    pub fn fallback(
        name: impl Into<String>,
        value: serde_json::Value,
        error: impl Into<String>,
        duration_ms: f64,
    ) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::FallbackUsed,
            value: Some(value),
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// A required step that failed with nothing to substitute.
    #[must_use]
    pub fn failed(name: impl Into<String>, error: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Failed,
            value: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// A step that never ran.
    #[must_use]
    pub fn skipped(name: impl Into<String>, blocked_by: &str) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skipped,
            value: None,
            error: Some(format!("dependency '{blocked_by}' did not complete")),
            duration_ms: 0.0,
        }
    }
}

/// Immutable summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run id.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Job processed.
    pub job: JobRef,
    /// Overall status.
    pub status: PipelineStatus,
    /// Per-step outcomes in execution order.
    pub steps: Vec<StepOutcome>,
    /// Action failures, absorbed or not.
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
    /// Run start.
    pub started_at: Timestamp,
    /// Run end.
    pub finished_at: Timestamp,
}

impl PipelineResult {
    /// Returns true if every step succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    /// Returns a step's outcome.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Returns a step's status.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.step(name).map(|s| s.status)
    }

    /// Returns the value a step left in the context.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&serde_json::Value> {
        self.step(name).and_then(|s| s.value.as_ref())
    }

    /// Returns `(step, error)` for each step whose action failed.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<(String, String)> {
        self.failures
            .iter()
            .map(|f| (f.step.clone(), f.error.clone()))
            .collect()
    }

    /// Returns the count of steps in each status.
    #[must_use]
    pub fn status_counts(&self) -> HashMap<StepStatus, usize> {
        let mut counts = HashMap::new();
        for step in &self.steps {
            *counts.entry(step.status).or_insert(0) += 1;
        }
        counts
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        map.insert("job_id".to_string(), serde_json::json!(self.job.id));
        map.insert("status".to_string(), serde_json::json!(self.status));
        map.insert(
            "steps".to_string(),
            serde_json::json!(self
                .steps
                .iter()
                .map(|s| serde_json::json!({"name": s.name, "status": s.status}))
                .collect::<Vec<_>>()),
        );
        map.insert(
            "duration_ms".to_string(),
            serde_json::json!((self.finished_at - self.started_at).num_milliseconds()),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result(steps: Vec<StepOutcome>, status: PipelineStatus) -> PipelineResult {
        let now = Utc::now();
        PipelineResult {
            run_id: Uuid::nil(),
            pipeline: "proposal".to_string(),
            job: JobRef::new("j1", "Rust CLI"),
            status,
            steps,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_accessors() {
        let r = result(
            vec![
                StepOutcome::success("score", serde_json::json!(85), 1.0),
                StepOutcome::failed("generate", "timeout", 2.0),
                StepOutcome::skipped("send", "generate"),
            ],
            PipelineStatus::Degraded,
        );

        assert!(!r.is_completed());
        assert_eq!(r.value("score"), Some(&serde_json::json!(85)));
        assert_eq!(r.status_of("send"), Some(StepStatus::Skipped));
        assert_eq!(r.status_counts()[&StepStatus::Failed], 1);
        assert!(r.step("send").unwrap().error.as_ref().unwrap().contains("generate"));
    }

    #[test]
    fn test_to_dict() {
        let r = result(
            vec![StepOutcome::success("a", serde_json::Value::Null, 0.5)],
            PipelineStatus::Completed,
        );
        let dict = r.to_dict();
        assert_eq!(dict["status"], "completed");
        assert_eq!(dict["steps"][0]["status"], "success");
        assert_eq!(dict["job_id"], "j1");
    }

    #[test]
    fn test_serde_round_trip_keeps_status() {
        let r = result(
            vec![StepOutcome::fallback("score", serde_json::Value::Null, "503", 3.0)],
            PipelineStatus::Degraded,
        );
        let back: PipelineResult = serde_json::from_value(serde_json::to_value(&r).unwrap()).unwrap();
        assert_eq!(back.status_of("score"), Some(StepStatus::FallbackUsed));
    }
}
