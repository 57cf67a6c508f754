//! Human-directed alert messages.

use crate::core::JobRef;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Something failed and needs a human.
    Critical,
    /// Degraded but still producing output.
    Warning,
    /// Informational reports such as digests.
    Info,
}

impl AlertSeverity {
    /// Prefix shown before the alert headline.
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Critical => "❌",
            Self::Warning => "⚠️",
            Self::Info => "📊",
        }
    }
}

/// An actionable alert: which workflow, which job, what broke, what to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Urgency.
    pub severity: AlertSeverity,
    /// Headline, e.g. "Failed".
    pub title: String,
    /// Workflow name; filled from configuration when absent.
    pub workflow: Option<String>,
    /// Job shown in the alert.
    pub job: Option<String>,
    /// Job id for metadata.
    pub job_id: Option<String>,
    /// Error summary.
    pub error: String,
    /// Suggested manual action.
    pub action: String,
}

impl Alert {
    /// Creates an alert with a headline.
    #[must_use]
    pub fn new(severity: AlertSeverity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            workflow: None,
            job: None,
            job_id: None,
            error: String::new(),
            action: String::new(),
        }
    }

    /// Sets the workflow.
    #[must_use]
    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }

    /// Sets the workflow only if none is set yet.
    #[must_use]
    pub fn or_workflow(mut self, workflow: &str) -> Self {
        if self.workflow.is_none() {
            self.workflow = Some(workflow.to_string());
        }
        self
    }

    /// Sets the job.
    #[must_use]
    pub fn with_job(mut self, job: &JobRef) -> Self {
        self.job = Some(job.title.clone());
        self.job_id = Some(job.id.clone());
        self
    }

    /// Sets the error summary.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// Sets the suggested action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Alert sent when a dependency's breaker opens.
    #[must_use]
    pub fn breaker_opened(
        dependency: &str,
        failures: u32,
        recovery_timeout: Duration,
        last_error: &str,
    ) -> Self {
        Self::new(AlertSeverity::Critical, format!("Circuit Breaker Open: {dependency}"))
            .with_error(format!(
                "Service failing repeatedly ({failures} failures). Last error: {last_error}"
            ))
            .with_action(format!(
                "Calls to {dependency} are paused for {} seconds",
                recovery_timeout.as_secs()
            ))
    }

    /// Alert sent when a pipeline run degrades.
    #[must_use]
    pub fn degraded(job: &JobRef, failed_steps: &[(String, String)]) -> Self {
        let error = failed_steps
            .iter()
            .map(|(step, error)| format!("{step}: {error}"))
            .collect::<Vec<_>>()
            .join("; ");
        let steps = failed_steps
            .iter()
            .map(|(step, _)| step.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(AlertSeverity::Warning, "Degraded")
            .with_job(job)
            .with_error(error)
            .with_action(format!("Job marked for manual review; finish {steps} by hand"))
    }

    /// Renders the alert as a Markdown message.
    #[must_use]
    pub fn render(&self) -> String {
        let header = match &self.workflow {
            Some(workflow) => format!("{} *{workflow}: {}*", self.severity.icon(), self.title),
            None => format!("{} *{}*", self.severity.icon(), self.title),
        };
        format!(
            "{header}\n\nJob: {}\nError: {}\n\nAction: {}",
            self.job.as_deref().unwrap_or("N/A"),
            self.error,
            self.action
        )
    }
}
