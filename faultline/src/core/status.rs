//! Step and pipeline status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a single pipeline step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The action succeeded.
    Success,
    /// The action failed and the step's fallback value was substituted.
    FallbackUsed,
    /// A required step failed with no fallback to substitute.
    Failed,
    /// The step never ran because something it depends on failed.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::FallbackUsed => write!(f, "fallback_used"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StepStatus {
    /// Returns true if the step produced its real output.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the step left a value in the shared context.
    #[must_use]
    pub fn produced_value(&self) -> bool {
        matches!(self, Self::Success | Self::FallbackUsed)
    }

    /// Returns true if dependents of this step must not run.
    #[must_use]
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every step succeeded.
    Completed,
    /// At least one step fell back, failed or was skipped.
    Degraded,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}
