//! Pipeline steps and the context they read.

use crate::core::{CallOutcome, JobRef};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Read-only view of a run handed to each step.
#[derive(Debug, Clone)]
pub struct StepContext {
    run_id: Uuid,
    job: JobRef,
    outputs: HashMap<String, serde_json::Value>,
}

impl StepContext {
    /// Creates a context with no outputs yet.
    #[must_use]
    pub fn new(run_id: Uuid, job: JobRef) -> Self {
        Self {
            run_id,
            job,
            outputs: HashMap::new(),
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the job being processed.
    #[must_use]
    pub fn job(&self) -> &JobRef {
        &self.job
    }

    /// Returns an earlier step's output.
    ///
    /// Steps that fell back expose their fallback value (possibly `null`).
    #[must_use]
    pub fn get(&self, step: &str) -> Option<&serde_json::Value> {
        self.outputs.get(step)
    }

    /// Deserializes an earlier step's output.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, step: &str) -> Option<T> {
        self.outputs
            .get(step)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns true if `step` left a value.
    #[must_use]
    pub fn has(&self, step: &str) -> bool {
        self.outputs.contains_key(step)
    }

    /// Returns the names of steps that left a value, sorted.
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.outputs.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn insert(&mut self, step: &str, value: serde_json::Value) {
        self.outputs.insert(step.to_string(), value);
    }
}

/// The work a step performs.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Runs the step against the outputs produced so far.
    async fn run(&self, ctx: &StepContext) -> CallOutcome<serde_json::Value>;
}

/// Adapts an async closure into a [`StepAction`].
///
/// The closure receives an owned snapshot of the context.
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> StepAction for FnAction<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = CallOutcome<serde_json::Value>> + Send,
{
    async fn run(&self, ctx: &StepContext) -> CallOutcome<serde_json::Value> {
        (self.f)(ctx.clone()).await
    }
}

/// Wraps an async closure as a shared action.
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn StepAction>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallOutcome<serde_json::Value>> + Send + 'static,
{
    Arc::new(FnAction::new(f))
}

/// One unit of work in a pipeline.
#[derive(Clone)]
pub struct Step {
    /// Unique step name; also the key of its output.
    pub name: String,
    /// Whether a failure without fallback degrades the run and blocks dependents.
    pub required: bool,
    /// Steps whose outputs this one reads.
    pub depends_on: Vec<String>,
    /// The work.
    pub action: Arc<dyn StepAction>,
    /// Value substituted when the action fails.
    pub fallback: Option<serde_json::Value>,
    /// Optional deadline for the action.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("depends_on", &self.depends_on)
            .field("fallback", &self.fallback)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Step {
    /// Creates a required step.
    #[must_use]
    pub fn required(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        Self {
            name: name.into(),
            required: true,
            depends_on: Vec::new(),
            action,
            fallback: None,
            timeout: None,
        }
    }

    /// Creates an optional step; its failure substitutes the fallback (or `null`).
    #[must_use]
    pub fn optional(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        Self {
            required: false,
            ..Self::required(name, action)
        }
    }

    /// Declares dependencies.
    #[must_use]
    pub fn depends_on(mut self, steps: &[&str]) -> Self {
        self.depends_on
            .extend(steps.iter().map(|s| (*s).to_string()));
        self
    }

    /// Sets the fallback value.
    #[must_use]
    pub fn with_fallback(mut self, value: serde_json::Value) -> Self {
        self.fallback = Some(value);
        self
    }

    /// Sets a deadline for the action.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns true if a failure can be absorbed by substituting a value.
    #[must_use]
    pub fn can_fall_back(&self) -> bool {
        !self.required || self.fallback.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CallFailure;

    #[tokio::test]
    async fn test_fn_action_reads_context() {
        let action = action_fn(|ctx: StepContext| async move {
            let score: i64 = ctx.get_as("score").unwrap_or_default();
            Ok(serde_json::json!(score * 2))
        });

        let mut ctx = StepContext::new(Uuid::nil(), JobRef::new("j", "t"));
        ctx.insert("score", serde_json::json!(40));

        assert_eq!(action.run(&ctx).await, Ok(serde_json::json!(80)));
    }

    #[test]
    fn test_step_builders() {
        let action = action_fn(|_| async { Err(CallFailure::permanent("nope")) });
        let step = Step::optional("score", action.clone()).depends_on(&["fetch"]);
        assert!(!step.required);
        assert!(step.can_fall_back());
        assert_eq!(step.depends_on, vec!["fetch"]);

        let step = Step::required("task", action);
        assert!(!step.can_fall_back());
        assert!(step.with_fallback(serde_json::json!("manual")).can_fall_back());
    }

    #[test]
    fn test_get_as_type_mismatch() {
        let mut ctx = StepContext::new(Uuid::nil(), JobRef::new("j", "t"));
        ctx.insert("score", serde_json::json!("high"));
        assert_eq!(ctx.get_as::<i64>("score"), None);
        assert!(ctx.has("score"));
    }
}
