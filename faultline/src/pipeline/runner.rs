//! Graceful-degradation pipeline runner.
//!
//! Runs steps in order. A failing step is downgraded to its fallback when it
//! has one (or is optional); a required step without a fallback is marked
//! `Failed` and everything that transitively depends on it is `Skipped`,
//! while independent steps still run. The runner never returns an error:
//! reporting failures (alerts, audit, archive, state) are logged and dropped.

use super::builder::Pipeline;
use super::failure_tolerance::{FailureCollector, FailureRecord};
use super::result::{PipelineResult, StepOutcome};
use super::step::{Step, StepContext};
use crate::core::{with_timeout, JobRef, PipelineStatus};
use crate::events::{noop_sink, EventSink};
use crate::observability::SpanTimer;
use crate::ports::{
    ArchiveKind, ArchiveRecord, ArchiveStore, AuditSink, ErrorRecord, Notifier,
};
use crate::reporting::Alert;
use crate::state::StateStore;
use crate::utils::{format_iso8601, generate_run_id, system_clock, Clock};
use std::sync::Arc;
use tracing::Instrument;

/// Executes pipelines and reports their outcome.
pub struct PipelineRunner {
    events: Arc<dyn EventSink>,
    notifier: Option<Arc<Notifier>>,
    audit: Option<Arc<dyn AuditSink>>,
    archive: Option<Arc<dyn ArchiveStore>>,
    store: Option<Arc<dyn StateStore>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("notifier", &self.notifier.is_some())
            .field("audit", &self.audit.is_some())
            .field("archive", &self.archive.is_some())
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRunner {
    /// Creates a runner that reports nowhere.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: noop_sink(),
            notifier: None,
            audit: None,
            archive: None,
            store: None,
            clock: system_clock(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sends one alert per degraded run.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Appends one error record per failed step.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Archives every result and a manual-review marker for degraded runs.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Persists every result in the store under the job id.
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the clock used for timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs `pipeline` for `job`.
    pub async fn run(&self, pipeline: &Pipeline, job: JobRef) -> PipelineResult {
        let run_id = generate_run_id();
        let span = tracing::info_span!(
            "pipeline",
            pipeline = %pipeline.name(),
            job_id = %job.id,
            run_id = %run_id
        );
        async move {
            let result = self.execute(pipeline, job, run_id).await;
            self.finish(&result).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, pipeline: &Pipeline, job: JobRef, run_id: uuid::Uuid) -> PipelineResult {
        let started_at = self.clock.now();
        self.events
            .emit(
                "pipeline.started",
                Some(serde_json::json!({
                    "pipeline": pipeline.name(),
                    "job_id": &job.id,
                    "run_id": run_id.to_string(),
                    "steps": pipeline.len(),
                    "started_at": format_iso8601(&started_at),
                })),
            )
            .await;

        let mut ctx = StepContext::new(run_id, job);
        let mut collector = FailureCollector::new();
        let mut outcomes = Vec::with_capacity(pipeline.len());

        for step in pipeline.steps() {
            let outcome = match collector.blocking_dependency(&step.depends_on) {
                Some(blocked_by) => {
                    tracing::warn!(step = %step.name, blocked_by, "Skipping step");
                    collector.record_skip(&step.name);
                    StepOutcome::skipped(&step.name, blocked_by)
                }
                None => self.run_step(step, &mut ctx, &mut collector).await,
            };
            self.events
                .emit(
                    &format!("step.{}", outcome.status),
                    Some(serde_json::json!({
                        "step": &outcome.name,
                        "status": outcome.status,
                        "error": &outcome.error,
                        "duration_ms": outcome.duration_ms,
                    })),
                )
                .await;
            outcomes.push(outcome);
        }

        let status = if outcomes.iter().all(|o| o.status.is_success()) {
            PipelineStatus::Completed
        } else {
            PipelineStatus::Degraded
        };
        let job = ctx.job().clone();

        PipelineResult {
            run_id,
            pipeline: pipeline.name().to_string(),
            job,
            status,
            steps: outcomes,
            failures: collector.into_failures(),
            started_at,
            finished_at: self.clock.now(),
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        ctx: &mut StepContext,
        collector: &mut FailureCollector,
    ) -> StepOutcome {
        let timer = SpanTimer::start(step.name.as_str());
        let outcome = match step.timeout {
            Some(limit) => with_timeout(limit, step.action.run(ctx)).await,
            None => step.action.run(ctx).await,
        };
        let duration_ms = timer.finish();

        match outcome {
            Ok(value) => {
                tracing::debug!(step = %step.name, duration_ms, "Step succeeded");
                ctx.insert(&step.name, value.clone());
                StepOutcome::success(&step.name, value, duration_ms)
            }
            Err(failure) => {
                let record = FailureRecord::new(&step.name, &failure, self.clock.now());
                if step.can_fall_back() {
                    let value = step.fallback.clone().unwrap_or(serde_json::Value::Null);
                    tracing::warn!(
                        step = %step.name,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Step failed, using fallback"
                    );
                    collector.record_failure(record.absorbed());
                    ctx.insert(&step.name, value.clone());
                    StepOutcome::fallback(&step.name, value, failure.message, duration_ms)
                } else {
                    tracing::error!(
                        step = %step.name,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Required step failed"
                    );
                    collector.record_failure(record);
                    StepOutcome::failed(&step.name, failure.message, duration_ms)
                }
            }
        }
    }

    async fn finish(&self, result: &PipelineResult) {
        let event = match result.status {
            PipelineStatus::Completed => "pipeline.completed",
            PipelineStatus::Degraded => "pipeline.degraded",
        };
        self.events
            .emit(event, Some(serde_json::json!(result.to_dict())))
            .await;

        if result.status == PipelineStatus::Degraded {
            tracing::warn!(failed = result.failures.len(), "Pipeline degraded");
            self.report_degraded(result).await;
        } else {
            tracing::info!("Pipeline completed");
        }

        self.persist(result).await;
    }

    async fn report_degraded(&self, result: &PipelineResult) {
        futures::join!(
            self.alert_degraded(result),
            self.audit_failures(result),
            self.mark_for_review(result)
        );
    }

    async fn alert_degraded(&self, result: &PipelineResult) {
        if let Some(notifier) = &self.notifier {
            let alert = Alert::degraded(&result.job, &result.failed_steps());
            // Delivery failures are logged by the notifier.
            let _ = notifier.notify(&alert).await;
        }
    }

    async fn audit_failures(&self, result: &PipelineResult) {
        let Some(audit) = &self.audit else {
            return;
        };
        for failure in &result.failures {
            let record = ErrorRecord::new(
                format!("{}.{}", result.pipeline, failure.step),
                failure.error.clone(),
                failure.occurred_at,
            )
            .with_context("job_id", serde_json::json!(result.job.id))
            .with_context("run_id", serde_json::json!(result.run_id.to_string()))
            .with_context("kind", serde_json::json!(failure.kind));
            if let Err(e) = audit.append(record).await {
                tracing::error!(error = %e, "Failed to append audit record");
            }
        }
    }

    async fn mark_for_review(&self, result: &PipelineResult) {
        let Some(archive) = &self.archive else {
            return;
        };
        let record = ArchiveRecord {
            id: generate_run_id().to_string(),
            kind: ArchiveKind::ManualReview,
            job_id: result.job.id.clone(),
            payload: serde_json::json!({
                "run_id": result.run_id.to_string(),
                "started_at": format_iso8601(&result.started_at),
                "failed_steps": result.failed_steps(),
            }),
            created_at: self.clock.now(),
        };
        if let Err(e) = archive.insert(record).await {
            tracing::error!(error = %e, "Failed to mark job for manual review");
        }
    }

    async fn persist(&self, result: &PipelineResult) {
        let payload = match serde_json::to_value(result) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize pipeline result");
                return;
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.put(&result.job.id, payload.clone()).await {
                tracing::error!(error = %e, "Failed to persist pipeline result");
            }
        }

        if let Some(archive) = &self.archive {
            let record = ArchiveRecord {
                id: result.run_id.to_string(),
                kind: ArchiveKind::PipelineResult,
                job_id: result.job.id.clone(),
                payload,
                created_at: self.clock.now(),
            };
            if let Err(e) = archive.insert(record).await {
                tracing::error!(error = %e, "Failed to archive pipeline result");
            }
        }
    }
}
