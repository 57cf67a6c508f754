//! End-to-end tests for pipeline execution and reporting.

#[cfg(test)]
mod tests {
    use crate::core::{CallFailure, FailureKind, JobRef, PipelineStatus, StepStatus};
    use crate::pipeline::{action_fn, Pipeline, PipelineBuilder, Step, StepContext};
    use crate::ports::{ArchiveCriteria, ArchiveKind, ArchiveStore};
    use crate::resilience::{BreakerStateKind, CircuitBreaker};
    use crate::state::StateStore;
    use crate::testing::{ScriptedAction, TestHarness};
    use crate::utils::{format_iso8601, Clock};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn job() -> JobRef {
        JobRef::new("job-42", "Senior Rust Engineer")
    }

    fn ok(value: serde_json::Value) -> Arc<ScriptedAction> {
        Arc::new(ScriptedAction::ok(value))
    }

    fn broken(message: &str) -> Arc<ScriptedAction> {
        Arc::new(ScriptedAction::err(CallFailure::permanent(message)))
    }

    fn build(steps: Vec<Step>) -> Pipeline {
        let mut builder = PipelineBuilder::new("triage");
        for step in steps {
            builder.add_step(step).unwrap();
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_all_success_completes_quietly() {
        let harness = TestHarness::new();
        let pipeline = build(vec![
            Step::required("fetch", ok(json!({"title": "x"}))),
            Step::required("score", ok(json!(87))).depends_on(&["fetch"]),
        ]);

        let result = harness.runner().run(&pipeline, job()).await;

        assert_eq!(result.status, PipelineStatus::Completed);
        assert!(result.failures.is_empty());
        assert!(harness.notifications.is_empty());
        assert!(harness.audit.is_empty());
        let reviews = harness
            .archive
            .query(&ArchiveCriteria::all().with_kind(ArchiveKind::ManualReview))
            .await
            .unwrap();
        assert!(reviews.is_empty());
    }

    #[tokio::test]
    async fn test_required_failure_skips_dependents_only() {
        let harness = TestHarness::new();
        let independent = ok(json!("drafted"));
        let dependent = ok(json!("never"));
        let pipeline = build(vec![
            Step::required("a", ok(json!(1))),
            Step::required("b", broken("upstream 400")),
            Step::required("c", independent.clone()),
            Step::required("d", dependent.clone()).depends_on(&["b"]),
            Step::required("e", ok(json!(5))).depends_on(&["d"]),
        ]);

        let result = harness.runner().run(&pipeline, job()).await;

        assert_eq!(result.status, PipelineStatus::Degraded);
        assert_eq!(result.status_of("a"), Some(StepStatus::Success));
        assert_eq!(result.status_of("b"), Some(StepStatus::Failed));
        assert_eq!(result.status_of("c"), Some(StepStatus::Success));
        assert_eq!(result.status_of("d"), Some(StepStatus::Skipped));
        assert_eq!(result.status_of("e"), Some(StepStatus::Skipped));
        assert_eq!(independent.call_count(), 1);
        assert_eq!(dependent.call_count(), 0);
        assert_eq!(result.failed_steps(), vec![("b".to_string(), "upstream 400".to_string())]);
    }

    #[tokio::test]
    async fn test_fallback_feeds_dependents() {
        let harness = TestHarness::new();
        let reader = ok(json!("report"));
        let pipeline = build(vec![
            Step::required("score", broken("model overloaded")).with_fallback(json!({"score": 0})),
            Step::optional("enrich", broken("no profile")),
            Step::required("report", reader.clone()).depends_on(&["score", "enrich"]),
        ]);

        let result = harness.runner().run(&pipeline, job()).await;

        assert_eq!(result.status, PipelineStatus::Degraded);
        assert_eq!(result.status_of("score"), Some(StepStatus::FallbackUsed));
        assert_eq!(result.value("score"), Some(&json!({"score": 0})));
        assert_eq!(result.status_of("enrich"), Some(StepStatus::FallbackUsed));
        assert_eq!(result.value("enrich"), Some(&serde_json::Value::Null));
        assert_eq!(result.status_of("report"), Some(StepStatus::Success));
        assert_eq!(reader.seen(), vec![vec!["enrich".to_string(), "score".to_string()]]);
        assert!(result.failures.iter().all(|f| f.absorbed));
    }

    #[tokio::test]
    async fn test_degraded_run_reports_once() {
        let harness = TestHarness::new();
        let pipeline = build(vec![
            Step::required("fetch", ok(json!(1))),
            Step::required("score", broken("bad request")),
            Step::optional("enrich", broken("timeout")),
        ]);

        let result = harness.runner().run(&pipeline, job()).await;

        let messages = harness.notifications.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("⚠️ *test-workflow: Degraded*"));
        assert!(messages[0].contains("Job: Senior Rust Engineer\n"));
        assert!(messages[0].contains("score: bad request"));
        assert!(messages[0].contains("enrich: timeout"));

        let records = harness.audit.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "triage.score");
        assert_eq!(records[0].context.get("job_id"), Some(&json!("job-42")));
        assert_eq!(records[1].source, "triage.enrich");

        let reviews = harness
            .archive
            .query(&ArchiveCriteria::all().with_kind(ArchiveKind::ManualReview))
            .await
            .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].job_id, "job-42");
        assert_eq!(reviews[0].payload["run_id"], json!(result.run_id.to_string()));
        assert_eq!(
            reviews[0].payload["started_at"],
            json!(format_iso8601(&result.started_at))
        );
    }

    #[tokio::test]
    async fn test_result_is_persisted_and_archived() {
        let harness = TestHarness::new();
        let pipeline = build(vec![Step::required("fetch", ok(json!({"id": 7})))]);

        let result = harness.runner().run(&pipeline, job()).await;

        let stored = harness.store.get("job-42").await.unwrap().unwrap();
        assert_eq!(stored["status"], json!("completed"));
        assert_eq!(stored["run_id"], json!(result.run_id.to_string()));

        let archived = harness
            .archive
            .query(&ArchiveCriteria::all().with_job_id("job-42"))
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].kind, ArchiveKind::PipelineResult);
        assert_eq!(archived[0].id, result.run_id.to_string());
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let harness = TestHarness::new();
        let pipeline = build(vec![
            Step::required("a", ok(json!(1))),
            Step::required("b", broken("nope")),
            Step::optional("c", broken("meh")),
            Step::required("d", ok(json!(4))).depends_on(&["b"]),
        ]);

        harness.runner().run(&pipeline, job()).await;

        assert_eq!(
            harness.events.event_types(),
            vec![
                "pipeline.started",
                "step.success",
                "step.failed",
                "step.fallback_used",
                "step.skipped",
                "pipeline.degraded",
            ]
        );

        let started = harness.events.events_of_type("pipeline.started");
        let data = started[0].1.clone().unwrap();
        assert_eq!(data["started_at"], json!(format_iso8601(&harness.clock.now())));
        assert!(data["started_at"].as_str().unwrap().ends_with("+00:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_falls_back() {
        let harness = TestHarness::new();
        let slow = Arc::new(ScriptedAction::ok(json!("late")).with_delay(Duration::from_secs(30)));
        let pipeline = build(vec![Step::optional("slow", slow)
            .with_timeout(Duration::from_secs(5))
            .with_fallback(json!("cached"))]);

        let result = harness.runner().run(&pipeline, job()).await;

        assert_eq!(result.status_of("slow"), Some(StepStatus::FallbackUsed));
        assert_eq!(result.value("slow"), Some(&json!("cached")));
        assert_eq!(result.failures[0].kind, FailureKind::Transient);
        assert!(result.failures[0].error.contains("5000ms"));
    }

    #[tokio::test]
    async fn test_open_breaker_degrades_to_fallback() {
        let harness = TestHarness::new();
        let breaker = Arc::new(CircuitBreaker::new("scoring-api", 1, Duration::from_secs(60)));
        let _ = breaker
            .call(|| async { Err::<(), _>(CallFailure::transient("503")) })
            .await;
        assert_eq!(breaker.state().kind(), BreakerStateKind::Open);

        let guarded = breaker.clone();
        let score = action_fn(move |_ctx: StepContext| {
            let breaker = guarded.clone();
            async move { breaker.call(|| async { Ok(json!(99)) }).await }
        });
        let pipeline = build(vec![Step::required("score", score).with_fallback(json!(null))]);

        let result = harness.runner().run(&pipeline, job()).await;

        assert_eq!(result.status_of("score"), Some(StepStatus::FallbackUsed));
        assert_eq!(result.failures[0].kind, FailureKind::CircuitOpen);
    }
}
