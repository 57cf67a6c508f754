//! Human notification delivery.

use crate::config::{AlertConfig, FaultlineConfig, NotificationConfig};
use crate::core::{CallFailure, CallOutcome};
use crate::reporting::Alert;
use crate::resilience::{Retrier, RetryPolicy};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Free-form metadata attached to a notification.
pub type Metadata = HashMap<String, Value>;

/// A channel that delivers messages to humans (chat, email, pager).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one message.
    ///
    /// `metadata` carries at least the `destination` key.
    async fn send(&self, message: &str, metadata: &Metadata) -> CallOutcome<()>;
}

/// Sends alerts to configured destinations, retrying delivery at most once.
///
/// Delivery failures are logged and returned, never raised; a broken
/// notification channel must not take the caller down with it.
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    alerts: AlertConfig,
    policy: RetryPolicy,
    retrier: Retrier,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("alerts", &self.alerts)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Creates a notifier with default delivery settings.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>, alerts: AlertConfig) -> Self {
        Self {
            sink,
            alerts,
            policy: delivery_policy(&NotificationConfig::default()),
            retrier: Retrier::new("notifier"),
        }
    }

    /// Creates a notifier from the alert and notification sections.
    #[must_use]
    pub fn from_config(sink: Arc<dyn NotificationSink>, config: &FaultlineConfig) -> Self {
        Self::new(sink, config.alerts.clone()).with_delivery(&config.notifications)
    }

    /// Applies delivery settings; more than one retry is clamped to one.
    #[must_use]
    pub fn with_delivery(mut self, delivery: &NotificationConfig) -> Self {
        self.policy = delivery_policy(delivery);
        self
    }

    /// Returns the alert configuration.
    #[must_use]
    pub fn alerts(&self) -> &AlertConfig {
        &self.alerts
    }

    /// Sends an alert to the admin destination.
    pub async fn notify(&self, alert: &Alert) -> CallOutcome<()> {
        let alert = alert.clone().or_workflow(&self.alerts.workflow);
        let mut metadata = Metadata::new();
        metadata.insert("severity".to_string(), serde_json::json!(alert.severity));
        if let Some(job) = &alert.job_id {
            metadata.insert("job_id".to_string(), serde_json::json!(job));
        }
        self.send_to(&self.alerts.admin_destination, &alert.render(), metadata)
            .await
    }

    /// Sends a plain message to the user destination.
    pub async fn notify_user(&self, message: &str) -> CallOutcome<()> {
        self.send_to(self.alerts.user_destination(), message, Metadata::new())
            .await
    }

    /// Sends a message to an explicit destination.
    pub async fn send_to(
        &self,
        destination: &str,
        message: &str,
        mut metadata: Metadata,
    ) -> CallOutcome<()> {
        metadata.insert("destination".to_string(), serde_json::json!(destination));
        let outcome = self
            .retrier
            .execute(&self.policy, || self.sink.send(message, &metadata))
            .await;
        if let Err(failure) = &outcome {
            tracing::error!(
                destination,
                error = %failure,
                "Notification delivery failed"
            );
        }
        outcome
    }
}

fn delivery_policy(delivery: &NotificationConfig) -> RetryPolicy {
    RetryPolicy::new(
        delivery.max_retries.min(1) + 1,
        Duration::from_millis(delivery.retry_delay_ms),
        1.0,
    )
}

/// A delivered message captured by [`MemoryNotificationSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    /// Message body.
    pub message: String,
    /// Metadata passed with it.
    pub metadata: Metadata,
}

impl SentNotification {
    /// Returns the destination, if present.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.metadata.get("destination").and_then(Value::as_str)
    }
}

/// In-memory sink that records messages and can fail on demand.
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    sent: Mutex<Vec<SentNotification>>,
    failures_remaining: Mutex<u32>,
    failure: Mutex<Option<CallFailure>>,
    attempts: Mutex<u32>,
}

impl MemoryNotificationSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink whose first `n` sends fail transiently.
    #[must_use]
    pub fn failing(n: u32) -> Self {
        let sink = Self::default();
        *sink.failures_remaining.lock() = n;
        sink
    }

    /// Creates a sink whose first `n` sends fail with `failure`.
    #[must_use]
    pub fn failing_with(n: u32, failure: CallFailure) -> Self {
        let sink = Self::failing(n);
        *sink.failure.lock() = Some(failure);
        sink
    }

    /// Returns delivered messages.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    /// Returns delivered message bodies.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|s| s.message.clone()).collect()
    }

    /// Returns the number of delivered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns true if nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    /// Returns the number of send attempts, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn send(&self, message: &str, metadata: &Metadata) -> CallOutcome<()> {
        *self.attempts.lock() += 1;
        {
            let mut remaining = self.failures_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(self.failure.lock().clone().unwrap_or_else(|| {
                    CallFailure::from_status(503, "notification channel unavailable")
                }));
            }
        }
        self.sent.lock().push(SentNotification {
            message: message.to_string(),
            metadata: metadata.clone(),
        });
        Ok(())
    }
}

/// Sink that writes messages to the log instead of a channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, message: &str, metadata: &Metadata) -> CallOutcome<()> {
        let destination = metadata
            .get("destination")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(destination, message, "Notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::AlertSeverity;

    fn notifier(sink: &Arc<MemoryNotificationSink>) -> Notifier {
        Notifier::new(
            sink.clone(),
            AlertConfig::new("Proposal Generator", "admin-chat").with_user_destination("user-chat"),
        )
        .with_delivery(&NotificationConfig {
            max_retries: 1,
            retry_delay_ms: 10,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_sends_to_admin() {
        let sink = Arc::new(MemoryNotificationSink::new());
        let alert = Alert::new(AlertSeverity::Critical, "Claude API down")
            .with_error("503")
            .with_action("Generate manually");

        notifier(&sink).notify(&alert).await.unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination(), Some("admin-chat"));
        assert!(sent[0].message.contains("Proposal Generator"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_once_then_succeeds() {
        let sink = Arc::new(MemoryNotificationSink::failing(1));
        notifier(&sink).notify_user("hello").await.unwrap();

        assert_eq!(sink.attempts(), 2);
        assert_eq!(sink.sent()[0].destination(), Some("user-chat"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_one_retry() {
        let sink = Arc::new(MemoryNotificationSink::failing(5));
        let n = Notifier::new(sink.clone(), AlertConfig::default()).with_delivery(&NotificationConfig {
            max_retries: 9,
            retry_delay_ms: 10,
        });

        assert!(n.notify_user("hello").await.is_err());
        assert_eq!(sink.attempts(), 2);
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credentials_are_not_retried() {
        let sink = Arc::new(MemoryNotificationSink::failing_with(
            5,
            CallFailure::from_status(401, "bad bot token"),
        ));

        let failure = notifier(&sink).notify_user("hello").await.unwrap_err();

        assert_eq!(failure.status, Some(401));
        assert_eq!(sink.attempts(), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        let sink = LogNotificationSink;
        let mut metadata = Metadata::new();
        metadata.insert("destination".to_string(), serde_json::json!("ops"));
        assert!(sink.send("digest", &metadata).await.is_ok());
    }
}
