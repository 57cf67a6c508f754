//! Recurring-failure digest built from the audit trail.

use super::alert::AlertSeverity;
use crate::config::DigestConfig;
use crate::core::CallOutcome;
use crate::ports::{AuditSink, ErrorSignature, Metadata, Notifier};
use serde::{Deserialize, Serialize};

/// Top recurring error signatures over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDigest {
    /// Window length in hours.
    pub window_hours: u64,
    /// Most frequent signatures, most frequent first.
    pub signatures: Vec<ErrorSignature>,
}

impl FailureDigest {
    /// Returns true if no errors were seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Renders the digest as a Markdown message.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!(
            "{} *Error Digest ({}h)*\n\n",
            AlertSeverity::Info.icon(),
            self.window_hours
        );
        if self.signatures.is_empty() {
            text.push_str("No errors recorded.");
            return text;
        }
        let lines: Vec<String> = self
            .signatures
            .iter()
            .map(|s| format!("{}: {} ({}x)", s.source, s.message, s.count))
            .collect();
        text.push_str(&lines.join("\n"));
        text
    }
}

/// Queries the audit sink for the top `config.top_n` signatures.
pub async fn build_digest(
    audit: &dyn AuditSink,
    config: &DigestConfig,
) -> CallOutcome<FailureDigest> {
    let mut signatures = audit.query_recent(config.window()).await?;
    signatures.truncate(config.top_n);
    Ok(FailureDigest {
        window_hours: config.window_hours,
        signatures,
    })
}

/// Builds the digest and sends it to the admin destination.
///
/// Meant to run on an external schedule, like the store sweep.
pub async fn send_digest(
    audit: &dyn AuditSink,
    notifier: &Notifier,
    config: &DigestConfig,
) -> CallOutcome<FailureDigest> {
    let digest = build_digest(audit, config).await?;
    let mut metadata = Metadata::new();
    metadata.insert("kind".to_string(), serde_json::json!("digest"));
    metadata.insert(
        "signatures".to_string(),
        serde_json::json!(digest.signatures.len()),
    );
    notifier
        .send_to(&notifier.alerts().admin_destination, &digest.render(), metadata)
        .await?;
    tracing::info!(
        signatures = digest.signatures.len(),
        window_hours = digest.window_hours,
        "Sent failure digest"
    );
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertConfig;
    use crate::ports::{ErrorRecord, InMemoryAuditSink, MemoryNotificationSink};
    use chrono::Utc;
    use std::sync::Arc;

    async fn audit_with(records: &[(&str, &str, usize)]) -> InMemoryAuditSink {
        let audit = InMemoryAuditSink::new();
        for (source, message, n) in records {
            for _ in 0..*n {
                audit
                    .append(ErrorRecord::new(*source, *message, Utc::now()))
                    .await
                    .unwrap();
            }
        }
        audit
    }

    #[tokio::test]
    async fn test_digest_top_n() {
        let audit = audit_with(&[("claude", "429", 4), ("clickup", "503", 2), ("db", "timeout", 1)]).await;
        let config = DigestConfig {
            window_hours: 24,
            top_n: 2,
        };

        let digest = build_digest(&audit, &config).await.unwrap();
        assert_eq!(digest.signatures.len(), 2);
        assert_eq!(digest.signatures[0].source, "claude");
        assert!(digest.render().contains("claude: 429 (4x)"));
        assert!(!digest.render().contains("db"));
    }

    #[tokio::test]
    async fn test_send_digest_to_admin() {
        let audit = audit_with(&[("claude", "429", 1)]).await;
        let sink = Arc::new(MemoryNotificationSink::new());
        let notifier = Notifier::new(sink.clone(), AlertConfig::new("freelance", "admin-chat"));

        send_digest(&audit, &notifier, &DigestConfig::default()).await.unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination(), Some("admin-chat"));
        assert!(sent[0].message.starts_with("📊 *Error Digest (168h)*"));
    }

    #[tokio::test]
    async fn test_empty_digest() {
        let audit = InMemoryAuditSink::new();
        let digest = build_digest(&audit, &DigestConfig::default()).await.unwrap();
        assert!(digest.is_empty());
        assert!(digest.render().ends_with("No errors recorded."));
    }
}
