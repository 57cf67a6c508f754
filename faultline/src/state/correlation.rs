//! Correlating a later trigger with state parked by an earlier run.
//!
//! A run parks a payload under a key and hands out callback tokens
//! (`approve_<key>`, `reject_<key>`). The invocation that receives a token
//! takes the entry exactly once; a second press, or a press after the sweep
//! removed the entry, reports the entry as expired.

use super::store::StateStore;
use crate::errors::StoreError;
use crate::ports::Notifier;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};

static CALLBACK_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(approve|reject)_(.+)$").ok());

/// What the human decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Go ahead.
    Approve,
    /// Drop it.
    Reject,
}

impl Decision {
    fn prefix(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approved"),
            Self::Reject => write!(f, "rejected"),
        }
    }
}

/// A parsed callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    /// The decision.
    pub decision: Decision,
    /// Store key the decision refers to.
    pub key: String,
}

impl Callback {
    /// Parses `approve_<key>` or `reject_<key>`.
    ///
    /// Everything after the first underscore is the key, so keys may contain
    /// underscores themselves.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let captures = CALLBACK_PATTERN.as_ref()?.captures(data.trim())?;
        let decision = match captures.get(1)?.as_str() {
            "approve" => Decision::Approve,
            _ => Decision::Reject,
        };
        Some(Self {
            decision,
            key: captures.get(2)?.as_str().to_string(),
        })
    }

    /// Renders the token for `decision` on `key`.
    #[must_use]
    pub fn token(decision: Decision, key: &str) -> String {
        format!("{}_{key}", decision.prefix())
    }
}

/// Tokens handed out when a payload is parked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackTokens {
    /// Token that approves.
    pub approve: String,
    /// Token that rejects.
    pub reject: String,
}

/// Result of handling a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// The entry was found and consumed.
    Resolved {
        /// The decision.
        decision: Decision,
        /// The consumed key.
        key: String,
        /// The parked payload.
        payload: serde_json::Value,
    },
    /// Nothing stored under the key any more.
    Expired {
        /// The missing key.
        key: String,
    },
    /// The token did not match the callback format.
    Unrecognized,
}

/// Parks payloads and resolves callbacks against a [`StateStore`].
pub struct CorrelationHandler {
    store: Arc<dyn StateStore>,
    notifier: Option<Arc<Notifier>>,
}

impl fmt::Debug for CorrelationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationHandler")
            .field("notifies", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl CorrelationHandler {
    /// Creates a handler over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    /// Sends confirmations and expiry notices to the user destination.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Stores `payload` under `key` and returns the callback tokens for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn park(
        &self,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<CallbackTokens, StoreError> {
        self.store.put(key, payload).await?;
        tracing::info!(key, "Parked entry awaiting callback");
        Ok(CallbackTokens {
            approve: Callback::token(Decision::Approve, key),
            reject: Callback::token(Decision::Reject, key),
        })
    }

    /// Resolves a callback token, consuming the parked entry.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails.
    pub async fn handle(&self, data: &str) -> Result<Correlation, StoreError> {
        let Some(callback) = Callback::parse(data) else {
            tracing::warn!(data, "Unrecognized callback");
            return Ok(Correlation::Unrecognized);
        };

        let Some(payload) = self.store.take(&callback.key).await? else {
            tracing::info!(key = %callback.key, "Callback for expired or consumed entry");
            self.tell_user(&format!(
                "❌ Data for '{}' not found. It may have expired.",
                callback.key
            ))
            .await;
            return Ok(Correlation::Expired { key: callback.key });
        };

        tracing::info!(key = %callback.key, decision = %callback.decision, "Callback resolved");
        let label = payload
            .get("title")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(callback.key.as_str());
        let icon = match callback.decision {
            Decision::Approve => "✅",
            Decision::Reject => "🚫",
        };
        self.tell_user(&format!("{icon} {} {label}", capitalize(&callback.decision.to_string())))
            .await;

        Ok(Correlation::Resolved {
            decision: callback.decision,
            key: callback.key,
            payload,
        })
    }

    async fn tell_user(&self, message: &str) {
        if let Some(notifier) = &self.notifier {
            // Failures are logged by the notifier.
            let _ = notifier.notify_user(message).await;
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertConfig;
    use crate::ports::MemoryNotificationSink;
    use crate::state::InMemoryStateStore;

    #[test]
    fn test_parse_callback() {
        assert_eq!(
            Callback::parse("approve_abc123"),
            Some(Callback {
                decision: Decision::Approve,
                key: "abc123".to_string()
            })
        );
        assert_eq!(Callback::parse("reject_job_7").unwrap().key, "job_7");
        assert_eq!(Callback::parse("approve_"), None);
        assert_eq!(Callback::parse("maybe_abc"), None);
    }

    #[test]
    fn test_token_round_trip() {
        let token = Callback::token(Decision::Reject, "x1");
        assert_eq!(token, "reject_x1");
        assert_eq!(Callback::parse(&token).unwrap().decision, Decision::Reject);
    }

    #[tokio::test]
    async fn test_handle_consumes_once() {
        let store = Arc::new(InMemoryStateStore::new());
        let sink = Arc::new(MemoryNotificationSink::new());
        let handler = CorrelationHandler::new(store.clone()).with_notifier(Arc::new(Notifier::new(
            sink.clone(),
            AlertConfig::new("proposals", "admin").with_user_destination("user"),
        )));

        let tokens = handler
            .park("abc", serde_json::json!({"title": "Rust CLI"}))
            .await
            .unwrap();

        let first = handler.handle(&tokens.approve).await.unwrap();
        assert!(matches!(first, Correlation::Resolved { decision: Decision::Approve, .. }));

        let second = handler.handle(&tokens.approve).await.unwrap();
        assert_eq!(second, Correlation::Expired { key: "abc".to_string() });

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "✅ Approved Rust CLI");
        assert!(messages[1].contains("may have expired"));
        assert_eq!(sink.sent()[1].destination(), Some("user"));
    }

    #[tokio::test]
    async fn test_unrecognized_leaves_store_alone() {
        let store = Arc::new(InMemoryStateStore::new());
        store.put("abc", serde_json::json!(1)).await.unwrap();
        let handler = CorrelationHandler::new(store.clone());

        assert_eq!(handler.handle("hello").await.unwrap(), Correlation::Unrecognized);
        assert_eq!(store.len().await.unwrap(), 1);
    }
}
