//! Call outcome types shared by the retrier, the breaker and pipeline steps.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// HTTP status codes that indicate a transient dependency problem.
pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Error code reported for timed out calls.
pub const TIMEOUT_CODE: &str = "ETIMEDOUT";

/// Result of one attempt against an external dependency.
///
/// `Ok` is the success arm, `Err` carries the classified failure.
pub type CallOutcome<T> = Result<T, CallFailure>;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network timeout, rate limit or server error.
    Transient,
    /// Validation, authorization or not-found error.
    Permanent,
    /// Synthetic failure produced by an open circuit breaker.
    CircuitOpen,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}

/// A failed call, carrying enough context to classify and report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Whether another attempt may succeed.
    pub retryable: bool,
    /// Human readable message.
    pub message: String,
    /// HTTP status, when the dependency speaks HTTP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Transport level error code (e.g. `ETIMEDOUT`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Extra context for audit records.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl CallFailure {
    fn with_kind(kind: FailureKind, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable,
            message: message.into(),
            status: None,
            code: None,
            context: HashMap::new(),
        }
    }

    /// Creates a retryable transient failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Transient, true, message)
    }

    /// Creates a non-retryable permanent failure.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Permanent, false, message)
    }

    /// Creates the rejection returned by an open breaker.
    #[must_use]
    pub fn circuit_open(dependency: &str) -> Self {
        Self::with_kind(
            FailureKind::CircuitOpen,
            false,
            format!("Circuit breaker for '{dependency}' is open"),
        )
        .with_context("dependency", serde_json::json!(dependency))
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        let mut failure = Self::transient(message);
        failure.code = Some(TIMEOUT_CODE.to_string());
        failure
    }

    /// Classifies a failure from an HTTP status code.
    ///
    /// 429 and 5xx gateway/server errors are transient; everything else is permanent.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let mut failure = if is_retryable_status(status) {
            Self::transient(message)
        } else {
            Self::permanent(message)
        };
        failure.status = Some(status);
        failure
    }

    /// Sets the transport error code, reclassifying timeouts as transient.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        if code == TIMEOUT_CODE {
            self.kind = FailureKind::Transient;
            self.retryable = true;
        }
        self.code = Some(code);
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Returns true if the failure came from an open breaker rather than the dependency.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        self.kind == FailureKind::CircuitOpen
    }

    /// Returns true if the failure is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.code.as_deref() == Some(TIMEOUT_CODE)
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} failure ({status}): {}", self.kind, self.message),
            None => write!(f, "{} failure: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CallFailure {}

/// Returns true for HTTP statuses worth retrying.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Default retry predicate: trusts the failure's own classification.
#[must_use]
pub fn default_retry_predicate(failure: &CallFailure) -> bool {
    match failure.kind {
        FailureKind::CircuitOpen | FailureKind::Permanent => false,
        FailureKind::Transient => {
            failure.retryable
                || failure.is_timeout()
                || failure.status.is_some_and(is_retryable_status)
        }
    }
}

/// Bounds a call with a deadline, mapping expiry to a transient timeout failure.
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> CallOutcome<T>
where
    Fut: Future<Output = CallOutcome<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(outcome) => outcome,
        Err(_) => Err(CallFailure::timeout(format!(
            "call exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        for status in [429, 500, 502, 503, 504] {
            let failure = CallFailure::from_status(status, "upstream");
            assert_eq!(failure.kind, FailureKind::Transient);
            assert!(failure.retryable);
        }
        for status in [400, 401, 403, 404, 422] {
            let failure = CallFailure::from_status(status, "rejected");
            assert_eq!(failure.kind, FailureKind::Permanent);
            assert!(!failure.retryable);
        }
    }

    #[test]
    fn test_timeout_code_is_retryable() {
        let failure = CallFailure::permanent("socket hang").with_code(TIMEOUT_CODE);
        assert!(failure.is_timeout());
        assert!(default_retry_predicate(&failure));
    }

    #[test]
    fn test_circuit_open_never_retryable() {
        let failure = CallFailure::circuit_open("clickup");
        assert!(failure.is_circuit_open());
        assert!(!default_retry_predicate(&failure));
        assert!(failure.message.contains("clickup"));
    }

    #[test]
    fn test_display_includes_status() {
        let failure = CallFailure::from_status(503, "unavailable");
        assert_eq!(failure.to_string(), "transient failure (503): unavailable");
    }

    #[test]
    fn test_failure_serialization() {
        let failure = CallFailure::from_status(401, "bad token");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "permanent");
        assert_eq!(json["status"], 401);
        assert!(json.get("code").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_maps_elapsed() {
        let outcome: CallOutcome<()> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;

        let failure = outcome.unwrap_err();
        assert!(failure.is_timeout());
        assert!(failure.retryable);
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result() {
        let outcome = with_timeout(Duration::from_secs(1), async { Ok::<_, CallFailure>(7) }).await;
        assert_eq!(outcome, Ok(7));
    }
}
