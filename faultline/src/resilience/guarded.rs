//! Breaker plus retrier for one dependency.

use super::breaker::CircuitBreaker;
use super::retry::{Retrier, RetryPolicy};
use crate::core::CallOutcome;
use std::future::Future;
use std::sync::Arc;

/// A dependency call path: the breaker gates a retried call.
///
/// The breaker sees one outcome per `call`, after retries are exhausted, so
/// a single flaky response that recovers on retry does not count against it.
#[derive(Debug, Clone)]
pub struct GuardedCall {
    breaker: Arc<CircuitBreaker>,
    retrier: Retrier,
    policy: RetryPolicy,
}

impl GuardedCall {
    /// Creates a guarded call.
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>, retrier: Retrier, policy: RetryPolicy) -> Self {
        Self {
            breaker,
            retrier,
            policy,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `call` through the breaker and retrier.
    pub async fn call<T, F, Fut>(&self, call: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        self.breaker
            .call(|| self.retrier.execute(&self.policy, call))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CallFailure;
    use crate::resilience::BreakerStateKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn guarded(threshold: u32, attempts: u32) -> GuardedCall {
        GuardedCall::new(
            Arc::new(CircuitBreaker::new("clickup", threshold, Duration::from_secs(60))),
            Retrier::new("clickup"),
            RetryPolicy::new(attempts, Duration::from_millis(10), 2.0),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_success_does_not_count_against_breaker() {
        let g = guarded(1, 3);
        let calls = AtomicU32::new(0);

        let outcome = g
            .call(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(CallFailure::from_status(503, "busy"))
                    } else {
                        Ok("task-1")
                    }
                }
            })
            .await;

        assert_eq!(outcome, Ok("task-1"));
        assert_eq!(g.breaker().state().kind(), BreakerStateKind::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_retries() {
        let g = guarded(1, 3);
        let calls = AtomicU32::new(0);
        let failing = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CallFailure::from_status(500, "boom")) }
        };

        let _ = g.call(failing).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let rejected = g.call(failing).await.unwrap_err();
        assert!(rejected.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
