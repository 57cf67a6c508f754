//! Retry with exponential backoff.
//!
//! A [`Retrier`] attempts a call up to `max_attempts` times. Failures the
//! retry predicate rejects (bad request, authorization) are returned after the
//! first attempt; retryable ones are retried after
//! `base_delay * multiplier^retry_index`.

use crate::core::{default_retry_predicate, CallFailure, CallOutcome};
use crate::errors::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Jitter strategy applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Exact delays.
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    delay
                } else {
                    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
                }
            }
        }
    }
}

/// Immutable retry policy for one call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Growth factor applied per retry.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Optional cap on a single delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: None,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy from its three defining parameters.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_multiplier,
            ..Self::default()
        }
    }

    /// A policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero or the multiplier is below 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::invalid("max_attempts", "must be >= 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "backoff_multiplier",
                "must be a finite number >= 1",
            ));
        }
        Ok(())
    }

    /// Delay before retry number `retry_index` (0 for the first retry), before jitter.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        // raw is positive (multiplier >= 1) and checked below u64::MAX before the cast.
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let mut millis = if raw.is_finite() && raw < u64::MAX as f64 {
            raw.round() as u64
        } else {
            u64::MAX
        };
        if let Some(cap) = self.max_delay_ms {
            millis = millis.min(cap);
        }
        Duration::from_millis(millis)
    }

    /// Delay before retry number `retry_index` with jitter applied.
    #[must_use]
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        self.jitter.apply(self.backoff_delay(retry_index))
    }
}

/// Outcome of a retried call together with how it got there.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryReport<T> {
    /// The final outcome.
    pub outcome: CallOutcome<T>,
    /// Number of attempts made.
    pub attempts: u32,
    /// Total time slept between attempts.
    pub total_delay: Duration,
}

type RetryPredicate = Arc<dyn Fn(&CallFailure) -> bool + Send + Sync>;

/// Stateless retry executor.
#[derive(Clone)]
pub struct Retrier {
    label: String,
    predicate: RetryPredicate,
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier").field("label", &self.label).finish_non_exhaustive()
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new("call")
    }
}

impl Retrier {
    /// Creates a retrier using the default classification.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            predicate: Arc::new(default_retry_predicate),
        }
    }

    /// Replaces the retry predicate.
    #[must_use]
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&CallFailure) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Returns the label used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Executes `call` under `policy`, returning the final outcome.
    pub async fn execute<T, F, Fut>(&self, policy: &RetryPolicy, call: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        self.execute_with_report(policy, call).await.outcome
    }

    /// Executes `call` under `policy`, reporting attempts and delay.
    pub async fn execute_with_report<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        mut call: F,
    ) -> RetryReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match call().await {
                Ok(value) => {
                    return RetryReport {
                        outcome: Ok(value),
                        attempts: attempt,
                        total_delay,
                    }
                }
                Err(failure) => failure,
            };

            if !(self.predicate)(&failure) {
                tracing::debug!(
                    label = %self.label,
                    attempt,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Not retrying non-retryable failure"
                );
                return RetryReport {
                    outcome: Err(failure),
                    attempts: attempt,
                    total_delay,
                };
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    label = %self.label,
                    attempts = attempt,
                    error = %failure.message,
                    "Retries exhausted"
                );
                return RetryReport {
                    outcome: Err(failure),
                    attempts: attempt,
                    total_delay,
                };
            }

            let delay = policy.delay_for(attempt - 1);
            tracing::debug!(
                label = %self.label,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure.message,
                "Retrying after error"
            );
            tokio::time::sleep(delay).await;
            total_delay += delay;
        }
    }
}

/// Executes a call with the default retrier.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, call: F) -> CallOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CallOutcome<T>>,
{
    Retrier::default().execute(policy, call).await
}
