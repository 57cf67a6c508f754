//! Per-dependency circuit breaker.
//!
//! # States
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls are rejected with a `CircuitOpen` failure
//! - HalfOpen: a single trial call checks whether the dependency recovered
//!
//! # Transitions
//! ```text
//! Closed   → Open:     failure_count reaches threshold
//! Open     → HalfOpen: first call after recovery_timeout (lazy, no timer)
//! HalfOpen → Closed:   trial call succeeds
//! HalfOpen → Open:     trial call fails, recovery timeout restarts
//! ```
//!
//! Transitions are pure functions over [`BreakerState`]; the breaker only
//! holds its mutex while applying them, never across the protected call.

use crate::config::BreakerConfig;
use crate::core::{CallFailure, CallOutcome};
use crate::events::{noop_sink, EventSink};
use crate::ports::Notifier;
use crate::reporting::Alert;
use crate::utils::{system_clock, to_chrono, Clock, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Breaker state with the data each state needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through.
    Closed {
        /// Consecutive failures observed.
        failure_count: u32,
    },
    /// Calls are rejected until `opened_at + recovery_timeout`.
    Open {
        /// When the breaker last opened.
        opened_at: Timestamp,
        /// Failures counted when it opened.
        failure_count: u32,
    },
    /// A single trial call is allowed.
    HalfOpen {
        /// Whether the trial call has been handed out.
        trial_in_flight: bool,
    },
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::Closed { failure_count: 0 }
    }
}

impl BreakerState {
    /// Returns the state's kind.
    #[must_use]
    pub fn kind(&self) -> BreakerStateKind {
        match self {
            Self::Closed { .. } => BreakerStateKind::Closed,
            Self::Open { .. } => BreakerStateKind::Open,
            Self::HalfOpen { .. } => BreakerStateKind::HalfOpen,
        }
    }

    /// Returns the failure count carried by the state.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        match self {
            Self::Closed { failure_count } | Self::Open { failure_count, .. } => *failure_count,
            Self::HalfOpen { .. } => 0,
        }
    }

    /// Returns when the breaker opened, if it is open.
    #[must_use]
    pub fn opened_at(&self) -> Option<Timestamp> {
        match self {
            Self::Open { opened_at, .. } => Some(*opened_at),
            _ => None,
        }
    }
}

/// Tag-only view of [`BreakerState`] for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStateKind {
    /// Calls pass through.
    Closed,
    /// Calls are rejected.
    Open,
    /// Probing.
    HalfOpen,
}

impl fmt::Display for BreakerStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Normal call in the closed state.
    Allowed,
    /// The half-open trial call.
    Trial,
    /// Rejected without calling the dependency.
    Rejected,
}

/// A state change worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Closed → Open.
    Opened,
    /// HalfOpen → Open.
    Reopened,
    /// Open → HalfOpen.
    HalfOpened,
    /// HalfOpen → Closed.
    Closed,
}

impl Transition {
    /// Event name emitted to the event sink.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Opened => "breaker.opened",
            Self::Reopened => "breaker.reopened",
            Self::HalfOpened => "breaker.half_open",
            Self::Closed => "breaker.closed",
        }
    }
}

/// Decides whether a call is admitted at `now`.
#[must_use]
pub fn admit(
    state: BreakerState,
    now: Timestamp,
    recovery_timeout: Duration,
) -> (BreakerState, Admission, Option<Transition>) {
    match state {
        BreakerState::Closed { .. } => (state, Admission::Allowed, None),
        BreakerState::Open { opened_at, .. } => {
            if now < opened_at + to_chrono(recovery_timeout) {
                (state, Admission::Rejected, None)
            } else {
                (
                    BreakerState::HalfOpen {
                        trial_in_flight: true,
                    },
                    Admission::Trial,
                    Some(Transition::HalfOpened),
                )
            }
        }
        BreakerState::HalfOpen { trial_in_flight } => {
            if trial_in_flight {
                (state, Admission::Rejected, None)
            } else {
                (
                    BreakerState::HalfOpen {
                        trial_in_flight: true,
                    },
                    Admission::Trial,
                    None,
                )
            }
        }
    }
}

/// Applies a call result to the state.
///
/// Only the call admitted as the half-open trial may close or reopen the
/// breaker. An outcome from a call admitted under an earlier state is
/// ignored once the breaker has left the state it was admitted in.
#[must_use]
pub fn record(
    state: BreakerState,
    admission: Admission,
    success: bool,
    now: Timestamp,
    threshold: u32,
) -> (BreakerState, Option<Transition>) {
    match (state, admission, success) {
        (BreakerState::Closed { .. }, Admission::Allowed, true) => {
            (BreakerState::Closed { failure_count: 0 }, None)
        }
        (BreakerState::Closed { failure_count }, Admission::Allowed, false) => {
            let failure_count = failure_count.saturating_add(1);
            if failure_count >= threshold {
                (
                    BreakerState::Open {
                        opened_at: now,
                        failure_count,
                    },
                    Some(Transition::Opened),
                )
            } else {
                (BreakerState::Closed { failure_count }, None)
            }
        }
        (BreakerState::HalfOpen { .. }, Admission::Trial, true) => (
            BreakerState::Closed { failure_count: 0 },
            Some(Transition::Closed),
        ),
        (BreakerState::HalfOpen { .. }, Admission::Trial, false) => (
            BreakerState::Open {
                opened_at: now,
                failure_count: threshold,
            },
            Some(Transition::Reopened),
        ),
        // Stale: admitted while closed but the breaker has since opened, or a
        // trial that outlived a reset.
        _ => (state, None),
    }
}

/// Serializable snapshot of a breaker for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Dependency name.
    pub dependency: String,
    /// Current state.
    pub state: BreakerStateKind,
    /// Consecutive failures.
    pub failure_count: u32,
    /// Failure threshold.
    pub threshold: u32,
    /// When the breaker opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<Timestamp>,
    /// Recovery timeout in milliseconds.
    pub recovery_timeout_ms: u64,
}

/// Circuit breaker protecting one dependency.
pub struct CircuitBreaker {
    dependency: String,
    threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    notifier: Option<Arc<Notifier>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("dependency", &self.dependency)
            .field("threshold", &self.threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// A zero threshold is raised to 1.
    #[must_use]
    pub fn new(dependency: impl Into<String>, threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            dependency: dependency.into(),
            threshold: threshold.max(1),
            recovery_timeout,
            state: Mutex::new(BreakerState::default()),
            clock: system_clock(),
            events: noop_sink(),
            notifier: None,
        }
    }

    /// Creates a closed breaker from configuration.
    #[must_use]
    pub fn from_config(dependency: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(dependency, config.threshold, config.recovery_timeout())
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the notifier used for the breaker-opened alert.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns the protected dependency's name.
    #[must_use]
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        *self.state.lock()
    }

    /// Returns a reportable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state();
        BreakerSnapshot {
            dependency: self.dependency.clone(),
            state: state.kind(),
            failure_count: state.failure_count(),
            threshold: self.threshold,
            opened_at: state.opened_at(),
            recovery_timeout_ms: u64::try_from(self.recovery_timeout.as_millis())
                .unwrap_or(u64::MAX),
        }
    }

    /// Runs `call` if the breaker admits it and records the result.
    pub async fn call<T, F, Fut>(&self, call: F) -> CallOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let (admission, transition) = {
            let mut state = self.state.lock();
            let (next, admission, transition) = admit(*state, self.clock.now(), self.recovery_timeout);
            *state = next;
            (admission, transition)
        };
        if let Some(transition) = transition {
            self.announce(transition, None);
        }

        if admission == Admission::Rejected {
            tracing::debug!(dependency = %self.dependency, "Call rejected by open circuit");
            return Err(CallFailure::circuit_open(&self.dependency));
        }

        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };
        let outcome = call().await;
        guard.armed = false;

        let transition = {
            let mut state = self.state.lock();
            let (next, transition) = record(
                *state,
                admission,
                outcome.is_ok(),
                self.clock.now(),
                self.threshold,
            );
            *state = next;
            transition
        };

        if let Some(transition) = transition {
            let error = outcome.as_ref().err().map(|f| f.message.as_str());
            self.announce(transition, error);
            if transition == Transition::Opened {
                self.alert_opened(error.unwrap_or("unknown error")).await;
            }
        }

        outcome
    }

    /// Forces the breaker closed, e.g. after a manual fix.
    pub fn reset(&self) {
        let previous = std::mem::take(&mut *self.state.lock());
        if previous.kind() != BreakerStateKind::Closed {
            self.announce(Transition::Closed, None);
        }
    }

    fn announce(&self, transition: Transition, error: Option<&str>) {
        match transition {
            Transition::Opened | Transition::Reopened => tracing::warn!(
                dependency = %self.dependency,
                event = transition.event_type(),
                error = error.unwrap_or_default(),
                "Circuit breaker opened"
            ),
            Transition::HalfOpened | Transition::Closed => tracing::info!(
                dependency = %self.dependency,
                event = transition.event_type(),
                "Circuit breaker state changed"
            ),
        }
        self.events.try_emit(
            transition.event_type(),
            Some(serde_json::json!({
                "dependency": &self.dependency,
                "threshold": self.threshold,
                "error": error,
            })),
        );
    }

    async fn alert_opened(&self, error: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let alert = Alert::breaker_opened(
            &self.dependency,
            self.threshold,
            self.recovery_timeout,
            error,
        );
        // Delivery failures are logged by the notifier.
        let _ = notifier.notify(&alert).await;
    }

    fn abandon_trial(&self) {
        let mut state = self.state.lock();
        if let BreakerState::HalfOpen { .. } = *state {
            *state = BreakerState::Open {
                opened_at: self.clock.now(),
                failure_count: self.threshold,
            };
        }
    }
}

/// Reopens the breaker if a trial call is dropped before finishing.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}
