//! Scripted actions and calls for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{CallFailure, CallOutcome};
use crate::pipeline::{StepAction, StepContext};

/// Replays a fixed sequence of outcomes; the last one repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedCall {
    script: Mutex<VecDeque<CallOutcome<serde_json::Value>>>,
    last: Mutex<CallOutcome<serde_json::Value>>,
    calls: AtomicUsize,
}

impl ScriptedCall {
    /// Creates a call that replays `outcomes` in order.
    #[must_use]
    pub fn new(outcomes: Vec<CallOutcome<serde_json::Value>>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or(Ok(serde_json::Value::Null));
        Self {
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always succeeds with `value`.
    #[must_use]
    pub fn succeeding(value: serde_json::Value) -> Self {
        Self::new(vec![Ok(value)])
    }

    /// Always fails with `failure`.
    #[must_use]
    pub fn failing(failure: CallFailure) -> Self {
        Self::new(vec![Err(failure)])
    }

    /// Fails transiently `n` times, then succeeds with `value`.
    #[must_use]
    pub fn flaky(n: usize, value: serde_json::Value) -> Self {
        let mut outcomes: Vec<_> = (0..n)
            .map(|i| Err(CallFailure::transient(format!("attempt {} failed", i + 1))))
            .collect();
        outcomes.push(Ok(value));
        Self::new(outcomes)
    }

    /// Returns the next outcome.
    pub async fn call(&self) -> CallOutcome<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(outcome) => {
                *self.last.lock() = outcome.clone();
                outcome
            }
            None => self.last.lock().clone(),
        }
    }

    /// Returns how many times the call was made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A step action backed by a [`ScriptedCall`] that records what it saw.
#[derive(Debug)]
pub struct ScriptedAction {
    call: ScriptedCall,
    delay: Option<Duration>,
    seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedAction {
    /// Wraps a scripted call.
    #[must_use]
    pub fn new(call: ScriptedCall) -> Self {
        Self {
            call,
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always succeeds with `value`.
    #[must_use]
    pub fn ok(value: serde_json::Value) -> Self {
        Self::new(ScriptedCall::succeeding(value))
    }

    /// Always fails with `failure`.
    #[must_use]
    pub fn err(failure: CallFailure) -> Self {
        Self::new(ScriptedCall::failing(failure))
    }

    /// Sleeps before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of runs.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call.call_count()
    }

    /// Returns, per run, which of `keys` were present in the context.
    #[must_use]
    pub fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl StepAction for ScriptedAction {
    async fn run(&self, ctx: &StepContext) -> CallOutcome<serde_json::Value> {
        self.seen.lock().push(ctx.output_names());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.call.call().await
    }
}
