//! Lazily created breakers, one per dependency name.

use super::breaker::{BreakerSnapshot, CircuitBreaker};
use super::guarded::GuardedCall;
use super::retry::Retrier;
use crate::config::FaultlineConfig;
use crate::events::{noop_sink, EventSink};
use crate::ports::Notifier;
use crate::utils::{system_clock, Clock};
use dashmap::DashMap;
use std::sync::Arc;

/// Shared registry of circuit breakers.
///
/// Runs that call the same dependency share one breaker, so an outage seen
/// by one run protects the others.
pub struct BreakerRegistry {
    config: FaultlineConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    notifier: Option<Arc<Notifier>>,
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.breakers.len())
            .finish_non_exhaustive()
    }
}

impl BreakerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: FaultlineConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            clock: system_clock(),
            events: noop_sink(),
            notifier: None,
        }
    }

    /// Sets the clock handed to new breakers.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event sink handed to new breakers.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the notifier handed to new breakers.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns the breaker for `dependency`, creating it on first use.
    pub fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(dependency) {
            return existing.clone();
        }
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                tracing::debug!(dependency, "Creating circuit breaker");
                let mut breaker =
                    CircuitBreaker::from_config(dependency, self.config.breaker_for(dependency))
                        .with_clock(self.clock.clone())
                        .with_event_sink(self.events.clone());
                if let Some(notifier) = &self.notifier {
                    breaker = breaker.with_notifier(notifier.clone());
                }
                Arc::new(breaker)
            })
            .clone()
    }

    /// Returns a guarded call for `dependency` using its configured policy.
    pub fn guarded(&self, dependency: &str) -> GuardedCall {
        GuardedCall::new(
            self.breaker(dependency),
            Retrier::new(dependency),
            self.config.retry_for(dependency).clone(),
        )
    }

    /// Returns snapshots of every breaker, sorted by dependency.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        snapshots
    }

    /// Returns the number of breakers created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true if no breaker has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerConfig, DependencyConfig};
    use crate::resilience::BreakerStateKind;
    use std::time::Duration;

    fn config() -> FaultlineConfig {
        let mut config = FaultlineConfig::default();
        config.breaker = BreakerConfig::new(3, Duration::from_secs(30));
        config.dependencies.insert(
            "claude".to_string(),
            DependencyConfig {
                breaker: Some(BreakerConfig::new(1, Duration::from_secs(5))),
                retry: None,
            },
        );
        config
    }

    #[test]
    fn test_same_breaker_per_dependency() {
        let registry = BreakerRegistry::new(config());
        let a = registry.breaker("clickup");
        let b = registry.breaker("clickup");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_uses_dependency_override() {
        let registry = BreakerRegistry::new(config());
        assert_eq!(registry.breaker("claude").snapshot().threshold, 1);
        assert_eq!(registry.breaker("telegram").snapshot().threshold, 3);

        let names: Vec<_> = registry.snapshots().into_iter().map(|s| s.dependency).collect();
        assert_eq!(names, vec!["claude", "telegram"]);
    }

    #[tokio::test]
    async fn test_breaker_shared_between_callers() {
        let registry = BreakerRegistry::new(config());
        let _ = registry
            .breaker("claude")
            .call(|| async { Err::<(), _>(crate::core::CallFailure::transient("down")) })
            .await;

        assert_eq!(
            registry.breaker("claude").state().kind(),
            BreakerStateKind::Open
        );
    }
}
