//! A runner wired to in-memory collaborators.

use std::sync::Arc;

use crate::config::AlertConfig;
use crate::events::CollectingEventSink;
use crate::pipeline::PipelineRunner;
use crate::ports::{InMemoryArchive, InMemoryAuditSink, MemoryNotificationSink, Notifier};
use crate::state::InMemoryStateStore;
use crate::utils::ManualClock;

/// Collaborators a test can inspect after a run.
#[derive(Debug)]
pub struct TestHarness {
    /// Collected lifecycle events.
    pub events: Arc<CollectingEventSink>,
    /// Delivered notifications.
    pub notifications: Arc<MemoryNotificationSink>,
    /// The notifier wrapping `notifications`.
    pub notifier: Arc<Notifier>,
    /// Error records.
    pub audit: Arc<InMemoryAuditSink>,
    /// Archived results and review markers.
    pub archive: Arc<InMemoryArchive>,
    /// Persisted results.
    pub store: Arc<InMemoryStateStore>,
    /// Shared clock.
    pub clock: Arc<ManualClock>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates fresh collaborators sharing one manual clock.
    #[must_use]
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let notifications = Arc::new(MemoryNotificationSink::new());
        let notifier = Arc::new(Notifier::new(
            notifications.clone(),
            AlertConfig::new("test-workflow", "admin"),
        ));
        Self {
            events: Arc::new(CollectingEventSink::new()),
            notifications,
            notifier,
            audit: Arc::new(InMemoryAuditSink::new().with_clock(clock.clone())),
            archive: Arc::new(InMemoryArchive::new()),
            store: Arc::new(InMemoryStateStore::new().with_clock(clock.clone())),
            clock,
        }
    }

    /// Returns a runner reporting into this harness.
    #[must_use]
    pub fn runner(&self) -> PipelineRunner {
        PipelineRunner::new()
            .with_event_sink(self.events.clone())
            .with_notifier(self.notifier.clone())
            .with_audit(self.audit.clone())
            .with_archive(self.archive.clone())
            .with_state_store(self.store.clone())
            .with_clock(self.clock.clone())
    }
}
