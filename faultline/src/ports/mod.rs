//! Narrow interfaces to the outside world.
//!
//! Concrete services stay outside the crate; each port ships an in-memory
//! implementation for tests and local runs.

mod archive;
mod audit;
mod notify;

pub use archive::{ArchiveCriteria, ArchiveKind, ArchiveRecord, ArchiveStore, InMemoryArchive};
pub use audit::{
    fingerprint, group_signatures, AuditSink, ErrorRecord, ErrorSignature, InMemoryAuditSink,
};
pub use notify::{
    LogNotificationSink, MemoryNotificationSink, Metadata, NotificationSink, Notifier,
    SentNotification,
};
