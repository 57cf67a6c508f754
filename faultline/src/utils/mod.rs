//! Utility functions for time handling and identifiers.

mod clock;

pub use clock::{system_clock, to_chrono, Clock, ManualClock, SystemClock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Formats a timestamp as an RFC 3339 string with microsecond precision.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Generates a time-ordered identifier for runs and archive records.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}
