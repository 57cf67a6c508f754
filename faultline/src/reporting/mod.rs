//! Human-facing reports: alerts and the failure digest.

mod alert;
mod digest;

pub use alert::{Alert, AlertSeverity};
pub use digest::{build_digest, send_digest, FailureDigest};
