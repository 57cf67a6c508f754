//! Core domain model types for faultline.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Call outcomes and failure classification
//! - Step and pipeline status enums
//! - Job identity

mod job;
mod outcome;
mod status;

pub use outcome::{
    default_retry_predicate, is_retryable_status, with_timeout, CallFailure, CallOutcome,
    FailureKind, RETRYABLE_STATUS_CODES, TIMEOUT_CODE,
};
pub use job::JobRef;
pub use status::{PipelineStatus, StepStatus};
