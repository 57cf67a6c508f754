//! # Faultline
//!
//! Resilient execution for stateless job runners.
//!
//! Faultline wraps calls to unreliable external services so that a single
//! invocation can:
//!
//! - **Retry with backoff**: bounded attempts with exponential delay
//! - **Break circuits**: stop calling a dependency that keeps failing
//! - **Degrade gracefully**: run multi-step pipelines that fall back instead of aborting
//! - **Keep short-lived state**: park data between invocations with TTL expiry
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use faultline::prelude::*;
//!
//! let config = FaultlineConfig::from_env()?;
//! let breakers = BreakerRegistry::new(config.clone());
//! let scoring = breakers.guarded("scoring-api");
//!
//! let pipeline = PipelineBuilder::new("triage")
//!     .step(Step::required("fetch", fetch_action))?
//!     .step(Step::optional("score", action_fn(move |ctx| {
//!         let scoring = scoring.clone();
//!         async move { scoring.call(|| score(ctx.get("fetch").cloned())).await }
//!     })).depends_on(&["fetch"]))?
//!     .build()?;
//!
//! let result = PipelineRunner::new().run(&pipeline, JobRef::new("42", "Backend role")).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod reporting;
pub mod resilience;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        AlertConfig, BreakerConfig, DigestConfig, FaultlineConfig, NotificationConfig,
        StoreConfig,
    };
    pub use crate::core::{
        with_timeout, CallFailure, CallOutcome, FailureKind, JobRef, PipelineStatus, StepStatus,
    };
    pub use crate::errors::{ConfigError, FaultlineError, PipelineValidationError, StoreError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        action_fn, Pipeline, PipelineBuilder, PipelineResult, PipelineRunner, Step, StepAction,
        StepContext, StepOutcome,
    };
    pub use crate::ports::{
        ArchiveStore, AuditSink, ErrorRecord, LogNotificationSink, NotificationSink, Notifier,
    };
    pub use crate::reporting::{send_digest, Alert, AlertSeverity};
    pub use crate::resilience::{
        BreakerRegistry, CircuitBreaker, GuardedCall, Retrier, RetryPolicy,
    };
    pub use crate::state::{
        open_store, Correlation, CorrelationHandler, StateStore, StateStoreExt,
    };
}

// Re-export commonly used types at the crate root
pub use crate::core::{CallFailure, CallOutcome, FailureKind, JobRef};
pub use crate::errors::FaultlineError;
pub use crate::pipeline::{PipelineBuilder, PipelineRunner};
pub use crate::resilience::{CircuitBreaker, Retrier, RetryPolicy};
pub use crate::state::StateStore;
