//! Graceful-degradation pipelines.
//!
//! This module provides:
//! - [`Step`] and [`StepAction`] for defining units of work
//! - [`PipelineBuilder`] for assembling validated pipelines
//! - [`PipelineRunner`] for executing them with fallbacks and skip propagation

mod builder;
mod failure_tolerance;
mod result;
mod runner;
mod step;

#[cfg(test)]
mod integration_tests;

pub use builder::{Pipeline, PipelineBuilder};
pub use failure_tolerance::{FailureCollector, FailureRecord};
pub use result::{PipelineResult, StepOutcome};
pub use runner::PipelineRunner;
pub use step::{action_fn, FnAction, Step, StepAction, StepContext};
