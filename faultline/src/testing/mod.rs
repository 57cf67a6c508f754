//! Testing utilities for faultline pipelines.
//!
//! This module provides:
//! - Scripted calls and step actions
//! - A runner harness backed by in-memory ports

mod fixtures;
mod mocks;

pub use fixtures::TestHarness;
pub use mocks::{ScriptedAction, ScriptedCall};
