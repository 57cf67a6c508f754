//! Pipeline builder with validation.

use super::step::Step;
use crate::errors::PipelineValidationError;
use std::collections::HashSet;

/// A validated, ordered list of steps.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<Step>,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there are no steps. Built pipelines are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder for creating validated pipelines.
///
/// Steps run in insertion order, so a step may only depend on steps added
/// before it.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Step>,
    names: HashSet<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Appends a step.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or taken, or if a dependency is
    /// unknown or declared later.
    pub fn step(mut self, step: Step) -> Result<Self, PipelineValidationError> {
        self.add_step(step)?;
        Ok(self)
    }

    /// Appends a step in place.
    ///
    /// # Errors
    ///
    /// Same as [`PipelineBuilder::step`].
    pub fn add_step(&mut self, step: Step) -> Result<(), PipelineValidationError> {
        if step.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Step name must not be empty")
                .with_fix_hint("Give every step a unique, non-empty name."));
        }
        if self.names.contains(&step.name) {
            return Err(PipelineValidationError::new(format!(
                "Duplicate step '{}'",
                step.name
            ))
            .with_steps(vec![step.name.clone()])
            .with_fix_hint("Rename one of the steps."));
        }
        for dep in &step.depends_on {
            if dep == &step.name {
                return Err(PipelineValidationError::new(format!(
                    "Step '{}' depends on itself",
                    step.name
                ))
                .with_steps(vec![step.name.clone()]));
            }
            if !self.names.contains(dep) {
                return Err(PipelineValidationError::new(format!(
                    "Step '{}' depends on unknown step '{}'",
                    step.name, dep
                ))
                .with_steps(vec![step.name.clone(), dep.clone()])
                .with_fix_hint(
                    "Ensure the dependency is added before the step that depends on it.",
                ));
            }
        }

        self.names.insert(step.name.clone());
        self.steps.push(step);
        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if no steps were added.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.steps.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no steps")
                .with_fix_hint("Add at least one step to the pipeline before building."));
        }
        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
        })
    }
}
