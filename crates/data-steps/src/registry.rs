//! Name-keyed store of registered steps.

use crate::error::{DataStepsError, Result};
use crate::overview::{StepOverview, StepSummary};
use crate::step::{Parameters, Step, StepFunction, StepOptions};
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

/// Registered steps keyed by name.
///
/// Insertion order is retained: re-registering a name keeps its original
/// slot, while removing a step and registering it again appends it.
pub struct StepRegistry<D> {
    steps: IndexMap<String, Step<D>>,
}

impl<D> Default for StepRegistry<D> {
    fn default() -> Self {
        Self {
            steps: IndexMap::new(),
        }
    }
}

impl<D> StepRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or deregister a step function.
    ///
    /// An active registration builds a fresh [`Step`] and replaces any step of
    /// the same name in full, so earlier parameter overrides are lost. An
    /// inactive registration removes the step if present and never validates
    /// the function.
    pub fn register(&mut self, function: StepFunction<D>, options: &StepOptions) -> Result<()> {
        let name = function.name().to_string();

        if !options.active {
            if self.steps.shift_remove(&name).is_some() {
                debug!("Deactivated step '{}'", name);
            }
            return Ok(());
        }

        let step = Step::new(function, options.priority, options.has_secondary_result)?;
        if self.steps.insert(name.clone(), step).is_some() {
            debug!("Redefined step '{}' (priority {})", name, options.priority);
        } else {
            debug!("Registered step '{}' (priority {})", name, options.priority);
        }
        Ok(())
    }

    /// Remove a step by name.
    pub fn remove(&mut self, name: &str) -> Result<Step<D>> {
        self.steps
            .shift_remove(name)
            .ok_or_else(|| DataStepsError::StepNotFound(name.to_string()))
    }

    /// Merge parameter overrides into a registered step.
    pub fn update_parameters(&mut self, name: &str, overrides: &Parameters) -> Result<()> {
        self.steps
            .get_mut(name)
            .ok_or_else(|| DataStepsError::StepNotFound(name.to_string()))?
            .update_parameters(overrides)
    }

    pub fn get(&self, name: &str) -> Option<&Step<D>> {
        self.steps.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in application order: ascending priority, ties by insertion order.
    pub fn ordered(&self) -> Vec<&Step<D>> {
        let mut steps: Vec<&Step<D>> = self.steps.values().collect();
        // sort_by_key is stable
        steps.sort_by_key(|step| step.priority());
        steps
    }

    /// Steps in insertion (declaration) order.
    pub fn declared(&self) -> impl Iterator<Item = &Step<D>> {
        self.steps.values()
    }

    pub fn overview(&self) -> StepOverview {
        let rows = self
            .ordered()
            .into_iter()
            .enumerate()
            .map(|(application_order, step)| StepSummary {
                application_order,
                priority: step.priority(),
                name: step.name().to_string(),
                parameters: step.parameters().clone(),
                has_secondary_result: step.has_secondary_result(),
            })
            .collect();
        StepOverview::new(rows)
    }
}

impl<D> Clone for StepRegistry<D> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<D> fmt::Debug for StepRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps.values()).finish()
    }
}
