//! The pipeline engine: owns a step registry and the original dataset.
//!
//! Every execution call clones the original and folds the ordered steps over
//! it. Nothing is cached, so changes to the registry are picked up by the next
//! call.

use crate::config::ExportConfig;
use crate::error::{DataStepsError, Result};
use crate::export::{ExportForm, Exporter};
use crate::overview::StepOverview;
use crate::registry::StepRegistry;
use crate::step::{Parameters, StepFunction, StepOptions};
use indexmap::IndexMap;
use parking_lot::RwLock;
use polars::prelude::DataFrame;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secondary results keyed by step name, in application order.
pub type SecondaryResults = IndexMap<String, Value>;

/// Registry shared between an engine and its exporters.
pub(crate) type SharedRegistry<D> = Arc<RwLock<StepRegistry<D>>>;

/// Incrementally assembled, reorderable transformation pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let mut pipeline: PipelineEngine<i64> = PipelineEngine::new();
/// pipeline.register_step_with(inc, StepOptions::new().priority(1))?;
/// pipeline.set_original(1);
/// assert_eq!(pipeline.transformed()?, 2);
/// ```
pub struct PipelineEngine<D = DataFrame> {
    registry: SharedRegistry<D>,
    original: Option<D>,
}

static_assertions::assert_impl_all!(PipelineEngine<DataFrame>: Send, Sync);

impl<D> Default for PipelineEngine<D> {
    fn default() -> Self {
        Self {
            registry: Arc::new(RwLock::new(StepRegistry::new())),
            original: None,
        }
    }
}

impl<D> PipelineEngine<D> {
    /// Create an engine with an empty registry and no original dataset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_original(original: D) -> Self {
        Self {
            original: Some(original),
            ..Self::default()
        }
    }

    /// The original dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::OriginalNotSet`] before one is set.
    pub fn original(&self) -> Result<&D> {
        self.original.as_ref().ok_or(DataStepsError::OriginalNotSet)
    }

    /// Replace the original dataset.
    pub fn set_original(&mut self, original: D) -> &mut Self {
        self.original = Some(original);
        self
    }

    pub fn has_original(&self) -> bool {
        self.original.is_some()
    }

    /// Register a step with default options and hand the function back.
    pub fn register_step(&mut self, function: StepFunction<D>) -> Result<StepFunction<D>> {
        self.register_step_with(function, StepOptions::default())
    }

    /// Register a step with explicit options and hand the function back.
    ///
    /// Registering a name again replaces the step, including any parameter
    /// overrides. An inactive registration removes the step instead.
    pub fn register_step_with(
        &mut self,
        function: StepFunction<D>,
        options: StepOptions,
    ) -> Result<StepFunction<D>> {
        if let Some(source) = function.source() {
            match source.registration_options() {
                Ok(Some(declared)) if declared != options => debug!(
                    "Step '{}' is registered with {:?} but its source declares {:?}",
                    function.name(),
                    options,
                    declared
                ),
                Err(e) => warn!(
                    "Could not read registration options of step '{}': {}",
                    function.name(),
                    e
                ),
                _ => {}
            }
        }

        self.registry.write().register(function.clone(), &options)?;
        Ok(function)
    }

    /// Remove a registered step.
    pub fn remove_step(&mut self, name: &str) -> Result<()> {
        self.registry.write().remove(name)?;
        debug!("Removed step '{}'", name);
        Ok(())
    }

    /// Merge parameter overrides into a registered step.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::InvalidOverrides`] if `overrides` is not a
    /// JSON object, [`DataStepsError::StepNotFound`] for an unknown step and
    /// [`DataStepsError::UnexpectedParameter`] for an undeclared key.
    pub fn update_step_parameters(&mut self, name: &str, overrides: Value) -> Result<()> {
        let overrides = Parameters::from_json(overrides)
            .ok_or_else(|| DataStepsError::InvalidOverrides(name.to_string()))?;
        self.registry.write().update_parameters(name, &overrides)?;
        debug!("Updated parameters of step '{}': {}", name, overrides);
        Ok(())
    }

    /// Overview of the registered steps in application order.
    pub fn steps(&self) -> StepOverview {
        self.registry.read().overview()
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    pub fn contains_step(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }

    /// Exporter rendering this engine's registry with the default configuration.
    pub fn export(&self, name: Option<&str>, form: ExportForm) -> Exporter<D> {
        Exporter::new(
            Arc::clone(&self.registry),
            name.map(str::to_string),
            form,
            ExportConfig::default(),
        )
    }

    /// Exporter rendering this engine's registry with a custom configuration.
    pub fn export_with(
        &self,
        name: Option<&str>,
        form: ExportForm,
        config: ExportConfig,
    ) -> Result<Exporter<D>> {
        config.validate()?;
        Ok(Exporter::new(
            Arc::clone(&self.registry),
            name.map(str::to_string),
            form,
            config,
        ))
    }

    pub(crate) fn shared_registry(&self) -> &SharedRegistry<D> {
        &self.registry
    }
}

impl<D: Clone> PipelineEngine<D> {
    /// Apply every registered step to a copy of the original.
    pub fn transformed(&self) -> Result<D> {
        self.run(None).map(|(data, _)| data)
    }

    /// Secondary results of every registered step.
    pub fn secondary_results(&self) -> Result<SecondaryResults> {
        self.run(None).map(|(_, secondary)| secondary)
    }

    /// Apply the first `n + 1` steps in application order.
    ///
    /// `-1` applies no steps; an index past the last step applies all of them.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::InvalidStepIndex`] for `n < -1`.
    pub fn partial_transform(&self, n: isize) -> Result<D> {
        self.run(Some(prefix_len(n)?)).map(|(data, _)| data)
    }

    /// Secondary results of the first `n + 1` steps in application order.
    pub fn partial_secondary_results(&self, n: isize) -> Result<SecondaryResults> {
        self.run(Some(prefix_len(n)?)).map(|(_, secondary)| secondary)
    }

    /// Transformed data and secondary results from a single pass.
    pub fn execute(&self) -> Result<(D, SecondaryResults)> {
        self.run(None)
    }

    /// Like [`Self::execute`], limited to the first `n + 1` steps.
    pub fn execute_partial(&self, n: isize) -> Result<(D, SecondaryResults)> {
        self.run(Some(prefix_len(n)?))
    }

    fn run(&self, limit: Option<usize>) -> Result<(D, SecondaryResults)> {
        let registry = self.registry.read();
        let mut data = self.original()?.clone();
        let mut secondary = SecondaryResults::new();

        let ordered = registry.ordered();
        let count = limit.map_or(ordered.len(), |n| n.min(ordered.len()));
        info!("Applying {} of {} steps", count, ordered.len());

        for step in ordered.into_iter().take(count) {
            debug!("Applying step '{}' (priority {})", step.name(), step.priority());
            let (next, side) = step.apply(data)?;
            data = next;
            if let Some(side) = side {
                secondary.insert(step.name().to_string(), side);
            }
        }

        Ok((data, secondary))
    }
}

fn prefix_len(n: isize) -> Result<usize> {
    if n < -1 {
        return Err(DataStepsError::InvalidStepIndex(n));
    }
    // n >= -1 here, so n + 1 fits in usize.
    Ok((n as usize).wrapping_add(1))
}

impl<D> fmt::Debug for PipelineEngine<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("steps", &self.steps().names())
            .field("has_original", &self.original.is_some())
            .finish()
    }
}
