//! JSON description of a pipeline built from library steps.
//!
//! ```json
//! {
//!   "name": "cleanup",
//!   "steps": [
//!     { "step": "drop_duplicates", "priority": 1 },
//!     { "step": "fill_null", "parameters": { "column": "score", "value": 0.0 } }
//!   ]
//! }
//! ```

use crate::engine::PipelineEngine;
use crate::error::{DataStepsError, Result, ResultExt};
use crate::library::StepLibrary;
use crate::step::Parameters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A pipeline manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineManifest {
    /// Name used when exporting the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Step registrations, applied in order.
    #[serde(default)]
    pub steps: Vec<ManifestStep>,
}

/// One registration in a [`PipelineManifest`].
///
/// Options that are not given fall back to the ones written in the library
/// step's registration attribute, then to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestStep {
    /// Name of the step in the library.
    pub step: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_secondary_result: Option<bool>,

    /// Parameter overrides applied after registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl PipelineManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(DataStepsError::from)
            .context(format!("Failed to read manifest {}", path.display()))?;
        Self::from_json(&text).context(format!("Failed to parse manifest {}", path.display()))
    }

    /// Register every listed step on `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::UnknownStep`] for a step missing from
    /// `library`, or the registration/override error of the failing entry.
    pub fn apply<D>(&self, engine: &mut PipelineEngine<D>, library: &StepLibrary<D>) -> Result<()> {
        for entry in &self.steps {
            let function = library
                .get(&entry.step)
                .ok_or_else(|| DataStepsError::UnknownStep(entry.step.clone()))?
                .clone();

            let mut options = function.declared_options()?;
            if let Some(priority) = entry.priority {
                options = options.priority(priority);
            }
            if let Some(active) = entry.active {
                options = options.active(active);
            }
            if let Some(has_secondary_result) = entry.has_secondary_result {
                options = options.has_secondary_result(has_secondary_result);
            }

            engine
                .register_step_with(function, options)
                .context(format!("Registering step '{}'", entry.step))?;

            if let Some(parameters) = &entry.parameters
                && options.active
            {
                engine.update_step_parameters(&entry.step, parameters.to_json())?;
            }
        }

        info!(
            "Applied manifest{} with {} entries",
            self.name.as_deref().map(|n| format!(" '{n}'")).unwrap_or_default(),
            self.steps.len()
        );
        Ok(())
    }
}
