//! Incrementally assembled dataset transformation pipelines.
//!
//! # Overview
//!
//! An author registers named steps on a [`PipelineEngine`]. Each step is a
//! function of the dataset plus named parameters, and the engine applies the
//! registered steps to a copy of its original dataset in priority order:
//!
//! - **Priorities**: lower runs earlier, ties keep registration order
//! - **Redefinition**: registering a name again replaces the step in place
//! - **Deactivation**: an inactive registration removes the step
//! - **Overrides**: parameter values can be changed after registration
//! - **Secondary results**: steps may report a side value next to the dataset
//! - **Partial runs**: apply only the first `n + 1` steps
//! - **Export**: render the pipeline as engine-bound or standalone Rust text
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use data_steps::{Parameters, PipelineEngine, StepFunction, StepOptions};
//!
//! let mut pipeline: PipelineEngine<i64> = PipelineEngine::with_original(1);
//!
//! let inc = StepFunction::from_source(
//!     r#"
//!     #[pipeline::step(priority = 1)]
//!     fn inc(data: i64, n: i64) -> anyhow::Result<i64> {
//!         Ok(data + n)
//!     }
//!     "#,
//!     |data: i64, params: &Parameters| Ok((data + params.value::<i64>("n")?).into()),
//! )?
//! .param_default("n", 1);
//!
//! pipeline.register_step_with(inc, StepOptions::new().priority(1))?;
//! pipeline.update_step_parameters("inc", serde_json::json!({"n": 2}))?;
//! assert_eq!(pipeline.transformed()?, 3);
//! ```
//!
//! # Export
//!
//! ```rust,ignore
//! use data_steps::{ExportConfig, ExportForm};
//!
//! let engine_text = pipeline.export(Some("reimport"), ExportForm::EngineBound).render()?;
//!
//! let config = ExportConfig::builder().dataset_type("i64").build()?;
//! let standalone = pipeline
//!     .export_with(Some("my_transformation"), ExportForm::Standalone, config)?
//!     .render()?;
//! ```
//!
//! Engine-bound text can be turned back into an engine with
//! [`PipelineEngine::restore`], given a [`StepLibrary`] holding the callables.

pub mod builtins;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod library;
pub mod manifest;
pub mod overview;
pub mod registry;
pub mod step;

// Re-exports for convenient access
pub use config::{ConfigValidationError, ExportConfig, ExportConfigBuilder};
pub use engine::{PipelineEngine, SecondaryResults};
pub use error::{DataStepsError, ErrorKind, Result, ResultExt};
pub use export::{ExportForm, Exporter, rust_literal};
pub use library::StepLibrary;
pub use manifest::{ManifestStep, PipelineManifest};
pub use overview::{StepOverview, StepSummary};
pub use registry::StepRegistry;
pub use step::{
    DEFAULT_PRIORITY, ParameterSpec, Parameters, Step, StepCallable, StepFunction, StepOptions,
    StepOutput, StepSource,
};
