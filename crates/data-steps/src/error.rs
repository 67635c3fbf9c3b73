//! Error types for step registration, pipeline execution and export.
//!
//! All fallible operations in the crate return [`DataStepsError`]. Variants are
//! grouped into broad categories through [`ErrorKind`] so callers can react to a
//! class of failure (e.g. "the author passed something invalid") without
//! matching every variant.
//!
//! Errors are serializable as `{ code, message }`, which makes them easy to
//! forward to a frontend or to print as JSON from the CLI.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// Broad category of a [`DataStepsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The engine is missing state it needs (e.g. the original dataset).
    Configuration,
    /// A registration, override, index or export request was invalid.
    Validation,
    /// A step callable failed while the pipeline was running.
    StepExecution,
    /// The export name could not be determined from the step sources.
    NameResolution,
    /// IO, polars or JSON failures outside of step callables.
    External,
}

/// The main error type for the step pipeline.
#[derive(Error, Debug)]
pub enum DataStepsError {
    /// The original dataset was read before it was set.
    #[error("Original data not set")]
    OriginalNotSet,

    /// A step function declares no parameters, so there is no slot for the dataset.
    #[error("Step '{0}' must accept at least the dataset parameter")]
    NoParameters(String),

    /// A parameter override names a parameter the step does not declare.
    #[error("Step '{step}' has no parameter '{parameter}' (expected one of: {expected:?})")]
    UnexpectedParameter {
        step: String,
        parameter: String,
        expected: Vec<String>,
    },

    /// A declared parameter has neither a default nor an override.
    #[error("Step '{step}' is missing a value for parameter '{parameter}'")]
    MissingParameter { step: String, parameter: String },

    /// A parameter value could not be converted to the type a step asked for.
    #[error("Invalid value for parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    /// Parameter overrides were not a JSON object.
    #[error("Parameter overrides for step '{0}' must be a JSON object")]
    InvalidOverrides(String),

    /// A partial-execution index below -1 was requested.
    #[error("Invalid step index {0} (must be -1 or greater)")]
    InvalidStepIndex(isize),

    /// No step with this name is registered.
    #[error("Step '{0}' not found")]
    StepNotFound(String),

    /// Step definition text could not be parsed.
    #[error("Invalid step source: {0}")]
    InvalidSource(String),

    /// A step without definition text was asked to be exported.
    #[error("Step '{0}' has no source text to export")]
    MissingSource(String),

    /// A step callable failed. The callable's own error is kept as the source.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// The export name could not be inferred from the first step's source.
    #[error("Could not determine pipeline name: {0}")]
    NameResolution(String),

    /// Engine-bound export text could not be parsed back.
    #[error("Malformed export at line {line}: {reason}")]
    MalformedExport { line: usize, reason: String },

    /// A step referenced by export text or a manifest is not in the library.
    #[error("Step '{0}' is not available in the step library")]
    UnknownStep(String),

    /// Export configuration failed validation.
    #[error("Invalid export configuration: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DataStepsError>,
    },
}

impl DataStepsError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DataStepsError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OriginalNotSet => ErrorKind::Configuration,
            Self::NoParameters(_)
            | Self::UnexpectedParameter { .. }
            | Self::MissingParameter { .. }
            | Self::InvalidParameter { .. }
            | Self::InvalidOverrides(_)
            | Self::InvalidStepIndex(_)
            | Self::StepNotFound(_)
            | Self::InvalidSource(_)
            | Self::MissingSource(_)
            | Self::MalformedExport { .. }
            | Self::UnknownStep(_)
            | Self::Config(_) => ErrorKind::Validation,
            Self::StepFailed { .. } => ErrorKind::StepExecution,
            Self::NameResolution(_) => ErrorKind::NameResolution,
            Self::Io(_) | Self::Polars(_) | Self::Json(_) => ErrorKind::External,
            Self::WithContext { source, .. } => source.kind(),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OriginalNotSet => "ORIGINAL_NOT_SET",
            Self::NoParameters(_) => "NO_PARAMETERS",
            Self::UnexpectedParameter { .. } => "UNEXPECTED_PARAMETER",
            Self::MissingParameter { .. } => "MISSING_PARAMETER",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::InvalidOverrides(_) => "INVALID_OVERRIDES",
            Self::InvalidStepIndex(_) => "INVALID_STEP_INDEX",
            Self::StepNotFound(_) => "STEP_NOT_FOUND",
            Self::InvalidSource(_) => "INVALID_SOURCE",
            Self::MissingSource(_) => "MISSING_SOURCE",
            Self::StepFailed { .. } => "STEP_FAILED",
            Self::NameResolution(_) => "NAME_RESOLUTION",
            Self::MalformedExport { .. } => "MALFORMED_EXPORT",
            Self::UnknownStep(_) => "UNKNOWN_STEP",
            Self::Config(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error was raised by a step callable.
    pub fn is_step_failure(&self) -> bool {
        self.kind() == ErrorKind::StepExecution
    }

    /// Check if this error is a validation failure.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Name of the step involved in this error, if any.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::NoParameters(step)
            | Self::InvalidOverrides(step)
            | Self::StepNotFound(step)
            | Self::MissingSource(step)
            | Self::UnknownStep(step) => Some(step),
            Self::UnexpectedParameter { step, .. }
            | Self::MissingParameter { step, .. }
            | Self::StepFailed { step, .. } => Some(step),
            Self::WithContext { source, .. } => source.step_name(),
            _ => None,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for DataStepsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DataStepsError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for step pipeline operations.
pub type Result<T> = std::result::Result<T, DataStepsError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| DataStepsError::Polars(e).with_context(context))
    }
}
