//! Configuration for rendering exported pipelines.
//!
//! Use [`ExportConfig::builder()`] to override the names and types that appear
//! in generated text.

use serde::{Deserialize, Serialize};

/// Configuration for the exporter.
///
/// # Example
///
/// ```rust,ignore
/// use data_steps::config::ExportConfig;
///
/// let config = ExportConfig::builder()
///     .input_name("frame")
///     .indent_width(2)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Spaces per indentation level in the standalone wrapper.
    /// Default: 4
    pub indent_width: usize,

    /// Name of the standalone wrapper's input parameter.
    /// Default: "input_data"
    pub input_name: String,

    /// Dataset type written in the standalone wrapper's signature.
    /// Default: "DataFrame"
    pub dataset_type: String,

    /// Result type wrapping the standalone wrapper's return value.
    /// Default: "anyhow::Result"
    pub result_type: String,

    /// Engine type constructed by engine-bound text.
    /// Default: "PipelineEngine"
    pub engine_type: String,

    /// Name used by the CLI when none is given and none can be inferred.
    /// Default: "transform"
    pub default_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            indent_width: 4,
            input_name: "input_data".to_string(),
            dataset_type: "DataFrame".to_string(),
            result_type: "anyhow::Result".to_string(),
            engine_type: "PipelineEngine".to_string(),
            default_name: "transform".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(1..=16).contains(&self.indent_width) {
            return Err(ConfigValidationError::InvalidIndentWidth(self.indent_width));
        }

        for (field, value) in [
            ("input_name", &self.input_name),
            ("default_name", &self.default_name),
        ] {
            if !is_identifier(value) {
                return Err(ConfigValidationError::InvalidIdentifier {
                    field: field.to_string(),
                    value: value.clone(),
                });
            }
        }

        for (field, value) in [
            ("dataset_type", &self.dataset_type),
            ("result_type", &self.result_type),
            ("engine_type", &self.engine_type),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::EmptyTypeName(field.to_string()));
            }
        }

        Ok(())
    }

    /// One indentation level.
    pub fn indent(&self) -> String {
        " ".repeat(self.indent_width)
    }
}

/// Whether `value` is a plain Rust identifier.
pub(crate) fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            value != "_" && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid indent width: {0} (must be between 1 and 16)")]
    InvalidIndentWidth(usize),

    #[error("Invalid identifier for '{field}': '{value}'")]
    InvalidIdentifier { field: String, value: String },

    #[error("Type name for '{0}' must not be empty")]
    EmptyTypeName(String),
}

/// Builder for [`ExportConfig`].
#[derive(Debug, Default)]
pub struct ExportConfigBuilder {
    indent_width: Option<usize>,
    input_name: Option<String>,
    dataset_type: Option<String>,
    result_type: Option<String>,
    engine_type: Option<String>,
    default_name: Option<String>,
}

impl ExportConfigBuilder {
    pub fn indent_width(mut self, width: usize) -> Self {
        self.indent_width = Some(width);
        self
    }

    pub fn input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = Some(name.into());
        self
    }

    /// Set the dataset type, e.g. `Vec<i64>` for non-polars pipelines.
    pub fn dataset_type(mut self, ty: impl Into<String>) -> Self {
        self.dataset_type = Some(ty.into());
        self
    }

    pub fn result_type(mut self, ty: impl Into<String>) -> Self {
        self.result_type = Some(ty.into());
        self
    }

    pub fn engine_type(mut self, ty: impl Into<String>) -> Self {
        self.engine_type = Some(ty.into());
        self
    }

    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `ExportConfig` or an error if validation fails.
    pub fn build(self) -> Result<ExportConfig, ConfigValidationError> {
        let defaults = ExportConfig::default();
        let config = ExportConfig {
            indent_width: self.indent_width.unwrap_or(defaults.indent_width),
            input_name: self.input_name.unwrap_or(defaults.input_name),
            dataset_type: self.dataset_type.unwrap_or(defaults.dataset_type),
            result_type: self.result_type.unwrap_or(defaults.result_type),
            engine_type: self.engine_type.unwrap_or(defaults.engine_type),
            default_name: self.default_name.unwrap_or(defaults.default_name),
        };

        config.validate()?;
        Ok(config)
    }
}
