//! Steps: named, prioritized, parameterized transformation units.
//!
//! A [`StepFunction`] is what an author writes: a callable together with its
//! declared name, its declared parameters and (optionally) its definition text.
//! A [`Step`] is what the registry stores: a step function bound to a priority,
//! the current parameter values and the secondary-result flag.

mod parameters;
mod source;

pub use parameters::Parameters;
pub use source::StepSource;

use crate::error::{DataStepsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Priority used when a step is registered without one.
pub const DEFAULT_PRIORITY: i64 = 5;

/// Signature of a step callable.
///
/// The callable receives the dataset and the step's current parameters and
/// returns the transformed dataset, optionally with a secondary result.
pub type StepCallable<D> =
    Arc<dyn Fn(D, &Parameters) -> anyhow::Result<StepOutput<D>> + Send + Sync>;

/// Output of a step callable.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput<D> {
    /// The primary result, passed on to the next step.
    pub data: D,
    /// Optional side value, collected but never chained.
    pub secondary: Option<Value>,
}

impl<D> StepOutput<D> {
    pub fn new(data: D) -> Self {
        Self {
            data,
            secondary: None,
        }
    }

    pub fn with_secondary(data: D, secondary: impl Into<Value>) -> Self {
        Self {
            data,
            secondary: Some(secondary.into()),
        }
    }
}

impl<D> From<D> for StepOutput<D> {
    fn from(data: D) -> Self {
        Self::new(data)
    }
}

/// A declared parameter of a step function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A callable with a declared name, declared parameters and optional source.
///
/// The first declared parameter is the dataset slot; every later parameter can
/// be overridden through the engine. A step function is cheap to clone, and
/// registering it hands the same function back to the caller.
///
/// # Example
///
/// ```rust,ignore
/// let inc = StepFunction::new("inc", |data: i64, params: &Parameters| {
///     let n: i64 = params.value("n")?;
///     Ok(StepOutput::new(data + n))
/// })
/// .param("data")
/// .param_default("n", 1);
/// ```
pub struct StepFunction<D> {
    name: String,
    parameters: Vec<ParameterSpec>,
    callable: StepCallable<D>,
    source: Option<StepSource>,
}

impl<D> StepFunction<D> {
    /// Create a step function with no declared parameters yet.
    pub fn new<F>(name: impl Into<String>, callable: F) -> Self
    where
        F: Fn(D, &Parameters) -> anyhow::Result<StepOutput<D>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            callable: Arc::new(callable),
            source: None,
        }
    }

    /// Create a step function whose name and parameters come from its source.
    ///
    /// Defaults cannot be expressed in a Rust signature; add them afterwards
    /// with [`param_default`](Self::param_default).
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::InvalidSource`] if the text has no function
    /// definition.
    pub fn from_source<F>(text: &str, callable: F) -> Result<Self>
    where
        F: Fn(D, &Parameters) -> anyhow::Result<StepOutput<D>> + Send + Sync + 'static,
    {
        let source = StepSource::parse(text)?;
        let name = source
            .function_name()
            .ok_or_else(|| DataStepsError::InvalidSource("function has no name".to_string()))?
            .to_string();

        let mut function = Self::new(name, callable);
        for param in source.parameter_names() {
            function = function.param(param);
        }
        function.source = Some(source);
        Ok(function)
    }

    /// Declare a parameter without a default.
    ///
    /// Declaring an already declared parameter is a no-op.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.parameters.iter().any(|p| p.name == name) {
            self.parameters.push(ParameterSpec {
                name,
                default: None,
            });
        }
        self
    }

    /// Declare a parameter with a default, or set the default of a declared one.
    pub fn param_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        let name = name.into();
        let default = Some(default.into());
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(spec) => spec.default = default,
            None => self.parameters.push(ParameterSpec { name, default }),
        }
        self
    }

    /// Attach definition text used by the exporter.
    pub fn with_source(mut self, source: StepSource) -> Self {
        if let Some(declared) = source.function_name()
            && declared != self.name
        {
            debug!(
                "Source of step '{}' defines function '{}'",
                self.name, declared
            );
        }
        self.source = Some(source);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters, dataset slot first.
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn source(&self) -> Option<&StepSource> {
        self.source.as_ref()
    }

    /// Registration options written in the source's attribute line.
    ///
    /// Falls back to [`StepOptions::default`] when there is no source or the
    /// source carries no `#[<ident>::step]` attribute.
    pub fn declared_options(&self) -> Result<StepOptions> {
        match &self.source {
            Some(source) => Ok(source.registration_options()?.unwrap_or_default()),
            None => Ok(StepOptions::default()),
        }
    }

    /// Invoke the callable directly.
    pub fn call(&self, data: D, params: &Parameters) -> anyhow::Result<StepOutput<D>> {
        (self.callable)(data, params)
    }
}

impl<D> Clone for StepFunction<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            callable: Arc::clone(&self.callable),
            source: self.source.clone(),
        }
    }
}

impl<D> fmt::Debug for StepFunction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFunction")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

/// Options for registering a step.
///
/// # Example
///
/// ```rust,ignore
/// let options = StepOptions::new().priority(1).has_secondary_result(true);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepOptions {
    /// Lower priorities run earlier. Default: 5
    pub priority: i64,
    /// Inactive registrations remove the step. Default: true
    pub active: bool,
    /// Whether the callable returns a secondary result. Default: false
    pub has_secondary_result: bool,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            active: true,
            has_secondary_result: false,
        }
    }
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn has_secondary_result(mut self, has_secondary_result: bool) -> Self {
        self.has_secondary_result = has_secondary_result;
        self
    }
}

/// A registered step.
pub struct Step<D> {
    priority: i64,
    function: StepFunction<D>,
    parameters: Parameters,
    expected_parameters: Vec<String>,
    has_secondary_result: bool,
}

impl<D> Step<D> {
    /// Bind a step function to a priority.
    ///
    /// Parameters after the dataset slot become the expected parameters;
    /// those with defaults seed the current parameter values.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::NoParameters`] if the function declares no
    /// parameters at all.
    pub fn new(function: StepFunction<D>, priority: i64, has_secondary_result: bool) -> Result<Self> {
        let Some((_, rest)) = function.parameters().split_first() else {
            return Err(DataStepsError::NoParameters(function.name().to_string()));
        };

        let expected_parameters = rest.iter().map(|p| p.name.clone()).collect();
        let parameters = rest
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();

        Ok(Self {
            priority,
            function,
            parameters,
            expected_parameters,
            has_secondary_result,
        })
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn function(&self) -> &StepFunction<D> {
        &self.function
    }

    /// Current parameter values.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Names of all non-dataset parameters, in declaration order.
    pub fn expected_parameters(&self) -> &[String] {
        &self.expected_parameters
    }

    pub fn has_secondary_result(&self) -> bool {
        self.has_secondary_result
    }

    pub fn source(&self) -> Option<&StepSource> {
        self.function.source()
    }

    /// Merge overrides into the current parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::UnexpectedParameter`] if any key is not an
    /// expected parameter. Nothing is merged in that case.
    ///
    /// Integer overrides of float-defaulted parameters are stored as floats.
    pub fn update_parameters(&mut self, overrides: &Parameters) -> Result<()> {
        if let Some(unknown) = overrides
            .keys()
            .find(|key| !self.expected_parameters.contains(key))
        {
            return Err(DataStepsError::UnexpectedParameter {
                step: self.name().to_string(),
                parameter: unknown.clone(),
                expected: self.expected_parameters.clone(),
            });
        }

        let overrides: Parameters = overrides
            .iter()
            .map(|(name, value)| (name.clone(), self.coerce(name, value)))
            .collect();
        self.parameters.merge(&overrides);
        Ok(())
    }

    /// Integers given for a parameter whose default is a float become floats.
    fn coerce(&self, name: &str, value: &Value) -> Value {
        let float_default = self
            .function
            .parameters()
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.default.as_ref())
            .is_some_and(Value::is_f64);

        match value {
            Value::Number(n) if float_default && !n.is_f64() => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map_or_else(|| value.clone(), Value::Number),
            _ => value.clone(),
        }
    }

    /// Apply the step to a dataset.
    ///
    /// Returns the primary result and, if the step is flagged as having one,
    /// the secondary result produced by the callable.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::MissingParameter`] if an expected parameter
    /// has no value, or [`DataStepsError::StepFailed`] wrapping the callable's
    /// own error.
    pub fn apply(&self, data: D) -> Result<(D, Option<Value>)> {
        if let Some(missing) = self
            .expected_parameters
            .iter()
            .find(|name| !self.parameters.contains_key(name))
        {
            return Err(DataStepsError::MissingParameter {
                step: self.name().to_string(),
                parameter: missing.clone(),
            });
        }

        let output = self
            .function
            .call(data, &self.parameters)
            .map_err(|source| DataStepsError::StepFailed {
                step: self.name().to_string(),
                source,
            })?;

        if self.has_secondary_result {
            Ok((output.data, output.secondary))
        } else {
            Ok((output.data, None))
        }
    }
}

impl<D> Clone for Step<D> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            function: self.function.clone(),
            parameters: self.parameters.clone(),
            expected_parameters: self.expected_parameters.clone(),
            has_secondary_result: self.has_secondary_result,
        }
    }
}

impl<D> fmt::Debug for Step<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name())
            .field("priority", &self.priority)
            .field("parameters", &self.parameters)
            .field("has_secondary_result", &self.has_secondary_result)
            .finish()
    }
}
