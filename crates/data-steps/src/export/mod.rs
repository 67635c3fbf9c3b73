//! Export of an assembled pipeline into freestanding text.
//!
//! Two forms are supported:
//!
//! - [`ExportForm::EngineBound`]: text that rebuilds an equivalent engine,
//!   made of the engine construction, every step declaration with a
//!   registration attribute declaring the options it runs with, and the
//!   parameter overrides.
//! - [`ExportForm::Standalone`]: every step definition without registration
//!   attributes, followed by one wrapper function chaining the steps in
//!   application order.
//!
//! An [`Exporter`] shares the engine's registry and renders on demand, so the
//! text always reflects the registry at render time.

mod render;
mod restore;

pub use render::rust_literal;

use crate::config::ExportConfig;
use crate::engine::SharedRegistry;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Which text form an [`Exporter`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportForm {
    /// Rebuilds an engine with the same steps and overrides.
    #[default]
    EngineBound,
    /// Plain functions plus a wrapper, no engine required.
    Standalone,
}

impl FromStr for ExportForm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "engine" | "engine_bound" | "engine-bound" => Ok(Self::EngineBound),
            "standalone" => Ok(Self::Standalone),
            other => Err(format!(
                "unknown export form '{other}' (expected 'engine' or 'standalone')"
            )),
        }
    }
}

impl fmt::Display for ExportForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineBound => write!(f, "engine"),
            Self::Standalone => write!(f, "standalone"),
        }
    }
}

/// Renders a pipeline's registry into text.
pub struct Exporter<D> {
    registry: SharedRegistry<D>,
    name: Option<String>,
    form: ExportForm,
    config: ExportConfig,
}

impl<D> Exporter<D> {
    pub(crate) fn new(
        registry: SharedRegistry<D>,
        name: Option<String>,
        form: ExportForm,
        config: ExportConfig,
    ) -> Self {
        Self {
            registry,
            name,
            form,
            config,
        }
    }

    pub fn form(&self) -> ExportForm {
        self.form
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// The exported name: the explicit one, or the identifier the first step
    /// in application order was registered against.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::NameResolution`](crate::DataStepsError::NameResolution)
    /// when no explicit name was given and none can be inferred.
    pub fn name(&self) -> Result<String> {
        render::resolve_name(&self.registry.read(), self.name.as_deref())
    }

    /// Render the export text from the current registry state.
    pub fn render(&self) -> Result<String> {
        let registry = self.registry.read();
        let name = render::resolve_name(&registry, self.name.as_deref())?;

        let text = match self.form {
            ExportForm::EngineBound => render::engine_bound(&registry, &name, &self.config)?,
            ExportForm::Standalone => render::standalone(&registry, &name, &self.config)?,
        };

        info!(
            "Exported {} steps as '{}' ({} form)",
            registry.len(),
            name,
            self.form
        );
        Ok(text)
    }
}

impl<D> fmt::Debug for Exporter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("name", &self.name)
            .field("form", &self.form)
            .field("config", &self.config)
            .finish()
    }
}

static_assertions::assert_impl_all!(Exporter<polars::prelude::DataFrame>: Send, Sync);
