//! Rebuild an engine from engine-bound export text.
//!
//! Text cannot be compiled at runtime, so declarations are matched by
//! function name against a [`StepLibrary`] that supplies the callables. The
//! exported source text is kept on the restored steps, so restoring and
//! exporting again gives the same text.

use crate::engine::PipelineEngine;
use crate::error::{DataStepsError, Result};
use crate::library::StepLibrary;
use crate::step::StepSource;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

static ENGINE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^let\s+mut\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?P<engine>[A-Za-z_][A-Za-z0-9_:<>, ]*)::new\(\);\s*$")
        .expect("Invalid regex: engine line")
});

static DECLARATION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#\[[A-Za-z_][A-Za-z0-9_]*::step\b").expect("Invalid regex: declaration start")
});

static OVERRIDE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\.update_step_parameters\("(?P<step>[^"]+)",\s*json!\((?P<params>.*)\)\)\?;\s*$"#,
    )
    .expect("Invalid regex: override line")
});

struct Declaration {
    line: usize,
    lines: Vec<String>,
}

impl<D> PipelineEngine<D> {
    /// Rebuild an engine from engine-bound export text.
    ///
    /// Steps are registered in declaration order with the options written in
    /// their registration attributes, then the parameter overrides are
    /// applied. The returned engine has no original dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::MalformedExport`] when the text does not
    /// follow the engine-bound layout and [`DataStepsError::UnknownStep`]
    /// when a declared function is missing from `library`.
    pub fn restore(text: &str, library: &StepLibrary<D>) -> Result<Self> {
        let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));

        let (name, engine_type) = loop {
            match lines.next() {
                Some((_, line)) if line.trim().is_empty() => continue,
                Some((number, line)) => {
                    let caps = ENGINE_LINE.captures(line).ok_or_else(|| malformed(
                        number,
                        "expected `let mut <name> = <engine>::new();`",
                    ))?;
                    break (caps["name"].to_string(), caps["engine"].to_string());
                }
                None => return Err(malformed(1, "export text is empty")),
            }
        };
        debug!("Restoring pipeline '{}' ({})", name, engine_type);

        let mut declarations: Vec<Declaration> = Vec::new();
        let mut overrides: Vec<(usize, String, Value)> = Vec::new();

        for (number, line) in lines {
            if let Some(caps) = OVERRIDE_LINE.captures(line) {
                if caps["name"] != name {
                    return Err(malformed(
                        number,
                        &format!("override targets '{}' instead of '{}'", &caps["name"], name),
                    ));
                }
                let params: Value = serde_json::from_str(&caps["params"])
                    .map_err(|e| malformed(number, &format!("invalid parameter JSON: {e}")))?;
                overrides.push((number, caps["step"].to_string(), params));
            } else if DECLARATION_START.is_match(line) {
                if !overrides.is_empty() {
                    return Err(malformed(number, "declaration after parameter overrides"));
                }
                declarations.push(Declaration {
                    line: number,
                    lines: vec![line.to_string()],
                });
            } else if let Some(current) = declarations.last_mut()
                && overrides.is_empty()
            {
                current.lines.push(line.to_string());
            } else if !line.trim().is_empty() {
                return Err(malformed(number, "unexpected line outside of a step declaration"));
            }
        }

        let mut engine = Self::new();
        for declaration in &declarations {
            let source = StepSource::parse(&declaration.lines.join("\n"))
                .map_err(|e| malformed(declaration.line, &e.to_string()))?;
            let function_name = source
                .function_name()
                .ok_or_else(|| malformed(declaration.line, "declaration has no function name"))?
                .to_string();
            let options = source
                .registration_options()
                .map_err(|e| malformed(declaration.line, &e.to_string()))?
                .unwrap_or_default();

            let function = library
                .get(&function_name)
                .ok_or_else(|| DataStepsError::UnknownStep(function_name.clone()))?
                .clone()
                .with_source(source);
            engine.register_step_with(function, options)?;
        }

        for (number, step, params) in overrides {
            engine
                .update_step_parameters(&step, params)
                .map_err(|e| e.with_context(format!("Restoring override at line {number}")))?;
        }

        info!(
            "Restored pipeline '{}' with {} steps",
            name,
            engine.len()
        );
        Ok(engine)
    }
}

fn malformed(line: usize, reason: &str) -> DataStepsError {
    DataStepsError::MalformedExport {
        line,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportForm;
    use crate::step::{Parameters, StepFunction, StepOutput};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const EXPORTED: &str = r#"let mut reimport = PipelineEngine::new();

#[reimport::step(priority = 2)]
fn double(data: i64) -> anyhow::Result<i64> {
    Ok(data * 2)
}

#[reimport::step(priority = 1)]
fn inc(data: i64, n: i64) -> anyhow::Result<i64> {
    Ok(data + n)
}

reimport.update_step_parameters("inc", json!({"n":2}))?;
"#;

    fn library() -> StepLibrary<i64> {
        let mut library = StepLibrary::new();
        library.insert(
            StepFunction::new("inc", |d: i64, p: &Parameters| {
                Ok(StepOutput::new(d + p.value::<i64>("n")?))
            })
            .param("data")
            .param_default("n", 1),
        );
        library.insert(
            StepFunction::new("double", |d: i64, _: &Parameters| Ok((d * 2).into())).param("data"),
        );
        library
    }

    #[test]
    fn test_restore_rebuilds_steps_and_overrides() {
        let mut engine = PipelineEngine::restore(EXPORTED, &library()).unwrap();
        assert_eq!(engine.steps().names(), ["inc", "double"]);
        assert_eq!(engine.steps().rows()[0].parameters.get("n"), Some(&json!(2)));

        engine.set_original(1);
        assert_eq!(engine.transformed().unwrap(), 6);
    }

    #[test]
    fn test_restore_then_export_is_identical() {
        let engine = PipelineEngine::restore(EXPORTED, &library()).unwrap();
        let text = engine
            .export(None, ExportForm::EngineBound)
            .render()
            .unwrap();
        assert_eq!(text, EXPORTED);
    }

    #[test]
    fn test_restore_unknown_step() {
        let mut library = library();
        library.remove("double");
        let err = PipelineEngine::restore(EXPORTED, &library).unwrap_err();
        assert!(matches!(err, DataStepsError::UnknownStep(ref s) if s == "double"));
    }

    #[test]
    fn test_restore_malformed_header() {
        let err = PipelineEngine::restore("let pipeline = 1;\n", &library()).unwrap_err();
        assert!(matches!(err, DataStepsError::MalformedExport { line: 1, .. }));

        let err = PipelineEngine::<i64>::restore("", &library()).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_EXPORT");
    }

    #[test]
    fn test_restore_rejects_stray_lines() {
        let text = "let mut p = PipelineEngine::new();\n\nprintln!(\"hi\");\n";
        let err = PipelineEngine::restore(text, &library()).unwrap_err();
        assert!(matches!(err, DataStepsError::MalformedExport { line: 3, .. }));
    }

    #[test]
    fn test_restore_bad_override_reports_context() {
        let text = EXPORTED.replace(r#"{"n":2}"#, r#"{"m":2}"#);
        let err = PipelineEngine::restore(&text, &library()).unwrap_err();
        assert_eq!(err.error_code(), "UNEXPECTED_PARAMETER");
        assert!(err.to_string().contains("line 13"));
    }
}
