use crate::config::ExportConfig;
use crate::error::{DataStepsError, Result};
use crate::registry::StepRegistry;
use crate::step::{Step, StepOptions, StepSource};
use serde_json::Value;

/// Explicit name, or the registrar of the first step in application order.
pub(super) fn resolve_name<D>(registry: &StepRegistry<D>, explicit: Option<&str>) -> Result<String> {
    match explicit {
        Some(name) => Ok(name.to_string()),
        None => inferred_name(registry),
    }
}

fn inferred_name<D>(registry: &StepRegistry<D>) -> Result<String> {
    let first = registry
        .ordered()
        .into_iter()
        .next()
        .ok_or_else(|| DataStepsError::NameResolution("no steps registered".to_string()))?;

    let source = first.source().ok_or_else(|| {
        DataStepsError::NameResolution(format!("step '{}' has no source text", first.name()))
    })?;

    source.registrar().map(str::to_string).ok_or_else(|| {
        DataStepsError::NameResolution(format!(
            "first line of step '{}' is not a `#[<name>::step]` attribute",
            first.name()
        ))
    })
}

fn source_of<D>(step: &Step<D>) -> Result<&StepSource> {
    step.source()
        .ok_or_else(|| DataStepsError::MissingSource(step.name().to_string()))
}

pub(super) fn engine_bound<D>(
    registry: &StepRegistry<D>,
    name: &str,
    config: &ExportConfig,
) -> Result<String> {
    // Only steps sharing the first step's registrar are renamed; the others
    // keep theirs.
    let inferred = inferred_name(registry).ok();

    let declarations = registry
        .declared()
        .map(|step| {
            let source = source_of(step)?;
            let registrar = match source.registrar() {
                Some(own) if inferred.as_deref() != Some(own) => own,
                _ => name,
            };
            let options = StepOptions::new()
                .priority(step.priority())
                .has_secondary_result(step.has_secondary_result());
            Ok(source.text_with_registration(registrar, &options))
        })
        .collect::<Result<Vec<_>>>()?;

    let overrides: Vec<String> = registry
        .declared()
        .filter(|step| !step.parameters().is_empty())
        .map(|step| {
            format!(
                "{name}.update_step_parameters({:?}, json!({}))?;\n",
                step.name(),
                step.parameters()
            )
        })
        .collect();

    let mut text = format!("let mut {name} = {}::new();\n\n", config.engine_type);
    text.push_str(&declarations.join("\n"));
    if !overrides.is_empty() {
        text.push('\n');
        text.push_str(&overrides.concat());
    }
    Ok(text)
}

pub(super) fn standalone<D>(
    registry: &StepRegistry<D>,
    name: &str,
    config: &ExportConfig,
) -> Result<String> {
    let definitions = registry
        .declared()
        .map(|step| source_of(step).map(StepSource::definition))
        .collect::<Result<Vec<_>>>()?;

    let indent = config.indent();
    let input = &config.input_name;
    let dataset = &config.dataset_type;

    let mut text = definitions.join("\n");
    text.push('\n');
    text.push_str(&format!(
        "pub fn {name}({input}: {dataset}) -> {}<{dataset}> {{\n",
        config.result_type
    ));
    text.push_str(&format!("{indent}let data = {input};\n"));

    for step in registry.ordered() {
        let call = format!("{}(data{})?", step.name(), call_arguments(step)?);
        if step.has_secondary_result() {
            text.push_str(&format!("{indent}let (data, _) = {call};\n"));
        } else {
            text.push_str(&format!("{indent}let data = {call};\n"));
        }
    }

    text.push_str(&format!("{indent}Ok(data)\n}}\n"));
    Ok(text)
}

/// Current parameter values in declared order, each prefixed with `, `.
fn call_arguments<D>(step: &Step<D>) -> Result<String> {
    step.expected_parameters()
        .iter()
        .map(|parameter| {
            step.parameters()
                .get(parameter)
                .map(|value| format!(", {}", rust_literal(value)))
                .ok_or_else(|| DataStepsError::MissingParameter {
                    step: step.name().to_string(),
                    parameter: parameter.clone(),
                })
        })
        .collect()
}

/// Render a JSON value as a Rust expression.
///
/// `null` becomes `None`, arrays become slices and objects stay JSON through
/// `serde_json::json!`.
pub fn rust_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(rust_literal).collect();
            format!("&[{}]", items.join(", "))
        }
        Value::Object(_) => format!("serde_json::json!({value})"),
    }
}
