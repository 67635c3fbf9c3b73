//! Structured definition text of a step.
//!
//! A step's source is the text an author wrote for it, for example:
//!
//! ```text
//! #[pipeline::step(priority = 1)]
//! fn inc(data: i64, n: i64) -> anyhow::Result<i64> {
//!     Ok(data + n)
//! }
//! ```
//!
//! The text is split into *registration* lines (everything before the first
//! line that starts a function definition) and the *definition* itself. The
//! first registration line names the engine the step was registered against
//! (`pipeline` above) and may carry registration options.

use super::StepOptions;
use crate::error::{DataStepsError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static DEFINITION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"#,
    )
    .expect("Invalid regex: function definition")
});

static REGISTRAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*#\[\s*(?P<name>[A-Za-z_][A-Za-z0-9_]*)::").expect("Invalid regex: registrar")
});

static REGISTRATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*#\[\s*[A-Za-z_][A-Za-z0-9_]*::step\s*(?:\((?P<args>.*)\))?\s*\]\s*$")
        .expect("Invalid regex: registration attribute")
});

/// Definition text of a step, split into registration and definition lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSource {
    lines: Vec<String>,
    definition_start: usize,
}

impl StepSource {
    /// Parse definition text.
    ///
    /// Leading and trailing blank lines are dropped and the indentation of
    /// the first line is removed from every line, so sources can be written
    /// as indented raw strings.
    ///
    /// # Errors
    ///
    /// Returns [`DataStepsError::InvalidSource`] if no line starts a function
    /// definition.
    pub fn parse(text: &str) -> Result<Self> {
        let lines = dedent(text);
        let definition_start = lines
            .iter()
            .position(|line| DEFINITION_START.is_match(line))
            .ok_or_else(|| {
                DataStepsError::InvalidSource("no function definition found".to_string())
            })?;

        Ok(Self {
            lines,
            definition_start,
        })
    }

    /// The full dedented text, including registration lines.
    pub fn text(&self) -> String {
        join_lines(&self.lines)
    }

    /// Lines preceding the function definition (attributes, doc comments).
    pub fn registration_lines(&self) -> &[String] {
        &self.lines[..self.definition_start]
    }

    /// The function definition with all registration lines stripped.
    pub fn definition(&self) -> String {
        join_lines(&self.lines[self.definition_start..])
    }

    /// Identifier the step was registered against, read from the first line.
    ///
    /// For `#[pipeline::step(priority = 1)]` this is `pipeline`.
    pub fn registrar(&self) -> Option<&str> {
        let first = self.lines.first()?;
        REGISTRAR
            .captures(first)
            .and_then(|caps| caps.name("name"))
            .map(|m| m.as_str())
    }

    /// Full text with the first registration line declaring `registrar` and
    /// `options`.
    ///
    /// An attribute that already declares `options` keeps its text and only
    /// has its registrar renamed. A disagreeing attribute is rendered again
    /// from `options`, and a source without one gets one inserted. Later lines
    /// are left alone.
    pub fn text_with_registration(&self, registrar: &str, options: &StepOptions) -> String {
        let mut lines = self.lines.clone();
        let attribute = self
            .registration_lines()
            .first()
            .filter(|line| REGISTRATION.is_match(line));

        match attribute {
            Some(first) => {
                let declared = self.registration_options().ok().flatten();
                lines[0] = if declared.as_ref() == Some(options) {
                    rename_registrar(first, registrar)
                } else {
                    render_attribute(registrar, options)
                };
            }
            None => lines.insert(0, render_attribute(registrar, options)),
        }

        join_lines(&lines)
    }

    /// Name of the defined function.
    pub fn function_name(&self) -> Option<&str> {
        let line = self.lines.get(self.definition_start)?;
        DEFINITION_START
            .captures(line)
            .and_then(|caps| caps.name("name"))
            .map(|m| m.as_str())
    }

    /// Parameter names declared in the function signature, in order.
    pub fn parameter_names(&self) -> Vec<String> {
        let definition = self.definition();
        let Some(name_end) = DEFINITION_START
            .captures(&definition)
            .and_then(|caps| caps.name("name"))
            .map(|m| m.end())
        else {
            return Vec::new();
        };
        let after_name = &definition[name_end..];

        // Skip generics, then read the parenthesised parameter list.
        let mut depth = 0usize;
        let mut open = None;
        for (i, c) in after_name.char_indices() {
            match c {
                '<' => depth += 1,
                '>' => depth = depth.saturating_sub(1),
                '(' if depth == 0 => {
                    open = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let Some(open) = open else {
            return Vec::new();
        };

        split_top_level(&after_name[open + 1..])
            .into_iter()
            .filter_map(|param| {
                let pattern = param.split(':').next()?.trim();
                let pattern = pattern.strip_prefix("mut ").unwrap_or(pattern).trim();
                (!pattern.is_empty()).then(|| pattern.to_string())
            })
            .collect()
    }

    /// Registration options written in the first registration line.
    ///
    /// Returns `Ok(None)` when the first line is not a `#[<ident>::step]`
    /// attribute. Options that are not written keep their defaults.
    pub fn registration_options(&self) -> Result<Option<StepOptions>> {
        let Some(first) = self.registration_lines().first() else {
            return Ok(None);
        };
        let Some(caps) = REGISTRATION.captures(first) else {
            return Ok(None);
        };

        let mut options = StepOptions::default();
        let Some(args) = caps.name("args") else {
            return Ok(Some(options));
        };

        for arg in args.as_str().split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                DataStepsError::InvalidSource(format!("expected `key = value`, found `{arg}`"))
            })?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "priority" => {
                    let priority = value.parse::<i64>().map_err(|e| {
                        DataStepsError::InvalidSource(format!("invalid priority `{value}`: {e}"))
                    })?;
                    options = options.priority(priority);
                }
                "active" => options = options.active(parse_bool(key, value)?),
                "has_secondary_result" => {
                    options = options.has_secondary_result(parse_bool(key, value)?);
                }
                other => debug!("Ignoring unknown registration option '{}'", other),
            }
        }

        Ok(Some(options))
    }
}

/// Replace the identifier matched by [`REGISTRAR`] in `line`.
fn rename_registrar(line: &str, to: &str) -> String {
    match REGISTRAR.captures(line).and_then(|caps| caps.name("name")) {
        Some(m) => format!("{}{}{}", &line[..m.start()], to, &line[m.end()..]),
        None => line.to_string(),
    }
}

fn render_attribute(registrar: &str, options: &StepOptions) -> String {
    let mut args = format!("priority = {}", options.priority);
    if options.has_secondary_result {
        args.push_str(", has_secondary_result = true");
    }
    if !options.active {
        args.push_str(", active = false");
    }
    format!("#[{registrar}::step({args})]")
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .map_err(|_| DataStepsError::InvalidSource(format!("invalid value `{value}` for `{key}`")))
}

/// Split a parameter list at top-level commas, stopping at the closing paren.
fn split_top_level(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in list.chars() {
        match c {
            '(' | '[' | '<' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth == 0 => break,
            ')' | ']' | '>' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn dedent(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    let lines = &lines[start..end];

    let indent = lines
        .first()
        .map(|l| l.len() - l.trim_start_matches(' ').len())
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| {
            let removable = line.len() - line.trim_start_matches(' ').len();
            line[removable.min(indent)..].trim_end().to_string()
        })
        .collect()
}

fn join_lines(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
