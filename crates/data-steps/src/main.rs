//! CLI entry point: run a manifest-defined pipeline of built-in steps over a CSV file.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use data_steps::{
    ExportConfig, ExportForm, PipelineEngine, PipelineManifest, SecondaryResults, StepLibrary,
    builtins,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CLI-compatible export form
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliExportForm {
    /// Engine construction, step declarations and overrides
    Engine,
    /// Plain step functions plus one wrapper function
    Standalone,
}

impl From<CliExportForm> for ExportForm {
    fn from(cli: CliExportForm) -> Self {
        match cli {
            CliExportForm::Engine => ExportForm::EngineBound,
            CliExportForm::Standalone => ExportForm::Standalone,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Run and export step pipelines over CSV data",
    long_about = "Assemble a pipeline of built-in DataFrame steps from a JSON manifest, \
                  run it over a CSV file and export it as Rust source.\n\n\
                  EXAMPLES:\n  \
                  # List the built-in steps\n  \
                  data-steps --list-steps\n\n  \
                  # Run a pipeline and write the result\n  \
                  data-steps -i data.csv -p pipeline.json -o cleaned.csv\n\n  \
                  # Apply only the first two steps\n  \
                  data-steps -i data.csv -p pipeline.json --until 1\n\n  \
                  # Export the pipeline as standalone functions\n  \
                  data-steps -p pipeline.json --export standalone --name clean"
)]
struct Args {
    /// Path to the CSV file to transform
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to the pipeline manifest (JSON)
    #[arg(short, long)]
    pipeline: Option<PathBuf>,

    /// Apply only the first N + 1 steps (-1 applies none)
    #[arg(long, allow_negative_numbers = true)]
    until: Option<isize>,

    /// Write the transformed data to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the pipeline as Rust source in the given form
    #[arg(long, value_enum)]
    export: Option<CliExportForm>,

    /// Name used for the export (defaults to the manifest name)
    #[arg(long)]
    name: Option<String>,

    /// List the built-in steps and exit
    #[arg(long)]
    list_steps: bool,

    /// Output JSON to stdout instead of human-readable text
    ///
    /// Disables all logs.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    let library = builtins::library()?;

    if args.list_steps {
        return list_steps(&library, args.json);
    }

    let mut engine = PipelineEngine::new();
    let mut manifest_name = None;
    if let Some(path) = &args.pipeline {
        info!("Loading pipeline from: {}", path.display());
        let manifest = PipelineManifest::from_path(path)?;
        manifest.apply(&mut engine, &library)?;
        manifest_name = manifest.name;
    }

    let overview = engine.steps();
    if !args.json {
        println!("PIPELINE");
        println!("{}", "-".repeat(40));
        print!("{overview}");
        println!();
    }

    let mut report = json!({ "steps": overview });

    if let Some(input) = &args.input {
        info!("Loading dataset from: {}", input.display());
        let data = load_csv(input)?;
        info!("Dataset loaded successfully: {:?}", data.shape());
        engine.set_original(data);

        let (mut transformed, secondary) = run(&engine, args.until)?;
        info!("Transformed dataset: {:?}", transformed.shape());

        if let Some(output) = &args.output {
            write_csv(&mut transformed, output)?;
            info!("Dataset saved: {}", output.display());
        } else if !args.json {
            println!("RESULT");
            println!("{}", "-".repeat(40));
            println!("{transformed}");
            println!();
        }

        if !args.json && !secondary.is_empty() {
            println!("SECONDARY RESULTS");
            println!("{}", "-".repeat(40));
            for (step, value) in &secondary {
                println!("  {step}: {value}");
            }
            println!();
        }

        report["shape"] = json!([transformed.height(), transformed.width()]);
        report["secondary_results"] = serde_json::to_value(&secondary)?;
    } else if args.output.is_some() || args.until.is_some() {
        return Err(anyhow!("--output and --until require --input"));
    }

    if let Some(form) = args.export {
        let text = export(&engine, args.name.or(manifest_name), form.into())?;
        if args.json {
            report["export"] = json!(text);
        } else {
            println!("EXPORT");
            println!("{}", "-".repeat(40));
            print!("{text}");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

fn run(engine: &PipelineEngine, until: Option<isize>) -> Result<(DataFrame, SecondaryResults)> {
    let result = match until {
        Some(n) => {
            debug!("Applying steps up to index {}", n);
            engine.execute_partial(n)?
        }
        None => engine.execute()?,
    };
    Ok(result)
}

/// Render the export, falling back to the configured default name when none
/// is given and none can be inferred.
fn export(engine: &PipelineEngine, name: Option<String>, form: ExportForm) -> Result<String> {
    let config = ExportConfig::default();
    let name = match name {
        Some(name) => name,
        None => engine
            .export(None, form)
            .name()
            .unwrap_or_else(|e| {
                debug!("{}; using '{}'", e, config.default_name);
                config.default_name.clone()
            }),
    };

    let text = engine
        .export_with(Some(&name), form, config)?
        .render()
        .context("Failed to export pipeline")?;
    Ok(text)
}

/// Print the built-in steps.
///
/// Uses `println!` because the listing is the command's output.
fn list_steps(library: &StepLibrary<DataFrame>, json_output: bool) -> Result<()> {
    let mut entries = Vec::new();
    for function in library.iter() {
        let options = function.declared_options()?;
        entries.push(json!({
            "step": function.name(),
            "parameters": function.parameters().iter().skip(1).collect::<Vec<_>>(),
            "priority": options.priority,
            "has_secondary_result": options.has_secondary_result,
        }));
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("BUILT-IN STEPS");
    println!("{}", "-".repeat(40));
    for function in library.iter() {
        let params: Vec<String> = function
            .parameters()
            .iter()
            .skip(1)
            .map(|p| match &p.default {
                Some(default) => format!("{}={}", p.name, default),
                None => p.name.clone(),
            })
            .collect();
        println!("  {:<18} ({})", function.name(), params.join(", "));
    }
    Ok(())
}

fn load_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed to read CSV: {}", path.display()))?;
    Ok(df)
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}
