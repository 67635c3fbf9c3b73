//! Integration tests for the step pipeline.
//!
//! These tests verify end-to-end behavior of registration, execution, export
//! and restore using polars DataFrames.

use data_steps::{
    DataStepsError, ExportForm, Parameters, PipelineEngine, PipelineManifest, StepFunction,
    StepLibrary, StepOptions, StepOutput, builtins,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn raw_frame() -> DataFrame {
    df! {
        "Col1" => &[1i64, 2, 3, 4, 5],
        "Col2" => &["A", "B", "C", "D", "E"],
        "Col3" => &[0.01, 0.1, 1.0, 10.0, 100.0],
    }
    .unwrap()
}

const INC_COL1: &str = r#"
    #[data::step(priority = 1)]
    fn inc_col1(frame: DataFrame, a: i64) -> anyhow::Result<DataFrame> {
        Ok(frame.lazy().with_column(col("Col1") + lit(a)).collect()?)
    }
"#;

const DOUBLE_COL1: &str = r#"
    #[data::step(priority = 2)]
    fn double_col1(frame: DataFrame) -> anyhow::Result<DataFrame> {
        Ok(frame.lazy().with_column(col("Col1") * lit(2i64)).collect()?)
    }
"#;

fn inc_col1() -> StepFunction<DataFrame> {
    StepFunction::from_source(INC_COL1, |frame: DataFrame, params: &Parameters| {
        let a: i64 = params.value("a")?;
        Ok(frame
            .lazy()
            .with_column(col("Col1") + lit(a))
            .collect()?
            .into())
    })
    .unwrap()
    .param_default("a", 10)
}

fn double_col1() -> StepFunction<DataFrame> {
    StepFunction::from_source(DOUBLE_COL1, |frame: DataFrame, _: &Parameters| {
        Ok(frame
            .lazy()
            .with_column(col("Col1") * lit(2i64))
            .collect()?
            .into())
    })
    .unwrap()
}

fn col1(df: &DataFrame) -> Vec<Option<i64>> {
    df.column("Col1").unwrap().i64().unwrap().into_iter().collect()
}

/// Double then increment, declared out of application order.
fn round_trip_pipeline() -> PipelineEngine {
    let mut data = PipelineEngine::with_original(raw_frame());
    data.register_step_with(double_col1(), StepOptions::new().priority(2))
        .unwrap();
    data.register_step_with(inc_col1(), StepOptions::new().priority(1))
        .unwrap();
    data.update_step_parameters("inc_col1", json!({"a": 20}))
        .unwrap();
    data
}

// ============================================================================
// Engine Behaviour
// ============================================================================

#[test]
fn test_original_and_transformed() {
    let mut data = PipelineEngine::with_original(raw_frame());
    assert!(data.original().unwrap().equals(&raw_frame()));
    assert!(data.transformed().unwrap().equals(&raw_frame()));

    let inc = data.register_step(inc_col1()).unwrap();

    assert!(data.original().unwrap().equals(&raw_frame()));
    assert_eq!(data.steps().len(), 1);
    let direct = inc.call(raw_frame(), &[("a", json!(10))].into_iter().collect()).unwrap();
    assert!(direct.data.equals(&data.transformed().unwrap()));
    assert_eq!(col1(&data.transformed().unwrap()), [Some(11), Some(12), Some(13), Some(14), Some(15)]);
}

#[test]
fn test_set_original() {
    let mut data: PipelineEngine = PipelineEngine::new();
    assert!(matches!(data.original(), Err(DataStepsError::OriginalNotSet)));
    data.set_original(raw_frame());
    assert!(data.original().unwrap().equals(&raw_frame()));
}

#[test]
fn test_secondary_results() {
    let mut data = PipelineEngine::with_original(raw_frame());
    assert!(data.secondary_results().unwrap().is_empty());

    let sum_col1 = StepFunction::new("sum_col1", |frame: DataFrame, _: &Parameters| {
        let sum = frame.column("Col1")?.as_materialized_series().sum::<i64>()?;
        Ok(StepOutput::with_secondary(frame, sum))
    })
    .param("frame");
    data.register_step_with(sum_col1, StepOptions::new().has_secondary_result(true))
        .unwrap();

    let results = data.secondary_results().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["sum_col1"], json!(15));
}

#[test]
fn test_redefined_and_removed_step() {
    let mut data = PipelineEngine::with_original(raw_frame());
    data.register_step(inc_col1()).unwrap();
    data.register_step(inc_col1()).unwrap();
    assert_eq!(data.steps().len(), 1);

    // Deactivating an absent name changes nothing.
    data.register_step_with(double_col1(), StepOptions::new().active(false))
        .unwrap();
    assert_eq!(data.steps().len(), 1);

    data.register_step(double_col1()).unwrap();
    assert_eq!(data.steps().len(), 2);

    data.register_step_with(inc_col1(), StepOptions::new().active(false))
        .unwrap();
    assert_eq!(data.steps().len(), 1);
    assert_eq!(data.steps().names(), ["double_col1"]);
}

#[test]
fn test_partial_application() {
    let mut data = PipelineEngine::with_original(raw_frame());
    let add_col = |name: &'static str| {
        StepFunction::new(name, move |frame: DataFrame, _: &Parameters| {
            Ok(frame
                .lazy()
                .with_column(lit("constant").alias(name))
                .collect()?
                .into())
        })
        .param("frame")
    };
    data.register_step(add_col("Col4")).unwrap();
    data.register_step_with(add_col("Col5"), StepOptions::new().priority(10))
        .unwrap();

    let has = |df: &DataFrame, c: &str| df.column(c).is_ok();
    assert!(data.partial_transform(-1).unwrap().equals(&raw_frame()));
    assert!(has(&data.partial_transform(0).unwrap(), "Col4"));
    assert!(!has(&data.partial_transform(0).unwrap(), "Col5"));
    assert!(has(&data.partial_transform(1).unwrap(), "Col5"));
    assert!(data.partial_transform(-2).is_err());
}

#[test]
fn test_step_with_parameters() {
    let mut data = PipelineEngine::with_original(raw_frame());
    data.register_step(inc_col1()).unwrap();
    assert_eq!(col1(&data.transformed().unwrap())[0], Some(11));

    data.update_step_parameters("inc_col1", json!({"a": 20}))
        .unwrap();
    assert_eq!(col1(&data.transformed().unwrap())[0], Some(21));
    assert_eq!(
        data.steps().rows()[0].parameters.get("a"),
        Some(&json!(20))
    );
}

#[test]
fn test_failing_step_propagates_own_error() {
    let mut data = PipelineEngine::with_original(raw_frame());
    data.register_step(
        StepFunction::new("missing_column", |frame: DataFrame, _: &Parameters| {
            Ok(frame.select(["NoSuchColumn"])?.into())
        })
        .param("frame"),
    )
    .unwrap();

    let err = data.transformed().unwrap_err();
    assert!(err.is_step_failure());
    let DataStepsError::StepFailed { step, source } = err else {
        panic!("expected a step failure");
    };
    assert_eq!(step, "missing_column");
    assert!(source.downcast_ref::<PolarsError>().is_some());
}

// ============================================================================
// Export and Restore
// ============================================================================

#[test]
fn test_export_round_trip_direct_result() {
    let data = round_trip_pipeline();
    let expected: Vec<Option<i64>> = [1, 2, 3, 4, 5].iter().map(|v| Some((v + 20) * 2)).collect();
    assert_eq!(col1(&data.transformed().unwrap()), expected);
}

#[test]
fn test_export_standalone_round_trip() {
    let data = round_trip_pipeline();
    let text = data
        .export(Some("my_transformation"), ExportForm::Standalone)
        .render()
        .unwrap();

    let expected = r#"fn double_col1(frame: DataFrame) -> anyhow::Result<DataFrame> {
    Ok(frame.lazy().with_column(col("Col1") * lit(2i64)).collect()?)
}

fn inc_col1(frame: DataFrame, a: i64) -> anyhow::Result<DataFrame> {
    Ok(frame.lazy().with_column(col("Col1") + lit(a)).collect()?)
}

pub fn my_transformation(input_data: DataFrame) -> anyhow::Result<DataFrame> {
    let data = input_data;
    let data = inc_col1(data, 20)?;
    let data = double_col1(data)?;
    Ok(data)
}
"#;
    assert_eq!(text, expected);
}

#[test]
fn test_export_engine_bound_restore_round_trip() {
    let data = round_trip_pipeline();
    let text = data
        .export(Some("reimport"), ExportForm::EngineBound)
        .render()
        .unwrap();
    assert!(text.starts_with("let mut reimport = PipelineEngine::new();\n\n#[reimport::step(priority = 2)]"));
    assert!(text.ends_with("reimport.update_step_parameters(\"inc_col1\", json!({\"a\":20}))?;\n"));

    let library: StepLibrary<DataFrame> = [inc_col1(), double_col1()].into_iter().collect();
    let mut restored = PipelineEngine::restore(&text, &library).unwrap();
    restored.set_original(data.original().unwrap().clone());

    assert!(restored.transformed().unwrap().equals(&data.transformed().unwrap()));
    assert_eq!(
        restored.export(None, ExportForm::EngineBound).render().unwrap(),
        text
    );
}

#[test]
fn test_export_name_inference() {
    let data = round_trip_pipeline();
    assert_eq!(data.export(None, ExportForm::EngineBound).name().unwrap(), "data");

    let text = data.export(None, ExportForm::EngineBound).render().unwrap();
    assert!(text.starts_with("let mut data = PipelineEngine::new();"));
}

#[test]
fn test_export_reflects_later_changes() {
    let mut data = round_trip_pipeline();
    let exporter = data.export(Some("later"), ExportForm::Standalone);
    assert!(exporter.render().unwrap().contains("inc_col1(data, 20)?"));

    data.update_step_parameters("inc_col1", json!({"a": 3}))
        .unwrap();
    assert!(exporter.render().unwrap().contains("inc_col1(data, 3)?"));
}

// ============================================================================
// Manifest and Built-in Steps
// ============================================================================

fn cleanup_pipeline() -> PipelineEngine {
    let manifest = PipelineManifest::from_path(fixtures_path().join("cleanup.json")).unwrap();
    let mut engine = PipelineEngine::with_original(load_csv("scores.csv"));
    manifest
        .apply(&mut engine, &builtins::library().unwrap())
        .unwrap();
    engine
}

#[test]
fn test_manifest_pipeline_over_csv() {
    let engine = cleanup_pipeline();
    assert_eq!(
        engine.steps().names(),
        ["drop_duplicates", "fill_null", "sort_by", "row_count"]
    );

    let df = engine.transformed().unwrap();
    let ids: Vec<Option<i64>> = df.column("id").unwrap().i64().unwrap().into_iter().collect();
    assert_eq!(ids, [Some(1), Some(4), Some(3), Some(2)]);
    assert_eq!(df.column("score").unwrap().null_count(), 0);

    let secondary = engine.secondary_results().unwrap();
    let names: Vec<&str> = secondary.keys().map(String::as_str).collect();
    assert_eq!(names, ["drop_duplicates", "row_count"]);
    assert_eq!(secondary["drop_duplicates"], json!(1));
    assert_eq!(secondary["row_count"], json!(4));

    let partial = engine.partial_secondary_results(0).unwrap();
    assert_eq!(partial.len(), 1);
}

#[test]
fn test_manifest_pipeline_standalone_export() {
    let engine = cleanup_pipeline();
    let text = engine
        .export(Some("cleanup"), ExportForm::Standalone)
        .render()
        .unwrap();

    assert!(text.contains("pub fn cleanup(input_data: DataFrame) -> anyhow::Result<DataFrame> {"));
    assert!(text.contains("    let (data, _) = drop_duplicates(data)?;\n    let data = fill_null(data, \"score\", 0.0)?;\n    let data = sort_by(data, \"score\", true)?;\n    let (data, _) = row_count(data)?;\n    Ok(data)\n}\n"));
    assert!(!text.contains("#[pipeline::step"));
}

#[test]
fn test_manifest_pipeline_engine_bound_restore() {
    let engine = cleanup_pipeline();
    let text = engine.export(None, ExportForm::EngineBound).render().unwrap();
    assert!(text.starts_with("let mut pipeline = PipelineEngine::new();"));

    let mut restored = PipelineEngine::restore(&text, &builtins::library().unwrap()).unwrap();
    restored.set_original(load_csv("scores.csv"));
    assert!(restored.transformed().unwrap().equals_missing(&engine.transformed().unwrap()));
}

#[test]
fn test_manifest_priorities_survive_engine_bound_restore() {
    // Declared in the opposite order to the one they run in.
    let manifest = PipelineManifest::from_json(
        r#"{"steps": [
            {"step": "sort_by", "priority": 2, "parameters": {"column": "score", "descending": true}},
            {"step": "fill_null", "priority": 1, "parameters": {"column": "score", "value": 0}}
        ]}"#,
    )
    .unwrap();
    let library = builtins::library().unwrap();
    let mut engine = PipelineEngine::with_original(load_csv("scores.csv"));
    manifest.apply(&mut engine, &library).unwrap();

    let expected = engine.transformed().unwrap();
    let ids: Vec<Option<i64>> = expected.column("id").unwrap().i64().unwrap().into_iter().collect();
    assert_eq!(ids, [Some(1), Some(4), Some(3), Some(2), Some(2)]);

    let text = engine.export(None, ExportForm::EngineBound).render().unwrap();
    assert!(text.contains("#[pipeline::step(priority = 2)]\npub fn sort_by("));
    assert!(text.contains("#[pipeline::step(priority = 1)]\npub fn fill_null("));

    let mut restored = PipelineEngine::restore(&text, &library).unwrap();
    restored.set_original(load_csv("scores.csv"));
    assert_eq!(restored.steps(), engine.steps());
    assert!(restored.transformed().unwrap().equals_missing(&expected));
}

#[test]
fn test_manifest_unknown_step() {
    let manifest = PipelineManifest::from_json(r#"{"steps": [{"step": "explode"}]}"#).unwrap();
    let mut engine = PipelineEngine::with_original(raw_frame());
    let err = manifest
        .apply(&mut engine, &builtins::library().unwrap())
        .unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_STEP");
}
