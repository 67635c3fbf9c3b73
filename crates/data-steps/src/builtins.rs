//! Built-in DataFrame steps.
//!
//! Each step carries its own definition text, so pipelines assembled from
//! built-ins can be exported in both forms. The definition text is the
//! standalone equivalent of the registered callable.

use crate::error::Result;
use crate::library::StepLibrary;
use crate::step::{Parameters, StepFunction, StepOutput};
use polars::prelude::*;
use serde_json::json;

const DROP_NULLS: &str = r#"
#[pipeline::step]
pub fn drop_nulls(data: DataFrame, subset: &[&str]) -> anyhow::Result<DataFrame> {
    let frame = data.lazy();
    let frame = if subset.is_empty() {
        frame.drop_nulls(None)
    } else {
        subset.iter().fold(frame, |frame, c| frame.filter(col(*c).is_not_null()))
    };
    Ok(frame.collect()?)
}
"#;

const DROP_DUPLICATES: &str = r#"
#[pipeline::step(has_secondary_result = true)]
pub fn drop_duplicates(data: DataFrame) -> anyhow::Result<(DataFrame, usize)> {
    let before = data.height();
    let deduped = data.lazy().unique_stable(None, UniqueKeepStrategy::First).collect()?;
    let removed = before - deduped.height();
    Ok((deduped, removed))
}
"#;

const FILL_NULL: &str = r#"
#[pipeline::step]
pub fn fill_null(data: DataFrame, column: &str, value: f64) -> anyhow::Result<DataFrame> {
    Ok(data.lazy().with_column(col(column).fill_null(lit(value))).collect()?)
}
"#;

const SELECT_COLUMNS: &str = r#"
#[pipeline::step]
pub fn select_columns(data: DataFrame, columns: &[&str]) -> anyhow::Result<DataFrame> {
    Ok(data.select(columns.iter().copied())?)
}
"#;

const SORT_BY: &str = r#"
#[pipeline::step]
pub fn sort_by(data: DataFrame, column: &str, descending: bool) -> anyhow::Result<DataFrame> {
    let options = SortMultipleOptions::default().with_order_descending(descending);
    Ok(data.lazy().sort_by_exprs(vec![col(column)], options).collect()?)
}
"#;

const RENAME_COLUMN: &str = r#"
#[pipeline::step]
pub fn rename_column(mut data: DataFrame, from: &str, to: &str) -> anyhow::Result<DataFrame> {
    data.rename(from, to.into())?;
    Ok(data)
}
"#;

const ROW_COUNT: &str = r#"
#[pipeline::step(has_secondary_result = true)]
pub fn row_count(data: DataFrame) -> anyhow::Result<(DataFrame, usize)> {
    let height = data.height();
    Ok((data, height))
}
"#;

/// Drop rows with nulls in `subset`, or in any column when `subset` is empty.
pub fn drop_nulls() -> Result<StepFunction<DataFrame>> {
    let function = StepFunction::from_source(DROP_NULLS, |data: DataFrame, params: &Parameters| {
        let subset: Vec<String> = params.optional("subset")?.unwrap_or_default();
        let frame = data.lazy();
        let frame = if subset.is_empty() {
            frame.drop_nulls(None)
        } else {
            subset
                .iter()
                .fold(frame, |frame, c| frame.filter(col(c.as_str()).is_not_null()))
        };
        Ok(frame.collect()?.into())
    })?;
    Ok(function.param_default("subset", json!([])))
}

/// Drop duplicate rows, keeping the first. Secondary result: rows removed.
pub fn drop_duplicates() -> Result<StepFunction<DataFrame>> {
    StepFunction::from_source(DROP_DUPLICATES, |data: DataFrame, _: &Parameters| {
        let before = data.height();
        let deduped = data
            .lazy()
            .unique_stable(None, UniqueKeepStrategy::First)
            .collect()?;
        let removed = before - deduped.height();
        Ok(StepOutput::with_secondary(deduped, removed))
    })
}

/// Replace nulls in `column` with `value`.
pub fn fill_null() -> Result<StepFunction<DataFrame>> {
    let function = StepFunction::from_source(FILL_NULL, |data: DataFrame, params: &Parameters| {
        let column: String = params.value("column")?;
        let value: f64 = params.value("value")?;
        let filled = data
            .lazy()
            .with_column(col(column.as_str()).fill_null(lit(value)))
            .collect()?;
        Ok(filled.into())
    })?;
    Ok(function.param_default("value", 0.0))
}

/// Keep only `columns`, in that order.
pub fn select_columns() -> Result<StepFunction<DataFrame>> {
    StepFunction::from_source(SELECT_COLUMNS, |data: DataFrame, params: &Parameters| {
        let columns: Vec<String> = params.value("columns")?;
        Ok(data.select(columns)?.into())
    })
}

/// Sort rows by `column`.
pub fn sort_by() -> Result<StepFunction<DataFrame>> {
    let function = StepFunction::from_source(SORT_BY, |data: DataFrame, params: &Parameters| {
        let column: String = params.value("column")?;
        let descending: bool = params.value("descending")?;
        let options = SortMultipleOptions::default().with_order_descending(descending);
        let sorted = data
            .lazy()
            .sort_by_exprs(vec![col(column.as_str())], options)
            .collect()?;
        Ok(sorted.into())
    })?;
    Ok(function.param_default("descending", false))
}

/// Rename column `from` to `to`.
pub fn rename_column() -> Result<StepFunction<DataFrame>> {
    StepFunction::from_source(RENAME_COLUMN, |mut data: DataFrame, params: &Parameters| {
        let from: String = params.value("from")?;
        let to: String = params.value("to")?;
        data.rename(&from, to.as_str().into())?;
        Ok(data.into())
    })
}

/// Pass the frame through. Secondary result: row count.
pub fn row_count() -> Result<StepFunction<DataFrame>> {
    StepFunction::from_source(ROW_COUNT, |data: DataFrame, _: &Parameters| {
        let height = data.height();
        Ok(StepOutput::with_secondary(data, height))
    })
}

/// Every built-in step.
pub fn library() -> Result<StepLibrary<DataFrame>> {
    Ok([
        drop_nulls()?,
        drop_duplicates()?,
        fill_null()?,
        select_columns()?,
        sort_by()?,
        rename_column()?,
        row_count()?,
    ]
    .into_iter()
    .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PipelineEngine;
    use crate::step::Step;

    fn frame() -> DataFrame {
        df! {
            "id" => &[1, 2, 2, 3],
            "score" => &[Some(1.0), None, None, Some(3.0)],
            "name" => &["a", "b", "b", "c"],
        }
        .unwrap()
    }

    fn step(function: StepFunction<DataFrame>) -> Step<DataFrame> {
        let options = function.declared_options().unwrap();
        Step::new(function, options.priority, options.has_secondary_result).unwrap()
    }

    #[test]
    fn test_library_contents() {
        let library = library().unwrap();
        assert_eq!(
            library.names().collect::<Vec<_>>(),
            [
                "drop_nulls",
                "drop_duplicates",
                "fill_null",
                "select_columns",
                "sort_by",
                "rename_column",
                "row_count"
            ]
        );
        assert!(library.iter().all(|f| f.source().is_some()));
    }

    #[test]
    fn test_source_parameters_match_declared() {
        let sort = sort_by().unwrap();
        let names: Vec<&str> = sort.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["data", "column", "descending"]);
    }

    #[test]
    fn test_drop_nulls_all_columns() {
        let (df, _) = step(drop_nulls().unwrap()).apply(frame()).unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_drop_nulls_subset() {
        let mut s = step(drop_nulls().unwrap());
        s.update_parameters(&[("subset", json!(["name"]))].into_iter().collect())
            .unwrap();
        let (df, _) = s.apply(frame()).unwrap();
        assert_eq!(df.height(), 4);
    }

    #[test]
    fn test_drop_duplicates_reports_removed() {
        let s = step(drop_duplicates().unwrap());
        assert!(s.has_secondary_result());
        let (df, removed) = s.apply(frame()).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(removed, Some(json!(1)));
    }

    #[test]
    fn test_fill_null() {
        let mut s = step(fill_null().unwrap());
        s.update_parameters(&[("column", json!("score")), ("value", json!(-1.0))].into_iter().collect())
            .unwrap();
        let (df, _) = s.apply(frame()).unwrap();
        let score = df.column("score").unwrap();
        assert_eq!(score.null_count(), 0);
        assert_eq!(score.f64().unwrap().get(1), Some(-1.0));
    }

    #[test]
    fn test_fill_null_integer_value_exports_float_literal() {
        let mut engine = PipelineEngine::with_original(frame());
        engine.register_step(fill_null().unwrap()).unwrap();
        engine
            .update_step_parameters("fill_null", json!({"column": "score", "value": 1}))
            .unwrap();

        let df = engine.transformed().unwrap();
        assert_eq!(df.column("score").unwrap().f64().unwrap().get(1), Some(1.0));

        let text = engine
            .export(Some("fill"), crate::export::ExportForm::Standalone)
            .render()
            .unwrap();
        assert!(text.contains("    let data = fill_null(data, \"score\", 1.0)?;\n"));
    }

    #[test]
    fn test_fill_null_requires_column() {
        let err = step(fill_null().unwrap()).apply(frame()).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_PARAMETER");
    }

    #[test]
    fn test_select_sort_rename() {
        let mut engine = PipelineEngine::with_original(frame());
        for function in [select_columns().unwrap(), sort_by().unwrap(), rename_column().unwrap()] {
            let options = function.declared_options().unwrap();
            engine.register_step_with(function, options).unwrap();
        }
        engine
            .update_step_parameters("select_columns", json!({"columns": ["name", "id"]}))
            .unwrap();
        engine
            .update_step_parameters("sort_by", json!({"column": "id", "descending": true}))
            .unwrap();
        engine
            .update_step_parameters("rename_column", json!({"from": "name", "to": "label"}))
            .unwrap();

        let df = engine.transformed().unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["label", "id"]);
        assert_eq!(df.column("id").unwrap().i32().unwrap().get(0), Some(3));
    }

    #[test]
    fn test_row_count() {
        let (df, count) = step(row_count().unwrap()).apply(frame()).unwrap();
        assert_eq!(df.height(), 4);
        assert_eq!(count, Some(json!(4)));
    }
}
