//! Tabular overview of a registry in application order.

use crate::step::Parameters;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of a [`StepOverview`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Zero-based position in the application order.
    pub application_order: usize,
    pub priority: i64,
    pub name: String,
    /// Current parameter values.
    pub parameters: Parameters,
    pub has_secondary_result: bool,
}

/// Overview of every registered step, one row per step in application order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepOverview {
    rows: Vec<StepSummary>,
}

impl StepOverview {
    pub fn new(rows: Vec<StepSummary>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[StepSummary] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Step names in application order.
    pub fn names(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.name.as_str()).collect()
    }

    /// Convert to a DataFrame with columns `application_order`, `priority`,
    /// `name`, `parameters` (compact JSON) and `has_secondary_result`.
    ///
    /// An empty overview gives a zero-row frame with the same columns.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let order: Vec<u64> = self.rows.iter().map(|r| r.application_order as u64).collect();
        let priority: Vec<i64> = self.rows.iter().map(|r| r.priority).collect();
        let name: Vec<&str> = self.rows.iter().map(|r| r.name.as_str()).collect();
        let parameters: Vec<String> = self.rows.iter().map(|r| r.parameters.to_string()).collect();
        let secondary: Vec<bool> = self.rows.iter().map(|r| r.has_secondary_result).collect();

        DataFrame::new(vec![
            Column::new("application_order".into(), order),
            Column::new("priority".into(), priority),
            Column::new("name".into(), name),
            Column::new("parameters".into(), parameters),
            Column::new("has_secondary_result".into(), secondary),
        ])
    }
}

impl fmt::Display for StepOverview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "(no steps registered)");
        }
        writeln!(f, "{:>5}  {:>8}  {:<24}  {:<9}  parameters", "order", "priority", "name", "secondary")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>5}  {:>8}  {:<24}  {:<9}  {}",
                row.application_order, row.priority, row.name, row.has_secondary_result, row.parameters
            )?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a StepOverview {
    type Item = &'a StepSummary;
    type IntoIter = std::slice::Iter<'a, StepSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
