use polars::prelude::*;

use crate::dataset::{ColumnKind, column_kind};
use crate::domain::ScrubError;
use crate::stats;

/// Rows shown by the head/tail inspections.
pub const PEEK_ROWS: usize = 5;

pub fn head(frame: &DataFrame) -> DataFrame {
    frame.head(Some(PEEK_ROWS))
}

pub fn tail(frame: &DataFrame) -> DataFrame {
    frame.tail(Some(PEEK_ROWS))
}

pub fn shape(frame: &DataFrame) -> (usize, usize) {
    (frame.height(), frame.width())
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub dtype: String,
    pub non_null: usize,
}

/// Per-column name, kind, and non-null count.
pub fn info(frame: &DataFrame) -> Vec<ColumnInfo> {
    frame
        .get_columns()
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_string(),
            kind: column_kind(c.dtype()),
            dtype: format!("{:?}", c.dtype()),
            non_null: c.len() - c.null_count(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub count: usize,
    pub null_count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

/// Statistical summary per column. Numeric columns get the full eight-number
/// summary; the rest only count and null count.
pub fn describe(frame: &DataFrame) -> Result<Vec<ColumnSummary>, ScrubError> {
    let mut summaries = Vec::with_capacity(frame.width());
    for column in frame.get_columns() {
        let series = column.as_materialized_series();
        let kind = column_kind(series.dtype());
        let mut summary = ColumnSummary {
            name: column.name().to_string(),
            kind,
            count: series.len() - series.null_count(),
            null_count: series.null_count(),
            mean: None,
            std: None,
            min: None,
            q25: None,
            median: None,
            q75: None,
            max: None,
        };
        if kind.is_numeric() {
            let sorted = stats::sorted_values(series)?;
            summary.mean = stats::mean(&sorted);
            summary.std = stats::std_sample(&sorted);
            summary.min = sorted.first().copied();
            summary.q25 = stats::quantile_linear(&sorted, 0.25);
            summary.median = stats::quantile_linear(&sorted, 0.5);
            summary.q75 = stats::quantile_linear(&sorted, 0.75);
            summary.max = sorted.last().copied();
        }
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Columns with at least one missing value and their null counts.
pub fn missing(frame: &DataFrame) -> Vec<(String, usize)> {
    frame
        .get_columns()
        .iter()
        .filter(|c| c.null_count() > 0)
        .map(|c| (c.name().to_string(), c.null_count()))
        .collect()
}
