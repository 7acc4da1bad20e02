use polars::prelude::*;
use tracing::trace;

use crate::dataset::{ColumnKind, column_kind};
use crate::domain::ScrubError;

/// Per-column predicate of a custom filter. Membership applies to
/// text/categorical columns, Range (inclusive) to numeric ones.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnPredicate {
    Membership(Vec<String>),
    Range(f64, f64),
}

/// A read-only filter derived from the current table. Specs referencing
/// columns that were dropped or renamed since fail with `ColumnNotFound`
/// when applied; they are never silently ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Equality {
        column: String,
        value: String,
    },
    Custom {
        filters: Vec<(String, ColumnPredicate)>,
        /// Columns the resulting view is projected to; empty means all.
        display: Vec<String>,
    },
}

fn live_column<'a>(frame: &'a DataFrame, column: &str) -> Result<&'a Column, ScrubError> {
    frame
        .column(column)
        .map_err(|_| ScrubError::ColumnNotFound(column.to_string()))
}

/// Distinct non-null values of a column in first-occurrence row order,
/// rendered as strings. Widgets enumerate these so a stale value can never
/// be selected.
pub fn distinct_values(frame: &DataFrame, column: &str) -> Result<Vec<String>, ScrubError> {
    let series = live_column(frame, column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let ca = series.str()?;
    let mut seen = std::collections::HashSet::new();
    let mut values = Vec::new();
    for value in ca.into_iter().flatten() {
        if seen.insert(value.to_string()) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}

/// Observed min/max of a numeric column, the default bounds of a range
/// slider. Fails with `TypeMismatch` for non-numeric columns and
/// `Validation` when the column holds no values.
pub fn numeric_bounds(frame: &DataFrame, column: &str) -> Result<(f64, f64), ScrubError> {
    let col = live_column(frame, column)?;
    if !column_kind(col.dtype()).is_numeric() {
        return Err(ScrubError::TypeMismatch {
            column: column.to_string(),
            expected: "numeric".to_string(),
        });
    }
    let series = col.as_materialized_series().cast(&DataType::Float64)?;
    let ca = series.f64()?;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in ca.into_iter().flatten() {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if max < min {
        return Err(ScrubError::Validation(format!(
            "column \"{column}\" has no values to derive bounds from"
        )));
    }
    Ok((min, max))
}

/// The widget-default predicate for a column: all current distinct values
/// selected, or the full observed range. Applying it filters nothing.
pub fn default_predicate(frame: &DataFrame, column: &str) -> Result<ColumnPredicate, ScrubError> {
    let col = live_column(frame, column)?;
    if column_kind(col.dtype()).is_numeric() {
        let (min, max) = numeric_bounds(frame, column)?;
        Ok(ColumnPredicate::Range(min, max))
    } else {
        Ok(ColumnPredicate::Membership(distinct_values(frame, column)?))
    }
}

/// Values are compared through their canonical string rendering, the same
/// rendering `distinct_values` enumerates them with.
fn equality_expr(column: &str, value: &str) -> Expr {
    col(column)
        .cast(DataType::String)
        .eq(lit(value.to_string()))
}

fn membership_expr(column: &str, values: &[String]) -> Option<Expr> {
    values
        .iter()
        .map(|v| equality_expr(column, v))
        .reduce(|a, b| a.or(b))
}

fn predicate_expr(
    frame: &DataFrame,
    column: &str,
    predicate: &ColumnPredicate,
) -> Result<Option<Expr>, ScrubError> {
    let kind = column_kind(live_column(frame, column)?.dtype());
    match predicate {
        ColumnPredicate::Membership(values) => {
            if kind.is_numeric() {
                return Err(ScrubError::TypeMismatch {
                    column: column.to_string(),
                    expected: "categorical".to_string(),
                });
            }
            // Selecting every current distinct value is the widget default
            // and filters nothing.
            let distinct = distinct_values(frame, column)?;
            if distinct.iter().all(|v| values.contains(v)) {
                return Ok(None);
            }
            match membership_expr(column, values) {
                Some(expr) => Ok(Some(expr)),
                None => Ok(Some(lit(false))),
            }
        }
        ColumnPredicate::Range(min, max) => {
            if !kind.is_numeric() {
                return Err(ScrubError::TypeMismatch {
                    column: column.to_string(),
                    expected: "numeric".to_string(),
                });
            }
            Ok(Some(col(column).gt_eq(lit(*min)).and(col(column).lt_eq(lit(*max)))))
        }
    }
}

/// Basic filter: rows where `column == value`. `value` must be one of the
/// column's current distinct values, so a stale widget value produces an
/// error instead of an empty-by-construction view.
pub fn apply_basic(frame: &DataFrame, column: &str, value: &str) -> Result<DataFrame, ScrubError> {
    let distinct = distinct_values(frame, column)?;
    if !distinct.iter().any(|v| v == value) {
        return Err(ScrubError::Validation(format!(
            "\"{value}\" is not a current value of column \"{column}\""
        )));
    }
    trace!("Basic filter: {column} == {value}");
    let view = frame
        .clone()
        .lazy()
        .filter(equality_expr(column, value))
        .collect()?;
    Ok(view)
}

/// Custom filter: conjunction of the per-column predicates, projected to the
/// display columns. Columns absent from `filters` are unfiltered. Never
/// mutates the input; re-applying with unchanged inputs yields an identical
/// view.
pub fn apply_custom(
    frame: &DataFrame,
    display: &[String],
    filters: &[(String, ColumnPredicate)],
) -> Result<DataFrame, ScrubError> {
    let mut combined: Option<Expr> = None;
    for (column, predicate) in filters {
        if let Some(expr) = predicate_expr(frame, column, predicate)? {
            combined = Some(match combined {
                Some(acc) => acc.and(expr),
                None => expr,
            });
        }
    }

    let mut lazy = frame.clone().lazy();
    if let Some(expr) = combined {
        lazy = lazy.filter(expr);
    }
    if !display.is_empty() {
        for name in display {
            live_column(frame, name)?;
        }
        lazy = lazy.select(display.iter().map(|c| col(c.as_str())).collect::<Vec<_>>());
    }
    Ok(lazy.collect()?)
}

/// Applies a complete spec, the entry point the reducer uses.
pub fn apply(frame: &DataFrame, spec: &FilterSpec) -> Result<DataFrame, ScrubError> {
    match spec {
        FilterSpec::Equality { column, value } => apply_basic(frame, column, value),
        FilterSpec::Custom { filters, display } => apply_custom(frame, display, filters),
    }
}
