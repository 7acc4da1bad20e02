use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

use crate::dataset::{ColumnKind, column_kind};
use crate::domain::ScrubError;

/// Imputation strategy for a column with missing values.
#[derive(Debug, Clone, PartialEq)]
pub enum ImputeMethod {
    Mean,
    Median,
    Mode,
    Constant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertTarget {
    Integer,
    Float,
    Text,
    Datetime,
    Categorical,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReindexAction {
    Reset,
    Set(String),
}

fn live_series<'a>(frame: &'a DataFrame, column: &str) -> Result<&'a Series, ScrubError> {
    frame
        .column(column)
        .map(|c| c.as_materialized_series())
        .map_err(|_| ScrubError::ColumnNotFound(column.to_string()))
}

fn require_numeric(column: &str, kind: ColumnKind) -> Result<(), ScrubError> {
    if kind.is_numeric() {
        Ok(())
    } else {
        Err(ScrubError::TypeMismatch {
            column: column.to_string(),
            expected: "numeric".to_string(),
        })
    }
}

/// First-occurring most-frequent non-missing value, keyed by the canonical
/// string rendering. Ties break towards the value encountered first in row
/// order. Returns the row index of that value.
fn mode_row_index(series: &Series) -> Result<usize, ScrubError> {
    let rendered = series.cast(&DataType::String)?;
    let ca = rendered.str()?;
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (row, value) in ca.into_iter().enumerate() {
        if let Some(v) = value {
            let entry = counts.entry(v).or_insert((0, row));
            entry.0 += 1;
        }
    }
    counts
        .values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, first_row)| *first_row)
        .ok_or_else(|| {
            ScrubError::Validation("column holds no values to take a mode from".to_string())
        })
}

fn fill_with_value_at(series: &Series, row: usize) -> Result<Series, ScrubError> {
    let replacement = series.new_from_index(row, series.len());
    Ok(series.zip_with(&series.is_not_null(), &replacement)?)
}

fn fill_with_scalar(frame: &DataFrame, column: &str, value: Expr) -> Result<DataFrame, ScrubError> {
    Ok(frame
        .clone()
        .lazy()
        .with_column(col(column).fill_null(value))
        .collect()?)
}

/// Step 1: fill missing values of one column in place. Only columns that
/// currently contain at least one missing value are valid targets; the
/// session recomputes that scope on every pipeline entry.
pub fn impute(
    frame: &DataFrame,
    column: &str,
    method: &ImputeMethod,
) -> Result<DataFrame, ScrubError> {
    let series = live_series(frame, column)?;
    if series.null_count() == 0 {
        return Err(ScrubError::Validation(format!(
            "column \"{column}\" has no missing values"
        )));
    }
    let kind = column_kind(series.dtype());
    debug!("Impute {column} ({}) with {method:?}", kind.as_str());

    match method {
        ImputeMethod::Mean => {
            require_numeric(column, kind)?;
            let mean = series.mean().ok_or_else(|| {
                ScrubError::Validation(format!("column \"{column}\" has no values to average"))
            })?;
            fill_with_scalar(frame, column, lit(mean))
        }
        ImputeMethod::Median => {
            require_numeric(column, kind)?;
            let median = series.median().ok_or_else(|| {
                ScrubError::Validation(format!("column \"{column}\" has no values to average"))
            })?;
            fill_with_scalar(frame, column, lit(median))
        }
        ImputeMethod::Mode => {
            let row = mode_row_index(series)?;
            let filled = fill_with_value_at(series, row)?;
            let mut out = frame.clone();
            out.with_column(filled)?;
            Ok(out)
        }
        ImputeMethod::Constant(value) => {
            if value.is_empty() {
                return Err(ScrubError::Validation(
                    "a constant fill value must not be empty".to_string(),
                ));
            }
            let scalar = Series::new(PlSmallStr::EMPTY, &[value.as_str()])
                .strict_cast(series.dtype())
                .map_err(|e| ScrubError::Conversion {
                    column: column.to_string(),
                    reason: e.to_string(),
                })?;
            let replacement = scalar.new_from_index(0, series.len());
            let filled = series.zip_with(&series.is_not_null(), &replacement)?;
            let mut out = frame.clone();
            out.with_column(filled)?;
            Ok(out)
        }
    }
}

/// Step 2: convert one column to a new kind. Datetime conversion is best
/// effort (unparsable cells become missing); every other target is strict
/// and atomic, failing with `Conversion` while the column stays unchanged.
pub fn convert(
    frame: &DataFrame,
    column: &str,
    target: ConvertTarget,
) -> Result<DataFrame, ScrubError> {
    let series = live_series(frame, column)?;
    debug!("Convert {column} to {target:?}");

    if target == ConvertTarget::Datetime {
        if matches!(column_kind(series.dtype()), ColumnKind::Datetime) {
            return Ok(frame.clone());
        }
        let options = StrptimeOptions {
            strict: false,
            ..Default::default()
        };
        return Ok(frame
            .clone()
            .lazy()
            .with_column(
                col(column)
                    .cast(DataType::String)
                    .str()
                    .to_datetime(Some(TimeUnit::Microseconds), None, options, lit("raise"))
                    .alias(column),
            )
            .collect()?);
    }

    let dtype = match target {
        ConvertTarget::Integer => DataType::Int64,
        ConvertTarget::Float => DataType::Float64,
        ConvertTarget::Text => DataType::String,
        ConvertTarget::Categorical => DataType::from_categories(Categories::global()),
        ConvertTarget::Datetime => unreachable!(),
    };
    let converted = series
        .strict_cast(&dtype)
        .map_err(|e| ScrubError::Conversion {
            column: column.to_string(),
            reason: e.to_string(),
        })?;
    let mut out = frame.clone();
    out.with_column(converted)?;
    Ok(out)
}

/// Indices kept after dropping `rows`, validated against the row count.
pub fn keep_indices(height: usize, rows: &[usize]) -> Result<UInt32Chunked, ScrubError> {
    for &row in rows {
        if row >= height {
            return Err(ScrubError::Validation(format!(
                "row index {row} is out of range (table has {height} rows)"
            )));
        }
    }
    let dropped: std::collections::HashSet<usize> = rows.iter().copied().collect();
    let kept: Vec<u32> = (0..height)
        .filter(|i| !dropped.contains(i))
        .map(|i| i as u32)
        .collect();
    Ok(UInt32Chunked::new(PlSmallStr::EMPTY, kept))
}

/// Step 4: remove named columns and positional row indices in one mutation.
/// An unknown column fails the whole step before anything is removed.
pub fn drop(
    frame: &DataFrame,
    columns: &[String],
    rows: &[usize],
) -> Result<DataFrame, ScrubError> {
    for name in columns {
        live_series(frame, name)?;
    }
    if columns.len() == frame.width() {
        return Err(ScrubError::Validation(
            "cannot drop every column of the table".to_string(),
        ));
    }
    let keep = keep_indices(frame.height(), rows)?;
    let mut out = frame.drop_many(columns.iter().map(|s| s.as_str()));
    if !rows.is_empty() {
        out = out.take(&keep)?;
    }
    debug!(
        "Dropped {} columns and {} rows",
        columns.len(),
        rows.len()
    );
    Ok(out)
}

/// Step 5: single-column rename. After it succeeds the old name is gone;
/// later steps referencing it fail with `ColumnNotFound`.
pub fn rename(frame: &DataFrame, old: &str, new: &str) -> Result<DataFrame, ScrubError> {
    live_series(frame, old)?;
    if new.is_empty() {
        return Err(ScrubError::Validation(
            "new column name must not be empty".to_string(),
        ));
    }
    if new != old && frame.column(new).is_ok() {
        return Err(ScrubError::Validation(format!(
            "column \"{new}\" already exists"
        )));
    }
    let mut out = frame.clone();
    out.rename(old, new.into())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!(
            "id" => &[1i64, 2, 3],
            "cat" => &["a", "a", "b"],
            "val" => &[Some(10.0), Some(20.0), None],
        )
        .unwrap()
    }

    #[test]
    fn impute_mean_fills_all_missing() {
        let out = impute(&sample(), "val", &ImputeMethod::Mean).unwrap();
        let vals: Vec<f64> = out
            .column("val")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(vals, vec![10.0, 20.0, 15.0]);
        assert_eq!(out.column("val").unwrap().null_count(), 0);
    }

    #[test]
    fn impute_mean_on_text_is_type_mismatch() {
        let frame = df!("c" => &[Some("x"), None]).unwrap();
        assert!(matches!(
            impute(&frame, "c", &ImputeMethod::Mean),
            Err(ScrubError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn impute_rejects_column_without_missing() {
        assert!(matches!(
            impute(&sample(), "id", &ImputeMethod::Mean),
            Err(ScrubError::Validation(_))
        ));
    }

    #[test]
    fn impute_mode_first_occurring_tie_break() {
        let frame = df!("c" => &[Some("b"), Some("a"), Some("a"), Some("b"), None]).unwrap();
        let out = impute(&frame, "c", &ImputeMethod::Mode).unwrap();
        let vals: Vec<&str> = out
            .column("c")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        // "b" and "a" are tied at 2; "b" was seen first.
        assert_eq!(vals, vec!["b", "a", "a", "b", "b"]);
    }

    #[test]
    fn impute_constant_parses_to_column_kind() {
        let out = impute(&sample(), "val", &ImputeMethod::Constant("7.5".to_string())).unwrap();
        let vals: Vec<f64> = out
            .column("val")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(vals, vec![10.0, 20.0, 7.5]);

        assert!(matches!(
            impute(&sample(), "val", &ImputeMethod::Constant("abc".to_string())),
            Err(ScrubError::Conversion { .. })
        ));
        assert!(matches!(
            impute(&sample(), "val", &ImputeMethod::Constant(String::new())),
            Err(ScrubError::Validation(_))
        ));
    }

    #[test]
    fn convert_strict_targets_are_atomic() {
        let frame = df!("c" => &["1", "2", "x"]).unwrap();
        let err = convert(&frame, "c", ConvertTarget::Integer);
        assert!(matches!(err, Err(ScrubError::Conversion { .. })));
        // Column unchanged after the failed conversion.
        assert_eq!(frame.column("c").unwrap().dtype(), &DataType::String);

        let ok = convert(&df!("c" => &["1", "2"]).unwrap(), "c", ConvertTarget::Integer).unwrap();
        assert_eq!(ok.column("c").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn convert_datetime_is_best_effort() {
        let frame = df!("c" => &["2024-01-01 00:00:00", "not a date"]).unwrap();
        let out = convert(&frame, "c", ConvertTarget::Datetime).unwrap();
        let col = out.column("c").unwrap();
        assert!(matches!(col.dtype(), DataType::Datetime(..)));
        assert_eq!(col.null_count(), 1);
    }

    #[test]
    fn convert_to_text_always_succeeds() {
        let out = convert(&sample(), "id", ConvertTarget::Text).unwrap();
        assert_eq!(out.column("id").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn drop_columns_and_rows_in_one_mutation() {
        let out = drop(&sample(), &["cat".to_string()], &[0]).unwrap();
        assert_eq!(out.width(), 2);
        assert_eq!(out.height(), 2);
        let ids: Vec<i64> = out
            .column("id")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn drop_unknown_column_fails_whole_step() {
        let frame = sample();
        let err = drop(&frame, &["cat".to_string(), "gone".to_string()], &[0]);
        assert!(matches!(err, Err(ScrubError::ColumnNotFound(_))));
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 3);
    }

    #[test]
    fn drop_out_of_range_row() {
        assert!(matches!(
            drop(&sample(), &[], &[17]),
            Err(ScrubError::Validation(_))
        ));
    }

    #[test]
    fn rename_then_drop_uses_new_name() {
        let renamed = rename(&sample(), "val", "amount").unwrap();
        // The old name is gone: dropping it must fail referencing it.
        assert!(matches!(
            drop(&renamed, &["val".to_string()], &[]),
            Err(ScrubError::ColumnNotFound(name)) if name == "val"
        ));
        // The new name works.
        let out = drop(&renamed, &["amount".to_string()], &[]).unwrap();
        assert_eq!(out.width(), 2);
    }

    #[test]
    fn rename_collision_fails() {
        assert!(matches!(
            rename(&sample(), "val", "cat"),
            Err(ScrubError::Validation(_))
        ));
        assert!(matches!(
            rename(&sample(), "gone", "x"),
            Err(ScrubError::ColumnNotFound(_))
        ));
    }
}
