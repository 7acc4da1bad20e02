use polars::prelude::*;
use rayon::prelude::*;

use crate::dataset::column_kind;
use crate::domain::ScrubError;

/// Non-null finite values of a column as f64, in row order.
pub fn numeric_values(series: &Series) -> Result<Vec<f64>, ScrubError> {
    let casted = series.cast(&DataType::Float64)?;
    let ca = casted.f64()?;
    Ok(ca.into_iter().flatten().filter(|v| v.is_finite()).collect())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (ddof = 1).
pub fn std_sample(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Quantile with linear interpolation between closest ranks, the method the
/// box-plot quartiles are specified with. `q` must be in [0, 1].
pub fn quantile_linear(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn sorted_values(series: &Series) -> Result<Vec<f64>, ScrubError> {
    let mut values = numeric_values(series)?;
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(values)
}

/// Pearson correlation over two equally long samples. NaN when fewer than 3
/// observations or either sample has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 3 {
        return f64::NAN;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Square, symmetric, unit diagonal.
    pub values: Vec<Vec<f64>>,
}

/// Pairwise Pearson correlation over the numeric columns of the frame.
/// Null cells are dropped pairwise. Fails when fewer than two numeric
/// columns exist.
pub fn correlation_matrix(frame: &DataFrame) -> Result<CorrelationMatrix, ScrubError> {
    let numeric: Vec<String> = frame
        .get_columns()
        .iter()
        .filter(|c| column_kind(c.dtype()).is_numeric())
        .map(|c| c.name().to_string())
        .collect();
    if numeric.len() < 2 {
        return Err(ScrubError::Validation(
            "need at least 2 numeric columns for a correlation heatmap".to_string(),
        ));
    }

    // Paired non-null observations per column pair, one pass per pair.
    let paired = |a: &str, b: &str| -> Result<f64, ScrubError> {
        let ca = frame.column(a)?.as_materialized_series().cast(&DataType::Float64)?;
        let cb = frame.column(b)?.as_materialized_series().cast(&DataType::Float64)?;
        let (ca, cb) = (ca.f64()?.clone(), cb.f64()?.clone());
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (x, y) in ca.into_iter().zip(cb.into_iter()) {
            if let (Some(x), Some(y)) = (x, y) {
                if x.is_finite() && y.is_finite() {
                    xs.push(x);
                    ys.push(y);
                }
            }
        }
        Ok(pearson(&xs, &ys))
    };

    let n = numeric.len();
    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
    let computed: Result<Vec<((usize, usize), f64)>, ScrubError> = pairs
        .par_iter()
        .map(|&(i, j)| paired(&numeric[i], &numeric[j]).map(|r| ((i, j), r)))
        .collect();

    let mut values = vec![vec![1.0; n]; n];
    for ((i, j), r) in computed? {
        values[i][j] = r;
        values[j][i] = r;
    }
    Ok(CorrelationMatrix {
        columns: numeric,
        values,
    })
}
