use polars::prelude::*;
use tracing::debug;

use crate::dataset::column_kind;
use crate::domain::ScrubError;
use crate::stats;

pub const MIN_BINS: usize = 5;
pub const MAX_BINS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Pie,
    Histogram,
    Box,
    Scatter,
    Heatmap,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::Bar,
        ChartKind::Pie,
        ChartKind::Histogram,
        ChartKind::Box,
        ChartKind::Scatter,
        ChartKind::Heatmap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar Chart",
            ChartKind::Pie => "Pie Chart",
            ChartKind::Histogram => "Histogram",
            ChartKind::Box => "Box Plot",
            ChartKind::Scatter => "Scatter Plot",
            ChartKind::Heatmap => "Heatmap",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
            ChartKind::Box => "box",
            ChartKind::Scatter => "scatter",
            ChartKind::Heatmap => "heatmap",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ChartKind::Bar => 0,
            ChartKind::Pie => 1,
            ChartKind::Histogram => 2,
            ChartKind::Box => 3,
            ChartKind::Scatter => 4,
            ChartKind::Heatmap => 5,
        }
    }

    pub fn parse(s: &str) -> Option<ChartKind> {
        match s.to_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "pie" => Some(ChartKind::Pie),
            "hist" | "histogram" => Some(ChartKind::Histogram),
            "box" => Some(ChartKind::Box),
            "scatter" => Some(ChartKind::Scatter),
            "heatmap" => Some(ChartKind::Heatmap),
            _ => None,
        }
    }
}

/// Raw role bindings captured from the widget layer. Validated into a
/// `ChartSpec` by `build_spec`; nothing here is trusted.
#[derive(Debug, Clone, Default)]
pub struct ChartRequest {
    pub x: Option<String>,
    pub y: Vec<String>,
    pub hue: Option<String>,
    pub bins: Option<usize>,
    pub labels: Option<String>,
    pub values: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BoxStats {
    pub name: String,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Data slice of a validated chart, everything the rendering collaborator
/// needs and nothing it has to reach back into the table for.
#[derive(Debug, Clone)]
pub enum ChartData {
    Bar {
        categories: Vec<String>,
        series: Vec<(String, Vec<f64>)>,
    },
    Pie {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Histogram {
        series: Vec<(String, Vec<f64>)>,
        bins: usize,
    },
    Box {
        series: Vec<BoxStats>,
    },
    Scatter {
        x_label: String,
        y_label: String,
        groups: Vec<(String, Vec<(f64, f64)>)>,
    },
    Heatmap {
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub data: ChartData,
}

/// Rendering collaborator: takes a validated spec, returns encoded PNG
/// bytes. The dispatcher never touches pixels.
pub trait RenderBackend {
    fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>, ScrubError>;
}

#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: &'static str,
}

pub fn artifact(kind: ChartKind, bytes: Vec<u8>) -> DownloadArtifact {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    DownloadArtifact {
        bytes,
        file_name: format!("{}_{stamp}.png", kind.slug()),
        mime: "image/png",
    }
}

fn live_series<'a>(frame: &'a DataFrame, column: &str) -> Result<&'a Series, ScrubError> {
    frame
        .column(column)
        .map(|c| c.as_materialized_series())
        .map_err(|_| ScrubError::ColumnNotFound(column.to_string()))
}

fn require_numeric(frame: &DataFrame, column: &str) -> Result<(), ScrubError> {
    if column_kind(live_series(frame, column)?.dtype()).is_numeric() {
        Ok(())
    } else {
        Err(ScrubError::TypeMismatch {
            column: column.to_string(),
            expected: "numeric".to_string(),
        })
    }
}

/// Row-wise string rendering, nulls shown as the empty marker the table
/// preview uses too.
fn rendered_values(frame: &DataFrame, column: &str) -> Result<Vec<String>, ScrubError> {
    let series = live_series(frame, column)?.cast(&DataType::String)?;
    let ca = series.str()?;
    Ok(ca
        .into_iter()
        .map(|v| v.map(|s| s.to_string()).unwrap_or_else(|| "∅".to_string()))
        .collect())
}

fn f64_values(frame: &DataFrame, column: &str) -> Result<Vec<f64>, ScrubError> {
    let series = live_series(frame, column)?.cast(&DataType::Float64)?;
    let ca = series.f64()?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Per-row numeric projection used by scatter axes: numeric and temporal
/// columns map to their value, everything else to the ordinal position of
/// the value among the column's distinct values.
fn ordinal_values(frame: &DataFrame, column: &str) -> Result<Vec<Option<f64>>, ScrubError> {
    let series = live_series(frame, column)?;
    let kind = column_kind(series.dtype());
    if kind.is_numeric() {
        let casted = series.cast(&DataType::Float64)?;
        return Ok(casted.f64()?.into_iter().collect());
    }
    if kind == crate::dataset::ColumnKind::Datetime {
        let casted = series.cast(&DataType::Int64)?;
        return Ok(casted
            .i64()?
            .into_iter()
            .map(|v| v.map(|x| x as f64))
            .collect());
    }
    let rendered = series.cast(&DataType::String)?;
    let ca = rendered.str()?;
    let mut order: Vec<&str> = Vec::new();
    for v in ca.into_iter().flatten() {
        if !order.contains(&v) {
            order.push(v);
        }
    }
    Ok(ca
        .into_iter()
        .map(|v| v.and_then(|s| order.iter().position(|o| *o == s).map(|p| p as f64)))
        .collect())
}

fn build_bar(frame: &DataFrame, request: &ChartRequest) -> Result<ChartSpec, ScrubError> {
    let x = request.x.as_deref().ok_or_else(|| {
        ScrubError::Validation("select one categorical column for the x-axis".to_string())
    })?;
    if column_kind(live_series(frame, x)?.dtype()).is_numeric() {
        return Err(ScrubError::TypeMismatch {
            column: x.to_string(),
            expected: "categorical".to_string(),
        });
    }
    if request.y.is_empty() {
        return Err(ScrubError::Validation(
            "select at least one numeric column for the bars".to_string(),
        ));
    }
    let mut series = Vec::with_capacity(request.y.len());
    for name in &request.y {
        require_numeric(frame, name)?;
        series.push((name.clone(), f64_values(frame, name)?));
    }
    Ok(ChartSpec {
        kind: ChartKind::Bar,
        title: format!("Clustered Column Chart: {x} vs {}", request.y.join(", ")),
        data: ChartData::Bar {
            categories: rendered_values(frame, x)?,
            series,
        },
    })
}

fn build_pie(frame: &DataFrame, request: &ChartRequest) -> Result<ChartSpec, ScrubError> {
    let labels = request.labels.as_deref().ok_or_else(|| {
        ScrubError::Validation("select a categorical column for the labels".to_string())
    })?;
    let values = request.values.as_deref().ok_or_else(|| {
        ScrubError::Validation("select a numeric column for the values".to_string())
    })?;
    require_numeric(frame, values)?;
    Ok(ChartSpec {
        kind: ChartKind::Pie,
        title: format!("Pie Chart: {values} by {labels}"),
        data: ChartData::Pie {
            labels: rendered_values(frame, labels)?,
            values: f64_values(frame, values)?,
        },
    })
}

fn build_histogram(frame: &DataFrame, request: &ChartRequest) -> Result<ChartSpec, ScrubError> {
    if request.y.is_empty() {
        return Err(ScrubError::Validation(
            "select at least one numeric column".to_string(),
        ));
    }
    let bins = request.bins.unwrap_or(10);
    if !(MIN_BINS..=MAX_BINS).contains(&bins) {
        return Err(ScrubError::Validation(format!(
            "bin count must be between {MIN_BINS} and {MAX_BINS}, got {bins}"
        )));
    }
    let mut series = Vec::with_capacity(request.y.len());
    for name in &request.y {
        require_numeric(frame, name)?;
        series.push((name.clone(), stats::numeric_values(live_series(frame, name)?)?));
    }
    Ok(ChartSpec {
        kind: ChartKind::Histogram,
        title: "Histogram".to_string(),
        data: ChartData::Histogram { series, bins },
    })
}

fn build_box(frame: &DataFrame, request: &ChartRequest) -> Result<ChartSpec, ScrubError> {
    if request.y.is_empty() {
        return Err(ScrubError::Validation(
            "select at least one numeric column".to_string(),
        ));
    }
    let mut series = Vec::with_capacity(request.y.len());
    for name in &request.y {
        require_numeric(frame, name)?;
        // Missing values are dropped per column before quantiles.
        let sorted = stats::sorted_values(live_series(frame, name)?)?;
        let quartile = |q| stats::quantile_linear(&sorted, q);
        match (quartile(0.0), quartile(0.25), quartile(0.5), quartile(0.75), quartile(1.0)) {
            (Some(min), Some(q1), Some(median), Some(q3), Some(max)) => series.push(BoxStats {
                name: name.clone(),
                min,
                q1,
                median,
                q3,
                max,
            }),
            _ => {
                return Err(ScrubError::Validation(format!(
                    "column \"{name}\" has no values to plot"
                )));
            }
        }
    }
    Ok(ChartSpec {
        kind: ChartKind::Box,
        title: "Box Plot with Stats".to_string(),
        data: ChartData::Box { series },
    })
}

fn build_scatter(frame: &DataFrame, request: &ChartRequest) -> Result<ChartSpec, ScrubError> {
    let x = request
        .x
        .as_deref()
        .ok_or_else(|| ScrubError::Validation("select an x-axis column".to_string()))?;
    let y = request
        .y
        .first()
        .ok_or_else(|| ScrubError::Validation("select a y-axis column".to_string()))?;
    let xs = ordinal_values(frame, x)?;
    let ys = ordinal_values(frame, y)?;

    let hue_labels = match request.hue.as_deref() {
        Some(hue) => {
            if column_kind(live_series(frame, hue)?.dtype()).is_numeric() {
                return Err(ScrubError::TypeMismatch {
                    column: hue.to_string(),
                    expected: "categorical".to_string(),
                });
            }
            Some(rendered_values(frame, hue)?)
        }
        None => None,
    };

    let mut groups: Vec<(String, Vec<(f64, f64)>)> = Vec::new();
    for (row, (px, py)) in xs.iter().zip(ys.iter()).enumerate() {
        let (Some(px), Some(py)) = (px, py) else {
            continue;
        };
        let label = match &hue_labels {
            Some(labels) => labels[row].clone(),
            None => y.clone(),
        };
        match groups.iter_mut().find(|(name, _)| *name == label) {
            Some((_, points)) => points.push((*px, *py)),
            None => groups.push((label, vec![(*px, *py)])),
        }
    }
    Ok(ChartSpec {
        kind: ChartKind::Scatter,
        title: format!("Scatter Plot: {x} vs {y}"),
        data: ChartData::Scatter {
            x_label: x.to_string(),
            y_label: y.clone(),
            groups,
        },
    })
}

fn build_heatmap(frame: &DataFrame) -> Result<ChartSpec, ScrubError> {
    let matrix = stats::correlation_matrix(frame)?;
    Ok(ChartSpec {
        kind: ChartKind::Heatmap,
        title: "Correlation Heatmap".to_string(),
        data: ChartData::Heatmap {
            columns: matrix.columns,
            values: matrix.values,
        },
    })
}

/// Validates the role bindings for the chart kind and assembles the chart
/// spec with its derived statistics. Called only on the explicit generate
/// action, never reactively on selection changes.
pub fn build_spec(
    frame: &DataFrame,
    kind: ChartKind,
    request: &ChartRequest,
) -> Result<ChartSpec, ScrubError> {
    debug!("Building {} spec", kind.as_str());
    match kind {
        ChartKind::Bar => build_bar(frame, request),
        ChartKind::Pie => build_pie(frame, request),
        ChartKind::Histogram => build_histogram(frame, request),
        ChartKind::Box => build_box(frame, request),
        ChartKind::Scatter => build_scatter(frame, request),
        ChartKind::Heatmap => build_heatmap(frame),
    }
}
