use image::{ImageFormat, RgbImage};
use plotters::prelude::*;
use std::io::Cursor;
use tracing::debug;

use crate::domain::ScrubError;
use crate::viz::{BoxStats, ChartData, ChartSpec, RenderBackend};

const PALETTE: [RGBColor; 7] = [
    CYAN,
    MAGENTA,
    GREEN,
    YELLOW,
    BLUE,
    RED,
    RGBColor(128, 255, 255),
];

fn render_err<E: std::fmt::Display>(e: E) -> ScrubError {
    ScrubError::Render(e.to_string())
}

fn color(idx: usize) -> RGBColor {
    PALETTE[idx % PALETTE.len()]
}

/// Padded value range; degenerate inputs fall back to a unit span so the
/// cartesian build never sees an empty range.
fn padded(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if max <= min {
        return (min - 0.5, min + 0.5);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

/// Diverging blue to white to red scale over [-1, 1] for correlation cells.
fn heat_color(v: f64) -> RGBColor {
    let v = v.clamp(-1.0, 1.0);
    if v < 0.0 {
        let t = 1.0 + v;
        RGBColor((255.0 * t) as u8, (255.0 * t) as u8, 255)
    } else {
        let t = 1.0 - v;
        RGBColor(255, (255.0 * t) as u8, (255.0 * t) as u8)
    }
}

/// Renders chart specs to PNG bytes through the plotters bitmap backend.
/// Stateless apart from the output dimensions.
pub struct PlottersBackend {
    width: u32,
    height: u32,
}

impl PlottersBackend {
    pub fn new(width: u32, height: u32) -> Self {
        PlottersBackend { width, height }
    }
}

impl RenderBackend for PlottersBackend {
    fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>, ScrubError> {
        debug!("Rendering {} at {}x{}", spec.title, self.width, self.height);
        let mut buf = vec![0u8; (self.width * self.height * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buf, (self.width, self.height))
                .into_drawing_area();
            root.fill(&WHITE).map_err(render_err)?;
            match &spec.data {
                ChartData::Bar { categories, series } => {
                    draw_bar(&root, &spec.title, categories, series)?
                }
                ChartData::Pie { labels, values } => draw_pie(&root, &spec.title, labels, values)?,
                ChartData::Histogram { series, bins } => {
                    draw_histogram(&root, &spec.title, series, *bins)?
                }
                ChartData::Box { series } => draw_box(&root, &spec.title, series)?,
                ChartData::Scatter {
                    x_label,
                    y_label,
                    groups,
                } => draw_scatter(&root, &spec.title, x_label, y_label, groups)?,
                ChartData::Heatmap { columns, values } => {
                    draw_heatmap(&root, &spec.title, columns, values)?
                }
            }
            root.present().map_err(render_err)?;
        }

        let img = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| ScrubError::Render("bitmap buffer size mismatch".to_string()))?;
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png).map_err(render_err)?;
        Ok(png.into_inner())
    }
}

type Area<'a> = DrawingArea<BitMapBackend<'a>, plotters::coord::Shift>;

fn draw_bar(
    root: &Area<'_>,
    title: &str,
    categories: &[String],
    series: &[(String, Vec<f64>)],
) -> Result<(), ScrubError> {
    let ncat = categories.len().max(1);
    let (y_min, y_max) = padded(
        series
            .iter()
            .flat_map(|(_, vs)| vs.iter().copied())
            .chain([0.0]),
    );
    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 24))
        .margin(30)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..ncat as f64, y_min..y_max)
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_labels(ncat.min(20))
        .x_label_formatter(&|x| {
            categories
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()
        .map_err(render_err)?;

    // Each category slot holds one clustered bar per series.
    let slot = 0.8 / series.len().max(1) as f64;
    for (idx, (name, values)) in series.iter().enumerate() {
        let c = color(idx);
        chart
            .draw_series(values.iter().enumerate().map(|(cat, &v)| {
                let x0 = cat as f64 + 0.1 + idx as f64 * slot;
                Rectangle::new([(x0, 0.0), (x0 + slot, v)], c.filled())
            }))
            .map_err(render_err)?
            .label(name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(render_err)?;
    Ok(())
}

fn draw_pie(
    root: &Area<'_>,
    title: &str,
    labels: &[String],
    values: &[f64],
) -> Result<(), ScrubError> {
    // Sum the value column per label; non-positive totals cannot be sliced.
    let mut totals: Vec<(String, f64)> = Vec::new();
    for (label, &value) in labels.iter().zip(values.iter()) {
        match totals.iter_mut().find(|(l, _)| l == label) {
            Some((_, t)) => *t += value,
            None => totals.push((label.clone(), value)),
        }
    }
    totals.retain(|(_, t)| *t > 0.0);
    if totals.is_empty() {
        return Err(ScrubError::Render(
            "no positive values to slice".to_string(),
        ));
    }

    let root = root.titled(title, ("sans-serif", 24)).map_err(render_err)?;
    let (w, h) = root.dim_in_pixel();
    let center = (w as i32 / 2, h as i32 / 2);
    let radius = (w.min(h) as f64 / 2.0) * 0.7;
    let sizes: Vec<f64> = totals.iter().map(|(_, t)| *t).collect();
    let names: Vec<String> = totals.iter().map(|(l, _)| l.clone()).collect();
    let colors: Vec<RGBColor> = (0..totals.len()).map(color).collect();
    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &names);
    pie.label_style(("sans-serif", 16).into_font());
    root.draw(&pie).map_err(render_err)?;
    Ok(())
}

fn draw_histogram(
    root: &Area<'_>,
    title: &str,
    series: &[(String, Vec<f64>)],
    bins: usize,
) -> Result<(), ScrubError> {
    let (lo, hi) = padded(series.iter().flat_map(|(_, vs)| vs.iter().copied()));
    let width = (hi - lo) / bins as f64;
    let counts: Vec<(usize, Vec<usize>)> = series
        .iter()
        .enumerate()
        .map(|(idx, (_, values))| {
            let mut c = vec![0usize; bins];
            for &v in values {
                let bin = (((v - lo) / width) as usize).min(bins - 1);
                c[bin] += 1;
            }
            (idx, c)
        })
        .collect();
    let y_max = counts
        .iter()
        .flat_map(|(_, c)| c.iter().copied())
        .max()
        .unwrap_or(1)
        .max(1);

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 24))
        .margin(30)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(lo..hi, 0f64..(y_max as f64 * 1.05))
        .map_err(render_err)?;
    chart.configure_mesh().draw().map_err(render_err)?;

    for (idx, bin_counts) in &counts {
        let c = color(*idx);
        let name = series[*idx].0.as_str();
        chart
            .draw_series(bin_counts.iter().enumerate().map(|(b, &n)| {
                let x0 = lo + b as f64 * width;
                Rectangle::new([(x0, 0.0), (x0 + width, n as f64)], c.mix(0.6).filled())
            }))
            .map_err(render_err)?
            .label(name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c));
    }
    if series.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;
    }
    Ok(())
}

fn draw_box(root: &Area<'_>, title: &str, series: &[BoxStats]) -> Result<(), ScrubError> {
    let (y_min, y_max) = padded(series.iter().flat_map(|s| [s.min, s.max]));
    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 24))
        .margin(30)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..series.len() as f64, y_min..y_max)
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_labels(series.len())
        .x_label_formatter(&|x| {
            series
                .get(x.floor() as usize)
                .map(|s| s.name.clone())
                .unwrap_or_default()
        })
        .draw()
        .map_err(render_err)?;

    for (idx, s) in series.iter().enumerate() {
        let c = color(idx);
        let mid = idx as f64 + 0.5;
        // Whisker, interquartile box, median line.
        chart
            .draw_series([PathElement::new(vec![(mid, s.min), (mid, s.max)], c)])
            .map_err(render_err)?;
        chart
            .draw_series([Rectangle::new(
                [(mid - 0.25, s.q1), (mid + 0.25, s.q3)],
                c.mix(0.4).filled(),
            )])
            .map_err(render_err)?;
        chart
            .draw_series([PathElement::new(
                vec![(mid - 0.25, s.median), (mid + 0.25, s.median)],
                BLACK,
            )])
            .map_err(render_err)?;
    }
    Ok(())
}

fn draw_scatter(
    root: &Area<'_>,
    title: &str,
    x_label: &str,
    y_label: &str,
    groups: &[(String, Vec<(f64, f64)>)],
) -> Result<(), ScrubError> {
    let points = || groups.iter().flat_map(|(_, ps)| ps.iter().copied());
    let (x_min, x_max) = padded(points().map(|(x, _)| x));
    let (y_min, y_max) = padded(points().map(|(_, y)| y));
    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 24))
        .margin(30)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()
        .map_err(render_err)?;

    for (idx, (name, points)) in groups.iter().enumerate() {
        let c = color(idx);
        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, c.filled())),
            )
            .map_err(render_err)?
            .label(name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c));
    }
    if groups.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;
    }
    Ok(())
}

fn draw_heatmap(
    root: &Area<'_>,
    title: &str,
    columns: &[String],
    values: &[Vec<f64>],
) -> Result<(), ScrubError> {
    let n = columns.len() as f64;
    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 24))
        .margin(30)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..n, 0f64..n)
        .map_err(render_err)?;
    let formatter = |x: &f64| {
        columns
            .get(x.floor() as usize)
            .cloned()
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(columns.len())
        .y_labels(columns.len())
        .x_label_formatter(&formatter)
        .y_label_formatter(&formatter)
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(values.iter().enumerate().flat_map(|(i, row)| {
            row.iter().enumerate().map(move |(j, &v)| {
                Rectangle::new(
                    [(j as f64, i as f64), (j as f64 + 1.0, i as f64 + 1.0)],
                    heat_color(v).filled(),
                )
            })
        }))
        .map_err(render_err)?;
    // Value annotation in the middle of every cell.
    chart
        .draw_series(values.iter().enumerate().flat_map(|(i, row)| {
            row.iter().enumerate().map(move |(j, &v)| {
                let label = if v.is_nan() {
                    String::new()
                } else {
                    format!("{v:.2}")
                };
                Text::new(
                    label,
                    (j as f64 + 0.35, i as f64 + 0.5),
                    ("sans-serif", 14).into_font(),
                )
            })
        }))
        .map_err(render_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::{ChartKind, ChartRequest, build_spec};
    use polars::prelude::*;

    fn sample() -> DataFrame {
        df!(
            "cat" => &["a", "a", "b", "b"],
            "x" => &[1.0, 2.0, 3.0, 4.0],
            "y" => &[10.0, 20.0, 15.0, 30.0],
        )
        .unwrap()
    }

    fn render(kind: ChartKind, request: ChartRequest) -> Vec<u8> {
        let spec = build_spec(&sample(), kind, &request).unwrap();
        PlottersBackend::new(300, 200).render(&spec).unwrap()
    }

    fn assert_png(bytes: &[u8]) {
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
        let img = image::load_from_memory(bytes).unwrap();
        assert_eq!(img.width(), 300);
        assert_eq!(img.height(), 200);
    }

    #[test]
    fn every_chart_kind_encodes_png() {
        assert_png(&render(
            ChartKind::Bar,
            ChartRequest {
                x: Some("cat".to_string()),
                y: vec!["x".to_string(), "y".to_string()],
                ..ChartRequest::default()
            },
        ));
        assert_png(&render(
            ChartKind::Pie,
            ChartRequest {
                labels: Some("cat".to_string()),
                values: Some("y".to_string()),
                ..ChartRequest::default()
            },
        ));
        assert_png(&render(
            ChartKind::Histogram,
            ChartRequest {
                y: vec!["y".to_string()],
                bins: Some(5),
                ..ChartRequest::default()
            },
        ));
        assert_png(&render(
            ChartKind::Box,
            ChartRequest {
                y: vec!["x".to_string(), "y".to_string()],
                ..ChartRequest::default()
            },
        ));
        assert_png(&render(
            ChartKind::Scatter,
            ChartRequest {
                x: Some("x".to_string()),
                y: vec!["y".to_string()],
                hue: Some("cat".to_string()),
                ..ChartRequest::default()
            },
        ));
        assert_png(&render(ChartKind::Heatmap, ChartRequest::default()));
    }

    #[test]
    fn heat_color_endpoints() {
        assert_eq!(heat_color(1.0), RGBColor(255, 0, 0));
        assert_eq!(heat_color(-1.0), RGBColor(0, 0, 255));
        assert_eq!(heat_color(0.0), RGBColor(255, 255, 255));
    }

    #[test]
    fn degenerate_range_padding() {
        assert_eq!(padded([5.0, 5.0].into_iter()), (4.5, 5.5));
        assert_eq!(padded(std::iter::empty()), (0.0, 1.0));
    }
}
