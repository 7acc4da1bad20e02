use polars::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::cleaning::{self, ConvertTarget, ImputeMethod, ReindexAction};
use crate::dataset::{self, DatasetHandle};
use crate::domain::{ScrubConfig, ScrubError};
use crate::filter::{self, FilterSpec};
use crate::inspect;
use crate::render::PlottersBackend;
use crate::source::{FileDecoder, SourceConnector};
use crate::toggles::ToggleStateStore;
use crate::viz::{self, ChartKind, ChartRequest, DownloadArtifact, RenderBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Empty,
    Ready,
    Quitting,
}

/// The UI section a notice belongs to. A failure in one section never
/// aborts the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Source,
    Inspect,
    Filter,
    Cleaning,
    Visualization,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub section: Section,
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectAction {
    Head,
    Tail,
    Shape,
    Describe,
    Info,
    Missing,
    View,
}

/// One user interaction. Every interaction maps to exactly one event; the
/// reducer is the whole update path, there is no other way to reach the
/// table or the toggles.
#[derive(Debug, Clone)]
pub enum Event {
    LoadPath(PathBuf),
    LoadBytes { name: String, bytes: Vec<u8> },
    Inspect(InspectAction),
    ToggleFilter,
    HideFilter,
    ApplyFilter(FilterSpec),
    ShowCleaning,
    HideCleaning,
    Impute { column: String, method: ImputeMethod },
    Convert { column: String, target: ConvertTarget },
    FilterRows(FilterSpec),
    Drop { columns: Vec<String>, rows: Vec<usize> },
    Rename { old: String, new: String },
    Reindex(ReindexAction),
    HideChart(ChartKind),
    GenerateChart { kind: ChartKind, request: ChartRequest },
    SaveChart(PathBuf),
    /// A command line that failed to parse; surfaces as a notice.
    CommandError(String),
    Help,
    Quit,
}

/// What the preview pane currently shows: the live table or a derived,
/// disposable view. Any table mutation falls back to the live table since
/// derived views go stale.
enum ActiveView {
    Table,
    Derived { title: String, frame: DataFrame },
    Summary { title: String, headers: Vec<String>, rows: Vec<Vec<String>> },
}

/// Session state: the only values surviving between interactions are the
/// dataset handle and the toggle store; the rest of the view model is a
/// pure projection rebuilt on demand. One value per session; sessions share
/// nothing.
pub struct Session {
    config: ScrubConfig,
    pub status: Status,
    dataset: DatasetHandle,
    toggles: ToggleStateStore,
    view: ActiveView,
    notices: Vec<Notice>,
    download: Option<DownloadArtifact>,
    show_help: bool,
    renderer: Box<dyn RenderBackend>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewModel {
    pub table_name: String,
    pub shape: Option<(usize, usize)>,
    pub view_title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub filter_visible: bool,
    pub cleaning_visible: bool,
    pub hidden_charts: Vec<&'static str>,
    pub notices: Vec<Notice>,
    pub status_line: String,
    pub download_name: Option<String>,
    pub show_help: bool,
}

const NULL_MARKER: &str = "∅";

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.2}"),
        None => String::new(),
    }
}

/// String grid of a frame capped to the preview size, nulls rendered with
/// the same marker everywhere.
fn grid(
    frame: &DataFrame,
    max_rows: usize,
    max_cols: usize,
) -> Result<(Vec<String>, Vec<Vec<String>>), ScrubError> {
    let ncols = frame.width().min(max_cols);
    let nrows = frame.height().min(max_rows);
    let mut headers = Vec::with_capacity(ncols);
    let mut columns: Vec<Vec<String>> = Vec::with_capacity(ncols);
    for column in frame.get_columns().iter().take(ncols) {
        headers.push(column.name().to_string());
        let rendered = column.as_materialized_series().cast(&DataType::String)?;
        let ca = rendered.str()?;
        columns.push(
            ca.into_iter()
                .take(nrows)
                .map(|v| {
                    v.map(|s| s.replace('\n', " ↵ "))
                        .unwrap_or_else(|| NULL_MARKER.to_string())
                })
                .collect(),
        );
    }
    let rows = (0..nrows)
        .map(|r| columns.iter().map(|c| c[r].clone()).collect())
        .collect();
    Ok((headers, rows))
}

impl Session {
    pub fn new(config: ScrubConfig) -> Self {
        let renderer = Box::new(PlottersBackend::new(config.chart_width, config.chart_height));
        Session::with_renderer(config, renderer)
    }

    pub fn with_renderer(config: ScrubConfig, renderer: Box<dyn RenderBackend>) -> Self {
        Session {
            config,
            status: Status::Empty,
            dataset: DatasetHandle::empty(),
            toggles: ToggleStateStore::default(),
            view: ActiveView::Table,
            notices: Vec::new(),
            download: None,
            show_help: false,
            renderer,
        }
    }

    pub fn dataset(&self) -> &DatasetHandle {
        &self.dataset
    }

    pub fn download(&self) -> Option<&DownloadArtifact> {
        self.download.as_ref()
    }

    /// Loads a table through a connector collaborator; same replacement
    /// semantics as the file paths.
    pub fn load_from_connector(
        &mut self,
        connector: &dyn SourceConnector,
        schema: &str,
        table: &str,
    ) -> Result<(), ScrubError> {
        let frame = connector.fetch(schema, table)?;
        self.install(format!("{schema}.{table}"), frame)
    }

    /// Loads a table through a decoder collaborator (the upload path).
    pub fn load_from_decoder(
        &mut self,
        decoder: &dyn FileDecoder,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), ScrubError> {
        let frame = decoder.decode(bytes)?;
        self.install(name.to_string(), frame)
    }

    fn install(&mut self, name: String, frame: DataFrame) -> Result<(), ScrubError> {
        let shape = (frame.height(), frame.width());
        self.dataset.replace(name, frame)?;
        // Toggles keyed against the previous schema fall back to defaults.
        self.toggles.reset();
        self.view = ActiveView::Table;
        self.status = Status::Ready;
        self.notify(
            Section::Source,
            format!("Loaded {} rows, {} columns", shape.0, shape.1),
        );
        Ok(())
    }

    fn notify(&mut self, section: Section, text: impl Into<String>) {
        self.notices.push(Notice {
            section,
            text: text.into(),
            is_error: false,
        });
    }

    fn fail(&mut self, section: Section, err: ScrubError) {
        debug!("Section {section:?} failed: {err}");
        self.notices.push(Notice {
            section,
            text: err.to_string(),
            is_error: true,
        });
    }

    /// The reducer. One event per interaction cycle; failures are caught at
    /// the owning section and rendered as notices, never propagated.
    pub fn apply(&mut self, event: Event) {
        self.notices.clear();
        let (section, result) = self.dispatch(event);
        if let Err(err) = result {
            self.fail(section, err);
        }
    }

    fn dispatch(&mut self, event: Event) -> (Section, Result<(), ScrubError>) {
        match event {
            Event::Quit => {
                self.status = Status::Quitting;
                (Section::Source, Ok(()))
            }
            Event::Help => {
                self.show_help = !self.show_help;
                (Section::Source, Ok(()))
            }
            Event::LoadPath(path) => {
                let result = dataset::load_path(&path)
                    .and_then(|(name, frame)| self.install(name, frame));
                (Section::Source, result)
            }
            Event::LoadBytes { name, bytes } => {
                let result = self.load_from_decoder(&crate::source::CsvDecoder, &name, &bytes);
                (Section::Source, result)
            }
            Event::Inspect(action) => (Section::Inspect, self.inspect(action)),
            Event::ToggleFilter => {
                self.toggles.toggle_filter();
                (Section::Filter, Ok(()))
            }
            Event::HideFilter => {
                self.toggles.hide_filter();
                (Section::Filter, Ok(()))
            }
            Event::ApplyFilter(spec) => (Section::Filter, self.apply_filter(spec, Section::Filter)),
            Event::ShowCleaning => {
                self.toggles.show_cleaning();
                (Section::Cleaning, Ok(()))
            }
            Event::HideCleaning => {
                self.toggles.hide_cleaning();
                (Section::Cleaning, Ok(()))
            }
            Event::Impute { column, method } => (Section::Cleaning, self.impute(&column, &method)),
            Event::Convert { column, target } => (Section::Cleaning, self.convert(&column, target)),
            Event::FilterRows(spec) => {
                (Section::Cleaning, self.apply_filter(spec, Section::Cleaning))
            }
            Event::Drop { columns, rows } => (Section::Cleaning, self.remove(&columns, &rows)),
            Event::Rename { old, new } => (Section::Cleaning, self.rename(&old, &new)),
            Event::Reindex(action) => (Section::Cleaning, self.reindex(action)),
            Event::HideChart(kind) => {
                self.toggles.hide_chart(kind);
                (Section::Visualization, Ok(()))
            }
            Event::GenerateChart { kind, request } => {
                (Section::Visualization, self.generate_chart(kind, &request))
            }
            Event::SaveChart(path) => (Section::Visualization, self.save_chart(&path)),
            Event::CommandError(msg) => (Section::Source, Err(ScrubError::Validation(msg))),
        }
    }

    fn inspect(&mut self, action: InspectAction) -> Result<(), ScrubError> {
        let frame = self.dataset.table()?;
        match action {
            InspectAction::Head => {
                self.view = ActiveView::Derived {
                    title: "First 5 Rows".to_string(),
                    frame: inspect::head(frame),
                };
            }
            InspectAction::Tail => {
                self.view = ActiveView::Derived {
                    title: "Last 5 Rows".to_string(),
                    frame: inspect::tail(frame),
                };
            }
            InspectAction::Shape => {
                let (rows, cols) = inspect::shape(frame);
                self.notify(Section::Inspect, format!("{rows} rows × {cols} columns"));
            }
            InspectAction::Describe => {
                let summaries = inspect::describe(frame)?;
                let headers = vec![
                    "column", "kind", "count", "null", "mean", "std", "min", "25%", "50%", "75%",
                    "max",
                ]
                .into_iter()
                .map(String::from)
                .collect();
                let rows = summaries
                    .into_iter()
                    .map(|s| {
                        vec![
                            s.name,
                            s.kind.as_str().to_string(),
                            s.count.to_string(),
                            s.null_count.to_string(),
                            fmt_opt(s.mean),
                            fmt_opt(s.std),
                            fmt_opt(s.min),
                            fmt_opt(s.q25),
                            fmt_opt(s.median),
                            fmt_opt(s.q75),
                            fmt_opt(s.max),
                        ]
                    })
                    .collect();
                self.view = ActiveView::Summary {
                    title: "Statistical Summary".to_string(),
                    headers,
                    rows,
                };
            }
            InspectAction::Info => {
                let rows = inspect::info(frame)
                    .into_iter()
                    .map(|i| {
                        vec![
                            i.name,
                            i.kind.as_str().to_string(),
                            i.dtype,
                            i.non_null.to_string(),
                        ]
                    })
                    .collect();
                self.view = ActiveView::Summary {
                    title: "Info".to_string(),
                    headers: vec!["column", "kind", "dtype", "non-null"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    rows,
                };
            }
            InspectAction::Missing => {
                let missing = inspect::missing(frame);
                if missing.is_empty() {
                    self.notify(Section::Inspect, "No missing values in your data");
                } else {
                    self.view = ActiveView::Summary {
                        title: "Missing Values".to_string(),
                        headers: vec!["column".to_string(), "missing".to_string()],
                        rows: missing
                            .into_iter()
                            .map(|(name, n)| vec![name, n.to_string()])
                            .collect(),
                    };
                }
            }
            InspectAction::View => {
                self.view = ActiveView::Table;
            }
        }
        Ok(())
    }

    fn apply_filter(&mut self, spec: FilterSpec, section: Section) -> Result<(), ScrubError> {
        let frame = self.dataset.table()?;
        let view = filter::apply(frame, &spec)?;
        let matched = view.height();
        self.view = ActiveView::Derived {
            title: format!("F[{}]", self.dataset.name()),
            frame: view,
        };
        self.notify(section, format!("Filter matched {matched} rows"));
        Ok(())
    }

    fn impute(&mut self, column: &str, method: &ImputeMethod) -> Result<(), ScrubError> {
        // Imputation only targets columns that are missing values right now.
        let missing = self.dataset.columns_with_missing()?;
        if !missing.iter().any(|c| c == column) {
            // Distinguish a stale column name from a clean column.
            self.dataset.kind_of(column)?;
            return Err(ScrubError::Validation(format!(
                "column \"{column}\" has no missing values"
            )));
        }
        let candidate = cleaning::impute(self.dataset.table()?, column, method)?;
        self.dataset.commit(candidate);
        self.view = ActiveView::Table;
        self.notify(
            Section::Cleaning,
            format!("Missing values in \"{column}\" filled"),
        );
        Ok(())
    }

    fn convert(&mut self, column: &str, target: ConvertTarget) -> Result<(), ScrubError> {
        let candidate = cleaning::convert(self.dataset.table()?, column, target)?;
        self.dataset.commit(candidate);
        self.view = ActiveView::Table;
        self.notify(Section::Cleaning, format!("Converted \"{column}\""));
        Ok(())
    }

    fn remove(&mut self, columns: &[String], rows: &[usize]) -> Result<(), ScrubError> {
        let frame = self.dataset.table()?;
        let keep = cleaning::keep_indices(frame.height(), rows)?;
        let candidate = cleaning::drop(frame, columns, rows)?;
        self.dataset.commit(candidate);
        // Keep the promoted row identity aligned with the surviving rows.
        self.dataset.retain_index_rows(&keep)?;
        self.view = ActiveView::Table;
        self.notify(
            Section::Cleaning,
            format!("Dropped {} columns, {} rows", columns.len(), rows.len()),
        );
        Ok(())
    }

    fn rename(&mut self, old: &str, new: &str) -> Result<(), ScrubError> {
        let candidate = cleaning::rename(self.dataset.table()?, old, new)?;
        self.dataset.commit(candidate);
        self.view = ActiveView::Table;
        self.notify(Section::Cleaning, format!("Renamed \"{old}\" to \"{new}\""));
        Ok(())
    }

    fn reindex(&mut self, action: ReindexAction) -> Result<(), ScrubError> {
        match action {
            ReindexAction::Reset => {
                self.dataset.table()?;
                self.dataset.reindex_reset();
                self.notify(Section::Cleaning, "Index reset");
            }
            ReindexAction::Set(column) => {
                self.dataset.reindex_set(&column)?;
                self.notify(Section::Cleaning, format!("Set \"{column}\" as index"));
            }
        }
        self.view = ActiveView::Table;
        Ok(())
    }

    fn generate_chart(&mut self, kind: ChartKind, request: &ChartRequest) -> Result<(), ScrubError> {
        if self.toggles.chart_hidden(kind) {
            return Err(ScrubError::Validation(format!(
                "{} section is hidden; reselect the chart to show it again",
                kind.as_str()
            )));
        }
        let spec = viz::build_spec(self.dataset.table()?, kind, request)?;
        let bytes = self.renderer.render(&spec)?;
        let artifact = viz::artifact(kind, bytes);
        info!("Generated {} ({})", kind.as_str(), artifact.file_name);
        self.notify(
            Section::Visualization,
            format!("Generated {} ({})", kind.as_str(), artifact.file_name),
        );
        self.download = Some(artifact);
        Ok(())
    }

    fn save_chart(&mut self, path: &std::path::Path) -> Result<(), ScrubError> {
        let artifact = self.download.as_ref().ok_or_else(|| {
            ScrubError::Validation("no generated chart to save".to_string())
        })?;
        std::fs::write(path, &artifact.bytes)?;
        self.notify(
            Section::Visualization,
            format!("Saved chart to {}", path.display()),
        );
        Ok(())
    }

    /// Pure projection of the current display state. Calling it any number
    /// of times with unchanged state yields the same view model.
    pub fn view(&self) -> ViewModel {
        let mut model = ViewModel {
            table_name: self.dataset.name().to_string(),
            filter_visible: self.toggles.filter_visible(),
            cleaning_visible: self.toggles.cleaning_visible(),
            hidden_charts: ChartKind::ALL
                .iter()
                .filter(|k| self.toggles.chart_hidden(**k))
                .map(|k| k.as_str())
                .collect(),
            notices: self.notices.clone(),
            download_name: self.download.as_ref().map(|d| d.file_name.clone()),
            show_help: self.show_help,
            ..ViewModel::default()
        };
        model.status_line = match self.notices.last() {
            Some(notice) => notice.text.clone(),
            None if self.dataset.is_loaded() => "Ready".to_string(),
            None => "No table loaded".to_string(),
        };

        let Ok(frame) = self.dataset.table() else {
            model.view_title = "No data".to_string();
            return model;
        };
        model.shape = Some(inspect::shape(frame));

        let projected = match &self.view {
            ActiveView::Table => {
                model.view_title = self.dataset.name().to_string();
                self.table_grid(frame)
            }
            ActiveView::Derived { title, frame } => {
                model.view_title = title.clone();
                model.total_rows = frame.height();
                grid(frame, self.config.preview_rows, self.config.preview_columns)
            }
            ActiveView::Summary { title, headers, rows } => {
                model.view_title = title.clone();
                model.total_rows = rows.len();
                Ok((headers.clone(), rows.clone()))
            }
        };
        match projected {
            Ok((headers, rows)) => {
                model.headers = headers;
                model.rows = rows;
            }
            Err(err) => {
                model.status_line = err.to_string();
            }
        }
        if matches!(self.view, ActiveView::Table) {
            model.total_rows = frame.height();
        }
        model
    }

    /// Live table grid with the row identity prepended: the promoted index
    /// column when one is set, the implicit 0..N-1 numbering otherwise.
    fn table_grid(&self, frame: &DataFrame) -> Result<(Vec<String>, Vec<Vec<String>>), ScrubError> {
        let (mut headers, mut rows) =
            grid(frame, self.config.preview_rows, self.config.preview_columns)?;
        let label;
        let ids: Vec<String> = match self.dataset.index() {
            Some(series) => {
                label = series.name().to_string();
                let rendered = series.cast(&DataType::String)?;
                rendered
                    .str()?
                    .into_iter()
                    .take(rows.len())
                    .map(|v| v.map(String::from).unwrap_or_else(|| NULL_MARKER.to_string()))
                    .collect()
            }
            None => {
                label = String::new();
                (0..rows.len()).map(|i| i.to_string()).collect()
            }
        };
        headers.insert(0, label);
        for (row, id) in rows.iter_mut().zip(ids) {
            row.insert(0, id);
        }
        Ok((headers, rows))
    }
}
