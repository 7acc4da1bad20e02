use polars::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::ScrubError;

#[derive(Debug)]
enum FileType {
    Csv,
    Parquet,
    Arrow,
}

/// Column kind resolved once from the polars dtype and dispatched by pattern
/// matching, instead of ad-hoc dtype checks scattered over the call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    Categorical,
    Datetime,
    Boolean,
    Other,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    /// Kinds treated as categorical by filters and chart role validation.
    pub fn is_categorical(self) -> bool {
        matches!(self, ColumnKind::Text | ColumnKind::Categorical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Text => "text",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Datetime => "datetime",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Other => "other",
        }
    }
}

pub fn column_kind(dtype: &DataType) -> ColumnKind {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnKind::Integer,
        DataType::Float32 | DataType::Float64 => ColumnKind::Float,
        DataType::String => ColumnKind::Text,
        DataType::Categorical(..) => ColumnKind::Categorical,
        DataType::Date | DataType::Datetime(..) => ColumnKind::Datetime,
        DataType::Boolean => ColumnKind::Boolean,
        _ => ColumnKind::Other,
    }
}

/// Owner of the single mutable table of a session. Every mutation passes
/// through this handle so exactly one table instance exists per session;
/// cleaning steps build a full candidate frame and `commit` swaps it in,
/// which keeps each step atomic.
pub struct DatasetHandle {
    name: String,
    frame: Option<DataFrame>,
    /// Column promoted to the row-identity role by `reindex set`.
    index: Option<Series>,
}

impl DatasetHandle {
    pub fn empty() -> Self {
        DatasetHandle {
            name: String::new(),
            frame: None,
            index: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.frame.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs a new table, replacing any previous one and discarding the
    /// promoted index of the old schema.
    pub fn replace(&mut self, name: impl Into<String>, frame: DataFrame) -> Result<(), ScrubError> {
        if frame.width() == 0 {
            return Err(ScrubError::Source("table has no columns".to_string()));
        }
        self.name = name.into();
        self.index = None;
        info!(
            "Loaded table \"{}\": {} rows, {} columns",
            self.name,
            frame.height(),
            frame.width()
        );
        self.frame = Some(frame);
        Ok(())
    }

    pub fn table(&self) -> Result<&DataFrame, ScrubError> {
        self.frame
            .as_ref()
            .ok_or_else(|| ScrubError::Source("no table loaded".to_string()))
    }

    /// Atomic swap used by every mutating cleaning step. The caller builds
    /// the full candidate frame first; a failed step never reaches here.
    pub fn commit(&mut self, frame: DataFrame) {
        debug!(
            "Committed table mutation: {} rows, {} columns",
            frame.height(),
            frame.width()
        );
        self.frame = Some(frame);
    }

    pub fn index(&self) -> Option<&Series> {
        self.index.as_ref()
    }

    /// `reindex reset`: discard the promoted row identity; rows are numbered
    /// 0..N-1 implicitly. Applying it twice is a no-op.
    pub fn reindex_reset(&mut self) {
        self.index = None;
    }

    /// `reindex set COL`: promote a column to the row-identity role, removing
    /// it from the regular column set. A previously promoted column is
    /// discarded, not restored.
    pub fn reindex_set(&mut self, column: &str) -> Result<(), ScrubError> {
        let frame = self.table()?;
        let series = frame
            .column(column)
            .map_err(|_| ScrubError::ColumnNotFound(column.to_string()))?
            .as_materialized_series()
            .clone();
        let remaining = frame.drop(column)?;
        if remaining.width() == 0 {
            return Err(ScrubError::Validation(
                "cannot promote the only remaining column to the index".to_string(),
            ));
        }
        self.frame = Some(remaining);
        self.index = Some(series);
        Ok(())
    }

    /// Subsets the promoted index to the surviving rows after a positional
    /// row drop. No-op when no column is promoted.
    pub fn retain_index_rows(&mut self, keep: &UInt32Chunked) -> Result<(), ScrubError> {
        if let Some(series) = &self.index {
            self.index = Some(series.take(keep)?);
        }
        Ok(())
    }

    pub fn kind_of(&self, column: &str) -> Result<ColumnKind, ScrubError> {
        let frame = self.table()?;
        let col = frame
            .column(column)
            .map_err(|_| ScrubError::ColumnNotFound(column.to_string()))?;
        Ok(column_kind(col.dtype()))
    }

    /// Null counts per column, recomputed on every call (never cached, so a
    /// prior cleaning step is always reflected).
    pub fn missing_counts(&self) -> Result<Vec<(String, usize)>, ScrubError> {
        let frame = self.table()?;
        Ok(frame
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.null_count()))
            .collect())
    }

    /// Columns currently containing at least one missing value; the only
    /// columns imputation is allowed to target.
    pub fn columns_with_missing(&self) -> Result<Vec<String>, ScrubError> {
        Ok(self
            .missing_counts()?
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(name, _)| name)
            .collect())
    }
}

fn detect_file_type(path: &Path) -> Result<FileType, ScrubError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(FileType::Csv),
        Some("PARQUET") | Some("PQ") => Ok(FileType::Parquet),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::Arrow),
        _ => Err(ScrubError::UnknownFileType),
    }
}

fn scan_csv(path: &PathBuf) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.as_path().into()))
        .with_has_header(true)
        .finish()
}

fn scan_parquet(path: &PathBuf) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(
        PlPath::Local(path.as_path().into()),
        ScanArgsParquet::default(),
    )
}

fn scan_arrow(path: &PathBuf) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.as_path().into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

/// Loads a table from a local file, returning its display name and frame.
pub fn load_path(path: &Path) -> Result<(String, DataFrame), ScrubError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ScrubError::FileNotFound,
        ErrorKind::PermissionDenied => ScrubError::PermissionDenied,
        _ => ScrubError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(ScrubError::Source("not a file".to_string()));
    }

    let path_buf = path.to_path_buf();
    let lazy = match detect_file_type(path)? {
        FileType::Csv => scan_csv(&path_buf),
        FileType::Parquet => scan_parquet(&path_buf),
        FileType::Arrow => scan_arrow(&path_buf),
    }
    .map_err(|e| ScrubError::Source(e.to_string()))?;

    let frame = lazy
        .collect()
        .map_err(|e| ScrubError::Source(e.to_string()))?;
    if frame.width() == 0 {
        return Err(ScrubError::Source("file yields zero columns".to_string()));
    }

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("???")
        .to_string();
    Ok((name, frame))
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
    fn replace_rejects_zero_columns() {
        let mut handle = DatasetHandle::empty();
        let empty = DataFrame::empty();
        assert!(matches!(
            handle.replace("x", empty),
            Err(ScrubError::Source(_))
        ));
        assert!(!handle.is_loaded());
    }

    #[test]
    fn missing_counts_recomputed() {
        let mut handle = DatasetHandle::empty();
        handle.replace("t", sample()).unwrap();
        assert_eq!(handle.columns_with_missing().unwrap(), vec!["val"]);

        let filled = df!(
            "id" => &[1i64, 2, 3],
            "cat" => &["a", "a", "b"],
            "val" => &[10.0, 20.0, 15.0],
        )
        .unwrap();
        handle.commit(filled);
        assert!(handle.columns_with_missing().unwrap().is_empty());
    }

    #[test]
    fn reindex_set_promotes_and_removes_column() {
        let mut handle = DatasetHandle::empty();
        handle.replace("t", sample()).unwrap();
        handle.reindex_set("id").unwrap();
        assert!(handle.table().unwrap().column("id").is_err());
        assert_eq!(handle.index().unwrap().len(), 3);

        // Reset discards the promoted identity and is idempotent.
        handle.reindex_reset();
        assert!(handle.index().is_none());
        handle.reindex_reset();
        assert!(handle.index().is_none());
    }

    #[test]
    fn reindex_set_unknown_column_fails() {
        let mut handle = DatasetHandle::empty();
        handle.replace("t", sample()).unwrap();
        assert!(matches!(
            handle.reindex_set("nope"),
            Err(ScrubError::ColumnNotFound(_))
        ));
        // Table untouched by the failed step.
        assert_eq!(handle.table().unwrap().width(), 3);
    }

    #[test]
    fn column_kinds() {
        let mut handle = DatasetHandle::empty();
        handle.replace("t", sample()).unwrap();
        assert_eq!(handle.kind_of("id").unwrap(), ColumnKind::Integer);
        assert_eq!(handle.kind_of("cat").unwrap(), ColumnKind::Text);
        assert_eq!(handle.kind_of("val").unwrap(), ColumnKind::Float);
        assert!(handle.kind_of("cat").unwrap().is_categorical());
        assert!(handle.kind_of("val").unwrap().is_numeric());
    }
}
