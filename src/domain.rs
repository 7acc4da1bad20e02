use polars::error::PolarsError;
use std::fmt;
use std::io::Error;

/// Error taxonomy for the session engine. Every failure is caught at the
/// smallest enclosing section and rendered as a message, so Display text is
/// user facing.
#[derive(Debug)]
pub enum ScrubError {
    /// Connector or file loading failure; session continues with no table.
    Source(String),
    /// Uploaded/decoded bytes were malformed.
    Format(String),
    /// Stale reference to a dropped or renamed column.
    ColumnNotFound(String),
    /// Operation applied to a column of an incompatible kind.
    TypeMismatch { column: String, expected: String },
    /// Atomic type conversion failure, column left unchanged.
    Conversion { column: String, reason: String },
    /// Chart or step preconditions unmet; the action is skipped.
    Validation(String),
    /// Chart rendering collaborator failure.
    Render(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
    IoError(Error),
    PolarsError(PolarsError),
}

impl fmt::Display for ScrubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrubError::Source(msg) => write!(f, "Source error: {msg}"),
            ScrubError::Format(msg) => write!(f, "Format error: {msg}"),
            ScrubError::ColumnNotFound(name) => write!(f, "Column \"{name}\" not found"),
            ScrubError::TypeMismatch { column, expected } => {
                write!(f, "Column \"{column}\" is not {expected}")
            }
            ScrubError::Conversion { column, reason } => {
                write!(f, "Conversion of \"{column}\" failed: {reason}")
            }
            ScrubError::Validation(msg) => write!(f, "{msg}"),
            ScrubError::Render(msg) => write!(f, "Chart rendering failed: {msg}"),
            ScrubError::FileNotFound => write!(f, "File not found"),
            ScrubError::PermissionDenied => write!(f, "Permission denied"),
            ScrubError::UnknownFileType => write!(f, "Unknown file type"),
            ScrubError::IoError(e) => write!(f, "IO error: {e}"),
            ScrubError::PolarsError(e) => write!(f, "{e}"),
        }
    }
}

impl From<Error> for ScrubError {
    fn from(err: Error) -> Self {
        ScrubError::IoError(err)
    }
}

impl From<PolarsError> for ScrubError {
    fn from(err: PolarsError) -> Self {
        ScrubError::PolarsError(err)
    }
}

#[derive(Debug, Clone)]
pub struct ScrubConfig {
    pub event_poll_time: u64,
    /// Rows shown in the table preview of the view model.
    pub preview_rows: usize,
    /// Columns shown in the table preview of the view model.
    pub preview_columns: usize,
    /// Pixel size of generated charts.
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        ScrubConfig {
            event_poll_time: 100,
            preview_rows: 30,
            preview_columns: 12,
            chart_width: 900,
            chart_height: 600,
        }
    }
}

pub const HELP_TEXT: &str = "scrub - explore, clean and chart tabular data

Keys
  q           quit
  ?           this help (press again to close)
  h / t       head / tail (first / last 5 rows)
  s           shape
  d           describe
  i           column info
  m           missing value counts
  v           view current table
  f           toggle the filter section
  c           open the cleaning section
  :           enter a command

Commands
  load PATH
  filter COL VALUE            basic equality filter (view only)
  range COL MIN MAX           inclusive range filter (view only)
  keep COL V1,V2,..           membership filter (view only)
  impute COL mean|median|mode
  impute COL const VALUE
  convert COL int|float|str|datetime|cat
  dropcols C1,C2,..
  droprows I1,I2,..
  rename OLD NEW
  reindex reset | reindex set COL
  chart bar X=COL Y=C1,C2,..
  chart pie LABELS=COL VALUES=COL
  chart hist COLS=C1,C2 BINS=N
  chart box COLS=C1,C2
  chart scatter X=COL Y=COL [HUE=COL]
  chart heatmap
  hide filter|cleaning|CHART
  save PATH                   write the last generated chart
";
