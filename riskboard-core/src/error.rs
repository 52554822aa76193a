//! Error taxonomy for a riskboard run
//!
//! Only fatal conditions are errors. Per-row problems are [`RowIssue`]s carried
//! by the load result, and per-chart problems are [`RenderSkip`]s carried by the
//! run summary; neither aborts sibling work.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Any of these aborts the run before a chart is written.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Input file unreadable or a required column is missing.
    #[error("data format error in {}: {message}", path.display())]
    DataFormat { path: PathBuf, message: String },

    /// Unknown plot type, malformed grouping rule, or unreadable config file.
    #[error("configuration error: {0}")]
    Config(String),

    /// Output directory or file could not be written.
    #[error("output error at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl ReportError {
    pub fn data_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ReportError::DataFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ReportError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReportError::Config(_) => 1,
            ReportError::DataFormat { .. } => 2,
            ReportError::Io { .. } => 4,
        }
    }
}

impl From<anyhow::Error> for ReportError {
    fn from(value: anyhow::Error) -> Self {
        ReportError::Config(format!("{:#}", value))
    }
}

/// A recoverable parse problem with a single CSV row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    /// 1-based line number in the file (header is line 1).
    pub line: usize,
    pub field: String,
    pub message: String,
    /// True when the row was dropped, false when only the field was coerced.
    pub dropped: bool,
}

/// A chart that could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSkip {
    pub node: String,
    pub unit: String,
    pub reason: String,
}

pub type ReportResult<T> = Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        assert_eq!(ReportError::Config("x".into()).exit_code(), 1);
        assert_eq!(ReportError::data_format("a.csv", "missing").exit_code(), 2);
        assert_eq!(ReportError::io("out", "denied").exit_code(), 4);
    }

    #[test]
    fn test_anyhow_context_is_preserved_in_config_error() {
        let err = anyhow::anyhow!("inner").context("outer");
        let converted: ReportError = err.into();
        let text = converted.to_string();
        assert!(text.contains("outer"));
        assert!(text.contains("inner"));
    }
}
