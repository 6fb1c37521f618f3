use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when a
/// report is ingested, reconciled, or emitted.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when a JSON profile file cannot be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when the uploaded workbook has no readable sheet or no rows.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when none of the profile's sourced columns could be located.
    #[error("no columns of profile '{profile}' matched the header row {header_row}")]
    NoColumnsMatched { profile: String, header_row: usize },

    /// Raised when a profile name is not one of the built-in profiles.
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    /// Raised when a profile references columns it does not declare.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
