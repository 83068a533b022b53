//! Error types for the ingestion pipeline and the read side.

use thiserror::Error;

/// Failures talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Deadline and availability failures are worth another attempt; everything
    /// else (bad payloads, constraint violations) fails the same way twice.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_) | Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::DeadlineExceeded(err.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) => match db.code().as_deref() {
                // query_canceled (statement_timeout)
                Some("57014") => StoreError::DeadlineExceeded(db.to_string()),
                // serialization_failure, deadlock_detected, too_many_connections,
                // connection_failure, admin/crash shutdown
                Some("40001" | "40P01" | "53300" | "08006" | "57P01" | "57P02") => {
                    StoreError::Unavailable(db.to_string())
                }
                _ => StoreError::Database(db.to_string()),
            },
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Whole-workbook failures. Sheet-level problems are reported per sheet instead.
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("Empty file stream")]
    EmptyStream,

    #[error("Failed to read Excel file: {0}")]
    Unreadable(String),

    #[error("Workbook contains no sheets")]
    NoSheets,

    #[error("Failed to persist analysis: {0}")]
    Storage(#[from] StoreError),

    #[error("Sheet processing task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Reasons a single sheet is skipped. Siblings keep processing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    #[error("Empty sheet or no columns detected")]
    Empty,

    #[error("{column} column not found or unmapped. Found: {found:?}")]
    MissingColumn { column: String, found: Vec<String> },

    #[error("Failed to read sheet: {0}")]
    Unreadable(String),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No data found for doc_id {0}")]
    NotFound(String),

    #[error("Unsupported group_by '{0}', expected 'operator' or 'airport'")]
    InvalidGroupBy(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("No data found for doc_id {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to build report workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} env var missing")]
    Missing(&'static str),

    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}
