//! Storage errors
//!
//! Faults of the libsql layer only. Domain outcomes (missing page, cycle,
//! locked page) are `PageServiceError` variants; a `DatabaseError` reaches
//! callers wrapped in `PageServiceError::StorageUnavailable`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The database file could not be opened
    #[error("Cannot open page database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Schema or index creation failed at startup
    #[error("Page schema setup failed: {0}")]
    InitializationFailed(String),

    #[error("Permission denied creating database directory for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Cannot create database directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("libsql error: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// A statement failed; `context` names the statement
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A stored row could not be decoded into a model
    #[error("Invalid row data: {context}")]
    InvalidRow { context: String },
}

impl DatabaseError {
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn invalid_row(context: impl Into<String>) -> Self {
        Self::InvalidRow {
            context: context.into(),
        }
    }
}

/// `.sql_context("Failed to …")` on libsql results
pub(crate) trait SqlContext<T> {
    fn sql_context(self, what: &str) -> Result<T, DatabaseError>;
}

impl<T> SqlContext<T> for Result<T, libsql::Error> {
    fn sql_context(self, what: &str) -> Result<T, DatabaseError> {
        self.map_err(|e| DatabaseError::sql_execution(format!("{}: {}", what, e)))
    }
}
