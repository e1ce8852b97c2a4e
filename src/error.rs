//! Error types for tmmigrate
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, invalid config, unusable source database)
//! - 4: Operation failed (database, lookup service, filesystem)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the tmmigrate CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for migration operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Source database not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Source database is missing table '{0}'")]
    MissingTable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid tile {x},{y} at zoom {zoom}")]
    InvalidTile { x: i64, y: i64, zoom: i64 },

    // Operation failures (exit code 4)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("User lookup failed: {0}")]
    Lookup(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::SourceNotFound(_)
            | Error::MissingTable(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::InvalidTile { .. } => exit_codes::USER_ERROR,

            Error::Sqlite(_)
            | Error::Postgres(_)
            | Error::Lookup(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output, when the error carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::SourceNotFound(path) | Error::LockFailed(path) => {
                Some(serde_json::json!({ "path": path }))
            }
            Error::MissingTable(table) => Some(serde_json::json!({ "table": table })),
            Error::InvalidTile { x, y, zoom } => {
                Some(serde_json::json!({ "x": x, "y": y, "zoom": zoom }))
            }
            _ => None,
        }
    }
}

/// Result type alias for migration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
