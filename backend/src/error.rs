//! Error types for the sheetload engine.
//!
//! - [`SourceError`] - CSV reading/decoding errors
//! - [`MappingError`] - Column mapping mutations
//! - [`ConfigError`] - Job configuration problems that block compilation
//! - [`JobError`] - Job file loading errors
//! - [`EndpointError`] - Per-row statement submission failures
//! - [`HistoryError`] - History store errors
//! - [`ServerError`] - HTTP API errors
//!
//! Conversions are provided via `From` so `?` works across boundaries.
//! Validation findings and per-row execution failures are data, not errors:
//! see [`crate::models::ValidationResult`] and [`crate::models::RowFailure`].

use thiserror::Error;

// =============================================================================
// Tabular Source Errors
// =============================================================================

/// Errors while reading a CSV source, with line context.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// Header row is unusable.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Malformed record.
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors raised by [`crate::mapping::MappingSet`] mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// No mapping for this source column.
    #[error("Unknown source column: {0}")]
    UnknownColumn(String),

    /// Target column already used by another mapping.
    #[error("Target column '{0}' is already mapped")]
    DuplicateTarget(String),

    /// Target column name is blank.
    #[error("Target column for '{0}' cannot be empty")]
    EmptyTarget(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration problems. These block compilation and execution entirely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Table name is blank.
    #[error("Table name is required")]
    EmptyTableName,

    /// UPDATE (or execution) without a key column.
    #[error("A key column is required for UPDATE")]
    MissingKeyColumn,

    /// Nothing to put in the column or SET list.
    #[error("No columns selected")]
    NoColumns,

    /// Sequential code start is not a non-negative integer.
    #[error("Invalid start code '{0}': expected digits only")]
    InvalidStartCode(String),

    /// Execution is only defined for UPDATE jobs.
    #[error("Execution supports UPDATE operations only")]
    UnsupportedOperation,
}

// =============================================================================
// Job File Errors
// =============================================================================

/// Errors while loading a job configuration.
#[derive(Debug, Error)]
pub enum JobError {
    /// IO error.
    #[error("Failed to read job file: {0}")]
    Io(#[from] std::io::Error),

    /// JSON syntax error.
    #[error("Job JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema violations.
    #[error("Invalid job configuration: {}", .errors.join("; "))]
    Schema { errors: Vec<String> },
}

// =============================================================================
// Endpoint Errors
// =============================================================================

/// Failure of one statement submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// Endpoint not configured.
    #[error("Execution endpoint not configured: {0}")]
    NotConfigured(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Endpoint rejected the statement.
    #[error("{0}")]
    Rejected(String),
}

// =============================================================================
// History Errors
// =============================================================================

/// Errors from the operation history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// IO error.
    #[error("History IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("History JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (client side).
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Job configuration rejected.
    #[error("{0}")]
    Job(#[from] JobError),

    /// Source parsing error.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Endpoint not usable.
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// History store error.
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for mapping mutations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for compile/execute configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for job loading.
pub type JobResult<T> = Result<T, JobError>;

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // serde_json::Error -> JobError -> ServerError
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let job_err: JobError = json_err.into();
        assert!(job_err.to_string().starts_with("Job JSON error"));

        let server_err: ServerError = job_err.into();
        assert!(matches!(server_err, ServerError::Job(JobError::Json(_))));
    }

    #[test]
    fn test_schema_error_format() {
        let err = JobError::Schema {
            errors: vec!["\"table\" is a required property".into(), "bad type".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("table"));
        assert!(msg.contains("; bad type"));
    }

    #[test]
    fn test_server_error_keeps_config_message() {
        let err: ServerError = ConfigError::EmptyTableName.into();
        assert_eq!(err.to_string(), "Table name is required");
    }

    #[test]
    fn test_rejected_message_passthrough() {
        let err = EndpointError::Rejected("relation \"produtos\" does not exist".into());
        assert_eq!(err.to_string(), "relation \"produtos\" does not exist");
    }
}
