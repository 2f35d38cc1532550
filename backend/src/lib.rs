//! # Sheetload - spreadsheet rows to SQL INSERT/UPDATE statements
//!
//! Sheetload maps spreadsheet columns to database columns, validates the
//! rows, and either compiles a SQL script or executes one UPDATE per row
//! against a remote endpoint, recording each pass in an operation history.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌─────────────┐
//! │ CSV file │──▶│  Parser  │──▶│  Mapping   │──▶│ Validator │──▶│  Compiler   │──▶ script.sql
//! │(ISO/UTF8)│   │(auto-enc)│   │ (+ coerce) │   │           │   │             │
//! └──────────┘   └──────────┘   └────────────┘   └───────────┘   └──────┬──────┘
//!                                                                       │ per row
//!                                                                ┌──────▼──────┐   ┌─────────┐
//!                                                                │  Executor   │──▶│ History │
//!                                                                └─────────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetload::{compile, parse_file_auto, validate, JobConfig};
//!
//! let sheet = parse_file_auto("produtos.csv")?;
//! let job = JobConfig::from_file("job.json".as_ref())?;
//!
//! let report = validate(&sheet.rows, &job.mappings);
//! println!("{}", report.summary());
//!
//! let script = compile(&sheet.rows, &job)?;
//! std::fs::write("produtos.sql", script.render())?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, mappings, validation and execution results
//! - [`parser`] - CSV parsing with auto-detection
//! - [`mapping`] - Column mapping resolver
//! - [`coerce`] - Cell to SQL literal coercion
//! - [`validation`] - Row validation
//! - [`compile`] - INSERT/UPDATE script compiler
//! - [`execute`] - Row-by-row execution loop
//! - [`history`] - Operation history store
//! - [`config`] - Job configuration and settings
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod config;

// Parsing
pub mod parser;

// Mapping and coercion
pub mod mapping;
pub mod coerce;

// Validation
pub mod validation;

// Statement generation and execution
pub mod compile;
pub mod execute;

// History
pub mod history;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, EndpointError, HistoryError, JobError, MappingError, ServerError, SourceError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CellValue, ColumnMapping, ColumnType, CompiledScript, FixedColumn, OperationSummary,
    OperationType, Row, RowFailure, ScriptPreview, ValidationIssue, ValidationResult,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{JobConfig, SequentialCode, Settings};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_file_auto,
    parse_str, SheetData,
};

// =============================================================================
// Re-exports - Mapping, coercion, validation
// =============================================================================

pub use mapping::{default_target_name, MappingSet};
pub use coerce::{coerce, quote_literal, TypeTag};
pub use validation::validate;

// =============================================================================
// Re-exports - Compiler and executor
// =============================================================================

pub use compile::{compile, preview, StatementPlan, PREVIEW_ROWS};
pub use execute::{execute, HttpEndpoint, StatementEndpoint};

// =============================================================================
// Re-exports - History
// =============================================================================

pub use history::{
    HistoryStore, JsonHistoryStore, MemoryHistory, OperationRecord, DEFAULT_RECENT_LIMIT,
};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, CompileResponse, PreviewResponse, UploadResponse};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
