//! REST API request and response bodies.
//!
//! All bodies use camelCase field names. Jobs arrive as raw JSON and go
//! through the same schema check as job files.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mapping::MappingSet;
use crate::models::{CompiledScript, Row, ScriptPreview, ValidationResult};
use crate::parser::SheetData;

/// Response after a CSV upload: the parsed sheet and default mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: String,
    pub file_name: Option<String>,
    pub sheet_names: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// One string mapping per column, no key selected
    pub mappings: MappingSet,
    pub metadata: SourceMetadata,
}

/// Detection metadata for an uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
}

impl UploadResponse {
    pub fn new(sheet: SheetData, file_name: Option<String>) -> Self {
        let mappings = MappingSet::from_columns(&sheet.columns);
        Self {
            status: "ready".to_string(),
            file_name,
            sheet_names: sheet.sheet_names,
            metadata: SourceMetadata {
                encoding: sheet.encoding,
                delimiter: sheet.delimiter.to_string(),
                row_count: sheet.rows.len(),
            },
            columns: sheet.columns,
            rows: sheet.rows,
            mappings,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    pub rows: Vec<Row>,
    pub mappings: MappingSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompileRequest {
    pub rows: Vec<Row>,
    /// Job configuration, schema-checked by the handler
    pub job: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRequest {
    pub rows: Vec<Row>,
    pub job: Value,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub rows: Vec<Row>,
    pub job: Value,
    #[serde(default)]
    pub source_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Compiled script with its validation report.
///
/// `status` is `"ready"` when validation found no errors, `"warning"`
/// otherwise; the script is produced either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    pub status: String,
    pub script: String,
    pub statement_count: usize,
    pub skipped_rows: usize,
    pub validation: ValidationResult,
}

impl CompileResponse {
    pub fn new(script: &CompiledScript, validation: ValidationResult) -> Self {
        Self {
            status: if validation.is_valid { "ready" } else { "warning" }.to_string(),
            script: script.render(),
            statement_count: script.statements.len(),
            skipped_rows: script.skipped_rows,
            validation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub script: String,
    pub statement_count: usize,
    pub skipped_rows: usize,
    pub remaining_rows: usize,
}

impl From<&ScriptPreview> for PreviewResponse {
    fn from(preview: &ScriptPreview) -> Self {
        Self {
            script: preview.render(),
            statement_count: preview.script.statements.len(),
            skipped_rows: preview.script.skipped_rows,
            remaining_rows: preview.remaining_rows,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
