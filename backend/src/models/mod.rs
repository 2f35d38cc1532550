//! Domain models shared by the resolver, validator, compiler and executor.
//!
//! - [`CellValue`] - Raw spreadsheet cell (text, number or empty)
//! - [`Row`] - One data row, column name to cell
//! - [`ColumnType`] - Declared type of a mapped column
//! - [`ColumnMapping`] - Source column to target column binding
//! - [`FixedColumn`] - Statement-wide constant column
//! - [`OperationType`] - INSERT or UPDATE
//! - [`ValidationIssue`] / [`ValidationResult`] - Validator output
//! - [`CompiledScript`] / [`ScriptPreview`] - Compiler output
//! - [`OperationSummary`] / [`RowFailure`] - Execution output

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Cells and rows
// =============================================================================

/// A raw cell value as delivered by the tabular source.
///
/// No type inference happens before this boundary: a spreadsheet cell is
/// either text, a number, or empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Null,
}

impl CellValue {
    /// `true` for `Null` and for empty text.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// String form used for comparisons and literal rendering.
    ///
    /// Numbers go through `Display`, so `12.0` renders as `12`.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Null => String::new(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "null"),
            other => write!(f, "{}", other.as_text()),
        }
    }
}

/// One data row: column name to raw cell.
pub type Row = HashMap<String, CellValue>;

/// Read a cell from a row; a missing column reads as `Null`.
pub fn cell<'a>(row: &'a Row, column: &str) -> &'a CellValue {
    static NULL: CellValue = CellValue::Null;
    row.get(column).unwrap_or(&NULL)
}

// =============================================================================
// Column mapping
// =============================================================================

/// Declared type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Binding of one source column to a target column.
///
/// Whether a mapping is the key column is held by its
/// [`MappingSet`](crate::mapping::MappingSet), not by the entry itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    /// Column name in the spreadsheet
    pub source_column: String,
    /// Column name in the database table
    pub target_column: String,
    /// Declared type, drives coercion and validation
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    /// Always emit as quoted text
    #[serde(default)]
    pub forced_string: bool,
}

impl ColumnMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_column: source.into(),
            target_column: target.into(),
            column_type: ColumnType::String,
            forced_string: false,
        }
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    pub fn forced(mut self) -> Self {
        self.forced_string = true;
        self
    }
}

/// A statement-wide constant column not sourced from row data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedColumn {
    pub name: String,
    pub value: String,
}

impl FixedColumn {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Fixed columns with an empty name or value are ignored.
    pub fn is_active(&self) -> bool {
        !self.name.trim().is_empty() && !self.value.is_empty()
    }
}

/// Kind of statement to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    #[default]
    Update,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Insert => f.write_str("insert"),
            OperationType::Update => f.write_str("update"),
        }
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(OperationType::Insert),
            "update" => Ok(OperationType::Update),
            other => Err(format!("Unknown operation type: {}", other)),
        }
    }
}

// =============================================================================
// Validation output
// =============================================================================

/// A single validation finding.
///
/// Severity is given by the list it lives in ([`ValidationResult::errors`]
/// or [`ValidationResult::warnings`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// 0-based data row index; `None` for issues not bound to a row
    pub row_index: Option<usize>,
    pub column: String,
    pub message: String,
    pub raw_value: CellValue,
}

impl ValidationIssue {
    /// Spreadsheet row number (header on row 1, first data row on row 2).
    pub fn sheet_row(&self) -> Option<usize> {
        self.row_index.map(|i| i + 2)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sheet_row() {
            Some(row) => write!(
                f,
                "Row {}, column '{}' (value '{}'): {}",
                row, self.column, self.raw_value, self.message
            ),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Outcome of a validation pass. `is_valid` holds iff `errors` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )
    }
}

// =============================================================================
// Compiler output
// =============================================================================

/// Ordered statements plus the number of rows left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompiledScript {
    /// One statement per emitted row, each ending with `;\n`
    pub statements: Vec<String>,
    /// Rows excluded from output (UPDATE with an empty key)
    pub skipped_rows: usize,
}

impl CompiledScript {
    /// Full script text, prefixed with a skipped-row remark when needed.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.skipped_rows > 0 {
            out.push_str(&format!(
                "-- {} row(s) skipped: empty key value\n",
                self.skipped_rows
            ));
        }
        for statement in &self.statements {
            out.push_str(statement);
        }
        out
    }
}

/// A script compiled over a bounded row prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPreview {
    pub script: CompiledScript,
    /// Rows after the prefix that were not compiled
    pub remaining_rows: usize,
}

impl ScriptPreview {
    pub fn render(&self) -> String {
        let mut out = self.script.render();
        if self.remaining_rows > 0 {
            out.push_str(&format!("-- ... {} more row(s)\n", self.remaining_rows));
        }
        out
    }
}

// =============================================================================
// Execution output
// =============================================================================

/// A row that failed during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    /// 0-based data row index
    pub row_index: usize,
    pub message: String,
}

/// Aggregated outcome of an execution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<RowFailure>,
}

impl OperationSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
