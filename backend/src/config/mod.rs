//! Job configuration and runtime settings.
//!
//! A [`JobConfig`] is everything the compiler and executor need besides
//! the rows themselves: table, operation, mappings, fixed columns,
//! forced-string columns and the optional sequential code.
//!
//! Job files are JSON. They are checked against the embedded
//! `schemas/job-config.json` (JSON Schema draft 7) before deserializing,
//! so every structural problem is reported at once.
//!
//! [`Settings`] come from the environment (a `.env` file is honoured):
//!
//! | Variable                 | Default              |
//! |--------------------------|----------------------|
//! | `SHEETLOAD_ENDPOINT_URL` | (none)               |
//! | `SHEETLOAD_ENDPOINT_KEY` | (none)               |
//! | `SHEETLOAD_HISTORY_DIR`  | `.sheetload/history` |
//! | `SHEETLOAD_PORT`         | `3000`               |
//! | `SHEETLOAD_TIMEOUT_SECS` | `30`                 |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{JobError, JobResult};
use crate::mapping::MappingSet;
use crate::models::{FixedColumn, OperationType};

/// Default directory for the JSON history store.
pub const DEFAULT_HISTORY_DIR: &str = ".sheetload/history";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default per-statement request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default column name for the generated sequential code.
pub const DEFAULT_CODE_COLUMN: &str = "codigo";

/// Default first sequential code.
pub const DEFAULT_START_CODE: &str = "000001";

/// Surrogate key generation for INSERT jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequentialCode {
    /// Target column receiving the code
    pub column: String,
    /// First code, as digits (e.g. `"000001"`)
    pub start: String,
}

impl Default for SequentialCode {
    fn default() -> Self {
        Self {
            column: DEFAULT_CODE_COLUMN.to_string(),
            start: DEFAULT_START_CODE.to_string(),
        }
    }
}

/// Full compile/execute configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Target table, emitted verbatim
    pub table: String,

    #[serde(default)]
    pub operation: OperationType,

    pub mappings: MappingSet,

    #[serde(default)]
    pub fixed_columns: Vec<FixedColumn>,

    /// Column names (source, target or fixed) always emitted as quoted text
    #[serde(default)]
    pub forced_string_columns: BTreeSet<String>,

    /// INSERT only; ignored for UPDATE
    #[serde(default)]
    pub sequential_code: Option<SequentialCode>,
}

impl JobConfig {
    /// Default job for a set of columns: string mappings, no key.
    pub fn for_columns<S: AsRef<str>>(
        table: impl Into<String>,
        operation: OperationType,
        columns: &[S],
    ) -> Self {
        let sequential_code = match operation {
            OperationType::Insert => Some(SequentialCode::default()),
            OperationType::Update => None,
        };
        Self {
            table: table.into(),
            operation,
            mappings: MappingSet::from_columns(columns),
            fixed_columns: Vec::new(),
            forced_string_columns: BTreeSet::new(),
            sequential_code,
        }
    }

    /// Fixed columns with both a name and a value.
    pub fn active_fixed_columns(&self) -> impl Iterator<Item = &FixedColumn> {
        self.fixed_columns.iter().filter(|fc| fc.is_active())
    }

    /// Whether `name` is in the forced-string set.
    pub fn is_forced(&self, name: &str) -> bool {
        self.forced_string_columns.contains(name)
    }

    /// Parse and schema-check a job from JSON text.
    pub fn from_json(json: &str) -> JobResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Schema-check then deserialize a JSON value.
    pub fn from_value(value: Value) -> JobResult<Self> {
        validate_job_value(&value).map_err(|errors| JobError::Schema { errors })?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_file(path: &Path) -> JobResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn job_schema() -> Value {
    serde_json::from_str(include_str!("../../schemas/job-config.json"))
        .expect("Invalid embedded schema")
}

/// Check a JSON value against the embedded job schema.
pub fn validate_job_value(value: &Value) -> Result<(), Vec<String>> {
    let schema = job_schema();
    let validator = jsonschema::draft7::new(&schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Runtime settings from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the statement execution endpoint
    pub endpoint_url: Option<String>,
    /// API key sent to the endpoint
    pub endpoint_key: Option<String>,
    /// Directory for the JSON history store
    pub history_dir: PathBuf,
    pub port: u16,
    /// Upper bound for one statement round-trip
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            endpoint_key: None,
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
            port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Load from environment variables, reading `.env` first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        Self {
            endpoint_url: non_empty("SHEETLOAD_ENDPOINT_URL"),
            endpoint_key: non_empty("SHEETLOAD_ENDPOINT_KEY"),
            history_dir: non_empty("SHEETLOAD_HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_dir),
            port: non_empty("SHEETLOAD_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            request_timeout: non_empty("SHEETLOAD_TIMEOUT_SECS")
                .and_then(|t| t.trim().parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_embedded_schema_loads() {
        let schema = job_schema();
        assert!(schema.get("properties").is_some());
    }

    #[test]
    fn test_from_json_full() {
        let job = JobConfig::from_value(json!({
            "table": "produtos",
            "operation": "insert",
            "mappings": {
                "columns": [
                    { "sourceColumn": "Nome", "targetColumn": "nome" },
                    { "sourceColumn": "Preço", "targetColumn": "preco", "type": "number" }
                ],
                "keyColumn": null
            },
            "fixedColumns": [{ "name": "ativo", "value": "true" }],
            "forcedStringColumns": ["nome"],
            "sequentialCode": { "column": "codigo", "start": "000100" }
        }))
        .unwrap();

        assert_eq!(job.operation, OperationType::Insert);
        assert_eq!(job.mappings.get("Preço").unwrap().column_type, ColumnType::Number);
        assert!(job.is_forced("nome"));
        assert_eq!(job.sequential_code.unwrap().start, "000100");
    }

    #[test]
    fn test_schema_errors_are_collected() {
        let err = JobConfig::from_value(json!({
            "table": "",
            "operation": "delete",
            "mappings": { "columns": [] }
        }))
        .unwrap_err();

        match err {
            JobError::Schema { errors } => assert!(errors.len() >= 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_key_column_rejected() {
        let err = JobConfig::from_value(json!({
            "table": "t",
            "mappings": {
                "columns": [{ "sourceColumn": "A", "targetColumn": "a" }],
                "keyColumn": "B"
            }
        }))
        .unwrap_err();
        assert!(matches!(err, JobError::Json(_)));
    }

    #[test]
    fn test_for_columns_roundtrip_through_schema() {
        let job = JobConfig::for_columns("clientes", OperationType::Insert, &["Nome", "E-mail"]);
        let json = job.to_json().unwrap();
        let back = JobConfig::from_json(&json).unwrap();
        assert_eq!(back, job);
        assert_eq!(back.sequential_code, Some(SequentialCode::default()));
    }

    #[test]
    fn test_active_fixed_columns() {
        let mut job = JobConfig::for_columns("t", OperationType::Update, &["a"]);
        job.fixed_columns = vec![
            FixedColumn::new("status", "1"),
            FixedColumn::new("", "x"),
            FixedColumn::new("note", ""),
        ];
        let names: Vec<_> = job.active_fixed_columns().map(|fc| fc.name.as_str()).collect();
        assert_eq!(names, vec!["status"]);
    }

    #[test]
    fn test_settings_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SHEETLOAD_ENDPOINT_URL", "https://db.example.com"),
            ("SHEETLOAD_PORT", "8080"),
            ("SHEETLOAD_HISTORY_DIR", "  "),
            ("SHEETLOAD_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(settings.endpoint_url.as_deref(), Some("https://db.example.com"));
        assert_eq!(settings.endpoint_key, None);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.history_dir, PathBuf::from(DEFAULT_HISTORY_DIR));
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
    }
}
