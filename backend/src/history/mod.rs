//! Operation history - append-only log of execution summaries.
//!
//! Each execution pass appends one [`OperationRecord`]. Records can be read
//! back most recent first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::HistoryResult;
use crate::mapping::MappingSet;
use crate::models::{OperationSummary, OperationType, RowFailure};

/// Default number of records returned by a read-back.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// A persisted execution summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Unique identifier
    pub id: String,
    pub operation_type: OperationType,
    pub table_name: String,
    /// Where the rows came from (usually the file name)
    pub source_label: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mapping configuration used for the pass
    pub mappings: MappingSet,
    /// Per-row failures; `None` when every row succeeded
    pub errors: Option<Vec<RowFailure>>,
    pub executed_at: DateTime<Utc>,
}

impl OperationRecord {
    /// Build a record stamped now.
    pub fn from_summary(
        summary: &OperationSummary,
        operation_type: OperationType,
        table_name: &str,
        source_label: &str,
        mappings: &MappingSet,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation_type,
            table_name: table_name.to_string(),
            source_label: source_label.to_string(),
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            mappings: mappings.clone(),
            errors: if summary.errors.is_empty() {
                None
            } else {
                Some(summary.errors.clone())
            },
            executed_at: Utc::now(),
        }
    }
}

/// Append-only store of operation records.
pub trait HistoryStore {
    /// Append one record.
    fn append(&mut self, record: OperationRecord) -> HistoryResult<()>;

    /// Up to `limit` records, most recent `executed_at` first.
    fn recent(&self, limit: usize) -> HistoryResult<Vec<OperationRecord>>;
}

fn most_recent(mut records: Vec<OperationRecord>, limit: usize) -> Vec<OperationRecord> {
    records.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
    records.truncate(limit);
    records
}

/// In-process history.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    records: Vec<OperationRecord>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in append order.
    pub fn into_records(self) -> Vec<OperationRecord> {
        self.records
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&mut self, record: OperationRecord) -> HistoryResult<()> {
        self.records.push(record);
        Ok(())
    }

    fn recent(&self, limit: usize) -> HistoryResult<Vec<OperationRecord>> {
        Ok(most_recent(self.records.clone(), limit))
    }
}

/// History stored as one JSON file per record in a directory.
pub struct JsonHistoryStore {
    /// Directory where records are stored
    dir: PathBuf,
    /// Loaded records
    records: Vec<OperationRecord>,
}

impl JsonHistoryStore {
    /// Open a directory, loading existing records.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut store = Self {
            dir: PathBuf::from(dir.as_ref()),
            records: Vec::new(),
        };
        store.load_all();
        store
    }

    /// Load every record file; unreadable files are skipped.
    fn load_all(&mut self) {
        if !self.dir.exists() {
            return;
        }

        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(record) = serde_json::from_str::<OperationRecord>(&content) {
                        self.records.push(record);
                    }
                }
            }
        }
    }
}

impl HistoryStore for JsonHistoryStore {
    fn append(&mut self, record: OperationRecord) -> HistoryResult<()> {
        fs::create_dir_all(&self.dir)?;

        let file_name = format!(
            "{}-{}.json",
            record.executed_at.format("%Y%m%dT%H%M%S%3f"),
            record.id
        );
        let content = serde_json::to_string_pretty(&record)?;
        fs::write(self.dir.join(file_name), content)?;

        self.records.push(record);
        Ok(())
    }

    fn recent(&self, limit: usize) -> HistoryResult<Vec<OperationRecord>> {
        Ok(most_recent(self.records.clone(), limit))
    }
}
