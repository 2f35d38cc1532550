//! Statement compiler: rows + job → INSERT/UPDATE script.
//!
//! ```text
//! INSERT INTO produtos (codigo, nome, preco, ativo) VALUES ('000001', 'Caneta', 2.5, TRUE);
//! UPDATE produtos SET preco = 2.5, ativo = TRUE WHERE sku = 'A-1';
//! ```
//!
//! Literals are inlined (no parameter binding). Table and column names are
//! emitted verbatim, unescaped: callers must sanitize identifiers before
//! they reach this module.
//!
//! UPDATE rows whose key cell is empty are skipped and counted, never
//! emitted, so an empty key can not touch an unintended record.

use crate::coerce::{coerce, TypeTag};
use crate::config::{JobConfig, SequentialCode};
use crate::error::{ConfigError, ConfigResult};
use crate::models::{cell, CellValue, ColumnMapping, CompiledScript, OperationType, Row, ScriptPreview};

/// Zero-padding width of generated sequential codes.
pub const CODE_WIDTH: usize = 6;

/// Rows compiled by a default preview.
pub const PREVIEW_ROWS: usize = 2;

/// Compile every row.
pub fn compile(rows: &[Row], job: &JobConfig) -> ConfigResult<CompiledScript> {
    let plan = StatementPlan::new(job)?;
    plan.compile_rows(rows)
}

/// Compile the first `limit` rows through the same path as [`compile`].
pub fn preview(rows: &[Row], job: &JobConfig, limit: usize) -> ConfigResult<ScriptPreview> {
    let plan = StatementPlan::new(job)?;
    let shown = limit.min(rows.len());
    Ok(ScriptPreview {
        script: plan.compile_rows(&rows[..shown])?,
        remaining_rows: rows.len() - shown,
    })
}

/// A checked job, ready to turn rows into statements.
#[derive(Debug)]
pub struct StatementPlan<'a> {
    job: &'a JobConfig,
    start_code: Option<u64>,
}

impl<'a> StatementPlan<'a> {
    /// Fail fast on configuration errors.
    pub fn new(job: &'a JobConfig) -> ConfigResult<Self> {
        if job.table.trim().is_empty() {
            return Err(ConfigError::EmptyTableName);
        }

        let fixed_count = job.active_fixed_columns().count();
        let mut start_code = None;

        match job.operation {
            OperationType::Update => {
                if job.mappings.key_mapping().is_none() {
                    return Err(ConfigError::MissingKeyColumn);
                }
                if job.mappings.non_key_mappings().count() + fixed_count == 0 {
                    return Err(ConfigError::NoColumns);
                }
            }
            OperationType::Insert => {
                if let Some(code) = &job.sequential_code {
                    start_code = Some(parse_start_code(code)?);
                }
                if job.mappings.len() + fixed_count == 0 && start_code.is_none() {
                    return Err(ConfigError::NoColumns);
                }
            }
        }

        Ok(Self { job, start_code })
    }

    /// Compile rows in order. The code counter advances once per row.
    ///
    /// Fails with [`ConfigError::InvalidStartCode`] when the codes for
    /// `rows` would not fit in a `u64`.
    pub fn compile_rows(&self, rows: &[Row]) -> ConfigResult<CompiledScript> {
        if let Some(last) = rows.len().checked_sub(1) {
            self.code_for(last)?;
        }

        let mut script = CompiledScript::default();
        for (row_index, row) in rows.iter().enumerate() {
            match self.statement_for_row(row, row_index)? {
                Some(s) => script.statements.push(s),
                None => script.skipped_rows += 1,
            }
        }
        Ok(script)
    }

    /// Single-row statement. `None` for an UPDATE row with an empty key.
    ///
    /// `row_index` positions the sequential code for INSERT.
    pub fn statement_for_row(&self, row: &Row, row_index: usize) -> ConfigResult<Option<String>> {
        match self.job.operation {
            OperationType::Insert => {
                let code = self.code_for(row_index)?;
                Ok(Some(self.insert_statement(row, code)))
            }
            OperationType::Update => Ok(self.update_statement(row)),
        }
    }

    fn code_for(&self, row_index: usize) -> ConfigResult<Option<u64>> {
        let Some(start) = self.start_code else {
            return Ok(None);
        };
        u64::try_from(row_index)
            .ok()
            .and_then(|offset| start.checked_add(offset))
            .map(Some)
            .ok_or_else(|| {
                let start = self
                    .job
                    .sequential_code
                    .as_ref()
                    .map(|c| c.start.clone())
                    .unwrap_or_default();
                ConfigError::InvalidStartCode(start)
            })
    }

    fn insert_statement(&self, row: &Row, code: Option<u64>) -> String {
        let mut columns = Vec::new();
        let mut values = Vec::new();

        if let (Some(code), Some(SequentialCode { column, .. })) = (code, &self.job.sequential_code) {
            columns.push(column.clone());
            values.push(format!("'{:0width$}'", code, width = CODE_WIDTH));
        }

        for mapping in self.job.mappings.iter() {
            columns.push(mapping.target_column.clone());
            values.push(self.mapped_literal(mapping, row));
        }

        for fixed in self.job.active_fixed_columns() {
            columns.push(fixed.name.clone());
            values.push(self.fixed_literal(&fixed.name, &fixed.value));
        }

        format!(
            "INSERT INTO {} ({}) VALUES ({});\n",
            self.job.table,
            columns.join(", "),
            values.join(", ")
        )
    }

    fn update_statement(&self, row: &Row) -> Option<String> {
        let key = self.job.mappings.key_mapping()?;
        let key_value = cell(row, &key.source_column);
        if key_value.is_empty() {
            return None;
        }

        let mut assignments: Vec<String> = self
            .job
            .mappings
            .non_key_mappings()
            .map(|m| format!("{} = {}", m.target_column, self.mapped_literal(m, row)))
            .collect();

        for fixed in self.job.active_fixed_columns() {
            assignments.push(format!(
                "{} = {}",
                fixed.name,
                self.fixed_literal(&fixed.name, &fixed.value)
            ));
        }

        Some(format!(
            "UPDATE {} SET {} WHERE {} = {};\n",
            self.job.table,
            assignments.join(", "),
            key.target_column,
            self.mapped_literal(key, row)
        ))
    }

    fn mapped_literal(&self, mapping: &ColumnMapping, row: &Row) -> String {
        let forced = mapping.forced_string
            || self.job.is_forced(&mapping.source_column)
            || self.job.is_forced(&mapping.target_column);
        coerce(
            cell(row, &mapping.source_column),
            TypeTag::Declared(mapping.column_type),
            forced,
        )
    }

    fn fixed_literal(&self, name: &str, value: &str) -> String {
        coerce(&CellValue::from(value), TypeTag::Inferred, self.job.is_forced(name))
    }
}

fn parse_start_code(code: &SequentialCode) -> ConfigResult<u64> {
    let start = code.start.trim();
    if start.is_empty() || !start.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::InvalidStartCode(code.start.clone()));
    }
    start
        .parse()
        .map_err(|_| ConfigError::InvalidStartCode(code.start.clone()))
}
