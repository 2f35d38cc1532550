//! Row validation.
//!
//! A pure pass over all rows that reports structured errors and warnings.
//! Nothing here blocks script generation: an error-level issue only asks
//! the caller to confirm before proceeding.
//!
//! # Checks
//!
//! | Subject            | Condition                        | Severity |
//! |--------------------|----------------------------------|----------|
//! | mapping set        | no key column                    | error    |
//! | key column         | empty value                      | error    |
//! | key column         | value already seen               | warning  |
//! | `number` column    | not numeric after comma → dot    | error    |
//! | `boolean` column   | not a recognized token           | warning  |
//! | `date` column      | not a calendar date              | error    |
//!
//! The forced-string flag is a formatting concern and never changes which
//! checks apply.
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetload::{validate, MappingSet};
//!
//! let mut mappings = MappingSet::from_columns(&sheet.columns);
//! mappings.set_key("Código")?;
//! let result = validate(&sheet.rows, &mappings);
//! if !result.is_valid {
//!     for issue in &result.errors {
//!         eprintln!("{}", issue);
//!     }
//! }
//! ```

use std::collections::HashSet;

use crate::coerce::{normalize_number, parse_boolean, parse_date};
use crate::mapping::MappingSet;
use crate::models::{cell, CellValue, ColumnMapping, ColumnType, Row, ValidationIssue, ValidationResult};

pub const MSG_NO_KEY: &str = "no key column defined";
pub const MSG_KEY_EMPTY: &str = "key column empty";
pub const MSG_DUPLICATE_KEY: &str = "duplicate key value";
pub const MSG_NOT_NUMERIC: &str = "value must be numeric";
pub const MSG_UNKNOWN_BOOLEAN: &str = "unrecognized boolean value";
pub const MSG_INVALID_DATE: &str = "invalid date format";

/// Validate every row against every mapping.
///
/// Without a key column the pass stops at a single top-level error.
pub fn validate(rows: &[Row], mappings: &MappingSet) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if mappings.key_mapping().is_none() {
        errors.push(ValidationIssue {
            row_index: None,
            column: "general".to_string(),
            message: MSG_NO_KEY.to_string(),
            raw_value: CellValue::Null,
        });
        return ValidationResult::new(errors, warnings);
    }

    let mut seen_keys: HashSet<String> = HashSet::new();

    for (row_index, row) in rows.iter().enumerate() {
        for (mapping, is_key) in mappings.entries() {
            let value = cell(row, &mapping.source_column);
            let issue = |message: &str| ValidationIssue {
                row_index: Some(row_index),
                column: mapping.source_column.clone(),
                message: message.to_string(),
                raw_value: value.clone(),
            };

            if is_key {
                if value.is_empty() {
                    errors.push(issue(MSG_KEY_EMPTY));
                } else if !seen_keys.insert(value.as_text()) {
                    warnings.push(issue(MSG_DUPLICATE_KEY));
                }
            }

            if value.is_empty() {
                continue;
            }

            match check_type(mapping, value) {
                Some(TypeCheck::Error(message)) => errors.push(issue(message)),
                Some(TypeCheck::Warning(message)) => warnings.push(issue(message)),
                None => {}
            }
        }
    }

    ValidationResult::new(errors, warnings)
}

enum TypeCheck {
    Error(&'static str),
    Warning(&'static str),
}

/// Declared-type check for a non-empty value.
fn check_type(mapping: &ColumnMapping, value: &CellValue) -> Option<TypeCheck> {
    match mapping.column_type {
        ColumnType::Number => match value {
            CellValue::Number(_) => None,
            // blank text reads as no value
            _ if value.as_text().trim().is_empty() => None,
            _ if normalize_number(&value.as_text()).is_some() => None,
            _ => Some(TypeCheck::Error(MSG_NOT_NUMERIC)),
        },
        ColumnType::Boolean => match parse_boolean(&value.as_text()) {
            Some(_) => None,
            None => Some(TypeCheck::Warning(MSG_UNKNOWN_BOOLEAN)),
        },
        ColumnType::Date => match parse_date(value) {
            Some(_) => None,
            None => Some(TypeCheck::Error(MSG_INVALID_DATE)),
        },
        ColumnType::String => None,
    }
}
