//! Value coercion: raw cell → SQL literal text.
//!
//! One total function, [`coerce`], serves both mapped columns (declared
//! type) and fixed columns (type inferred from the literal text).
//!
//! Priority order:
//!
//! 1. empty → `NULL`
//! 2. forced string → quoted text
//! 3. number → normalized numeric text, or quoted text if not numeric
//! 4. boolean → `TRUE` / `FALSE` / `NULL`
//! 5. date, string → quoted text
//!
//! Literals use ANSI syntax only: single quotes, embedded quotes doubled.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};

use crate::models::{CellValue, ColumnType};

/// How the literal type is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// Use the mapping's declared type.
    Declared(ColumnType),
    /// Sniff the literal text (fixed columns).
    Inferred,
}

impl From<ColumnType> for TypeTag {
    fn from(column_type: ColumnType) -> Self {
        TypeTag::Declared(column_type)
    }
}

const TRUE_TOKENS: [&str; 3] = ["true", "1", "sim"];
const FALSE_TOKENS: [&str; 3] = ["false", "0", "não"];

/// Date formats accepted in addition to RFC 3339.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Largest spreadsheet serial date (9999-12-31).
const MAX_SERIAL_DATE: f64 = 2_958_465.0;

/// Coerce a raw value to SQL literal text. Never fails.
pub fn coerce(value: &CellValue, tag: TypeTag, forced_string: bool) -> String {
    if value.is_empty() {
        return "NULL".to_string();
    }

    let text = value.as_text();

    if forced_string {
        return quote_literal(&text);
    }

    match tag {
        TypeTag::Declared(ColumnType::Number) => match value {
            CellValue::Number(n) => n.to_string(),
            _ if text.trim().is_empty() => "NULL".to_string(),
            _ => normalize_number(&text).unwrap_or_else(|| quote_literal(&text)),
        },
        TypeTag::Declared(ColumnType::Boolean) => boolean_literal(parse_boolean(&text)),
        TypeTag::Declared(ColumnType::Date | ColumnType::String) => quote_literal(&text),
        TypeTag::Inferred => infer_literal(&text),
    }
}

/// Wrap in single quotes, doubling embedded quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Inverse of [`quote_literal`]. Returns `None` if `literal` is not a
/// well-formed quoted literal.
pub fn unquote_literal(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\'' {
            // must be a doubled quote
            if chars.next() != Some('\'') {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

/// Replace the decimal comma with a dot and check the result is a finite
/// number. Returns the normalized text.
pub fn normalize_number(text: &str) -> Option<String> {
    let normalized = text.trim().replacen(',', ".", 1);
    match normalized.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(normalized),
        _ => None,
    }
}

/// Recognized boolean tokens, case-insensitive.
pub fn parse_boolean(text: &str) -> Option<bool> {
    let lowered = text.trim().to_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a calendar date from a cell.
///
/// Numeric cells are read as spreadsheet serial dates (days since
/// 1899-12-30).
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Null => None,
        CellValue::Number(n) => serial_date(*n),
        CellValue::Text(text) => parse_date_text(text.trim()),
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL_DATE {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.trunc() as u64))
}

fn boolean_literal(value: Option<bool>) -> String {
    match value {
        Some(true) => "TRUE",
        Some(false) => "FALSE",
        None => "NULL",
    }
    .to_string()
}

/// Structural type sniffing for fixed-column literals.
fn infer_literal(text: &str) -> String {
    match text.trim().to_lowercase().as_str() {
        "null" => return "NULL".to_string(),
        "true" => return "TRUE".to_string(),
        "false" => return "FALSE".to_string(),
        _ => {}
    }
    normalize_number(text).unwrap_or_else(|| quote_literal(text))
}
