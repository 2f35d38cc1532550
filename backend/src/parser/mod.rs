//! Tabular source: CSV bytes → header + rows of raw cells.
//!
//! Encoding (chardet) and delimiter are detected automatically. Values are
//! trimmed; empty cells become [`CellValue::Null`]. No type inference
//! happens here, every non-empty cell is text.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{SourceError, SourceResult};
use crate::models::{CellValue, Row};

/// Name used when the source has no natural sheet name.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

const CANDIDATE_DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// A parsed sheet with detection metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    /// Header names, in file order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Detected or assumed encoding
    pub encoding: String,
    pub delimiter: char,
    /// CSV carries a single sheet
    pub sheet_names: Vec<String>,
}

/// Detect the encoding of raw bytes. Valid UTF-8 wins; otherwise chardet
/// decides.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes with the given encoding; unknown encodings fall back to
/// lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    decoded
        .strip_prefix('\u{feff}')
        .map(str::to_string)
        .unwrap_or(decoded)
}

/// Pick the candidate delimiter occurring most often in the header line.
/// Defaults to `;`.
pub fn detect_delimiter(content: &str) -> char {
    let header = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let mut best = ';';
    let mut best_count = 0;
    for sep in CANDIDATE_DELIMITERS {
        let count = header.matches(sep).count();
        if count > best_count {
            best_count = count;
            best = sep;
        }
    }
    best
}

/// Parse a CSV file with auto-detection. The sheet is named after the
/// file stem.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> SourceResult<SheetData> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mut sheet = parse_bytes_auto(&bytes)?;

    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        sheet.sheet_names = vec![stem.to_string()];
    }
    Ok(sheet)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> SourceResult<SheetData> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);

    let mut sheet = parse_str(&content, delimiter)?;
    sheet.encoding = encoding;
    Ok(sheet)
}

/// Parse already-decoded CSV text with an explicit delimiter.
///
/// Fields may be quoted. Missing trailing cells read as `Null`; extra cells
/// are ignored. Lines with no non-empty cell are skipped.
///
/// ```
/// use sheetload::parser::parse_str;
/// use sheetload::CellValue;
///
/// let sheet = parse_str("nome;preço\n\"Caneta; azul\";2,50\n", ';').unwrap();
/// assert_eq!(sheet.columns, vec!["nome", "preço"]);
/// assert_eq!(sheet.rows[0]["nome"], CellValue::from("Caneta; azul"));
/// ```
pub fn parse_str(content: &str, delimiter: char) -> SourceResult<SheetData> {
    if content.trim().is_empty() {
        return Err(SourceError::EmptyFile);
    }
    if !delimiter.is_ascii() {
        return Err(SourceError::Parse {
            line: 0,
            message: format!("Unsupported delimiter '{}'", delimiter),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns = read_header(&mut reader)?;
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result.map_err(|e| SourceError::Parse {
            line: e.position().map(|p| p.line() as usize).unwrap_or(0),
            message: e.to_string(),
        })?;

        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }

        let row: Row = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = record.get(i).map(str::trim).unwrap_or("");
                let cell = if value.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::from(value)
                };
                (column.clone(), cell)
            })
            .collect();
        rows.push(row);
    }

    Ok(SheetData {
        columns,
        rows,
        encoding: "utf-8".to_string(),
        delimiter,
        sheet_names: vec![DEFAULT_SHEET_NAME.to_string()],
    })
}

fn read_header(reader: &mut csv::Reader<&[u8]>) -> SourceResult<Vec<String>> {
    let header = reader.headers().map_err(|e| SourceError::Parse {
        line: 1,
        message: e.to_string(),
    })?;

    let columns: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let mut seen = HashSet::new();

    for (i, name) in columns.iter().enumerate() {
        if name.is_empty() {
            return Err(SourceError::InvalidHeader(format!(
                "column {} has no name",
                i + 1
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(SourceError::InvalidHeader(format!(
                "duplicate column '{}'",
                name
            )));
        }
    }

    Ok(columns)
}
