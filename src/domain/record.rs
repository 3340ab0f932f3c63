// ============================================================
// PARSED RECORD TYPES
// ============================================================
// Data structures representing parsed CSV content

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Headers that every import file must declare.
pub const REQUIRED_HEADERS: [&str; 2] = ["title", "description"];

/// One column header, with the text as written and its normalized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub original: String,
    pub normalized: String,
}

impl Header {
    pub fn new(raw: &str) -> Self {
        let original = raw.trim().to_string();
        let normalized = original.to_lowercase();
        Self { original, normalized }
    }
}

/// A single data row mapped to normalized header names.
///
/// Row numbers are 1-based and count the header as row 1, so the first
/// data row is row 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub row_number: usize,
    pub data: HashMap<String, String>,
}

impl ParsedRecord {
    pub fn field(&self, name: &str) -> &str {
        self.data.get(name).map(String::as_str).unwrap_or("")
    }
}

/// A row that could not be mapped to a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row_number: usize,
    pub error: String,
    pub raw_data: Vec<String>,
}

/// Options controlling how a file is split into records.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Field delimiter (default: comma)
    pub delimiter: u8,

    /// Quote character (default: double quote)
    pub quote: u8,

    /// Escape character (default: backslash)
    pub escape: u8,

    /// Source encoding label, or "auto" to detect
    pub encoding: String,

    /// Skip rows whose cells are all blank
    pub skip_empty: bool,

    /// Stop accepting rows once this many records were produced
    pub max_rows: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: b'\\',
            encoding: "auto".to_string(),
            skip_empty: true,
            max_rows: 10_000,
        }
    }
}

/// Result of parsing one file: headers, mapped rows, and row-level errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCsv {
    pub headers: Vec<Header>,
    pub rows: Vec<ParsedRecord>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<String>,

    /// Data lines read, excluding the header and anything past the row cap
    pub total_rows: usize,
    pub valid_rows: usize,
    pub error_rows: usize,
}

impl ParsedCsv {
    pub fn header_names(&self) -> Vec<&str> {
        self.headers.iter().map(|h| h.normalized.as_str()).collect()
    }
}
