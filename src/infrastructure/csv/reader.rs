// ============================================================
// CSV READER
// ============================================================
// Parse CSV files with encoding detection and error handling

use std::collections::HashMap;
use std::path::Path;

use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use tracing::{debug, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::record::{
    Header, ParseOptions, ParsedCsv, ParsedRecord, RowError, REQUIRED_HEADERS,
};

/// CSV reader with encoding detection.
///
/// Never aborts on a single bad row: rows that cannot be mapped are
/// recorded in the result's error list and parsing continues. Hard
/// failures are reserved for unreadable input, undecodable bytes, and
/// missing required headers.
pub struct CsvReader {
    options: ParseOptions,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self {
            options: ParseOptions::default(),
        }
    }
}

impl CsvReader {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parse a CSV file from disk.
    pub fn read_file(&self, path: &Path) -> Result<ParsedCsv> {
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::ParseError(format!("CSV file not found or not readable: {}", e))
        })?;

        if bytes.is_empty() {
            return Err(AppError::ParseError(
                "CSV file is empty".to_string(),
            ));
        }

        let content = self.decode(&bytes)?;
        self.parse_content(&content)
    }

    /// Decode raw bytes to UTF-8, stripping any byte-order mark.
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let (bytes, bom_encoding) = strip_bom(bytes);
        if let Some(encoding) = bom_encoding {
            debug!(encoding = encoding.name(), "Removed byte-order mark");
        }

        let encoding = if self.options.encoding.eq_ignore_ascii_case("auto") {
            let detected = bom_encoding.unwrap_or_else(|| detect_encoding(bytes));
            debug!(encoding = detected.name(), "Detected file encoding");
            detected
        } else {
            Encoding::for_label(self.options.encoding.as_bytes()).ok_or_else(|| {
                AppError::ParseError(format!(
                    "Unsupported encoding: {}",
                    self.options.encoding
                ))
            })?
        };

        let (content, had_errors) = encoding.decode_without_bom_handling(bytes);
        if had_errors {
            return Err(AppError::ParseError(format!(
                "Failed to convert file encoding from {} to UTF-8",
                encoding.name()
            )));
        }

        Ok(content.into_owned())
    }

    /// Parse CSV content that is already valid UTF-8.
    pub fn parse_content(&self, content: &str) -> Result<ParsedCsv> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .quote(self.options.quote)
            .escape(Some(self.options.escape))
            .flexible(true)
            .has_headers(false)
            .from_reader(content.as_bytes());

        let mut records = reader.records();

        let header_record = match records.next() {
            Some(Ok(record)) if !record.is_empty() => record,
            Some(Err(e)) => {
                return Err(AppError::ParseError(format!(
                    "Failed to read CSV headers: {}",
                    e
                )))
            }
            _ => {
                return Err(AppError::ParseError(
                    "CSV file appears to be empty or has no valid headers".to_string(),
                ))
            }
        };

        let headers: Vec<Header> = header_record.iter().map(Header::new).collect();
        check_required_headers(&headers)?;

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        // The header counts as row 1
        let mut row_number = 1usize;

        for result in records {
            if rows.len() >= self.options.max_rows {
                warn!(
                    max_rows = self.options.max_rows,
                    row_number = row_number + 1,
                    "Maximum row limit reached"
                );
                warnings.push(format!(
                    "Row limit of {} reached; rows from row {} on were not imported",
                    self.options.max_rows,
                    row_number + 1
                ));
                break;
            }

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    row_number += 1;
                    errors.push(RowError {
                        row_number,
                        error: format!("Malformed CSV row: {}", e),
                        raw_data: Vec::new(),
                    });
                    continue;
                }
            };

            row_number += 1;

            let cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();

            if self.options.skip_empty && cells.iter().all(|c| c.is_empty()) {
                continue;
            }

            let mut data = HashMap::new();
            for (idx, header) in headers.iter().enumerate() {
                let value = cells.get(idx).cloned().unwrap_or_default();
                data.insert(header.normalized.clone(), value);
            }

            if data.get("title").map(String::is_empty).unwrap_or(true) {
                errors.push(RowError {
                    row_number,
                    error: "Title field is required and cannot be empty".to_string(),
                    raw_data: cells,
                });
                continue;
            }

            if data
                .get("description")
                .map(String::is_empty)
                .unwrap_or(true)
            {
                errors.push(RowError {
                    row_number,
                    error: "Description field is required and cannot be empty".to_string(),
                    raw_data: cells,
                });
                continue;
            }

            rows.push(ParsedRecord { row_number, data });
        }

        let valid_rows = rows.len();
        let error_rows = errors.len();

        Ok(ParsedCsv {
            headers,
            rows,
            errors,
            warnings,
            total_rows: row_number - 1,
            valid_rows,
            error_rows,
        })
    }
}

fn check_required_headers(headers: &[Header]) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .filter(|required| !headers.iter().any(|h| h.normalized == **required))
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::ParseError(format!(
            "Required CSV headers missing: {}",
            missing.join(", ")
        )))
    }
}

/// Strip a BOM and report the encoding it implies.
fn strip_bom(bytes: &[u8]) -> (&[u8], Option<&'static Encoding>) {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        (&bytes[3..], Some(UTF_8))
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        (&bytes[2..], Some(UTF_16BE))
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        (&bytes[2..], Some(UTF_16LE))
    } else {
        (bytes, None)
    }
}

/// Best-effort encoding detection for BOM-less input.
///
/// Candidates, in order: UTF-8, UTF-16 (by zero-byte distribution),
/// then Windows-1252, which also covers ISO-8859-1 and ASCII input.
fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    let sample = &bytes[..bytes.len().min(4096)];
    if sample.len() >= 4 {
        let even_zeros = sample.iter().step_by(2).filter(|b| **b == 0).count();
        let odd_zeros = sample.iter().skip(1).step_by(2).filter(|b| **b == 0).count();
        let half = sample.len() / 2;
        if even_zeros > half / 2 && odd_zeros < half / 8 {
            return UTF_16BE;
        }
        if odd_zeros > half / 2 && even_zeros < half / 8 {
            return UTF_16LE;
        }
    }

    WINDOWS_1252
}
