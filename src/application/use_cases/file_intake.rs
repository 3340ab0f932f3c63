// ============================================================
// FILE INTAKE USE CASE
// ============================================================
// Validate an uploaded file and stage it for parsing

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::settings::ImporterSettings;
use crate::infrastructure::storage;

/// MIME types commonly reported for CSV files.
const EXPECTED_MIME_TYPES: [&str; 4] = [
    "text/csv",
    "text/plain",
    "application/csv",
    "application/vnd.ms-excel",
];

/// Longest line the content scan tolerates without warning, in bytes.
const MAX_LINE_LENGTH: usize = 10_000;

static SUSPICIOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)<script[^>]*>",
        r"(?i)<iframe[^>]*>",
        r"(?i)javascript:",
        r"(?i)vbscript:",
        r"(?i)onload\s*=",
        r"(?i)onerror\s*=",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Transport-level failure reported by the upload layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    SizeExceeded,
    Partial,
    NoFile,
    MissingTempDir,
    WriteFailed,
    ExtensionBlocked,
    Unknown,
}

impl TransferError {
    pub fn message(&self) -> &'static str {
        match self {
            TransferError::SizeExceeded => "File size exceeds the upload limit",
            TransferError::Partial => "File was only partially uploaded",
            TransferError::NoFile => "No file was uploaded",
            TransferError::MissingTempDir => "Missing temporary upload directory",
            TransferError::WriteFailed => "Failed to write file to disk",
            TransferError::ExtensionBlocked => "File upload stopped by extension",
            TransferError::Unknown => "Unknown upload error occurred",
        }
    }
}

/// Raw uploaded-file descriptor as the HTTP layer hands it over.
#[derive(Debug, Clone)]
pub struct UploadDescriptor {
    pub original_name: String,
    pub temp_path: PathBuf,
    pub reported_size: u64,
    pub transfer_error: Option<TransferError>,
}

/// Outcome of validating one upload.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: IntakeInfo,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntakeInfo {
    pub extension: String,
    pub mime_type: String,
    pub file_size: u64,
    pub has_bom: bool,
    pub estimated_rows: usize,
}

impl IntakeReport {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            info: IntakeInfo::default(),
        }
    }

    fn reject(&mut self, message: String) {
        self.valid = false;
        self.errors.push(message);
    }
}

/// Upload validation and staging.
pub struct FileIntake {
    settings: ImporterSettings,
}

impl FileIntake {
    pub fn new(settings: ImporterSettings) -> Self {
        Self { settings }
    }

    /// Validate the descriptor and, when it passes, relocate the temp file
    /// into the staging directory under a collision-resistant name.
    pub fn accept(&self, descriptor: &UploadDescriptor, user_id: i64) -> Result<(PathBuf, IntakeReport)> {
        let report = self.validate(descriptor);

        if !report.valid {
            return Err(AppError::UploadError(report.errors.join(" ")));
        }

        let staging = storage::ensure_upload_root(&self.settings.upload_dir)
            .map_err(|e| AppError::StorageError(format!("Failed to prepare upload dir: {}", e)))?;

        let filename = storage::secure_filename(user_id);
        let staged = storage::stage_upload(&descriptor.temp_path, &staging, &filename)
            .map_err(|e| {
                AppError::StorageError(format!("Failed to move uploaded file: {}", e))
            })?;

        info!(
            original_name = %descriptor.original_name,
            secure_name = %filename,
            file_size = descriptor.reported_size,
            "File uploaded successfully"
        );

        Ok((staged, report))
    }

    /// Run every intake check and collect errors and warnings.
    pub fn validate(&self, descriptor: &UploadDescriptor) -> IntakeReport {
        let mut report = IntakeReport::new();

        if let Some(transfer_error) = descriptor.transfer_error {
            report.reject(transfer_error.message().to_string());
            return report;
        }

        if descriptor.original_name.is_empty() {
            report.reject("Filename is missing".to_string());
            return report;
        }

        if !descriptor.temp_path.exists() {
            report.reject("Uploaded file is not accessible".to_string());
            return report;
        }

        self.check_extension(descriptor, &mut report);
        if !report.valid {
            return report;
        }

        self.check_size(descriptor, &mut report);
        if !report.valid {
            return report;
        }

        self.scan_content(&descriptor.temp_path, &mut report);

        info!(
            filename = %descriptor.original_name,
            valid = report.valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "File validation completed"
        );

        report
    }

    fn check_extension(&self, descriptor: &UploadDescriptor, report: &mut IntakeReport) {
        let extension = Path::new(&descriptor.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        if extension != "csv" {
            report.reject(format!(
                "File extension \"{}\" is not allowed. Allowed extensions: csv",
                extension
            ));
        }

        report.info.extension = extension;
    }

    fn check_size(&self, descriptor: &UploadDescriptor, report: &mut IntakeReport) {
        let size = descriptor.reported_size;
        let max = self.settings.max_file_size;
        report.info.file_size = size;

        if size == 0 {
            report.reject("File is empty".to_string());
            return;
        }

        if size > max {
            report.reject(format!(
                "File size ({}) exceeds maximum allowed size ({})",
                format_size(size),
                format_size(max)
            ));
            return;
        }

        if size > self.settings.size_warning_threshold() {
            report.warnings.push(format!(
                "File is quite large ({}). Processing may take longer",
                format_size(size)
            ));
        }
    }

    /// Lightweight scan of the file body. Everything found here is a
    /// warning; the parser makes the final call.
    fn scan_content(&self, path: &Path, report: &mut IntakeReport) {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => {
                report
                    .warnings
                    .push("Could not scan file content".to_string());
                return;
            }
        };

        report.info.has_bom = bytes.starts_with(&[0xEF, 0xBB, 0xBF])
            || bytes.starts_with(&[0xFE, 0xFF])
            || bytes.starts_with(&[0xFF, 0xFE]);

        report.info.mime_type = sniff_mime(&bytes, &report.info.extension).to_string();
        if !EXPECTED_MIME_TYPES.contains(&report.info.mime_type.as_str()) {
            report.warnings.push(format!(
                "File MIME type \"{}\" is unusual for CSV files",
                report.info.mime_type
            ));
        }

        let content = String::from_utf8_lossy(&bytes);

        if SUSPICIOUS_PATTERNS.iter().any(|p| p.is_match(&content)) {
            report.warnings.push(
                "File contains potentially suspicious content. Review before processing"
                    .to_string(),
            );
        }

        for (index, line) in content.lines().enumerate() {
            if line.len() > MAX_LINE_LENGTH {
                report.warnings.push(format!(
                    "Line {} is extremely long and may cause processing issues",
                    index + 1
                ));
                break;
            }
        }

        if looks_binary(&bytes) {
            report.warnings.push(
                "File may contain binary data or unsupported encoding".to_string(),
            );
        }

        report.info.estimated_rows = content
            .lines()
            .take(1001)
            .count()
            .saturating_sub(1);
    }
}

/// Guess a MIME type from the bytes themselves.
fn sniff_mime(bytes: &[u8], extension: &str) -> &'static str {
    if looks_binary(bytes) {
        return "application/octet-stream";
    }
    if extension == "csv" {
        "text/csv"
    } else {
        "text/plain"
    }
}

/// Binary heuristic: NUL bytes, or invalid UTF-8 together with low
/// control characters that Latin-1 text would not contain either.
fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return true;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return false;
    }
    bytes
        .iter()
        .any(|b| matches!(b, 0x01..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F))
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
