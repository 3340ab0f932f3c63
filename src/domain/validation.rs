// ============================================================
// VALIDATION OUTCOMES
// ============================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of validating one mapped record.
///
/// Exists only for the duration of a validation pass; the materializer
/// consumes the sanitized data of valid outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Field values after sanitization and default substitution
    pub data: HashMap<String, String>,
    pub row_number: usize,
}

impl ValidationOutcome {
    pub fn new(row_number: usize) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            data: HashMap::new(),
            row_number,
        }
    }
}

/// Aggregate of validating a whole parsed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub warnings: usize,
    pub row_results: Vec<ValidationOutcome>,
}

impl ValidationSummary {
    pub fn valid_outcomes(&self) -> impl Iterator<Item = &ValidationOutcome> {
        self.row_results.iter().filter(|r| r.valid)
    }
}
