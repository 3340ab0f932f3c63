// ============================================================
// ROW VALIDATOR USE CASE
// ============================================================
// Apply the field rule table to parsed records

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::domain::error::Result;
use crate::domain::record::{ParsedCsv, ParsedRecord};
use crate::domain::rules::{FieldRule, FIELD_RULES};
use crate::domain::validation::{ValidationOutcome, ValidationSummary};
use crate::infrastructure::content::ContentStore;

/// Longest category name accepted without a warning.
const MAX_CATEGORY_LENGTH: usize = 50;
/// Recommended ceiling for SEO descriptions.
const META_DESCRIPTION_LENGTH: usize = 160;

/// Validates mapped records against the fixed rule set.
///
/// Validation is stateless: running the same record through twice yields
/// the same outcome. The content store is only consulted for duplicate
/// title/slug lookups, which produce warnings, never errors.
pub struct RowValidator {
    store: Arc<dyn ContentStore>,
}

impl RowValidator {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Validate one record. Errors accumulate across fields; the first
    /// failure never short-circuits the rest of the row.
    pub async fn validate_record(&self, record: &ParsedRecord) -> Result<ValidationOutcome> {
        let mut outcome = ValidationOutcome::new(record.row_number);

        for rule in FIELD_RULES.iter() {
            let raw = record.field(rule.name);
            self.validate_field(rule, raw, &mut outcome).await?;
        }

        if !outcome.valid {
            warn!(
                row_number = record.row_number,
                errors = ?outcome.errors,
                "Row validation failed"
            );
        }

        Ok(outcome)
    }

    /// Validate every mapped row of a parsed file.
    pub async fn validate_dataset(&self, parsed: &ParsedCsv) -> Result<ValidationSummary> {
        let mut summary = ValidationSummary {
            total_rows: parsed.rows.len(),
            valid_rows: 0,
            invalid_rows: 0,
            warnings: 0,
            row_results: Vec::with_capacity(parsed.rows.len()),
        };

        for record in &parsed.rows {
            let outcome = self.validate_record(record).await?;

            if outcome.valid {
                summary.valid_rows += 1;
            } else {
                summary.invalid_rows += 1;
            }
            summary.warnings += outcome.warnings.len();
            summary.row_results.push(outcome);
        }

        info!(
            total_rows = summary.total_rows,
            valid_rows = summary.valid_rows,
            invalid_rows = summary.invalid_rows,
            warnings = summary.warnings,
            "Dataset validation completed"
        );

        Ok(summary)
    }

    async fn validate_field(
        &self,
        rule: &FieldRule,
        raw: &str,
        outcome: &mut ValidationOutcome,
    ) -> Result<()> {
        if raw.is_empty() {
            if rule.required {
                outcome.valid = false;
                outcome.errors.push(format!(
                    "Field \"{}\" is required and cannot be empty",
                    rule.name
                ));
                outcome.data.insert(rule.name.to_string(), String::new());
                return Ok(());
            }

            let substituted = rule.default.unwrap_or("");
            outcome
                .data
                .insert(rule.name.to_string(), substituted.to_string());
            return Ok(());
        }

        let value = rule.sanitizer.apply(raw);

        if let Some(max_length) = rule.max_length {
            let length = value.chars().count();
            if length > max_length {
                outcome.valid = false;
                outcome.errors.push(format!(
                    "Field \"{}\" is too long ({} characters). Maximum allowed: {} characters",
                    rule.name, length, max_length
                ));
            }
        }

        if let Some(min_length) = rule.min_length {
            let length = value.chars().count();
            if length < min_length {
                outcome.valid = false;
                outcome.errors.push(format!(
                    "Field \"{}\" is too short ({} characters). Minimum required: {} characters",
                    rule.name, length, min_length
                ));
            }
        }

        if let Some(pattern) = rule.pattern {
            if !pattern.is_match(&value) {
                outcome.valid = false;
                outcome.errors.push(format!(
                    "Field \"{}\" contains invalid characters or format",
                    rule.name
                ));
            }
        }

        if let Some(allowed) = rule.allowed {
            if !allowed.contains(&value.as_str()) {
                outcome.valid = false;
                outcome.errors.push(format!(
                    "Field \"{}\" has invalid value \"{}\". Allowed values: {}",
                    rule.name,
                    value,
                    allowed.join(", ")
                ));
            }
        }

        self.validate_field_specific(rule.name, &value, outcome)
            .await?;

        outcome.data.insert(rule.name.to_string(), value);
        Ok(())
    }

    async fn validate_field_specific(
        &self,
        field_name: &str,
        value: &str,
        outcome: &mut ValidationOutcome,
    ) -> Result<()> {
        match field_name {
            "title" => {
                if self.store.title_exists(value).await? {
                    outcome.warnings.push(format!(
                        "A page with title \"{}\" already exists. A unique slug will be generated",
                        value
                    ));
                }
            }
            "slug" => {
                if self.store.slug_exists(value).await? {
                    outcome.warnings.push(format!(
                        "A page with slug \"{}\" already exists. A unique slug will be generated",
                        value
                    ));
                }
            }
            "featured_image_url" => {
                if Url::parse(value).is_err() {
                    outcome.valid = false;
                    outcome
                        .errors
                        .push("Featured image URL is not a valid URL".to_string());
                }
            }
            "categories" => {
                for category in value.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                    if category.chars().count() > MAX_CATEGORY_LENGTH {
                        outcome.warnings.push(format!(
                            "Category name \"{}\" is very long and may be truncated",
                            category
                        ));
                    }
                }
            }
            "meta_description" => {
                if value.chars().count() > META_DESCRIPTION_LENGTH {
                    outcome.warnings.push(
                        "Meta description is longer than the recommended 160 characters"
                            .to_string(),
                    );
                }
            }
            _ => {}
        }

        Ok(())
    }
}
