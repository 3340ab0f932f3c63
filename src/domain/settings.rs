// ============================================================
// IMPORTER SETTINGS
// ============================================================
// Process-wide configuration, built once and threaded explicitly

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the import service.
///
/// Loaded once at startup from `importer.toml` plus `CSV_IMPORTER_*`
/// environment variables and passed to the pipeline by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImporterSettings {
    /// SQLite database URL for the import ledger and page store
    pub database_url: String,

    /// Directory where accepted uploads are staged (not web-served)
    pub upload_dir: PathBuf,

    /// Bind address for the HTTP API
    pub bind_addr: String,

    /// Shared token required on mutating endpoints
    pub api_token: String,

    /// Maximum accepted upload size in bytes (default: 10MB)
    pub max_file_size: u64,

    /// Maximum number of data rows accepted per file (default: 10000)
    pub max_rows: usize,

    /// Rows per materialization batch (default: 100)
    pub batch_size: usize,

    /// Page status applied when a row declares none
    pub default_status: String,

    /// Author id applied to created pages
    pub default_author: i64,

    /// Continue past row-level creation failures
    pub skip_errors: bool,

    /// Age in days after which terminal runs are cleaned up
    pub cleanup_days: u32,
}

impl Default for ImporterSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/importer.db".to_string(),
            upload_dir: PathBuf::from("data/csv-imports"),
            bind_addr: "127.0.0.1:8088".to_string(),
            api_token: String::new(),
            max_file_size: 10 * 1024 * 1024,
            max_rows: 10_000,
            batch_size: 100,
            default_status: "draft".to_string(),
            default_author: 1,
            skip_errors: true,
            cleanup_days: 30,
        }
    }
}

impl ImporterSettings {
    /// Load settings from `importer.toml` and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(ImporterSettings::default()))
            .merge(Toml::file("importer.toml"))
            .merge(Env::prefixed("CSV_IMPORTER_"))
            .extract()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_size == 0 {
            return Err("max_file_size must be > 0".to_string());
        }
        if self.max_rows == 0 {
            return Err("max_rows must be > 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.api_token.is_empty() {
            return Err("api_token must be configured".to_string());
        }
        if !crate::domain::rules::ALLOWED_STATUSES.contains(&self.default_status.as_str()) {
            return Err(format!(
                "default_status must be one of: {}",
                crate::domain::rules::ALLOWED_STATUSES.join(", ")
            ));
        }
        Ok(())
    }

    /// Size at which intake starts warning about large files.
    pub fn size_warning_threshold(&self) -> u64 {
        (self.max_file_size as f64 * 0.8) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ImporterSettings {
        ImporterSettings {
            api_token: "secret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_valid_once_token_set() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_missing_token_rejected() {
        let settings = ImporterSettings::default();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_default_status_rejected() {
        let settings = ImporterSettings {
            default_status: "published".to_string(),
            ..configured()
        };
        assert!(settings.validate().unwrap_err().contains("default_status"));
    }

    #[test]
    fn test_size_warning_threshold() {
        let settings = ImporterSettings {
            max_file_size: 1000,
            ..configured()
        };
        assert_eq!(settings.size_warning_threshold(), 800);
    }
}
