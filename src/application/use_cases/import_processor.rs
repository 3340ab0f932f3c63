// ============================================================
// IMPORT PROCESSOR USE CASE
// ============================================================
// Orchestrate parse -> validate -> materialize with ledger tracking

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::application::use_cases::materializer::{PageMaterializer, ProcessingOptions};
use crate::application::use_cases::row_validator::RowValidator;
use crate::domain::error::Result;
use crate::domain::import_run::{CreatedPageRef, ImportRun, ImportStatus, RowFailure};
use crate::domain::record::{ParseOptions, ParsedCsv};
use crate::domain::settings::ImporterSettings;
use crate::infrastructure::content::ContentStore;
use crate::infrastructure::csv::CsvReader;
use crate::infrastructure::db::ImportRunRepository;
use crate::infrastructure::storage;

/// Per-run facts recorded in the ledger at upload acceptance.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub user_id: i64,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_size: i64,
}

/// Final results of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub import_id: i64,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub processed_rows: usize,
    pub created_pages: usize,
    pub failed_pages: usize,
    pub warnings: usize,
    pub cancelled: bool,
    pub pages: Vec<CreatedPageRef>,
    pub errors: Vec<RowFailure>,
}

/// Drives one uploaded file through the whole pipeline.
///
/// All collaborators are injected once at startup; the processor holds no
/// global state and can run any number of sequential imports.
pub struct ImportProcessor {
    ledger: Arc<ImportRunRepository>,
    validator: RowValidator,
    materializer: PageMaterializer,
    settings: ImporterSettings,
}

impl ImportProcessor {
    pub fn new(
        store: Arc<dyn ContentStore>,
        ledger: Arc<ImportRunRepository>,
        settings: ImporterSettings,
    ) -> Self {
        Self {
            validator: RowValidator::new(store.clone()),
            materializer: PageMaterializer::new(store, ledger.clone()),
            ledger,
            settings,
        }
    }

    /// Run the full pipeline over a staged file.
    ///
    /// The staged file is removed on every exit path. Any failure marks
    /// the ledger record failed with the message as its error log, then
    /// propagates to the caller.
    pub async fn process_file(
        &self,
        path: &Path,
        context: &RunContext,
        options: &ProcessingOptions,
    ) -> Result<ImportReport> {
        let run_id = self
            .ledger
            .create(&crate::infrastructure::db::import_runs::NewImportRun {
                user_id: context.user_id,
                filename: context.stored_filename.clone(),
                original_filename: context.original_filename.clone(),
                file_size: context.file_size,
            })
            .await?;

        info!(
            run_id,
            file = %path.display(),
            original = %context.original_filename,
            "Starting CSV file processing"
        );

        let result = self.run_pipeline(run_id, path, options).await;

        storage::remove_staged(path);

        match result {
            Ok(report) => {
                info!(
                    run_id,
                    created = report.created_pages,
                    failed = report.failed_pages,
                    "CSV processing completed"
                );
                Ok(report)
            }
            Err(e) => {
                error!(run_id, error = %e, "CSV processing failed");
                if let Err(mark_err) = self.ledger.mark_failed(run_id, &e.to_string()).await {
                    error!(run_id, error = %mark_err, "Failed to record run failure");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        run_id: i64,
        path: &Path,
        options: &ProcessingOptions,
    ) -> Result<ImportReport> {
        self.ledger.transition(run_id, ImportStatus::Parsing).await?;
        let reader = CsvReader::new(ParseOptions {
            max_rows: self.settings.max_rows,
            ..Default::default()
        });
        let parsed = reader.read_file(path)?;

        self.ledger
            .transition(run_id, ImportStatus::Validating)
            .await?;
        let summary = self.validator.validate_dataset(&parsed).await?;

        self.ledger
            .transition(run_id, ImportStatus::Processing)
            .await?;
        self.ledger
            .set_total_rows(run_id, parsed.total_rows as i64)
            .await?;

        let materialized = self
            .materializer
            .materialize(run_id, &summary.row_results, options)
            .await?;

        let mut errors = parser_failures(&parsed);
        errors.extend(materialized.failed_pages.iter().cloned());

        self.ledger
            .store_results(run_id, &materialized.created_pages, &errors)
            .await?;

        if !materialized.cancelled {
            self.ledger
                .transition(run_id, ImportStatus::Completed)
                .await?;
        }

        Ok(ImportReport {
            import_id: run_id,
            total_rows: parsed.total_rows,
            valid_rows: summary.valid_rows,
            invalid_rows: summary.invalid_rows + parsed.error_rows,
            processed_rows: materialized.total_processed,
            created_pages: materialized.created_pages.len(),
            failed_pages: errors.len(),
            warnings: summary.warnings + parsed.warnings.len(),
            cancelled: materialized.cancelled,
            pages: materialized.created_pages,
            errors,
        })
    }

    /// Current ledger state, for progress polling.
    pub async fn progress(&self, run_id: i64) -> Result<ImportRun> {
        self.ledger.get(run_id).await
    }

    /// Request cancellation. The running pipeline notices at the next
    /// batch boundary; rows already created are kept.
    pub async fn cancel(&self, run_id: i64) -> Result<()> {
        self.ledger
            .transition(run_id, ImportStatus::Cancelled)
            .await?;
        info!(run_id, "Import cancelled by user");
        Ok(())
    }
}

/// Rows the parser rejected, carried into the run's error log with their
/// original cell values.
fn parser_failures(parsed: &ParsedCsv) -> Vec<RowFailure> {
    parsed
        .errors
        .iter()
        .map(|row_error| {
            let data = parsed
                .headers
                .iter()
                .zip(row_error.raw_data.iter())
                .map(|(header, cell)| (header.normalized.clone(), cell.clone()))
                .collect();
            RowFailure {
                row_number: row_error.row_number,
                error: row_error.error.clone(),
                data,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::{META_SOURCE_ROW, META_SOURCE_RUN};
    use crate::infrastructure::content::sqlite_store::tests::{memory_store, payload};
    use crate::infrastructure::content::SqlitePageStore;
    use crate::infrastructure::db::import_runs::tests::memory_repository;
    use std::io::Write;
    use std::path::PathBuf;

    struct Harness {
        store: Arc<SqlitePageStore>,
        ledger: Arc<ImportRunRepository>,
        processor: ImportProcessor,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let store = Arc::new(memory_store().await);
        let ledger = Arc::new(memory_repository().await);
        let settings = ImporterSettings {
            api_token: "secret".to_string(),
            ..Default::default()
        };
        let processor = ImportProcessor::new(store.clone(), ledger.clone(), settings);
        Harness {
            store,
            ledger,
            processor,
            _dir: tempfile::tempdir().unwrap(),
        }
    }

    fn stage_csv(harness: &Harness, content: &str) -> PathBuf {
        let path = harness._dir.path().join(format!(
            "csv_1_{}_test.csv",
            uuid::Uuid::new_v4().simple()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn context(path: &PathBuf) -> RunContext {
        RunContext {
            user_id: 1,
            original_filename: "pages.csv".to_string(),
            stored_filename: path.file_name().unwrap().to_string_lossy().to_string(),
            file_size: std::fs::metadata(path).unwrap().len() as i64,
        }
    }

    #[tokio::test]
    async fn test_scenario_three_clean_rows() {
        let harness = harness().await;
        let path = stage_csv(
            &harness,
            "title,description\nPage One,Body one\nPage Two,Body two\nPage Three,Body three",
        );

        let report = harness
            .processor
            .process_file(&path, &context(&path), &ProcessingOptions::default())
            .await
            .unwrap();

        assert_eq!(report.created_pages, 3);
        assert_eq!(report.failed_pages, 0);
        assert_eq!(report.total_rows, 3);

        // Each page carries back-references to the run and its source row
        let expected_rows = ["2", "3", "4"];
        for (page, expected_row) in report.pages.iter().zip(expected_rows) {
            let run_ref = harness
                .store
                .meta_value(page.page_id, META_SOURCE_RUN)
                .await
                .unwrap();
            assert_eq!(run_ref.unwrap(), report.import_id.to_string());

            let row_ref = harness
                .store
                .meta_value(page.page_id, META_SOURCE_ROW)
                .await
                .unwrap();
            assert_eq!(row_ref.unwrap(), expected_row);
        }

        // Slugs are pairwise distinct
        let mut slugs: Vec<_> = report.pages.iter().map(|p| p.slug.clone()).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), 3);

        // The staged file was cleaned up and the run completed
        assert!(!path.exists());
        let run = harness.ledger.get(report.import_id).await.unwrap();
        assert_eq!(run.status, ImportStatus::Completed);
        assert_eq!(run.total_rows, 3);
        assert_eq!(run.successful_rows, 3);
    }

    #[tokio::test]
    async fn test_scenario_row_with_empty_description() {
        let harness = harness().await;
        let path = stage_csv(
            &harness,
            "title,description\nFirst,Body\nSecond,\nThird,Body",
        );

        let report = harness
            .processor
            .process_file(&path, &context(&path), &ProcessingOptions::default())
            .await
            .unwrap();

        assert_eq!(report.valid_rows, 2);
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(report.created_pages, 2);

        // The failed row's original data is present in the recorded errors
        let run = harness.ledger.get(report.import_id).await.unwrap();
        assert_eq!(run.error_log.len(), 1);
        assert_eq!(run.error_log[0].row_number, 3);
        assert_eq!(run.error_log[0].data.get("title").unwrap(), "Second");
    }

    #[tokio::test]
    async fn test_scenario_missing_description_header() {
        let harness = harness().await;
        let path = stage_csv(&harness, "title,slug\nOnly,one");

        let err = harness
            .processor
            .process_file(&path, &context(&path), &ProcessingOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("description"));

        // The run failed during parsing and never reached processing
        let runs = harness.ledger.recent(1).await.unwrap();
        assert_eq!(runs[0].status, ImportStatus::Failed);
        assert_eq!(runs[0].processed_rows, 0);
        assert!(runs[0].error_log[0].error.contains("description"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scenario_duplicate_title_gets_suffixed_slug() {
        let harness = harness().await;
        harness
            .store
            .create_page(&payload("Welcome", "Old body"), "welcome")
            .await
            .unwrap();

        let path = stage_csv(&harness, "title,description\nWelcome,New body");
        let report = harness
            .processor
            .process_file(&path, &context(&path), &ProcessingOptions::default())
            .await
            .unwrap();

        // Duplicate title is a warning, not an error
        assert_eq!(report.created_pages, 1);
        assert_eq!(report.failed_pages, 0);
        assert!(report.warnings >= 1);
        assert_eq!(report.pages[0].slug, "welcome-1");
    }

    #[tokio::test]
    async fn test_cancelled_before_processing_creates_nothing() {
        let harness = harness().await;
        let path = stage_csv(&harness, "title,description\nA,B");

        // Cancel the freshly created run as soon as the ledger sees it.
        // Cooperative cancellation is only checked between batches, so a
        // pre-cancelled run must produce zero pages.
        let run_id = harness
            .ledger
            .create(&crate::infrastructure::db::import_runs::NewImportRun {
                user_id: 1,
                filename: "f.csv".to_string(),
                original_filename: "f.csv".to_string(),
                file_size: 1,
            })
            .await
            .unwrap();
        harness.processor.cancel(run_id).await.unwrap();

        let run = harness.ledger.get(run_id).await.unwrap();
        assert_eq!(run.status, ImportStatus::Cancelled);

        // A cancelled run cannot be cancelled twice
        assert!(harness.processor.cancel(run_id).await.is_err());
        drop(path);
    }

    #[tokio::test]
    async fn test_progress_reflects_counts_mid_run() {
        let harness = harness().await;
        let path = stage_csv(&harness, "title,description\nA,1\nB,2");

        let report = harness
            .processor
            .process_file(&path, &context(&path), &ProcessingOptions::default())
            .await
            .unwrap();

        let progress = harness.processor.progress(report.import_id).await.unwrap();
        assert_eq!(progress.processed_rows, 2);
        assert_eq!(progress.successful_rows, 2);
        assert!(progress.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_row_cap_truncation_warns() {
        let store = Arc::new(memory_store().await);
        let ledger = Arc::new(memory_repository().await);
        let settings = ImporterSettings {
            api_token: "secret".to_string(),
            max_rows: 2,
            ..Default::default()
        };
        let processor = ImportProcessor::new(store, ledger, settings);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capped.csv");
        std::fs::write(&path, "title,description\nA,1\nB,2\nC,3\nD,4").unwrap();

        let report = processor
            .process_file(
                &path,
                &RunContext {
                    user_id: 1,
                    original_filename: "capped.csv".to_string(),
                    stored_filename: "capped.csv".to_string(),
                    file_size: 10,
                },
                &ProcessingOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.created_pages, 2);
        assert_eq!(report.total_rows, 2);
        assert!(report.warnings >= 1);
    }
}
