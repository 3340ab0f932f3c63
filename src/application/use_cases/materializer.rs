// ============================================================
// PAGE MATERIALIZER USE CASE
// ============================================================
// Turn validated rows into created pages, batch by batch

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::import_run::{CreatedPageRef, ImportStatus, RowFailure};
use crate::domain::payload::ContentPayload;
use crate::domain::rules::{slugify, ALLOWED_STATUSES};
use crate::domain::validation::ValidationOutcome;
use crate::infrastructure::content::ContentStore;
use crate::infrastructure::db::ImportRunRepository;
use crate::infrastructure::media::FeaturedImageFetcher;

/// Options governing one materialization pass.
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub batch_size: usize,
    pub default_status: String,
    pub default_author: i64,
    pub skip_errors: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            default_status: "draft".to_string(),
            default_author: 1,
            skip_errors: true,
        }
    }
}

/// Aggregate result of one materialization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterializationReport {
    pub created_pages: Vec<CreatedPageRef>,
    pub failed_pages: Vec<RowFailure>,
    pub total_processed: usize,
    /// True when the run was cancelled before all rows were attempted
    pub cancelled: bool,
}

/// Creates one page per valid row and keeps the ledger counters live.
pub struct PageMaterializer {
    store: Arc<dyn ContentStore>,
    images: FeaturedImageFetcher,
    ledger: Arc<ImportRunRepository>,
}

impl PageMaterializer {
    pub fn new(store: Arc<dyn ContentStore>, ledger: Arc<ImportRunRepository>) -> Self {
        let images = FeaturedImageFetcher::new(store.clone());
        Self {
            store,
            images,
            ledger,
        }
    }

    /// Create pages for every valid outcome.
    ///
    /// Batching only drives periodic cache flushing and the cooperative
    /// cancellation check; counters are written after every row so
    /// progress polling sees live numbers.
    pub async fn materialize(
        &self,
        run_id: i64,
        outcomes: &[ValidationOutcome],
        options: &ProcessingOptions,
    ) -> Result<MaterializationReport> {
        let mut report = MaterializationReport::default();

        let valid: Vec<&ValidationOutcome> = outcomes.iter().filter(|o| o.valid).collect();
        let batch_size = options.batch_size.max(1);
        let total_batches = valid.len().div_ceil(batch_size);

        for (batch_index, batch) in valid.chunks(batch_size).enumerate() {
            if self.run_cancelled(run_id).await? {
                info!(run_id, "Import cancelled; stopping before next batch");
                report.cancelled = true;
                break;
            }

            debug!(
                batch_index = batch_index + 1,
                batch_size = batch.len(),
                total_batches,
                "Processing batch"
            );

            for outcome in batch {
                match self.create_one(run_id, outcome, options).await {
                    Ok(page_ref) => {
                        report.created_pages.push(page_ref);
                    }
                    Err(e) => {
                        error!(
                            run_id,
                            row_number = outcome.row_number,
                            error = %e,
                            "Failed to create page from CSV row"
                        );
                        report.failed_pages.push(RowFailure {
                            row_number: outcome.row_number,
                            error: e.to_string(),
                            data: outcome.data.clone(),
                        });

                        if !options.skip_errors {
                            report.total_processed =
                                report.created_pages.len() + report.failed_pages.len();
                            self.update_counters(run_id, &report).await?;
                            return Err(e);
                        }
                    }
                }

                report.total_processed =
                    report.created_pages.len() + report.failed_pages.len();
                self.update_counters(run_id, &report).await?;
            }

            // Memory-pressure mitigation between batches
            self.store.flush_cache().await?;
        }

        info!(
            run_id,
            created = report.created_pages.len(),
            failed = report.failed_pages.len(),
            cancelled = report.cancelled,
            "Materialization finished"
        );

        Ok(report)
    }

    async fn create_one(
        &self,
        run_id: i64,
        outcome: &ValidationOutcome,
        options: &ProcessingOptions,
    ) -> Result<CreatedPageRef> {
        let default_status = if ALLOWED_STATUSES.contains(&options.default_status.as_str()) {
            options.default_status.as_str()
        } else {
            "draft"
        };
        let author_id = if options.default_author > 0 {
            options.default_author
        } else {
            1
        };

        let payload = ContentPayload::from_row(
            &outcome.data,
            outcome.row_number,
            run_id,
            default_status,
            author_id,
        )
        .ok_or_else(|| {
            AppError::ValidationError(
                "Row is missing a title or description".to_string(),
            )
        })?;

        let slug = self.resolve_unique_slug(&payload).await?;

        debug!(title = %payload.title, slug = %slug, "Creating page");
        let created = self.store.create_page(&payload, &slug).await?;

        for (key, value) in &payload.metadata {
            self.store.set_page_meta(created.id, key, value).await?;
        }

        if !payload.tags.is_empty() {
            self.store.set_page_tags(created.id, &payload.tags).await?;
        }

        if let Some(image_url) = payload.featured_image_url() {
            if let Err(e) = self.images.attach(created.id, image_url).await {
                warn!(
                    page_id = created.id,
                    image_url,
                    error = %e,
                    "Failed to set featured image"
                );
            }
        }

        info!(
            page_id = created.id,
            title = %payload.title,
            slug = %created.slug,
            "Page created successfully"
        );

        Ok(CreatedPageRef {
            page_id: created.id,
            title: payload.title,
            slug: created.slug,
            row_number: outcome.row_number,
        })
    }

    /// Row-supplied slug, or one derived from the title, suffixed with
    /// `-1`, `-2`, … until no existing page claims it.
    async fn resolve_unique_slug(&self, payload: &ContentPayload) -> Result<String> {
        let base = match &payload.slug {
            Some(slug) if !slug.is_empty() => slug.clone(),
            _ => slugify(&payload.title),
        };
        let base = if base.is_empty() { "page".to_string() } else { base };

        let mut candidate = base.clone();
        let mut counter = 1;

        while self.store.slug_exists(&candidate).await? {
            candidate = format!("{}-{}", base, counter);
            counter += 1;
        }

        Ok(candidate)
    }

    async fn run_cancelled(&self, run_id: i64) -> Result<bool> {
        Ok(self.ledger.get(run_id).await?.status == ImportStatus::Cancelled)
    }

    async fn update_counters(
        &self,
        run_id: i64,
        report: &MaterializationReport,
    ) -> Result<()> {
        self.ledger
            .update_progress(
                run_id,
                report.total_processed as i64,
                report.created_pages.len() as i64,
                report.failed_pages.len() as i64,
            )
            .await
    }
}
