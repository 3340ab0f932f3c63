// ============================================================
// IMPORT RUN REPOSITORY
// ============================================================
// Persistence for the import ledger

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::domain::error::{AppError, Result};
use crate::domain::import_run::{CreatedPageRef, ImportRun, ImportStatus, RowFailure};

pub struct ImportRunRepository {
    pool: SqlitePool,
}

/// Fields required to open a new run.
#[derive(Debug, Clone)]
pub struct NewImportRun {
    pub user_id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
}

/// Filters for the history listing.
#[derive(Debug, Clone, Default)]
pub struct RunListQuery {
    pub user_id: Option<i64>,
    pub status: Option<ImportStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// One page of the history listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunPage {
    pub records: Vec<ImportRun>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregate numbers across runs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImportStatistics {
    pub total_imports: i64,
    pub completed_imports: i64,
    pub failed_imports: i64,
    pub cancelled_imports: i64,
    pub total_rows_processed: i64,
    pub total_pages_created: i64,
    pub total_failed_rows: i64,
    pub avg_file_size: i64,
}

impl ImportRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the ledger table and its indexes.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS import_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                total_rows INTEGER NOT NULL DEFAULT 0,
                processed_rows INTEGER NOT NULL DEFAULT 0,
                successful_rows INTEGER NOT NULL DEFAULT 0,
                failed_rows INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                error_log TEXT NOT NULL DEFAULT '[]',
                created_pages TEXT NOT NULL DEFAULT '[]',
                started_at DATETIME NOT NULL,
                completed_at DATETIME
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create import_runs: {}", e)))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_import_runs_user ON import_runs (user_id)",
            "CREATE INDEX IF NOT EXISTS idx_import_runs_status ON import_runs (status)",
            "CREATE INDEX IF NOT EXISTS idx_import_runs_started ON import_runs (started_at)",
        ] {
            sqlx::query(index)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to create ledger index: {}", e))
                })?;
        }

        Ok(())
    }

    /// Open a new run in pending state and return its id.
    pub async fn create(&self, new_run: &NewImportRun) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO import_runs
                (user_id, filename, original_filename, file_size, status, started_at)
             VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(new_run.user_id)
        .bind(&new_run.filename)
        .bind(&new_run.original_filename)
        .bind(new_run.file_size)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create import record: {}", e)))?;

        let run_id = result.last_insert_rowid();
        info!(run_id, filename = %new_run.filename, "Import record created");
        Ok(run_id)
    }

    /// Advance a run to the next stage, enforcing the state machine.
    pub async fn transition(&self, run_id: i64, next: ImportStatus) -> Result<()> {
        let current = self.get(run_id).await?.status;

        if !current.can_transition_to(next) {
            return Err(AppError::ValidationError(format!(
                "Import {} cannot move from {} to {}",
                run_id, current, next
            )));
        }

        let completed_at = if next.is_terminal() { Some(Utc::now()) } else { None };

        sqlx::query("UPDATE import_runs SET status = ?, completed_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(completed_at)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to update import status: {}", e))
            })?;

        Ok(())
    }

    pub async fn set_total_rows(&self, run_id: i64, total_rows: i64) -> Result<()> {
        sqlx::query("UPDATE import_runs SET total_rows = ? WHERE id = ?")
            .bind(total_rows)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to set total rows: {}", e)))?;
        Ok(())
    }

    /// Update the per-row counters. Called after every materialized row so
    /// progress polling sees live numbers.
    pub async fn update_progress(
        &self,
        run_id: i64,
        processed: i64,
        successful: i64,
        failed: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE import_runs
             SET processed_rows = ?, successful_rows = ?, failed_rows = ?
             WHERE id = ?",
        )
        .bind(processed)
        .bind(successful)
        .bind(failed)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update progress: {}", e)))?;
        Ok(())
    }

    /// Store the serialized result lists of a finished run.
    pub async fn store_results(
        &self,
        run_id: i64,
        created_pages: &[CreatedPageRef],
        error_log: &[RowFailure],
    ) -> Result<()> {
        let created_json = serde_json::to_string(created_pages)
            .map_err(|e| AppError::Internal(format!("Failed to encode created pages: {}", e)))?;
        let errors_json = serde_json::to_string(error_log)
            .map_err(|e| AppError::Internal(format!("Failed to encode error log: {}", e)))?;

        sqlx::query("UPDATE import_runs SET created_pages = ?, error_log = ? WHERE id = ?")
            .bind(created_json)
            .bind(errors_json)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to store results: {}", e)))?;
        Ok(())
    }

    /// Mark a run failed, storing the failure message in the error log.
    pub async fn mark_failed(&self, run_id: i64, message: &str) -> Result<()> {
        let failure = vec![RowFailure {
            row_number: 0,
            error: message.to_string(),
            data: Default::default(),
        }];
        let errors_json = serde_json::to_string(&failure)
            .map_err(|e| AppError::Internal(format!("Failed to encode error log: {}", e)))?;

        sqlx::query(
            "UPDATE import_runs SET status = 'failed', error_log = ?, completed_at = ?
             WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(errors_json)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to mark run failed: {}", e)))?;

        error!(run_id, message, "Import run marked failed");
        Ok(())
    }

    pub async fn get(&self, run_id: i64) -> Result<ImportRun> {
        let entity = sqlx::query_as::<_, ImportRunEntity>(
            "SELECT * FROM import_runs WHERE id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch import run: {}", e)))?;

        match entity {
            Some(entity) => Ok(entity.into()),
            None => Err(AppError::NotFound(format!("Import run not found: {}", run_id))),
        }
    }

    /// History listing with user/status filters, newest first.
    pub async fn list(&self, query: &RunListQuery) -> Result<RunPage> {
        let limit = if query.limit > 0 { query.limit.min(100) } else { 20 };
        let offset = query.offset.max(0);
        let status = query.status.map(|s| s.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM import_runs
             WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR status = ?)",
        )
        .bind(query.user_id)
        .bind(query.user_id)
        .bind(&status)
        .bind(&status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count import runs: {}", e)))?;

        let entities = sqlx::query_as::<_, ImportRunEntity>(
            "SELECT * FROM import_runs
             WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR status = ?)
             ORDER BY started_at DESC
             LIMIT ? OFFSET ?",
        )
        .bind(query.user_id)
        .bind(query.user_id)
        .bind(&status)
        .bind(&status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list import runs: {}", e)))?;

        Ok(RunPage {
            records: entities.into_iter().map(Into::into).collect(),
            total,
            limit,
            offset,
        })
    }

    /// The most recent runs, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<ImportRun>> {
        let entities = sqlx::query_as::<_, ImportRunEntity>(
            "SELECT * FROM import_runs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list recent runs: {}", e)))?;

        Ok(entities.into_iter().map(Into::into).collect())
    }

    pub async fn statistics(&self) -> Result<ImportStatistics> {
        let row = sqlx::query_as::<_, StatisticsEntity>(
            "SELECT
                COUNT(*) AS total_imports,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed_imports,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed_imports,
                COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0) AS cancelled_imports,
                COALESCE(SUM(total_rows), 0) AS total_rows_processed,
                COALESCE(SUM(successful_rows), 0) AS total_pages_created,
                COALESCE(SUM(failed_rows), 0) AS total_failed_rows,
                COALESCE(AVG(file_size), 0.0) AS avg_file_size
             FROM import_runs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to compute statistics: {}", e)))?;

        Ok(row.into())
    }

    pub async fn delete(&self, run_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM import_runs WHERE id = ?")
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete import run: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Import run not found: {}", run_id)));
        }

        info!(run_id, "Import record deleted");
        Ok(())
    }

    /// Remove terminal runs older than the given number of days.
    pub async fn cleanup_old(&self, days_old: u32) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::days(days_old as i64);

        let result = sqlx::query(
            "DELETE FROM import_runs
             WHERE started_at < ?
             AND status IN ('completed', 'failed', 'cancelled')",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to clean up runs: {}", e)))?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(deleted, %cutoff, "Old import records cleaned up");
        }
        Ok(deleted)
    }
}

#[derive(sqlx::FromRow)]
struct ImportRunEntity {
    id: i64,
    user_id: i64,
    filename: String,
    original_filename: String,
    file_size: i64,
    total_rows: i64,
    processed_rows: i64,
    successful_rows: i64,
    failed_rows: i64,
    status: String,
    error_log: String,
    created_pages: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ImportRunEntity> for ImportRun {
    fn from(entity: ImportRunEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            filename: entity.filename,
            original_filename: entity.original_filename,
            file_size: entity.file_size,
            total_rows: entity.total_rows,
            processed_rows: entity.processed_rows,
            successful_rows: entity.successful_rows,
            failed_rows: entity.failed_rows,
            status: ImportStatus::parse(&entity.status).unwrap_or(ImportStatus::Failed),
            error_log: serde_json::from_str(&entity.error_log).unwrap_or_default(),
            created_pages: serde_json::from_str(&entity.created_pages).unwrap_or_default(),
            started_at: entity.started_at,
            completed_at: entity.completed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatisticsEntity {
    total_imports: i64,
    completed_imports: i64,
    failed_imports: i64,
    cancelled_imports: i64,
    total_rows_processed: i64,
    total_pages_created: i64,
    total_failed_rows: i64,
    avg_file_size: f64,
}

impl From<StatisticsEntity> for ImportStatistics {
    fn from(entity: StatisticsEntity) -> Self {
        Self {
            total_imports: entity.total_imports,
            completed_imports: entity.completed_imports,
            failed_imports: entity.failed_imports,
            cancelled_imports: entity.cancelled_imports,
            total_rows_processed: entity.total_rows_processed,
            total_pages_created: entity.total_pages_created,
            total_failed_rows: entity.total_failed_rows,
            avg_file_size: entity.avg_file_size as i64,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_repository() -> ImportRunRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        let repo = ImportRunRepository::new(pool);
        repo.init_schema().await.expect("init ledger schema");
        repo
    }

    pub(crate) fn sample_run(name: &str) -> NewImportRun {
        NewImportRun {
            user_id: 1,
            filename: format!("csv_1_123_{}.csv", name),
            original_filename: format!("{}.csv", name),
            file_size: 128,
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_run() {
        let repo = memory_repository().await;
        let id = repo.create(&sample_run("pages")).await.unwrap();

        let run = repo.get(id).await.unwrap();
        assert_eq!(run.status, ImportStatus::Pending);
        assert_eq!(run.original_filename, "pages.csv");
        assert_eq!(run.processed_rows, 0);
        assert!(run.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_stage_transitions_enforced() {
        let repo = memory_repository().await;
        let id = repo.create(&sample_run("a")).await.unwrap();

        repo.transition(id, ImportStatus::Parsing).await.unwrap();
        repo.transition(id, ImportStatus::Validating).await.unwrap();

        let err = repo.transition(id, ImportStatus::Completed).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        repo.transition(id, ImportStatus::Processing).await.unwrap();
        repo.transition(id, ImportStatus::Completed).await.unwrap();

        let run = repo.get(id).await.unwrap();
        assert_eq!(run.status, ImportStatus::Completed);
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_from_any_live_state() {
        let repo = memory_repository().await;
        let id = repo.create(&sample_run("b")).await.unwrap();

        repo.transition(id, ImportStatus::Cancelled).await.unwrap();
        let run = repo.get(id).await.unwrap();
        assert_eq!(run.status, ImportStatus::Cancelled);

        let err = repo.transition(id, ImportStatus::Parsing).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_progress_and_results_round_trip() {
        let repo = memory_repository().await;
        let id = repo.create(&sample_run("c")).await.unwrap();

        repo.set_total_rows(id, 5).await.unwrap();
        repo.update_progress(id, 3, 2, 1).await.unwrap();

        let pages = vec![CreatedPageRef {
            page_id: 11,
            title: "T".to_string(),
            slug: "t".to_string(),
            row_number: 2,
        }];
        let failures = vec![RowFailure {
            row_number: 3,
            error: "boom".to_string(),
            data: Default::default(),
        }];
        repo.store_results(id, &pages, &failures).await.unwrap();

        let run = repo.get(id).await.unwrap();
        assert_eq!(run.total_rows, 5);
        assert_eq!(run.processed_rows, 3);
        assert_eq!(run.created_pages.len(), 1);
        assert_eq!(run.error_log[0].error, "boom");
    }

    #[tokio::test]
    async fn test_mark_failed_does_not_touch_terminal_runs() {
        let repo = memory_repository().await;
        let id = repo.create(&sample_run("d")).await.unwrap();
        repo.transition(id, ImportStatus::Cancelled).await.unwrap();

        repo.mark_failed(id, "late failure").await.unwrap();
        let run = repo.get(id).await.unwrap();
        assert_eq!(run.status, ImportStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let repo = memory_repository().await;
        let first = repo.create(&sample_run("e")).await.unwrap();
        let _second = repo.create(&sample_run("f")).await.unwrap();
        repo.transition(first, ImportStatus::Failed).await.unwrap();

        let failed = repo
            .list(&RunListQuery {
                status: Some(ImportStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.total, 1);
        assert_eq!(failed.records[0].id, first);

        let everything = repo.list(&RunListQuery::default()).await.unwrap();
        assert_eq!(everything.total, 2);
    }

    #[tokio::test]
    async fn test_statistics_aggregate() {
        let repo = memory_repository().await;
        let a = repo.create(&sample_run("g")).await.unwrap();
        let b = repo.create(&sample_run("h")).await.unwrap();

        repo.set_total_rows(a, 4).await.unwrap();
        repo.update_progress(a, 4, 3, 1).await.unwrap();
        repo.transition(a, ImportStatus::Parsing).await.unwrap();
        repo.transition(a, ImportStatus::Validating).await.unwrap();
        repo.transition(a, ImportStatus::Processing).await.unwrap();
        repo.transition(a, ImportStatus::Completed).await.unwrap();
        repo.transition(b, ImportStatus::Failed).await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total_imports, 2);
        assert_eq!(stats.completed_imports, 1);
        assert_eq!(stats.failed_imports, 1);
        assert_eq!(stats.total_rows_processed, 4);
        assert_eq!(stats.total_pages_created, 3);
        assert_eq!(stats.total_failed_rows, 1);
        assert_eq!(stats.avg_file_size, 128);
    }

    #[tokio::test]
    async fn test_delete_and_cleanup() {
        let repo = memory_repository().await;
        let id = repo.create(&sample_run("i")).await.unwrap();

        repo.delete(id).await.unwrap();
        assert!(matches!(repo.get(id).await, Err(AppError::NotFound(_))));

        // Nothing old enough to clean up
        let other = repo.create(&sample_run("j")).await.unwrap();
        repo.transition(other, ImportStatus::Failed).await.unwrap();
        assert_eq!(repo.cleanup_old(30).await.unwrap(), 0);
        assert_eq!(repo.cleanup_old(0).await.unwrap(), 1);
    }
}
