// ============================================================
// SQLITE PAGE STORE
// ============================================================
// ContentStore implementation backed by local SQLite tables

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use super::{ContentStore, CreatedPage};
use crate::domain::error::{AppError, Result};
use crate::domain::payload::ContentPayload;

pub struct SqlitePageStore {
    pool: SqlitePool,
}

impl SqlitePageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read back one metadata value.
    pub async fn meta_value(&self, page_id: i64, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT meta_value FROM page_meta WHERE page_id = ? AND meta_key = ?",
        )
        .bind(page_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to read page meta: {}", e)))
    }

    /// Create the page, metadata, tag, and attachment tables.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                body TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                author_id INTEGER NOT NULL,
                featured_image_id INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create pages table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS page_meta (
                page_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL,
                PRIMARY KEY (page_id, meta_key)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create page_meta table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS page_tags (
                page_id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (page_id, tag)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create page_tags table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                source_url TEXT NOT NULL,
                byte_size INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create attachments table: {}", e))
        })?;

        Ok(())
    }
}

#[async_trait]
impl ContentStore for SqlitePageStore {
    async fn create_page(&self, payload: &ContentPayload, slug: &str) -> Result<CreatedPage> {
        if payload.title.is_empty() {
            return Err(AppError::ValidationError("Page title is required".to_string()));
        }
        if payload.body.is_empty() {
            return Err(AppError::ValidationError("Page content is required".to_string()));
        }

        let result = sqlx::query(
            "INSERT INTO pages (title, slug, body, status, author_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&payload.title)
        .bind(slug)
        .bind(&payload.body)
        .bind(&payload.status)
        .bind(payload.author_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create page: {}", e)))?;

        Ok(CreatedPage {
            id: result.last_insert_rowid(),
            slug: slug.to_string(),
        })
    }

    async fn title_exists(&self, title: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pages WHERE title = ?")
            .bind(title)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to check title: {}", e)))?;
        Ok(count > 0)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pages WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to check slug: {}", e)))?;
        Ok(count > 0)
    }

    async fn set_page_meta(&self, page_id: i64, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO page_meta (page_id, meta_key, meta_value) VALUES (?, ?, ?)
             ON CONFLICT (page_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
        )
        .bind(page_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to write page meta: {}", e)))?;
        Ok(())
    }

    async fn set_page_tags(&self, page_id: i64, tags: &[String]) -> Result<()> {
        for tag in tags {
            sqlx::query("INSERT OR IGNORE INTO page_tags (page_id, tag) VALUES (?, ?)")
                .bind(page_id)
                .bind(tag)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to attach tag: {}", e)))?;
        }
        Ok(())
    }

    async fn find_attachment_by_filename(&self, filename: &str) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM attachments WHERE filename = ? ORDER BY id LIMIT 1",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to look up attachment: {}", e)))
    }

    async fn register_attachment(
        &self,
        filename: &str,
        source_url: &str,
        data: &[u8],
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO attachments (filename, source_url, byte_size) VALUES (?, ?, ?)",
        )
        .bind(filename)
        .bind(source_url)
        .bind(data.len() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to register attachment: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    async fn set_featured_image(&self, page_id: i64, attachment_id: i64) -> Result<()> {
        sqlx::query("UPDATE pages SET featured_image_id = ? WHERE id = ?")
            .bind(attachment_id)
            .bind(page_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to set featured image: {}", e))
            })?;
        Ok(())
    }

    async fn delete_pages_by_meta(&self, key: &str, value: &str) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM pages WHERE id IN (
                SELECT page_id FROM page_meta WHERE meta_key = ? AND meta_value = ?
            )",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to delete pages: {}", e)))?;

        sqlx::query(
            "DELETE FROM page_meta WHERE meta_key = ? AND meta_value = ?",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to delete page meta: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn flush_cache(&self) -> Result<()> {
        // The SQLite store keeps no application-level cache
        debug!("Content store cache flush requested");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap;

    /// In-memory store for pipeline tests. One connection so every
    /// query sees the same database.
    pub(crate) async fn memory_store() -> SqlitePageStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        let store = SqlitePageStore::new(pool);
        store.init_schema().await.expect("init page store schema");
        store
    }

    pub(crate) fn payload(title: &str, body: &str) -> ContentPayload {
        ContentPayload {
            title: title.to_string(),
            body: body.to_string(),
            status: "draft".to_string(),
            author_id: 1,
            slug: None,
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_page() {
        let store = memory_store().await;
        let created = store.create_page(&payload("About", "Body"), "about").await.unwrap();

        assert!(created.id > 0);
        assert!(store.title_exists("About").await.unwrap());
        assert!(store.slug_exists("about").await.unwrap());
        assert!(!store.slug_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let store = memory_store().await;
        let err = store.create_page(&payload("About", ""), "about").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected_by_store() {
        let store = memory_store().await;
        store.create_page(&payload("A", "B"), "same").await.unwrap();
        let err = store.create_page(&payload("C", "D"), "same").await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
    }

    #[tokio::test]
    async fn test_meta_tags_and_attachments() {
        let store = memory_store().await;
        let page = store.create_page(&payload("A", "B"), "a").await.unwrap();

        store.set_page_meta(page.id, "_k", "v1").await.unwrap();
        store.set_page_meta(page.id, "_k", "v2").await.unwrap();

        store
            .set_page_tags(page.id, &["one".to_string(), "two".to_string()])
            .await
            .unwrap();

        let attachment = store
            .register_attachment("pic.png", "https://example.com/pic.png", &[1, 2, 3])
            .await
            .unwrap();
        assert_eq!(
            store.find_attachment_by_filename("pic.png").await.unwrap(),
            Some(attachment)
        );
        store.set_featured_image(page.id, attachment).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_pages_by_meta() {
        let store = memory_store().await;
        let page = store.create_page(&payload("A", "B"), "a").await.unwrap();
        store
            .set_page_meta(page.id, "_csv_import_source", "42")
            .await
            .unwrap();

        let deleted = store
            .delete_pages_by_meta("_csv_import_source", "42")
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!store.slug_exists("a").await.unwrap());
    }
}
