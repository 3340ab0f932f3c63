// ============================================================
// CONTENT STORE
// ============================================================
// Seam to the host content system: page CRUD, tags, attachments

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::payload::ContentPayload;

pub mod sqlite_store;

pub use sqlite_store::SqlitePageStore;

/// A page the store created.
#[derive(Debug, Clone)]
pub struct CreatedPage {
    pub id: i64,
    pub slug: String,
}

/// The content system pages are created in.
///
/// The import pipeline only ever talks to this trait; the bundled
/// implementation is [`SqlitePageStore`].
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create a page under the given slug. The slug must already be unique.
    async fn create_page(&self, payload: &ContentPayload, slug: &str) -> Result<CreatedPage>;

    /// Whether a page with this exact title exists.
    async fn title_exists(&self, title: &str) -> Result<bool>;

    /// Whether a page with this exact slug exists.
    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    async fn set_page_meta(&self, page_id: i64, key: &str, value: &str) -> Result<()>;

    async fn set_page_tags(&self, page_id: i64, tags: &[String]) -> Result<()>;

    /// Look up an attachment whose stored filename matches.
    async fn find_attachment_by_filename(&self, filename: &str) -> Result<Option<i64>>;

    /// Register downloaded bytes as a new attachment.
    async fn register_attachment(
        &self,
        filename: &str,
        source_url: &str,
        data: &[u8],
    ) -> Result<i64>;

    async fn set_featured_image(&self, page_id: i64, attachment_id: i64) -> Result<()>;

    /// Delete every page carrying the given metadata pair. Returns the
    /// number of pages removed.
    async fn delete_pages_by_meta(&self, key: &str, value: &str) -> Result<u64>;

    /// Drop whatever caches the store keeps. Called between batches.
    async fn flush_cache(&self) -> Result<()>;
}
