// ============================================================
// FEATURED IMAGE FETCHER
// ============================================================
// Resolve a row's featured-image URL to a store attachment

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::domain::error::{AppError, Result};
use crate::infrastructure::content::ContentStore;

pub struct FeaturedImageFetcher {
    client: reqwest::Client,
    store: Arc<dyn ContentStore>,
}

impl FeaturedImageFetcher {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            store,
        }
    }

    /// Attach the image behind `image_url` to a page.
    ///
    /// Reuses an existing attachment when one matches the filename,
    /// otherwise downloads the resource and registers it. Callers treat a
    /// failure here as a warning; it never fails the row.
    pub async fn attach(&self, page_id: i64, image_url: &str) -> Result<()> {
        let parsed = Url::parse(image_url)
            .map_err(|e| AppError::ValidationError(format!("Invalid image URL: {}", e)))?;

        let filename = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("attachment")
            .to_string();

        if let Some(attachment_id) = self.store.find_attachment_by_filename(&filename).await? {
            self.store.set_featured_image(page_id, attachment_id).await?;
            debug!(page_id, attachment_id, image_url, "Used existing attachment");
            return Ok(());
        }

        let response = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to download image: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::HttpError(format!(
                "Failed to download image: HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read image body: {}", e)))?;

        let attachment_id = self
            .store
            .register_attachment(&filename, image_url, &bytes)
            .await?;
        self.store.set_featured_image(page_id, attachment_id).await?;

        info!(page_id, attachment_id, image_url, "Featured image attached");
        Ok(())
    }
}
