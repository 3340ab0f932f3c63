// ============================================================
// CONTENT PAYLOAD
// ============================================================
// The material handed to the content store to create one page

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key carrying the originating import run id.
pub const META_SOURCE_RUN: &str = "_csv_import_source";
/// Metadata key carrying the originating CSV row number.
pub const META_SOURCE_ROW: &str = "_csv_import_row";
/// Metadata key carrying a page's SEO description.
pub const META_SEO_DESCRIPTION: &str = "_seo_meta_description";
/// Metadata key carrying a featured image URL awaiting attachment.
pub const META_FEATURED_IMAGE_URL: &str = "_csv_featured_image_url";

/// Everything needed to create one page.
///
/// Title and body are guaranteed non-empty by construction; the store is
/// never asked to create a page without them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPayload {
    pub title: String,
    pub body: String,
    pub status: String,
    pub author_id: i64,
    /// Row-supplied slug; a slug is derived from the title when absent
    pub slug: Option<String>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl ContentPayload {
    /// Build a payload from a sanitized row.
    ///
    /// Returns None when the row lacks a title or body, which cannot
    /// happen for rows the validator accepted.
    pub fn from_row(
        data: &HashMap<String, String>,
        row_number: usize,
        run_id: i64,
        default_status: &str,
        author_id: i64,
    ) -> Option<Self> {
        let title = data.get("title").map(String::as_str).unwrap_or("").trim();
        let body = data
            .get("description")
            .map(String::as_str)
            .unwrap_or("")
            .trim();

        if title.is_empty() || body.is_empty() {
            return None;
        }

        let status = match data.get("status").map(String::as_str) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => default_status.to_string(),
        };

        let slug = data
            .get("slug")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let tags = data
            .get("categories")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let mut metadata = HashMap::new();
        metadata.insert(META_SOURCE_RUN.to_string(), run_id.to_string());
        metadata.insert(META_SOURCE_ROW.to_string(), row_number.to_string());

        if let Some(meta_description) = data.get("meta_description") {
            if !meta_description.is_empty() {
                metadata.insert(META_SEO_DESCRIPTION.to_string(), meta_description.clone());
            }
        }

        if let Some(image_url) = data.get("featured_image_url") {
            if !image_url.is_empty() {
                metadata.insert(META_FEATURED_IMAGE_URL.to_string(), image_url.clone());
            }
        }

        Some(Self {
            title: title.to_string(),
            body: body.to_string(),
            status,
            author_id,
            slug,
            tags,
            metadata,
        })
    }

    pub fn featured_image_url(&self) -> Option<&str> {
        self.metadata
            .get(META_FEATURED_IMAGE_URL)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_payload_carries_run_back_references() {
        let data = row(&[("title", "About"), ("description", "Body text")]);
        let payload = ContentPayload::from_row(&data, 2, 7, "draft", 1).unwrap();

        assert_eq!(payload.metadata.get(META_SOURCE_RUN).unwrap(), "7");
        assert_eq!(payload.metadata.get(META_SOURCE_ROW).unwrap(), "2");
        assert_eq!(payload.status, "draft");
        assert!(payload.slug.is_none());
        assert!(payload.tags.is_empty());
    }

    #[test]
    fn test_row_status_overrides_default() {
        let data = row(&[
            ("title", "About"),
            ("description", "Body"),
            ("status", "publish"),
        ]);
        let payload = ContentPayload::from_row(&data, 2, 1, "draft", 1).unwrap();
        assert_eq!(payload.status, "publish");
    }

    #[test]
    fn test_categories_split_into_tags() {
        let data = row(&[
            ("title", "T"),
            ("description", "D"),
            ("categories", "News, Updates , ,Press"),
        ]);
        let payload = ContentPayload::from_row(&data, 3, 1, "draft", 1).unwrap();
        assert_eq!(payload.tags, vec!["News", "Updates", "Press"]);
    }

    #[test]
    fn test_missing_body_rejected() {
        let data = row(&[("title", "T"), ("description", "   ")]);
        assert!(ContentPayload::from_row(&data, 2, 1, "draft", 1).is_none());
    }
}
