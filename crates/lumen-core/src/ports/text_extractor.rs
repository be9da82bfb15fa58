//! TextExtractor port - OCR over an uploaded image.

use std::path::Path;

use async_trait::async_trait;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// `None` when no usable text was found or extraction failed.
    async fn extract_text(&self, image_path: &Path) -> Option<String>;
}
