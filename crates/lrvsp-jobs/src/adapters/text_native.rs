//! Plain text extractor.

use std::path::Path;

use async_trait::async_trait;

use lrvsp_core::{Error, ExtractionOutcome, Extractor, Result};

/// Reads the file as UTF-8 (lossy for invalid sequences) and hands the text
/// to the link-recognition pass.
pub struct TextNativeAdapter;

#[async_trait]
impl Extractor for TextNativeAdapter {
    async fn extract(&self, path: &Path) -> Result<ExtractionOutcome> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            Error::Extraction(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(ExtractionOutcome::raw_text(String::from_utf8_lossy(&data)))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true) // No external dependencies
    }

    fn name(&self) -> &str {
        "text_native"
    }
}
