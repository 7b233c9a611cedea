//! # lrvsp-inference
//!
//! Named entity recognition for raw-text extraction results.
//!
//! This crate provides:
//! - The [`NerBackend`] trait
//! - A GLiNER sidecar client ([`GlinerBackend`])
//! - A deterministic mock backend for tests
//! - [`reference_links`], which turns extracted text into link targets

pub mod gliner;

// Mock NER backend, always compiled so downstream crates can test against it
pub mod mock;

pub use gliner::{GlinerBackend, NerBackend, NerEntity, NerResult};

use lrvsp_core::Result;

/// Run NER over `text` and return the distinct entities tagged `label`,
/// in order of first appearance.
pub async fn reference_links(
    backend: &dyn NerBackend,
    text: &str,
    label: &str,
    threshold: Option<f32>,
) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let result = backend.extract(text, &[label], threshold).await?;
    let mut links: Vec<String> = Vec::new();
    for reference in result.texts_with_label(label) {
        if !links.contains(&reference) {
            links.push(reference);
        }
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNerBackend;
    use lrvsp_core::defaults::NER_REFERENCE_LABEL;

    #[tokio::test]
    async fn test_reference_links_dedups() {
        let backend = MockNerBackend::new().with_reference("Doc2");
        let links = reference_links(&backend, "Doc2 and again Doc2", NER_REFERENCE_LABEL, None)
            .await
            .unwrap();
        assert_eq!(links, vec!["Doc2".to_string()]);
    }

    #[tokio::test]
    async fn test_reference_links_skips_blank_text() {
        let backend = MockNerBackend::new().with_reference("Doc2");
        let links = reference_links(&backend, "   ", NER_REFERENCE_LABEL, None)
            .await
            .unwrap();
        assert!(links.is_empty());
        assert!(backend.calls().is_empty());
    }
}
