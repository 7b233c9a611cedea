//! Extraction registry mapping file types to extractors.

use std::collections::BTreeMap;
use std::sync::Arc;

use lrvsp_core::Extractor;

/// Registry mapping lowercased file-type suffixes to their extractors.
///
/// Built once at startup and handed to the item processor.
#[derive(Clone, Default)]
pub struct ExtractionRegistry {
    extractors: BTreeMap<String, Arc<dyn Extractor>>,
}

impl ExtractionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor. Replaces any existing extractor for the same type.
    pub fn register(&mut self, file_type: impl AsRef<str>, extractor: Arc<dyn Extractor>) {
        self.extractors
            .insert(file_type.as_ref().trim().to_lowercase(), extractor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, file_type: impl AsRef<str>, extractor: Arc<dyn Extractor>) -> Self {
        self.register(file_type, extractor);
        self
    }

    /// Extractor for the given file type, if one is registered.
    pub fn lookup(&self, file_type: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(file_type).cloned()
    }

    /// Check if an extractor is registered for the given file type.
    pub fn has_extractor(&self, file_type: &str) -> bool {
        self.extractors.contains_key(file_type)
    }

    /// Registered file types, sorted.
    pub fn file_types(&self) -> Vec<String> {
        self.extractors.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Run health checks on all registered extractors.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for (file_type, extractor) in &self.extractors {
            let healthy = extractor.health_check().await.unwrap_or(false);
            results.insert(file_type.clone(), healthy);
        }
        results
    }
}

impl std::fmt::Debug for ExtractionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.extractors
                    .iter()
                    .map(|(file_type, extractor)| (file_type, extractor.name())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TextNativeAdapter;

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ExtractionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.file_types().is_empty());
        assert!(registry.lookup("pdf").is_none());
    }

    #[test]
    fn test_registry_register_and_lookup() {
        let registry = ExtractionRegistry::new().with("TXT", Arc::new(TextNativeAdapter));
        assert!(registry.has_extractor("txt"));
        assert!(!registry.has_extractor("pdf"));
        assert_eq!(registry.lookup("txt").unwrap().name(), "text_native");
    }

    #[test]
    fn test_registry_file_types_sorted() {
        let registry = ExtractionRegistry::new()
            .with("txt", Arc::new(TextNativeAdapter))
            .with("md", Arc::new(TextNativeAdapter));
        assert_eq!(registry.file_types(), vec!["md", "txt"]);
    }

    #[test]
    fn test_registry_debug_lists_extractor_names() {
        let registry = ExtractionRegistry::new().with("txt", Arc::new(TextNativeAdapter));
        assert_eq!(format!("{:?}", registry), r#"{"txt": "text_native"}"#);
    }

    #[tokio::test]
    async fn test_registry_health_check_all() {
        let registry = ExtractionRegistry::new().with("txt", Arc::new(TextNativeAdapter));
        let results = registry.health_check_all().await;
        assert_eq!(results.len(), 1);
        assert!(results["txt"]);
    }
}
