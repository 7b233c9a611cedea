//! Mock NER backend for deterministic testing.
//!
//! Tags every configured phrase that occurs in the input as a `document`
//! entity, so raw-text extraction can be tested without a GLiNER sidecar.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lrvsp_inference::mock::MockNerBackend;
//!
//! let backend = MockNerBackend::new().with_reference("Annual Report");
//! let result = backend.extract("See the Annual Report", &["document"], None).await?;
//! assert_eq!(result.entities.len(), 1);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lrvsp_core::defaults::NER_REFERENCE_LABEL;
use lrvsp_core::{Error, Result};

use crate::gliner::{NerBackend, NerEntity, NerResult};

#[derive(Debug, Clone, Default)]
struct MockConfig {
    references: Vec<String>,
    fail: bool,
    healthy: bool,
}

/// Mock NER backend for testing.
#[derive(Debug, Clone)]
pub struct MockNerBackend {
    config: Arc<MockConfig>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockNerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNerBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig {
                healthy: true,
                ..MockConfig::default()
            }),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Tag this phrase as a document reference wherever it appears.
    pub fn with_reference(mut self, phrase: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).references.push(phrase.into());
        self
    }

    /// Make every extraction fail.
    pub fn failing(mut self) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.fail = true;
        config.healthy = false;
        self
    }

    /// Texts passed to `extract`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NerBackend for MockNerBackend {
    async fn extract(
        &self,
        text: &str,
        _entity_types: &[&str],
        _threshold: Option<f32>,
    ) -> Result<NerResult> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(text.to_string());

        if self.config.fail {
            return Err(Error::Extraction("mock NER failure".into()));
        }

        let mut entities: Vec<NerEntity> = self
            .config
            .references
            .iter()
            .flat_map(|phrase| {
                text.match_indices(phrase.as_str())
                    .map(move |(start, matched)| NerEntity {
                        text: matched.to_string(),
                        label: NER_REFERENCE_LABEL.to_string(),
                        score: 1.0,
                        start,
                        end: start + matched.len(),
                    })
            })
            .collect();
        entities.sort_by_key(|entity| entity.start);

        Ok(NerResult {
            entities,
            model: "mock".to_string(),
            text_length: text.len(),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.healthy)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
