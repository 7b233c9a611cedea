//! GLiNER NER backend for the raw-text link pass.
//!
//! Extractors that only produce plain text hand it to a GLiNER sidecar, and
//! the entities it tags as document references become link targets.
//!
//! # Configuration
//!
//! Read by the daemon, which applies the timeout through
//! [`GlinerBackend::with_timeout`]:
//!
//! - `GLINER_BASE_URL`: Base URL of the GLiNER sidecar. Unset or empty
//!   means no backend.
//! - `GLINER_TIMEOUT_SECS`: Per-request timeout (default 30).

use std::time::Duration;

use async_trait::async_trait;
use lrvsp_core::defaults::GLINER_TIMEOUT_SECS;
use lrvsp_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A named entity extracted by GLiNER.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NerEntity {
    /// The entity text as it appears in the source.
    pub text: String,
    /// The entity type label (e.g., "document", "person").
    pub label: String,
    /// Confidence score from the NER model (0.0-1.0).
    pub score: f32,
    /// Character start offset in the source text.
    pub start: usize,
    /// Character end offset in the source text.
    pub end: usize,
}

/// Result of NER extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NerResult {
    /// Extracted entities.
    pub entities: Vec<NerEntity>,
    /// Model name used for extraction.
    pub model: String,
    /// Length of the text that was processed.
    pub text_length: usize,
}

impl NerResult {
    /// Trimmed texts of entities carrying `label`, in source order.
    pub fn texts_with_label(&self, label: &str) -> Vec<String> {
        self.entities
            .iter()
            .filter(|entity| entity.label.eq_ignore_ascii_case(label))
            .map(|entity| entity.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect()
    }
}

/// Backend trait for named entity recognition.
#[async_trait]
pub trait NerBackend: Send + Sync {
    /// Extract named entities from text.
    async fn extract(
        &self,
        text: &str,
        entity_types: &[&str],
        threshold: Option<f32>,
    ) -> Result<NerResult>;

    /// Check if the NER backend is available.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// GLiNER sidecar client.
pub struct GlinerBackend {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GlinerBackend {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(GLINER_TIMEOUT_SECS),
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Request payload for the GLiNER `/extract` endpoint.
#[derive(Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    entity_types: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<f32>,
}

/// Health check response from GLiNER.
#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

#[async_trait]
impl NerBackend for GlinerBackend {
    async fn extract(
        &self,
        text: &str,
        entity_types: &[&str],
        threshold: Option<f32>,
    ) -> Result<NerResult> {
        let url = format!("{}/extract", self.base_url);

        let request = ExtractRequest {
            text,
            entity_types,
            threshold,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("GLiNER request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "GLiNER API returned {}: {}",
                status, body
            )));
        }

        let result: NerResult = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to parse GLiNER response: {}", e)))?;

        debug!(
            subsystem = "inference",
            component = "gliner",
            op = "extract",
            input_len = text.len(),
            result_count = result.entities.len(),
            "NER extraction complete"
        );
        Ok(result)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => Ok(resp
                .json::<HealthResponse>()
                .await
                .map(|health| health.status == "healthy")
                .unwrap_or(false)),
            _ => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        "gliner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entity(text: &str, label: &str) -> NerEntity {
        NerEntity {
            text: text.to_string(),
            label: label.to_string(),
            score: 0.9,
            start: 0,
            end: text.len(),
        }
    }

    #[test]
    fn test_texts_with_label_filters_and_trims() {
        let result = NerResult {
            entities: vec![
                entity(" Annual Report 2023 ", "document"),
                entity("Jane Doe", "person"),
                entity("Budget Memo", "Document"),
                entity("   ", "document"),
            ],
            model: "gliner".to_string(),
            text_length: 100,
        };

        assert_eq!(
            result.texts_with_label("document"),
            vec!["Annual Report 2023".to_string(), "Budget Memo".to_string()]
        );
    }

    #[test]
    fn test_gliner_backend_new_trims_trailing_slash() {
        let backend = GlinerBackend::new("http://localhost:8090/".to_string());
        assert_eq!(backend.base_url, "http://localhost:8090");
        assert_eq!(backend.timeout, Duration::from_secs(30));
        assert_eq!(backend.model_name(), "gliner");
    }

    #[test]
    fn test_extract_request_no_threshold() {
        let types = ["document"];
        let req = ExtractRequest {
            text: "See the Annual Report",
            entity_types: &types,
            threshold: None,
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["entity_types"][0], "document");
        assert!(json.get("threshold").is_none());
    }

    #[tokio::test]
    async fn test_extract_against_sidecar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(body_partial_json(json!({"entity_types": ["document"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entities": [
                    {"text": "Doc2", "label": "document", "score": 0.8, "start": 4, "end": 8}
                ],
                "model": "gliner-multi",
                "text_length": 12
            })))
            .mount(&server)
            .await;

        let backend = GlinerBackend::new(server.uri());
        let result = backend.extract("See Doc2 now", &["document"], None).await.unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.texts_with_label("document"), vec!["Doc2".to_string()]);
    }

    #[tokio::test]
    async fn test_extract_server_error_is_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .mount(&server)
            .await;

        let backend = GlinerBackend::new(server.uri());
        let err = backend.extract("text", &["document"], None).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(ref msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "healthy", "model": "gliner-multi"})),
            )
            .mount(&server)
            .await;

        let backend = GlinerBackend::new(server.uri());
        assert!(backend.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = GlinerBackend::new("http://127.0.0.1:9".to_string());
        assert!(!backend.health_check().await.unwrap());
    }
}
