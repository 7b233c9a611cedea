//! Test doubles for extractors and the downstream trigger.
//!
//! Always compiled so integration tests (in tests/) and downstream crates can
//! drive the scheduler without external tools.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use lrvsp_core::{
    DownstreamNotifier, Error, ExtractionOutcome, Extractor, NotifyOutcome, RawDocument, Result,
    StructuredExtraction,
};
use lrvsp_db::MemoryQueueStore;

enum Canned {
    Record(JsonValue),
    Text(RawDocument),
    Failure(String),
}

/// Extractor that returns the same canned result for every path.
pub struct StaticExtractor {
    canned: Canned,
    delay: Option<Duration>,
}

impl StaticExtractor {
    fn with_canned(canned: Canned) -> Self {
        Self {
            canned,
            delay: None,
        }
    }

    /// Return this JSON record, validated the same way helper output is.
    pub fn structured(record: JsonValue) -> Self {
        Self::with_canned(Canned::Record(record))
    }

    /// Return this raw text.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::document(RawDocument::new(text))
    }

    /// Return this raw text together with its embedded properties.
    pub fn document(document: RawDocument) -> Self {
        Self::with_canned(Canned::Text(document))
    }

    /// Fail every extraction with this message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_canned(Canned::Failure(message.into()))
    }

    /// Take this long (on the tokio clock) before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    async fn extract(&self, _path: &Path) -> Result<ExtractionOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.canned {
            Canned::Record(record) => {
                StructuredExtraction::from_record(record.clone()).map(ExtractionOutcome::Structured)
            }
            Canned::Text(document) => Ok(ExtractionOutcome::RawText(document.clone())),
            Canned::Failure(message) => Err(Error::Extraction(message.clone())),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Extractor that never returns.
pub struct StuckExtractor;

#[async_trait]
impl Extractor for StuckExtractor {
    async fn extract(&self, _path: &Path) -> Result<ExtractionOutcome> {
        std::future::pending().await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "stuck"
    }
}

/// Notifier that records its calls and can stand in for the content system
/// by draining a [`MemoryQueueStore`]'s documents.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    calls: Arc<AtomicUsize>,
    last_limit: Arc<AtomicUsize>,
    drain: Option<MemoryQueueStore>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the store's documents and links on every call.
    pub fn draining(mut self, store: MemoryQueueStore) -> Self {
        self.drain = Some(store);
        self
    }

    /// Report a non-zero exit on every call.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Take this long (on the tokio clock) before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_limit(&self) -> usize {
        self.last_limit.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownstreamNotifier for RecordingNotifier {
    async fn notify(&self, capacity_limit: u32) -> NotifyOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit
            .store(capacity_limit as usize, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return NotifyOutcome::Failed {
                exit_code: Some(1),
                message: "drush exploded".to_string(),
            };
        }
        if let Some(store) = &self.drain {
            store.drain_documents();
        }
        NotifyOutcome::Succeeded
    }
}
