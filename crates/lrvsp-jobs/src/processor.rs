//! Per-item extraction and persistence.
//!
//! Every work item handed to [`ItemProcessor::process`] ends in exactly one
//! [`ItemOutcome`]: its document is committed (and the item deleted), the
//! item is marked failed, or, when even the mark-failed write is rejected,
//! it is left queued for the next cycle. [`ItemProcessor::process_until`]
//! adds one more exit: shutdown during extraction leaves the item untouched.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lrvsp_core::defaults::{EXTRACTION_TIMEOUT_SECS, NER_REFERENCE_LABEL};
use lrvsp_core::{EncodedDocument, Error, ExtractionOutcome, QueueSession, WorkItem};
use lrvsp_inference::{reference_links, NerBackend};

use crate::extraction::ExtractionRegistry;

/// Configuration for the item processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Upper bound on a single extractor call.
    pub extraction_timeout: Duration,
    /// NER label treated as a document reference in raw text.
    pub reference_label: String,
    /// Minimum NER confidence, or the backend's default when `None`.
    pub ner_threshold: Option<f32>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(EXTRACTION_TIMEOUT_SECS),
            reference_label: NER_REFERENCE_LABEL.to_string(),
            ner_threshold: None,
        }
    }
}

impl ProcessorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `EXTRACTION_TIMEOUT_SECS` | `300` | Per-item extractor timeout |
    /// | `NER_REFERENCE_LABEL` | `document` | Entity label kept as a link |
    /// | `NER_THRESHOLD` | unset | NER confidence threshold |
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let extraction_timeout = var("EXTRACTION_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.extraction_timeout);

        let reference_label = var("NER_REFERENCE_LABEL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.reference_label);

        let ner_threshold = var("NER_THRESHOLD")
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|t| (0.0..=1.0).contains(t));

        Self {
            extraction_timeout,
            reference_label,
            ner_threshold,
        }
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub fn with_reference_label(mut self, label: impl Into<String>) -> Self {
        self.reference_label = label.into();
        self
    }

    pub fn with_ner_threshold(mut self, threshold: Option<f32>) -> Self {
        self.ner_threshold = threshold;
        self
    }
}

/// Why a work item could not be turned into a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("unsupported file type '{0}'")]
    UnsupportedType(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("malformed extraction result: {0}")]
    Malformed(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl FailureReason {
    /// Short label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "unsupported_type",
            Self::Extraction(_) => "extraction",
            Self::Malformed(_) => "malformed",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Classify an error raised before the write unit.
    fn from_extraction(err: Error) -> Self {
        match err {
            Error::UnsupportedType(file_type) => Self::UnsupportedType(file_type),
            Error::MalformedExtraction(msg) => Self::Malformed(msg),
            Error::Extraction(msg) => Self::Extraction(msg),
            other => Self::Extraction(other.to_string()),
        }
    }
}

/// Terminal state of one processed work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Item deleted; document and `links` link rows committed.
    Committed { links: usize },
    /// Item flagged `failed = 1`.
    MarkedFailed(FailureReason),
    /// The mark-failed write was rejected; the item stays queued.
    LeftQueued(FailureReason),
    /// Shutdown arrived before the write unit began. Nothing was written.
    Interrupted,
}

/// Dispatches one work item through extraction and the atomic write unit.
pub struct ItemProcessor {
    registry: ExtractionRegistry,
    ner: Option<Arc<dyn NerBackend>>,
    config: ProcessorConfig,
}

impl ItemProcessor {
    pub fn new(registry: ExtractionRegistry) -> Self {
        Self {
            registry,
            ner: None,
            config: ProcessorConfig::default(),
        }
    }

    /// Use this backend for the raw-text link pass.
    pub fn with_ner(mut self, ner: Arc<dyn NerBackend>) -> Self {
        self.ner = Some(ner);
        self
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &ExtractionRegistry {
        &self.registry
    }

    pub fn ner(&self) -> Option<&Arc<dyn NerBackend>> {
        self.ner.as_ref()
    }

    /// Process one work item to a terminal outcome. Never fails the batch.
    pub async fn process(&self, session: &mut dyn QueueSession, item: &WorkItem) -> ItemOutcome {
        self.process_until(session, item, &CancellationToken::new())
            .await
    }

    /// Like [`process`](Self::process), but abandons extraction once
    /// `shutdown` is cancelled. A write unit that has started always runs
    /// to commit or rollback.
    pub async fn process_until(
        &self,
        session: &mut dyn QueueSession,
        item: &WorkItem,
        shutdown: &CancellationToken,
    ) -> ItemOutcome {
        let started = Instant::now();

        let extracted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = self.extract_document(item) => Some(result),
        };
        let document = match extracted {
            Some(Ok(document)) => document,
            Some(Err(reason)) => return self.fail(session, item, reason).await,
            None => {
                info!(
                    subsystem = "jobs",
                    component = "processor",
                    item_id = item.id,
                    path = %item.path,
                    "Extraction abandoned for shutdown, item stays queued"
                );
                return ItemOutcome::Interrupted;
            }
        };

        match session.commit_document(item, &document).await {
            Ok(()) => {
                info!(
                    subsystem = "jobs",
                    component = "processor",
                    op = "commit",
                    item_id = item.id,
                    entity_id = item.entity_id,
                    link_count = document.links().len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Document committed"
                );
                ItemOutcome::Committed {
                    links: document.links().len(),
                }
            }
            Err(e) => {
                self.fail(session, item, FailureReason::Persistence(e.to_string()))
                    .await
            }
        }
    }

    /// Extract, validate, and encode. Nothing touches the store here.
    async fn extract_document(
        &self,
        item: &WorkItem,
    ) -> std::result::Result<EncodedDocument, FailureReason> {
        let file_type = item.file_type().unwrap_or_default();
        let extractor = self
            .registry
            .lookup(&file_type)
            .ok_or_else(|| FailureReason::UnsupportedType(file_type.clone()))?;

        info!(
            subsystem = "jobs",
            component = "processor",
            op = "extract",
            item_id = item.id,
            file_type = %file_type,
            extractor = extractor.name(),
            path = %item.path,
            "Processing work item"
        );

        let outcome = timeout(
            self.config.extraction_timeout,
            extractor.extract(Path::new(&item.path)),
        )
        .await
        .map_err(|_| {
            FailureReason::Extraction(format!(
                "extractor exceeded timeout of {}s",
                self.config.extraction_timeout.as_secs()
            ))
        })?
        .map_err(FailureReason::from_extraction)?;

        debug!(
            subsystem = "jobs",
            component = "processor",
            item_id = item.id,
            outcome = outcome.kind(),
            "Extractor returned"
        );

        let encoded = match outcome {
            ExtractionOutcome::Structured(extraction) => {
                extraction
                    .validate()
                    .map_err(FailureReason::from_extraction)?;
                EncodedDocument::encode(
                    &extraction.name,
                    &extraction.metadata,
                    item.entity_id,
                    &extraction.links,
                )
            }
            ExtractionOutcome::RawText(raw) => {
                let links = self.recognize_links(&raw.text).await?;
                let title = raw.title_or(&item.file_stem());
                let mut metadata = raw.metadata;
                metadata.insert("char_count".into(), json!(raw.text.chars().count()));
                metadata.insert("line_count".into(), json!(raw.text.lines().count()));
                metadata.insert("entity_count".into(), json!(links.len()));
                EncodedDocument::encode(
                    &title,
                    &JsonValue::Object(metadata),
                    item.entity_id,
                    &links,
                )
            }
        };
        encoded.map_err(FailureReason::from_extraction)
    }

    /// Second stage for raw text: document references named in the text.
    async fn recognize_links(&self, text: &str) -> std::result::Result<Vec<String>, FailureReason> {
        let ner = self.ner.as_ref().ok_or_else(|| {
            FailureReason::Extraction("raw text result but no NER backend is configured".into())
        })?;
        reference_links(
            ner.as_ref(),
            text,
            &self.config.reference_label,
            self.config.ner_threshold,
        )
        .await
        .map_err(FailureReason::from_extraction)
    }

    /// Log the failure, then flag the item in its own committed write.
    async fn fail(
        &self,
        session: &mut dyn QueueSession,
        item: &WorkItem,
        reason: FailureReason,
    ) -> ItemOutcome {
        match &reason {
            FailureReason::UnsupportedType(file_type) => error!(
                subsystem = "jobs",
                component = "processor",
                item_id = item.id,
                file_type = %file_type,
                path = %item.path,
                "Unsupported file type"
            ),
            FailureReason::Extraction(msg) => error!(
                subsystem = "jobs",
                component = "processor",
                item_id = item.id,
                path = %item.path,
                error = %msg,
                "Extraction failed"
            ),
            FailureReason::Malformed(msg) => error!(
                subsystem = "jobs",
                component = "processor",
                item_id = item.id,
                path = %item.path,
                error = %msg,
                "Extractor returned a malformed result"
            ),
            FailureReason::Persistence(msg) => error!(
                subsystem = "jobs",
                component = "processor",
                item_id = item.id,
                path = %item.path,
                error = %msg,
                "Write unit rolled back"
            ),
        }

        match session.mark_failed(item.id).await {
            Ok(()) => ItemOutcome::MarkedFailed(reason),
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "processor",
                    item_id = item.id,
                    error = %e,
                    "Could not mark work item failed, leaving it queued"
                );
                ItemOutcome::LeftQueued(reason)
            }
        }
    }
}
