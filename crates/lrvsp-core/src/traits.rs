//! Core traits for the daemon's pluggable seams.
//!
//! The scheduler and processor only talk to these traits, so the PostgreSQL
//! store, external extractors, and the drush trigger can each be swapped for
//! in-memory doubles in tests.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// EXTRACTION
// =============================================================================

/// A capability that turns one file into an [`ExtractionOutcome`].
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract title, metadata, and links (or raw text) from the file.
    async fn extract(&self, path: &Path) -> Result<ExtractionOutcome>;

    /// Check if the extractor's external dependencies are available.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this extractor.
    fn name(&self) -> &str;
}

// =============================================================================
// QUEUE STORE
// =============================================================================

/// Opens one session per cycle against the queue store.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Acquire a fresh connection configured for READ COMMITTED.
    ///
    /// Failure here is cycle-fatal.
    async fn open_session(&self) -> Result<Box<dyn QueueSession>>;
}

/// A single connection held for the duration of one cycle.
#[async_trait]
pub trait QueueSession: Send {
    /// Read up to `limit` unfailed work items, fully materialized.
    async fn fetch_pending(&mut self, limit: i64) -> Result<Vec<WorkItem>>;

    /// Delete the work item and insert the document and its links as one
    /// transaction. Nothing is visible if this returns an error.
    async fn commit_document(&mut self, item: &WorkItem, document: &EncodedDocument)
        -> Result<()>;

    /// Set `failed = 1` on the work item, committed independently.
    async fn mark_failed(&mut self, item_id: i64) -> Result<()>;

    /// Count rows still waiting on this daemon or the downstream system.
    async fn remaining_count(&mut self, scope: RemainingScope) -> Result<i64>;

    /// Close the underlying connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// DOWNSTREAM
// =============================================================================

/// Best-effort trigger telling the content system to materialize documents.
#[async_trait]
pub trait DownstreamNotifier: Send + Sync {
    /// Run the trigger with a capacity limit. Never fails the cycle.
    async fn notify(&self, capacity_limit: u32) -> NotifyOutcome;
}
