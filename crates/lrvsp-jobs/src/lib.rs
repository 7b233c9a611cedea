//! # lrvsp-jobs
//!
//! The poll-extract-commit loop of the LRVSP daemon.
//!
//! This crate provides:
//! - An explicit registry from file type to extractor
//! - Built-in extractors (`pdfinfo` + `pdftotext`, plain text, external helper commands)
//! - The item processor with per-item failure isolation
//! - The downstream trigger (`drush lrvsCheck-db <limit>`)
//! - The cycle scheduler with events and graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lrvsp_db::{ConnectionConfig, PgQueueStore};
//! use lrvsp_jobs::{
//!     CommandNotifier, CycleScheduler, ExtractionRegistry, ItemProcessor, PdfTextAdapter,
//!     SchedulerConfig,
//! };
//!
//! let registry = ExtractionRegistry::new().with("pdf", Arc::new(PdfTextAdapter::new()));
//! let scheduler = CycleScheduler::new(
//!     Arc::new(PgQueueStore::new(ConnectionConfig::from_env())),
//!     ItemProcessor::new(registry),
//!     Arc::new(CommandNotifier::from_env()),
//! )
//! .with_config(SchedulerConfig::from_env());
//!
//! let handle = scheduler.start();
//! // ...
//! handle.shutdown();
//! handle.join().await?;
//! ```

pub mod adapters;
pub mod extraction;
pub mod notifier;
pub mod processor;
pub mod scheduler;

// Test doubles, always compiled so integration tests (in tests/) can use them
pub mod testing;

// Re-export core types
pub use lrvsp_core::*;

pub use adapters::{CommandExtractor, PdfTextAdapter, TextNativeAdapter};
pub use extraction::ExtractionRegistry;
pub use notifier::{CommandNotifier, NoOpNotifier};
pub use processor::{FailureReason, ItemOutcome, ItemProcessor, ProcessorConfig};
pub use scheduler::{
    next_delay, CycleEvent, CycleReport, CycleScheduler, SchedulerConfig, SchedulerHandle,
};
