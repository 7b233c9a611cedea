//! Centralized default constants for the LRVSP daemon.
//!
//! Every crate reads its fallback values from here so the environment
//! documentation in the daemon binary and the library defaults cannot drift.

// =============================================================================
// CYCLE SCHEDULING
// =============================================================================

/// Maximum number of work items fetched per cycle (`PARSE_LIMIT`).
pub const PARSE_LIMIT: i64 = 10;

/// Capacity limit handed to the downstream trigger (`CREATE_LIMIT`).
pub const CREATE_LIMIT: u32 = 1200;

/// Fixed cycle interval in seconds (`CYCLE_TIME`).
///
/// Wall-clock anchored: a cycle that takes 30s is followed by a 90s sleep.
pub const CYCLE_TIME_SECS: u64 = 120;

/// Broadcast capacity for scheduler events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Per-item extractor timeout in seconds (5 minutes).
pub const EXTRACTION_TIMEOUT_SECS: u64 = 300;

/// Per-command timeout for external extraction tools (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// Widest encoded link the `LinkObjs` columns can hold.
pub const MAX_ENCODED_LINK_BYTES: usize = 255;

/// Entity label the NER pass treats as a document reference.
pub const NER_REFERENCE_LABEL: &str = "document";

/// Env var naming the GLiNER sidecar base URL.
pub const ENV_GLINER_BASE_URL: &str = "GLINER_BASE_URL";

/// GLiNER request timeout in seconds.
pub const GLINER_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// DOWNSTREAM TRIGGER
// =============================================================================

/// Default Drupal installation root.
pub const DRUPAL_PATH: &str = "/var/www/drupal";

/// Path of the drush binary relative to the Drupal root.
pub const DRUSH_RELATIVE_PATH: &str = "vendor/bin/drush";

/// Drush command that materializes pending document objects.
pub const DOWNSTREAM_SUBCOMMAND: &str = "lrvsCheck-db";

// =============================================================================
// DATABASE
// =============================================================================

/// Fallback connection string when `DATABASE_URL` is unset.
pub const DATABASE_URL: &str = "postgres://localhost/lrvsp";

/// Connection timeout in seconds for the per-cycle connection.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;
