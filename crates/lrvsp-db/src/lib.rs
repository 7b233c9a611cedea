//! # lrvsp-db
//!
//! Queue store for the LRVSP extraction daemon.
//!
//! This crate provides:
//! - Per-cycle PostgreSQL connections in READ COMMITTED
//! - The `FilePaths` fetch, the atomic document write unit, and the
//!   independently committed mark-failed write
//! - The remaining-work count across queue-like tables
//! - An in-memory store with fault injection for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use lrvsp_db::{ConnectionConfig, PgQueueStore};
//! use lrvsp_core::QueueStore;
//!
//! let store = PgQueueStore::new(ConnectionConfig::new("postgres://localhost/drupal"));
//! let mut session = store.open_session().await?;
//! let items = session.fetch_pending(10).await?;
//! session.close().await?;
//! ```

pub mod connection;
pub mod memory;
pub mod queue;

// Test fixtures for integration tests
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use lrvsp_core::*;

pub use connection::{close, connect, ConnectionConfig, SET_SESSION_ISOLATION};
pub use memory::{Faults, MemoryQueueSession, MemoryQueueStore};
pub use queue::{PgQueueSession, PgQueueStore, SET_TRANSACTION_ISOLATION};

/// Run pending schema migrations on the given connection.
#[cfg(feature = "migrations")]
pub async fn migrate(conn: &mut sqlx::PgConnection) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(conn)
        .await
        .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
    Ok(())
}
