//! PostgreSQL queue store.
//!
//! Table and column names are quoted so they match the content system's
//! camel-cased schema exactly (`"FilePaths"."entityId"` and friends).

use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Postgres, Row, Transaction};
use tracing::{debug, instrument, warn};

use lrvsp_core::{
    EncodedDocument, Error, QueueSession, QueueStore, RemainingScope, Result, WorkItem,
};

use crate::connection::{self, ConnectionConfig};

/// Isolation statement issued first inside every per-item transaction.
pub const SET_TRANSACTION_ISOLATION: &str = "SET TRANSACTION ISOLATION LEVEL READ COMMITTED";

const FETCH_PENDING_QUERY: &str = r#"
    SELECT id, path, "entityId", failed
    FROM "FilePaths"
    WHERE failed = 0
    ORDER BY id
    LIMIT $1
"#;

const MARK_FAILED_QUERY: &str = r#"UPDATE "FilePaths" SET failed = 1 WHERE id = $1"#;

const DELETE_ITEM_QUERY: &str = r#"DELETE FROM "FilePaths" WHERE id = $1"#;

const INSERT_DOCUMENT_QUERY: &str = r#"
    INSERT INTO "DocObjs" (title, metadata, "entityId", "numLinks")
    VALUES ($1, $2, $3, $4)
"#;

const INSERT_LINK_QUERY: &str = r#"INSERT INTO "LinkObjs" ("fromTitle", "toTitle") VALUES ($1, $2)"#;

const REMAINING_QUEUE_QUERY: &str = r#"SELECT COUNT(*) FROM "FilePaths" WHERE failed = 0"#;

const REMAINING_ALL_QUERY: &str = r#"
    SELECT COALESCE(SUM(row_count), 0)::BIGINT FROM (
        SELECT COUNT(*) AS row_count FROM "FilePaths" WHERE failed = 0
        UNION ALL
        SELECT COUNT(*) AS row_count FROM "DocObjs" WHERE failed = 0
        UNION ALL
        SELECT COUNT(*) AS row_count FROM "LinkObjs" WHERE failed = 0
    ) AS pending
"#;

/// Queue store that opens a fresh PostgreSQL connection per session.
#[derive(Debug, Clone)]
pub struct PgQueueStore {
    config: ConnectionConfig,
}

impl PgQueueStore {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Connection settings used for each session.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn open_session(&self) -> Result<Box<dyn QueueSession>> {
        let conn = connection::connect(&self.config).await?;
        Ok(Box::new(PgQueueSession { conn }))
    }
}

/// One cycle's connection to the queue store.
pub struct PgQueueSession {
    conn: PgConnection,
}

impl PgQueueSession {
    /// Wrap an already configured connection.
    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }
}

/// Apply the delete/insert statements of the write unit inside `tx`.
async fn apply_document(
    tx: &mut Transaction<'_, Postgres>,
    item: &WorkItem,
    document: &EncodedDocument,
) -> Result<()> {
    sqlx::query(SET_TRANSACTION_ISOLATION)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

    let deleted = sqlx::query(DELETE_ITEM_QUERY)
        .bind(item.id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();
    if deleted == 0 {
        return Err(Error::Persistence(format!(
            "work item {} is no longer queued",
            item.id
        )));
    }

    let doc = document.document();
    sqlx::query(INSERT_DOCUMENT_QUERY)
        .bind(&doc.title)
        .bind(&doc.metadata)
        .bind(doc.entity_id)
        .bind(doc.num_links)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

    for link in document.links() {
        sqlx::query(INSERT_LINK_QUERY)
            .bind(&link.from_title)
            .bind(&link.to_title)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
    }

    Ok(())
}

#[async_trait]
impl QueueSession for PgQueueSession {
    #[instrument(skip(self), fields(subsystem = "database", component = "queue"))]
    async fn fetch_pending(&mut self, limit: i64) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query(FETCH_PENDING_QUERY)
            .bind(limit)
            .fetch_all(&mut self.conn)
            .await
            .map_err(Error::Database)?;

        let items: Vec<WorkItem> = rows
            .into_iter()
            .map(|row| WorkItem {
                id: row.get("id"),
                path: row.get("path"),
                entity_id: row.get("entityId"),
                failed: row.get::<i16, _>("failed") != 0,
            })
            .collect();

        debug!(result_count = items.len(), "Fetched pending work items");
        Ok(items)
    }

    async fn commit_document(
        &mut self,
        item: &WorkItem,
        document: &EncodedDocument,
    ) -> Result<()> {
        let start = Instant::now();
        let mut tx = self.conn.begin().await.map_err(Error::Database)?;

        match apply_document(&mut tx, item, document).await {
            Ok(()) => {
                tx.commit().await.map_err(Error::Database)?;
                debug!(
                    subsystem = "database",
                    component = "queue",
                    op = "commit_document",
                    item_id = item.id,
                    link_count = document.links().len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Document committed"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        subsystem = "database",
                        component = "queue",
                        op = "rollback",
                        item_id = item.id,
                        error = %rollback_err,
                        "Explicit rollback failed, transaction is discarded with the connection"
                    );
                }
                Err(e)
            }
        }
    }

    async fn mark_failed(&mut self, item_id: i64) -> Result<()> {
        let updated = sqlx::query(MARK_FAILED_QUERY)
            .bind(item_id)
            .execute(&mut self.conn)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        if updated == 0 {
            debug!(
                subsystem = "database",
                component = "queue",
                item_id,
                "No queued row to mark failed"
            );
        }
        Ok(())
    }

    async fn remaining_count(&mut self, scope: RemainingScope) -> Result<i64> {
        let query = match scope {
            RemainingScope::Queue => REMAINING_QUEUE_QUERY,
            RemainingScope::All => REMAINING_ALL_QUERY,
        };
        let remaining: i64 = sqlx::query_scalar(query)
            .fetch_one(&mut self.conn)
            .await
            .map_err(Error::Database)?;
        Ok(remaining)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        connection::close(self.conn).await
    }
}
