//! In-memory queue store with fault injection.
//!
//! Mirrors the PostgreSQL store's observable behavior: the write unit is
//! applied to a staged copy and only swapped in when every statement
//! succeeds. Always compiled so integration tests in other crates can use it.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use lrvsp_core::defaults::MAX_ENCODED_LINK_BYTES;
use lrvsp_core::{
    DocumentObject, EncodedDocument, Error, LinkObject, QueueSession, QueueStore, RemainingScope,
    Result, WorkItem,
};

/// Faults the store will raise on request.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// `open_session` fails.
    pub fail_connect: bool,
    /// `fetch_pending` fails.
    pub fail_fetch: bool,
    /// The write unit fails after this many link inserts.
    pub fail_after_links: Option<usize>,
    /// The write unit fails at the document insert for these item ids.
    pub fail_commit_for: HashSet<i64>,
    /// `mark_failed` fails.
    pub fail_mark_failed: bool,
    /// `remaining_count` fails.
    pub fail_remaining: bool,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    file_paths: BTreeMap<i64, WorkItem>,
    doc_objs: Vec<DocumentObject>,
    link_objs: Vec<LinkObject>,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    faults: Faults,
    next_id: i64,
    sessions_opened: usize,
    sessions_closed: usize,
}

/// Shared in-memory store. Clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    state: Arc<Mutex<State>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a new work item and return its id.
    pub fn push_item(&self, path: impl Into<String>, entity_id: i64) -> i64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.tables.file_paths.insert(
            id,
            WorkItem {
                id,
                path: path.into(),
                entity_id,
                failed: false,
            },
        );
        id
    }

    /// Replace the active fault set.
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Current `FilePaths` rows ordered by id.
    pub fn items(&self) -> Vec<WorkItem> {
        self.lock().tables.file_paths.values().cloned().collect()
    }

    /// Look up one `FilePaths` row.
    pub fn item(&self, id: i64) -> Option<WorkItem> {
        self.lock().tables.file_paths.get(&id).cloned()
    }

    /// Current `DocObjs` rows in insertion order.
    pub fn documents(&self) -> Vec<DocumentObject> {
        self.lock().tables.doc_objs.clone()
    }

    /// Current `LinkObjs` rows in insertion order.
    pub fn links(&self) -> Vec<LinkObject> {
        self.lock().tables.link_objs.clone()
    }

    /// Drop documents and links, as the content system does once it has
    /// materialized them.
    pub fn drain_documents(&self) {
        let mut state = self.lock();
        state.tables.doc_objs.clear();
        state.tables.link_objs.clear();
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    /// Number of sessions closed so far.
    pub fn sessions_closed(&self) -> usize {
        self.lock().sessions_closed
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn open_session(&self) -> Result<Box<dyn QueueSession>> {
        let mut state = self.lock();
        if state.faults.fail_connect {
            return Err(Error::Internal("connection refused".into()));
        }
        state.sessions_opened += 1;
        Ok(Box::new(MemoryQueueSession {
            store: self.clone(),
        }))
    }
}

/// Session over a [`MemoryQueueStore`].
pub struct MemoryQueueSession {
    store: MemoryQueueStore,
}

fn check_width(value: &str, column: &str) -> Result<()> {
    if value.len() > MAX_ENCODED_LINK_BYTES {
        return Err(Error::Persistence(format!(
            "value too long for {} ({} > {})",
            column,
            value.len(),
            MAX_ENCODED_LINK_BYTES
        )));
    }
    Ok(())
}

#[async_trait]
impl QueueSession for MemoryQueueSession {
    async fn fetch_pending(&mut self, limit: i64) -> Result<Vec<WorkItem>> {
        let state = self.store.lock();
        if state.faults.fail_fetch {
            return Err(Error::Internal("fetch failed".into()));
        }
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .tables
            .file_paths
            .values()
            .filter(|item| !item.failed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn commit_document(
        &mut self,
        item: &WorkItem,
        document: &EncodedDocument,
    ) -> Result<()> {
        let mut state = self.store.lock();
        let faults = state.faults.clone();
        let mut staged = state.tables.clone();

        if staged.file_paths.remove(&item.id).is_none() {
            return Err(Error::Persistence(format!(
                "work item {} is no longer queued",
                item.id
            )));
        }

        if faults.fail_commit_for.contains(&item.id) {
            return Err(Error::Persistence("document insert rejected".into()));
        }
        check_width(&document.document().title, "DocObjs.title")?;
        staged.doc_objs.push(document.document().clone());

        for (inserted, link) in document.links().iter().enumerate() {
            if faults.fail_after_links == Some(inserted) {
                return Err(Error::Persistence(format!(
                    "link insert failed after {} rows",
                    inserted
                )));
            }
            check_width(&link.to_title, "LinkObjs.toTitle")?;
            staged.link_objs.push(link.clone());
        }

        state.tables = staged;
        Ok(())
    }

    async fn mark_failed(&mut self, item_id: i64) -> Result<()> {
        let mut state = self.store.lock();
        if state.faults.fail_mark_failed {
            return Err(Error::Internal("mark failed write rejected".into()));
        }
        if let Some(item) = state.tables.file_paths.get_mut(&item_id) {
            item.failed = true;
        }
        Ok(())
    }

    async fn remaining_count(&mut self, scope: RemainingScope) -> Result<i64> {
        let state = self.store.lock();
        if state.faults.fail_remaining {
            return Err(Error::Internal("remaining count failed".into()));
        }
        let queued = state
            .tables
            .file_paths
            .values()
            .filter(|item| !item.failed)
            .count();
        let total = match scope {
            RemainingScope::Queue => queued,
            RemainingScope::All => {
                queued + state.tables.doc_objs.len() + state.tables.link_objs.len()
            }
        };
        Ok(total as i64)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.store.lock().sessions_closed += 1;
        Ok(())
    }
}
