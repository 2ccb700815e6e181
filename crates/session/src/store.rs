// Page document store: the single owner of open page documents.
//
// Every read and write of document state goes through here, behind one
// short synchronous critical section that is never held across an await.
// Bridge traffic (snapshot-out / snapshot-in) is serialized by `swap_lock`,
// and while a snapshot is pushed into the editor `swapping` is raised so the
// change events the editor emits are not mistaken for user edits.
//
// Lock order: swap_lock → state. The state lock is never held while the
// bridge is called, so bridge event handlers may call back into the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use canvasdeck_common::types::{PageId, PageSnapshot};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::bridge::{capture_snapshot, load_snapshot, EditorBridge};
use crate::capabilities::Confirm;
use crate::error::{CapacityError, LoadError, PersistenceError, SessionError};
use crate::lock;
use crate::persistence::{LoadedPage, PersistenceAdapter, StoreAck};

/// One page's editable content at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDocument {
    pub id: PageId,
    pub title: String,
    pub components: Value,
    pub styles: Value,
    pub html: String,
    pub css: String,
    pub dirty: bool,
    pub loaded: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Bumped by every recorded edit; a save clears `dirty` only for the
    /// revision it captured. Drawn from a store-wide counter, so a page that
    /// is closed and reopened never repeats an earlier revision.
    pub revision: u64,
    /// Version tag last reported by the remote store.
    pub etag: Option<String>,
}

impl PageDocument {
    fn new(
        id: PageId,
        title: String,
        snapshot: PageSnapshot,
        etag: Option<String>,
        revision: u64,
    ) -> Self {
        Self {
            id,
            title,
            components: snapshot.components,
            styles: snapshot.styles,
            html: snapshot.html,
            css: snapshot.css,
            dirty: false,
            loaded: true,
            last_saved_at: None,
            revision,
            etag,
        }
    }

    pub fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            components: self.components.clone(),
            styles: self.styles.clone(),
            html: self.html.clone(),
            css: self.css.clone(),
        }
    }

    fn apply(&mut self, snapshot: PageSnapshot) {
        self.components = snapshot.components;
        self.styles = snapshot.styles;
        self.html = snapshot.html;
        self.css = snapshot.css;
    }
}

/// Which pages are open, in tab order, and which one is active.
///
/// `active_page_id` is always an element of `open_order`; both are empty
/// before the first open and after teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTabs {
    pub active_page_id: Option<PageId>,
    pub open_order: Vec<PageId>,
    pub max_open: usize,
}

impl SessionTabs {
    fn new(max_open: usize) -> Self {
        Self { active_page_id: None, open_order: Vec::new(), max_open: max_open.max(1) }
    }

    fn is_full(&self) -> bool {
        self.open_order.len() >= self.max_open
    }

    fn capacity_error(&self) -> CapacityError {
        CapacityError { max_open: self.max_open }
    }
}

/// Result of `PageDocumentStore::close_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The page was not open; nothing changed.
    NotOpen,
    /// The page had unsaved changes and the user kept it open.
    Declined,
    /// The page was evicted. `new_active` is set when the closed page was
    /// the active one.
    Closed { new_active: Option<PageId> },
}

/// What a save sends, and the revision it may clear.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveCapture {
    pub snapshot: PageSnapshot,
    pub revision: u64,
    pub etag: Option<String>,
    pub dirty: bool,
}

type LoadCell = Arc<OnceCell<Result<LoadedPage, PersistenceError>>>;

struct StoreState {
    documents: HashMap<PageId, PageDocument>,
    tabs: SessionTabs,
    // In-flight fetches, shared by concurrent `open_page` calls.
    loads: HashMap<PageId, LoadCell>,
}

pub struct PageDocumentStore<A> {
    adapter: Arc<A>,
    bridge: Arc<dyn EditorBridge>,
    state: Mutex<StoreState>,
    swap_lock: Mutex<()>,
    swapping: AtomicBool,
    revisions: AtomicU64,
}

impl<A: PersistenceAdapter> PageDocumentStore<A> {
    pub fn new(adapter: Arc<A>, bridge: Arc<dyn EditorBridge>, max_open: usize) -> Self {
        Self {
            adapter,
            bridge,
            state: Mutex::new(StoreState {
                documents: HashMap::new(),
                tabs: SessionTabs::new(max_open),
                loads: HashMap::new(),
            }),
            swap_lock: Mutex::new(()),
            swapping: AtomicBool::new(false),
            revisions: AtomicU64::new(0),
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    // ── Open ────────────────────────────────────────────────────────

    /// Open a page, fetching its snapshot unless it is already open.
    ///
    /// Returns `true` if this call added the document. Concurrent calls for
    /// the same page share one fetch. On failure the store is unchanged.
    pub async fn open_page(&self, page_id: &PageId, title: &str) -> Result<bool, SessionError> {
        let cell = {
            let mut state = lock(&self.state);
            if state.documents.contains_key(page_id) {
                return Ok(false);
            }
            if state.tabs.is_full() {
                return Err(state.tabs.capacity_error().into());
            }
            Arc::clone(state.loads.entry(page_id.clone()).or_default())
        };

        let adapter = Arc::clone(&self.adapter);
        let fetch_id = page_id.clone();
        let result = cell
            .get_or_init(|| async move {
                debug!(page_id = %fetch_id, "fetching page snapshot");
                adapter.load(&fetch_id).await
            })
            .await
            .clone();

        {
            let mut state = lock(&self.state);
            if state.loads.get(page_id).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                state.loads.remove(page_id);
            }
        }

        let loaded = result.map_err(|source| LoadError { page_id: page_id.clone(), source })?;
        self.insert_document(page_id, title, loaded.snapshot, loaded.etag)
    }

    /// Add a document from a caller-provided snapshot, without a fetch.
    pub fn seed_page(
        &self,
        page_id: &PageId,
        title: &str,
        snapshot: PageSnapshot,
    ) -> Result<bool, SessionError> {
        self.insert_document(page_id, title, snapshot, None)
    }

    fn insert_document(
        &self,
        page_id: &PageId,
        title: &str,
        snapshot: PageSnapshot,
        etag: Option<String>,
    ) -> Result<bool, SessionError> {
        let _swap = lock(&self.swap_lock);
        let first = {
            let mut state = lock(&self.state);
            if state.documents.contains_key(page_id) {
                return Ok(false);
            }
            if state.tabs.is_full() {
                return Err(state.tabs.capacity_error().into());
            }
            let document = PageDocument::new(
                page_id.clone(),
                title.to_string(),
                snapshot,
                etag,
                self.next_revision(),
            );
            state.documents.insert(page_id.clone(), document);
            state.tabs.open_order.push(page_id.clone());
            let first = state.tabs.active_page_id.is_none();
            if first {
                state.tabs.active_page_id = Some(page_id.clone());
            }
            first
        };
        if first {
            self.push_into_bridge(page_id);
        }
        info!(page_id = %page_id, active = first, "page opened");
        Ok(true)
    }

    // ── Switch / close ──────────────────────────────────────────────

    /// Make `page_id` the active page.
    ///
    /// Snapshots the current page out of the editor, pushes the target in,
    /// then updates the active id. Returns `false` if it was already active.
    pub fn switch_active(&self, page_id: &PageId) -> Result<bool, SessionError> {
        let _swap = lock(&self.swap_lock);
        let current = {
            let state = lock(&self.state);
            if !state.documents.contains_key(page_id) {
                return Err(SessionError::NotOpen(page_id.clone()));
            }
            state.tabs.active_page_id.clone()
        };
        if current.as_ref() == Some(page_id) {
            return Ok(false);
        }

        if let Some(current) = &current {
            let live = capture_snapshot(self.bridge.as_ref());
            if let Some(document) = lock(&self.state).documents.get_mut(current) {
                document.apply(live);
            }
        }
        self.push_into_bridge(page_id);
        lock(&self.state).tabs.active_page_id = Some(page_id.clone());

        debug!(from = ?current, to = %page_id, "switched active page");
        Ok(true)
    }

    /// Evict a page.
    ///
    /// The last open page cannot be closed. A dirty page is only evicted if
    /// `confirm` agrees to discard its changes.
    pub async fn close_page(
        &self,
        page_id: &PageId,
        confirm: &dyn Confirm,
    ) -> Result<CloseOutcome, SessionError> {
        let (dirty, title) = {
            let state = lock(&self.state);
            let Some(document) = state.documents.get(page_id) else {
                return Ok(CloseOutcome::NotOpen);
            };
            if state.tabs.open_order.len() <= 1 {
                return Err(SessionError::LastPage(page_id.clone()));
            }
            (document.dirty, document.title.clone())
        };

        if dirty {
            let message = format!("\"{title}\" has unsaved changes. Close it and discard them?");
            if !confirm.ask_confirmation(&message).await {
                debug!(page_id = %page_id, "close declined");
                return Ok(CloseOutcome::Declined);
            }
        }

        let _swap = lock(&self.swap_lock);
        let new_active = {
            let mut state = lock(&self.state);
            let Some(index) = state.tabs.open_order.iter().position(|id| id == page_id) else {
                return Ok(CloseOutcome::NotOpen);
            };
            if state.tabs.open_order.len() <= 1 {
                return Err(SessionError::LastPage(page_id.clone()));
            }
            state.tabs.open_order.remove(index);
            state.documents.remove(page_id);

            if state.tabs.active_page_id.as_ref() == Some(page_id) {
                let next = state
                    .tabs
                    .open_order
                    .get(index)
                    .or_else(|| index.checked_sub(1).and_then(|i| state.tabs.open_order.get(i)))
                    .cloned();
                state.tabs.active_page_id = next.clone();
                next
            } else {
                None
            }
        };
        if let Some(next) = &new_active {
            self.push_into_bridge(next);
        }

        info!(page_id = %page_id, new_active = ?new_active, "page closed");
        Ok(CloseOutcome::Closed { new_active })
    }

    // ── Dirty tracking ──────────────────────────────────────────────

    /// Record an edit: set `dirty` and bump the revision.
    ///
    /// Returns the new revision, or `None` if the page is not open.
    pub fn mark_dirty(&self, page_id: &PageId) -> Option<u64> {
        let mut state = lock(&self.state);
        let document = state.documents.get_mut(page_id)?;
        document.dirty = true;
        document.revision = self.next_revision();
        Some(document.revision)
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Clear `dirty` if no edit was recorded after `revision`.
    pub fn clear_dirty(&self, page_id: &PageId, revision: u64) -> bool {
        let mut state = lock(&self.state);
        match state.documents.get_mut(page_id) {
            Some(document) if document.revision == revision => {
                document.dirty = false;
                true
            }
            _ => false,
        }
    }

    /// Record a successful store of `revision`. Returns whether the page is
    /// now clean.
    pub fn mark_saved(&self, page_id: &PageId, revision: u64, ack: &StoreAck) -> bool {
        let mut state = lock(&self.state);
        let Some(document) = state.documents.get_mut(page_id) else {
            return false;
        };
        if ack.etag.is_some() {
            document.etag = ack.etag.clone();
        }
        document.last_saved_at = Some(ack.saved_at);
        if document.revision == revision {
            document.dirty = false;
        }
        !document.dirty
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Copy the editor's live state into the active document.
    pub fn flush_active(&self) -> Option<PageId> {
        let _swap = lock(&self.swap_lock);
        self.flush_active_swapped().map(|(id, _)| id)
    }

    /// Snapshot a page for a store call, flushing it first if it is active.
    pub fn capture_for_save(&self, page_id: &PageId) -> Option<SaveCapture> {
        let _swap = lock(&self.swap_lock);
        let is_active = lock(&self.state).tabs.active_page_id.as_ref() == Some(page_id);
        let flushed_revision = if is_active {
            self.flush_active_swapped().map(|(_, revision)| revision)
        } else {
            None
        };

        let state = lock(&self.state);
        let document = state.documents.get(page_id)?;
        Some(SaveCapture {
            snapshot: document.snapshot(),
            revision: flushed_revision.unwrap_or(document.revision),
            etag: document.etag.clone(),
            dirty: document.dirty,
        })
    }

    // Caller holds `swap_lock`. The revision is read before the editor so an
    // edit racing the capture keeps the document dirty.
    fn flush_active_swapped(&self) -> Option<(PageId, u64)> {
        let (active, revision) = {
            let state = lock(&self.state);
            let active = state.tabs.active_page_id.clone()?;
            let revision = state.documents.get(&active)?.revision;
            (active, revision)
        };
        let live = capture_snapshot(self.bridge.as_ref());
        if let Some(document) = lock(&self.state).documents.get_mut(&active) {
            document.apply(live);
        }
        Some((active, revision))
    }

    // Caller holds `swap_lock`.
    fn push_into_bridge(&self, page_id: &PageId) {
        let Some(snapshot) = lock(&self.state).documents.get(page_id).map(PageDocument::snapshot)
        else {
            return;
        };
        self.swapping.store(true, Ordering::SeqCst);
        let _reset = SwappingGuard(&self.swapping);
        load_snapshot(self.bridge.as_ref(), &snapshot);
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// True while a stored snapshot is being pushed into the editor.
    pub fn is_swapping(&self) -> bool {
        self.swapping.load(Ordering::SeqCst)
    }

    pub fn document(&self, page_id: &PageId) -> Option<PageDocument> {
        lock(&self.state).documents.get(page_id).cloned()
    }

    pub fn title(&self, page_id: &PageId) -> Option<String> {
        lock(&self.state).documents.get(page_id).map(|d| d.title.clone())
    }

    pub fn is_open(&self, page_id: &PageId) -> bool {
        lock(&self.state).documents.contains_key(page_id)
    }

    pub fn is_dirty(&self, page_id: &PageId) -> bool {
        lock(&self.state).documents.get(page_id).is_some_and(|d| d.dirty)
    }

    pub fn active_page_id(&self) -> Option<PageId> {
        lock(&self.state).tabs.active_page_id.clone()
    }

    pub fn open_order(&self) -> Vec<PageId> {
        lock(&self.state).tabs.open_order.clone()
    }

    pub fn tabs(&self) -> SessionTabs {
        lock(&self.state).tabs.clone()
    }

    /// Dirty pages in tab order, copied at call time.
    pub fn dirty_pages(&self) -> Vec<PageId> {
        let state = lock(&self.state);
        state
            .tabs
            .open_order
            .iter()
            .filter(|id| state.documents.get(*id).is_some_and(|d| d.dirty))
            .cloned()
            .collect()
    }

    /// Drop every document and empty the session.
    pub fn teardown(&self) {
        let _swap = lock(&self.swap_lock);
        let mut state = lock(&self.state);
        state.documents.clear();
        state.loads.clear();
        state.tabs.open_order.clear();
        state.tabs.active_page_id = None;
    }
}

struct SwappingGuard<'a>(&'a AtomicBool);

impl Drop for SwappingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
