// Shared fakes for session integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use canvasdeck_common::types::{PageId, PageSnapshot};
use canvasdeck_session::{
    EditorSession, FixedConfirm, HeadlessEditor, LoadedPage, Notification, NotificationKind,
    Notifier, PersistenceAdapter, PersistenceError, SessionCapabilities, SessionConfig, StoreAck,
    TokioTimer,
};
use serde_json::json;

pub fn snapshot(text: &str) -> PageSnapshot {
    PageSnapshot {
        components: json!([{ "tagName": "p", "content": text }]),
        ..PageSnapshot::default()
    }
}

pub fn id(raw: &str) -> PageId {
    PageId::new(raw)
}

// ── Scripted adapter ────────────────────────────────────────────────

/// Persistence fake with scripted store results, call recording and
/// in-flight tracking.
#[derive(Default)]
pub struct ScriptedAdapter {
    pages: Mutex<HashMap<PageId, PageSnapshot>>,
    scripts: Mutex<HashMap<PageId, VecDeque<Result<(), PersistenceError>>>>,
    stores: Mutex<Vec<(PageId, PageSnapshot)>>,
    loads: AtomicUsize,
    in_flight: Mutex<HashMap<PageId, usize>>,
    max_in_flight: AtomicUsize,
    store_delay: Duration,
    load_delay: Duration,
}

impl ScriptedAdapter {
    pub fn with_pages(pages: &[&str]) -> Self {
        let adapter = Self::default();
        for page in pages {
            adapter.pages.lock().unwrap().insert(id(page), snapshot(page));
        }
        adapter
    }

    pub fn store_delay(mut self, delay: Duration) -> Self {
        self.store_delay = delay;
        self
    }

    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Queue results for the next store calls on `page`; later calls succeed.
    pub fn script(&self, page: &str, results: Vec<Result<(), PersistenceError>>) {
        self.scripts.lock().unwrap().entry(id(page)).or_default().extend(results);
    }

    pub fn store_calls(&self) -> Vec<(PageId, PageSnapshot)> {
        self.stores.lock().unwrap().clone()
    }

    pub fn store_count(&self, page: &str) -> usize {
        self.stores.lock().unwrap().iter().filter(|(p, _)| p.as_str() == page).count()
    }

    pub fn total_stores(&self) -> usize {
        self.stores.lock().unwrap().len()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn remote(&self, page: &str) -> Option<PageSnapshot> {
        self.pages.lock().unwrap().get(&id(page)).cloned()
    }
}

impl PersistenceAdapter for ScriptedAdapter {
    async fn load(&self, page_id: &PageId) -> Result<LoadedPage, PersistenceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        let snapshot = self.pages.lock().unwrap().get(page_id).cloned();
        match snapshot {
            Some(snapshot) => Ok(LoadedPage { snapshot, etag: None }),
            None => Err(PersistenceError::from_status(404, "not found")),
        }
    }

    async fn store(
        &self,
        page_id: &PageId,
        snapshot: &PageSnapshot,
        _if_match: Option<&str>,
    ) -> Result<StoreAck, PersistenceError> {
        {
            self.stores.lock().unwrap().push((page_id.clone(), snapshot.clone()));
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(page_id.clone()).or_default();
            *count += 1;
            self.max_in_flight.fetch_max(*count, Ordering::SeqCst);
        }

        if !self.store_delay.is_zero() {
            tokio::time::sleep(self.store_delay).await;
        }

        let scripted = self.scripts.lock().unwrap().get_mut(page_id).and_then(VecDeque::pop_front);
        *self.in_flight.lock().unwrap().entry(page_id.clone()).or_default() -= 1;

        scripted.unwrap_or(Ok(()))?;
        self.pages.lock().unwrap().insert(page_id.clone(), snapshot.clone());
        Ok(StoreAck::now(None))
    }
}

// ── Notifier ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.all().into_iter().filter(|n| n.kind == kind).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

// ── Session harness ─────────────────────────────────────────────────

pub struct Harness {
    pub session: EditorSession<ScriptedAdapter>,
    pub adapter: Arc<ScriptedAdapter>,
    pub editor: Arc<HeadlessEditor>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(adapter: ScriptedAdapter) -> Self {
        Self::with_config(adapter, &SessionConfig::default(), true)
    }

    pub fn with_config(adapter: ScriptedAdapter, config: &SessionConfig, confirm: bool) -> Self {
        let adapter = Arc::new(adapter);
        let editor = Arc::new(HeadlessEditor::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let session = EditorSession::new(
            config,
            Arc::clone(&adapter),
            SessionCapabilities {
                bridge: editor.clone(),
                timer: Arc::new(TokioTimer::new()),
                confirm: Arc::new(FixedConfirm(confirm)),
                notifier: notifier.clone(),
            },
        );
        Self { session, adapter, editor, notifier }
    }

    /// Open pages in order; the first becomes active.
    pub async fn open(&self, pages: &[&str]) {
        for page in pages {
            self.session.tabs().open_page(&id(page), page).await.expect("page should open");
        }
    }

    /// Simulate a user edit on the active page.
    pub fn type_text(&self, text: &str) {
        self.editor.edit_components(snapshot(text).components);
    }

    pub fn is_dirty(&self, page: &str) -> bool {
        self.session.store().is_dirty(&id(page))
    }
}
