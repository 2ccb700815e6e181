// Editor session: the explicitly constructed handle a host shell holds.
//
// Wires the document store, autosave scheduler, tab controller and save-all
// coordinator around one persistence adapter and one editor bridge.
// Subscribes to the editor's change events once at construction and
// unsubscribes at teardown (or on drop).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use canvasdeck_common::types::SaveSummary;
use tracing::info;

use crate::autosave::{AutoSaveScheduler, ManualSave};
use crate::bridge::{EditorBridge, EditorEvent, SubscriptionId};
use crate::capabilities::{Confirm, FixedConfirm, LogNotifier, Notifier};
use crate::config::SessionConfig;
use crate::lock;
use crate::persistence::PersistenceAdapter;
use crate::save_all::SaveAllCoordinator;
use crate::store::PageDocumentStore;
use crate::tabs::TabController;
use crate::timer::{Timer, TokioTimer};

/// Host capabilities injected into a session.
#[derive(Clone)]
pub struct SessionCapabilities {
    pub bridge: Arc<dyn EditorBridge>,
    pub timer: Arc<dyn Timer>,
    pub confirm: Arc<dyn Confirm>,
    pub notifier: Arc<dyn Notifier>,
}

impl SessionCapabilities {
    /// Capabilities for a session with no interactive user: tokio timers,
    /// dirty pages are never discarded on close, notifications go to the log.
    pub fn headless(bridge: Arc<dyn EditorBridge>) -> Self {
        Self {
            bridge,
            timer: Arc::new(TokioTimer::new()),
            confirm: Arc::new(FixedConfirm(false)),
            notifier: Arc::new(LogNotifier),
        }
    }
}

pub struct EditorSession<A: PersistenceAdapter> {
    store: Arc<PageDocumentStore<A>>,
    scheduler: AutoSaveScheduler<A>,
    tabs: TabController<A>,
    save_all: SaveAllCoordinator<A>,
    bridge: Arc<dyn EditorBridge>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    torn_down: AtomicBool,
}

impl<A: PersistenceAdapter> EditorSession<A> {
    pub fn new(config: &SessionConfig, adapter: Arc<A>, capabilities: SessionCapabilities) -> Self {
        let SessionCapabilities { bridge, timer, confirm, notifier } = capabilities;

        let store =
            Arc::new(PageDocumentStore::new(adapter, Arc::clone(&bridge), config.tabs.max_open()));
        let scheduler =
            AutoSaveScheduler::new(Arc::clone(&store), timer, Arc::clone(&notifier), config);
        let tabs = TabController::new(
            Arc::clone(&store),
            scheduler.clone(),
            confirm,
            Arc::clone(&notifier),
        );
        let save_all = SaveAllCoordinator::new(Arc::clone(&store), scheduler.clone(), notifier);

        let listener = scheduler.edit_listener();
        let subscriptions: Vec<SubscriptionId> =
            EditorEvent::ALL.iter().map(|event| bridge.on(*event, Arc::clone(&listener))).collect();

        info!(
            max_open = config.tabs.max_open(),
            debounce_ms = config.autosave.debounce().as_millis() as u64,
            "editor session started"
        );
        Self {
            store,
            scheduler,
            tabs,
            save_all,
            bridge,
            subscriptions: Mutex::new(subscriptions),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn tabs(&self) -> &TabController<A> {
        &self.tabs
    }

    pub fn store(&self) -> &Arc<PageDocumentStore<A>> {
        &self.store
    }

    pub fn scheduler(&self) -> &AutoSaveScheduler<A> {
        &self.scheduler
    }

    pub async fn save_all(&self) -> SaveSummary {
        self.save_all.save_all().await
    }

    /// Manual save of the active page.
    pub fn save_active_now(&self) -> ManualSave {
        match self.store.active_page_id() {
            Some(page_id) => self.scheduler.save_now(&page_id),
            None => ManualSave::NotOpen,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Unsubscribe from the editor, cancel all timers, drop every document.
    /// Unsaved changes are discarded; call `save_all` first to keep them.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for subscription in lock(&self.subscriptions).drain(..) {
            self.bridge.off(subscription);
        }
        self.scheduler.shutdown();
        self.store.teardown();
        info!("editor session torn down");
    }
}

impl<A: PersistenceAdapter> Drop for EditorSession<A> {
    fn drop(&mut self) {
        self.teardown();
    }
}
