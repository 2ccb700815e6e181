// Save-all: flush the editor, then persist every dirty page in tab order.
//
// One pass at a time. A call made while a pass is running joins it and gets
// the same summary; if the running pass is dropped before finishing, the
// waiters start a fresh one.

use std::sync::{Arc, Mutex};

use canvasdeck_common::types::SaveSummary;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::autosave::{AutoSaveScheduler, PersistOutcome};
use crate::capabilities::{Notification, Notifier};
use crate::lock;
use crate::persistence::PersistenceAdapter;
use crate::store::PageDocumentStore;

type RunningPass = Mutex<Option<watch::Receiver<Option<SaveSummary>>>>;

enum Role {
    Lead(watch::Sender<Option<SaveSummary>>),
    Join(watch::Receiver<Option<SaveSummary>>),
}

pub struct SaveAllCoordinator<A> {
    store: Arc<PageDocumentStore<A>>,
    scheduler: AutoSaveScheduler<A>,
    notifier: Arc<dyn Notifier>,
    running: RunningPass,
}

impl<A: PersistenceAdapter> SaveAllCoordinator<A> {
    pub fn new(
        store: Arc<PageDocumentStore<A>>,
        scheduler: AutoSaveScheduler<A>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, scheduler, notifier, running: Mutex::new(None) }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Persist every dirty page and report how many succeeded and failed.
    pub async fn save_all(&self) -> SaveSummary {
        loop {
            let role = {
                let mut running = lock(&self.running);
                match running.as_ref() {
                    Some(rx) => Role::Join(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        *running = Some(rx);
                        Role::Lead(tx)
                    }
                }
            };

            let tx = match role {
                Role::Lead(tx) => tx,
                Role::Join(mut rx) => {
                    debug!("joining running save-all pass");
                    if let Ok(result) = rx.wait_for(Option::is_some).await {
                        if let Some(summary) = *result {
                            return summary;
                        }
                    }
                    // Leader dropped mid-pass; go again.
                    continue;
                }
            };

            let pass = PassGuard(&self.running);
            let summary = self.run_pass().await;
            let _ = tx.send(Some(summary));
            drop(pass);

            self.notifier.notify(Notification::save_summary(summary));
            return summary;
        }
    }

    async fn run_pass(&self) -> SaveSummary {
        self.store.flush_active();
        let dirty = self.store.dirty_pages();
        let mut summary = SaveSummary::default();
        if dirty.is_empty() {
            debug!("save-all: nothing dirty");
            return summary;
        }

        info!(pages = dirty.len(), "save-all started");
        for page_id in dirty {
            match self.scheduler.persist(&page_id).await {
                Ok(PersistOutcome::Saved(_)) | Ok(PersistOutcome::AlreadyClean) => {
                    summary.succeeded += 1;
                }
                Ok(PersistOutcome::Closed) => {
                    debug!(page_id = %page_id, "save-all: page closed during pass");
                }
                Err(err) => {
                    warn!(page_id = %page_id, error = %err, "save-all: page failed");
                    summary.failed += 1;
                }
            }
        }
        info!(succeeded = summary.succeeded, failed = summary.failed, "save-all finished");
        summary
    }
}

// Clears the running slot when the leading pass ends, however it ends.
struct PassGuard<'a>(&'a RunningPass);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}
