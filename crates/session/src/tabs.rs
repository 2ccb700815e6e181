// Tab controller: open / switch / close lifecycle over the document store.
//
// Owns no document state. It delegates to `PageDocumentStore`, keeps the
// autosave scheduler in step with evictions, surfaces rejected opens through
// the notifier, and broadcasts `TabEvent`s to observers.

use std::sync::Arc;

use canvasdeck_common::types::PageId;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::autosave::AutoSaveScheduler;
use crate::capabilities::{Confirm, Notification, NotificationKind, Notifier};
use crate::error::SessionError;
use crate::persistence::PersistenceAdapter;
use crate::store::{CloseOutcome, PageDocumentStore};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    Opened { page_id: PageId },
    Activated { page_id: PageId },
    Closed { page_id: PageId, new_active: Option<PageId> },
}

pub struct TabController<A> {
    store: Arc<PageDocumentStore<A>>,
    scheduler: AutoSaveScheduler<A>,
    confirm: Arc<dyn Confirm>,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<TabEvent>,
}

impl<A: PersistenceAdapter> TabController<A> {
    pub fn new(
        store: Arc<PageDocumentStore<A>>,
        scheduler: AutoSaveScheduler<A>,
        confirm: Arc<dyn Confirm>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, scheduler, confirm, notifier, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }

    pub fn active_page_id(&self) -> Option<PageId> {
        self.store.active_page_id()
    }

    pub fn open_order(&self) -> Vec<PageId> {
        self.store.open_order()
    }

    /// Open a tab without switching to it (the first tab becomes active).
    pub async fn open_page(&self, page_id: &PageId, title: &str) -> Result<bool, SessionError> {
        match self.store.open_page(page_id, title).await {
            Ok(added) => {
                if added {
                    self.emit(TabEvent::Opened { page_id: page_id.clone() });
                    if self.store.active_page_id().as_ref() == Some(page_id) {
                        self.emit(TabEvent::Activated { page_id: page_id.clone() });
                    }
                }
                Ok(added)
            }
            Err(err) => {
                warn!(page_id = %page_id, error = %err, "open rejected");
                self.notifier.notify(Notification::error(err.to_string()).for_page(page_id));
                Err(err)
            }
        }
    }

    /// Open a tab if needed, then make it active.
    pub async fn focus_page(&self, page_id: &PageId, title: &str) -> Result<(), SessionError> {
        self.open_page(page_id, title).await?;
        self.switch_to_page(page_id)?;
        Ok(())
    }

    pub fn switch_to_page(&self, page_id: &PageId) -> Result<bool, SessionError> {
        let switched = self.store.switch_active(page_id)?;
        if switched {
            self.emit(TabEvent::Activated { page_id: page_id.clone() });
        }
        Ok(switched)
    }

    /// Close a tab. The last tab cannot be closed; a dirty tab needs the
    /// user's confirmation.
    pub async fn close_page(&self, page_id: &PageId) -> Result<CloseOutcome, SessionError> {
        let outcome = match self.store.close_page(page_id, self.confirm.as_ref()).await {
            Ok(outcome) => outcome,
            Err(err @ SessionError::LastPage(_)) => {
                self.notifier.notify(
                    Notification::new(NotificationKind::Info, "The last open page cannot be closed")
                        .for_page(page_id),
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if let CloseOutcome::Closed { new_active } = &outcome {
            self.scheduler.cancel(page_id);
            self.emit(TabEvent::Closed { page_id: page_id.clone(), new_active: new_active.clone() });
            if let Some(active) = new_active {
                self.emit(TabEvent::Activated { page_id: active.clone() });
            }
        }
        Ok(outcome)
    }

    /// Activate the tab after the current one, wrapping to the first.
    pub fn next_page(&self) -> Result<Option<PageId>, SessionError> {
        self.cycle(true)
    }

    /// Activate the tab before the current one, wrapping to the last.
    pub fn previous_page(&self) -> Result<Option<PageId>, SessionError> {
        self.cycle(false)
    }

    fn cycle(&self, forward: bool) -> Result<Option<PageId>, SessionError> {
        let tabs = self.store.tabs();
        let Some(active) = tabs.active_page_id else {
            return Ok(None);
        };
        let current = tabs.open_order.iter().position(|id| *id == active).unwrap_or(0);
        let target = tabs.open_order[cycle_index(tabs.open_order.len(), current, forward)].clone();
        self.switch_to_page(&target)?;
        Ok(Some(target))
    }

    fn emit(&self, event: TabEvent) {
        debug!(?event, "tab event");
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

/// Neighbouring index in a ring of `len` tabs.
pub fn cycle_index(len: usize, current: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (current + 1) % len
    } else {
        (current + len - 1) % len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_wraps_forward() {
        assert_eq!(cycle_index(3, 0, true), 1);
        assert_eq!(cycle_index(3, 2, true), 0);
    }

    #[test]
    fn cycle_wraps_backward() {
        assert_eq!(cycle_index(3, 0, false), 2);
        assert_eq!(cycle_index(3, 2, false), 1);
    }

    #[test]
    fn single_tab_cycles_to_itself() {
        assert_eq!(cycle_index(1, 0, true), 0);
        assert_eq!(cycle_index(1, 0, false), 0);
        assert_eq!(cycle_index(0, 0, true), 0);
    }
}
