// Autosave scheduler: debounced, retried persistence of dirty pages.
//
// Per-page state machine:
//
//   Clean ──edit──▶ PendingSave ──debounce──▶ Saving ──ok──▶ Clean
//                                               │
//                     ┌──── transient ◀─────────┤
//                     ▼                         │
//               PendingRetry ──backoff──▶ Saving └── permanent / ceiling ──▶ FailedPermanent
//
// Every `store` call for a page runs while holding that page's save lane, so
// at most one request per page is ever in flight. Whoever holds the lane
// re-checks the dirty flag when a request completes and, if edits arrived
// meanwhile, keeps the lane and sends a catch-up save straight away. A manual
// save requested during a request that then fails transiently is also sent
// straight away rather than after the backoff.
//
// Timer callbacks carry the slot generation they were armed with; a callback
// whose generation is stale was superseded (re-armed or cancelled) and does
// nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use canvasdeck_common::types::PageId;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bridge::{EditorEvent, EditorEventHandler};
use crate::capabilities::{Notification, NotificationKind, Notifier};
use crate::config::SessionConfig;
use crate::error::{FailureKind, PersistenceError};
use crate::lock;
use crate::persistence::backoff::RetryPolicy;
use crate::persistence::{store_with_timeout, PersistenceAdapter, StoreAck};
use crate::store::PageDocumentStore;
use crate::timer::{Timer, TimerToken};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SavePhase {
    #[default]
    Clean,
    PendingSave,
    Saving,
    PendingRetry,
    FailedPermanent,
}

/// Scheduler bookkeeping for a page that is not clean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTask {
    pub page_id: PageId,
    /// Consecutive failed attempts.
    pub attempt: u32,
    pub next_retry_at: Option<Instant>,
}

/// Result of `AutoSaveScheduler::save_now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualSave {
    /// A save was dispatched immediately.
    Started,
    /// A save is already running; its completion check covers this request.
    Coalesced,
    NotOpen,
}

/// Result of a single awaited `persist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved(StoreAck),
    /// Nothing to send; a concurrent save already covered it.
    AlreadyClean,
    /// The page was closed before it could be saved.
    Closed,
}

type Lane = Arc<tokio::sync::Mutex<()>>;
type LaneGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
struct PageSlot {
    phase: SavePhase,
    generation: u64,
    timer: Option<TimerToken>,
    attempt: u32,
    next_retry_at: Option<Instant>,
    in_flight: bool,
    // A manual save was requested; report it once the page is clean.
    manual: bool,
    // A manual save arrived while a request was running.
    coalesced: bool,
}

enum Attempt {
    Saved(StoreAck),
    NothingToSave,
    Closed,
    Failed(PersistenceError),
}

struct Inner<A> {
    store: Arc<PageDocumentStore<A>>,
    timer: Arc<dyn Timer>,
    notifier: Arc<dyn Notifier>,
    debounce: Duration,
    retry: RetryPolicy,
    request_timeout: Duration,
    optimistic_concurrency: bool,
    slots: Mutex<HashMap<PageId, PageSlot>>,
    lanes: Mutex<HashMap<PageId, Lane>>,
    // Shared across slots so a re-created slot never reuses a generation.
    generations: AtomicU64,
    shut_down: AtomicBool,
}

pub struct AutoSaveScheduler<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for AutoSaveScheduler<A> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<A: PersistenceAdapter> AutoSaveScheduler<A> {
    pub fn new(
        store: Arc<PageDocumentStore<A>>,
        timer: Arc<dyn Timer>,
        notifier: Arc<dyn Notifier>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                timer,
                notifier,
                debounce: config.autosave.debounce(),
                retry: config.autosave.retry_policy(),
                request_timeout: config.remote.request_timeout(),
                optimistic_concurrency: config.remote.optimistic_concurrency,
                slots: Mutex::new(HashMap::new()),
                lanes: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn store(&self) -> &Arc<PageDocumentStore<A>> {
        &self.inner.store
    }

    /// Editor change handler: records an edit on the active page.
    ///
    /// Events raised while a stored snapshot is pushed into the editor are
    /// ignored. The handler holds only a weak reference to the scheduler.
    pub fn edit_listener(&self) -> EditorEventHandler {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |event: EditorEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.store.is_swapping() {
                return;
            }
            if let Some(active) = inner.store.active_page_id() {
                debug!(page_id = %active, event = event.name(), "editor change");
                AutoSaveScheduler { inner }.notify_edit(&active);
            }
        })
    }

    // ── Triggers ────────────────────────────────────────────────────

    /// Record an edit and (re)arm the debounce timer.
    pub fn notify_edit(&self, page_id: &PageId) {
        if self.is_shut_down() {
            return;
        }
        let Some(revision) = self.inner.store.mark_dirty(page_id) else {
            return;
        };

        let mut slots = lock(&self.inner.slots);
        let slot = slots.entry(page_id.clone()).or_default();
        match slot.phase {
            SavePhase::FailedPermanent => {
                debug!(page_id = %page_id, revision, "edit on failed page; waiting for manual save");
                return;
            }
            SavePhase::PendingRetry => {
                // Never fire before the backoff window is over.
                let now = Instant::now();
                let until_retry = slot
                    .next_retry_at
                    .map(|at| at.saturating_duration_since(now))
                    .unwrap_or_default();
                let delay = self.inner.debounce.max(until_retry);
                slot.next_retry_at = Some(now + delay);
                self.arm(page_id, slot, delay);
            }
            SavePhase::Saving => self.arm(page_id, slot, self.inner.debounce),
            SavePhase::Clean | SavePhase::PendingSave => {
                slot.phase = SavePhase::PendingSave;
                self.arm(page_id, slot, self.inner.debounce);
            }
        }
        debug!(page_id = %page_id, revision, phase = ?slot.phase, "edit recorded");
    }

    /// Save now, bypassing the debounce window.
    pub fn save_now(&self, page_id: &PageId) -> ManualSave {
        if self.is_shut_down() || !self.inner.store.is_open(page_id) {
            return ManualSave::NotOpen;
        }

        let mut slots = lock(&self.inner.slots);
        let slot = slots.entry(page_id.clone()).or_default();
        slot.manual = true;
        if slot.phase == SavePhase::FailedPermanent {
            slot.attempt = 0;
        }
        if !slot.in_flight {
            self.disarm(slot);
            if self.start_locked(page_id, slot, true) {
                return ManualSave::Started;
            }
        }
        slot.coalesced = true;
        debug!(page_id = %page_id, "manual save coalesced into running save");
        ManualSave::Coalesced
    }

    /// Persist one page and wait for the outcome.
    ///
    /// Waits behind any save already in flight for the page. Failures follow
    /// the same retry rules as autosave but are not notified individually.
    pub async fn persist(&self, page_id: &PageId) -> Result<PersistOutcome, PersistenceError> {
        if !self.inner.store.is_open(page_id) {
            return Ok(PersistOutcome::Closed);
        }
        let guard = self.lane(page_id).lock_owned().await;
        {
            let mut slots = lock(&self.inner.slots);
            if self.is_shut_down() || !self.inner.store.is_open(page_id) {
                drop(slots);
                drop(guard);
                self.release_lane(page_id);
                return Ok(PersistOutcome::Closed);
            }
            let slot = slots.entry(page_id.clone()).or_default();
            self.disarm(slot);
            slot.in_flight = true;
            slot.phase = SavePhase::Saving;
        }

        let attempt = self.attempt(page_id, false).await;
        let outcome = match &attempt {
            Attempt::Saved(ack) => Ok(PersistOutcome::Saved(ack.clone())),
            Attempt::NothingToSave => Ok(PersistOutcome::AlreadyClean),
            Attempt::Closed => Ok(PersistOutcome::Closed),
            Attempt::Failed(err) => Err(err.clone()),
        };
        if let Some(guard) = self.settle(page_id, attempt, true, guard) {
            let this = self.clone();
            let page = page_id.clone();
            tokio::spawn(async move { this.drive(page, guard, false).await });
        }
        outcome
    }

    // ── Inspection / lifecycle ──────────────────────────────────────

    pub fn phase(&self, page_id: &PageId) -> SavePhase {
        lock(&self.inner.slots).get(page_id).map(|s| s.phase).unwrap_or_default()
    }

    pub fn pending_task(&self, page_id: &PageId) -> Option<SaveTask> {
        let slots = lock(&self.inner.slots);
        let slot = slots.get(page_id).filter(|s| s.phase != SavePhase::Clean)?;
        Some(SaveTask {
            page_id: page_id.clone(),
            attempt: slot.attempt,
            next_retry_at: slot.next_retry_at,
        })
    }

    /// Drop all scheduling for a page. A request already in flight finishes
    /// but nothing follows it.
    pub fn cancel(&self, page_id: &PageId) {
        let removed = lock(&self.inner.slots).remove(page_id);
        if let Some(mut slot) = removed {
            self.disarm(&mut slot);
            debug!(page_id = %page_id, "autosave cancelled");
        }
        self.release_lane(page_id);
    }

    /// Cancel every timer and stop scheduling.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut slots = lock(&self.inner.slots);
        for slot in slots.values_mut() {
            self.disarm(slot);
        }
        slots.clear();
        // Lanes still held by a running request go when it settles.
        lock(&self.inner.lanes).retain(|_, lane| Arc::strong_count(lane) > 1);
        info!("autosave scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn lane(&self, page_id: &PageId) -> Lane {
        Arc::clone(lock(&self.inner.lanes).entry(page_id.clone()).or_default())
    }

    // Forget a page's lane once no request holds or awaits it.
    fn release_lane(&self, page_id: &PageId) {
        let mut lanes = lock(&self.inner.lanes);
        if lanes.get(page_id).is_some_and(|lane| Arc::strong_count(lane) == 1) {
            lanes.remove(page_id);
        }
    }

    fn arm(&self, page_id: &PageId, slot: &mut PageSlot, delay: Duration) {
        self.disarm(slot);
        let generation = slot.generation;
        let weak = Arc::downgrade(&self.inner);
        let page = page_id.clone();
        let token = self.inner.timer.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    AutoSaveScheduler { inner }.wake(&page, generation);
                }
            }),
        );
        slot.timer = Some(token);
    }

    fn disarm(&self, slot: &mut PageSlot) {
        if let Some(token) = slot.timer.take() {
            self.inner.timer.cancel(token);
        }
        slot.generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
    }

    fn wake(&self, page_id: &PageId, generation: u64) {
        let mut slots = lock(&self.inner.slots);
        let Some(slot) = slots.get_mut(page_id) else {
            return;
        };
        if slot.generation != generation {
            debug!(page_id = %page_id, "stale timer ignored");
            return;
        }
        slot.timer = None;
        self.start_locked(page_id, slot, false);
    }

    // Caller holds the slots lock. Returns false if the lane is busy; the
    // holder re-checks the dirty flag before releasing it.
    fn start_locked(&self, page_id: &PageId, slot: &mut PageSlot, force: bool) -> bool {
        if self.is_shut_down() || slot.in_flight {
            return false;
        }
        let Ok(guard) = self.lane(page_id).try_lock_owned() else {
            return false;
        };
        slot.in_flight = true;
        slot.phase = SavePhase::Saving;

        let this = self.clone();
        let page = page_id.clone();
        tokio::spawn(async move { this.drive(page, guard, force).await });
        true
    }

    async fn drive(self, page_id: PageId, guard: LaneGuard, force: bool) {
        let mut guard = guard;
        let mut force = force;
        loop {
            let attempt = self.attempt(&page_id, force).await;
            match self.settle(&page_id, attempt, false, guard) {
                Some(next) => {
                    debug!(page_id = %page_id, "sending follow-up save");
                    guard = next;
                    force = false;
                }
                None => break,
            }
        }
    }

    async fn attempt(&self, page_id: &PageId, force: bool) -> Attempt {
        let Some(capture) = self.inner.store.capture_for_save(page_id) else {
            return Attempt::Closed;
        };
        if !capture.dirty && !force {
            return Attempt::NothingToSave;
        }

        let if_match =
            if self.inner.optimistic_concurrency { capture.etag.as_deref() } else { None };
        debug!(page_id = %page_id, revision = capture.revision, "saving page");
        let result = store_with_timeout(
            self.inner.store.adapter().as_ref(),
            page_id,
            &capture.snapshot,
            if_match,
            self.inner.request_timeout,
        )
        .await;

        match result {
            Ok(ack) => {
                let clean = self.inner.store.mark_saved(page_id, capture.revision, &ack);
                info!(page_id = %page_id, revision = capture.revision, clean, "page saved");
                Attempt::Saved(ack)
            }
            Err(err) => Attempt::Failed(err),
        }
    }

    // Apply an attempt's outcome. Returns the lane guard if the caller should
    // send a catch-up save, otherwise releases the lane.
    fn settle(
        &self,
        page_id: &PageId,
        attempt: Attempt,
        quiet: bool,
        guard: LaneGuard,
    ) -> Option<LaneGuard> {
        let mut slots = lock(&self.inner.slots);
        if matches!(attempt, Attempt::Closed) {
            slots.remove(page_id);
        }
        let Some(slot) = slots.get_mut(page_id) else {
            drop(slots);
            drop(guard);
            self.release_lane(page_id);
            return None;
        };

        let saved = matches!(attempt, Attempt::Saved(_));
        let mut notice = None;
        let keep_going = match attempt {
            Attempt::Saved(_) | Attempt::NothingToSave => {
                let keep_going = self.succeed(page_id, slot);
                if !keep_going && std::mem::take(&mut slot.manual) && saved && !quiet {
                    notice = Some(
                        Notification::new(NotificationKind::Success, "Page saved").for_page(page_id),
                    );
                }
                keep_going
            }
            Attempt::Failed(err) => {
                if let Some(final_notice) = self.fail(page_id, slot, &err) {
                    slot.manual = false;
                    slot.coalesced = false;
                    notice = Some(final_notice).filter(|_| !quiet);
                    false
                } else if std::mem::take(&mut slot.coalesced) {
                    // A manual request that waited on this attempt goes out
                    // now instead of after the backoff.
                    debug!(page_id = %page_id, "manual save pending; retrying without backoff");
                    self.disarm(slot);
                    slot.phase = SavePhase::Saving;
                    slot.in_flight = true;
                    slot.next_retry_at = None;
                    true
                } else {
                    false
                }
            }
            Attempt::Closed => false,
        };

        let next = if keep_going {
            Some(guard)
        } else {
            slot.in_flight = false;
            drop(guard);
            None
        };
        drop(slots);

        if let Some(notification) = notice {
            self.inner.notifier.notify(notification);
        }
        next
    }

    // Edits recorded before the dirty check are caught up by the caller;
    // later ones find the lane free and arm their own timer.
    fn succeed(&self, page_id: &PageId, slot: &mut PageSlot) -> bool {
        slot.attempt = 0;
        slot.next_retry_at = None;
        slot.coalesced = false;
        self.disarm(slot);
        if !self.is_shut_down() && self.inner.store.is_dirty(page_id) {
            slot.phase = SavePhase::Saving;
            slot.in_flight = true;
            true
        } else {
            slot.phase = SavePhase::Clean;
            false
        }
    }

    // Returns the notification to surface when the failure is final.
    fn fail(
        &self,
        page_id: &PageId,
        slot: &mut PageSlot,
        err: &PersistenceError,
    ) -> Option<Notification> {
        let title = self.inner.store.title(page_id).unwrap_or_else(|| page_id.to_string());
        let message = match err.kind {
            FailureKind::Transient => {
                slot.attempt += 1;
                if self.inner.retry.should_retry(slot.attempt) && !self.is_shut_down() {
                    let delay = self.inner.retry.backoff_delay(slot.attempt - 1);
                    slot.phase = SavePhase::PendingRetry;
                    slot.next_retry_at = Some(Instant::now() + delay);
                    warn!(
                        page_id = %page_id,
                        attempt = slot.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "save failed; retrying"
                    );
                    self.arm(page_id, slot, delay);
                    return None;
                }
                format!("Could not save \"{title}\" after {} attempts: {}", slot.attempt, err.message)
            }
            FailureKind::Conflict => {
                format!("\"{title}\" was changed elsewhere; reload it before saving again")
            }
            FailureKind::Permanent => format!("Could not save \"{title}\": {}", err.message),
        };

        warn!(page_id = %page_id, attempt = slot.attempt, error = %err, "save failed permanently");
        slot.phase = SavePhase::FailedPermanent;
        slot.next_retry_at = None;
        self.disarm(slot);
        Some(Notification::error(message).for_page(page_id))
    }
}
