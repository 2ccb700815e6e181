// canvasdeck-session: multi-page editor session manager and its autosave core.
//
// Leaves first: `persistence` talks to the remote canvas API, `store` owns
// every open page document, `autosave` debounces and retries writes,
// `tabs` drives open/switch/close, `save_all` flushes everything on demand,
// and `session` wires them together behind one explicitly constructed handle.

pub mod autosave;
pub mod bridge;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod persistence;
pub mod save_all;
pub mod session;
pub mod store;
pub mod tabs;
pub mod timer;

pub use autosave::{AutoSaveScheduler, ManualSave, PersistOutcome, SavePhase, SaveTask};
pub use bridge::{EditorBridge, EditorEvent, HeadlessEditor, SubscriptionId};
pub use capabilities::{Confirm, FixedConfirm, LogNotifier, Notification, NotificationKind, Notifier};
pub use config::SessionConfig;
pub use error::{CapacityError, FailureKind, LoadError, PersistenceError, SessionError};
pub use persistence::{
    HttpPersistenceAdapter, LoadedPage, MemoryPersistence, PersistenceAdapter, RetryPolicy, StoreAck,
};
pub use save_all::SaveAllCoordinator;
pub use session::{EditorSession, SessionCapabilities};
pub use store::{CloseOutcome, PageDocument, PageDocumentStore, SessionTabs};
pub use tabs::{TabController, TabEvent};
pub use timer::{Timer, TimerToken, TokioTimer};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a panicking holder poisoned it.
///
/// Critical sections in this crate never leave state half-updated across a
/// panic point, so the inner value is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
