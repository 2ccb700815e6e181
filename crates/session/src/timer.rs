// Cancellable one-shot timers for debounce and retry backoff.
//
// The scheduler never sleeps itself; it hands a callback to a `Timer` and
// keeps the returned token so the callback can be cancelled on close or
// teardown. `TokioTimer` is backed by `tokio::time`, so tests drive it with
// a paused clock (`tokio::time::pause` / `advance`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::lock;

/// Handle to a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Work to run once a timer elapses.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

pub trait Timer: Send + Sync {
    /// Run `task` once after `delay`, unless cancelled first.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerToken;

    /// Cancel a scheduled task. Unknown or already-fired tokens are ignored.
    fn cancel(&self, token: TimerToken);
}

/// `Timer` backed by spawned tokio tasks. Must be used inside a runtime.
#[derive(Default)]
pub struct TokioTimer {
    next_token: AtomicU64,
    // `None` until the spawned task's abort handle is recorded.
    armed: Arc<Mutex<HashMap<TimerToken, Option<AbortHandle>>>>,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn armed_count(&self) -> usize {
        lock(&self.armed).len()
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerToken {
        let token = TimerToken(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.armed).insert(token, None);

        let armed = Arc::clone(&self.armed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_armed = lock(&armed).remove(&token).is_some();
            if still_armed {
                task();
            }
        });

        let mut armed = lock(&self.armed);
        match armed.get_mut(&token) {
            Some(slot) => *slot = Some(handle.abort_handle()),
            // Cancelled before the handle was recorded.
            None => handle.abort(),
        }
        token
    }

    fn cancel(&self, token: TimerToken) {
        if let Some(Some(handle)) = lock(&self.armed).remove(&token) {
            handle.abort();
        }
    }
}
