// Host capabilities consumed by the session: confirmation prompts and
// user-facing notifications. Both are injected; the core never renders UI.

use std::future::Future;
use std::pin::Pin;

use canvasdeck_common::types::{PageId, SaveSummary};
use serde::Serialize;

/// Ask the user a yes/no question (e.g. "discard unsaved changes?").
pub trait Confirm: Send + Sync {
    fn ask_confirmation<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<SaveSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<PageId>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), counts: None, page_id: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    pub fn for_page(mut self, page_id: &PageId) -> Self {
        self.page_id = Some(page_id.clone());
        self
    }

    /// Summary notification for a save-all pass.
    pub fn save_summary(summary: SaveSummary) -> Self {
        let (kind, message) = match summary {
            SaveSummary { succeeded: 0, failed: 0 } => {
                (NotificationKind::Info, "No unsaved changes".to_string())
            }
            SaveSummary { failed: 0, succeeded } => {
                (NotificationKind::Success, format!("Saved {succeeded} page(s)"))
            }
            SaveSummary { succeeded: 0, failed } => {
                (NotificationKind::Error, format!("Failed to save {failed} page(s)"))
            }
            SaveSummary { succeeded, failed } => (
                NotificationKind::Warning,
                format!("Saved {succeeded} page(s), {failed} failed"),
            ),
        };
        Self { kind, message, counts: Some(summary), page_id: None }
    }
}

/// Sink for user-visible outcomes. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that only logs; used by headless callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error | NotificationKind::Warning => {
                tracing::warn!(page_id = ?notification.page_id, "{}", notification.message)
            }
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(page_id = ?notification.page_id, "{}", notification.message)
            }
        }
    }
}

/// Confirm that always gives the same answer; used by non-interactive callers.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirm(pub bool);

impl Confirm for FixedConfirm {
    fn ask_confirmation<'a>(
        &'a self,
        _message: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let answer = self.0;
        Box::pin(async move { answer })
    }
}
