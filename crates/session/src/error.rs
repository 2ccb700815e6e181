// Error taxonomy for the session core.
//
// `PersistenceError` carries the adapter's classification; only the autosave
// scheduler and the save-all coordinator act on it (retry vs. surface).

use std::fmt;

use canvasdeck_common::types::PageId;
use thiserror::Error;

/// How a failed persistence call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, 5xx, 408/429 or network error. Retried with backoff.
    Transient,
    /// Other 4xx or schema validation. Surfaced, never auto-retried.
    Permanent,
    /// `412 Precondition Failed`: the remote copy changed under us.
    Conflict,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} persistence failure: {message}")]
pub struct PersistenceError {
    pub kind: FailureKind,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
}

impl PersistenceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Transient, message: message.into(), status: None }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Permanent, message: message.into(), status: None }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Conflict, message: message.into(), status: None }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            408 | 429 | 500..=599 => FailureKind::Transient,
            412 => FailureKind::Conflict,
            _ => FailureKind::Permanent,
        };
        Self { kind, message: message.into(), status: Some(status) }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Fetching a page snapshot failed; the page was not added.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to load page {page_id}: {source}")]
pub struct LoadError {
    pub page_id: PageId,
    #[source]
    pub source: PersistenceError,
}

/// Opening another tab would exceed the session's limit.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cannot open more than {max_open} pages at once")]
pub struct CapacityError {
    pub max_open: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("page {0} is not open")]
    NotOpen(PageId),

    #[error("page {0} is the last open page and cannot be closed")]
    LastPage(PageId),
}
