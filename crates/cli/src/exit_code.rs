// Consistent exit codes for the canvasdeck CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error (bad snapshot file, bad config)
//   10 = remote API unreachable or failing transiently
//   11 = request rejected (auth, validation, missing page)
//   12 = conflict: the page changed remotely

use std::process;

use canvasdeck_common::types::SnapshotError;
use canvasdeck_session::{FailureKind, PersistenceError};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Unreachable = 10,
    Rejected = 11,
    Conflict = 12,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(persistence) = cause.downcast_ref::<PersistenceError>() {
                return Self::from_failure(persistence.kind);
            }
            if cause.downcast_ref::<serde_json::Error>().is_some()
                || cause.downcast_ref::<SnapshotError>().is_some()
            {
                return Self::Usage;
            }
        }
        Self::Error
    }

    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Transient => Self::Unreachable,
            FailureKind::Permanent => Self::Rejected,
            FailureKind::Conflict => Self::Conflict,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
