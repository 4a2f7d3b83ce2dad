//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the queuedupe binary.
///
/// - 0: Success (at least one row is ready to upload)
/// - 1: General error (unexpected failure, missing tenant)
/// - 2: Nothing to upload (every row is a copy, duplicate, n/a, or skipped)
/// - 3: Partial success (some rows could not be read)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the queue holds uploadable rows.
    Success = 0,
    /// General error: an unexpected error occurred.
    GeneralError = 1,
    /// Nothing to upload.
    NothingToUpload = 2,
    /// Partial success: some rows are read errors.
    PartialSuccess = 3,
    /// Interrupted: cancelled by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "QD000",
            Self::GeneralError => "QD001",
            Self::NothingToUpload => "QD002",
            Self::PartialSuccess => "QD003",
            Self::Interrupted => "QD130",
        }
    }

    /// Exit code for a finished queue.
    #[must_use]
    pub fn from_progress(progress: &crate::queue::QueueProgress) -> Self {
        if progress.cancelled {
            Self::Interrupted
        } else if progress.files_read_error > 0 {
            Self::PartialSuccess
        } else if progress.files_ready == 0 {
            Self::NothingToUpload
        } else {
            Self::Success
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "QD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
