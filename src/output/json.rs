//! JSON output for the queue.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "rows": [
//!     {
//!       "id": "row-1",
//!       "name": "brief.pdf",
//!       "folder": "matters/smith",
//!       "size": 1024,
//!       "status": "ready",
//!       "can_upload": true,
//!       "content_hash": "9f2c...",
//!       "reference": null,
//!       "modified": "2024-01-01T00:00:00+00:00"
//!     }
//!   ],
//!   "summary": {
//!     "total_rows": 1,
//!     "ready": 1,
//!     "copies": 0,
//!     "duplicates": 0,
//!     "unsupported": 0,
//!     "read_errors": 0,
//!     "cancelled": false,
//!     "exit_code": 0,
//!     "exit_code_name": "QD000"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use super::format_millis;
use crate::error::ExitCode;
use crate::queue::{QueueProgress, QueueRow};
use crate::verify::VerificationSummary;

/// One queue row in JSON form.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRow {
    /// Row id
    pub id: String,
    /// File name
    pub name: String,
    /// Folder path, empty for top-level files
    pub folder: String,
    /// Size in bytes
    pub size: u64,
    /// Status label
    pub status: String,
    /// Whether the row will be uploaded
    pub can_upload: bool,
    /// Content digest, if computed
    pub content_hash: Option<String>,
    /// Metadata digest, if computed
    pub metadata_hash: Option<String>,
    /// Row this one duplicates or copies
    pub reference: Option<String>,
    /// Source modification time (RFC 3339)
    pub modified: String,
    /// Ingestion call that added the row
    pub batch_order: u64,
    /// Read failure text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JsonRow {
    /// Convert a queue row.
    #[must_use]
    pub fn from_row(row: &QueueRow) -> Self {
        Self {
            id: row.id.to_string(),
            name: row.name.clone(),
            folder: row.folder_path.clone(),
            size: row.size,
            status: row.status.as_str().to_string(),
            can_upload: row.can_upload,
            content_hash: row.content_hash.clone(),
            metadata_hash: row.metadata_hash.clone(),
            reference: row.reference_file_id.map(|id| id.to_string()),
            modified: format_millis(row.source_last_modified),
            batch_order: row.batch_order,
            error: row.error_message.clone(),
        }
    }
}

/// Counters in JSON form.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Rows printed
    pub total_rows: usize,
    /// Rows with status `ready`
    pub ready: usize,
    /// Rows with status `copy`
    pub copies: usize,
    /// Rows with status `duplicate`
    pub duplicates: usize,
    /// Rows with status `n/a`
    pub unsupported: usize,
    /// Rows with status `read error`
    pub read_errors: usize,
    /// Whether ingestion was cancelled
    pub cancelled: bool,
    /// Verification results, if a pass ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSummary>,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "QD000")
    pub exit_code_name: String,
}

/// Complete JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Rows in display order
    pub rows: Vec<JsonRow>,
    /// Counters
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the output for `rows`.
    #[must_use]
    pub fn new(
        rows: &[&QueueRow],
        progress: &QueueProgress,
        verification: Option<&VerificationSummary>,
        exit_code: ExitCode,
    ) -> Self {
        Self {
            rows: rows.iter().map(|r| JsonRow::from_row(r)).collect(),
            summary: JsonSummary {
                total_rows: rows.len(),
                ready: progress.files_ready,
                copies: progress.files_copies,
                duplicates: progress.files_duplicates,
                unsupported: progress.files_unsupported,
                read_errors: progress.files_read_error,
                cancelled: progress.cancelled,
                verification: verification.cloned(),
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Serialize to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
