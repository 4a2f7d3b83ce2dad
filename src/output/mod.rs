//! Output formatters for the queue.
//!
//! - [`table`]: coloured terminal table, the default
//! - [`json`]: rows plus a summary for scripting
//! - [`csv`]: one line per row for spreadsheets
//!
//! # Example
//!
//! ```
//! use queuedupe::error::ExitCode;
//! use queuedupe::output::json::JsonOutput;
//! use queuedupe::queue::{QueueConfig, UploadQueue};
//! use queuedupe::scanner::MemoryFile;
//!
//! let mut queue = UploadQueue::new(QueueConfig::default().with_tenant_id("firm"));
//! queue
//!     .add_files_to_queue(vec![MemoryFile::new("a.pdf", vec![1, 2, 3], 0).into_source()])
//!     .unwrap();
//!
//! let rows: Vec<_> = queue.rows().iter().collect();
//! let output = JsonOutput::new(&rows, queue.progress(), None, ExitCode::Success);
//! assert!(output.to_json().unwrap().contains("\"a.pdf\""));
//! ```

pub mod csv;
pub mod json;
pub mod table;

pub use csv::CsvOutput;
pub use json::JsonOutput;
pub use table::TableOutput;

use chrono::{DateTime, Utc};

/// Render milliseconds since the epoch as RFC 3339.
pub(crate) fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
