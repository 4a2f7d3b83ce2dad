//! CSV output for the queue, one line per row.
//!
//! # Columns
//!
//! - `id`: row id (`row-N`)
//! - `name`: file name
//! - `folder`: folder path, empty for top-level files
//! - `size`: size in bytes
//! - `status`: `ready`, `copy`, `duplicate`, `skip`, `n/a`, or `read error`
//! - `can_upload`: `true` or `false`
//! - `hash`: content digest, else metadata digest, else empty
//! - `reference`: id of the row this one copies or duplicates
//! - `modified`: source modification time (RFC 3339)
//! - `error`: read failure text

use std::io;

use serde::Serialize;
use thiserror::Error;

use super::format_millis;
use crate::queue::QueueRow;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: String,
    name: &'a str,
    folder: &'a str,
    size: u64,
    status: &'static str,
    can_upload: bool,
    hash: &'a str,
    reference: String,
    modified: String,
    error: &'a str,
}

impl<'a> CsvRow<'a> {
    fn from_row(row: &'a QueueRow) -> Self {
        Self {
            id: row.id.to_string(),
            name: &row.name,
            folder: &row.folder_path,
            size: row.size,
            status: row.status.as_str(),
            can_upload: row.can_upload,
            hash: row
                .content_hash
                .as_deref()
                .or(row.metadata_hash.as_deref())
                .unwrap_or(""),
            reference: row
                .reference_file_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            modified: format_millis(row.source_last_modified),
            error: row.error_message.as_deref().unwrap_or(""),
        }
    }
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    rows: &'a [&'a QueueRow],
}

impl<'a> CsvOutput<'a> {
    /// Create a formatter over `rows`.
    #[must_use]
    pub fn new(rows: &'a [&'a QueueRow]) -> Self {
        Self { rows }
    }

    /// Write the CSV, header included.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in self.rows {
            csv_writer.serialize(CsvRow::from_row(row))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Render the CSV as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
