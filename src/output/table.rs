//! Terminal table output.
//!
//! Status labels are coloured with `yansi` (green ready, yellow copy,
//! blue duplicate, red read error) unless colour is disabled. Sizes use
//! binary units from `bytesize`.

use std::io::{self, Write};

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use yansi::Paint;

use crate::queue::{QueueProgress, QueueRow, RowStatus};
use crate::verify::VerificationSummary;

const NAME_WIDTH: usize = 40;
const FOLDER_WIDTH: usize = 30;

/// Table formatter.
pub struct TableOutput<'a> {
    rows: &'a [&'a QueueRow],
    progress: &'a QueueProgress,
    verification: Option<&'a VerificationSummary>,
    color: bool,
}

impl<'a> TableOutput<'a> {
    /// Create a formatter over `rows`.
    #[must_use]
    pub fn new(rows: &'a [&'a QueueRow], progress: &'a QueueProgress) -> Self {
        Self {
            rows,
            progress,
            verification: None,
            color: true,
        }
    }

    /// Include a verification summary line.
    #[must_use]
    pub fn with_verification(mut self, verification: Option<&'a VerificationSummary>) -> Self {
        self.verification = verification;
        self
    }

    /// Enable or disable colour.
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn status_cell(&self, status: RowStatus) -> String {
        let label = format!("{:<10}", status.as_str());
        if !self.color {
            return label;
        }
        match status {
            RowStatus::Ready => label.green().to_string(),
            RowStatus::Copy => label.yellow().to_string(),
            RowStatus::Duplicate => label.blue().to_string(),
            RowStatus::ReadError => label.red().bold().to_string(),
            RowStatus::Skip | RowStatus::NotApplicable => label.dim().to_string(),
        }
    }

    /// Write the table and a summary.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let header = format!(
            "{:<10}  {:<NAME_WIDTH$}  {:<FOLDER_WIDTH$}  {:>10}  {:<16}  {}",
            "STATUS", "NAME", "FOLDER", "SIZE", "MODIFIED", "REF"
        );
        if self.color {
            writeln!(writer, "{}", header.bold())?;
        } else {
            writeln!(writer, "{header}")?;
        }

        for row in self.rows {
            let modified = DateTime::<Utc>::from_timestamp_millis(row.source_last_modified)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let reference = row
                .reference_file_id
                .map(|id| id.to_string())
                .unwrap_or_default();
            writeln!(
                writer,
                "{}  {:<NAME_WIDTH$}  {:<FOLDER_WIDTH$}  {:>10}  {:<16}  {}",
                self.status_cell(row.status),
                clip(&row.name, NAME_WIDTH),
                clip(&row.folder_path, FOLDER_WIDTH),
                ByteSize::b(row.size).to_string(),
                modified,
                reference
            )?;
            if let Some(error) = &row.error_message {
                writeln!(writer, "            {error}")?;
            }
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "{} ready, {} copies, {} duplicates, {} n/a, {} read errors{}",
            self.progress.files_ready,
            self.progress.files_copies,
            self.progress.files_duplicates,
            self.progress.files_unsupported,
            self.progress.files_read_error,
            if self.progress.cancelled { " (cancelled)" } else { "" }
        )?;
        if let Some(v) = self.verification {
            writeln!(
                writer,
                "Verified {} rows: {} duplicates removed, {} copies confirmed, {} promoted",
                v.candidates, v.confirmed_duplicates, v.confirmed_copies, v.promoted
            )?;
        }
        Ok(())
    }
}

/// Clip to `width` characters, marking the cut with `~`.
fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(width - 1).collect();
    clipped.push('~');
    clipped
}
