//! Queue row model.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scanner::{path_utils, FileSource, SourceRef};

/// Opaque row identifier, unique within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row-{}", self.0)
    }
}

/// Row status.
///
/// Governs selectability and upload eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowStatus {
    /// Primary row that will be uploaded.
    #[serde(rename = "ready")]
    Ready,
    /// Same content as the primary, different metadata.
    #[serde(rename = "copy")]
    Copy,
    /// Same content and metadata as the primary.
    #[serde(rename = "duplicate")]
    Duplicate,
    /// Primary row the user chose not to upload.
    #[serde(rename = "skip")]
    Skip,
    /// Unsupported file type.
    #[serde(rename = "n/a")]
    NotApplicable,
    /// The file could not be read.
    #[serde(rename = "read error")]
    ReadError,
}

impl RowStatus {
    /// Position in the queue sort (lower first).
    #[must_use]
    pub fn sort_rank(self) -> u8 {
        match self {
            RowStatus::Ready => 0,
            RowStatus::Copy => 1,
            RowStatus::Duplicate => 2,
            RowStatus::NotApplicable => 3,
            RowStatus::Skip => 4,
            RowStatus::ReadError => 5,
        }
    }

    /// Whether the status marks the primary of a group.
    #[must_use]
    pub fn is_primary(self) -> bool {
        matches!(self, RowStatus::Ready | RowStatus::Skip)
    }

    /// Whether the status marks a non-primary member of a group.
    #[must_use]
    pub fn is_secondary(self) -> bool {
        matches!(self, RowStatus::Copy | RowStatus::Duplicate)
    }

    /// Label as shown to users.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Ready => "ready",
            RowStatus::Copy => "copy",
            RowStatus::Duplicate => "duplicate",
            RowStatus::Skip => "skip",
            RowStatus::NotApplicable => "n/a",
            RowStatus::ReadError => "read error",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source file considered for upload.
#[derive(Debug, Clone)]
pub struct QueueRow {
    /// Unique identifier.
    pub id: RowId,
    /// Handle to the underlying bytes.
    pub source: SourceRef,
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time (ms since epoch).
    pub source_last_modified: i64,
    /// Folder the file was dropped from, rooted at `/`.
    pub folder_path: String,
    /// Current status.
    pub status: RowStatus,
    /// Upload eligibility.
    pub can_upload: bool,
    /// Digest over tenant, mtime, name, and extension.
    pub metadata_hash: Option<String>,
    /// Digest over the full content.
    pub content_hash: Option<String>,
    /// Set on the reference row of a tentative group (its own id).
    pub tentative_group_id: Option<RowId>,
    /// Row this one was matched against.
    pub reference_file_id: Option<RowId>,
    /// Last time this row's group was touched (ms, strictly increasing per queue).
    pub group_timestamp: i64,
    /// Ingestion call that produced the row.
    pub batch_order: u64,
    /// Error text for `read error` rows.
    pub error_message: Option<String>,
}

impl QueueRow {
    /// Materialize a row from a source.
    ///
    /// Unsupported types start as `n/a`; everything else starts `ready` and
    /// is reclassified by the dedup layers.
    #[must_use]
    pub fn from_source(
        id: RowId,
        source: SourceRef,
        batch_order: u64,
        group_timestamp: i64,
        unsupported: bool,
    ) -> Self {
        let name = path_utils::normalize_path_str(source.name());
        let folder_path = path_utils::folder_path(source.relative_path());
        let (status, can_upload) = if unsupported {
            (RowStatus::NotApplicable, false)
        } else {
            (RowStatus::Ready, true)
        };

        Self {
            id,
            size: source.size(),
            source_last_modified: source.last_modified(),
            source,
            name,
            folder_path,
            status,
            can_upload,
            metadata_hash: None,
            content_hash: None,
            tentative_group_id: None,
            reference_file_id: None,
            group_timestamp,
            batch_order,
            error_message: None,
        }
    }

    /// Convenience: status is `duplicate`.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.status == RowStatus::Duplicate
    }

    /// Convenience: status is `copy`.
    #[must_use]
    pub fn is_copy(&self) -> bool {
        self.status == RowStatus::Copy
    }

    /// Provisionally classified without any confirming digest.
    ///
    /// Rows caught by the metadata layer carry a metadata digest and are
    /// trusted; only rows with neither digest need verification.
    #[must_use]
    pub fn is_tentative(&self) -> bool {
        self.status.is_secondary() && self.content_hash.is_none() && self.metadata_hash.is_none()
    }

    /// Extension used in the metadata digest.
    #[must_use]
    pub fn extension(&self) -> String {
        path_utils::file_extension(&self.name)
    }

    /// Set the status and the upload flag it implies.
    ///
    /// `skip` keeps whatever upload flag the row had.
    pub fn set_status(&mut self, status: RowStatus) {
        self.status = status;
        match status {
            RowStatus::Ready => self.can_upload = true,
            RowStatus::Skip => {}
            RowStatus::Copy
            | RowStatus::Duplicate
            | RowStatus::NotApplicable
            | RowStatus::ReadError => self.can_upload = false,
        }
        if status != RowStatus::ReadError {
            self.error_message = None;
        }
    }

    /// Mark as a secondary of `reference`.
    pub fn mark_secondary(&mut self, status: RowStatus, reference: RowId) {
        debug_assert!(status.is_secondary());
        self.set_status(status);
        self.reference_file_id = Some(reference);
    }

    /// Mark as unreadable, keeping the message.
    pub fn mark_read_error(&mut self, message: impl Into<String>) {
        self.set_status(RowStatus::ReadError);
        self.error_message = Some(message.into());
    }

    /// Promote to a standalone primary, dropping tentative links.
    pub fn promote_to_ready(&mut self) {
        self.set_status(RowStatus::Ready);
        self.tentative_group_id = None;
        self.reference_file_id = None;
    }

    /// Shared handle to the source for off-thread hashing.
    #[must_use]
    pub fn source(&self) -> SourceRef {
        Arc::clone(&self.source)
    }

    /// Borrow the source.
    #[must_use]
    pub fn source_ref(&self) -> &dyn FileSource {
        self.source.as_ref()
    }
}
