//! Cache entry definitions.

use std::sync::Arc;

use serde::Serialize;

/// A single cached document.
#[derive(Debug, Serialize)]
pub struct CacheEntry<D> {
    /// The loaded document, absent for metadata-only entries.
    #[serde(skip)]
    pub document: Option<Arc<D>>,
    /// Where the document was loaded from.
    pub download_url: Option<String>,
    /// Logical LRU stamp; larger is more recent.
    pub timestamp: u64,
    /// Metadata fetched alongside the document.
    pub metadata: Option<serde_json::Value>,
}

impl<D> CacheEntry<D> {
    /// Entry holding only metadata.
    #[must_use]
    pub fn metadata_only(metadata: serde_json::Value, timestamp: u64) -> Self {
        Self {
            document: None,
            download_url: None,
            timestamp,
            metadata: Some(metadata),
        }
    }

    /// Whether the document itself is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }
}
