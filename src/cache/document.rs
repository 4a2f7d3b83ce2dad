//! LRU document cache with adjacent preloading.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::entry::CacheEntry;

/// Default number of documents kept (previous, current, next).
pub const DEFAULT_CACHE_SIZE: usize = 3;

/// Errors from the document cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache miss and no URL to load from.
    #[error("Document {id} not in cache and no download URL provided")]
    MissingUrl {
        /// Document id.
        id: String,
    },

    /// The loader failed.
    #[error("Failed to load document {id}: {message}")]
    Load {
        /// Document id.
        id: String,
        /// What went wrong.
        message: String,
    },

    /// The document is not a type the loader understands.
    #[error("Unsupported document format for {id}: .{extension}")]
    Unsupported {
        /// Document id.
        id: String,
        /// Offending extension.
        extension: String,
    },

    /// I/O while loading.
    #[error("I/O error loading {id}: {source}")]
    Io {
        /// Document id.
        id: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Loads a document from its URL.
pub trait DocumentLoader {
    /// The loaded document type.
    type Document;

    /// Load document `id` from `url`.
    ///
    /// # Errors
    ///
    /// Any failure to fetch or parse the document.
    fn load(&self, id: &str, url: &str) -> CacheResult<Self::Document>;

    /// Release resources held by an evicted document.
    fn release(&self, _id: &str, _document: &Self::Document) {}
}

/// Loads raw bytes from local paths (`file://` prefix optional).
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    allowed_extensions: Option<Vec<String>>,
}

impl FsLoader {
    /// Load any file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only load files with one of `extensions` (lowercase, no dot).
    #[must_use]
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = Some(extensions);
        self
    }
}

impl DocumentLoader for FsLoader {
    type Document = Vec<u8>;

    fn load(&self, id: &str, url: &str) -> CacheResult<Vec<u8>> {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        if let Some(allowed) = &self.allowed_extensions {
            let extension = crate::scanner::path_utils::file_extension(url);
            if !allowed.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
                return Err(CacheError::Unsupported {
                    id: id.to_string(),
                    extension,
                });
            }
        }
        std::fs::read(&path).map_err(|source| CacheError::Io {
            id: id.to_string(),
            source,
        })
    }
}

/// Cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries held (metadata-only included).
    pub size: usize,
    /// Entry limit.
    pub max_size: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that had to load.
    pub misses: u64,
    /// `hits / (hits + misses)` as a percentage string, e.g. `"66.7%"`.
    pub hit_rate: String,
    /// Cached document ids, sorted.
    pub documents: Vec<String>,
}

/// Sliding-window LRU cache of loaded documents.
pub struct DocumentCache<L: DocumentLoader> {
    loader: L,
    entries: HashMap<String, CacheEntry<L::Document>>,
    max_size: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl<L: DocumentLoader> std::fmt::Debug for DocumentCache<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("entries", &self.entries.len())
            .field("max_size", &self.max_size)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish_non_exhaustive()
    }
}

impl<L: DocumentLoader> DocumentCache<L> {
    /// Create a cache holding [`DEFAULT_CACHE_SIZE`] documents.
    #[must_use]
    pub fn new(loader: L) -> Self {
        Self::with_max_size(loader, DEFAULT_CACHE_SIZE)
    }

    /// Create a cache holding at most `max_size` entries.
    #[must_use]
    pub fn with_max_size(loader: L, max_size: usize) -> Self {
        Self {
            loader,
            entries: HashMap::new(),
            max_size: max_size.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Whether `id` is cached with its document loaded.
    #[must_use]
    pub fn has_document(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(CacheEntry::is_loaded)
    }

    /// Metadata stored for `id`.
    #[must_use]
    pub fn get_metadata(&self, id: &str) -> Option<&serde_json::Value> {
        self.entries.get(id).and_then(|e| e.metadata.as_ref())
    }

    /// Store metadata for `id`, creating a metadata-only entry if needed.
    pub fn set_metadata(&mut self, id: &str, metadata: serde_json::Value) {
        let now = self.tick();
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.metadata = Some(metadata);
                entry.timestamp = now;
            }
            None => {
                self.entries
                    .insert(id.to_string(), CacheEntry::metadata_only(metadata, now));
            }
        }
    }

    /// Get a document, loading it from `url` on a miss.
    ///
    /// # Errors
    ///
    /// [`CacheError::MissingUrl`] on a miss without `url`, or whatever the
    /// loader returns.
    pub fn get_document(&mut self, id: &str, url: Option<&str>) -> CacheResult<Arc<L::Document>> {
        let now = self.tick();
        let mut metadata = None;
        if let Some(entry) = self.entries.get_mut(id) {
            if let Some(document) = &entry.document {
                self.hits += 1;
                entry.timestamp = now;
                return Ok(Arc::clone(document));
            }
            log::debug!("Invalid cache entry for {}, evicting", id);
            metadata = entry.metadata.take();
            self.evict_document(id);
        }

        self.misses += 1;
        let Some(url) = url else {
            if let Some(metadata) = metadata {
                self.entries
                    .insert(id.to_string(), CacheEntry::metadata_only(metadata, now));
            }
            return Err(CacheError::MissingUrl { id: id.to_string() });
        };
        self.load_and_cache(id, url, metadata)
    }

    fn load_and_cache(
        &mut self,
        id: &str,
        url: &str,
        metadata: Option<serde_json::Value>,
    ) -> CacheResult<Arc<L::Document>> {
        let document = match self.loader.load(id, url) {
            Ok(document) => Arc::new(document),
            Err(e) => {
                log::error!("Failed to load document {}: {}", id, e);
                return Err(e);
            }
        };

        let metadata = metadata.or_else(|| self.entries.remove(id).and_then(|e| e.metadata));
        let now = self.tick();
        self.entries.insert(
            id.to_string(),
            CacheEntry {
                document: Some(Arc::clone(&document)),
                download_url: Some(url.to_string()),
                timestamp: now,
                metadata,
            },
        );
        self.enforce_cache_limit();
        Ok(document)
    }

    /// Load the neighbours of the current document if they are not cached.
    ///
    /// Failures are logged and otherwise ignored. Returns how many loaded.
    pub fn preload_adjacent<F>(&mut self, previous: Option<&str>, next: Option<&str>, url_for: F) -> usize
    where
        F: Fn(&str) -> CacheResult<String>,
    {
        let mut loaded = 0;
        for (label, id) in [("previous", previous), ("next", next)] {
            let Some(id) = id else {
                continue;
            };
            if self.entries.contains_key(id) {
                continue;
            }
            let result = url_for(id).and_then(|url| self.load_and_cache(id, &url, None));
            match result {
                Ok(_) => loaded += 1,
                Err(CacheError::Unsupported { extension, .. }) => {
                    log::info!("Preload of {} skipped (unsupported format .{})", id, extension);
                }
                Err(e) => log::warn!("Failed to preload {} document {}: {}", label, id, e),
            }
        }
        loaded
    }

    /// Drop `id` and release its document. Returns false if it was not cached.
    pub fn evict_document(&mut self, id: &str) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        if let Some(document) = &entry.document {
            self.loader.release(id, document);
        }
        log::trace!("Evicted document {}", id);
        true
    }

    /// Evict least recently used entries until the limit holds.
    pub fn enforce_cache_limit(&mut self) {
        while self.entries.len() > self.max_size {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.evict_document(&id);
                }
                None => break,
            }
        }
    }

    /// Evict everything and reset the counters.
    pub fn clear_cache(&mut self) {
        let ids: Vec<String> = self.entries.keys().cloned().collect();
        for id in ids {
            self.evict_document(&id);
        }
        self.hits = 0;
        self.misses = 0;
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            format!("{:.1}%", self.hits as f64 / total as f64 * 100.0)
        } else {
            "0%".to_string()
        };
        let mut documents: Vec<String> = self.entries.keys().cloned().collect();
        documents.sort();
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            documents,
        }
    }
}
