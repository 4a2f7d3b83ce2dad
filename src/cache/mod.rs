//! Sliding-window document cache.
//!
//! Keeps the few documents around the one being viewed (previous, current,
//! next) loaded so navigation is instant, and holds per-document metadata
//! that was fetched ahead of the document itself.
//!
//! # Architecture
//!
//! * [`document`]: the cache, its LRU policy, and the [`DocumentLoader`] seam.
//! * [`entry`]: what is stored per document id.
//!
//! # Eviction
//!
//! Every access stamps the entry with a logical clock. Inserting past
//! `max_size` evicts the entry with the oldest stamp. Metadata-only entries
//! count toward the limit.

pub mod document;
pub mod entry;

pub use document::{
    CacheError, CacheResult, CacheStats, DocumentCache, DocumentLoader, FsLoader,
    DEFAULT_CACHE_SIZE,
};
pub use entry::CacheEntry;
