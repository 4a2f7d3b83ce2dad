//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-bucket indexing of queue rows
//! - Metadata-digest matching (no file reads)
//! - Content-digest matching for the rows that survive
//! - Digest-free tentative matching for the prefilter mode

pub mod finder;
pub mod groups;

pub use finder::{deduplicate, DedupContext, DedupStats, IngestMode};
pub use groups::{group_by_size, is_dedup_candidate, GroupingStats, SizeBucket};
