//! Layered duplicate classification for queue batches.
//!
//! # Overview
//!
//! A batch of new rows is classified against the rows already in the queue
//! by progressively more expensive checks:
//!
//! 1. **Size index** ([`group_by_size`]): a new row alone in its size bucket
//!    is `ready` and nothing is hashed.
//! 2. **Metadata layer**: in colliding buckets every row gets a digest over
//!    tenant, mtime, name, and extension. A new row whose metadata digest was
//!    already seen is a `duplicate` and is never content-hashed.
//! 3. **Content layer**: the surviving new rows, plus existing primaries that
//!    were never hashed, are content-hashed on the [`HashPool`]. A content
//!    collision with equal metadata is a `duplicate`, with different metadata
//!    a `copy`; no collision makes the row `ready` and a new reference.
//!
//! Existing rows contribute digests but are never re-classified. New rows
//! are compared against existing rows first, then against earlier new rows
//! in batch order.
//!
//! [`IngestMode::Prefilter`] replaces layers 2 and 3 with a digest-free
//! pass that marks same-size rows as tentative secondaries. The verifier
//! confirms or promotes them later.
//!
//! # Example
//!
//! ```
//! use queuedupe::duplicates::{deduplicate, DedupContext, IngestMode};
//! use queuedupe::queue::{QueueRow, RowId, RowStatus};
//! use queuedupe::scanner::{HashPool, Hasher, MemoryFile};
//!
//! let pool = HashPool::new(Hasher::new(), 2);
//! let ctx = DedupContext::new("firm-1", &pool, IngestMode::Layered);
//!
//! let mut rows: Vec<QueueRow> = [("a.pdf", 1), ("a.pdf", 1), ("c.pdf", 9)]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, (name, mtime))| {
//!         let source = MemoryFile::new(*name, b"same".to_vec(), *mtime).into_source();
//!         QueueRow::from_source(RowId(i as u64), source, 1, 0, false)
//!     })
//!     .collect();
//!
//! let stats = deduplicate(&mut rows, 0, &ctx);
//! assert_eq!(stats.metadata_duplicates, 1);
//! assert_eq!(rows[0].status, RowStatus::Ready);
//! assert_eq!(rows[1].status, RowStatus::Duplicate);
//! assert_eq!(rows[2].status, RowStatus::Copy);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::groups::{group_by_size, GroupingStats, SizeBucket};
use crate::queue::{QueueRow, RowStatus};
use crate::scanner::{path_utils, HashPool, Hasher, SourceRef};

/// How colliding size buckets are resolved.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Metadata digest, then content digest.
    #[default]
    Layered,
    /// Digest-free tentative matching, confirmed later by the verifier.
    Prefilter,
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestMode::Layered => write!(f, "layered"),
            IngestMode::Prefilter => write!(f, "prefilter"),
        }
    }
}

/// Inputs shared by every bucket of a pass.
#[derive(Debug, Clone, Copy)]
pub struct DedupContext<'a> {
    /// Tenant the upload belongs to.
    pub tenant_id: &'a str,
    /// Pool used for content hashing.
    pub pool: &'a HashPool,
    /// Bucket resolution strategy.
    pub mode: IngestMode,
}

impl<'a> DedupContext<'a> {
    /// Create a context.
    #[must_use]
    pub fn new(tenant_id: &'a str, pool: &'a HashPool, mode: IngestMode) -> Self {
        Self {
            tenant_id,
            pool,
            mode,
        }
    }
}

/// Statistics from one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Size index statistics.
    pub grouping: GroupingStats,
    /// Metadata digests computed.
    pub metadata_hashed: usize,
    /// New rows settled as duplicates by metadata alone.
    pub metadata_duplicates: usize,
    /// Content digests computed.
    pub content_hashed: usize,
    /// New rows settled as duplicates by content.
    pub content_duplicates: usize,
    /// New rows settled as copies.
    pub copies: usize,
    /// New rows that could not be read.
    pub read_errors: usize,
    /// New rows marked as tentative secondaries.
    pub tentative: usize,
}

/// Classify the new rows of `rows`.
///
/// # Arguments
///
/// * `rows` - Existing queue rows followed by the new batch
/// * `first_new` - Index of the first new row
/// * `ctx` - Tenant, hashing pool, and mode
#[must_use = "statistics describe what the pass did"]
pub fn deduplicate(rows: &mut [QueueRow], first_new: usize, ctx: &DedupContext<'_>) -> DedupStats {
    let (buckets, grouping) = group_by_size(rows, first_new);
    let mut stats = DedupStats {
        grouping,
        ..Default::default()
    };

    let colliding: Vec<&SizeBucket> = buckets.iter().filter(|b| b.is_colliding()).collect();
    if colliding.is_empty() {
        return stats;
    }

    match ctx.mode {
        IngestMode::Layered => layered(rows, first_new, &colliding, ctx, &mut stats),
        IngestMode::Prefilter => {
            for bucket in &colliding {
                prefilter_bucket(rows, first_new, bucket, &mut stats);
            }
        }
    }

    log::debug!(
        "Dedup pass: {} metadata duplicates, {} content duplicates, {} copies, {} tentative, {} read errors",
        stats.metadata_duplicates,
        stats.content_duplicates,
        stats.copies,
        stats.tentative,
        stats.read_errors
    );
    stats
}

/// Existing rows of a bucket with primaries first, queue order otherwise.
fn existing_by_preference(rows: &[QueueRow], bucket: &SizeBucket, first_new: usize) -> Vec<usize> {
    let existing = bucket.rows.iter().copied().filter(|&idx| idx < first_new);
    let (mut primaries, secondaries): (Vec<usize>, Vec<usize>) =
        existing.partition(|&idx| rows[idx].status.is_primary());
    primaries.extend(secondaries);
    primaries
}

fn new_rows(bucket: &SizeBucket, first_new: usize) -> impl Iterator<Item = usize> + '_ {
    bucket.rows.iter().copied().filter(move |&idx| idx >= first_new)
}

fn metadata_digest(row: &QueueRow, tenant_id: &str) -> String {
    Hasher::metadata_hash(
        tenant_id,
        row.source_last_modified,
        &row.name,
        &row.extension(),
    )
}

fn layered(
    rows: &mut [QueueRow],
    first_new: usize,
    buckets: &[&SizeBucket],
    ctx: &DedupContext<'_>,
    stats: &mut DedupStats,
) {
    // Metadata layer, bucket by bucket.
    let mut survivors: Vec<Vec<usize>> = Vec::with_capacity(buckets.len());
    let mut to_hash: Vec<usize> = Vec::new();

    for bucket in buckets {
        let mut seen: HashMap<String, usize> = HashMap::new();

        for idx in existing_by_preference(rows, bucket, first_new) {
            let digest = match &rows[idx].metadata_hash {
                Some(digest) => digest.clone(),
                None => {
                    let digest = metadata_digest(&rows[idx], ctx.tenant_id);
                    stats.metadata_hashed += 1;
                    // Tentative rows stay digest-free until verified.
                    if !rows[idx].is_tentative() {
                        rows[idx].metadata_hash = Some(digest.clone());
                    }
                    digest
                }
            };
            seen.entry(digest).or_insert(idx);

            let row = &rows[idx];
            if row.status.is_primary() && row.content_hash.is_none() {
                to_hash.push(idx);
            }
        }

        let mut passed = Vec::new();
        for idx in new_rows(bucket, first_new) {
            let digest = metadata_digest(&rows[idx], ctx.tenant_id);
            stats.metadata_hashed += 1;
            rows[idx].metadata_hash = Some(digest.clone());

            if let Some(&reference) = seen.get(&digest) {
                let reference_id = rows[reference].id;
                rows[idx].mark_secondary(RowStatus::Duplicate, reference_id);
                stats.metadata_duplicates += 1;
                log::trace!(
                    "Metadata duplicate: {} matches {}",
                    rows[idx].name,
                    rows[reference].name
                );
            } else {
                seen.insert(digest, idx);
                passed.push(idx);
                to_hash.push(idx);
            }
        }
        survivors.push(passed);
    }

    // Content digests for every bucket in one parallel pass.
    if !to_hash.is_empty() {
        log::debug!("Content hashing {} rows", to_hash.len());
        let sources: Vec<SourceRef> = to_hash.iter().map(|&idx| rows[idx].source()).collect();
        let results = ctx.pool.hash_many(&sources);

        for (&idx, result) in to_hash.iter().zip(results) {
            match result {
                Ok(digest) => {
                    stats.content_hashed += 1;
                    rows[idx].content_hash = Some(digest);
                }
                Err(e) if idx >= first_new => {
                    log::warn!("Read error for {}: {}", rows[idx].name, e);
                    rows[idx].mark_read_error(e.to_string());
                    stats.read_errors += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Could not hash existing row {} ({}); it will not serve as a reference",
                        rows[idx].name,
                        e
                    );
                }
            }
        }
    }

    // Content layer.
    for (bucket, passed) in buckets.iter().zip(survivors) {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for idx in existing_by_preference(rows, bucket, first_new) {
            if let Some(digest) = &rows[idx].content_hash {
                seen.entry(digest.clone()).or_insert(idx);
            }
        }

        for idx in passed {
            if rows[idx].status == RowStatus::ReadError {
                continue;
            }
            let Some(digest) = rows[idx].content_hash.clone() else {
                continue;
            };

            match seen.get(&digest) {
                Some(&reference) => {
                    let same_metadata = rows[reference].metadata_hash.is_some()
                        && rows[reference].metadata_hash == rows[idx].metadata_hash;
                    let status = if same_metadata {
                        stats.content_duplicates += 1;
                        RowStatus::Duplicate
                    } else {
                        stats.copies += 1;
                        RowStatus::Copy
                    };
                    let reference_id = rows[reference].id;
                    rows[idx].mark_secondary(status, reference_id);
                    log::trace!(
                        "Content {}: {} matches {}",
                        status,
                        rows[idx].name,
                        rows[reference].name
                    );
                }
                None => {
                    seen.insert(digest, idx);
                    rows[idx].set_status(RowStatus::Ready);
                }
            }
        }
    }
}

fn prefilter_bucket(
    rows: &mut [QueueRow],
    first_new: usize,
    bucket: &SizeBucket,
    stats: &mut DedupStats,
) {
    let existing_primaries: Vec<usize> = existing_by_preference(rows, bucket, first_new)
        .into_iter()
        .filter(|&idx| rows[idx].status.is_primary())
        .collect();
    let incoming: Vec<usize> = new_rows(bucket, first_new).collect();

    let Some(anchor) = existing_primaries
        .first()
        .copied()
        .or_else(|| incoming.first().copied())
    else {
        return;
    };

    let mut keys: HashMap<(i64, String), usize> = HashMap::new();
    for &idx in existing_primaries.iter().chain(std::iter::once(&anchor)) {
        let row = &rows[idx];
        keys.entry((row.source_last_modified, row.name.clone()))
            .or_insert(idx);
    }

    for idx in incoming {
        if idx == anchor {
            continue;
        }

        let key = (rows[idx].source_last_modified, rows[idx].name.clone());
        let (status, reference) = match keys.get(&key) {
            Some(&r) if path_utils::folders_related(&rows[r].folder_path, &rows[idx].folder_path) => {
                (RowStatus::Duplicate, r)
            }
            Some(&r) => (RowStatus::Copy, r),
            None => (RowStatus::Copy, anchor),
        };

        let reference_id = rows[reference].id;
        rows[idx].mark_secondary(status, reference_id);
        if rows[reference].content_hash.is_none() {
            rows[reference].tentative_group_id = Some(reference_id);
        }
        stats.tentative += 1;
        log::trace!(
            "Tentative {}: {} against {}",
            status,
            rows[idx].name,
            rows[reference].name
        );
    }
}
