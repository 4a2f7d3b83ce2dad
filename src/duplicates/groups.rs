//! Size-bucket index over queue rows.
//!
//! # Overview
//!
//! Files with different sizes cannot share content, so grouping by exact
//! byte size settles most rows before any digest is computed. The index is
//! built over the whole candidate set (existing queue rows plus the new
//! batch); only buckets that contain at least one new row are returned,
//! since existing rows are never re-classified.
//!
//! # Example
//!
//! ```
//! use queuedupe::duplicates::group_by_size;
//! use queuedupe::queue::{QueueRow, RowId};
//! use queuedupe::scanner::MemoryFile;
//!
//! let rows: Vec<QueueRow> = [("a.pdf", 4), ("b.pdf", 4), ("c.pdf", 9)]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, (name, len))| {
//!         let source = MemoryFile::new(*name, vec![0; *len], 0).into_source();
//!         QueueRow::from_source(RowId(i as u64), source, 1, 0, false)
//!     })
//!     .collect();
//!
//! let (buckets, stats) = group_by_size(&rows, 0);
//! assert_eq!(buckets.len(), 2);
//! assert_eq!(stats.eliminated_unique, 1);
//! assert_eq!(stats.potential_duplicates, 2);
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::queue::{QueueRow, RowStatus};

/// Rows sharing one byte size.
///
/// Indices point into the slice the index was built from, existing rows
/// first and in queue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeBucket {
    /// Byte size shared by every row.
    pub size: u64,
    /// Row indices.
    pub rows: Vec<usize>,
    /// How many of `rows` belong to the new batch.
    pub new_rows: usize,
}

impl SizeBucket {
    fn new(size: u64) -> Self {
        Self {
            size,
            rows: Vec::new(),
            new_rows: 0,
        }
    }

    /// Number of rows in the bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the bucket needs the hash layers (2+ rows).
    #[must_use]
    pub fn is_colliding(&self) -> bool {
        self.rows.len() > 1
    }
}

/// Statistics from building a size index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingStats {
    /// Rows considered (existing and new).
    pub total_rows: usize,
    /// Rows from the new batch.
    pub new_rows: usize,
    /// Rows left out because they are `n/a` or `read error`.
    pub excluded: usize,
    /// Distinct sizes among the considered rows.
    pub unique_sizes: usize,
    /// New rows settled by a bucket of one.
    pub eliminated_unique: usize,
    /// Rows in colliding buckets that contain new rows.
    pub potential_duplicates: usize,
    /// Colliding buckets that contain new rows.
    pub colliding_buckets: usize,
}

impl GroupingStats {
    /// Percentage of new rows settled by size alone.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.new_rows == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.new_rows as f64) * 100.0
        }
    }
}

/// Whether a row takes part in deduplication at all.
#[must_use]
pub fn is_dedup_candidate(row: &QueueRow) -> bool {
    !matches!(row.status, RowStatus::NotApplicable | RowStatus::ReadError)
}

/// Group rows by byte size.
///
/// # Arguments
///
/// * `rows` - Existing rows followed by the new batch
/// * `first_new` - Index of the first new row
///
/// # Returns
///
/// Buckets containing at least one new row, in order of first appearance,
/// and statistics about the grouping.
#[must_use]
pub fn group_by_size(rows: &[QueueRow], first_new: usize) -> (Vec<SizeBucket>, GroupingStats) {
    let mut stats = GroupingStats::default();
    let mut buckets: Vec<SizeBucket> = Vec::new();
    let mut by_size: HashMap<u64, usize> = HashMap::new();

    for (idx, row) in rows.iter().enumerate() {
        if !is_dedup_candidate(row) {
            stats.excluded += 1;
            continue;
        }
        stats.total_rows += 1;

        let slot = *by_size.entry(row.size).or_insert_with(|| {
            buckets.push(SizeBucket::new(row.size));
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];
        bucket.rows.push(idx);
        if idx >= first_new {
            bucket.new_rows += 1;
            stats.new_rows += 1;
        }
    }

    stats.unique_sizes = buckets.len();

    let buckets: Vec<SizeBucket> = buckets
        .into_iter()
        .filter(|bucket| {
            if bucket.new_rows == 0 {
                return false;
            }
            if bucket.is_colliding() {
                stats.potential_duplicates += bucket.len();
                stats.colliding_buckets += 1;
                log::trace!("Size bucket {} bytes: {} rows", bucket.size, bucket.len());
            } else {
                stats.eliminated_unique += 1;
            }
            true
        })
        .collect();

    log::debug!(
        "Size index: {} new rows, {} settled by size ({:.1}%), {} in {} colliding buckets",
        stats.new_rows,
        stats.eliminated_unique,
        stats.elimination_rate(),
        stats.potential_duplicates,
        stats.colliding_buckets
    );

    (buckets, stats)
}
