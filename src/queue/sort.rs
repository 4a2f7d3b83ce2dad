//! Deterministic queue ordering.
//!
//! Rows are ordered by:
//!
//! 1. `group_timestamp`, newest first
//! 2. grouping key ascending; rows without one sort last in their tier
//! 3. status rank (`ready` < `copy` < `duplicate` < `n/a` < `skip` < `read error`)
//! 4. between two copies or two duplicates: earliest mtime, longest folder
//!    path, shortest name, then name
//!
//! The sort is stable, so rows that compare equal keep their relative order
//! and re-sorting an unchanged queue is a no-op.

use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

use super::row::{QueueRow, RowId};
use crate::scanner::path_utils;

/// Key that keeps a duplicate family contiguous.
///
/// Falls back from the row's content digest, to the referenced row's content
/// digest, to the metadata digest, to the tentative group id (own, then the
/// reference's).
#[must_use]
pub fn grouping_key(row: &QueueRow, by_id: &HashMap<RowId, &QueueRow>) -> Option<String> {
    let reference = row.reference_file_id.and_then(|id| by_id.get(&id).copied());

    row.content_hash
        .clone()
        .or_else(|| reference.and_then(|r| r.content_hash.clone()))
        .or_else(|| row.metadata_hash.clone())
        .or_else(|| row.tentative_group_id.map(|id| id.to_string()))
        .or_else(|| {
            reference.and_then(|r| {
                r.tentative_group_id
                    .or(row.reference_file_id)
                    .map(|id| id.to_string())
            })
        })
}

/// Grouping key for every row, keyed by id.
#[must_use]
pub fn grouping_keys(rows: &[QueueRow]) -> HashMap<RowId, Option<String>> {
    let by_id: HashMap<RowId, &QueueRow> = rows.iter().map(|r| (r.id, r)).collect();
    rows.iter()
        .map(|row| (row.id, grouping_key(row, &by_id)))
        .collect()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum GroupKey {
    Keyed(String),
    Ungrouped,
}

#[derive(Debug, PartialEq, Eq)]
struct Tiebreak {
    modified: i64,
    folder_len: usize,
    name_len: usize,
    name: String,
}

impl Ord for Tiebreak {
    fn cmp(&self, other: &Self) -> Ordering {
        self.modified
            .cmp(&other.modified)
            .then_with(|| other.folder_len.cmp(&self.folder_len))
            .then_with(|| self.name_len.cmp(&other.name_len))
            .then_with(|| path_utils::locale_cmp(&self.name, &other.name))
    }
}

impl PartialOrd for Tiebreak {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    recency: Reverse<i64>,
    group: GroupKey,
    rank: u8,
    tiebreak: Option<Tiebreak>,
}

fn sort_key(row: &QueueRow, group: Option<String>) -> SortKey {
    SortKey {
        recency: Reverse(row.group_timestamp),
        group: group.map_or(GroupKey::Ungrouped, GroupKey::Keyed),
        rank: row.status.sort_rank(),
        tiebreak: row.status.is_secondary().then(|| Tiebreak {
            modified: row.source_last_modified,
            // Lengths in characters, not bytes.
            folder_len: row.folder_path.chars().count(),
            name_len: row.name.chars().count(),
            name: row.name.clone(),
        }),
    }
}

/// Sort the queue in place.
pub fn sort_queue(rows: &mut Vec<QueueRow>) {
    if rows.len() < 2 {
        return;
    }

    let mut keys = grouping_keys(rows);
    let mut decorated: Vec<(SortKey, QueueRow)> = rows
        .drain(..)
        .map(|row| {
            let group = keys.remove(&row.id).flatten();
            (sort_key(&row, group), row)
        })
        .collect();

    decorated.sort_by(|a, b| a.0.cmp(&b.0));
    rows.extend(decorated.into_iter().map(|(_, row)| row));
}
