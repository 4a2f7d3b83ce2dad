//! User-facing queue mutations.
//!
//! Every operation that changes the queue notifies subscribers before it
//! returns. Status changes keep `can_upload` consistent through
//! [`QueueRow::set_status`].

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use super::{QueueEvent, QueueRow, RowId, RowStatus, UploadQueue};
use crate::queue::sort::grouping_keys;

impl UploadQueue {
    /// Remove one row. Returns false for unknown ids.
    pub fn remove_from_queue(&mut self, id: RowId) -> bool {
        let removed = self.take_rows(&HashSet::from([id]));
        if removed.is_empty() {
            return false;
        }
        self.after_removal(removed);
        true
    }

    /// Remove `skip`, `duplicate`, `n/a`, and `read error` rows.
    ///
    /// Returns the number of rows removed.
    pub fn clear_queue(&mut self) -> usize {
        self.remove_where(|row| {
            matches!(
                row.status,
                RowStatus::Skip
                    | RowStatus::Duplicate
                    | RowStatus::NotApplicable
                    | RowStatus::ReadError
            )
        })
    }

    /// Remove every `duplicate` row.
    pub fn clear_duplicates(&mut self) -> usize {
        self.remove_where(QueueRow::is_duplicate)
    }

    /// Remove `skip` rows and the copies of skipped primaries.
    pub fn clear_skipped(&mut self) -> usize {
        let skipped: HashSet<String> = self
            .rows()
            .iter()
            .filter(|r| r.status == RowStatus::Skip)
            .filter_map(|r| r.content_hash.clone())
            .collect();

        self.remove_where(|row| {
            row.status == RowStatus::Skip
                || (row.is_copy()
                    && row
                        .content_hash
                        .as_ref()
                        .is_some_and(|h| skipped.contains(h)))
        })
    }

    /// Set a row's status. Returns false for unknown ids.
    pub fn update_file_status(&mut self, id: RowId, status: RowStatus) -> bool {
        let Some(row) = self.row_mut(id) else {
            return false;
        };
        row.set_status(status);
        self.after_update();
        true
    }

    /// Mark a row as `skip`.
    pub fn skip_file(&mut self, id: RowId) -> bool {
        self.update_file_status(id, RowStatus::Skip)
    }

    /// Return a skipped row to `ready`. No-op unless the row is `skip`.
    pub fn undo_skip(&mut self, id: RowId) -> bool {
        let skipped = self
            .row(id)
            .is_some_and(|row| row.status == RowStatus::Skip);
        skipped && self.update_file_status(id, RowStatus::Ready)
    }

    /// Every `skip` row becomes `ready`.
    pub fn select_all(&mut self) -> usize {
        self.transition_all(RowStatus::Skip, RowStatus::Ready)
    }

    /// Every `ready` row becomes `skip`.
    pub fn deselect_all(&mut self) -> usize {
        self.transition_all(RowStatus::Ready, RowStatus::Skip)
    }

    /// Make a copy or duplicate the primary of its family.
    ///
    /// The current primary (first `ready`, else first `skip`) becomes a
    /// `copy` pointing at the new primary. Row order is left alone. Returns
    /// false if the row is unknown or already a primary.
    pub fn swap_to_primary(&mut self, id: RowId) -> bool {
        let keys = grouping_keys(self.rows());
        let Some(row) = self.row(id) else {
            return false;
        };
        if !row.status.is_secondary() {
            return false;
        }

        let family = keys.get(&id).cloned().flatten();
        let in_family = |r: &QueueRow| {
            r.id != id
                && (row.reference_file_id == Some(r.id)
                    || (family.is_some() && keys.get(&r.id).cloned().flatten() == family))
        };
        let primary = self
            .rows()
            .iter()
            .find(|r| r.status == RowStatus::Ready && in_family(r))
            .or_else(|| {
                self.rows()
                    .iter()
                    .find(|r| r.status == RowStatus::Skip && in_family(r))
            })
            .map(|r| r.id);

        if let Some(row) = self.row_mut(id) {
            row.set_status(RowStatus::Ready);
            row.reference_file_id = None;
        }
        if let Some(old) = primary {
            if let Some(old_row) = self.row_mut(old) {
                old_row.mark_secondary(RowStatus::Copy, id);
            }
            // Other members now follow the new primary.
            for member in self.rows_mut().iter_mut() {
                if member.reference_file_id == Some(old) {
                    member.reference_file_id = Some(id);
                }
            }
            log::debug!("Swapped primary {} -> {}", old, id);
        }

        self.after_update();
        true
    }

    /// Toggle between showing every row and only `ready` rows.
    pub fn toggle_duplicates_visibility(&mut self) -> bool {
        self.duplicates_hidden = !self.duplicates_hidden;
        self.emit(QueueEvent::RowsUpdated);
        self.duplicates_hidden
    }

    /// Rows shown under the current visibility mode.
    #[must_use]
    pub fn visible_rows(&self) -> Vec<&QueueRow> {
        let hidden = self.duplicates_hidden();
        self.rows()
            .iter()
            .filter(|r| !hidden || r.status == RowStatus::Ready)
            .collect()
    }

    /// Ask the ingestion call in flight to stop at the next batch boundary.
    pub fn cancel_queue(&self) {
        log::debug!("Cancellation requested");
        self.cancel_flag().store(true, Ordering::SeqCst);
    }

    /// Set the upload flag of a `skip` row. Returns false otherwise.
    pub fn set_can_upload(&mut self, id: RowId, can_upload: bool) -> bool {
        let Some(row) = self.row_mut(id) else {
            return false;
        };
        if row.status != RowStatus::Skip {
            return false;
        }
        row.can_upload = can_upload;
        self.after_update();
        true
    }

    fn transition_all(&mut self, from: RowStatus, to: RowStatus) -> usize {
        let mut changed = 0;
        for row in self.rows_mut().iter_mut().filter(|r| r.status == from) {
            row.set_status(to);
            changed += 1;
        }
        if changed > 0 {
            self.after_update();
        }
        changed
    }

    fn remove_where(&mut self, predicate: impl Fn(&QueueRow) -> bool) -> usize {
        let ids: HashSet<RowId> = self
            .rows()
            .iter()
            .filter(|r| predicate(r))
            .map(|r| r.id)
            .collect();
        if ids.is_empty() {
            return 0;
        }
        let removed = self.take_rows(&ids);
        let count = removed.len();
        self.after_removal(removed);
        count
    }

    fn after_update(&mut self) {
        self.recount_progress();
        self.emit(QueueEvent::RowsUpdated);
    }

    pub(crate) fn after_removal(&mut self, removed: Vec<RowId>) {
        self.recount_progress();
        self.emit(QueueEvent::RowsRemoved(removed));
    }
}
