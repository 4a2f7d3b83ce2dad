//! Background confirmation of tentative rows.
//!
//! # Overview
//!
//! Rows classified as `copy` or `duplicate` without any digest (the
//! prefilter mode produces them) are provisional. A verification pass:
//!
//! 1. hashes the reference rows of tentative groups, smallest first;
//! 2. hashes every tentative row, smallest first, and compares it to its
//!    reference;
//! 3. promotes mismatches and unresolvable references to `ready` (a unique
//!    file is never lost), keeps confirmed copies, and removes confirmed
//!    duplicates;
//! 4. refreshes the group timestamp of every verified family and re-sorts.
//!
//! Rows that the metadata layer marked as duplicates carry a metadata
//! digest and are trusted as they are.
//!
//! Removal goes through a [`RemovalPresenter`]: rows it reports as visible
//! are removed one at a time after an animation hook, the rest in a single
//! batch with one notification.
//!
//! # Example
//!
//! ```
//! use queuedupe::duplicates::IngestMode;
//! use queuedupe::queue::{QueueConfig, RowStatus, UploadQueue};
//! use queuedupe::scanner::MemoryFile;
//! use queuedupe::verify::{VerificationOutcome, Verifier};
//!
//! let mut queue = UploadQueue::new(
//!     QueueConfig::default()
//!         .with_tenant_id("firm-1")
//!         .with_ingest_mode(IngestMode::Prefilter),
//! );
//! queue
//!     .add_files_to_queue(vec![
//!         MemoryFile::new("a.pdf", b"aaaa".to_vec(), 1).into_source(),
//!         MemoryFile::new("b.pdf", b"bbbb".to_vec(), 2).into_source(),
//!     ])
//!     .unwrap();
//! assert_eq!(queue.progress().files_copies, 1);
//!
//! let verifier = Verifier::new();
//! let outcome = verifier.run(&mut queue);
//! assert!(matches!(outcome, VerificationOutcome::Completed(ref s) if s.promoted == 1));
//! assert!(queue.rows().iter().all(|r| r.status == RowStatus::Ready));
//! ```

pub mod scheduler;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

pub use scheduler::{spawn_auto_verifier, AutoStart};

use crate::queue::{QueueEvent, QueueRow, RowId, UploadQueue};

/// Default duration of the removal animation hook.
pub const DEFAULT_REMOVAL_ANIMATION: Duration = Duration::from_millis(500);

/// Presentation hooks for verification removals.
pub trait RemovalPresenter: Send + Sync {
    /// Whether the row is currently on screen.
    fn is_visible(&self, _row: &QueueRow) -> bool {
        false
    }

    /// Animate a visible row out before it is removed.
    ///
    /// Called once per visible row; the row is removed when this returns.
    fn animate_removal(&self, _row: &QueueRow, _duration: Duration) {}
}

/// Presenter with nothing on screen; every removal is batched.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPresenter;

impl RemovalPresenter for HeadlessPresenter {}

/// Live verification counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationState {
    /// A pass is running.
    pub is_verifying: bool,
    /// Rows handled in the current pass.
    pub processed: usize,
    /// Rows to handle in the current pass, references included.
    pub total: usize,
}

/// What a verification run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    /// Passes run (follow-up passes included).
    pub passes: usize,
    /// Tentative rows examined.
    pub candidates: usize,
    /// Duplicates confirmed by content (and removed).
    pub confirmed_duplicates: usize,
    /// Copies confirmed by content.
    pub confirmed_copies: usize,
    /// Rows promoted to `ready`.
    pub promoted: usize,
    /// Rows that could not be read.
    pub read_errors: usize,
    /// Rows removed one at a time with the animation hook.
    pub removed_animated: usize,
    /// Rows removed in the batch.
    pub removed_batched: usize,
}

impl VerificationSummary {
    fn merge(&mut self, other: &Self) {
        self.passes += other.passes;
        self.candidates += other.candidates;
        self.confirmed_duplicates += other.confirmed_duplicates;
        self.confirmed_copies += other.confirmed_copies;
        self.promoted += other.promoted;
        self.read_errors += other.read_errors;
        self.removed_animated += other.removed_animated;
        self.removed_batched += other.removed_batched;
    }
}

/// Result of [`Verifier::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Another pass was in flight; a follow-up pass was requested instead.
    AlreadyRunning,
    /// The queue holds no tentative rows.
    NothingToVerify,
    /// At least one pass ran.
    Completed(VerificationSummary),
}

/// Resets the running flag however the pass ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Reentrancy-guarded verifier.
///
/// Share it with `Arc`; all methods take `&self`.
pub struct Verifier {
    running: AtomicBool,
    pending: AtomicBool,
    processed: AtomicUsize,
    total: AtomicUsize,
    totals: Mutex<Option<VerificationSummary>>,
    presenter: Box<dyn RemovalPresenter>,
    removal_animation: Duration,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("state", &self.state())
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .field("removal_animation", &self.removal_animation)
            .finish_non_exhaustive()
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    /// Create a verifier with a headless presenter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            processed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            totals: Mutex::new(None),
            presenter: Box::new(HeadlessPresenter),
            removal_animation: DEFAULT_REMOVAL_ANIMATION,
        }
    }

    /// Use a presentation layer for removals.
    #[must_use]
    pub fn with_presenter(mut self, presenter: Box<dyn RemovalPresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Set the duration passed to the animation hook.
    #[must_use]
    pub fn with_removal_animation(mut self, duration: Duration) -> Self {
        self.removal_animation = duration;
        self
    }

    /// Current counters.
    #[must_use]
    pub fn state(&self) -> VerificationState {
        VerificationState {
            is_verifying: self.running.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }

    /// Whether a pass is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Combined summary of every run that verified anything.
    #[must_use]
    pub fn totals(&self) -> Option<VerificationSummary> {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ask for another pass once the running one finishes.
    pub fn request_follow_up(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Run verification passes until no follow-up is pending.
    pub fn run(&self, queue: &mut UploadQueue) -> VerificationOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Verification already running; queued a follow-up pass");
            self.request_follow_up();
            return VerificationOutcome::AlreadyRunning;
        }
        let _guard = RunningGuard(&self.running);

        let mut summary: Option<VerificationSummary> = None;
        loop {
            self.pending.store(false, Ordering::SeqCst);
            if let Some(pass) = self.pass(queue) {
                summary.get_or_insert_with(VerificationSummary::default).merge(&pass);
            }
            if !self.pending.load(Ordering::SeqCst) {
                break;
            }
            log::debug!("Running follow-up verification pass");
        }

        match summary {
            Some(summary) => {
                self.totals
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert_with(VerificationSummary::default)
                    .merge(&summary);
                VerificationOutcome::Completed(summary)
            }
            None => VerificationOutcome::NothingToVerify,
        }
    }

    fn advance(&self, queue: &mut UploadQueue) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        if let Some(callback) = queue.progress_callback() {
            callback.on_progress(processed, "");
        }
        queue.emit(QueueEvent::VerificationProgress { processed, total });
    }

    fn pass(&self, queue: &mut UploadQueue) -> Option<VerificationSummary> {
        let mut candidates: Vec<(u64, RowId)> = queue
            .rows()
            .iter()
            .filter(|r| r.is_tentative())
            .map(|r| (r.size, r.id))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let mut references: Vec<(u64, RowId)> = queue
            .rows()
            .iter()
            .filter(|r| r.tentative_group_id.is_some() && r.content_hash.is_none())
            .map(|r| (r.size, r.id))
            .collect();
        candidates.sort_by_key(|(size, _)| *size);
        references.sort_by_key(|(size, _)| *size);

        let total = candidates.len() + references.len();
        self.processed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        let callback = queue.progress_callback();
        if let Some(cb) = &callback {
            cb.on_phase_start("verify", total);
        }
        log::info!(
            "Verifying {} tentative rows against {} references",
            candidates.len(),
            references.len()
        );

        let hasher = *queue.hash_pool().hasher();
        let mut summary = VerificationSummary {
            passes: 1,
            candidates: candidates.len(),
            ..Default::default()
        };

        // References first, so candidates have something to compare against.
        for (_, id) in references {
            let Some(source) = queue.row(id).map(QueueRow::source) else {
                self.advance(queue);
                continue;
            };
            let result = hasher.content_hash(source.as_ref());
            if let Some(row) = queue.row_mut(id) {
                match result {
                    Ok(digest) => row.content_hash = Some(digest),
                    Err(e) => {
                        log::warn!("Read error for reference {}: {}", row.name, e);
                        row.mark_read_error(e.to_string());
                        summary.read_errors += 1;
                    }
                }
            }
            self.advance(queue);
        }

        let mut verified: HashSet<String> = HashSet::new();
        let mut to_remove: Vec<RowId> = Vec::new();

        for (size, id) in candidates {
            let Some(row) = queue.row(id) else {
                self.advance(queue);
                continue;
            };
            if !row.status.is_secondary() {
                self.advance(queue);
                continue;
            }

            let digest = match &row.content_hash {
                Some(digest) => Ok(digest.clone()),
                None => hasher.content_hash(row.source_ref()),
            };
            let reference_id = row.reference_file_id;
            let reference_digest = reference_id
                .and_then(|rid| queue.row(rid))
                .and_then(|r| r.content_hash.clone());

            let digest = match digest {
                Ok(digest) => digest,
                Err(e) => {
                    if let Some(row) = queue.row_mut(id) {
                        log::warn!("Read error for {}: {}", row.name, e);
                        row.mark_read_error(e.to_string());
                    }
                    summary.read_errors += 1;
                    self.advance(queue);
                    continue;
                }
            };

            if let Some(cb) = &callback {
                cb.on_item_completed(size);
            }

            let confirmed = reference_digest.as_deref() == Some(digest.as_str());
            let now = (!confirmed).then(|| queue.tick());
            let Some(row) = queue.row_mut(id) else {
                continue;
            };
            row.content_hash = Some(digest.clone());

            if confirmed {
                if row.is_duplicate() {
                    summary.confirmed_duplicates += 1;
                    to_remove.push(id);
                } else {
                    summary.confirmed_copies += 1;
                }
                verified.insert(digest);
            } else {
                match reference_digest {
                    Some(_) => log::warn!("Content mismatch for {}; promoting to ready", row.name),
                    None => log::warn!(
                        "Reference {} missing or unhashed for {}; promoting to ready",
                        reference_id.map_or_else(|| "<none>".to_string(), |r| r.to_string()),
                        row.name
                    ),
                }
                row.promote_to_ready();
                if let Some(cb) = &callback {
                    cb.on_message(&format!("Promoted {}", row.name));
                }
                if let Some(now) = now {
                    row.group_timestamp = now;
                }
                summary.promoted += 1;
                queue.resort();
                queue.emit(QueueEvent::RowsUpdated);
            }
            self.advance(queue);
        }

        self.remove_confirmed(queue, &to_remove, &mut summary);

        // Refresh the families that were confirmed.
        if !verified.is_empty() {
            let now = queue.tick();
            for row in queue.rows_mut().iter_mut() {
                if row
                    .content_hash
                    .as_ref()
                    .is_some_and(|h| verified.contains(h))
                {
                    row.group_timestamp = now;
                }
            }
        }

        queue.resort();
        queue.recount_progress();
        queue.emit(QueueEvent::RowsUpdated);
        queue.emit(QueueEvent::VerificationComplete);
        if let Some(cb) = &callback {
            cb.on_phase_end("verify");
        }

        log::info!(
            "Verification complete: {} duplicates removed, {} copies confirmed, {} promoted, {} read errors",
            summary.confirmed_duplicates,
            summary.confirmed_copies,
            summary.promoted,
            summary.read_errors
        );
        Some(summary)
    }

    fn remove_confirmed(
        &self,
        queue: &mut UploadQueue,
        ids: &[RowId],
        summary: &mut VerificationSummary,
    ) {
        let mut hidden: Vec<RowId> = Vec::new();
        for &id in ids {
            let Some(row) = queue.row(id) else {
                continue;
            };
            if self.presenter.is_visible(row) {
                self.presenter.animate_removal(row, self.removal_animation);
                let removed = queue.take_rows(&HashSet::from([id]));
                if !removed.is_empty() {
                    summary.removed_animated += 1;
                    queue.after_removal(removed);
                }
            } else {
                hidden.push(id);
            }
        }

        if hidden.is_empty() {
            return;
        }
        hidden.reverse();
        let set: HashSet<RowId> = hidden.iter().copied().collect();
        let removed = queue.take_rows(&set);
        summary.removed_batched += removed.len();
        log::debug!("Batch-removed {} confirmed duplicates", removed.len());
        queue.after_removal(hidden);
    }
}
