//! Upload queue and two-phase ingestion.
//!
//! # Overview
//!
//! [`UploadQueue`] owns the rows and every mutation of them. Dropping files
//! onto it goes through [`UploadQueue::add_files_to_queue`]:
//!
//! - **Phase 1**: the first `phase1_size` files (200 by default) are
//!   materialized, deduplicated against a snapshot of the existing queue,
//!   sorted, and published with [`QueueEvent::InitialBatchReady`]. Observers
//!   run synchronously, so anything they draw is on screen before Phase 2
//!   starts.
//! - **Phase 2**: the rest is processed in batches of `batch_size` (1000 by
//!   default). Each boundary checks the cancel flag; a cancelled call keeps
//!   what it already applied and reports `cancelled` in [`QueueProgress`].
//!
//! Every call gets a new batch order, and every touched duplicate family
//! gets a fresh group timestamp, so the newest activity sorts first.
//!
//! # Example
//!
//! ```
//! use queuedupe::queue::{QueueConfig, RowStatus, UploadQueue};
//! use queuedupe::scanner::MemoryFile;
//!
//! let mut queue = UploadQueue::new(QueueConfig::default().with_tenant_id("firm-1"));
//! queue
//!     .add_files_to_queue(vec![
//!         MemoryFile::new("a.pdf", b"same".to_vec(), 1).into_source(),
//!         MemoryFile::new("b.pdf", b"same".to_vec(), 2).into_source(),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(queue.progress().files_ready, 1);
//! assert_eq!(queue.progress().files_copies, 1);
//! assert_eq!(queue.rows()[0].status, RowStatus::Ready);
//! ```

pub mod events;
pub mod management;
pub mod row;
pub mod sort;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

pub use events::{QueueContext, QueueEvent, Subscriber, SubscriptionId};
pub use row::{QueueRow, RowId, RowStatus};
pub use sort::{grouping_key, grouping_keys, sort_queue};

use crate::duplicates::{deduplicate, DedupContext, IngestMode};
use crate::progress::ProgressCallback;
use crate::scanner::path_utils::{self, DEFAULT_UNSUPPORTED_EXTENSIONS};
use crate::scanner::{system_time_to_millis, HashAlgorithm, HashPool, Hasher, SourceRef};
use events::Subscribers;

/// Default number of files materialized before the first paint.
pub const DEFAULT_PHASE1_SIZE: usize = 200;

/// Default Phase 2 batch size.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Message stored on rows ingested without a tenant.
pub const MISSING_TENANT_MESSAGE: &str = "missing tenant context";

/// Errors raised by an ingestion call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No tenant id was configured, so metadata digests cannot be computed.
    #[error("Missing tenant context: set a tenant id before adding files")]
    MissingTenant,
}

/// Queue configuration.
#[derive(Clone)]
pub struct QueueConfig {
    /// Files materialized before the first paint.
    pub phase1_size: usize,
    /// Files per Phase 2 batch.
    pub batch_size: usize,
    /// Extensions marked `n/a` and never hashed.
    pub unsupported_extensions: Vec<String>,
    /// Parallel reads while content hashing.
    pub io_threads: usize,
    /// Content digest algorithm.
    pub hash_algorithm: HashAlgorithm,
    /// How colliding size buckets are resolved.
    pub ingest_mode: IngestMode,
    /// Tenant the upload belongs to.
    pub tenant_id: Option<String>,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("phase1_size", &self.phase1_size)
            .field("batch_size", &self.batch_size)
            .field("unsupported_extensions", &self.unsupported_extensions)
            .field("io_threads", &self.io_threads)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("ingest_mode", &self.ingest_mode)
            .field("tenant_id", &self.tenant_id.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            phase1_size: DEFAULT_PHASE1_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            unsupported_extensions: DEFAULT_UNSUPPORTED_EXTENSIONS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            io_threads: 4,
            hash_algorithm: HashAlgorithm::default(),
            ingest_mode: IngestMode::default(),
            tenant_id: None,
        }
    }
}

impl QueueConfig {
    /// Set the Phase 1 size.
    #[must_use]
    pub fn with_phase1_size(mut self, size: usize) -> Self {
        self.phase1_size = size.max(1);
        self
    }

    /// Set the Phase 2 batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the unsupported extensions.
    #[must_use]
    pub fn with_unsupported_extensions(mut self, extensions: Vec<String>) -> Self {
        self.unsupported_extensions = extensions;
        self
    }

    /// Set the number of hashing threads.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the content digest algorithm.
    #[must_use]
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Set the ingestion mode.
    #[must_use]
    pub fn with_ingest_mode(mut self, mode: IngestMode) -> Self {
        self.ingest_mode = mode;
        self
    }

    /// Set the tenant id.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Aggregate counters for the queue and the call in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueProgress {
    /// An ingestion call is running.
    pub is_queueing: bool,
    /// Files of the current call processed so far.
    pub processed: usize,
    /// Files in the current call.
    pub total: usize,
    /// The last call was cancelled.
    pub cancelled: bool,
    /// Rows with status `ready`.
    pub files_ready: usize,
    /// Rows with status `copy`.
    pub files_copies: usize,
    /// Rows with status `duplicate`.
    pub files_duplicates: usize,
    /// Rows with status `n/a`.
    pub files_unsupported: usize,
    /// Rows with status `read error`.
    pub files_read_error: usize,
}

impl QueueProgress {
    fn begin(&mut self, total: usize) {
        self.is_queueing = true;
        self.processed = 0;
        self.total = total;
        self.cancelled = false;
    }

    fn add(&mut self, counts: &StatusCounts) {
        self.files_ready += counts.ready;
        self.files_copies += counts.copies;
        self.files_duplicates += counts.duplicates;
        self.files_unsupported += counts.unsupported;
        self.files_read_error += counts.read_error;
    }

    fn set_counts(&mut self, counts: &StatusCounts) {
        self.files_ready = counts.ready;
        self.files_copies = counts.copies;
        self.files_duplicates = counts.duplicates;
        self.files_unsupported = counts.unsupported;
        self.files_read_error = counts.read_error;
    }
}

/// Status tallies over a set of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StatusCounts {
    ready: usize,
    copies: usize,
    duplicates: usize,
    unsupported: usize,
    read_error: usize,
}

impl StatusCounts {
    fn from_rows(rows: &[QueueRow]) -> Self {
        let mut counts = Self::default();
        for row in rows {
            match row.status {
                RowStatus::Ready => counts.ready += 1,
                RowStatus::Copy => counts.copies += 1,
                RowStatus::Duplicate => counts.duplicates += 1,
                RowStatus::NotApplicable => counts.unsupported += 1,
                RowStatus::ReadError => counts.read_error += 1,
                RowStatus::Skip => {}
            }
        }
        counts
    }
}

/// Strictly increasing millisecond clock for group timestamps.
#[derive(Debug, Default)]
pub(crate) struct GroupClock {
    last: i64,
}

impl GroupClock {
    pub(crate) fn tick(&mut self) -> i64 {
        let now = system_time_to_millis(SystemTime::now());
        self.last = now.max(self.last + 1);
        self.last
    }
}

/// The upload queue.
pub struct UploadQueue {
    rows: Vec<QueueRow>,
    progress: QueueProgress,
    config: QueueConfig,
    pool: HashPool,
    context: Arc<QueueContext>,
    cancel: Arc<AtomicBool>,
    subscribers: Subscribers,
    next_row_id: u64,
    batch_order: u64,
    clock: GroupClock,
    duplicates_hidden: bool,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("rows", &self.rows.len())
            .field("progress", &self.progress)
            .field("config", &self.config)
            .field("subscribers", &self.subscribers)
            .field("batch_order", &self.batch_order)
            .field("duplicates_hidden", &self.duplicates_hidden)
            .finish_non_exhaustive()
    }
}

impl UploadQueue {
    /// Create an empty queue with its own context.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self::with_context(config, Arc::new(QueueContext::new()))
    }

    /// Create an empty queue sharing `context` with other components.
    #[must_use]
    pub fn with_context(config: QueueConfig, context: Arc<QueueContext>) -> Self {
        let hasher = Hasher::with_algorithm(config.hash_algorithm);
        let pool = HashPool::new(hasher, config.io_threads);
        Self {
            rows: Vec::new(),
            progress: QueueProgress::default(),
            config,
            pool,
            context,
            cancel: Arc::new(AtomicBool::new(false)),
            subscribers: Subscribers::default(),
            next_row_id: 0,
            batch_order: 0,
            clock: GroupClock::default(),
            duplicates_hidden: false,
            progress_callback: None,
        }
    }

    /// Use an existing cancellation flag (for example one set by Ctrl+C).
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Report phase progress to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Rows in display order.
    #[must_use]
    pub fn rows(&self) -> &[QueueRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the queue has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Aggregate counters.
    #[must_use]
    pub fn progress(&self) -> &QueueProgress {
        &self.progress
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Whether only `ready` rows are shown.
    #[must_use]
    pub fn duplicates_hidden(&self) -> bool {
        self.duplicates_hidden
    }

    /// Shared ingestion context.
    #[must_use]
    pub fn context(&self) -> Arc<QueueContext> {
        Arc::clone(&self.context)
    }

    /// Flag checked at every Phase 2 batch boundary.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Look up a row by id.
    #[must_use]
    pub fn row(&self, id: RowId) -> Option<&QueueRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Register an observer, called after every mutation.
    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.subscribers.add(subscriber)
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    /// Add files to the queue.
    ///
    /// Results are inspected on the queue afterwards. Per-file problems
    /// (unsupported type, unreadable bytes) only affect their row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::MissingTenant`] when no tenant id is configured.
    /// Every file of the call is still added, as a `read error` row.
    pub fn add_files_to_queue(&mut self, mut files: Vec<SourceRef>) -> Result<(), QueueError> {
        self.batch_order += 1;
        let batch_order = self.batch_order;
        let total = files.len();

        self.context.begin_addition();
        self.progress.begin(total);
        // Only a cancel raised during this call counts.
        self.cancel.store(false, Ordering::SeqCst);

        // Stable, so selection order survives within a folder.
        files.sort_by(|a, b| {
            path_utils::locale_cmp(
                &path_utils::folder_path(a.relative_path()),
                &path_utils::folder_path(b.relative_path()),
            )
        });

        let tenant = self
            .config
            .tenant_id
            .clone()
            .filter(|t| !t.trim().is_empty());
        let Some(tenant) = tenant else {
            log::error!(
                "No tenant context; marking {} files as read errors",
                total
            );
            let now = self.clock.tick();
            for file in files {
                let mut row = self.materialize(file, batch_order, now);
                row.mark_read_error(MISSING_TENANT_MESSAGE);
                self.rows.push(row);
            }
            self.resort();
            self.recount_progress();
            self.progress.processed = total;
            self.finish_addition(false);
            return Err(QueueError::MissingTenant);
        };

        log::info!(
            "Adding {} files (batch {}, {} mode)",
            total,
            batch_order,
            self.config.ingest_mode
        );

        // Phase 1
        let split = self.config.phase1_size.min(total);
        let mut remaining = files.split_off(split);
        self.phase_start("initial", split);
        self.apply_batch(files, batch_order, &tenant);
        self.resort();
        self.recount_progress();
        self.progress.processed = split;
        self.context.mark_initial_batch_complete();
        self.phase_progress(split);
        self.phase_end("initial");
        self.emit(QueueEvent::InitialBatchReady { count: split });
        log::debug!("Initial batch ready: {} rows", split);

        // Phase 2
        if !remaining.is_empty() {
            self.phase_start("bulk", remaining.len());
        }
        let mut offset = split;
        while !remaining.is_empty() {
            if self.cancel.load(Ordering::SeqCst) {
                log::info!(
                    "Ingestion cancelled after {} of {} files",
                    self.progress.processed,
                    total
                );
                self.cancel.store(false, Ordering::SeqCst);
                self.progress.cancelled = true;
                self.phase_end("bulk");
                self.finish_addition(true);
                return Ok(());
            }

            let take = self.config.batch_size.min(remaining.len());
            let rest = remaining.split_off(take);
            let batch = std::mem::replace(&mut remaining, rest);

            let counts = self.apply_batch(batch, batch_order, &tenant);
            self.progress.add(&counts);
            offset += take;
            self.progress.processed = offset.min(total);
            self.resort();
            self.phase_progress(offset - split);
            self.emit(QueueEvent::BatchApplied {
                processed: self.progress.processed,
                total,
            });
            log::debug!("Batch applied: {}/{}", self.progress.processed, total);
        }
        if offset > split {
            self.phase_end("bulk");
        }

        // A cancel that arrived after the last boundary is stale.
        self.cancel.store(false, Ordering::SeqCst);
        self.finish_addition(false);
        log::info!(
            "Queue holds {} rows: {} ready, {} copies, {} duplicates, {} n/a, {} read errors",
            self.rows.len(),
            self.progress.files_ready,
            self.progress.files_copies,
            self.progress.files_duplicates,
            self.progress.files_unsupported,
            self.progress.files_read_error
        );
        Ok(())
    }

    fn materialize(&mut self, source: SourceRef, batch_order: u64, now: i64) -> QueueRow {
        self.next_row_id += 1;
        let unsupported =
            path_utils::is_unsupported(source.name(), &self.config.unsupported_extensions);
        QueueRow::from_source(RowId(self.next_row_id), source, batch_order, now, unsupported)
    }

    /// Materialize, deduplicate, and timestamp one batch.
    fn apply_batch(&mut self, files: Vec<SourceRef>, batch_order: u64, tenant: &str) -> StatusCounts {
        let first_new = self.rows.len();
        let now = self.clock.tick();
        for file in files {
            let row = self.materialize(file, batch_order, now);
            self.rows.push(row);
        }

        let ctx = DedupContext::new(tenant, &self.pool, self.config.ingest_mode);
        let stats = deduplicate(&mut self.rows, first_new, &ctx);
        log::trace!("Batch dedup stats: {:?}", stats);

        self.touch_groups(first_new, now);
        StatusCounts::from_rows(&self.rows[first_new..])
    }

    /// Give every existing member of a family the batch touched the batch's timestamp.
    fn touch_groups(&mut self, first_new: usize, now: i64) {
        let (existing, batch) = self.rows.split_at_mut(first_new);

        let mut hashes: HashSet<&str> = HashSet::new();
        let mut ids: HashSet<RowId> = HashSet::new();
        for row in batch.iter() {
            if let Some(h) = &row.content_hash {
                hashes.insert(h.as_str());
            }
            if let Some(h) = &row.metadata_hash {
                hashes.insert(h.as_str());
            }
            if let Some(id) = row.reference_file_id {
                ids.insert(id);
            }
        }
        if hashes.is_empty() && ids.is_empty() {
            return;
        }

        let mut touched = 0usize;
        for row in existing.iter_mut() {
            let matches = ids.contains(&row.id)
                || row.reference_file_id.is_some_and(|id| ids.contains(&id))
                || row
                    .content_hash
                    .as_deref()
                    .is_some_and(|h| hashes.contains(h))
                || row
                    .metadata_hash
                    .as_deref()
                    .is_some_and(|h| hashes.contains(h));
            if matches {
                row.group_timestamp = now;
                touched += 1;
            }
        }
        if touched > 0 {
            log::trace!("Touched {} existing rows", touched);
        }
    }

    fn finish_addition(&mut self, cancelled: bool) {
        self.progress.is_queueing = false;
        self.context.mark_addition_complete();
        self.emit(QueueEvent::AdditionComplete { cancelled });
    }

    fn phase_start(&self, phase: &str, total: usize) {
        if let Some(callback) = &self.progress_callback {
            callback.on_phase_start(phase, total);
        }
    }

    fn phase_progress(&self, current: usize) {
        if let Some(callback) = &self.progress_callback {
            callback.on_progress(current, "");
        }
    }

    fn phase_end(&self, phase: &str) {
        if let Some(callback) = &self.progress_callback {
            callback.on_phase_end(phase);
        }
    }

    // Crate-internal plumbing shared with management and the verifier.

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<QueueRow> {
        &mut self.rows
    }

    pub(crate) fn row_mut(&mut self, id: RowId) -> Option<&mut QueueRow> {
        self.rows.iter_mut().find(|r| r.id == id)
    }

    pub(crate) fn hash_pool(&self) -> &HashPool {
        &self.pool
    }

    pub(crate) fn tick(&mut self) -> i64 {
        self.clock.tick()
    }

    /// Remove rows by id, returning the ids actually removed in queue order.
    pub(crate) fn take_rows(&mut self, ids: &HashSet<RowId>) -> Vec<RowId> {
        let mut removed = Vec::new();
        self.rows.retain(|row| {
            if ids.contains(&row.id) {
                removed.push(row.id);
                false
            } else {
                true
            }
        });
        removed
    }

    pub(crate) fn resort(&mut self) {
        sort_queue(&mut self.rows);
    }

    /// Recompute the status counters from the whole queue.
    pub(crate) fn recount_progress(&mut self) {
        let counts = StatusCounts::from_rows(&self.rows);
        self.progress.set_counts(&counts);
    }

    pub(crate) fn emit(&mut self, event: QueueEvent) {
        self.subscribers.notify(&event, &self.rows);
    }

    pub(crate) fn progress_callback(&self) -> Option<Arc<dyn ProgressCallback>> {
        self.progress_callback.clone()
    }
}
