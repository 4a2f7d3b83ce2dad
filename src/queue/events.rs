//! Change notifications and the shared ingestion context.
//!
//! Observers register with [`UploadQueue::subscribe`](super::UploadQueue::subscribe)
//! and are called synchronously after every mutation, with the event and the
//! current rows. [`QueueContext`] carries the cross-component signals
//! (initial batch painted, addition complete) that the verifier scheduler
//! watches.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::row::{QueueRow, RowId};

/// Something changed in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// Phase 1 rows are in place and sorted.
    InitialBatchReady {
        /// Rows materialized in Phase 1.
        count: usize,
    },
    /// A Phase 2 batch was applied.
    BatchApplied {
        /// New files processed so far in this call.
        processed: usize,
        /// New files in this call.
        total: usize,
    },
    /// An ingestion call finished.
    AdditionComplete {
        /// Whether Phase 2 was cancelled.
        cancelled: bool,
    },
    /// Row fields or order changed.
    RowsUpdated,
    /// Rows were removed.
    RowsRemoved(Vec<RowId>),
    /// The verifier finished one row.
    VerificationProgress {
        /// Rows verified so far.
        processed: usize,
        /// Rows to verify.
        total: usize,
    },
    /// A verification pass finished.
    VerificationComplete,
}

/// Observer callback.
pub type Subscriber = Box<dyn FnMut(&QueueEvent, &[QueueRow]) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Registered observers.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Subscriber)>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, subscriber));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn notify(&mut self, event: &QueueEvent, rows: &[QueueRow]) {
        for (_, subscriber) in &mut self.entries {
            subscriber(event, rows);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.len())
            .finish()
    }
}

/// Ingestion signals shared between the queue and the verifier scheduler.
///
/// Thread-safe; share it with `Arc`.
#[derive(Debug, Default)]
pub struct QueueContext {
    initial_batch_complete: AtomicBool,
    addition_complete: AtomicBool,
    completion_generation: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl QueueContext {
    /// Create a context with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An ingestion call started.
    pub fn begin_addition(&self) {
        self.initial_batch_complete.store(false, Ordering::SeqCst);
        self.addition_complete.store(false, Ordering::SeqCst);
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Phase 1 rows were published.
    pub fn mark_initial_batch_complete(&self) {
        self.initial_batch_complete.store(true, Ordering::SeqCst);
    }

    /// The ingestion call finished; bumps the completion generation.
    pub fn mark_addition_complete(&self) {
        self.initial_batch_complete.store(true, Ordering::SeqCst);
        self.addition_complete.store(true, Ordering::SeqCst);
        self.completion_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether Phase 1 of the current call has been published.
    #[must_use]
    pub fn is_initial_batch_complete(&self) -> bool {
        self.initial_batch_complete.load(Ordering::SeqCst)
    }

    /// Whether no ingestion call is in flight.
    #[must_use]
    pub fn is_addition_complete(&self) -> bool {
        self.addition_complete.load(Ordering::SeqCst)
    }

    /// Number of completed ingestion calls.
    #[must_use]
    pub fn completion_generation(&self) -> u64 {
        self.completion_generation.load(Ordering::SeqCst)
    }

    /// Time since the current (or last) ingestion call started.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|start| start.elapsed())
    }
}
