//! Message-passing hash worker.
//!
//! # Overview
//!
//! [`HashWorker`] owns a background thread that speaks a small request/response
//! protocol over [`std::sync::mpsc`] channels:
//!
//! - `ProcessFiles` → zero or more `ProgressUpdate`, then `ProcessingComplete`
//!   or `Error`
//! - `HealthCheck` → `HealthCheckResponse`
//! - `Shutdown` (or dropping the handle) stops the thread
//!
//! Responses serialize to the wire shape other processes expect
//! (`{"type": "PROCESSING_COMPLETE", "batchId": ..., "result": {...}}`).
//!
//! A batch is classified on its own, without any queue state: unique sizes
//! are ready, colliding sizes are hashed, the same file picked twice is
//! collapsed, and among distinct files sharing content the best one stays
//! ready while the rest become copies.
//!
//! # Example
//!
//! ```
//! use queuedupe::scanner::worker::{HashWorker, WorkerConfig, WorkerFile, WorkerResponse};
//! use queuedupe::scanner::MemoryFile;
//!
//! let worker = HashWorker::spawn(WorkerConfig::default()).unwrap();
//! let files = vec![
//!     WorkerFile::new("f1", MemoryFile::new("a.pdf", b"abc".to_vec(), 1).into_source(), 0),
//!     WorkerFile::new("f2", MemoryFile::new("b.pdf", b"abc".to_vec(), 2).into_source(), 1),
//! ];
//!
//! match worker.process_files(files, "batch-1", |_| {}).unwrap() {
//!     WorkerResponse::ProcessingComplete { result, .. } => {
//!         assert_eq!(result.ready_files.len(), 1);
//!         assert_eq!(result.copy_files.len(), 1);
//!     }
//!     other => panic!("unexpected response: {other:?}"),
//! }
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::hasher::{HashPool, Hasher};
use super::{path_utils, SourceRef};

/// Default minimum interval between progress updates.
pub const DEFAULT_PROGRESS_THROTTLE: Duration = Duration::from_millis(1000);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Digest calculator.
    pub hasher: Hasher,
    /// Parallel reads while hashing.
    pub io_threads: usize,
    /// Minimum interval between `ProgressUpdate` messages.
    pub progress_throttle: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            hasher: Hasher::new(),
            io_threads: 4,
            progress_throttle: DEFAULT_PROGRESS_THROTTLE,
        }
    }
}

/// One file submitted to the worker.
#[derive(Debug, Clone)]
pub struct WorkerFile {
    /// Caller-assigned identifier, echoed back in the result.
    pub id: String,
    /// File handle.
    pub source: SourceRef,
    /// Position in the caller's selection.
    pub original_index: usize,
    /// Path override; defaults to the source's relative path or name.
    pub custom_path: Option<String>,
}

impl WorkerFile {
    /// Create a request entry.
    #[must_use]
    pub fn new(id: impl Into<String>, source: SourceRef, original_index: usize) -> Self {
        Self {
            id: id.into(),
            source,
            original_index,
            custom_path: None,
        }
    }

    /// Override the reported path.
    #[must_use]
    pub fn with_custom_path(mut self, path: impl Into<String>) -> Self {
        self.custom_path = Some(path.into());
        self
    }

    fn path(&self) -> String {
        match &self.custom_path {
            Some(path) if !path.is_empty() => path.clone(),
            _ => self.source.display_path().to_string(),
        }
    }
}

/// Request sent to the worker thread.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Classify a batch of files.
    ProcessFiles {
        /// Files in selection order.
        files: Vec<WorkerFile>,
        /// Correlation id.
        batch_id: String,
    },
    /// Liveness probe.
    HealthCheck {
        /// Correlation id.
        batch_id: String,
        /// Caller's send time (ms since epoch).
        timestamp: i64,
    },
    /// Stop the worker thread.
    Shutdown,
}

/// Descriptive metadata echoed for every file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// File name.
    pub source_file_name: String,
    /// Size in bytes.
    pub source_file_size: u64,
    /// Last modification time (ms since epoch).
    pub last_modified: i64,
}

/// Classification of one file in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    /// Caller-assigned identifier.
    pub id: String,
    /// Position in the caller's selection.
    pub original_index: usize,
    /// Reported path.
    pub path: String,
    /// Descriptive metadata.
    pub metadata: FileMetadata,
    /// Content digest, present only when the file had to be hashed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// `ready`, `copy`, or `read error`.
    pub status: String,
    /// Set to `shortcut` for `.lnk` files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Read failure text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Unique files and the best file of each content group.
    pub ready_files: Vec<FileResult>,
    /// Other distinct files sharing content with a ready file.
    pub copy_files: Vec<FileResult>,
    /// Files that could not be read.
    pub read_error_files: Vec<FileResult>,
}

/// Progress counters for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerProgress {
    /// Files classified so far.
    pub current: usize,
    /// Files in the batch.
    pub total: usize,
    /// Rounded percentage.
    pub percentage: u8,
}

impl WorkerProgress {
    fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

/// Error payload of an `Error` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerFailure {
    /// Human-readable message.
    pub message: String,
}

/// Message sent back by the worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum WorkerResponse {
    /// Throttled progress for a batch in flight.
    ProgressUpdate {
        /// Correlation id.
        batch_id: String,
        /// Counters.
        progress: WorkerProgress,
    },
    /// A batch finished.
    ProcessingComplete {
        /// Correlation id.
        batch_id: String,
        /// Classification.
        result: BatchResult,
    },
    /// A batch failed as a whole.
    Error {
        /// Correlation id.
        batch_id: String,
        /// Failure details.
        error: WorkerFailure,
    },
    /// Reply to a liveness probe.
    HealthCheckResponse {
        /// Correlation id.
        batch_id: String,
        /// Echo of the request timestamp.
        timestamp: i64,
        /// Worker time when answering (ms since epoch).
        response_time: i64,
        /// Always `healthy`.
        status: String,
    },
}

impl WorkerResponse {
    /// Correlation id of the response.
    #[must_use]
    pub fn batch_id(&self) -> &str {
        match self {
            WorkerResponse::ProgressUpdate { batch_id, .. }
            | WorkerResponse::ProcessingComplete { batch_id, .. }
            | WorkerResponse::Error { batch_id, .. }
            | WorkerResponse::HealthCheckResponse { batch_id, .. } => batch_id,
        }
    }
}

/// Errors talking to the worker thread.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    /// The worker thread could not be started.
    #[error("Failed to start hash worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker thread is gone.
    #[error("Hash worker disconnected")]
    Disconnected,

    /// No reply within the allowed time.
    #[error("Hash worker did not respond within {0:?}")]
    Timeout(Duration),
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct HashWorker {
    requests: Sender<WorkerRequest>,
    responses: Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
}

impl HashWorker {
    /// Start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the OS refuses to create the thread.
    pub fn spawn(config: WorkerConfig) -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("queuedupe-worker".to_string())
            .spawn(move || worker_loop(&config, &request_rx, &response_tx))
            .map_err(WorkerError::Spawn)?;

        log::debug!("Hash worker started");
        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            handle: Some(handle),
        })
    }

    /// Send a raw request.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the thread has exited.
    pub fn send(&self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.requests
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Receive the next raw response, blocking.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the thread has exited.
    pub fn recv(&self) -> Result<WorkerResponse, WorkerError> {
        self.responses.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// Process a batch and wait for its final response.
    ///
    /// Progress updates for the batch are handed to `on_progress`. The
    /// returned response is either `ProcessingComplete` or `Error`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the thread exits first.
    pub fn process_files(
        &self,
        files: Vec<WorkerFile>,
        batch_id: impl Into<String>,
        mut on_progress: impl FnMut(&WorkerProgress),
    ) -> Result<WorkerResponse, WorkerError> {
        let batch_id = batch_id.into();
        self.send(WorkerRequest::ProcessFiles {
            files,
            batch_id: batch_id.clone(),
        })?;

        loop {
            let response = self.recv()?;
            if response.batch_id() != batch_id {
                log::debug!("Ignoring response for batch {}", response.batch_id());
                continue;
            }
            match response {
                WorkerResponse::ProgressUpdate { progress, .. } => on_progress(&progress),
                WorkerResponse::ProcessingComplete { .. } | WorkerResponse::Error { .. } => {
                    return Ok(response)
                }
                WorkerResponse::HealthCheckResponse { .. } => {}
            }
        }
    }

    /// Probe the worker and wait up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Timeout`] if no reply arrives in time.
    pub fn health_check(
        &self,
        batch_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        let batch_id = batch_id.into();
        self.send(WorkerRequest::HealthCheck {
            batch_id: batch_id.clone(),
            timestamp: now_millis(),
        })?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response @ WorkerResponse::HealthCheckResponse { .. })
                    if response.batch_id() == batch_id =>
                {
                    return Ok(response)
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => return Err(WorkerError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(WorkerError::Disconnected),
            }
        }
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Hash worker thread panicked");
            }
            log::debug!("Hash worker stopped");
        }
    }
}

impl Drop for HashWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn now_millis() -> i64 {
    super::system_time_to_millis(std::time::SystemTime::now())
}

fn worker_loop(
    config: &WorkerConfig,
    requests: &Receiver<WorkerRequest>,
    responses: &Sender<WorkerResponse>,
) {
    let pool = HashPool::new(config.hasher, config.io_threads);

    while let Ok(request) = requests.recv() {
        let keep_running = match request {
            WorkerRequest::ProcessFiles { files, batch_id } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    process_batch(&files, &batch_id, &pool, config.progress_throttle, responses)
                }));
                let response = match outcome {
                    Ok(Ok(result)) => WorkerResponse::ProcessingComplete { batch_id, result },
                    Ok(Err(message)) => WorkerResponse::Error {
                        batch_id,
                        error: WorkerFailure { message },
                    },
                    Err(_) => WorkerResponse::Error {
                        batch_id,
                        error: WorkerFailure {
                            message: "worker panicked while processing batch".to_string(),
                        },
                    },
                };
                responses.send(response).is_ok()
            }
            WorkerRequest::HealthCheck {
                batch_id,
                timestamp,
            } => responses
                .send(WorkerResponse::HealthCheckResponse {
                    batch_id,
                    timestamp,
                    response_time: now_millis(),
                    status: "healthy".to_string(),
                })
                .is_ok(),
            WorkerRequest::Shutdown => false,
        };

        if !keep_running {
            break;
        }
    }
}

struct ProgressThrottle<'a> {
    batch_id: &'a str,
    total: usize,
    current: usize,
    interval: Duration,
    last_sent: Option<Instant>,
    responses: &'a Sender<WorkerResponse>,
}

impl ProgressThrottle<'_> {
    fn advance(&mut self, by: usize) {
        self.current += by;
        let due = self
            .last_sent
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            let _ = self.responses.send(WorkerResponse::ProgressUpdate {
                batch_id: self.batch_id.to_string(),
                progress: WorkerProgress::new(self.current, self.total),
            });
            self.last_sent = Some(Instant::now());
        }
    }
}

struct Entry<'a> {
    file: &'a WorkerFile,
    path: String,
    hash: Option<String>,
}

impl Entry<'_> {
    fn folder_len(&self) -> usize {
        self.path
            .rfind('/')
            .map_or(0, |idx| self.path[..=idx].chars().count())
    }

    fn same_file_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.file.source.name(),
            self.file.source.size(),
            self.file.source.last_modified(),
            self.path
        )
    }

    fn into_result(self, status: &str, error: Option<String>) -> FileResult {
        let name = self.file.source.name().to_string();
        let skip_reason =
            (path_utils::file_extension(&name) == "lnk").then(|| "shortcut".to_string());
        FileResult {
            id: self.file.id.clone(),
            original_index: self.file.original_index,
            path: self.path,
            metadata: FileMetadata {
                source_file_name: name,
                source_file_size: self.file.source.size(),
                last_modified: self.file.source.last_modified(),
            },
            hash: self.hash,
            status: status.to_string(),
            skip_reason,
            error,
        }
    }
}

/// Earliest mtime, longest folder, shortest name, name, selection order.
fn best_file_order(a: &Entry<'_>, b: &Entry<'_>) -> Ordering {
    a.file
        .source
        .last_modified()
        .cmp(&b.file.source.last_modified())
        .then_with(|| b.folder_len().cmp(&a.folder_len()))
        .then_with(|| {
            let name_len = |e: &Entry<'_>| e.file.source.name().chars().count();
            name_len(a).cmp(&name_len(b))
        })
        .then_with(|| path_utils::locale_cmp(a.file.source.name(), b.file.source.name()))
        .then_with(|| a.file.original_index.cmp(&b.file.original_index))
}

fn process_batch(
    files: &[WorkerFile],
    batch_id: &str,
    pool: &HashPool,
    throttle: Duration,
    responses: &Sender<WorkerResponse>,
) -> Result<BatchResult, String> {
    let mut seen_ids = HashSet::with_capacity(files.len());
    for file in files {
        if !seen_ids.insert(file.id.as_str()) {
            return Err(format!("duplicate file id in batch: {}", file.id));
        }
    }

    log::debug!("Worker batch {}: {} files", batch_id, files.len());
    let mut progress = ProgressThrottle {
        batch_id,
        total: files.len(),
        current: 0,
        interval: throttle,
        last_sent: None,
        responses,
    };

    // Size groups, kept in first-seen order.
    let mut size_order: Vec<u64> = Vec::new();
    let mut by_size: HashMap<u64, Vec<Entry<'_>>> = HashMap::new();
    for file in files {
        let size = file.source.size();
        let group = by_size.entry(size).or_insert_with(|| {
            size_order.push(size);
            Vec::new()
        });
        group.push(Entry {
            path: file.path(),
            file,
            hash: None,
        });
    }

    let mut result = BatchResult::default();
    let mut candidates: Vec<Entry<'_>> = Vec::new();
    for size in size_order {
        let Some(group) = by_size.remove(&size) else {
            continue;
        };
        if group.len() == 1 {
            for entry in group {
                result.ready_files.push(entry.into_result("ready", None));
            }
            progress.advance(1);
        } else {
            candidates.extend(group);
        }
    }

    // Hash in slices so progress can be reported between them.
    let chunk = (pool.io_threads() * 4).max(1);
    let mut hash_order: Vec<String> = Vec::new();
    let mut by_hash: HashMap<String, Vec<Entry<'_>>> = HashMap::new();
    let mut remaining = candidates.into_iter().peekable();
    while remaining.peek().is_some() {
        let slice: Vec<Entry<'_>> = remaining.by_ref().take(chunk).collect();
        let sources: Vec<SourceRef> = slice.iter().map(|e| e.file.source.clone()).collect();
        let hashes = pool.hash_many(&sources);
        let count = slice.len();

        for (mut entry, hashed) in slice.into_iter().zip(hashes) {
            match hashed {
                Ok(hash) => {
                    entry.hash = Some(hash.clone());
                    by_hash
                        .entry(hash.clone())
                        .or_insert_with(|| {
                            hash_order.push(hash);
                            Vec::new()
                        })
                        .push(entry);
                }
                Err(e) => {
                    log::warn!("Worker failed to hash {}: {}", entry.path, e);
                    result
                        .read_error_files
                        .push(entry.into_result("read error", Some(e.to_string())));
                }
            }
        }
        progress.advance(count);
    }

    for hash in hash_order {
        let Some(group) = by_hash.remove(&hash) else {
            continue;
        };

        // The same file picked twice collapses to its first selection.
        let mut keys = HashSet::new();
        let mut distinct: Vec<Entry<'_>> = group
            .into_iter()
            .filter(|entry| keys.insert(entry.same_file_key()))
            .collect();

        distinct.sort_by(best_file_order);
        let mut members = distinct.into_iter();
        if let Some(best) = members.next() {
            result.ready_files.push(best.into_result("ready", None));
        }
        for copy in members {
            result.copy_files.push(copy.into_result("copy", None));
        }
    }

    log::debug!(
        "Worker batch {} complete: {} ready, {} copies, {} read errors",
        batch_id,
        result.ready_files.len(),
        result.copy_files.len(),
        result.read_error_files.len()
    );
    Ok(result)
}
