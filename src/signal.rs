//! Ctrl+C handling.
//!
//! An interrupt sets the queue's cancel flag, so an ingestion call stops at
//! its next batch boundary and keeps what it already applied. The queue
//! clears the cancel flag once it has honoured it, so the handler also
//! records that an interrupt happened, for the exit code.
//!
//! # Usage
//!
//! ```rust,no_run
//! use queuedupe::queue::{QueueConfig, UploadQueue};
//! use queuedupe::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let queue = UploadQueue::new(QueueConfig::default()).with_cancel_flag(handler.cancel_flag());
//! // ... ingest ...
//! if handler.was_interrupted() {
//!     std::process::exit(130);
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Exit code for SIGINT (128 + 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation state.
#[derive(Debug, Clone, Default)]
pub struct CancelHandler {
    cancel: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
}

impl CancelHandler {
    /// Create a handler with nothing requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag to hand to [`UploadQueue::with_cancel_flag`](crate::queue::UploadQueue::with_cancel_flag).
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Request cancellation as if Ctrl+C was pressed.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt was received, even if the queue already consumed it.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Forget any interrupt.
    pub fn reset(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<CancelHandler> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Install the process-wide Ctrl+C handler.
///
/// The first call registers with the OS; later calls reset and return the
/// same handler, so `run_app` can be invoked repeatedly from tests.
///
/// # Errors
///
/// Returns [`SignalError`] if the OS handler cannot be registered.
pub fn install_handler() -> Result<CancelHandler, SignalError> {
    // Concurrent first calls must not both register with the OS.
    let _install = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = CancelHandler::new();
    let hook = handler.clone();
    ctrlc::set_handler(move || {
        hook.interrupt();
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing current batch...");
        let _ = std::io::stderr().flush();
        log::info!("Cancellation requested");
    })?;

    Ok(GLOBAL_HANDLER.get_or_init(|| handler).clone())
}
