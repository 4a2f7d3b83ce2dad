//! Automatic verification after ingestion settles.
//!
//! [`AutoStart`] watches the shared [`QueueContext`] and fires once per
//! completed ingestion call, after a debounce, and never while a call is
//! still in flight. [`spawn_auto_verifier`] drives it from a background
//! thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{VerificationOutcome, Verifier};
use crate::queue::{QueueContext, UploadQueue};

/// Default debounce between an addition completing and verification starting.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Debounced trigger for verification passes.
#[derive(Debug)]
pub struct AutoStart {
    context: Arc<QueueContext>,
    debounce: Duration,
    seen_generation: u64,
    armed: Option<(u64, Instant)>,
}

impl AutoStart {
    /// Watch `context`. Additions completed before this call are ignored.
    #[must_use]
    pub fn new(context: Arc<QueueContext>, debounce: Duration) -> Self {
        let seen_generation = context.completion_generation();
        Self {
            context,
            debounce,
            seen_generation,
            armed: None,
        }
    }

    /// Whether a pass should start now.
    ///
    /// A newer completion restarts the debounce.
    pub fn poll(&mut self, now: Instant) -> bool {
        let generation = self.context.completion_generation();
        if generation == self.seen_generation {
            return false;
        }

        if self.armed.map_or(true, |(armed, _)| armed != generation) {
            self.armed = Some((generation, now));
        }
        let Some((_, armed_at)) = self.armed else {
            return false;
        };

        if self.context.is_addition_complete()
            && now.saturating_duration_since(armed_at) >= self.debounce
        {
            self.seen_generation = generation;
            self.armed = None;
            return true;
        }
        false
    }
}

/// Run verification in the background whenever ingestion settles.
///
/// The thread exits once `stop` is set.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_auto_verifier(
    queue: Arc<Mutex<UploadQueue>>,
    verifier: Arc<Verifier>,
    context: Arc<QueueContext>,
    poll_interval: Duration,
    debounce: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("queuedupe-verifier".to_string())
        .spawn(move || {
            let mut trigger = AutoStart::new(context, debounce);
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(poll_interval);
                if !trigger.poll(Instant::now()) {
                    continue;
                }
                if verifier.is_running() {
                    verifier.request_follow_up();
                    continue;
                }

                let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                match verifier.run(&mut queue) {
                    VerificationOutcome::Completed(summary) => {
                        log::debug!("Background verification finished: {:?}", summary);
                    }
                    VerificationOutcome::NothingToVerify => {
                        log::trace!("Background verification: nothing to verify");
                    }
                    VerificationOutcome::AlreadyRunning => {}
                }
            }
            log::debug!("Verifier thread stopped");
        })
}
