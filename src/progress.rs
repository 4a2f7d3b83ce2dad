//! Progress reporting using indicatif.
//!
//! The queue reports three phases through [`ProgressCallback`]:
//!
//! - `initial`: the Phase 1 batch painted before anything else
//! - `bulk`: the remaining Phase 2 batches
//! - `verify`: confirmation of tentative rows
//!
//! The CLI additionally reports `walking` while it collects files.
//! [`Progress`] draws one bar per phase on stderr.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for ingestion and verification phases.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (`initial`, `bulk`, `verify`)
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called as items are processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Items processed so far in this phase
    /// * `path` - Item being processed, or empty for batch updates
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

struct ActiveBar {
    phase: String,
    bar: ProgressBar,
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ActiveBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter. `quiet` hides every bar.
    ///
    /// # Examples
    ///
    /// ```
    /// use queuedupe::progress::{Progress, ProgressCallback};
    ///
    /// let progress = Progress::new(true);
    /// progress.on_phase_start("initial", 200);
    /// progress.on_phase_end("initial");
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            quiet,
        }
    }

    fn style_for(phase: &str) -> ProgressStyle {
        let template = match phase {
            "walking" => "{spinner:.green} {msg} [{elapsed_precise}] {pos} files",
            "verify" => "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg} {per_sec} (ETA: {eta})",
            _ => "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        };
        let style = ProgressStyle::with_template(template);
        if phase == "walking" {
            style
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        } else {
            style
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█>-")
        }
    }

    fn label_for(phase: &str) -> &'static str {
        match phase {
            "walking" => "Collecting files",
            "initial" => "Initial batch",
            "bulk" => "Queueing",
            "verify" => "Verifying",
            _ => "Working",
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let bar = if phase == "walking" {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            self.multi.add(ProgressBar::new(total as u64))
        };
        bar.set_style(Self::style_for(phase));
        bar.set_message(Self::label_for(phase));

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.bar.finish_and_clear();
        }
        *active = Some(ActiveBar {
            phase: phase.to_string(),
            bar,
        });
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = active.as_ref() {
            active.bar.set_position(current as u64);
            if !path.is_empty() {
                active.bar.set_message(truncate_path(path, 30));
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|a| a.phase == phase) {
            if let Some(finished) = active.take() {
                finished
                    .bar
                    .finish_with_message(format!("{} complete", Self::label_for(phase)));
            }
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = active.as_ref() {
            active.bar.set_message(message.to_string());
        }
    }
}

/// Shorten a path for display, keeping the file name.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let count = name.chars().count();
    if count + 4 > max_len {
        let tail: String = name.chars().skip(count.saturating_sub(max_len - 3)).collect();
        return format!("...{tail}");
    }
    format!(".../{name}")
}
