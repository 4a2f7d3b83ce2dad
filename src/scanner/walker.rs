//! Collects on-disk files into queue sources.
//!
//! # Overview
//!
//! The CLI accepts any mix of files and directories, the way a user drags a
//! selection onto the upload area. Directories are walked with [`walkdir`];
//! every regular file becomes a [`DiskFile`] whose relative path starts at
//! the dropped directory's name.
//!
//! # Example
//!
//! ```no_run
//! use queuedupe::scanner::{collect_sources, WalkerConfig};
//! use std::path::PathBuf;
//!
//! let (sources, errors) = collect_sources(&[PathBuf::from("./matters")], &WalkerConfig::default());
//! println!("{} files, {} unreadable", sources.len(), errors.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use super::{DiskFile, ScanError, SourceRef};

/// Configuration for collecting sources.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Optional cancellation flag checked between entries.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl WalkerConfig {
    /// Set the cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// Collect sources from files and directories.
///
/// Unreadable entries are reported in the error list and skipped; the
/// remaining files are still returned.
///
/// # Arguments
///
/// * `paths` - Files and directories selected by the user
/// * `config` - Traversal options
#[must_use]
pub fn collect_sources(paths: &[PathBuf], config: &WalkerConfig) -> (Vec<SourceRef>, Vec<ScanError>) {
    let mut sources: Vec<SourceRef> = Vec::new();
    let mut errors = Vec::new();

    for root in paths {
        if config.is_cancelled() {
            log::debug!("Collection cancelled before {}", root.display());
            break;
        }

        if root.is_file() {
            // A lone file is its own root, so its relative path is its name.
            match DiskFile::from_path(root, root) {
                Ok(file) => sources.push(Arc::new(file)),
                Err(e) => errors.push(e),
            }
            continue;
        }

        if !root.exists() {
            errors.push(ScanError::NotFound(root.clone()));
            continue;
        }

        let walker = WalkDir::new(root)
            .follow_links(config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !config.skip_hidden
                    || !is_hidden(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            if config.is_cancelled() {
                log::debug!("Collection cancelled inside {}", root.display());
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    log::warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    errors.push(ScanError::Io {
                        path,
                        source: e.into(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() && !(config.follow_symlinks && entry.path().is_file()) {
                continue;
            }

            match DiskFile::from_path(entry.path(), root) {
                Ok(file) => {
                    log::trace!("Collected {}", entry.path().display());
                    sources.push(Arc::new(file));
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", entry.path().display(), e);
                    errors.push(e);
                }
            }
        }
    }

    log::debug!(
        "Collected {} sources ({} errors) from {} paths",
        sources.len(),
        errors.len(),
        paths.len()
    );
    (sources, errors)
}
