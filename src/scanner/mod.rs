//! Source handles, path helpers, and content hashing.
//!
//! This module provides functionality for:
//! - Abstract file handles ([`FileSource`]) backed by disk or memory
//! - Content and metadata hashing (XXH3 by default, BLAKE3 selectable)
//! - Folder-path extraction and unsupported-type detection
//! - Directory collection for the CLI driver
//! - The message-passing hash worker
//!
//! # Architecture
//!
//! - [`hasher`]: streaming digests and the bounded hashing pool
//! - [`path_utils`]: folder paths, extensions, Unicode normalization
//! - [`walker`]: turns directory trees into [`DiskFile`] handles
//! - [`worker`]: `PROCESS_FILES` / `HEALTH_CHECK` protocol on its own thread
//!
//! # Example
//!
//! ```
//! use queuedupe::scanner::{FileSource, MemoryFile};
//!
//! let file = MemoryFile::new("brief.pdf", b"%PDF-1.7".to_vec(), 1_700_000_000_000)
//!     .with_relative_path("matters/smith/brief.pdf");
//! assert_eq!(file.size(), 8);
//! assert_eq!(file.relative_path(), "matters/smith/brief.pdf");
//! ```

pub mod hasher;
pub mod path_utils;
pub mod walker;
pub mod worker;

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use hasher::{HashAlgorithm, HashPool, Hasher};
pub use walker::{collect_sources, WalkerConfig};

/// A file considered for upload.
///
/// Metadata is available without I/O; bytes are only read through
/// [`FileSource::open`], which the hash layers call lazily.
pub trait FileSource: Send + Sync + fmt::Debug {
    /// File name including extension.
    fn name(&self) -> &str;

    /// Size in bytes.
    fn size(&self) -> u64;

    /// Last modification time in milliseconds since the Unix epoch.
    fn last_modified(&self) -> i64;

    /// Path relative to the dropped root, using `/` separators.
    ///
    /// Empty when the file was dropped on its own.
    fn relative_path(&self) -> &str;

    /// Open the file for reading.
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;

    /// Human-readable location used in logs and error messages.
    fn display_path(&self) -> &str {
        if self.relative_path().is_empty() {
            self.name()
        } else {
            self.relative_path()
        }
    }
}

/// Shared handle to a [`FileSource`].
pub type SourceRef = Arc<dyn FileSource>;

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
    relative_path: String,
    size: u64,
    modified_ms: i64,
}

impl DiskFile {
    /// Build a handle from filesystem metadata.
    ///
    /// # Arguments
    ///
    /// * `path` - Absolute or working-directory relative path to the file
    /// * `root` - Directory the file was collected from; the relative path is
    ///   computed against it
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the metadata cannot be read or the path is not
    /// a regular file.
    pub fn from_path(path: &Path, root: &Path) -> Result<Self, ScanError> {
        let metadata = std::fs::metadata(path).map_err(|e| ScanError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(ScanError::NotAFile(path.to_path_buf()));
        }

        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let name = path
            .file_name()
            .map(|n| path_utils::normalize_path_str(&n.to_string_lossy()))
            .unwrap_or_default();

        // Keep the root's own name so files dropped as a folder carry it,
        // matching how a browser reports webkitRelativePath.
        let base = root.parent().unwrap_or(root);
        let relative = path.strip_prefix(base).unwrap_or(path);
        let relative_path = path_utils::to_slash_path(relative);

        Ok(Self {
            path: path.to_path_buf(),
            name,
            relative_path,
            size: metadata.len(),
            modified_ms: system_time_to_millis(modified),
        })
    }

    /// Path on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn last_modified(&self) -> i64 {
        self.modified_ms
    }

    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// An in-memory file, used by tests, benchmarks, and embedders that already
/// hold the bytes.
///
/// Every call to [`FileSource::open`] is counted, which makes it possible to
/// assert that a layer never read a file's content.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    relative_path: String,
    bytes: Arc<Vec<u8>>,
    modified_ms: i64,
    fail_reads: bool,
    opens: Arc<AtomicUsize>,
}

impl MemoryFile {
    /// Create a new in-memory file.
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, modified_ms: i64) -> Self {
        Self {
            name: name.into(),
            relative_path: String::new(),
            bytes: Arc::new(bytes),
            modified_ms,
            fail_reads: false,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the relative path the file was dropped with.
    #[must_use]
    pub fn with_relative_path(mut self, path: impl Into<String>) -> Self {
        self.relative_path = path.into();
        self
    }

    /// Make every read fail with a permission error.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Number of times the content has been opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Wrap in a shared handle.
    #[must_use]
    pub fn into_source(self) -> SourceRef {
        Arc::new(self)
    }
}

impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn last_modified(&self) -> i64 {
        self.modified_ms
    }

    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read access denied",
            ));
        }
        Ok(Box::new(Cursor::new(self.bytes.as_slice())))
    }
}

/// Convert a [`SystemTime`] to milliseconds since the Unix epoch.
///
/// Times before the epoch map to negative values.
#[must_use]
pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

/// Errors that can occur while collecting sources.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The path exists but is not a regular file.
    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Errors that can occur during content hashing.
///
/// The queue maps every variant to the `read error` status and keeps the
/// message on the row.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The file disappeared before it could be read.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File the error occurred on
        path: String,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::Io {
                path: path.to_string(),
                source: Arc::new(err),
            },
        }
    }
}
