//! Content and metadata digests.
//!
//! # Overview
//!
//! [`Hasher`] computes two kinds of digest:
//!
//! - **Content digest**: streamed over the full file bytes. XXH3 (64-bit,
//!   16 hex characters) by default, BLAKE3 truncated to 128 bits (32 hex
//!   characters) when configured. A queue uses one algorithm for every row.
//! - **Metadata digest**: XXH3 over `tenant|mtime|name|extension`. It never
//!   reads the file.
//!
//! [`HashPool`] runs content hashing for a batch of sources on a bounded
//! rayon pool so the caller's thread only applies results.
//!
//! # Example
//!
//! ```
//! use queuedupe::scanner::{Hasher, MemoryFile};
//!
//! let hasher = Hasher::new();
//! let a = MemoryFile::new("a.pdf", b"same bytes".to_vec(), 1);
//! let b = MemoryFile::new("b.pdf", b"same bytes".to_vec(), 2);
//!
//! assert_eq!(hasher.content_hash(&a).unwrap(), hasher.content_hash(&b).unwrap());
//! assert_ne!(
//!     Hasher::metadata_hash("firm-1", 1, "a.pdf", "pdf"),
//!     Hasher::metadata_hash("firm-1", 2, "a.pdf", "pdf"),
//! );
//! ```

use std::hash::Hasher as _;
use std::io::Read;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use twox_hash::xxh3;

use super::{FileSource, HashError, SourceRef};

/// Read buffer size for streaming digests (64 KiB).
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Content digest algorithm.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// XXH3, 64-bit output.
    #[default]
    Xxh3,
    /// BLAKE3, truncated to 128 bits.
    Blake3,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Xxh3 => write!(f, "xxh3"),
            HashAlgorithm::Blake3 => write!(f, "blake3"),
        }
    }
}

enum DigestState {
    Xxh3(xxh3::Hash64),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Xxh3 => Self::Xxh3(xxh3::Hash64::with_seed(0)),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Xxh3(state) => state.write(bytes),
            Self::Blake3(state) => {
                state.update(bytes);
            }
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Self::Xxh3(state) => format!("{:016x}", state.finish()),
            Self::Blake3(state) => {
                let hex = state.finalize().to_hex();
                hex.as_str()[..32].to_string()
            }
        }
    }
}

/// Digest calculator.
///
/// Cheap to clone; holds no open files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    buffer_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher using XXH3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            algorithm: HashAlgorithm::Xxh3,
            buffer_size: BUFFER_SIZE,
        }
    }

    /// Create a hasher using the given content algorithm.
    #[must_use]
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            ..Self::new()
        }
    }

    /// Set the read buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// The content algorithm in use.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest an in-memory byte slice.
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        let mut state = DigestState::new(self.algorithm);
        state.update(bytes);
        state.finish_hex()
    }

    /// Stream a source through the content digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the source cannot be opened or read. The
    /// error names the source so it can be shown on the row.
    pub fn content_hash(&self, source: &dyn FileSource) -> Result<String, HashError> {
        let path = source.display_path();
        let mut reader = source
            .open()
            .map_err(|e| HashError::from_io(path, e))?;

        let mut state = DigestState::new(self.algorithm);
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            state.update(&buffer[..n]);
        }

        log::trace!("Content hash computed: {}", path);
        Ok(state.finish_hex())
    }

    /// Digest of the identifying metadata of a file.
    ///
    /// Independent of the content algorithm so metadata keys stay comparable
    /// across queues.
    ///
    /// # Arguments
    ///
    /// * `tenant_id` - Firm/tenant the upload belongs to
    /// * `modified_ms` - Last modification time in milliseconds
    /// * `name` - File name including extension
    /// * `extension` - Lower-cased extension without the dot
    #[must_use]
    pub fn metadata_hash(tenant_id: &str, modified_ms: i64, name: &str, extension: &str) -> String {
        let key = format!("{tenant_id}|{modified_ms}|{name}|{extension}");
        let mut state = xxh3::Hash64::with_seed(0);
        state.write(key.as_bytes());
        format!("{:016x}", state.finish())
    }
}

/// Bounded pool for off-thread content hashing.
///
/// Limits I/O parallelism to `io_threads` to prevent disk thrashing. Results
/// come back in input order and are applied by the caller.
pub struct HashPool {
    hasher: Hasher,
    pool: Option<rayon::ThreadPool>,
    io_threads: usize,
}

impl std::fmt::Debug for HashPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashPool")
            .field("hasher", &self.hasher)
            .field("io_threads", &self.io_threads)
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

impl HashPool {
    /// Create a pool with `io_threads` workers.
    ///
    /// Falls back to the global rayon pool if a dedicated one cannot be built.
    #[must_use]
    pub fn new(hasher: Hasher, io_threads: usize) -> Self {
        let io_threads = io_threads.max(1);
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(io_threads)
            .thread_name(|i| format!("queuedupe-hash-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!(
                    "Failed to create hashing pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                None
            }
        };
        Self {
            hasher,
            pool,
            io_threads,
        }
    }

    /// The hasher used by this pool.
    #[must_use]
    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    /// Number of I/O threads requested.
    #[must_use]
    pub fn io_threads(&self) -> usize {
        self.io_threads
    }

    /// Hash every source, preserving input order.
    #[must_use]
    pub fn hash_many(&self, sources: &[SourceRef]) -> Vec<Result<String, HashError>> {
        if sources.is_empty() {
            return Vec::new();
        }

        let hasher = self.hasher;
        let work = || {
            sources
                .par_iter()
                .map(|source| hasher.content_hash(source.as_ref()))
                .collect::<Vec<_>>()
        };

        match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }
}
