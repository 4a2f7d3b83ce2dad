//! Application configuration.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform config directory, or `--config PATH`
//! 3. `QUEUEDUPE_*` environment variables (`__` separates nested keys)
//! 4. CLI flags, applied by the binary on top of the extracted value

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::{DocumentCache, DocumentLoader, DEFAULT_CACHE_SIZE};
use crate::duplicates::IngestMode;
use crate::queue::{QueueConfig, DEFAULT_BATCH_SIZE, DEFAULT_PHASE1_SIZE};
use crate::scanner::path_utils::DEFAULT_UNSUPPORTED_EXTENSIONS;
use crate::scanner::HashAlgorithm;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "QUEUEDUPE_";

/// Errors while loading or saving configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be parsed or extracted.
    #[error("Invalid configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// The platform config directory could not be determined.
    #[error("Failed to determine project directories")]
    NoConfigDir,

    /// Writing the config file failed.
    #[error("I/O error writing {path}: {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
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
    /// How often the auto-verifier checks for settled ingestion.
    pub verify_poll_interval_ms: u64,
    /// Quiet period after an addition before verification starts.
    pub verify_debounce_ms: u64,
    /// Duration handed to the removal animation hook.
    pub removal_animation_ms: u64,
    /// Minimum interval between worker progress updates.
    pub progress_throttle_ms: u64,
    /// Documents kept by the preview cache.
    pub document_cache_size: usize,
}

impl Default for Config {
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
            verify_poll_interval_ms: 100,
            verify_debounce_ms: 100,
            removal_animation_ms: 500,
            progress_throttle_ms: 1000,
            document_cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults on any error.
    ///
    /// `path` overrides the platform config file.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from every layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Extract`] when a layer holds invalid values.
    pub fn try_load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path().ok(),
        };
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            log::debug!("Reading config from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract a config from an assembled figment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Extract`] when a value has the wrong type.
    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Extract(Box::new(e)))
    }

    /// Write the configuration to the platform config file.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be determined or written.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write the configuration as TOML to `path`.
    ///
    /// # Errors
    ///
    /// Fails on serialization or I/O errors.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default platform config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] when no home directory is known.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("com", "queuedupe", "queuedupe").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Queue settings from this config.
    #[must_use]
    pub fn to_queue_config(&self) -> QueueConfig {
        let mut queue = QueueConfig::default()
            .with_phase1_size(self.phase1_size)
            .with_batch_size(self.batch_size)
            .with_unsupported_extensions(self.unsupported_extensions.clone())
            .with_io_threads(self.io_threads)
            .with_hash_algorithm(self.hash_algorithm)
            .with_ingest_mode(self.ingest_mode);
        if let Some(tenant) = &self.tenant_id {
            queue = queue.with_tenant_id(tenant.clone());
        }
        queue
    }

    /// A document cache sized by `document_cache_size`.
    #[must_use]
    pub fn document_cache<L: DocumentLoader>(&self, loader: L) -> DocumentCache<L> {
        DocumentCache::with_max_size(loader, self.document_cache_size)
    }

    /// Auto-verifier poll interval.
    #[must_use]
    pub fn verify_poll_interval(&self) -> Duration {
        Duration::from_millis(self.verify_poll_interval_ms.max(1))
    }

    /// Auto-verifier debounce.
    #[must_use]
    pub fn verify_debounce(&self) -> Duration {
        Duration::from_millis(self.verify_debounce_ms)
    }

    /// Removal animation duration.
    #[must_use]
    pub fn removal_animation(&self) -> Duration {
        Duration::from_millis(self.removal_animation_ms)
    }

    /// Worker progress throttle.
    #[must_use]
    pub fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.progress_throttle_ms)
    }
}
