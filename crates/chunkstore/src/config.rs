//! Storage configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `CHUNKDRIVE_STORAGE_PATH`: Base path for storage
//! - `CHUNKDRIVE_CHUNK_SIZE`: Chunk size in bytes (default 1 MiB)
//! - `CHUNKDRIVE_READONLY`: Set to "true" for read-only mode
//!
//! Default path: `~/.chunkdrive/storage`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Configuration for the chunk and manifest namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base path for storage.
    /// Chunks live in `{base_path}/chunks/`, manifests in `{base_path}/files/`.
    pub base_path: PathBuf,

    /// Fixed chunk size in bytes. Must be non-zero.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Read-only mode - every write fails.
    #[serde(default)]
    pub read_only: bool,

    /// Re-hash every chunk as it is read back during reconstruction.
    #[serde(default)]
    pub verify_on_read: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_only: false,
            verify_on_read: false,
        }
    }
}

/// Get the default storage path (~/.chunkdrive/storage).
fn default_storage_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".chunkdrive").join("storage"))
        .unwrap_or_else(|| PathBuf::from(".chunkdrive/storage"))
}

impl StorageConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let base_path = env::var("CHUNKDRIVE_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_storage_path());

        let chunk_size = match env::var("CHUNKDRIVE_CHUNK_SIZE") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid CHUNKDRIVE_CHUNK_SIZE: {raw:?}"))?,
            Err(_) => DEFAULT_CHUNK_SIZE,
        };

        let read_only = env::var("CHUNKDRIVE_READONLY")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let config = Self {
            base_path,
            chunk_size,
            read_only,
            verify_on_read: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[storage]` section:
    /// ```toml
    /// [storage]
    /// base_path = "/srv/chunkdrive"
    /// chunk_size = 1048576
    /// read_only = false
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        if let Some(section) = table.get("storage") {
            let config: StorageConfig = section
                .clone()
                .try_into()
                .context("failed to parse [storage] section")?;
            config.validate()?;
            Ok(config)
        } else {
            Self::from_env()
        }
    }

    /// Create a config with a specific base path.
    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            ..Self::default()
        }
    }

    /// Create a read-only config with a specific base path.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            read_only: true,
            ..Self::default()
        }
    }

    /// Builder: override the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        Ok(())
    }

    /// Get the chunks directory path.
    pub fn chunks_dir(&self) -> PathBuf {
        self.base_path.join("chunks")
    }

    /// Get the file manifest directory path.
    pub fn files_dir(&self) -> PathBuf {
        self.base_path.join("files")
    }
}
