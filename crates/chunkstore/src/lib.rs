//! Chunked, content-addressed file storage with incremental versioned updates.
//!
//! Files are cut into fixed-size chunks. Each chunk is stored once under an id
//! derived from its SHA-256 digest, and a JSON manifest per file lists the
//! chunks of its current version. Re-uploading a file re-chunks it, compares the
//! new chunk list against the old one position by position, and only writes
//! chunks whose content is not already stored.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::io::Cursor;
//! use chunkstore::{StorageConfig, VersionedFileStore};
//!
//! let config = StorageConfig::with_base_path("/srv/chunkdrive");
//! let store = VersionedFileStore::open(&config).unwrap();
//!
//! let manifest = store
//!     .create("notes.txt", "text/plain", &mut Cursor::new(b"first draft"))
//!     .unwrap();
//!
//! let report = store
//!     .update_with_report(&manifest.id, &mut Cursor::new(b"second draft"))
//!     .unwrap();
//! println!("v{} changed {} chunks", report.manifest.version, report.diff.changed.len());
//!
//! let mut content = Vec::new();
//! store.read(&manifest.id, &mut content).unwrap();
//! ```
//!
//! # Layers
//!
//! - [`ChunkStore`]: segmentation, persistence and reconstruction of chunks
//! - [`diff`]: positional comparison of two chunk lists
//! - [`VersionedFileStore`]: create / update / read / list / delete of files
//! - [`backend`]: the chunk and manifest namespaces, on disk or in memory
//!
//! # Concurrency
//!
//! Chunk writes are write-once and safe to race. Manifest updates are not
//! coordinated: concurrent updates of one file id race, and the last writer's
//! manifest wins.

pub mod backend;
pub mod chunks;
pub mod config;
pub mod diff;
pub mod error;
pub mod files;
pub mod id;
pub mod model;

// Re-exports for convenience
pub use backend::{ChunkBackend, FsChunkBackend, FsManifestBackend, ManifestBackend, MemoryBackend};
pub use chunks::ChunkStore;
pub use config::{StorageConfig, DEFAULT_CHUNK_SIZE};
pub use diff::{diff_report, DiffReport};
pub use error::{ErrorKind, Missing, Result, StoreError};
pub use files::{UpdateReport, VersionedFileStore};
pub use id::{ChunkHash, ChunkId, FileId};
pub use model::{Chunk, FileManifest};
