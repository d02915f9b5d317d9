//! Storage namespaces.
//!
//! The engine talks to two logical namespaces through these traits:
//! - a chunk namespace, keyed by content-derived [`ChunkId`], holding raw bytes
//! - a manifest namespace, keyed by [`FileId`], holding one serialized record per file
//!
//! Handles are constructed explicitly and injected into the engine. Alternative
//! implementations (in-memory for tests, remote object stores) plug in here.

mod fs;
mod memory;

pub use fs::{FsChunkBackend, FsManifestBackend};
pub use memory::MemoryBackend;

use std::sync::Arc;

use crate::error::Result;
use crate::id::{ChunkId, FileId};

/// Raw chunk namespace. Blobs are write-once by content identity.
pub trait ChunkBackend: Send + Sync {
    /// Store `data` under `id` unless a blob with that id already exists.
    ///
    /// Returns `true` if bytes were written, `false` if the write was skipped.
    fn put(&self, id: &ChunkId, data: &[u8]) -> Result<bool>;

    /// Fetch the bytes stored under `id`, or `Ok(None)` if absent.
    fn get(&self, id: &ChunkId) -> Result<Option<Vec<u8>>>;

    /// Check if a chunk exists without reading it.
    fn contains(&self, id: &ChunkId) -> bool;

    /// Enumerate every stored chunk id.
    fn ids(&self) -> Result<Vec<ChunkId>>;
}

/// Manifest namespace. Records are overwritten in place.
pub trait ManifestBackend: Send + Sync {
    /// Fetch the serialized manifest for `id`, or `Ok(None)` if absent.
    fn load(&self, id: &FileId) -> Result<Option<Vec<u8>>>;

    /// Replace the record for `id` with `data`.
    fn store(&self, id: &FileId, data: &[u8]) -> Result<()>;

    /// Remove the record for `id`. Returns `false` if there was none.
    fn remove(&self, id: &FileId) -> Result<bool>;

    /// Enumerate stored file ids in backend order (not sorted).
    fn ids(&self) -> Result<Vec<FileId>>;
}

impl<T: ChunkBackend + ?Sized> ChunkBackend for Arc<T> {
    fn put(&self, id: &ChunkId, data: &[u8]) -> Result<bool> {
        (**self).put(id, data)
    }

    fn get(&self, id: &ChunkId) -> Result<Option<Vec<u8>>> {
        (**self).get(id)
    }

    fn contains(&self, id: &ChunkId) -> bool {
        (**self).contains(id)
    }

    fn ids(&self) -> Result<Vec<ChunkId>> {
        ChunkBackend::ids(&**self)
    }
}

impl<T: ManifestBackend + ?Sized> ManifestBackend for Arc<T> {
    fn load(&self, id: &FileId) -> Result<Option<Vec<u8>>> {
        (**self).load(id)
    }

    fn store(&self, id: &FileId, data: &[u8]) -> Result<()> {
        (**self).store(id, data)
    }

    fn remove(&self, id: &FileId) -> Result<bool> {
        (**self).remove(id)
    }

    fn ids(&self) -> Result<Vec<FileId>> {
        ManifestBackend::ids(&**self)
    }
}
