//! In-memory namespaces, for tests and embedding.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{ChunkBackend, ManifestBackend};
use crate::error::Result;
use crate::id::{ChunkId, FileId};

/// Both namespaces held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    chunks: RwLock<HashMap<ChunkId, Vec<u8>>>,
    manifests: RwLock<HashMap<FileId, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a stored chunk, simulating a lost blob.
    pub fn evict_chunk(&self, id: &ChunkId) -> bool {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Overwrite a stored chunk's bytes, simulating on-disk corruption.
    pub fn corrupt_chunk(&self, id: &ChunkId, data: Vec<u8>) {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), data);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ChunkBackend for MemoryBackend {
    fn put(&self, id: &ChunkId, data: &[u8]) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        if chunks.contains_key(id) {
            return Ok(false);
        }
        chunks.insert(id.clone(), data.to_vec());
        Ok(true)
    }

    fn get(&self, id: &ChunkId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn contains(&self, id: &ChunkId) -> bool {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    fn ids(&self) -> Result<Vec<ChunkId>> {
        Ok(self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

impl ManifestBackend for MemoryBackend {
    fn load(&self, id: &FileId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .manifests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn store(&self, id: &FileId, data: &[u8]) -> Result<()> {
        self.manifests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*id, data.to_vec());
        Ok(())
    }

    fn remove(&self, id: &FileId) -> Result<bool> {
        Ok(self
            .manifests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some())
    }

    fn ids(&self) -> Result<Vec<FileId>> {
        Ok(self
            .manifests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect())
    }
}
