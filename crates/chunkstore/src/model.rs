//! Chunks and file manifests.
//!
//! A [`FileManifest`] is the authoritative description of a file's current
//! version. It references chunks by id and never owns their bytes. Manifests
//! are persisted as JSON, one record per file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::id::{ChunkHash, ChunkId, FileId};

/// One fixed-size (or final, shorter) segment of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Content-derived id, `chunk_<hash>`.
    pub id: ChunkId,
    /// SHA-256 of the chunk's bytes.
    pub hash: ChunkHash,
    /// Byte length. Only the final chunk of a stream may be shorter than the chunk size.
    pub size: u64,
    /// Zero-based position in the file at the time it was produced.
    pub index: u64,
    /// Byte offset of the first byte within the file.
    pub offset: u64,
}

impl Chunk {
    /// Describe `data` as the chunk at `index`, starting at `offset`.
    pub fn describe(data: &[u8], index: u64, offset: u64) -> Self {
        let hash = ChunkHash::from_data(data);
        Self {
            id: ChunkId::from_hash(&hash),
            hash,
            size: data.len() as u64,
            index,
            offset,
        }
    }
}

/// Current metadata of one logical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub id: FileId,
    pub name: String,
    pub content_type: String,
    /// Always the sum of chunk sizes.
    pub size: u64,
    pub chunks: Vec<Chunk>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1, bumped by exactly one on every content update.
    pub version: u64,
}

impl FileManifest {
    /// Build the first version of a file.
    pub fn first_version(
        id: FileId,
        name: impl Into<String>,
        content_type: impl Into<String>,
        chunks: Vec<Chunk>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            content_type: content_type.into(),
            size: Self::total_size(&chunks),
            chunks,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn total_size(chunks: &[Chunk]) -> u64 {
        chunks.iter().map(|c| c.size).sum()
    }

    /// Replace the chunk list with a new segmentation and bump the version.
    pub fn advance(&mut self, chunks: Vec<Chunk>) {
        self.size = Self::total_size(&chunks);
        self.chunks = chunks;
        self.version += 1;
        self.touch();
    }

    /// Set `updated_at` to now, never moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Check the layout invariants of a loaded or freshly built manifest.
    ///
    /// The first chunk's size is taken as the chunk size the file was written
    /// with; every chunk but the last must match it.
    pub fn validate_layout(&self) -> Result<()> {
        let invalid =
            |msg: String| Err(StoreError::Validation(format!("manifest {}: {msg}", self.id)));

        if self.version < 1 {
            return invalid("version must be at least 1".into());
        }
        if self.updated_at < self.created_at {
            return invalid("updated_at precedes created_at".into());
        }

        let chunk_size = self.chunks.first().map_or(0, |c| c.size);
        let mut offset = 0u64;
        let last = self.chunks.len().saturating_sub(1);
        for (position, chunk) in self.chunks.iter().enumerate() {
            if chunk.id != ChunkId::from_hash(&chunk.hash) {
                return invalid(format!("chunk {position} id {} does not match its hash", chunk.id));
            }
            if chunk.index != position as u64 {
                return invalid(format!("chunk {position} has index {}", chunk.index));
            }
            if chunk.offset != offset {
                return invalid(format!(
                    "chunk {position} has offset {}, expected {offset}",
                    chunk.offset
                ));
            }
            if chunk.size == 0 || chunk.size > chunk_size {
                return invalid(format!("chunk {position} has size {}", chunk.size));
            }
            if position != last && chunk.size != chunk_size {
                return invalid(format!("non-final chunk {position} is short"));
            }
            offset += chunk.size;
        }

        if offset != self.size {
            return invalid(format!("size {} does not match chunks ({offset})", self.size));
        }
        Ok(())
    }
}
