//! ChunkStore: fixed-size segmentation, content-addressed persistence and
//! reconstruction.
//!
//! A stream is cut into `chunk_size` pieces; only the final piece may be
//! shorter, and an empty stream yields no chunks at all. Each piece is hashed
//! and written under `chunk_<sha256>` as soon as it is produced. Writes are
//! idempotent, so identical content anywhere, in the same file or another,
//! is stored once.

use std::io::{self, Read, Write};

use tracing::{debug, trace};

use crate::backend::ChunkBackend;
use crate::error::{Result, StoreError};
use crate::id::{ChunkHash, ChunkId};
use crate::model::Chunk;

/// Segments, stores and reassembles chunk data on top of a [`ChunkBackend`].
#[derive(Debug)]
pub struct ChunkStore<B> {
    backend: B,
    chunk_size: usize,
    verify_on_read: bool,
}

impl<B: ChunkBackend> ChunkStore<B> {
    /// Create a store cutting chunks of `chunk_size` bytes.
    pub fn new(backend: B, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StoreError::Validation(
                "chunk size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            backend,
            chunk_size,
            verify_on_read: false,
        })
    }

    /// Builder: re-hash chunks as they are read back.
    pub fn with_verify_on_read(mut self, verify: bool) -> Self {
        self.verify_on_read = verify;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read `reader` to exhaustion, persisting and describing each chunk.
    pub fn segment<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut offset = 0u64;

        loop {
            let n = fill_buffer(reader, &mut buffer)
                .map_err(|e| StoreError::io("failed to read input stream", e))?;
            if n == 0 {
                break;
            }

            let data = &buffer[..n];
            let chunk = Chunk::describe(data, chunks.len() as u64, offset);
            self.persist(&chunk.id, data)?;

            offset += chunk.size;
            chunks.push(chunk);

            if n < self.chunk_size {
                break;
            }
        }

        debug!(chunks = chunks.len(), bytes = offset, "segmented stream");
        Ok(chunks)
    }

    /// Store `data` under `id`; a no-op if the id is already present.
    pub fn persist(&self, id: &ChunkId, data: &[u8]) -> Result<bool> {
        let written = self.backend.put(id, data)?;
        if written {
            debug!(chunk = %id, size = data.len(), "wrote chunk");
        } else {
            trace!(chunk = %id, "chunk already stored");
        }
        Ok(written)
    }

    /// Fetch the exact bytes of a persisted chunk.
    pub fn read(&self, id: &ChunkId) -> Result<Vec<u8>> {
        self.backend
            .get(id)?
            .ok_or_else(|| StoreError::chunk_not_found(id))
    }

    /// Read a chunk back and check its size and hash against `chunk`.
    pub fn verify(&self, chunk: &Chunk) -> Result<Vec<u8>> {
        let data = self.read(&chunk.id)?;
        check_integrity(chunk, &data)?;
        Ok(data)
    }

    /// Write every chunk's bytes to `sink` in the given order.
    ///
    /// Stops at the first missing or unreadable chunk; whatever was already
    /// written to `sink` stays there. Returns the number of bytes written.
    pub fn reconstruct<W: Write + ?Sized>(&self, chunks: &[Chunk], sink: &mut W) -> Result<u64> {
        let mut written = 0u64;
        for chunk in chunks {
            let data = if self.verify_on_read {
                self.verify(chunk)?
            } else {
                self.read(&chunk.id)?
            };
            sink.write_all(&data)
                .map_err(|e| StoreError::io("failed to write reconstructed data", e))?;
            written += data.len() as u64;
        }
        sink.flush()
            .map_err(|e| StoreError::io("failed to flush reconstructed data", e))?;
        Ok(written)
    }
}

fn check_integrity(chunk: &Chunk, data: &[u8]) -> Result<()> {
    if data.len() as u64 != chunk.size {
        return Err(StoreError::Corrupt {
            id: chunk.id.to_string(),
            reason: format!("expected {} bytes, found {}", chunk.size, data.len()),
        });
    }
    if ChunkHash::from_data(data) != chunk.hash {
        return Err(StoreError::Corrupt {
            id: chunk.id.to_string(),
            reason: "content hash mismatch".into(),
        });
    }
    Ok(())
}

/// Read until `buf` is full or the reader is exhausted.
///
/// Chunk boundaries must depend only on the byte count, not on how the
/// reader happens to split its output.
fn fill_buffer<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
