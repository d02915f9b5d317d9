//! Filesystem-backed storage namespaces.
//!
//! Layout:
//! ```text
//! {base_path}/
//! ├── chunks/
//! │   ├── ab/
//! │   │   └── chunk_abcde123...   # raw chunk bytes
//! │   └── 12/
//! │       └── chunk_123456789...
//! └── files/
//!     ├── 6f1c...-....json         # FileManifest, pretty JSON
//!     └── 9a02...-....json
//! ```
//!
//! Every write lands in a uniquely named temp file next to its destination and
//! is renamed into place, so readers never observe a torn chunk or manifest.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::{ChunkBackend, ManifestBackend};
use crate::config::StorageConfig;
use crate::error::{Result, StoreError};
use crate::id::{ChunkId, FileId};

const MANIFEST_EXT: &str = "json";

/// Write `data` to `path` via a sibling temp file and rename.
fn write_atomically(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("destination has no parent directory"))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let written = File::create(&tmp_path).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    let result = written.and_then(|()| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Chunk namespace stored under `{base_path}/chunks`, sharded by hash prefix.
#[derive(Debug, Clone)]
pub struct FsChunkBackend {
    root: PathBuf,
    read_only: bool,
}

impl FsChunkBackend {
    /// Open the chunk namespace, creating its directory unless read-only.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let root = config.chunks_dir();
        if !config.read_only {
            fs::create_dir_all(&root)
                .map_err(|e| StoreError::io("failed to create chunks directory", e))?;
        }
        Ok(Self {
            root,
            read_only: config.read_only,
        })
    }

    /// Get the path where a chunk would be stored.
    pub fn chunk_path(&self, id: &ChunkId) -> PathBuf {
        self.root.join(id.shard()).join(id.as_str())
    }
}

impl ChunkBackend for FsChunkBackend {
    fn put(&self, id: &ChunkId, data: &[u8]) -> Result<bool> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }

        let path = self.chunk_path(id);
        // Content-addressed: an existing blob under this id already holds these bytes.
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io("failed to create chunk shard directory", e))?;
        }
        write_atomically(&path, data)
            .map_err(|e| StoreError::io(format!("failed to write chunk {id}"), e))?;
        Ok(true)
    }

    fn get(&self, id: &ChunkId) -> Result<Option<Vec<u8>>> {
        read_optional(&self.chunk_path(id))
            .map_err(|e| StoreError::io(format!("failed to read chunk {id}"), e))
    }

    fn contains(&self, id: &ChunkId) -> bool {
        self.chunk_path(id).exists()
    }

    fn ids(&self) -> Result<Vec<ChunkId>> {
        let mut ids = Vec::new();
        let shards = match fs::read_dir(&self.root) {
            Ok(shards) => shards,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(StoreError::io("failed to read chunks directory", e)),
        };

        for shard in shards {
            let shard = shard.map_err(|e| StoreError::io("failed to read chunks directory", e))?;
            if !shard.path().is_dir() {
                continue;
            }
            let entries = fs::read_dir(shard.path())
                .map_err(|e| StoreError::io("failed to read chunk shard directory", e))?;
            for entry in entries {
                let entry =
                    entry.map_err(|e| StoreError::io("failed to read chunk shard directory", e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_temp_name(&name) {
                    continue;
                }
                match name.parse::<ChunkId>() {
                    Ok(id) => ids.push(id),
                    Err(_) => {
                        debug!(entry = %name, "ignoring unrecognized entry in chunk namespace")
                    }
                }
            }
        }
        Ok(ids)
    }
}

/// Manifest namespace stored as `{base_path}/files/{file_id}.json`.
#[derive(Debug, Clone)]
pub struct FsManifestBackend {
    root: PathBuf,
    read_only: bool,
}

impl FsManifestBackend {
    /// Open the manifest namespace, creating its directory unless read-only.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let root = config.files_dir();
        if !config.read_only {
            fs::create_dir_all(&root)
                .map_err(|e| StoreError::io("failed to create files directory", e))?;
        }
        Ok(Self {
            root,
            read_only: config.read_only,
        })
    }

    /// Get the path where a manifest would be stored.
    pub fn manifest_path(&self, id: &FileId) -> PathBuf {
        self.root.join(format!("{id}.{MANIFEST_EXT}"))
    }
}

impl ManifestBackend for FsManifestBackend {
    fn load(&self, id: &FileId) -> Result<Option<Vec<u8>>> {
        read_optional(&self.manifest_path(id))
            .map_err(|e| StoreError::io(format!("failed to read manifest {id}"), e))
    }

    fn store(&self, id: &FileId, data: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        write_atomically(&self.manifest_path(id), data)
            .map_err(|e| StoreError::io(format!("failed to write manifest {id}"), e))
    }

    fn remove(&self, id: &FileId) -> Result<bool> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        match fs::remove_file(self.manifest_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(format!("failed to delete manifest {id}"), e)),
        }
    }

    fn ids(&self) -> Result<Vec<FileId>> {
        let mut ids = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(StoreError::io("failed to read files directory", e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("failed to read files directory", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_temp_name(stem) {
                continue;
            }
            match stem.parse::<FileId>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!(path = %path.display(), "skipping manifest with malformed file id"),
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn open(temp_dir: &TempDir) -> Result<(FsChunkBackend, FsManifestBackend)> {
        let config = StorageConfig::with_base_path(temp_dir.path());
        Ok((FsChunkBackend::new(&config)?, FsManifestBackend::new(&config)?))
    }

    #[test]
    fn test_put_and_get() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (chunks, _) = open(&temp_dir)?;

        let data = b"Hello, World!";
        let id = ChunkId::from_data(data);
        assert!(chunks.put(&id, data)?);

        assert_eq!(chunks.get(&id)?.as_deref(), Some(&data[..]));
        assert!(chunks.contains(&id));
        Ok(())
    }

    #[test]
    fn test_put_is_write_once() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (chunks, _) = open(&temp_dir)?;

        let id = ChunkId::from_data(b"Duplicate Me");
        assert!(chunks.put(&id, b"Duplicate Me")?);
        assert!(!chunks.put(&id, b"Duplicate Me")?);
        assert_eq!(chunks.ids()?, vec![id]);
        Ok(())
    }

    #[test]
    fn test_chunk_path_is_sharded() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (chunks, _) = open(&temp_dir)?;

        let id = ChunkId::from_data(b"path test");
        chunks.put(&id, b"path test")?;

        let path = chunks.chunk_path(&id);
        assert!(path.exists());
        assert_eq!(
            path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()),
            Some(id.shard())
        );
        Ok(())
    }

    #[test]
    fn test_missing_chunk_is_none() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (chunks, _) = open(&temp_dir)?;

        let id = ChunkId::from_data(b"never stored");
        assert!(chunks.get(&id)?.is_none());
        assert!(!chunks.contains(&id));
        Ok(())
    }

    #[test]
    fn test_no_temp_files_left_behind() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (chunks, manifests) = open(&temp_dir)?;

        let id = ChunkId::from_data(b"tidy");
        chunks.put(&id, b"tidy")?;
        let file_id = FileId::new();
        manifests.store(&file_id, b"{}")?;

        let shard_dir = chunks.chunk_path(&id).parent().unwrap().to_path_buf();
        for dir in [shard_dir, temp_dir.path().join("files")] {
            for entry in fs::read_dir(dir)? {
                let name = entry?.file_name().to_string_lossy().into_owned();
                assert!(!name.ends_with(".tmp"), "leftover temp file {name}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_manifest_store_overwrites() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (_, manifests) = open(&temp_dir)?;

        let id = FileId::new();
        manifests.store(&id, b"v1")?;
        manifests.store(&id, b"v2")?;

        assert_eq!(manifests.load(&id)?.as_deref(), Some(&b"v2"[..]));
        assert_eq!(manifests.ids()?, vec![id]);
        Ok(())
    }

    #[test]
    fn test_manifest_remove() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (_, manifests) = open(&temp_dir)?;

        let id = FileId::new();
        manifests.store(&id, b"{}")?;
        assert!(manifests.remove(&id)?);
        assert!(!manifests.remove(&id)?);
        assert!(manifests.load(&id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_manifest_ids_skip_foreign_entries() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (_, manifests) = open(&temp_dir)?;

        let id = FileId::new();
        manifests.store(&id, b"{}")?;
        fs::write(temp_dir.path().join("files").join("notes.txt"), b"x")?;
        fs::write(temp_dir.path().join("files").join("not-a-uuid.json"), b"{}")?;

        assert_eq!(manifests.ids()?, vec![id]);
        Ok(())
    }

    #[test]
    fn test_read_only_prevents_writes() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = StorageConfig::read_only(temp_dir.path());
        let chunks = FsChunkBackend::new(&config)?;
        let manifests = FsManifestBackend::new(&config)?;

        let id = ChunkId::from_data(b"should fail");
        assert!(matches!(chunks.put(&id, b"should fail"), Err(StoreError::ReadOnly)));
        assert!(matches!(
            manifests.store(&FileId::new(), b"{}"),
            Err(StoreError::ReadOnly)
        ));
        Ok(())
    }

    #[test]
    fn test_read_only_allows_reads() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (writable, _) = open(&temp_dir)?;
        let id = ChunkId::from_data(b"readable content");
        writable.put(&id, b"readable content")?;

        let readonly = FsChunkBackend::new(&StorageConfig::read_only(temp_dir.path()))?;
        assert_eq!(
            readonly.get(&id)?.as_deref(),
            Some(&b"readable content"[..])
        );
        Ok(())
    }

    #[test]
    fn test_concurrent_puts() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let (chunks, _) = open(&temp_dir)?;
        let chunks = Arc::new(chunks);

        let data = b"Concurrent Data";
        let id = ChunkId::from_data(data);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let chunks = Arc::clone(&chunks);
                let id = id.clone();
                thread::spawn(move || chunks.put(&id, data).expect("write failed"))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(chunks.get(&id)?.as_deref(), Some(&data[..]));
        assert_eq!(chunks.ids()?.len(), 1);
        Ok(())
    }
}
