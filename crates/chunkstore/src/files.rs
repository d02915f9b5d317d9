//! VersionedFileStore: file identity and manifest lifecycle.
//!
//! Per file: `nonexistent -> v1 -> v2 -> ... -> deleted`. Deletion removes the
//! manifest only; chunk bytes stay behind in the chunk namespace.
//!
//! There is no per-file locking. Chunk writes are idempotent and commute, but
//! manifest writes are plain overwrites: two concurrent updates of the same
//! file race and the last writer wins.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::{info, warn};

use crate::backend::{ChunkBackend, FsChunkBackend, FsManifestBackend, ManifestBackend};
use crate::chunks::ChunkStore;
use crate::config::StorageConfig;
use crate::diff::{diff_report, DiffReport};
use crate::error::{OpContext, Result, StoreError};
use crate::id::FileId;
use crate::model::FileManifest;

/// A manifest together with how its chunks compared to the previous version.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub manifest: FileManifest,
    pub diff: DiffReport,
}

/// Creates, updates, reads, lists and deletes files built from chunks.
#[derive(Debug)]
pub struct VersionedFileStore<C, M> {
    chunks: ChunkStore<C>,
    manifests: M,
}

impl VersionedFileStore<FsChunkBackend, FsManifestBackend> {
    /// Open both filesystem namespaces described by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let chunks = ChunkStore::new(FsChunkBackend::new(config)?, config.chunk_size)?
            .with_verify_on_read(config.verify_on_read);
        Ok(Self::new(chunks, FsManifestBackend::new(config)?))
    }
}

impl<C: ChunkBackend, M: ManifestBackend> VersionedFileStore<C, M> {
    pub fn new(chunks: ChunkStore<C>, manifests: M) -> Self {
        Self { chunks, manifests }
    }

    pub fn chunk_store(&self) -> &ChunkStore<C> {
        &self.chunks
    }

    /// Store `reader`'s content as a brand-new file at version 1.
    pub fn create<R: Read + ?Sized>(
        &self,
        name: &str,
        content_type: &str,
        reader: &mut R,
    ) -> Result<FileManifest> {
        let id = FileId::new();
        check_name(name).during("create", id)?;

        let chunks = self.chunks.segment(reader).during("create", id)?;
        let manifest = FileManifest::first_version(id, name, content_type, chunks);
        self.save(&manifest).during("create", id)?;

        info!(
            file = %id,
            file_name = name,
            size = manifest.size,
            chunks = manifest.chunks.len(),
            "created file"
        );
        Ok(manifest)
    }

    /// Replace a file's content with the whole of `reader`, bumping its version.
    pub fn update<R: Read + Seek + ?Sized>(
        &self,
        id: &FileId,
        reader: &mut R,
    ) -> Result<FileManifest> {
        self.update_with_report(id, reader).map(|r| r.manifest)
    }

    /// Like [`update`](Self::update), also reporting which chunk slots changed.
    ///
    /// The stream is rewound before segmenting, so its current position does
    /// not matter. Every chunk is persisted during segmentation; unchanged
    /// chunks already exist and are skipped by the chunk namespace.
    pub fn update_with_report<R: Read + Seek + ?Sized>(
        &self,
        id: &FileId,
        reader: &mut R,
    ) -> Result<UpdateReport> {
        let mut manifest = self.load(id).during("update", id)?;

        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| match e.kind() {
                io::ErrorKind::Unsupported | io::ErrorKind::NotSeekable => {
                    StoreError::Validation("update requires a seekable input stream".into())
                }
                _ => StoreError::io("failed to rewind input stream", e),
            })
            .during("update", id)?;
        let new_chunks = self.chunks.segment(reader).during("update", id)?;
        let diff = diff_report(&manifest.chunks, &new_chunks);

        manifest.advance(new_chunks);
        self.save(&manifest).during("update", id)?;

        info!(
            file = %id,
            version = manifest.version,
            size = manifest.size,
            changed = diff.changed.len(),
            unchanged = diff.unchanged,
            dropped = diff.dropped,
            identical = diff.is_identical(),
            "updated file"
        );
        Ok(UpdateReport { manifest, diff })
    }

    /// Stream a file's content into `sink` and return its manifest.
    ///
    /// On failure part of the content may already be in `sink`.
    pub fn read<W: Write + ?Sized>(&self, id: &FileId, sink: &mut W) -> Result<FileManifest> {
        let manifest = self.load(id).during("read", id)?;
        self.chunks
            .reconstruct(&manifest.chunks, sink)
            .during("read", id)?;
        Ok(manifest)
    }

    /// Load a file's manifest without touching its content.
    pub fn get(&self, id: &FileId) -> Result<FileManifest> {
        self.load(id).during("get", id)
    }

    /// Every loadable manifest, in backend order.
    ///
    /// Entries that fail to load are logged and skipped.
    pub fn list(&self) -> Result<Vec<FileManifest>> {
        let ids = self.manifests.ids()?;
        let mut files = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(&id) {
                Ok(manifest) => files.push(manifest),
                Err(e) => warn!(file = %id, error = %e, "skipping unreadable manifest"),
            }
        }
        Ok(files)
    }

    /// Change a file's descriptive metadata. Content and version are untouched.
    pub fn rename(
        &self,
        id: &FileId,
        name: &str,
        content_type: Option<&str>,
    ) -> Result<FileManifest> {
        check_name(name).during("rename", id)?;
        let mut manifest = self.load(id).during("rename", id)?;

        manifest.name = name.to_string();
        if let Some(content_type) = content_type {
            manifest.content_type = content_type.to_string();
        }
        manifest.touch();
        self.save(&manifest).during("rename", id)?;

        info!(file = %id, file_name = name, "renamed file");
        Ok(manifest)
    }

    /// Remove a file's manifest. Its chunks are left in place.
    pub fn delete(&self, id: &FileId) -> Result<()> {
        self.load(id).during("delete", id)?;
        if !self.manifests.remove(id).during("delete", id)? {
            return Err(StoreError::file_not_found(id)).during("delete", id);
        }
        info!(file = %id, "deleted file");
        Ok(())
    }

    fn load(&self, id: &FileId) -> Result<FileManifest> {
        let data = self
            .manifests
            .load(id)?
            .ok_or_else(|| StoreError::file_not_found(id))?;
        let manifest: FileManifest = serde_json::from_slice(&data)?;
        if manifest.id != *id {
            return Err(StoreError::Validation(format!(
                "manifest stored under {id} describes {}",
                manifest.id
            )));
        }
        manifest.validate_layout()?;
        Ok(manifest)
    }

    fn save(&self, manifest: &FileManifest) -> Result<()> {
        let data = serde_json::to_vec_pretty(manifest)?;
        self.manifests.store(&manifest.id, &data)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation("file name must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::ErrorKind;
    use crate::id::ChunkId;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;

    const MIB: usize = 1024 * 1024;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 253) as u8).collect()
    }

    fn disk_store(
        temp_dir: &TempDir,
        chunk_size: usize,
    ) -> Result<VersionedFileStore<FsChunkBackend, FsManifestBackend>> {
        let config = StorageConfig::with_base_path(temp_dir.path()).with_chunk_size(chunk_size);
        VersionedFileStore::open(&config)
    }

    /// Both namespaces share one in-memory backend.
    fn memory_store(
        chunk_size: usize,
    ) -> VersionedFileStore<Arc<MemoryBackend>, Arc<MemoryBackend>> {
        let backend = Arc::new(MemoryBackend::new());
        let chunks = ChunkStore::new(Arc::clone(&backend), chunk_size).unwrap();
        VersionedFileStore::new(chunks, backend)
    }

    #[test]
    fn test_create_and_update_identical_content() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = disk_store(&temp_dir, MIB)?;
        let data = patterned(5 * MIB / 2);

        let created = store.create("a.txt", "text/plain", &mut Cursor::new(&data))?;
        assert_eq!(created.version, 1);
        assert_eq!(created.size, 2_621_440);
        let sizes: Vec<u64> = created.chunks.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![1_048_576, 1_048_576, 524_288]);

        let report = store.update_with_report(&created.id, &mut Cursor::new(&data))?;
        let updated = &report.manifest;
        assert_eq!(updated.version, 2);
        assert_eq!(updated.size, created.size);
        assert_eq!(updated.chunks, created.chunks);
        assert!(report.diff.changed.is_empty());
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
        Ok(())
    }

    #[test]
    fn test_update_reports_changed_slot() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create(
            "f",
            "application/octet-stream",
            &mut Cursor::new(b"aaaabbbbcccc"),
        )?;

        let report = store.update_with_report(&created.id, &mut Cursor::new(b"aaaaXXXXcccc"))?;

        assert_eq!(report.diff.changed.len(), 1);
        assert_eq!(report.diff.changed[0].index, 1);
        assert_eq!(report.diff.unchanged, 2);

        let mut out = Vec::new();
        store.read(&created.id, &mut out)?;
        assert_eq!(out, b"aaaaXXXXcccc");
        Ok(())
    }

    #[test]
    fn test_update_rewinds_stream() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("f", "text/plain", &mut Cursor::new(b"old content"))?;

        let mut reader = Cursor::new(b"new content".to_vec());
        reader.set_position(5);
        let updated = store.update(&created.id, &mut reader)?;

        assert_eq!(updated.size, 11);
        let mut out = Vec::new();
        store.read(&created.id, &mut out)?;
        assert_eq!(out, b"new content");
        Ok(())
    }

    /// Reads fine but refuses to seek, like a pipe.
    struct Unseekable(Cursor<Vec<u8>>);

    impl Read for Unseekable {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for Unseekable {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "illegal seek"))
        }
    }

    #[test]
    fn test_update_rejects_unseekable_stream() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("f", "text/plain", &mut Cursor::new(b"data"))?;

        let err = store
            .update(&created.id, &mut Unseekable(Cursor::new(b"more".to_vec())))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.get(&created.id)?.version, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_update_rejects_pipe() -> anyhow::Result<()> {
        use std::os::fd::OwnedFd;

        let store = memory_store(4);
        let created = store.create("f", "text/plain", &mut Cursor::new(b"data"))?;

        let (reader, mut writer) = io::pipe()?;
        writer.write_all(b"piped content")?;
        drop(writer);
        let mut pipe = std::fs::File::from(OwnedFd::from(reader));

        let err = store.update(&created.id, &mut pipe).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.get(&created.id)?.version, 1);
        Ok(())
    }

    #[test]
    fn test_versions_are_monotonic() -> anyhow::Result<()> {
        let store = memory_store(8);
        let mut manifest = store.create("f", "text/plain", &mut Cursor::new(b"v1"))?;

        for version in 2..=5u64 {
            let previous = manifest.clone();
            manifest = store.update(&manifest.id, &mut Cursor::new(format!("v{version}")))?;
            assert_eq!(manifest.version, previous.version + 1);
            assert!(manifest.updated_at >= previous.updated_at);
        }
        assert_eq!(store.get(&manifest.id)?.version, 5);
        Ok(())
    }

    #[test]
    fn test_update_shrink_and_grow() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("f", "text/plain", &mut Cursor::new(b"aaaabbbbcccc"))?;

        let report = store.update_with_report(&created.id, &mut Cursor::new(b"aaaab"))?;
        assert_eq!(report.manifest.size, 5);
        assert_eq!(report.diff.dropped, 1);
        report.manifest.validate_layout()?;

        let report = store.update_with_report(&created.id, &mut Cursor::new(b"aaaabbbbccccdd"))?;
        assert_eq!(report.manifest.chunks.len(), 4);
        assert_eq!(report.diff.changed.len(), 3);
        Ok(())
    }

    #[test]
    fn test_empty_file() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("empty", "text/plain", &mut Cursor::new(Vec::new()))?;

        assert_eq!(created.size, 0);
        assert!(created.chunks.is_empty());

        let mut out = Vec::new();
        store.read(&created.id, &mut out)?;
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let store = memory_store(4);
        let err = store
            .create("  ", "text/plain", &mut Cursor::new(b"data"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_read_returns_manifest_and_content() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = disk_store(&temp_dir, 1024)?;
        let data = patterned(5000);
        let created =
            store.create("blob.bin", "application/octet-stream", &mut Cursor::new(&data))?;

        let mut out = Vec::new();
        let manifest = store.read(&created.id, &mut out)?;

        assert_eq!(manifest, created);
        assert_eq!(out, data);
        Ok(())
    }

    #[test]
    fn test_read_with_missing_chunk_fails_not_found() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("f", "text/plain", &mut Cursor::new(b"aaaabbbb"))?;
        store.chunk_store().backend().evict_chunk(&created.chunks[1].id);

        let mut out = Vec::new();
        let err = store.read(&created.id, &mut out).unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("read "));
        assert_eq!(out, b"aaaa");
        Ok(())
    }

    #[test]
    fn test_delete_then_read_and_update_fail() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("f", "text/plain", &mut Cursor::new(b"bye"))?;

        store.delete(&created.id)?;

        let read_err = store.read(&created.id, &mut Vec::new()).unwrap_err();
        assert_eq!(read_err.kind(), ErrorKind::NotFound);
        let update_err = store
            .update(&created.id, &mut Cursor::new(b"again"))
            .unwrap_err();
        assert_eq!(update_err.kind(), ErrorKind::NotFound);
        let delete_err = store.delete(&created.id).unwrap_err();
        assert_eq!(delete_err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn test_delete_keeps_chunks() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("f", "text/plain", &mut Cursor::new(b"keep me!"))?;

        store.delete(&created.id)?;

        for chunk in &created.chunks {
            assert!(store.chunk_store().backend().contains(&chunk.id));
        }
        Ok(())
    }

    #[test]
    fn test_unknown_file_is_not_found() {
        let store = memory_store(4);
        let missing = FileId::new();

        assert!(store.get(&missing).unwrap_err().is_not_found());
        assert!(store.read(&missing, &mut Vec::new()).unwrap_err().is_not_found());
        assert!(store.delete(&missing).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_skips_corrupt_manifest() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = disk_store(&temp_dir, 64)?;

        let a = store.create("a.txt", "text/plain", &mut Cursor::new(b"alpha"))?;
        let b = store.create("b.txt", "text/plain", &mut Cursor::new(b"beta"))?;
        std::fs::write(
            temp_dir.path().join("files").join(format!("{}.json", FileId::new())),
            b"{ not json",
        )?;

        let mut ids: Vec<FileId> = store.list()?.into_iter().map(|m| m.id).collect();
        ids.sort_by_key(|id| id.to_string());
        let mut expected = vec![a.id, b.id];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(ids, expected);
        Ok(())
    }

    /// Rewrite the first chunk id of a stored manifest.
    fn tamper_chunk_id(temp_dir: &TempDir, id: &FileId, chunk_id: &str) -> anyhow::Result<()> {
        let path = temp_dir.path().join("files").join(format!("{id}.json"));
        let mut value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        value["chunks"][0]["id"] = serde_json::Value::from(chunk_id);
        std::fs::write(&path, serde_json::to_vec_pretty(&value)?)?;
        Ok(())
    }

    #[test]
    fn test_malformed_chunk_id_is_an_error() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = disk_store(&temp_dir, 4)?;
        let created = store.create("f.txt", "text/plain", &mut Cursor::new(b"aaaabbbb"))?;

        tamper_chunk_id(&temp_dir, &created.id, "abc")?;

        assert!(store.get(&created.id).is_err());
        let mut out = Vec::new();
        assert!(store.read(&created.id, &mut out).is_err());
        assert!(out.is_empty());
        assert!(store.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_chunk_id_not_matching_hash_is_an_error() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = disk_store(&temp_dir, 4)?;
        let created = store.create("f.txt", "text/plain", &mut Cursor::new(b"aaaabbbb"))?;

        let other = ChunkId::from_data(b"bbbb");
        tamper_chunk_id(&temp_dir, &created.id, other.as_str())?;

        let err = store.read(&created.id, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        Ok(())
    }

    #[test]
    fn test_list_empty() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = disk_store(&temp_dir, 64)?;
        assert!(store.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_rename_keeps_version() -> anyhow::Result<()> {
        let store = memory_store(4);
        let created = store.create("draft.txt", "text/plain", &mut Cursor::new(b"text"))?;

        let renamed = store.rename(&created.id, "final.md", Some("text/markdown"))?;

        assert_eq!(renamed.name, "final.md");
        assert_eq!(renamed.content_type, "text/markdown");
        assert_eq!(renamed.version, 1);
        assert_eq!(renamed.chunks, created.chunks);
        assert_eq!(store.get(&created.id)?.name, "final.md");
        Ok(())
    }

    #[test]
    fn test_manifests_survive_reopen() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let id = {
            let store = disk_store(&temp_dir, 16)?;
            let content = b"still here after restart";
            store.create("persist.txt", "text/plain", &mut Cursor::new(content))?.id
        };

        let store = disk_store(&temp_dir, 16)?;
        let mut out = Vec::new();
        let manifest = store.read(&id, &mut out)?;
        assert_eq!(manifest.name, "persist.txt");
        assert_eq!(out, b"still here after restart");
        Ok(())
    }

    #[test]
    fn test_identical_files_share_chunks() -> anyhow::Result<()> {
        let store = memory_store(4);
        store.create("one", "text/plain", &mut Cursor::new(b"samesame"))?;
        store.create("two", "text/plain", &mut Cursor::new(b"samesame"))?;

        assert_eq!(store.chunk_store().backend().chunk_count(), 1);
        Ok(())
    }
}
