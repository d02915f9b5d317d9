//! Local CLI commands that operate directly on the storage directory.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chunkstore::{FileId, FileManifest};

use crate::http::DiskStore;

fn parse_id(raw: &str) -> Result<FileId> {
    raw.parse::<FileId>()
        .with_context(|| format!("not a file id: {raw}"))
}

fn summary(manifest: &FileManifest) -> String {
    format!(
        "{}  v{}  {} bytes  {} chunks  {}",
        manifest.id,
        manifest.version,
        manifest.size,
        manifest.chunks.len(),
        manifest.name
    )
}

/// Upload a local file as a new stored file. Returns its manifest.
pub fn put(
    store: &DiskStore,
    path: &Path,
    name: Option<&str>,
    content_type: Option<&str>,
) -> Result<FileManifest> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("path has no file name; pass --name")?,
    };
    let content_type = content_type.unwrap_or("application/octet-stream");

    let manifest = store.create(&name, content_type, &mut file)?;
    println!("{}", summary(&manifest));
    Ok(manifest)
}

/// Replace a stored file's content with a local file.
pub fn update(store: &DiskStore, id: &str, path: &Path) -> Result<FileManifest> {
    let id = parse_id(id)?;
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let report = store.update_with_report(&id, &mut file)?;
    println!("{}", summary(&report.manifest));
    println!(
        "   changed {} chunks ({} bytes), unchanged {}, dropped {}",
        report.diff.changed.len(),
        report.diff.changed_bytes(),
        report.diff.unchanged,
        report.diff.dropped
    );
    Ok(report.manifest)
}

/// Write a stored file's content to `output`, or stdout.
pub fn get(store: &DiskStore, id: &str, output: Option<&Path>) -> Result<FileManifest> {
    let id = parse_id(id)?;
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut sink = BufWriter::new(file);
            let manifest = store.read(&id, &mut sink)?;
            sink.flush().context("failed to flush output")?;
            eprintln!("wrote {} bytes to {}", manifest.size, path.display());
            Ok(manifest)
        }
        None => {
            let stdout = io::stdout();
            let mut sink = stdout.lock();
            Ok(store.read(&id, &mut sink)?)
        }
    }
}

/// Print every stored file, one per line.
pub fn list(store: &DiskStore) -> Result<Vec<FileManifest>> {
    let files = store.list()?;
    for manifest in &files {
        println!("{}", summary(manifest));
    }
    eprintln!("{} files", files.len());
    Ok(files)
}

/// Print a file's manifest as JSON.
pub fn show(store: &DiskStore, id: &str) -> Result<()> {
    let manifest = store.get(&parse_id(id)?)?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

pub fn rename(store: &DiskStore, id: &str, name: &str, content_type: Option<&str>) -> Result<()> {
    let manifest = store.rename(&parse_id(id)?, name, content_type)?;
    println!("{}", summary(&manifest));
    Ok(())
}

pub fn remove(store: &DiskStore, id: &str) -> Result<()> {
    store.delete(&parse_id(id)?)?;
    println!("deleted {id}");
    Ok(())
}
