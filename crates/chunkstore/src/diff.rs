//! Positional chunk diffing between two versions of a file.
//!
//! A new chunk is *changed* when the old version has no chunk at its index or
//! the old chunk at that index has a different hash. This is not shift-aware:
//! inserting a byte near the start of a file moves every later boundary, so
//! every later chunk registers as changed.

use std::collections::HashMap;

use crate::id::ChunkHash;
use crate::model::Chunk;

/// Outcome of comparing two chunk lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// New chunks that differ from the old chunk at the same index, in new order.
    pub changed: Vec<Chunk>,
    /// New chunks identical to the old chunk at the same index.
    pub unchanged: usize,
    /// Old indexes with no counterpart in the new list (the file shrank).
    pub dropped: usize,
}

impl DiffReport {
    pub fn is_identical(&self) -> bool {
        self.changed.is_empty() && self.dropped == 0
    }

    /// Bytes covered by changed chunks.
    pub fn changed_bytes(&self) -> u64 {
        self.changed.iter().map(|c| c.size).sum()
    }
}

/// Return the subsequence of `new` whose chunks changed relative to `old`.
pub fn diff(old: &[Chunk], new: &[Chunk]) -> Vec<Chunk> {
    diff_report(old, new).changed
}

/// Compare `old` and `new` by position and hash.
pub fn diff_report(old: &[Chunk], new: &[Chunk]) -> DiffReport {
    let old_hashes: HashMap<u64, &ChunkHash> = old.iter().map(|c| (c.index, &c.hash)).collect();

    let mut report = DiffReport::default();
    for chunk in new {
        match old_hashes.get(&chunk.index) {
            Some(hash) if **hash == chunk.hash => report.unchanged += 1,
            _ => report.changed.push(chunk.clone()),
        }
    }

    let new_len = new.len() as u64;
    report.dropped = old_hashes.keys().filter(|&&index| index >= new_len).count();
    report
}
