//! Identifiers: content hashes, chunk ids and file ids.
//!
//! A chunk's identity is purely a function of its bytes: `chunk_` followed by
//! the lowercase hex SHA-256 digest. Two byte-identical segments anywhere map
//! to the same id and therefore the same storage slot.
//!
//! File ids are random UUIDs assigned at creation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

/// Prefix of every chunk id.
pub const CHUNK_ID_PREFIX: &str = "chunk_";

/// Length of a hex-encoded SHA-256 digest.
const HASH_HEX_LEN: usize = 64;

fn check_hex_digest(s: &str) -> Result<(), StoreError> {
    if s.len() != HASH_HEX_LEN {
        return Err(StoreError::Validation(format!(
            "invalid hash length: expected {HASH_HEX_LEN} hex chars, got {}",
            s.len()
        )));
    }
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StoreError::Validation("invalid hex character in hash".into()));
    }
    Ok(())
}

/// SHA-256 digest of a chunk's bytes, 64 lowercase hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkHash(String);

impl ChunkHash {
    pub fn from_data(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChunkHash {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_hex_digest(s)?;
        Ok(Self(s.to_lowercase()))
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChunkHash {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChunkHash> for String {
    fn from(hash: ChunkHash) -> Self {
        hash.0
    }
}

/// Content-derived chunk identifier: `chunk_<sha256 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkId(String);

impl ChunkId {
    /// Hash data and return the id it would be stored under.
    pub fn from_data(data: &[u8]) -> Self {
        Self::from_hash(&ChunkHash::from_data(data))
    }

    pub fn from_hash(hash: &ChunkHash) -> Self {
        Self(format!("{CHUNK_ID_PREFIX}{hash}"))
    }

    /// The digest part of the id.
    pub fn hash(&self) -> &str {
        &self.0[CHUNK_ID_PREFIX.len()..]
    }

    /// First two digest characters, used for directory sharding.
    pub fn shard(&self) -> &str {
        &self.hash()[..2]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChunkId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digest = s.strip_prefix(CHUNK_ID_PREFIX).ok_or_else(|| {
            StoreError::Validation(format!("chunk id must start with {CHUNK_ID_PREFIX:?}"))
        })?;
        check_hex_digest(digest)?;
        Ok(Self(format!("{CHUNK_ID_PREFIX}{}", digest.to_lowercase())))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChunkId {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.0
    }
}

/// Opaque, immutable identifier of a logical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for FileId {
    type Err = StoreError;

    /// Anything that isn't a UUID is rejected, which also keeps callers from
    /// smuggling path components into the manifest namespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|_| StoreError::Validation(format!("malformed file id: {s:?}")))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
