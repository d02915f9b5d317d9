//! Error taxonomy for the storage engine.
//!
//! Every failure is classified into one of three kinds (see [`ErrorKind`]):
//! a missing file or chunk, an underlying storage failure, or bad input.
//! The HTTP adapter maps these straight to status codes.

use std::fmt;
use std::io;

use thiserror::Error;

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced file id or chunk id does not exist.
    NotFound,
    /// Reading or writing chunk or manifest storage failed.
    Io,
    /// The caller handed us something malformed.
    Validation,
}

/// What a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    File,
    Chunk,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::File => write!(f, "file"),
            Missing::Chunk => write!(f, "chunk"),
        }
    }
}

/// Errors produced by chunk storage, manifest storage and the file store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{what} not found: {id}")]
    NotFound { what: Missing, id: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("chunk {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("storage is in read-only mode")]
    ReadOnly,

    #[error("failed to (de)serialize manifest: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An engine error tagged with the operation and file it happened in.
    #[error("{op} {file_id}: {source}")]
    Op {
        op: &'static str,
        file_id: String,
        #[source]
        source: Box<StoreError>,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl StoreError {
    pub fn file_not_found(id: impl fmt::Display) -> Self {
        StoreError::NotFound {
            what: Missing::File,
            id: id.to_string(),
        }
    }

    pub fn chunk_not_found(id: impl fmt::Display) -> Self {
        StoreError::NotFound {
            what: Missing::Chunk,
            id: id.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify this error. Context wrappers report the kind of what they wrap.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Io { .. }
            | StoreError::Corrupt { .. }
            | StoreError::ReadOnly
            | StoreError::Serialization(_) => ErrorKind::Io,
            StoreError::Op { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Attach operation context to engine results.
pub(crate) trait OpContext<T> {
    fn during(self, op: &'static str, file_id: impl fmt::Display) -> Result<T>;
}

impl<T> OpContext<T> for Result<T> {
    fn during(self, op: &'static str, file_id: impl fmt::Display) -> Result<T> {
        self.map_err(|source| StoreError::Op {
            op,
            file_id: file_id.to_string(),
            source: Box::new(source),
        })
    }
}
