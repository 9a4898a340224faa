//! Error types for pagegrid
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using GridError
pub type Result<T> = std::result::Result<T, GridError>;

/// Entity kinds named in `NotFound` errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Page,
    Column,
    Post,
    Syntax,
    Extension,
    MimeType,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Page => "page",
            EntityKind::Column => "column",
            EntityKind::Post => "post",
            EntityKind::Syntax => "syntax",
            EntityKind::Extension => "extension",
            EntityKind::MimeType => "mime type",
        };
        f.write_str(name)
    }
}

/// Unified error type for pagegrid operations
#[derive(Debug, Error)]
pub enum GridError {
    // -------------------------------------------------------------------------
    // Ordering / Tree Errors
    // -------------------------------------------------------------------------
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Position {position} out of range (sibling count {len})")]
    OutOfRange { position: usize, len: usize },

    #[error("Post {post} cannot move from page {from} to page {to}")]
    CrossPageMismatch { post: u64, from: u64, to: u64 },

    // -------------------------------------------------------------------------
    // Syntax Registry Errors
    // -------------------------------------------------------------------------
    #[error("Key '{key}' is already bound to {existing}")]
    DuplicateKey { key: String, existing: String },

    #[error("No syntax bound to extension '{0}'")]
    UnknownExtension(String),

    #[error("No syntax bound to MIME type '{0}'")]
    UnknownMimeType(String),

    #[error("Invalid key: '{0}'")]
    InvalidKey(String),

    #[error("Editor mode of syntax '{0}' must not be empty")]
    EmptyEditorMode(String),

    #[error("Syntax {0} is still referenced by extensions or MIME types")]
    SyntaxInUse(u64),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Snapshot corruption detected: {0}")]
    SnapshotCorruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GridError {
    pub(crate) fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        GridError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<bincode::Error> for GridError {
    fn from(e: bincode::Error) -> Self {
        GridError::Serialization(e.to_string())
    }
}
