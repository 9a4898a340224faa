//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and the operations
//! they carry. Every mutation of the content tree, the syntax registry and
//! the site contents is described by exactly one `Operation`.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::journal::unix_millis;
use crate::model::{ColumnId, ExtensionId, MimeTypeId, PageId, PostId, SyntaxId};

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound for a single entry payload (64 MB)
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was committed
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    // -------------------------------------------------------------------------
    // Pages
    // -------------------------------------------------------------------------
    PageCreated { page: PageId, name: String },
    PageRenamed { page: PageId, name: String },
    PageDeleted { page: PageId },

    // -------------------------------------------------------------------------
    // Columns
    // -------------------------------------------------------------------------
    ColumnInserted { column: ColumnId, page: PageId, position: usize },
    ColumnMoved { column: ColumnId, position: usize },
    ColumnDeleted { column: ColumnId },

    // -------------------------------------------------------------------------
    // Posts
    // -------------------------------------------------------------------------
    PostInserted {
        post: PostId,
        column: ColumnId,
        position: usize,
        content: String,
    },
    PostUpdated { post: PostId, content: String },
    PostMoved { post: PostId, position: usize },
    PostReparented {
        post: PostId,
        column: ColumnId,
        position: usize,
    },
    PostDeleted { post: PostId },

    // -------------------------------------------------------------------------
    // Syntax Registry
    // -------------------------------------------------------------------------
    SyntaxRegistered {
        syntax: SyntaxId,
        display_name: String,
        ace_mode: String,
    },
    SyntaxUpdated {
        syntax: SyntaxId,
        display_name: String,
        ace_mode: String,
    },
    SyntaxUnregistered { syntax: SyntaxId },
    ExtensionBound {
        extension: ExtensionId,
        name: String,
        syntax: SyntaxId,
    },
    ExtensionUnbound { name: String },
    MimeTypeBound {
        mime_type: MimeTypeId,
        type_name: String,
        syntax: Option<SyntaxId>,
        integrated: bool,
    },
    MimeTypeUnbound { type_name: String },

    // -------------------------------------------------------------------------
    // Site Contents
    // -------------------------------------------------------------------------
    SiteContentSet { key: String, value: String },
    SiteContentRemoved { key: String },
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self::with_timestamp(lsn, operation, unix_millis())
    }

    /// Create an entry with an explicit commit timestamp
    pub fn with_timestamp(lsn: u64, operation: Operation, timestamp: u64) -> Self {
        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Serialize to the on-disk format: `[lsn(8)][crc(4)][len(4)][data]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        if data.len() > MAX_ENTRY_SIZE as usize {
            return Err(GridError::StorageFailure(format!(
                "WAL entry of {} bytes exceeds limit",
                data.len()
            )));
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);
        Ok(bytes)
    }

    /// Deserialize a complete entry (header + data), verifying the checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let header = EntryHeader::parse(bytes)?;
        let data = &bytes[HEADER_SIZE..];

        if data.len() != header.len as usize {
            return Err(GridError::WalCorruption(format!(
                "length mismatch: header says {}, got {}",
                header.len,
                data.len()
            )));
        }

        Self::decode_data(&header, data)
    }

    /// Verify checksum and decode the data section for a parsed header
    pub(crate) fn decode_data(header: &EntryHeader, data: &[u8]) -> Result<Self> {
        let actual_crc = crc32fast::hash(data);
        if actual_crc != header.crc {
            return Err(GridError::WalCorruption(format!(
                "CRC mismatch at lsn {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, actual_crc
            )));
        }

        let entry: WalEntry = bincode::deserialize(data)
            .map_err(|e| GridError::WalCorruption(format!("undecodable entry: {}", e)))?;

        if entry.lsn != header.lsn {
            return Err(GridError::WalCorruption(format!(
                "LSN mismatch: header {}, payload {}",
                header.lsn, entry.lsn
            )));
        }

        Ok(entry)
    }
}

/// Parsed fixed-size entry header
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl EntryHeader {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(GridError::WalCorruption(format!(
                "entry too short: {} bytes",
                bytes.len()
            )));
        }

        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);

        let header = Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        };

        if header.len > MAX_ENTRY_SIZE {
            return Err(GridError::WalCorruption(format!(
                "entry length {} exceeds limit",
                header.len
            )));
        }

        Ok(header)
    }
}
