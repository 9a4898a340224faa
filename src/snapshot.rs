//! Snapshot Store
//!
//! Full-state checkpoint file written next to the WAL.
//!
//! ## File Format
//! ```text
//! ┌──────────────┬──────────────┬───────────┬──────────────┬───────────┐
//! │ Magic "PGSN" │ Version (2B) │ Len (8B)  │ Data         │ CRC32 (4B)│
//! └──────────────┴──────────────┴───────────┴──────────────┴───────────┘
//! ```
//!
//! Data is the bincode encoding of [`Snapshot`]; the CRC covers Data only.
//! The file is written under a temporary name, synced, then renamed over the
//! previous snapshot, so readers only ever see a complete file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::syntax::RegistrySnapshot;
use crate::tree::TreeSnapshot;

/// Magic bytes identifying a snapshot file
pub const MAGIC: &[u8; 4] = b"PGSN";

/// Current snapshot format version
pub const VERSION: u16 = 1;

/// Magic (4) + Version (2) + Len (8)
pub const HEADER_SIZE: usize = 14;

/// CRC32 trailer
pub const FOOTER_SIZE: usize = 4;

/// Everything needed to rebuild the engine state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last WAL entry reflected in this snapshot
    pub last_lsn: u64,
    pub tree: TreeSnapshot,
    pub registry: RegistrySnapshot,
    pub site: BTreeMap<String, String>,
}

/// Reads and atomically replaces `snapshot.bin`
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write `snapshot`, replacing any previous file
    ///
    /// Returns the number of bytes written.
    pub fn write(&self, snapshot: &Snapshot) -> Result<u64> {
        let data = bincode::serialize(snapshot)?;
        let crc = crc32fast::hash(&data);

        let tmp_path = self.path.with_extension("bin.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(data.len() as u64).to_le_bytes())?;
        writer.write_all(&data)?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| GridError::StorageFailure(format!("Failed to flush snapshot: {}", e)))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;
        sync_parent(&self.path)?;

        let written = (HEADER_SIZE + data.len() + FOOTER_SIZE) as u64;
        tracing::debug!(
            path = %self.path.display(),
            bytes = written,
            last_lsn = snapshot.last_lsn,
            "Snapshot written"
        );
        Ok(written)
    }

    /// Load the snapshot, or `None` when no snapshot has been written yet
    pub fn read(&self) -> Result<Option<Snapshot>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(GridError::SnapshotCorruption(format!(
                "file too short: {} bytes",
                bytes.len()
            )));
        }

        if &bytes[0..4] != MAGIC {
            return Err(GridError::SnapshotCorruption(format!(
                "Invalid snapshot magic: expected PGSN, got {:?}",
                &bytes[0..4]
            )));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(GridError::SnapshotCorruption(format!(
                "Unsupported snapshot version: {}",
                version
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[6..HEADER_SIZE]);
        let declared = u64::from_le_bytes(len_bytes);
        let len = bytes.len() - HEADER_SIZE - FOOTER_SIZE;

        if declared != len as u64 {
            return Err(GridError::SnapshotCorruption(format!(
                "length mismatch: header says {} data bytes, file holds {}",
                declared, len
            )));
        }

        let data = &bytes[HEADER_SIZE..HEADER_SIZE + len];
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&bytes[HEADER_SIZE + len..]);
        let stored_crc = u32::from_le_bytes(crc_bytes);
        let computed_crc = crc32fast::hash(data);
        if stored_crc != computed_crc {
            return Err(GridError::SnapshotCorruption(format!(
                "CRC mismatch: stored {:08x}, computed {:08x}",
                stored_crc, computed_crc
            )));
        }

        let snapshot: Snapshot = bincode::deserialize(data)?;
        Ok(Some(snapshot))
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}
