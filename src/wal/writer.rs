//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{GridError, Result};
use crate::journal::unix_millis;

use super::reader::{ReadStep, WalReader};
use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN assigned to the next appended entry
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
    /// Entries currently in the file
    entry_count: u64,
    /// File length covered by fully written entries
    committed: u64,
    /// Set when a failed append could not be rolled back
    failed: bool,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Existing valid entries are scanned so LSNs continue where they left
    /// off. Run `WalRecovery::recover` first if the tail may be damaged.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let (last_lsn, entry_count) = if path.exists() {
            Self::scan(path)?
        } else {
            (0, 0)
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let committed = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
            entry_count,
            committed,
            failed: false,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append an operation stamped with the current time, returning its LSN
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        self.append_at(operation, unix_millis())
    }

    /// Append an operation with an explicit commit timestamp
    ///
    /// On failure the file is cut back to the end of the previous entry and
    /// neither the LSN nor the entry count advance. If that cut fails too,
    /// the writer refuses every later append.
    pub fn append_at(&mut self, operation: Operation, timestamp: u64) -> Result<u64> {
        self.ensure_usable()?;

        let lsn = self.next_lsn;
        let entry = WalEntry::with_timestamp(lsn, operation, timestamp);
        let bytes = entry.serialize()?;

        if let Err(e) = self.write_entry(&bytes) {
            if let Err(rollback) = self.rollback() {
                self.failed = true;
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "WAL rollback failed, refusing further appends"
                );
            }
            return Err(e);
        }

        self.committed += bytes.len() as u64;
        self.next_lsn += 1;
        self.entry_count += 1;
        Ok(lsn)
    }

    fn write_entry(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;

        let pending = self.unsynced + 1;
        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => pending >= count,
        };
        if due {
            self.sync()
        } else {
            self.writer.flush()?;
            self.unsynced = pending;
            Ok(())
        }
    }

    /// Discard the bytes of a failed append, buffered or already written
    fn rollback(&mut self) -> Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the buffer instead of flushing it
        let _ = stale.into_parts();

        let file = self.writer.get_mut();
        file.set_len(self.committed)?;
        file.seek(SeekFrom::Start(self.committed))?;
        file.sync_all()?;
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.failed {
            return Err(GridError::StorageFailure(format!(
                "WAL {} holds an unrecoverable partial write",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.writer.flush()?;
        self.check_injected_failure()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    #[cfg(test)]
    fn check_injected_failure(&mut self) -> Result<()> {
        if std::mem::take(&mut self.fail_next_sync) {
            let e = std::io::Error::new(std::io::ErrorKind::Other, "injected sync failure");
            return Err(e.into());
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_injected_failure(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop every entry (after a checkpoint made them redundant)
    ///
    /// LSNs keep increasing across truncations.
    pub fn truncate(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.entry_count = 0;
        self.unsynced = 0;
        self.committed = 0;
        Ok(())
    }

    /// Make sure the next LSN is greater than `lsn`
    pub fn resume_after(&mut self, lsn: u64) {
        self.next_lsn = self.next_lsn.max(lsn + 1);
    }

    /// Get the current LSN (the one the next append will receive)
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Entries written since the last fsync
    pub fn unsynced_count(&self) -> usize {
        self.unsynced
    }

    /// Number of entries currently in the file
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan(path: &Path) -> Result<(u64, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut last_lsn = 0;
        let mut count = 0;
        loop {
            match reader.read_step()? {
                ReadStep::Entry(entry) => {
                    last_lsn = entry.lsn;
                    count += 1;
                }
                ReadStep::End => break,
                ReadStep::Torn | ReadStep::Corrupt(_) => {
                    return Err(GridError::WalCorruption(format!(
                        "damaged tail after offset {}; run recovery first",
                        reader.position()
                    )));
                }
            }
        }
        Ok((last_lsn, count))
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if !self.failed {
            let _ = self.writer.flush();
        }
    }
}
