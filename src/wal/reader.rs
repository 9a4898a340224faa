//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{GridError, Result};

use super::entry::{EntryHeader, HEADER_SIZE};
use super::WalEntry;

/// Outcome of reading one entry slot
pub(crate) enum ReadStep {
    /// A valid entry
    Entry(WalEntry),
    /// Clean end of file
    End,
    /// File ends in the middle of an entry (partial write)
    Torn,
    /// Entry is complete but fails validation
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Byte offset just past the last valid entry
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file and `WalCorruption` for a
    /// torn or corrupted entry.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_step()? {
            ReadStep::Entry(entry) => Ok(Some(entry)),
            ReadStep::End => Ok(None),
            ReadStep::Torn => Err(GridError::WalCorruption(format!(
                "partial entry at offset {}",
                self.position
            ))),
            ReadStep::Corrupt(reason) => Err(GridError::WalCorruption(reason)),
        }
    }

    /// Iterate over all valid entries (stops after the first error)
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset just past the last valid entry read
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn read_step(&mut self) -> Result<ReadStep> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        let read = read_fully(&mut self.reader, &mut header_bytes)?;
        if read == 0 {
            return Ok(ReadStep::End);
        }
        if read < HEADER_SIZE {
            return Ok(ReadStep::Torn);
        }

        let header = match EntryHeader::parse(&header_bytes) {
            Ok(header) => header,
            Err(e) => return Ok(ReadStep::Corrupt(e.to_string())),
        };

        let mut data = vec![0u8; header.len as usize];
        if read_fully(&mut self.reader, &mut data)? < data.len() {
            return Ok(ReadStep::Torn);
        }

        match WalEntry::decode_data(&header, &data) {
            Ok(entry) => {
                self.position += (HEADER_SIZE + data.len()) as u64;
                Ok(ReadStep::Entry(entry))
            }
            Err(e) => Ok(ReadStep::Corrupt(e.to_string())),
        }
    }
}

/// Like `read_exact`, but reports how many bytes were available before EOF
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
