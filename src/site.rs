//! Site Contents
//!
//! Small key → string settings map. Missing keys read as the empty string.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::journal::{Journal, Replay};
use crate::wal::Operation;

pub struct SiteContents {
    journal: Arc<dyn Journal>,
    entries: RwLock<BTreeMap<String, String>>,
}

impl SiteContents {
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self::restore(BTreeMap::new(), journal)
    }

    pub fn restore(entries: BTreeMap<String, String>, journal: Arc<dyn Journal>) -> Self {
        Self {
            journal,
            entries: RwLock::new(entries),
        }
    }

    /// Value for `key`, or `""` when unset
    pub fn get(&self, key: &str) -> String {
        self.try_get(key).unwrap_or_default()
    }

    pub fn try_get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let _admit = self.journal.admit();
        self.set_with(self.journal.as_ref(), key.into(), value.into())
    }

    /// Returns the previous value, if any
    pub fn remove(&self, key: &str) -> Result<Option<String>> {
        let _admit = self.journal.admit();
        self.remove_with(self.journal.as_ref(), key)
    }

    /// All entries, sorted by key
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn set_with(&self, journal: &dyn Journal, key: String, value: String) -> Result<()> {
        let mut entries = self.entries.write();
        journal.commit(&Operation::SiteContentSet {
            key: key.clone(),
            value: value.clone(),
        })?;
        entries.insert(key, value);
        Ok(())
    }

    fn remove_with(&self, journal: &dyn Journal, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(None);
        }
        journal.commit(&Operation::SiteContentRemoved {
            key: key.to_string(),
        })?;
        Ok(entries.remove(key))
    }

    /// Re-apply a journaled site operation; `Ok(false)` if it is not one
    pub fn replay(&self, operation: &Operation, timestamp: u64) -> Result<bool> {
        let journal = Replay { timestamp };
        match operation {
            Operation::SiteContentSet { key, value } => {
                self.set_with(&journal, key.clone(), value.clone())?;
            }
            Operation::SiteContentRemoved { key } => {
                self.remove_with(&journal, key)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}
