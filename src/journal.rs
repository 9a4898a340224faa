//! Journal Module
//!
//! The seam between the in-memory core and the storage collaborator.
//!
//! Every mutation in the content tree, the syntax registry and the site
//! contents is validated first, then described as an `Operation` and handed
//! to `Journal::commit` while the relevant exclusion scopes are held. Only
//! when the commit succeeds is the change applied in memory, so a failed
//! commit leaves no partial state behind. The returned value is the commit
//! timestamp, which the core stores as `created_at`/`updated_at`.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLockReadGuard;

use crate::error::Result;
use crate::wal::Operation;

/// Durable sink for committed operations
pub trait Journal: Send + Sync {
    /// Persist `operation` and return its commit timestamp (unix millis)
    fn commit(&self, operation: &Operation) -> Result<u64>;

    /// Shared guard held for the whole of one mutation (validate, commit,
    /// apply). Journals that checkpoint take the exclusive side to observe
    /// a state that matches their log exactly.
    fn admit(&self) -> Option<RwLockReadGuard<'_, ()>> {
        None
    }
}

/// Journal without durability; stamps operations with wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct Ephemeral;

impl Journal for Ephemeral {
    fn commit(&self, _operation: &Operation) -> Result<u64> {
        Ok(unix_millis())
    }
}

/// Journal used while replaying recorded operations
///
/// Nothing is written; the recorded commit time is handed back so replayed
/// records keep their original timestamps.
#[derive(Debug, Clone, Copy)]
pub struct Replay {
    pub timestamp: u64,
}

impl Journal for Replay {
    fn commit(&self, _operation: &Operation) -> Result<u64> {
        Ok(self.timestamp)
    }
}

/// Current time in unix milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
