//! Configuration for pagegrid
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{GridError, Result};

/// Main configuration for a pagegrid engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── snapshot.bin     (last checkpoint)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Number of WAL entries that triggers an automatic checkpoint
    /// (0 disables automatic checkpoints)
    pub checkpoint_threshold: u64,

    // -------------------------------------------------------------------------
    // Content Tree Configuration
    // -------------------------------------------------------------------------
    /// Whether posts may move between columns of different pages
    pub post_move_policy: PostMovePolicy,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Policy for `move_post_to_column` across pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostMovePolicy {
    /// Posts may move to any column
    #[default]
    Unrestricted,

    /// Posts may only move between columns of the same page
    SamePage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./pagegrid_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            checkpoint_threshold: 10_000,
            post_move_policy: PostMovePolicy::Unrestricted,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that cannot be expressed in the type system
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(GridError::Config("data_dir must not be empty".to_string()));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(GridError::Config(
                "EveryNEntries sync count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the automatic checkpoint threshold (in WAL entries)
    pub fn checkpoint_threshold(mut self, entries: u64) -> Self {
        self.config.checkpoint_threshold = entries;
        self
    }

    /// Set the cross-page post move policy
    pub fn post_move_policy(mut self, policy: PostMovePolicy) -> Self {
        self.config.post_move_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
