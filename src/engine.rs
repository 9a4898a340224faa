//! Engine Module
//!
//! Durable host for the content tree, the syntax registry and the site
//! contents.
//!
//! ## Responsibilities
//! - Journal every mutation to the WAL before it is applied
//! - Checkpoint full state to `snapshot.bin` and truncate the WAL
//! - Recover on startup: snapshot first, then WAL replay
//! - Route `Command`s to the components

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::command::{Command, Outcome};
use crate::config::Config;
use crate::error::{GridError, Result};
use crate::journal::{unix_millis, Journal};
use crate::site::SiteContents;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::syntax::SyntaxRegistry;
use crate::tree::ContentTree;
use crate::wal::{Operation, RecoveryResult, WalEntry, WalRecovery, WalWriter};

/// Journal backed by the write-ahead log
///
/// ## Concurrency Model
///
/// - **Mutations** hold `gate` shared for their whole validate / commit /
///   apply sequence; many run at once on different parents
/// - **Checkpoints** hold `gate` exclusively, so the state they copy matches
///   the WAL exactly
/// - The WAL itself is behind its own mutex; appends are serialized in
///   commit order
struct WalJournal {
    wal: Mutex<WalWriter>,
    gate: RwLock<()>,
    /// Set once the WAL holds `threshold` entries
    checkpoint_due: AtomicBool,
    threshold: u64,
}

impl WalJournal {
    fn new(wal: WalWriter, threshold: u64) -> Self {
        Self {
            wal: Mutex::new(wal),
            gate: RwLock::new(()),
            checkpoint_due: AtomicBool::new(false),
            threshold,
        }
    }
}

impl Journal for WalJournal {
    fn commit(&self, operation: &Operation) -> Result<u64> {
        let timestamp = unix_millis();
        let mut wal = self.wal.lock();
        let lsn = wal.append_at(operation.clone(), timestamp)?;

        if self.threshold > 0 && wal.entry_count() >= self.threshold {
            self.checkpoint_due.store(true, Ordering::Release);
        }

        tracing::debug!(lsn, ?operation, "Operation journaled");
        Ok(timestamp)
    }

    fn admit(&self) -> Option<RwLockReadGuard<'_, ()>> {
        Some(self.gate.read())
    }
}

/// The main engine
pub struct Engine {
    config: Config,
    journal: Arc<WalJournal>,
    store: SnapshotStore,

    tree: ContentTree,
    registry: SyntaxRegistry,
    site: SiteContents,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SNAPSHOT_FILENAME: &'static str = "snapshot.bin";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Recover the WAL (drop a torn or corrupted tail)
    /// 3. Load the snapshot, if any
    /// 4. Replay WAL entries newer than the snapshot
    /// 5. Checkpoint if anything was replayed
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        let store = SnapshotStore::new(config.data_dir.join(Self::SNAPSHOT_FILENAME));

        let (entries, recovery) = if wal_path.exists() {
            WalRecovery::recover(&wal_path)?
        } else {
            (Vec::new(), RecoveryResult::default())
        };
        if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
            tracing::info!(
                recovered = recovery.entries_recovered,
                corrupted = recovery.entries_corrupted,
                last_lsn = recovery.last_lsn,
                "WAL recovery complete"
            );
        }

        let snapshot = store.read()?.unwrap_or_default();
        let last_lsn = snapshot.last_lsn;

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        wal.resume_after(last_lsn.max(recovery.last_lsn));

        let journal = Arc::new(WalJournal::new(wal, config.checkpoint_threshold));
        let shared: Arc<dyn Journal> = journal.clone();

        let engine = Self {
            tree: ContentTree::restore(snapshot.tree, shared.clone(), config.post_move_policy)?,
            registry: SyntaxRegistry::load(snapshot.registry, shared.clone())?,
            site: SiteContents::restore(snapshot.site, shared),
            config,
            journal,
            store,
        };

        let mut replayed = 0u64;
        for entry in entries.iter().filter(|entry| entry.lsn > last_lsn) {
            engine.replay(entry)?;
            replayed += 1;
        }

        if replayed > 0 {
            tracing::info!(replayed, "Replayed WAL entries newer than snapshot");
            engine.checkpoint()?;
        }

        tracing::info!(
            data_dir = %engine.config.data_dir.display(),
            pages = engine.tree.page_count(),
            syntaxes = engine.registry.syntaxes().len(),
            "Engine opened"
        );
        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    fn replay(&self, entry: &WalEntry) -> Result<()> {
        let operation = &entry.operation;
        let applied = self
            .tree
            .replay(operation, entry.timestamp)
            .and_then(|done| match done {
                true => Ok(true),
                false => self.registry.replay(operation, entry.timestamp),
            })
            .and_then(|done| match done {
                true => Ok(true),
                false => self.site.replay(operation, entry.timestamp),
            })
            .map_err(|e| {
                GridError::WalCorruption(format!("replay of LSN {} failed: {}", entry.lsn, e))
            })?;

        if !applied {
            return Err(GridError::WalCorruption(format!(
                "LSN {} holds an operation no component accepts",
                entry.lsn
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Execute a command
    ///
    /// Routes commands to the owning component, then checkpoints if the WAL
    /// has grown past the configured threshold.
    pub fn execute(&self, command: Command) -> Result<Outcome> {
        let name = command.name();
        let mutation = command.is_mutation();
        tracing::trace!(command = name, "Executing");

        let outcome = self.route(command)?;
        if mutation {
            self.maybe_checkpoint()?;
        }
        Ok(outcome)
    }

    fn route(&self, command: Command) -> Result<Outcome> {
        let tree = &self.tree;
        let registry = &self.registry;

        let outcome = match command {
            Command::CreatePage { name } => Outcome::Page(tree.create_page(name)?),
            Command::RenamePage { page, name } => Outcome::Page(tree.rename_page(page, name)?),
            Command::DeletePage { page } => Outcome::Deleted(tree.delete_page(page)?),
            Command::ShowPage { page } => Outcome::Layout(tree.layout(page)?),
            Command::ListPages => Outcome::Pages(tree.pages()),

            Command::AddColumn { page, position } => Outcome::Column(match position {
                Some(position) => tree.insert_column_at(page, position)?,
                None => tree.add_column(page)?,
            }),
            Command::MoveColumn { column, position } => {
                Outcome::Column(tree.move_column(column, position)?)
            }
            Command::DeleteColumn { column } => Outcome::Deleted(tree.delete_column(column)?),

            Command::AddPost {
                column,
                content,
                position,
            } => Outcome::Post(match position {
                Some(position) => tree.insert_post_at(column, position, content)?,
                None => tree.add_post(column, content)?,
            }),
            Command::EditPost { post, content } => Outcome::Post(tree.update_post(post, content)?),
            Command::MovePost { post, position } => Outcome::Post(tree.move_post(post, position)?),
            Command::MovePostToColumn {
                post,
                column,
                position,
            } => Outcome::Post(tree.move_post_to_column(post, column, position)?),
            Command::DeletePost { post } => Outcome::Deleted(tree.delete_post(post)?),

            Command::RegisterSyntax {
                display_name,
                ace_mode,
            } => Outcome::Syntax(registry.register(display_name, ace_mode)?),
            Command::BindExtension { extension, syntax } => {
                Outcome::Extension(registry.bind_extension(&extension, syntax)?)
            }
            Command::BindMimeType {
                mime_type,
                syntax,
                integrated,
            } => Outcome::MimeType(registry.bind_mime_type(&mime_type, syntax, integrated)?),
            Command::ResolveExtension { extension } => {
                Outcome::Syntax(registry.resolve_by_extension(&extension)?)
            }
            Command::ResolveMimeType { mime_type } => {
                Outcome::Resolution(registry.resolve_by_mime_type(&mime_type)?)
            }
            Command::ListSyntaxes => Outcome::Syntaxes(registry.syntaxes()),

            Command::GetSiteContent { key } => Outcome::Value(self.site.get(&key)),
            Command::SetSiteContent { key, value } => {
                self.site.set(key, value)?;
                Outcome::Done
            }

            Command::Checkpoint => {
                self.checkpoint()?;
                Outcome::Done
            }
        };
        Ok(outcome)
    }

    // =========================================================================
    // Checkpointing
    // =========================================================================

    /// Write a snapshot of the full state and truncate the WAL
    ///
    /// Waits for in-flight mutations and holds new ones off until done.
    pub fn checkpoint(&self) -> Result<()> {
        let _gate = self.journal.gate.write();

        let last_lsn = self.journal.wal.lock().current_lsn().saturating_sub(1);
        let snapshot = Snapshot {
            last_lsn,
            tree: self.tree.snapshot()?,
            registry: self.registry.snapshot(),
            site: self.site.snapshot(),
        };
        let bytes = self.store.write(&snapshot)?;

        let mut wal = self.journal.wal.lock();
        let dropped = wal.entry_count();
        wal.truncate()?;
        self.journal.checkpoint_due.store(false, Ordering::Release);

        tracing::info!(last_lsn, bytes, wal_entries = dropped, "Checkpoint complete");
        Ok(())
    }

    /// Checkpoint if the WAL has reached `checkpoint_threshold` entries
    ///
    /// Returns whether a checkpoint ran. Mutations made directly through the
    /// component accessors are picked up here or on the next `execute`.
    pub fn maybe_checkpoint(&self) -> Result<bool> {
        if !self.journal.checkpoint_due.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.checkpoint()?;
        Ok(true)
    }

    /// Close the engine gracefully
    ///
    /// Checkpoints any journaled work and syncs the WAL.
    pub fn close(self) -> Result<()> {
        if self.wal_entry_count() > 0 {
            self.checkpoint()?;
        }
        self.journal.wal.lock().sync()?;
        tracing::info!(data_dir = %self.config.data_dir.display(), "Engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn tree(&self) -> &ContentTree {
        &self.tree
    }

    pub fn registry(&self) -> &SyntaxRegistry {
        &self.registry
    }

    pub fn site(&self) -> &SiteContents {
        &self.site
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn wal_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::WAL_FILENAME)
    }

    pub fn snapshot_path(&self) -> &Path {
        self.store.path()
    }

    /// Entries written to the WAL since the last checkpoint
    pub fn wal_entry_count(&self) -> u64 {
        self.journal.wal.lock().entry_count()
    }

    /// LSN the next journaled operation will receive
    pub fn current_lsn(&self) -> u64 {
        self.journal.wal.lock().current_lsn()
    }
}
