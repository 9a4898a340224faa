//! Syntax Registry
//!
//! Hash-keyed syntax lookup by extension or MIME type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, GridError, Result};
use crate::journal::{Journal, Replay};
use crate::model::{Extension, ExtensionId, MimeType, MimeTypeId, Syntax, SyntaxId, Timestamps};
use crate::wal::Operation;

use super::key::{extension_of, normalize_extension, normalize_mime_type};

/// Outcome of a MIME type lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Render with this syntax
    Syntax(Syntax),
    /// Natively supported; no syntax mapping needed
    Native,
}

impl Resolution {
    pub fn syntax(&self) -> Option<&Syntax> {
        match self {
            Resolution::Syntax(syntax) => Some(syntax),
            Resolution::Native => None,
        }
    }
}

/// Flat copy of the registry, used for bulk initialization and checkpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub next_id: u64,
    pub syntaxes: Vec<Syntax>,
    pub extensions: Vec<Extension>,
    pub mime_types: Vec<MimeType>,
}

#[derive(Default)]
struct Tables {
    syntaxes: HashMap<SyntaxId, Syntax>,
    /// Keyed by normalized extension
    extensions: HashMap<String, Extension>,
    /// Keyed by normalized MIME type
    mime_types: HashMap<String, MimeType>,
    next_id: u64,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn observe_id(&mut self, id: u64) {
        self.next_id = self.next_id.max(id + 1);
    }

    fn require_syntax(&self, syntax: SyntaxId) -> Result<&Syntax> {
        self.syntaxes
            .get(&syntax)
            .ok_or_else(|| GridError::not_found(EntityKind::Syntax, syntax))
    }

    fn duplicate(&self, key: &str, existing: Option<SyntaxId>) -> GridError {
        let existing = match existing.and_then(|id| self.syntaxes.get(&id)) {
            Some(syntax) => format!("syntax '{}' ({})", syntax.display_name, syntax.id),
            None => "native support".to_string(),
        };
        GridError::DuplicateKey {
            key: key.to_string(),
            existing,
        }
    }
}

/// Registry of syntaxes and their extension / MIME type aliases
///
/// ## Concurrency
/// - Lookups share a read lock
/// - Administrative writes take the write lock for validate, commit, apply
pub struct SyntaxRegistry {
    journal: Arc<dyn Journal>,
    tables: RwLock<Tables>,
}

impl SyntaxRegistry {
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            journal,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Build a registry from persisted rows
    pub fn load(snapshot: RegistrySnapshot, journal: Arc<dyn Journal>) -> Result<Self> {
        let mut tables = Tables::default();
        tables.observe_id(snapshot.next_id.saturating_sub(1));

        for syntax in snapshot.syntaxes {
            if syntax.ace_mode.trim().is_empty() {
                return Err(GridError::EmptyEditorMode(syntax.display_name));
            }
            tables.observe_id(syntax.id.0);
            tables.syntaxes.insert(syntax.id, syntax);
        }
        for mut extension in snapshot.extensions {
            let key = normalize_extension(&extension.name)
                .ok_or_else(|| GridError::InvalidKey(extension.name.clone()))?;
            tables.require_syntax(extension.syntax)?;
            if let Some(existing) = tables.extensions.get(&key) {
                return Err(tables.duplicate(&key, Some(existing.syntax)));
            }
            tables.observe_id(extension.id.0);
            extension.name = key.clone();
            tables.extensions.insert(key, extension);
        }
        for mut mime_type in snapshot.mime_types {
            let key = normalize_mime_type(&mime_type.type_name)
                .ok_or_else(|| GridError::InvalidKey(mime_type.type_name.clone()))?;
            if let Some(syntax) = mime_type.syntax {
                tables.require_syntax(syntax)?;
            }
            if let Some(existing) = tables.mime_types.get(&key) {
                return Err(tables.duplicate(&key, existing.syntax));
            }
            tables.observe_id(mime_type.id.0);
            mime_type.type_name = key.clone();
            tables.mime_types.insert(key, mime_type);
        }

        Ok(Self {
            journal,
            tables: RwLock::new(tables),
        })
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let tables = self.tables.read();
        let mut snapshot = RegistrySnapshot {
            next_id: tables.next_id,
            syntaxes: tables.syntaxes.values().cloned().collect(),
            extensions: tables.extensions.values().cloned().collect(),
            mime_types: tables.mime_types.values().cloned().collect(),
        };
        snapshot.syntaxes.sort_by_key(|s| s.id);
        snapshot.extensions.sort_by_key(|e| e.id);
        snapshot.mime_types.sort_by_key(|m| m.id);
        snapshot
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    pub fn resolve_by_extension(&self, extension: &str) -> Result<Syntax> {
        let key = normalize_extension(extension)
            .ok_or_else(|| GridError::UnknownExtension(extension.to_string()))?;
        let tables = self.tables.read();
        tables
            .extensions
            .get(&key)
            .and_then(|binding| tables.syntaxes.get(&binding.syntax))
            .cloned()
            .ok_or(GridError::UnknownExtension(key))
    }

    /// Bound syntax first; otherwise `Native` for integrated types
    pub fn resolve_by_mime_type(&self, mime_type: &str) -> Result<Resolution> {
        let key = normalize_mime_type(mime_type)
            .ok_or_else(|| GridError::UnknownMimeType(mime_type.to_string()))?;
        let tables = self.tables.read();
        let binding = tables
            .mime_types
            .get(&key)
            .ok_or_else(|| GridError::UnknownMimeType(key.clone()))?;

        match binding.syntax.and_then(|id| tables.syntaxes.get(&id)) {
            Some(syntax) => Ok(Resolution::Syntax(syntax.clone())),
            None if binding.integrated => Ok(Resolution::Native),
            None => Err(GridError::UnknownMimeType(key)),
        }
    }

    /// Resolve by the extension of a file name or path
    pub fn resolve_by_file_name(&self, file_name: &str) -> Result<Syntax> {
        let extension = extension_of(file_name)
            .ok_or_else(|| GridError::UnknownExtension(file_name.to_string()))?;
        self.resolve_by_extension(&extension)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn syntax(&self, syntax: SyntaxId) -> Result<Syntax> {
        self.tables.read().require_syntax(syntax).cloned()
    }

    /// All syntaxes, ascending by id
    pub fn syntaxes(&self) -> Vec<Syntax> {
        let mut syntaxes: Vec<Syntax> = self.tables.read().syntaxes.values().cloned().collect();
        syntaxes.sort_by_key(|s| s.id);
        syntaxes
    }

    pub fn find_by_name(&self, display_name: &str) -> Option<Syntax> {
        self.tables
            .read()
            .syntaxes
            .values()
            .filter(|s| s.display_name.eq_ignore_ascii_case(display_name))
            .min_by_key(|s| s.id)
            .cloned()
    }

    /// Extensions bound to `syntax`, sorted
    pub fn extensions_for(&self, syntax: SyntaxId) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .extensions
            .values()
            .filter(|e| e.syntax == syntax)
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }

    /// MIME types bound to `syntax`, sorted
    pub fn mime_types_for(&self, syntax: SyntaxId) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .mime_types
            .values()
            .filter(|m| m.syntax == Some(syntax))
            .map(|m| m.type_name.clone())
            .collect();
        names.sort();
        names
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub fn register(&self, display_name: impl Into<String>, ace_mode: impl Into<String>) -> Result<Syntax> {
        let _admit = self.journal.admit();
        self.register_with(self.journal.as_ref(), None, display_name.into(), ace_mode.into())
    }

    pub fn update_syntax(
        &self,
        syntax: SyntaxId,
        display_name: impl Into<String>,
        ace_mode: impl Into<String>,
    ) -> Result<Syntax> {
        let _admit = self.journal.admit();
        self.update_with(self.journal.as_ref(), syntax, display_name.into(), ace_mode.into())
    }

    /// Remove a syntax that no binding references
    pub fn unregister(&self, syntax: SyntaxId) -> Result<()> {
        let _admit = self.journal.admit();
        self.unregister_with(self.journal.as_ref(), syntax)
    }

    /// Bind an extension; re-binding to the same syntax is a no-op
    pub fn bind_extension(&self, extension: &str, syntax: SyntaxId) -> Result<Extension> {
        let _admit = self.journal.admit();
        self.bind_extension_with(self.journal.as_ref(), None, extension, syntax)
    }

    pub fn unbind_extension(&self, extension: &str) -> Result<()> {
        let _admit = self.journal.admit();
        self.unbind_extension_with(self.journal.as_ref(), extension)
    }

    /// Bind a MIME type; same syntax with a changed `integrated` flag updates
    /// the flag, same syntax and flag is a no-op
    pub fn bind_mime_type(
        &self,
        mime_type: &str,
        syntax: Option<SyntaxId>,
        integrated: bool,
    ) -> Result<MimeType> {
        let _admit = self.journal.admit();
        self.bind_mime_type_with(self.journal.as_ref(), None, mime_type, syntax, integrated)
    }

    pub fn unbind_mime_type(&self, mime_type: &str) -> Result<()> {
        let _admit = self.journal.admit();
        self.unbind_mime_type_with(self.journal.as_ref(), mime_type)
    }

    fn register_with(
        &self,
        journal: &dyn Journal,
        id: Option<SyntaxId>,
        display_name: String,
        ace_mode: String,
    ) -> Result<Syntax> {
        if ace_mode.trim().is_empty() {
            return Err(GridError::EmptyEditorMode(display_name));
        }

        let mut tables = self.tables.write();
        let id = match id {
            Some(id) if tables.syntaxes.contains_key(&id) => {
                return Err(GridError::StorageFailure(format!("syntax {} already exists", id)));
            }
            Some(id) => id,
            None => SyntaxId(tables.allocate_id()),
        };
        tables.observe_id(id.0);

        let stamp = journal.commit(&Operation::SyntaxRegistered {
            syntax: id,
            display_name: display_name.clone(),
            ace_mode: ace_mode.clone(),
        })?;

        let syntax = Syntax {
            id,
            display_name,
            ace_mode,
            timestamps: Timestamps::at(stamp),
        };
        tables.syntaxes.insert(id, syntax.clone());
        Ok(syntax)
    }

    fn update_with(
        &self,
        journal: &dyn Journal,
        id: SyntaxId,
        display_name: String,
        ace_mode: String,
    ) -> Result<Syntax> {
        if ace_mode.trim().is_empty() {
            return Err(GridError::EmptyEditorMode(display_name));
        }

        let mut tables = self.tables.write();
        tables.require_syntax(id)?;

        let stamp = journal.commit(&Operation::SyntaxUpdated {
            syntax: id,
            display_name: display_name.clone(),
            ace_mode: ace_mode.clone(),
        })?;

        let syntax = tables
            .syntaxes
            .get_mut(&id)
            .ok_or_else(|| GridError::not_found(EntityKind::Syntax, id))?;
        syntax.display_name = display_name;
        syntax.ace_mode = ace_mode;
        syntax.timestamps.touch(stamp);
        Ok(syntax.clone())
    }

    fn unregister_with(&self, journal: &dyn Journal, id: SyntaxId) -> Result<()> {
        let mut tables = self.tables.write();
        tables.require_syntax(id)?;
        let referenced = tables.extensions.values().any(|e| e.syntax == id)
            || tables.mime_types.values().any(|m| m.syntax == Some(id));
        if referenced {
            return Err(GridError::SyntaxInUse(id.0));
        }

        journal.commit(&Operation::SyntaxUnregistered { syntax: id })?;
        tables.syntaxes.remove(&id);
        Ok(())
    }

    fn bind_extension_with(
        &self,
        journal: &dyn Journal,
        id: Option<ExtensionId>,
        extension: &str,
        syntax: SyntaxId,
    ) -> Result<Extension> {
        let key =
            normalize_extension(extension).ok_or_else(|| GridError::InvalidKey(extension.to_string()))?;

        let mut tables = self.tables.write();
        tables.require_syntax(syntax)?;
        if let Some(existing) = tables.extensions.get(&key).cloned() {
            if existing.syntax == syntax {
                return Ok(existing);
            }
            return Err(tables.duplicate(&key, Some(existing.syntax)));
        }

        let id = id.unwrap_or_else(|| ExtensionId(tables.allocate_id()));
        tables.observe_id(id.0);

        let stamp = journal.commit(&Operation::ExtensionBound {
            extension: id,
            name: key.clone(),
            syntax,
        })?;

        let binding = Extension {
            id,
            name: key.clone(),
            syntax,
            timestamps: Timestamps::at(stamp),
        };
        tables.extensions.insert(key, binding.clone());
        Ok(binding)
    }

    fn unbind_extension_with(&self, journal: &dyn Journal, extension: &str) -> Result<()> {
        let key = normalize_extension(extension)
            .ok_or_else(|| GridError::InvalidKey(extension.to_string()))?;

        let mut tables = self.tables.write();
        if !tables.extensions.contains_key(&key) {
            return Err(GridError::not_found(EntityKind::Extension, &key));
        }

        journal.commit(&Operation::ExtensionUnbound { name: key.clone() })?;
        tables.extensions.remove(&key);
        Ok(())
    }

    fn bind_mime_type_with(
        &self,
        journal: &dyn Journal,
        id: Option<MimeTypeId>,
        mime_type: &str,
        syntax: Option<SyntaxId>,
        integrated: bool,
    ) -> Result<MimeType> {
        let key =
            normalize_mime_type(mime_type).ok_or_else(|| GridError::InvalidKey(mime_type.to_string()))?;

        let mut tables = self.tables.write();
        if let Some(syntax) = syntax {
            tables.require_syntax(syntax)?;
        }

        let id = match tables.mime_types.get(&key).cloned() {
            Some(existing) if existing.syntax != syntax => {
                return Err(tables.duplicate(&key, existing.syntax));
            }
            Some(existing) if existing.integrated == integrated => return Ok(existing),
            Some(existing) => existing.id,
            None => id.unwrap_or_else(|| MimeTypeId(tables.allocate_id())),
        };
        tables.observe_id(id.0);

        let stamp = journal.commit(&Operation::MimeTypeBound {
            mime_type: id,
            type_name: key.clone(),
            syntax,
            integrated,
        })?;

        let binding = match tables.mime_types.get_mut(&key) {
            Some(existing) => {
                existing.integrated = integrated;
                existing.timestamps.touch(stamp);
                existing.clone()
            }
            None => {
                let binding = MimeType {
                    id,
                    type_name: key.clone(),
                    integrated,
                    syntax,
                    timestamps: Timestamps::at(stamp),
                };
                tables.mime_types.insert(key, binding.clone());
                binding
            }
        };
        Ok(binding)
    }

    fn unbind_mime_type_with(&self, journal: &dyn Journal, mime_type: &str) -> Result<()> {
        let key = normalize_mime_type(mime_type)
            .ok_or_else(|| GridError::InvalidKey(mime_type.to_string()))?;

        let mut tables = self.tables.write();
        if !tables.mime_types.contains_key(&key) {
            return Err(GridError::not_found(EntityKind::MimeType, &key));
        }

        journal.commit(&Operation::MimeTypeUnbound {
            type_name: key.clone(),
        })?;
        tables.mime_types.remove(&key);
        Ok(())
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Re-apply a journaled registry operation with its recorded timestamp
    ///
    /// Returns `Ok(false)` for operations that do not belong to the registry.
    pub fn replay(&self, operation: &Operation, timestamp: u64) -> Result<bool> {
        let journal = Replay { timestamp };
        match operation {
            Operation::SyntaxRegistered {
                syntax,
                display_name,
                ace_mode,
            } => {
                self.register_with(&journal, Some(*syntax), display_name.clone(), ace_mode.clone())?;
            }
            Operation::SyntaxUpdated {
                syntax,
                display_name,
                ace_mode,
            } => {
                self.update_with(&journal, *syntax, display_name.clone(), ace_mode.clone())?;
            }
            Operation::SyntaxUnregistered { syntax } => {
                self.unregister_with(&journal, *syntax)?;
            }
            Operation::ExtensionBound {
                extension,
                name,
                syntax,
            } => {
                self.bind_extension_with(&journal, Some(*extension), name, *syntax)?;
            }
            Operation::ExtensionUnbound { name } => {
                self.unbind_extension_with(&journal, name)?;
            }
            Operation::MimeTypeBound {
                mime_type,
                type_name,
                syntax,
                integrated,
            } => {
                self.bind_mime_type_with(&journal, Some(*mime_type), type_name, *syntax, *integrated)?;
            }
            Operation::MimeTypeUnbound { type_name } => {
                self.unbind_mime_type_with(&journal, type_name)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}
