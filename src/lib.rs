//! # pagegrid
//!
//! Ordered content engine for page layouts:
//! - Pages own ordered columns, columns own ordered posts
//! - Dense 0-based positions under insert, move, remove and reparent
//! - Per-parent exclusion scopes (different parents never contend)
//! - Syntax registry keyed by file extension and MIME type
//! - Write-ahead log plus snapshot checkpoints for durability
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Engine::execute(Command)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!        ┌──────────────┼────────────────┐
//!        ▼              ▼                ▼
//! ┌─────────────┐ ┌──────────────┐ ┌─────────────┐
//! │ ContentTree │ │SyntaxRegistry│ │SiteContents │
//! │ (scopes per │ │   (RwLock)   │ │  (RwLock)   │
//! │   parent)   │ └──────┬───────┘ └──────┬──────┘
//! └──────┬──────┘        │                │
//!        └───────────────┼────────────────┘
//!                        ▼  Journal::commit
//!                 ┌─────────────┐      checkpoint     ┌──────────────┐
//!                 │     WAL     │ ──────────────────► │ snapshot.bin │
//!                 │  (Append)   │                     └──────────────┘
//!                 └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod model;

pub mod journal;
pub mod ordering;
pub mod tree;
pub mod syntax;
pub mod site;

pub mod wal;
pub mod snapshot;
pub mod command;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EntityKind, GridError, Result};
pub use config::{Config, PostMovePolicy, WalSyncStrategy};
pub use model::{
    Column, ColumnId, ColumnLayout, Extension, ExtensionId, MimeType, MimeTypeId, Page, PageId,
    PageLayout, Post, PostId, Syntax, SyntaxId, Timestamps,
};
pub use journal::{Ephemeral, Journal};
pub use tree::{ContentTree, Deletion};
pub use syntax::{Resolution, SyntaxRegistry};
pub use site::SiteContents;
pub use command::{Command, Outcome};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pagegrid
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
