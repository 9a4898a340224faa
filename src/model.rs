//! Model Module
//!
//! Identifiers and records for pages, columns, posts and syntaxes.
//!
//! Parent/child relations are owning-id references (`Column::page`,
//! `Post::column`), never embedded pointers. Positions are 0-based and dense
//! among siblings; they are derived from the ordered collections, so the
//! records handed out here are always a consistent view at read time.

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Page identity
    PageId
);
id_type!(
    /// Column identity
    ColumnId
);
id_type!(
    /// Post identity
    PostId
);
id_type!(
    /// Syntax identity
    SyntaxId
);
id_type!(
    /// Extension binding identity
    ExtensionId
);
id_type!(
    /// MIME type binding identity
    MimeTypeId
);

/// Creation/modification times (unix millis) handed out by the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: u64,
    pub updated_at: u64,
}

impl Timestamps {
    pub fn at(stamp: u64) -> Self {
        Self {
            created_at: stamp,
            updated_at: stamp,
        }
    }

    pub fn touch(&mut self, stamp: u64) {
        self.updated_at = stamp;
    }
}

// =============================================================================
// Content Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub name: String,
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub page: PageId,
    pub position: usize,
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub column: ColumnId,
    pub position: usize,
    pub content: String,
    pub timestamps: Timestamps,
}

/// A page with its columns and their posts, all in position order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub page: Page,
    pub columns: Vec<ColumnLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub column: Column,
    pub posts: Vec<Post>,
}

// =============================================================================
// Syntax Records
// =============================================================================

/// A display syntax and the opaque editor-mode token an editor consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syntax {
    pub id: SyntaxId,
    pub display_name: String,
    pub ace_mode: String,
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub id: ExtensionId,
    /// Normalized: lowercase, no leading dot
    pub name: String,
    pub syntax: SyntaxId,
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeType {
    pub id: MimeTypeId,
    /// Normalized: lowercase, parameters stripped
    pub type_name: String,
    /// Natively supported without a syntax mapping
    pub integrated: bool,
    pub syntax: Option<SyntaxId>,
    pub timestamps: Timestamps,
}
