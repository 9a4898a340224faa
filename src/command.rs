//! Command definitions
//!
//! Requests routed through `Engine::execute` and the values they produce.

use crate::model::{
    Column, ColumnId, Extension, MimeType, Page, PageId, PageLayout, Post, PostId, Syntax,
    SyntaxId,
};
use crate::syntax::Resolution;
use crate::tree::Deletion;

/// A single engine request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // -------------------------------------------------------------------------
    // Pages
    // -------------------------------------------------------------------------
    CreatePage { name: String },
    RenamePage { page: PageId, name: String },
    DeletePage { page: PageId },
    ShowPage { page: PageId },
    ListPages,

    // -------------------------------------------------------------------------
    // Columns
    // -------------------------------------------------------------------------
    /// Append when `position` is `None`
    AddColumn { page: PageId, position: Option<usize> },
    MoveColumn { column: ColumnId, position: usize },
    DeleteColumn { column: ColumnId },

    // -------------------------------------------------------------------------
    // Posts
    // -------------------------------------------------------------------------
    /// Append when `position` is `None`
    AddPost {
        column: ColumnId,
        content: String,
        position: Option<usize>,
    },
    EditPost { post: PostId, content: String },
    MovePost { post: PostId, position: usize },
    MovePostToColumn {
        post: PostId,
        column: ColumnId,
        position: usize,
    },
    DeletePost { post: PostId },

    // -------------------------------------------------------------------------
    // Syntaxes
    // -------------------------------------------------------------------------
    RegisterSyntax { display_name: String, ace_mode: String },
    BindExtension { extension: String, syntax: SyntaxId },
    BindMimeType {
        mime_type: String,
        syntax: Option<SyntaxId>,
        integrated: bool,
    },
    ResolveExtension { extension: String },
    ResolveMimeType { mime_type: String },
    ListSyntaxes,

    // -------------------------------------------------------------------------
    // Site contents
    // -------------------------------------------------------------------------
    GetSiteContent { key: String },
    SetSiteContent { key: String, value: String },

    /// Write a snapshot and truncate the WAL
    Checkpoint,
}

impl Command {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreatePage { .. } => "page.create",
            Command::RenamePage { .. } => "page.rename",
            Command::DeletePage { .. } => "page.delete",
            Command::ShowPage { .. } => "page.show",
            Command::ListPages => "page.list",
            Command::AddColumn { .. } => "column.add",
            Command::MoveColumn { .. } => "column.move",
            Command::DeleteColumn { .. } => "column.delete",
            Command::AddPost { .. } => "post.add",
            Command::EditPost { .. } => "post.edit",
            Command::MovePost { .. } => "post.move",
            Command::MovePostToColumn { .. } => "post.reparent",
            Command::DeletePost { .. } => "post.delete",
            Command::RegisterSyntax { .. } => "syntax.register",
            Command::BindExtension { .. } => "syntax.bind_ext",
            Command::BindMimeType { .. } => "syntax.bind_mime",
            Command::ResolveExtension { .. } => "syntax.resolve_ext",
            Command::ResolveMimeType { .. } => "syntax.resolve_mime",
            Command::ListSyntaxes => "syntax.list",
            Command::GetSiteContent { .. } => "site.get",
            Command::SetSiteContent { .. } => "site.set",
            Command::Checkpoint => "checkpoint",
        }
    }

    /// Whether the command goes through the journal
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Command::ShowPage { .. }
                | Command::ListPages
                | Command::ResolveExtension { .. }
                | Command::ResolveMimeType { .. }
                | Command::ListSyntaxes
                | Command::GetSiteContent { .. }
                | Command::Checkpoint
        )
    }
}

/// Result of a successfully executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Page(Page),
    Pages(Vec<Page>),
    Layout(PageLayout),
    Column(Column),
    Post(Post),
    Deleted(Deletion),
    Syntax(Syntax),
    Syntaxes(Vec<Syntax>),
    Extension(Extension),
    MimeType(MimeType),
    Resolution(Resolution),
    Value(String),
    Done,
}
