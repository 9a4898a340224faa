//! Content Tree Module
//!
//! Pages own ordered columns, columns own ordered posts.
//!
//! ## Responsibilities
//! - Domain operations over two ordered collections
//!   (page → columns, column → posts)
//! - Child-first cascades on delete
//! - Cross-page post move policy
//! - Replay of journaled tree operations
//!
//! ## Lock Order
//! Page scope before column scope; column scopes in ascending id order.
//! Record maps are leaf locks, taken briefly under any scope.

mod restore;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::PostMovePolicy;
use crate::error::{EntityKind, GridError, Result};
use crate::journal::{Journal, Replay};
use crate::model::{
    Column, ColumnId, ColumnLayout, Page, PageId, PageLayout, Post, PostId, Timestamps,
};
use crate::ordering::{OrderedCollection, Plan, Scope};
use crate::wal::Operation;

pub use restore::TreeSnapshot;

/// Post data that is not derived from the ordering
#[derive(Debug, Clone)]
struct PostRecord {
    content: String,
    timestamps: Timestamps,
}

/// Everything removed by a cascading delete, children first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deletion {
    pub posts: Vec<PostId>,
    pub columns: Vec<ColumnId>,
    pub page: Option<PageId>,
}

/// The page → column → post hierarchy
pub struct ContentTree {
    journal: Arc<dyn Journal>,
    policy: PostMovePolicy,

    pages: RwLock<HashMap<PageId, Page>>,
    columns: OrderedCollection<PageId, ColumnId>,
    posts: OrderedCollection<ColumnId, PostId>,
    column_records: RwLock<HashMap<ColumnId, Timestamps>>,
    post_records: RwLock<HashMap<PostId, PostRecord>>,

    /// Shared id sequence for pages, columns and posts
    next_id: AtomicU64,
}

impl ContentTree {
    pub fn new(journal: Arc<dyn Journal>, policy: PostMovePolicy) -> Self {
        Self {
            journal,
            policy,
            pages: RwLock::new(HashMap::new()),
            columns: OrderedCollection::new(EntityKind::Page, EntityKind::Column),
            posts: OrderedCollection::new(EntityKind::Column, EntityKind::Post),
            column_records: RwLock::new(HashMap::new()),
            post_records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> PostMovePolicy {
        self.policy
    }

    // =========================================================================
    // Pages
    // =========================================================================

    pub fn create_page(&self, name: impl Into<String>) -> Result<Page> {
        let _admit = self.journal.admit();
        let id = PageId(self.allocate_id());
        self.create_page_with(self.journal.as_ref(), id, name.into())
    }

    pub fn rename_page(&self, page: PageId, name: impl Into<String>) -> Result<Page> {
        let _admit = self.journal.admit();
        self.rename_page_with(self.journal.as_ref(), page, name.into())
    }

    /// Delete a page, its columns and their posts
    pub fn delete_page(&self, page: PageId) -> Result<Deletion> {
        let _admit = self.journal.admit();
        self.delete_page_with(self.journal.as_ref(), page)
    }

    fn create_page_with(&self, journal: &dyn Journal, id: PageId, name: String) -> Result<Page> {
        self.observe_id(id.0);
        if self.pages.read().contains_key(&id) || self.columns.contains_parent(id) {
            return Err(GridError::StorageFailure(format!("page {} already exists", id)));
        }

        let stamp = journal.commit(&Operation::PageCreated {
            page: id,
            name: name.clone(),
        })?;

        let page = Page {
            id,
            name,
            timestamps: Timestamps::at(stamp),
        };
        self.columns.register_parent(id);
        self.pages.write().insert(id, page.clone());
        Ok(page)
    }

    fn rename_page_with(&self, journal: &dyn Journal, page: PageId, name: String) -> Result<Page> {
        let _scope = self.columns.scope(page)?;

        let stamp = journal.commit(&Operation::PageRenamed {
            page,
            name: name.clone(),
        })?;

        let mut pages = self.pages.write();
        let record = pages
            .get_mut(&page)
            .ok_or_else(|| GridError::not_found(EntityKind::Page, page))?;
        record.name = name;
        record.timestamps.touch(stamp);
        Ok(record.clone())
    }

    fn delete_page_with(&self, journal: &dyn Journal, page: PageId) -> Result<Deletion> {
        let mut posts = Vec::new();
        let columns = self.columns.close_parent(page, |columns| {
            // Column scopes in ascending id order
            let mut ordered = columns.to_vec();
            ordered.sort_unstable();
            let mut post_scopes: HashMap<ColumnId, Scope<'_, ColumnId, PostId>> =
                HashMap::with_capacity(ordered.len());
            for column in ordered {
                post_scopes.insert(column, self.posts.scope(column)?);
            }

            journal.commit(&Operation::PageDeleted { page })?;

            for column in columns {
                if let Some(scope) = post_scopes.remove(column) {
                    posts.extend(scope.seal());
                }
            }
            Ok(())
        })?;

        {
            let mut records = self.post_records.write();
            for post in &posts {
                records.remove(post);
            }
        }
        {
            let mut records = self.column_records.write();
            for column in &columns {
                records.remove(column);
            }
        }
        self.pages.write().remove(&page);

        Ok(Deletion {
            posts,
            columns,
            page: Some(page),
        })
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// Append a new column after the last column of `page`
    pub fn add_column(&self, page: PageId) -> Result<Column> {
        let _admit = self.journal.admit();
        let id = ColumnId(self.allocate_id());
        self.insert_column_with(self.journal.as_ref(), id, page, None)
    }

    /// Insert a new column at `position`, shifting later columns right
    pub fn insert_column_at(&self, page: PageId, position: usize) -> Result<Column> {
        let _admit = self.journal.admit();
        let id = ColumnId(self.allocate_id());
        self.insert_column_with(self.journal.as_ref(), id, page, Some(position))
    }

    pub fn move_column(&self, column: ColumnId, position: usize) -> Result<Column> {
        let _admit = self.journal.admit();
        self.move_column_with(self.journal.as_ref(), column, position)
    }

    /// Delete a column and all of its posts
    pub fn delete_column(&self, column: ColumnId) -> Result<Deletion> {
        let _admit = self.journal.admit();
        self.delete_column_with(self.journal.as_ref(), column)
    }

    fn insert_column_with(
        &self,
        journal: &dyn Journal,
        id: ColumnId,
        page: PageId,
        position: Option<usize>,
    ) -> Result<Column> {
        self.observe_id(id.0);
        let mut stamp = 0;
        let commit = |plans: &[Plan<PageId, ColumnId>]| -> Result<()> {
            let position = plans[0].target().unwrap_or_default();
            stamp = journal.commit(&Operation::ColumnInserted {
                column: id,
                page,
                position,
            })?;
            if !self.posts.register_parent(id) {
                return Err(GridError::StorageFailure(format!(
                    "column {} already exists",
                    id
                )));
            }
            self.column_records
                .write()
                .insert(id, Timestamps::at(stamp));
            Ok(())
        };

        let plan = match position {
            Some(position) => self.columns.insert_at(page, id, position, commit)?,
            None => self.columns.append(page, id, commit)?,
        };

        Ok(Column {
            id,
            page,
            position: plan.target().unwrap_or_default(),
            timestamps: Timestamps::at(stamp),
        })
    }

    fn move_column_with(
        &self,
        journal: &dyn Journal,
        column: ColumnId,
        position: usize,
    ) -> Result<Column> {
        let mut timestamps = Timestamps::default();
        let plan = self.columns.move_item(column, position, |_| {
            let stamp = journal.commit(&Operation::ColumnMoved { column, position })?;
            let mut records = self.column_records.write();
            let record = records
                .get_mut(&column)
                .ok_or_else(|| GridError::not_found(EntityKind::Column, column))?;
            record.touch(stamp);
            timestamps = *record;
            Ok(())
        })?;

        Ok(Column {
            id: column,
            page: plan.parent(),
            position,
            timestamps,
        })
    }

    fn delete_column_with(&self, journal: &dyn Journal, column: ColumnId) -> Result<Deletion> {
        // Page scope first, then the column's own scope
        let mut page_scope = self.columns.scope_of(column)?;
        let removal = page_scope.plan_remove(column)?;
        let posts = self.posts.close_parent(column, |_| {
            journal.commit(&Operation::ColumnDeleted { column })?;
            Ok(())
        })?;
        {
            let mut records = self.post_records.write();
            for post in &posts {
                records.remove(post);
            }
        }
        page_scope.apply(&removal);
        self.column_records.write().remove(&column);

        Ok(Deletion {
            posts,
            columns: vec![column],
            page: None,
        })
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Append a new post after the last post of `column`
    pub fn add_post(&self, column: ColumnId, content: impl Into<String>) -> Result<Post> {
        let _admit = self.journal.admit();
        let id = PostId(self.allocate_id());
        self.insert_post_with(self.journal.as_ref(), id, column, None, content.into())
    }

    /// Insert a new post at `position`, shifting later posts down
    pub fn insert_post_at(
        &self,
        column: ColumnId,
        position: usize,
        content: impl Into<String>,
    ) -> Result<Post> {
        let _admit = self.journal.admit();
        let id = PostId(self.allocate_id());
        self.insert_post_with(self.journal.as_ref(), id, column, Some(position), content.into())
    }

    pub fn update_post(&self, post: PostId, content: impl Into<String>) -> Result<Post> {
        let _admit = self.journal.admit();
        self.update_post_with(self.journal.as_ref(), post, content.into())
    }

    pub fn move_post(&self, post: PostId, position: usize) -> Result<Post> {
        let _admit = self.journal.admit();
        self.move_post_with(self.journal.as_ref(), post, position)
    }

    /// Move a post into `destination` at `position` (the source column closes
    /// its gap)
    ///
    /// Fails with `CrossPageMismatch` under `PostMovePolicy::SamePage` when
    /// the destination column belongs to another page.
    pub fn move_post_to_column(
        &self,
        post: PostId,
        destination: ColumnId,
        position: usize,
    ) -> Result<Post> {
        let _admit = self.journal.admit();
        self.reparent_post_with(self.journal.as_ref(), post, destination, position, true)
    }

    pub fn delete_post(&self, post: PostId) -> Result<Deletion> {
        let _admit = self.journal.admit();
        self.delete_post_with(self.journal.as_ref(), post)
    }

    fn insert_post_with(
        &self,
        journal: &dyn Journal,
        id: PostId,
        column: ColumnId,
        position: Option<usize>,
        content: String,
    ) -> Result<Post> {
        self.observe_id(id.0);
        let mut stamp = 0;
        let commit = |plans: &[Plan<ColumnId, PostId>]| -> Result<()> {
            let position = plans[0].target().unwrap_or_default();
            stamp = journal.commit(&Operation::PostInserted {
                post: id,
                column,
                position,
                content: content.clone(),
            })?;
            self.post_records.write().insert(
                id,
                PostRecord {
                    content: content.clone(),
                    timestamps: Timestamps::at(stamp),
                },
            );
            Ok(())
        };

        let plan = match position {
            Some(position) => self.posts.insert_at(column, id, position, commit)?,
            None => self.posts.append(column, id, commit)?,
        };

        Ok(Post {
            id,
            column,
            position: plan.target().unwrap_or_default(),
            content,
            timestamps: Timestamps::at(stamp),
        })
    }

    fn update_post_with(&self, journal: &dyn Journal, post: PostId, content: String) -> Result<Post> {
        let scope = self.posts.scope_of(post)?;
        let position = scope
            .position_of(post)
            .ok_or_else(|| GridError::not_found(EntityKind::Post, post))?;
        if !self.post_records.read().contains_key(&post) {
            return Err(GridError::not_found(EntityKind::Post, post));
        }

        let stamp = journal.commit(&Operation::PostUpdated {
            post,
            content: content.clone(),
        })?;

        let mut records = self.post_records.write();
        let record = records
            .get_mut(&post)
            .ok_or_else(|| GridError::not_found(EntityKind::Post, post))?;
        record.content = content;
        record.timestamps.touch(stamp);

        Ok(Post {
            id: post,
            column: scope.parent(),
            position,
            content: record.content.clone(),
            timestamps: record.timestamps,
        })
    }

    fn move_post_with(&self, journal: &dyn Journal, post: PostId, position: usize) -> Result<Post> {
        let mut moved = None;
        let plan = self.posts.move_item(post, position, |_| {
            let stamp = journal.commit(&Operation::PostMoved { post, position })?;
            moved = Some(self.touch_post(post, stamp)?);
            Ok(())
        })?;

        let record = moved.ok_or_else(|| GridError::not_found(EntityKind::Post, post))?;
        Ok(Post {
            id: post,
            column: plan.parent(),
            position,
            content: record.content,
            timestamps: record.timestamps,
        })
    }

    fn reparent_post_with(
        &self,
        journal: &dyn Journal,
        post: PostId,
        destination: ColumnId,
        position: usize,
        enforce_policy: bool,
    ) -> Result<Post> {
        let mut moved = None;
        self.posts.reparent(post, destination, position, |plans| {
            let source = plans[0].parent();
            if enforce_policy && self.policy == PostMovePolicy::SamePage && source != destination {
                let from = self.columns.parent_of(source);
                let to = self.columns.parent_of(destination);
                if from != to {
                    return Err(GridError::CrossPageMismatch {
                        post: post.0,
                        from: from.map(PageId::get).unwrap_or_default(),
                        to: to.map(PageId::get).unwrap_or_default(),
                    });
                }
            }

            let stamp = journal.commit(&Operation::PostReparented {
                post,
                column: destination,
                position,
            })?;
            moved = Some(self.touch_post(post, stamp)?);
            Ok(())
        })?;

        let record = moved.ok_or_else(|| GridError::not_found(EntityKind::Post, post))?;
        Ok(Post {
            id: post,
            column: destination,
            position,
            content: record.content,
            timestamps: record.timestamps,
        })
    }

    fn delete_post_with(&self, journal: &dyn Journal, post: PostId) -> Result<Deletion> {
        self.posts.remove(post, |_| {
            journal.commit(&Operation::PostDeleted { post })?;
            self.post_records.write().remove(&post);
            Ok(())
        })?;

        Ok(Deletion {
            posts: vec![post],
            ..Deletion::default()
        })
    }

    fn touch_post(&self, post: PostId, stamp: u64) -> Result<PostRecord> {
        let mut records = self.post_records.write();
        let record = records
            .get_mut(&post)
            .ok_or_else(|| GridError::not_found(EntityKind::Post, post))?;
        record.timestamps.touch(stamp);
        Ok(record.clone())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn page(&self, page: PageId) -> Result<Page> {
        self.pages
            .read()
            .get(&page)
            .cloned()
            .ok_or_else(|| GridError::not_found(EntityKind::Page, page))
    }

    /// All pages, ascending by id
    pub fn pages(&self) -> Vec<Page> {
        let mut pages: Vec<Page> = self.pages.read().values().cloned().collect();
        pages.sort_by_key(|p| p.id);
        pages
    }

    pub fn column(&self, column: ColumnId) -> Result<Column> {
        let scope = self.columns.scope_of(column)?;
        let position = scope
            .position_of(column)
            .ok_or_else(|| GridError::not_found(EntityKind::Column, column))?;
        self.column_at(scope.parent(), column, position)
    }

    pub fn post(&self, post: PostId) -> Result<Post> {
        let scope = self.posts.scope_of(post)?;
        let position = scope
            .position_of(post)
            .ok_or_else(|| GridError::not_found(EntityKind::Post, post))?;
        self.post_at(scope.parent(), post, position)
    }

    /// Columns of `page` in position order
    pub fn columns(&self, page: PageId) -> Result<Vec<Column>> {
        let scope = self.columns.scope(page)?;
        scope
            .items()
            .iter()
            .enumerate()
            .map(|(position, column)| self.column_at(page, *column, position))
            .collect()
    }

    /// Posts of `column` in position order
    pub fn posts(&self, column: ColumnId) -> Result<Vec<Post>> {
        let scope = self.posts.scope(column)?;
        scope
            .items()
            .iter()
            .enumerate()
            .map(|(position, post)| self.post_at(column, *post, position))
            .collect()
    }

    /// A page with its columns and their posts, read under the page scope
    pub fn layout(&self, page: PageId) -> Result<PageLayout> {
        let page_scope = self.columns.scope(page)?;
        let record = self.page(page)?;

        let mut columns = Vec::with_capacity(page_scope.len());
        for (position, column) in page_scope.items().iter().enumerate() {
            let posts = self.posts(*column)?;
            columns.push(ColumnLayout {
                column: self.column_at(page, *column, position)?,
                posts,
            });
        }

        Ok(PageLayout {
            page: record,
            columns,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }

    pub fn column_count(&self) -> usize {
        self.column_records.read().len()
    }

    pub fn post_count(&self) -> usize {
        self.post_records.read().len()
    }

    fn column_at(&self, page: PageId, column: ColumnId, position: usize) -> Result<Column> {
        let timestamps = self
            .column_records
            .read()
            .get(&column)
            .copied()
            .ok_or_else(|| GridError::not_found(EntityKind::Column, column))?;
        Ok(Column {
            id: column,
            page,
            position,
            timestamps,
        })
    }

    fn post_at(&self, column: ColumnId, post: PostId, position: usize) -> Result<Post> {
        let records = self.post_records.read();
        let record = records
            .get(&post)
            .ok_or_else(|| GridError::not_found(EntityKind::Post, post))?;
        Ok(Post {
            id: post,
            column,
            position,
            content: record.content.clone(),
            timestamps: record.timestamps,
        })
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Re-apply a journaled operation with its recorded timestamp
    ///
    /// Returns `Ok(false)` for operations that do not belong to the tree.
    pub fn replay(&self, operation: &Operation, timestamp: u64) -> Result<bool> {
        let journal = Replay { timestamp };
        match operation {
            Operation::PageCreated { page, name } => {
                self.create_page_with(&journal, *page, name.clone())?;
            }
            Operation::PageRenamed { page, name } => {
                self.rename_page_with(&journal, *page, name.clone())?;
            }
            Operation::PageDeleted { page } => {
                self.delete_page_with(&journal, *page)?;
            }
            Operation::ColumnInserted {
                column,
                page,
                position,
            } => {
                self.insert_column_with(&journal, *column, *page, Some(*position))?;
            }
            Operation::ColumnMoved { column, position } => {
                self.move_column_with(&journal, *column, *position)?;
            }
            Operation::ColumnDeleted { column } => {
                self.delete_column_with(&journal, *column)?;
            }
            Operation::PostInserted {
                post,
                column,
                position,
                content,
            } => {
                self.insert_post_with(&journal, *post, *column, Some(*position), content.clone())?;
            }
            Operation::PostUpdated { post, content } => {
                self.update_post_with(&journal, *post, content.clone())?;
            }
            Operation::PostMoved { post, position } => {
                self.move_post_with(&journal, *post, *position)?;
            }
            Operation::PostReparented {
                post,
                column,
                position,
            } => {
                // Already accepted under the policy in force when it was journaled
                self.reparent_post_with(&journal, *post, *column, *position, false)?;
            }
            Operation::PostDeleted { post } => {
                self.delete_post_with(&journal, *post)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    // =========================================================================
    // Id Sequence
    // =========================================================================

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn observe_id(&self, id: u64) {
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}
