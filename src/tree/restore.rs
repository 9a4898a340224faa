//! Tree snapshots
//!
//! Flat, serializable copy of the tree and the inverse that rebuilds it.
//! Children are regrouped by parent and sorted on `(position, id)` before
//! being renumbered, so persisted positions with gaps or duplicates load as
//! a dense ordering.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PostMovePolicy;
use crate::error::{GridError, Result};
use crate::journal::Journal;
use crate::model::{Column, ColumnId, Page, PageId, Post, PostId, Timestamps};

use super::{ContentTree, PostRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub next_id: u64,
    pub pages: Vec<Page>,
    pub columns: Vec<Column>,
    pub posts: Vec<Post>,
}

impl ContentTree {
    /// Copy the whole tree
    ///
    /// Each page is read under its own scope; callers that need a state
    /// consistent across pages must hold off writers (the engine does this
    /// with its checkpoint gate).
    pub fn snapshot(&self) -> Result<TreeSnapshot> {
        let mut snapshot = TreeSnapshot {
            next_id: self.next_id(),
            ..TreeSnapshot::default()
        };

        for page in self.pages() {
            let layout = self.layout(page.id)?;
            snapshot.pages.push(layout.page);
            for column in layout.columns {
                snapshot.columns.push(column.column);
                snapshot.posts.extend(column.posts);
            }
        }

        Ok(snapshot)
    }

    /// Rebuild a tree from a snapshot
    pub fn restore(
        snapshot: TreeSnapshot,
        journal: Arc<dyn Journal>,
        policy: PostMovePolicy,
    ) -> Result<Self> {
        let tree = ContentTree::new(journal, policy);
        let mut max_id = 0;

        let mut columns_by_page: HashMap<PageId, Vec<(usize, ColumnId, Timestamps)>> =
            HashMap::new();
        for column in snapshot.columns {
            max_id = max_id.max(column.id.0);
            columns_by_page
                .entry(column.page)
                .or_default()
                .push((column.position, column.id, column.timestamps));
        }

        let mut posts_by_column: HashMap<ColumnId, Vec<(usize, PostId, PostRecord)>> =
            HashMap::new();
        for post in snapshot.posts {
            max_id = max_id.max(post.id.0);
            posts_by_column.entry(post.column).or_default().push((
                post.position,
                post.id,
                PostRecord {
                    content: post.content,
                    timestamps: post.timestamps,
                },
            ));
        }

        for page in snapshot.pages {
            max_id = max_id.max(page.id.0);
            let mut columns = columns_by_page.remove(&page.id).unwrap_or_default();
            columns.sort_by_key(|(position, id, _)| (*position, *id));

            let ids: Vec<ColumnId> = columns.iter().map(|(_, id, _)| *id).collect();
            tree.columns.restore_parent(page.id, ids)?;

            let mut column_records = tree.column_records.write();
            for (_, id, timestamps) in columns {
                let mut posts = posts_by_column.remove(&id).unwrap_or_default();
                posts.sort_by_key(|(position, post, _)| (*position, *post));

                let ids: Vec<PostId> = posts.iter().map(|(_, post, _)| *post).collect();
                tree.posts.restore_parent(id, ids)?;

                let mut post_records = tree.post_records.write();
                for (_, post, record) in posts {
                    post_records.insert(post, record);
                }
                column_records.insert(id, timestamps);
            }
            drop(column_records);

            tree.pages.write().insert(page.id, page);
        }

        if let Some(page) = columns_by_page.keys().next() {
            return Err(GridError::SnapshotCorruption(format!(
                "columns reference missing page {}",
                page
            )));
        }
        if let Some(column) = posts_by_column.keys().next() {
            return Err(GridError::SnapshotCorruption(format!(
                "posts reference missing column {}",
                column
            )));
        }

        tree.next_id
            .store(snapshot.next_id.max(max_id + 1), Ordering::SeqCst);
        Ok(tree)
    }
}
