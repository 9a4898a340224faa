//! Tests for the content tree
//!
//! These tests verify:
//! - Page / column / post CRUD and ordering
//! - Cascading deletes (children first, siblings renumbered)
//! - Post moves between columns and the same-page policy
//! - Commit timestamps and failed commits
//! - Replay reproduces the journaled state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use pagegrid::wal::Operation;
use pagegrid::{
    ColumnId, ContentTree, EntityKind, Ephemeral, GridError, Journal, PageId, PostId,
    PostMovePolicy, Result,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_tree() -> ContentTree {
    ContentTree::new(Arc::new(Ephemeral), PostMovePolicy::Unrestricted)
}

/// Hands out increasing timestamps and can be switched to fail
#[derive(Default)]
struct ScriptedJournal {
    clock: AtomicU64,
    failing: AtomicBool,
    log: Mutex<Vec<(Operation, u64)>>,
}

impl Journal for ScriptedJournal {
    fn commit(&self, operation: &Operation) -> Result<u64> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GridError::StorageFailure("disk unplugged".to_string()));
        }
        let stamp = self.clock.fetch_add(10, Ordering::SeqCst) + 10;
        self.log.lock().unwrap().push((operation.clone(), stamp));
        Ok(stamp)
    }
}

fn post_ids(tree: &ContentTree, column: ColumnId) -> Vec<PostId> {
    tree.posts(column).unwrap().iter().map(|p| p.id).collect()
}

fn column_ids(tree: &ContentTree, page: PageId) -> Vec<ColumnId> {
    tree.columns(page).unwrap().iter().map(|c| c.id).collect()
}

// =============================================================================
// Page Tests
// =============================================================================

#[test]
fn test_create_and_rename_page() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    assert_eq!(tree.page(page.id).unwrap().name, "home");

    let renamed = tree.rename_page(page.id, "landing").unwrap();
    assert_eq!(renamed.name, "landing");
    assert_eq!(tree.pages().len(), 1);
}

#[test]
fn test_unknown_page() {
    let tree = setup_tree();
    assert!(matches!(
        tree.add_column(PageId(42)),
        Err(GridError::NotFound { kind: EntityKind::Page, .. })
    ));
    assert!(matches!(
        tree.rename_page(PageId(42), "x"),
        Err(GridError::NotFound { kind: EntityKind::Page, .. })
    ));
}

#[test]
fn test_delete_page_cascades() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    let other = tree.create_page("about").unwrap();
    let left = tree.add_column(page.id).unwrap();
    let right = tree.add_column(page.id).unwrap();
    let kept = tree.add_column(other.id).unwrap();
    for i in 0..3 {
        tree.add_post(left.id, format!("l{}", i)).unwrap();
        tree.add_post(right.id, format!("r{}", i)).unwrap();
    }
    let survivor = tree.add_post(kept.id, "stays").unwrap();

    let deletion = tree.delete_page(page.id).unwrap();
    assert_eq!(deletion.page, Some(page.id));
    assert_eq!(deletion.columns, vec![left.id, right.id]);
    assert_eq!(deletion.posts.len(), 6);

    assert!(tree.page(page.id).is_err());
    assert!(tree.column(left.id).is_err());
    assert_eq!(tree.page_count(), 1);
    assert_eq!(tree.column_count(), 1);
    assert_eq!(tree.post_count(), 1);
    assert_eq!(tree.post(survivor.id).unwrap().content, "stays");
}

// =============================================================================
// Column Tests
// =============================================================================

#[test]
fn test_column_scenario_move_then_delete() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    let a = tree.add_column(page.id).unwrap();
    let b = tree.add_column(page.id).unwrap();
    let c = tree.add_column(page.id).unwrap();

    let moved = tree.move_column(b.id, 0).unwrap();
    assert_eq!(moved.position, 0);
    assert_eq!(column_ids(&tree, page.id), vec![b.id, a.id, c.id]);

    tree.delete_column(a.id).unwrap();
    let columns = tree.columns(page.id).unwrap();
    let layout: Vec<_> = columns.iter().map(|col| (col.id, col.position)).collect();
    assert_eq!(layout, vec![(b.id, 0), (c.id, 1)]);
}

#[test]
fn test_insert_column_at_position() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    let a = tree.add_column(page.id).unwrap();
    let b = tree.add_column(page.id).unwrap();

    let mid = tree.insert_column_at(page.id, 1).unwrap();
    assert_eq!(mid.position, 1);
    assert_eq!(column_ids(&tree, page.id), vec![a.id, mid.id, b.id]);
    assert_eq!(tree.column(b.id).unwrap().position, 2);

    assert!(matches!(
        tree.insert_column_at(page.id, 4),
        Err(GridError::OutOfRange { position: 4, len: 3 })
    ));
}

#[test]
fn test_delete_column_removes_all_posts() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    let first = tree.add_column(page.id).unwrap();
    let doomed = tree.add_column(page.id).unwrap();
    let last = tree.add_column(page.id).unwrap();
    for i in 0..5 {
        tree.add_post(doomed.id, format!("post {}", i)).unwrap();
    }

    let deletion = tree.delete_column(doomed.id).unwrap();
    assert_eq!(deletion.posts.len(), 5);
    assert_eq!(deletion.columns, vec![doomed.id]);
    assert_eq!(tree.post_count(), 0);
    for post in &deletion.posts {
        assert!(tree.post(*post).is_err());
    }

    assert_eq!(column_ids(&tree, page.id), vec![first.id, last.id]);
    assert_eq!(tree.column(last.id).unwrap().position, 1);
    assert!(matches!(
        tree.add_post(doomed.id, "late"),
        Err(GridError::NotFound { kind: EntityKind::Column, .. })
    ));
}

// =============================================================================
// Post Tests
// =============================================================================

#[test]
fn test_post_ordering_and_update() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    let column = tree.add_column(page.id).unwrap();
    let first = tree.add_post(column.id, "first").unwrap();
    let second = tree.add_post(column.id, "second").unwrap();
    let zeroth = tree.insert_post_at(column.id, 0, "zeroth").unwrap();

    assert_eq!(post_ids(&tree, column.id), vec![zeroth.id, first.id, second.id]);

    let edited = tree.update_post(first.id, "edited").unwrap();
    assert_eq!(edited.position, 1);
    assert_eq!(edited.content, "edited");

    tree.move_post(zeroth.id, 2).unwrap();
    assert_eq!(post_ids(&tree, column.id), vec![first.id, second.id, zeroth.id]);

    tree.delete_post(second.id).unwrap();
    let posts = tree.posts(column.id).unwrap();
    let positions: Vec<_> = posts.iter().map(|p| (p.id, p.position)).collect();
    assert_eq!(positions, vec![(first.id, 0), (zeroth.id, 1)]);
}

#[test]
fn test_move_post_between_columns() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    let left = tree.add_column(page.id).unwrap();
    let right = tree.add_column(page.id).unwrap();
    let a = tree.add_post(left.id, "a").unwrap();
    let b = tree.add_post(left.id, "b").unwrap();
    let c = tree.add_post(right.id, "c").unwrap();

    let moved = tree.move_post_to_column(a.id, right.id, 1).unwrap();
    assert_eq!(moved.column, right.id);
    assert_eq!(moved.position, 1);
    assert_eq!(moved.content, "a");

    assert_eq!(post_ids(&tree, left.id), vec![b.id]);
    assert_eq!(tree.post(b.id).unwrap().position, 0);
    assert_eq!(post_ids(&tree, right.id), vec![c.id, a.id]);
}

#[test]
fn test_same_page_policy_rejects_cross_page_move() {
    let tree = ContentTree::new(Arc::new(Ephemeral), PostMovePolicy::SamePage);
    let home = tree.create_page("home").unwrap();
    let about = tree.create_page("about").unwrap();
    let left = tree.add_column(home.id).unwrap();
    let right = tree.add_column(home.id).unwrap();
    let elsewhere = tree.add_column(about.id).unwrap();
    let post = tree.add_post(left.id, "pinned").unwrap();

    let err = tree.move_post_to_column(post.id, elsewhere.id, 0).unwrap_err();
    match err {
        GridError::CrossPageMismatch { post: p, from, to } => {
            assert_eq!(p, post.id.get());
            assert_eq!(from, home.id.get());
            assert_eq!(to, about.id.get());
        }
        other => panic!("Expected CrossPageMismatch, got {:?}", other),
    }
    assert_eq!(tree.post(post.id).unwrap().column, left.id);

    // Same page is fine
    tree.move_post_to_column(post.id, right.id, 0).unwrap();
    assert_eq!(tree.post(post.id).unwrap().column, right.id);
}

#[test]
fn test_unrestricted_policy_allows_cross_page_move() {
    let tree = setup_tree();
    let home = tree.create_page("home").unwrap();
    let about = tree.create_page("about").unwrap();
    let left = tree.add_column(home.id).unwrap();
    let elsewhere = tree.add_column(about.id).unwrap();
    let post = tree.add_post(left.id, "roaming").unwrap();

    tree.move_post_to_column(post.id, elsewhere.id, 0).unwrap();
    let layout = tree.layout(about.id).unwrap();
    assert_eq!(layout.columns[0].posts[0].id, post.id);
}

#[test]
fn test_layout_is_position_ordered() {
    let tree = setup_tree();
    let page = tree.create_page("home").unwrap();
    let a = tree.add_column(page.id).unwrap();
    let b = tree.add_column(page.id).unwrap();
    tree.add_post(a.id, "a0").unwrap();
    tree.add_post(b.id, "b0").unwrap();
    tree.add_post(b.id, "b1").unwrap();
    tree.move_column(b.id, 0).unwrap();

    let layout = tree.layout(page.id).unwrap();
    assert_eq!(layout.page.name, "home");
    assert_eq!(layout.columns.len(), 2);
    assert_eq!(layout.columns[0].column.id, b.id);
    assert_eq!(layout.columns[0].column.position, 0);
    let contents: Vec<_> = layout.columns[0].posts.iter().map(|p| p.content.as_str()).collect();
    assert_eq!(contents, vec!["b0", "b1"]);
    assert_eq!(layout.columns[1].posts[0].content, "a0");
}

// =============================================================================
// Journal Interaction Tests
// =============================================================================

#[test]
fn test_timestamps_come_from_journal() {
    let journal = Arc::new(ScriptedJournal::default());
    let tree = ContentTree::new(journal.clone(), PostMovePolicy::Unrestricted);

    let page = tree.create_page("home").unwrap();
    let column = tree.add_column(page.id).unwrap();
    let post = tree.add_post(column.id, "draft").unwrap();
    assert_eq!(page.timestamps.created_at, 10);
    assert_eq!(column.timestamps.created_at, 20);
    assert_eq!(post.timestamps.created_at, 30);

    let edited = tree.update_post(post.id, "final").unwrap();
    assert_eq!(edited.timestamps.created_at, 30);
    assert_eq!(edited.timestamps.updated_at, 40);
}

#[test]
fn test_failed_commit_leaves_tree_untouched() {
    let journal = Arc::new(ScriptedJournal::default());
    let tree = ContentTree::new(journal.clone(), PostMovePolicy::Unrestricted);
    let page = tree.create_page("home").unwrap();
    let left = tree.add_column(page.id).unwrap();
    let right = tree.add_column(page.id).unwrap();
    let post = tree.add_post(left.id, "content").unwrap();
    let before = tree.layout(page.id).unwrap();

    journal.failing.store(true, Ordering::SeqCst);
    assert!(tree.create_page("nope").is_err());
    assert!(tree.add_column(page.id).is_err());
    assert!(tree.move_column(right.id, 0).is_err());
    assert!(tree.add_post(left.id, "nope").is_err());
    assert!(tree.update_post(post.id, "changed").is_err());
    assert!(tree.move_post_to_column(post.id, right.id, 0).is_err());
    assert!(tree.delete_post(post.id).is_err());
    assert!(tree.delete_column(left.id).is_err());
    assert!(tree.delete_page(page.id).is_err());

    assert_eq!(tree.layout(page.id).unwrap(), before);
    assert_eq!(tree.page_count(), 1);
    assert_eq!(tree.column_count(), 2);
    assert_eq!(tree.post_count(), 1);
}

#[test]
fn test_replay_reproduces_state() {
    let journal = Arc::new(ScriptedJournal::default());
    let source = ContentTree::new(journal.clone(), PostMovePolicy::Unrestricted);
    let page = source.create_page("home").unwrap();
    let left = source.add_column(page.id).unwrap();
    let right = source.insert_column_at(page.id, 0).unwrap();
    let a = source.add_post(left.id, "a").unwrap();
    let b = source.insert_post_at(left.id, 0, "b").unwrap();
    source.move_post_to_column(a.id, right.id, 0).unwrap();
    source.update_post(b.id, "b2").unwrap();
    source.move_column(left.id, 0).unwrap();
    let doomed = source.create_page("tmp").unwrap();
    source.add_column(doomed.id).unwrap();
    source.delete_page(doomed.id).unwrap();

    let replica = setup_tree();
    for (operation, stamp) in journal.log.lock().unwrap().iter() {
        assert!(replica.replay(operation, *stamp).unwrap());
    }

    assert_eq!(replica.layout(page.id).unwrap(), source.layout(page.id).unwrap());
    assert_eq!(replica.pages(), source.pages());

    // Fresh ids continue past replayed ones
    let next = replica.create_page("next").unwrap();
    assert!(next.id.get() > doomed.id.get());
}

#[test]
fn test_replay_ignores_foreign_operations() {
    let tree = setup_tree();
    let foreign = Operation::SiteContentSet {
        key: "title".to_string(),
        value: "x".to_string(),
    };
    assert!(!tree.replay(&foreign, 1).unwrap());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_posts_across_columns() {
    let tree = Arc::new(setup_tree());
    let page = tree.create_page("home").unwrap();
    let columns: Vec<ColumnId> = (0..4).map(|_| tree.add_column(page.id).unwrap().id).collect();

    let handles: Vec<_> = columns
        .iter()
        .map(|&column| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..50 {
                    let post = tree.insert_post_at(column, 0, format!("p{}", i)).unwrap();
                    if i % 3 == 0 {
                        tree.move_post(post.id, i / 2).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for column in columns {
        let posts = tree.posts(column).unwrap();
        assert_eq!(posts.len(), 50);
        for (expected, post) in posts.iter().enumerate() {
            assert_eq!(post.position, expected);
        }
    }
}

#[test]
fn test_concurrent_cross_column_moves_conserve_posts() {
    let tree = Arc::new(setup_tree());
    let page = tree.create_page("home").unwrap();
    let left = tree.add_column(page.id).unwrap().id;
    let right = tree.add_column(page.id).unwrap().id;
    let posts: Vec<PostId> = (0..20)
        .map(|i| tree.add_post(left, format!("p{}", i)).unwrap().id)
        .collect();

    let handles: Vec<_> = (0..4usize)
        .map(|t| {
            let tree = Arc::clone(&tree);
            let posts = posts.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let post = posts[(i * 7 + t) % posts.len()];
                    let target = if (i + t) % 2 == 0 { left } else { right };
                    tree.move_post_to_column(post, target, 0).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut all = post_ids(&tree, left);
    all.extend(post_ids(&tree, right));
    all.sort_unstable();
    assert_eq!(all, posts);
}
