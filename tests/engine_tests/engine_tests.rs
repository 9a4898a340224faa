//! Tests for Engine
//!
//! These tests verify:
//! - Command execution across tree, registry and site contents
//! - Persistence across close/reopen (snapshot)
//! - Crash recovery from the WAL (no checkpoint)
//! - Manual and automatic checkpoints
//! - Concurrent access patterns

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::thread;

use pagegrid::config::{Config, WalSyncStrategy};
use pagegrid::engine::Engine;
use pagegrid::{Command, GridError, Outcome, PageId, PostMovePolicy, Resolution};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite) // Sync every write for test reliability
        .checkpoint_threshold(1_000)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(&temp_dir)).unwrap();
    (temp_dir, engine)
}

fn reopen(dir: &TempDir) -> Engine {
    Engine::open(test_config(dir)).unwrap()
}

/// Build a page with two columns and three posts; returns the page id
fn seed(engine: &Engine) -> PageId {
    let tree = engine.tree();
    let page = tree.create_page("home").unwrap();
    let left = tree.add_column(page.id).unwrap();
    let right = tree.add_column(page.id).unwrap();
    tree.add_post(left.id, "hello").unwrap();
    tree.add_post(left.id, "world").unwrap();
    let moved = tree.add_post(right.id, "aside").unwrap();
    tree.move_post_to_column(moved.id, left.id, 0).unwrap();
    tree.move_column(right.id, 0).unwrap();

    let python = engine.registry().register("Python", "python").unwrap();
    engine.registry().bind_extension("py", python.id).unwrap();
    engine.registry().bind_mime_type("text/html", None, true).unwrap();
    engine.site().set("title", "My Site").unwrap();
    page.id
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("grid");

    let engine = Engine::open(Config::builder().data_dir(&data_dir).build()).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("wal.log").exists());
    assert_eq!(engine.data_dir(), data_dir.as_path());
    assert_eq!(engine.wal_entry_count(), 0);
}

#[test]
fn test_open_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 0 })
        .build();
    assert!(matches!(Engine::open(config), Err(GridError::Config(_))));
}

#[test]
fn test_close_then_reopen_restores_everything() {
    let temp_dir = TempDir::new().unwrap();
    let (page, layout, registry) = {
        let engine = reopen(&temp_dir);
        let page = seed(&engine);
        let layout = engine.tree().layout(page).unwrap();
        let registry = engine.registry().snapshot();
        engine.close().unwrap();
        (page, layout, registry)
    };
    assert!(temp_dir.path().join("snapshot.bin").exists());

    let engine = reopen(&temp_dir);
    assert_eq!(engine.wal_entry_count(), 0);
    assert_eq!(engine.tree().layout(page).unwrap(), layout);
    assert_eq!(engine.registry().snapshot(), registry);
    assert_eq!(engine.registry().resolve_by_extension("PY").unwrap().ace_mode, "python");
    assert_eq!(engine.site().get("title"), "My Site");
}

#[test]
fn test_crash_recovery_replays_wal() {
    let temp_dir = TempDir::new().unwrap();
    let (page, layout) = {
        let engine = reopen(&temp_dir);
        let page = seed(&engine);
        let layout = engine.tree().layout(page).unwrap();
        assert!(engine.wal_entry_count() > 0);
        // Dropped without close: no checkpoint
        drop(engine);
        (page, layout)
    };
    assert!(!temp_dir.path().join("snapshot.bin").exists());

    let engine = reopen(&temp_dir);
    assert_eq!(engine.tree().layout(page).unwrap(), layout);
    assert_eq!(engine.site().get("title"), "My Site");
    assert_eq!(
        engine.registry().resolve_by_mime_type("text/html").unwrap(),
        Resolution::Native
    );

    // Replay is followed by a checkpoint
    assert!(temp_dir.path().join("snapshot.bin").exists());
    assert_eq!(engine.wal_entry_count(), 0);
}

#[test]
fn test_recovery_after_checkpoint_and_more_writes() {
    let temp_dir = TempDir::new().unwrap();
    let page = {
        let engine = reopen(&temp_dir);
        let page = seed(&engine);
        engine.checkpoint().unwrap();

        let column = engine.tree().add_column(page).unwrap();
        engine.tree().add_post(column.id, "after checkpoint").unwrap();
        engine.site().remove("title").unwrap();
        drop(engine);
        page
    };

    let engine = reopen(&temp_dir);
    let layout = engine.tree().layout(page).unwrap();
    assert_eq!(layout.columns.len(), 3);
    assert_eq!(layout.columns[2].posts[0].content, "after checkpoint");
    assert_eq!(engine.site().try_get("title"), None);
}

#[test]
fn test_torn_wal_tail_is_discarded() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = reopen(&temp_dir);
        engine.tree().create_page("kept").unwrap();
        drop(engine);
    }
    let mut wal = OpenOptions::new()
        .append(true)
        .open(temp_dir.path().join("wal.log"))
        .unwrap();
    wal.write_all(&[0x07; 11]).unwrap();
    drop(wal);

    let engine = reopen(&temp_dir);
    let pages = engine.tree().pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].name, "kept");
}

#[test]
fn test_corrupt_snapshot_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = reopen(&temp_dir);
        seed(&engine);
        engine.close().unwrap();
    }
    let path = temp_dir.path().join("snapshot.bin");
    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(
        Engine::open(test_config(&temp_dir)),
        Err(GridError::SnapshotCorruption(_))
    ));
}

// =============================================================================
// Checkpoint Tests
// =============================================================================

#[test]
fn test_manual_checkpoint_truncates_wal() {
    let (_temp, engine) = setup_temp_engine();
    seed(&engine);
    let lsn = engine.current_lsn();
    assert!(engine.wal_entry_count() > 0);

    engine.checkpoint().unwrap();
    assert_eq!(engine.wal_entry_count(), 0);
    assert!(engine.snapshot_path().exists());
    // LSNs never restart
    assert_eq!(engine.current_lsn(), lsn);
}

#[test]
fn test_automatic_checkpoint_at_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .checkpoint_threshold(5)
        .build();
    let engine = Engine::open(config).unwrap();

    let page = match engine.execute(Command::CreatePage { name: "home".into() }).unwrap() {
        Outcome::Page(page) => page,
        other => panic!("Expected Page, got {:?}", other),
    };
    for _ in 0..3 {
        engine
            .execute(Command::AddColumn {
                page: page.id,
                position: None,
            })
            .unwrap();
    }
    assert_eq!(engine.wal_entry_count(), 4);

    engine
        .execute(Command::RenamePage {
            page: page.id,
            name: "landing".into(),
        })
        .unwrap();
    assert_eq!(engine.wal_entry_count(), 0);
    assert!(engine.snapshot_path().exists());
    assert_eq!(engine.tree().page(page.id).unwrap().name, "landing");
}

#[test]
fn test_maybe_checkpoint_picks_up_direct_writes() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .checkpoint_threshold(2)
        .build();
    let engine = Engine::open(config).unwrap();

    assert!(!engine.maybe_checkpoint().unwrap());
    engine.site().set("a", "1").unwrap();
    engine.site().set("b", "2").unwrap();
    assert!(engine.maybe_checkpoint().unwrap());
    assert_eq!(engine.wal_entry_count(), 0);
}

// =============================================================================
// Command Execution Tests
// =============================================================================

#[test]
fn test_execute_routes_commands() {
    let (_temp, engine) = setup_temp_engine();

    let page = match engine.execute(Command::CreatePage { name: "home".into() }).unwrap() {
        Outcome::Page(page) => page.id,
        other => panic!("Expected Page, got {:?}", other),
    };
    let column = match engine
        .execute(Command::AddColumn {
            page,
            position: None,
        })
        .unwrap()
    {
        Outcome::Column(column) => column.id,
        other => panic!("Expected Column, got {:?}", other),
    };
    let post = match engine
        .execute(Command::AddPost {
            column,
            content: "hi".into(),
            position: Some(0),
        })
        .unwrap()
    {
        Outcome::Post(post) => post.id,
        other => panic!("Expected Post, got {:?}", other),
    };

    match engine.execute(Command::EditPost { post, content: "bye".into() }).unwrap() {
        Outcome::Post(post) => assert_eq!(post.content, "bye"),
        other => panic!("Expected Post, got {:?}", other),
    }
    match engine.execute(Command::ShowPage { page }).unwrap() {
        Outcome::Layout(layout) => assert_eq!(layout.columns[0].posts[0].content, "bye"),
        other => panic!("Expected Layout, got {:?}", other),
    }

    let syntax = match engine
        .execute(Command::RegisterSyntax {
            display_name: "Ruby".into(),
            ace_mode: "ruby".into(),
        })
        .unwrap()
    {
        Outcome::Syntax(syntax) => syntax.id,
        other => panic!("Expected Syntax, got {:?}", other),
    };
    engine
        .execute(Command::BindExtension {
            extension: "rb".into(),
            syntax,
        })
        .unwrap();
    match engine.execute(Command::ResolveExtension { extension: "RB".into() }).unwrap() {
        Outcome::Syntax(resolved) => assert_eq!(resolved.id, syntax),
        other => panic!("Expected Syntax, got {:?}", other),
    }

    engine
        .execute(Command::SetSiteContent {
            key: "footer".into(),
            value: "(c)".into(),
        })
        .unwrap();
    assert_eq!(
        engine.execute(Command::GetSiteContent { key: "footer".into() }).unwrap(),
        Outcome::Value("(c)".into())
    );
    assert_eq!(
        engine.execute(Command::GetSiteContent { key: "missing".into() }).unwrap(),
        Outcome::Value(String::new())
    );

    match engine.execute(Command::DeletePage { page }).unwrap() {
        Outcome::Deleted(deletion) => {
            assert_eq!(deletion.columns, vec![column]);
            assert_eq!(deletion.posts, vec![post]);
        }
        other => panic!("Expected Deleted, got {:?}", other),
    }
    assert_eq!(engine.execute(Command::ListPages).unwrap(), Outcome::Pages(vec![]));
    assert_eq!(engine.execute(Command::Checkpoint).unwrap(), Outcome::Done);
}

#[test]
fn test_execute_surfaces_errors_without_journaling() {
    let (_temp, engine) = setup_temp_engine();
    let before = engine.wal_entry_count();

    assert!(matches!(
        engine.execute(Command::MoveColumn {
            column: pagegrid::ColumnId(77),
            position: 0
        }),
        Err(GridError::NotFound { .. })
    ));
    assert!(matches!(
        engine.execute(Command::ResolveMimeType { mime_type: "image/png".into() }),
        Err(GridError::UnknownMimeType(_))
    ));
    assert_eq!(engine.wal_entry_count(), before);
}

#[test]
fn test_same_page_policy_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .post_move_policy(PostMovePolicy::SamePage)
        .build();
    let engine = Engine::open(config).unwrap();
    let tree = engine.tree();

    let home = tree.create_page("home").unwrap();
    let about = tree.create_page("about").unwrap();
    let a = tree.add_column(home.id).unwrap();
    let b = tree.add_column(about.id).unwrap();
    let post = tree.add_post(a.id, "stay").unwrap();

    assert!(matches!(
        engine.execute(Command::MovePostToColumn {
            post: post.id,
            column: b.id,
            position: 0
        }),
        Err(GridError::CrossPageMismatch { .. })
    ));
}

#[test]
fn test_cross_page_move_replays_under_stricter_policy() {
    let temp_dir = TempDir::new().unwrap();
    let (post, target) = {
        let engine = reopen(&temp_dir);
        let tree = engine.tree();
        let home = tree.create_page("home").unwrap();
        let about = tree.create_page("about").unwrap();
        let a = tree.add_column(home.id).unwrap();
        let b = tree.add_column(about.id).unwrap();
        let post = tree.add_post(a.id, "travels").unwrap();
        tree.move_post_to_column(post.id, b.id, 0).unwrap();
        // Dropped without close: the move is only in the WAL
        drop(engine);
        (post.id, b.id)
    };

    let config = Config::builder()
        .data_dir(temp_dir.path())
        .post_move_policy(PostMovePolicy::SamePage)
        .build();
    let engine = Engine::open(config).unwrap();

    let recovered = engine.tree().post(post).unwrap();
    assert_eq!(recovered.column, target);
    assert_eq!(recovered.position, 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_with_checkpoints() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .checkpoint_threshold(25)
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());
    let page = engine.tree().create_page("home").unwrap().id;

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let column = match engine
                    .execute(Command::AddColumn {
                        page,
                        position: None,
                    })
                    .unwrap()
                {
                    Outcome::Column(column) => column.id,
                    other => panic!("Expected Column, got {:?}", other),
                };
                for i in 0..40 {
                    engine
                        .execute(Command::AddPost {
                            column,
                            content: format!("t{} p{}", t, i),
                            position: Some(0),
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let layout = engine.tree().layout(page).unwrap();
    assert_eq!(layout.columns.len(), 4);
    for column in &layout.columns {
        assert_eq!(column.posts.len(), 40);
    }

    let engine = Arc::try_unwrap(engine).ok().unwrap();
    drop(engine);
    let reopened = reopen(&temp_dir);
    assert_eq!(reopened.tree().layout(page).unwrap(), layout);
}
