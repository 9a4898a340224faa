//! pagegrid CLI
//!
//! Administrative command-line interface over a local data directory.

use clap::{Parser, Subcommand};
use pagegrid::{
    ColumnId, Command, Config, Engine, Outcome, PageId, PageLayout, PostId, PostMovePolicy,
    Resolution, Syntax, SyntaxId,
};
use tracing_subscriber::{fmt, EnvFilter};

/// pagegrid CLI
#[derive(Parser, Debug)]
#[command(name = "pagegrid-cli")]
#[command(about = "Administer a pagegrid data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./pagegrid_data")]
    data_dir: String,

    /// Only allow posts to move between columns of the same page
    #[arg(long)]
    same_page_moves: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage pages
    #[command(subcommand)]
    Page(PageCommand),

    /// Manage columns
    #[command(subcommand)]
    Column(ColumnCommand),

    /// Manage posts
    #[command(subcommand)]
    Post(PostCommand),

    /// Manage syntaxes and their bindings
    #[command(subcommand)]
    Syntax(SyntaxCommand),

    /// Read or write site contents
    #[command(subcommand)]
    Site(SiteCommand),

    /// Write a snapshot and truncate the WAL
    Checkpoint,
}

#[derive(Subcommand, Debug)]
enum PageCommand {
    /// Create a page
    Create { name: String },
    /// Rename a page
    Rename { page: u64, name: String },
    /// Delete a page with its columns and posts
    Delete { page: u64 },
    /// Print a page layout
    Show { page: u64 },
    /// List all pages
    List,
}

#[derive(Subcommand, Debug)]
enum ColumnCommand {
    /// Add a column to a page (appends unless --position is given)
    Add {
        page: u64,
        #[arg(short, long)]
        position: Option<usize>,
    },
    /// Move a column to a new position
    Move { column: u64, position: usize },
    /// Delete a column and its posts
    Delete { column: u64 },
}

#[derive(Subcommand, Debug)]
enum PostCommand {
    /// Add a post to a column (appends unless --position is given)
    Add {
        column: u64,
        content: String,
        #[arg(short, long)]
        position: Option<usize>,
    },
    /// Replace a post's content
    Edit { post: u64, content: String },
    /// Move a post within its column, or into --column
    Move {
        post: u64,
        position: usize,
        #[arg(short, long)]
        column: Option<u64>,
    },
    /// Delete a post
    Delete { post: u64 },
}

#[derive(Subcommand, Debug)]
enum SyntaxCommand {
    /// Register a syntax
    Register { display_name: String, ace_mode: String },
    /// Bind a file extension to a syntax
    BindExt { extension: String, syntax: u64 },
    /// Bind a MIME type to a syntax and/or mark it natively supported
    BindMime {
        mime_type: String,
        #[arg(short, long)]
        syntax: Option<u64>,
        #[arg(long)]
        integrated: bool,
    },
    /// Resolve a file extension
    ResolveExt { extension: String },
    /// Resolve a MIME type
    ResolveMime { mime_type: String },
    /// List registered syntaxes
    List,
}

#[derive(Subcommand, Debug)]
enum SiteCommand {
    /// Print a value (empty when unset)
    Get { key: String },
    /// Set a value
    Set { key: String, value: String },
}

impl Commands {
    fn into_command(self) -> Command {
        match self {
            Commands::Page(page) => match page {
                PageCommand::Create { name } => Command::CreatePage { name },
                PageCommand::Rename { page, name } => Command::RenamePage {
                    page: PageId(page),
                    name,
                },
                PageCommand::Delete { page } => Command::DeletePage { page: PageId(page) },
                PageCommand::Show { page } => Command::ShowPage { page: PageId(page) },
                PageCommand::List => Command::ListPages,
            },
            Commands::Column(column) => match column {
                ColumnCommand::Add { page, position } => Command::AddColumn {
                    page: PageId(page),
                    position,
                },
                ColumnCommand::Move { column, position } => Command::MoveColumn {
                    column: ColumnId(column),
                    position,
                },
                ColumnCommand::Delete { column } => Command::DeleteColumn {
                    column: ColumnId(column),
                },
            },
            Commands::Post(post) => match post {
                PostCommand::Add {
                    column,
                    content,
                    position,
                } => Command::AddPost {
                    column: ColumnId(column),
                    content,
                    position,
                },
                PostCommand::Edit { post, content } => Command::EditPost {
                    post: PostId(post),
                    content,
                },
                PostCommand::Move {
                    post,
                    position,
                    column: Some(column),
                } => Command::MovePostToColumn {
                    post: PostId(post),
                    column: ColumnId(column),
                    position,
                },
                PostCommand::Move {
                    post,
                    position,
                    column: None,
                } => Command::MovePost {
                    post: PostId(post),
                    position,
                },
                PostCommand::Delete { post } => Command::DeletePost { post: PostId(post) },
            },
            Commands::Syntax(syntax) => match syntax {
                SyntaxCommand::Register {
                    display_name,
                    ace_mode,
                } => Command::RegisterSyntax {
                    display_name,
                    ace_mode,
                },
                SyntaxCommand::BindExt { extension, syntax } => Command::BindExtension {
                    extension,
                    syntax: SyntaxId(syntax),
                },
                SyntaxCommand::BindMime {
                    mime_type,
                    syntax,
                    integrated,
                } => Command::BindMimeType {
                    mime_type,
                    syntax: syntax.map(SyntaxId),
                    integrated,
                },
                SyntaxCommand::ResolveExt { extension } => Command::ResolveExtension { extension },
                SyntaxCommand::ResolveMime { mime_type } => Command::ResolveMimeType { mime_type },
                SyntaxCommand::List => Command::ListSyntaxes,
            },
            Commands::Site(site) => match site {
                SiteCommand::Get { key } => Command::GetSiteContent { key },
                SiteCommand::Set { key, value } => Command::SetSiteContent { key, value },
            },
            Commands::Checkpoint => Command::Checkpoint,
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pagegrid=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let policy = if args.same_page_moves {
        PostMovePolicy::SamePage
    } else {
        PostMovePolicy::Unrestricted
    };
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .post_move_policy(policy)
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = engine.execute(args.command.into_command());
    let close = engine.close();

    match outcome {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = close {
        tracing::error!("Failed to close engine: {}", e);
        std::process::exit(1);
    }
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Page(page) => println!("page {}\t{}", page.id, page.name),
        Outcome::Pages(pages) => {
            for page in pages {
                println!("page {}\t{}", page.id, page.name);
            }
        }
        Outcome::Layout(layout) => print_layout(layout),
        Outcome::Column(column) => {
            println!("column {}\tpage {}\tposition {}", column.id, column.page, column.position)
        }
        Outcome::Post(post) => println!(
            "post {}\tcolumn {}\tposition {}\t{}",
            post.id, post.column, post.position, post.content
        ),
        Outcome::Deleted(deletion) => {
            if let Some(page) = deletion.page {
                println!("deleted page {}", page);
            }
            println!(
                "deleted {} column(s), {} post(s)",
                deletion.columns.len(),
                deletion.posts.len()
            );
        }
        Outcome::Syntax(syntax) => print_syntax(syntax),
        Outcome::Syntaxes(syntaxes) => syntaxes.iter().for_each(print_syntax),
        Outcome::Extension(extension) => {
            println!("extension {}\tsyntax {}", extension.name, extension.syntax)
        }
        Outcome::MimeType(mime_type) => println!(
            "mime {}\tsyntax {}\tintegrated {}",
            mime_type.type_name,
            mime_type
                .syntax
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            mime_type.integrated
        ),
        Outcome::Resolution(Resolution::Syntax(syntax)) => print_syntax(syntax),
        Outcome::Resolution(Resolution::Native) => println!("native"),
        Outcome::Value(value) => println!("{}", value),
        Outcome::Done => println!("ok"),
    }
}

fn print_syntax(syntax: &Syntax) {
    println!("syntax {}\t{}\t{}", syntax.id, syntax.display_name, syntax.ace_mode);
}

fn print_layout(layout: &PageLayout) {
    println!("page {}\t{}", layout.page.id, layout.page.name);
    for column in &layout.columns {
        println!("  [{}] column {}", column.column.position, column.column.id);
        for post in &column.posts {
            println!("    [{}] post {}\t{}", post.position, post.id, post.content);
        }
    }
}
