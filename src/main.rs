//! # Comms Harness CLI (`chx`)
//!
//! The `chx` binary drives the sync engine: database setup, source refresh,
//! search, item retrieval, and embedding backfill.
//!
//! ## Usage
//!
//! ```bash
//! chx --config ./config/chx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chx init` | Create the SQLite database and run schema migrations |
//! | `chx sources` | List configured sources and their last successful sync |
//! | `chx sync [SOURCE]` | Refresh all sources, one kind, or one `kind:name` |
//! | `chx search "<term>"` | Search stored items |
//! | `chx get <id>` | Print one item |
//! | `chx stats` | Item and embedding counts per source |
//! | `chx embed pending` | Embed items that are missing or have stale embeddings |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use comms_harness::{
    config, embed_cmd, get, ingest, logging, search, sources, stats, store::Store,
};

/// Comms Harness CLI: a local-first sync engine for chat, mail, issues,
/// notifications, and calendar data.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "chx",
    about = "Comms Harness: sync and search chat, mail, issues, notifications, and calendars",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chx.toml")]
    config: PathBuf,

    /// Verbose logging to stderr. `CHX_LOG` and `RUST_LOG` take precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and applies pending migrations.
    /// Running it again is a no-op.
    Init,

    /// List configured sources and when each last synced successfully.
    Sources,

    /// Run one sync cycle.
    ///
    /// Source format: `all`, `<kind>`, or `<kind>:<name>`.
    /// Examples: `all`, `chat`, `mail:work`, `calendar:personal`.
    Sync {
        #[arg(default_value = "all")]
        source: String,
    },

    /// Search stored items.
    Search {
        /// The search term.
        term: String,

        /// Search mode: `keyword` (FTS5) or `semantic` (embeddings).
        #[arg(long, default_value = "keyword")]
        mode: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Print an item by its numeric id.
    Get { id: i64 },

    /// Show database statistics.
    Stats,

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed items that are missing an embedding or whose content changed.
    Pending {
        /// Maximum number of items to embed in this run.
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = Store::open(&cfg.db).await?;
            store.initialize().await?;
            let versions = store.applied_migrations().await?;
            store.close().await;
            println!(
                "Database initialized at {} (schema v{}).",
                cfg.db.path.display(),
                versions.last().copied().unwrap_or(0)
            );
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Sync { source } => {
            ingest::run_sync_from_config(&cfg, &source).await?;
        }
        Commands::Search { term, mode, limit } => {
            search::run_search(&cfg, &term, &mode, limit).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => {
                embed_cmd::run_embed_pending(&cfg, limit).await?;
            }
        },
    }

    Ok(())
}
