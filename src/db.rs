//! SQLite connection management.
//!
//! File databases run in WAL mode so readers never block on the single
//! writer: a search issued while a refresh transaction is open sees the last
//! committed state. Foreign keys are enforced on every connection (embeddings
//! cascade with their item).
//!
//! Write transactions start with `BEGIN IMMEDIATE` (see [`begin_write`]):
//! the write lock is taken up front, so a second handle or process waits
//! out the busy timeout instead of failing on a read-to-write upgrade.
//!
//! `:memory:` databases live exactly as long as their one connection, so the
//! pool is pinned to a single connection that is never reaped.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DbConfig;
use crate::error::StoreResult;

/// Create a connection pool for the configured database.
///
/// Creates the database file and its parent directories if needed.
pub async fn connect(config: &DbConfig) -> StoreResult<SqlitePool> {
    if config.is_in_memory() {
        return connect_in_memory().await;
    }

    let db_path = &config.path;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn connect_in_memory() -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Begin a transaction that holds SQLite's write lock from its first
/// statement.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}
