//! Database schema migrations.
//!
//! Migrations are applied in ascending version order. Each one runs in its
//! own transaction together with the `schema_migrations` row that records it,
//! and the ledger is re-checked inside that transaction, so re-running is a
//! no-op and a crash never leaves a half-applied version behind.

use sqlx::SqlitePool;

use crate::db;
use crate::error::{StoreError, StoreResult};

/// A schema change: a version, a description, and its statements.
///
/// Statements are listed individually because trigger bodies contain `;`.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

const ITEMS_AND_EMBEDDINGS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_key TEXT NOT NULL UNIQUE CHECK (length(source_key) > 0),
        source TEXT NOT NULL,
        title TEXT NOT NULL CHECK (length(trim(title)) > 0),
        content TEXT NOT NULL,
        url TEXT,
        author TEXT,
        occurred_at INTEGER,
        metadata_json TEXT NOT NULL DEFAULT '{}',
        content_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_source ON items(source)",
    "CREATE INDEX IF NOT EXISTS idx_items_updated_at ON items(updated_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        vector BLOB NOT NULL,
        model_version TEXT NOT NULL CHECK (length(model_version) > 0),
        content_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(item_id, model_version)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_embeddings_item_id ON embeddings(item_id)",
    r#"
    CREATE TABLE IF NOT EXISTS config_versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL UNIQUE,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
];

const ITEMS_FTS: &[&str] = &[
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
        title,
        content,
        content = 'items',
        content_rowid = 'id',
        tokenize = 'unicode61 remove_diacritics 2'
    )
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS items_fts_insert AFTER INSERT ON items BEGIN
        INSERT INTO items_fts(rowid, title, content)
        VALUES (new.id, new.title, new.content);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS items_fts_delete AFTER DELETE ON items BEGIN
        INSERT INTO items_fts(items_fts, rowid, title, content)
        VALUES ('delete', old.id, old.title, old.content);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS items_fts_update AFTER UPDATE OF title, content ON items BEGIN
        INSERT INTO items_fts(items_fts, rowid, title, content)
        VALUES ('delete', old.id, old.title, old.content);
        INSERT INTO items_fts(rowid, title, content)
        VALUES (new.id, new.title, new.content);
    END
    "#,
    // Index rows written before the index existed.
    "INSERT INTO items_fts(items_fts) VALUES ('rebuild')",
];

/// All migrations, in ascending version order.
pub fn all_migrations() -> &'static [Migration] {
    const MIGRATIONS: &[Migration] = &[
        Migration {
            version: 1,
            description: "items, embeddings, config_versions",
            statements: ITEMS_AND_EMBEDDINGS,
        },
        Migration {
            version: 2,
            description: "full-text index over items(title, content)",
            statements: ITEMS_FTS,
        },
    ];
    MIGRATIONS
}

/// Highest version in [`all_migrations`].
pub fn latest_version() -> i64 {
    all_migrations().last().map(|m| m.version).unwrap_or(0)
}

/// Apply every pending migration. Returns the versions applied by this call.
pub async fn run_migrations(pool: &SqlitePool) -> StoreResult<Vec<i64>> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut applied = Vec::new();
    for migration in all_migrations() {
        if apply(pool, migration).await.map_err(|source| StoreError::Migration {
            version: migration.version,
            description: migration.description,
            source,
        })? {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
            applied.push(migration.version);
        }
    }
    Ok(applied)
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<bool, sqlx::Error> {
    let mut tx = db::begin_write(pool).await?;

    let already: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?")
            .bind(migration.version)
            .fetch_one(&mut *tx)
            .await?;
    if already {
        tx.rollback().await?;
        return Ok(false);
    }

    for statement in migration.statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query("INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.description)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Versions recorded in the ledger, ascending.
pub async fn applied_versions(pool: &SqlitePool) -> StoreResult<Vec<i64>> {
    let versions = sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await?;
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_strictly_ascending() {
        let versions: Vec<i64> = all_migrations().iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(latest_version(), *versions.last().unwrap());
    }

    #[tokio::test]
    async fn rerun_is_noop() {
        let pool = crate::db::connect(&crate::config::DbConfig::in_memory())
            .await
            .unwrap();
        let first = run_migrations(&pool).await.unwrap();
        assert_eq!(first, vec![1, 2]);
        let second = run_migrations(&pool).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(applied_versions(&pool).await.unwrap(), vec![1, 2]);
    }
}
