//! Transactional storage engine.
//!
//! [`Store`] owns the SQLite pool and is the only way data reaches the
//! database. It starts uninitialized; [`Store::initialize`] applies the
//! schema migrations exactly once per process and every other operation
//! fails with [`StoreError::NotInitialized`] until it has.
//!
//! All writers take the store-wide write gate, so concurrent batches queue
//! instead of contending for SQLite's write lock. Readers never take it.
//!
//! The `items_fts` index is maintained by triggers on `items`, so every
//! write below keeps the relational rows and the search index consistent
//! inside the same transaction.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::config::DbConfig;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity};
use crate::error::{StoreError, StoreResult};
use crate::migrate;
use crate::models::{
    from_millis, to_millis, ConfigVersion, Embedding, Item, ItemFilter, NewItem, SearchHit,
    SimilarItem, UpsertSummary,
};
use crate::search::fts_match_expression;

const ITEM_COLUMNS: &str = "id, source_key, source, title, content, url, author, occurred_at, \
     metadata_json, content_hash, created_at, updated_at";

/// Config key under which a source's last successful sync time is kept.
pub fn checkpoint_key(source_label: &str) -> String {
    format!("sync.{}.last_success", source_label)
}

/// Everything one refresh cycle persists, written in a single transaction.
#[derive(Debug, Clone, Default)]
pub struct RefreshBatch {
    pub items: Vec<NewItem>,
    /// Labels of the sources that fetched successfully this cycle.
    pub succeeded_sources: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Per-source row counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCount {
    pub source: String,
    pub items: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

struct Inner {
    pool: SqlitePool,
    ready: OnceCell<()>,
    write_gate: Mutex<()>,
}

/// Handle to the item store. Cloning is cheap and clones share the pool,
/// the init state, and the write gate.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Connect to the configured database. The store is not usable until
    /// [`Store::initialize`] has run.
    pub async fn open(config: &DbConfig) -> StoreResult<Self> {
        let pool = db::connect(config).await?;
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                ready: OnceCell::new(),
                write_gate: Mutex::new(()),
            }),
        })
    }

    pub async fn in_memory() -> StoreResult<Self> {
        Self::open(&DbConfig::in_memory()).await
    }

    /// Apply pending migrations. Safe to call repeatedly and from many tasks
    /// at once; only the first call does any work.
    pub async fn initialize(&self) -> StoreResult<()> {
        let pool = &self.inner.pool;
        self.inner
            .ready
            .get_or_try_init(|| async move {
                let applied = migrate::run_migrations(pool).await?;
                tracing::debug!(applied = ?applied, "store initialized");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.ready.initialized()
    }

    fn ensure_ready(&self) -> StoreResult<&SqlitePool> {
        if self.inner.ready.initialized() {
            Ok(&self.inner.pool)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Migration versions recorded in the ledger.
    pub async fn applied_migrations(&self) -> StoreResult<Vec<i64>> {
        let pool = self.ensure_ready()?;
        migrate::applied_versions(pool).await
    }

    /// Close the pool. Later operations fail with a storage error.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Insert or update every item by `source_key` in one transaction.
    /// Any failing row rolls back the whole batch.
    pub async fn upsert_items(&self, items: &[NewItem]) -> StoreResult<UpsertSummary> {
        let pool = self.ensure_ready()?;
        let _gate = self.inner.write_gate.lock().await;

        let mut tx = db::begin_write(pool).await?;
        let summary = upsert_in(&mut *tx, items, Utc::now()).await?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Upsert a refresh cycle's items and record a checkpoint for each
    /// successful source, atomically.
    pub async fn apply_refresh(&self, batch: &RefreshBatch) -> StoreResult<UpsertSummary> {
        let pool = self.ensure_ready()?;
        let _gate = self.inner.write_gate.lock().await;

        let mut tx = db::begin_write(pool).await?;
        let summary = upsert_in(&mut *tx, &batch.items, batch.completed_at).await?;
        let stamp = batch.completed_at.to_rfc3339();
        for label in &batch.succeeded_sources {
            set_config_in(&mut *tx, &checkpoint_key(label), &stamp, batch.completed_at).await?;
        }
        tx.commit().await?;

        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            checkpoints = batch.succeeded_sources.len(),
            "refresh batch committed"
        );
        Ok(summary)
    }

    /// Insert a new item. An existing `source_key` is a unique-constraint
    /// error rather than an update.
    pub async fn insert_item(&self, item: &NewItem) -> StoreResult<i64> {
        let pool = self.ensure_ready()?;
        let _gate = self.inner.write_gate.lock().await;

        let now = to_millis(Utc::now());
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO items (source_key, source, title, content, url, author, occurred_at,
                               metadata_json, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&item.source_key)
        .bind(&item.source)
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.url)
        .bind(&item.author)
        .bind(item.occurred_at.map(to_millis))
        .bind(item.metadata.to_string())
        .bind(item.content_hash())
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    /// Delete an item with its embeddings and index entry. Returns whether a
    /// row existed.
    pub async fn delete_item(&self, id: i64) -> StoreResult<bool> {
        let pool = self.ensure_ready()?;
        let _gate = self.inner.write_gate.lock().await;

        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attach (or replace) the vector for `item_id` under `model_version`.
    /// An unknown item is a foreign-key constraint error.
    pub async fn attach_embedding(
        &self,
        item_id: i64,
        vector: &[u8],
        model_version: &str,
    ) -> StoreResult<i64> {
        let pool = self.ensure_ready()?;
        let _gate = self.inner.write_gate.lock().await;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO embeddings (item_id, vector, model_version, content_hash, created_at)
            VALUES (?, ?, ?, COALESCE((SELECT content_hash FROM items WHERE id = ?), ''), ?)
            ON CONFLICT(item_id, model_version) DO UPDATE SET
                vector = excluded.vector,
                content_hash = excluded.content_hash,
                created_at = excluded.created_at
            RETURNING id
            "#,
        )
        .bind(item_id)
        .bind(vector)
        .bind(model_version)
        .bind(item_id)
        .bind(to_millis(Utc::now()))
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    pub async fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        let pool = self.ensure_ready()?;
        let _gate = self.inner.write_gate.lock().await;

        let mut conn = pool.acquire().await?;
        set_config_in(&mut *conn, key, value, Utc::now()).await
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub async fn get_item(&self, id: i64) -> StoreResult<Option<Item>> {
        let pool = self.ensure_ready()?;
        let row = sqlx::query(&format!("SELECT {} FROM items WHERE id = ?", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    pub async fn get_item_by_key(&self, source_key: &str) -> StoreResult<Option<Item>> {
        let pool = self.ensure_ready()?;
        let row = sqlx::query(&format!(
            "SELECT {} FROM items WHERE source_key = ?",
            ITEM_COLUMNS
        ))
        .bind(source_key)
        .fetch_optional(pool)
        .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// Items matching every set field of `filter`, most recently updated
    /// first.
    pub async fn query(&self, filter: &ItemFilter) -> StoreResult<Vec<Item>> {
        let pool = self.ensure_ready()?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM items WHERE 1 = 1", ITEM_COLUMNS));
        if let Some(source) = &filter.source {
            qb.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(prefix) = &filter.key_prefix {
            qb.push(" AND substr(source_key, 1, ")
                .push_bind(prefix.chars().count() as i64)
                .push(") = ")
                .push_bind(prefix.clone());
        }
        if let Some(since) = filter.updated_since {
            qb.push(" AND updated_at >= ").push_bind(to_millis(since));
        }
        qb.push(" ORDER BY updated_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb.build().fetch_all(pool).await?;
        rows.iter().map(item_from_row).collect()
    }

    pub async fn count_items(&self) -> StoreResult<i64> {
        let pool = self.ensure_ready()?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn count_embeddings(&self) -> StoreResult<i64> {
        let pool = self.ensure_ready()?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Item counts grouped by producing source.
    pub async fn source_counts(&self) -> StoreResult<Vec<SourceCount>> {
        let pool = self.ensure_ready()?;
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n, MAX(updated_at) AS last FROM items \
             GROUP BY source ORDER BY source",
        )
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<SourceCount> {
                Ok(SourceCount {
                    source: row.try_get("source")?,
                    items: row.try_get("n")?,
                    last_updated: row.try_get::<Option<i64>, _>("last")?.map(from_millis),
                })
            })
            .collect()
    }

    /// Full-text search over item titles and content, best match first.
    ///
    /// The term is split on whitespace and each word matched literally, so
    /// punctuation never reaches the FTS query parser.
    pub async fn search(&self, term: &str, limit: i64) -> StoreResult<Vec<SearchHit>> {
        let pool = self.ensure_ready()?;
        let Some(expression) = fts_match_expression(term) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT i.id, i.source_key, i.title,
                   snippet(items_fts, 1, '[', ']', '...', 12) AS snippet,
                   -bm25(items_fts) AS score
            FROM items_fts
            JOIN items i ON i.id = items_fts.rowid
            WHERE items_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&expression)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<SearchHit> {
                Ok(SearchHit {
                    item_id: row.try_get("id")?,
                    source_key: row.try_get("source_key")?,
                    title: row.try_get("title")?,
                    snippet: row.try_get("snippet")?,
                    score: row.try_get("score")?,
                })
            })
            .collect()
    }

    pub async fn embeddings_for(&self, item_id: i64) -> StoreResult<Vec<Embedding>> {
        let pool = self.ensure_ready()?;
        let rows = sqlx::query(
            "SELECT id, item_id, vector, model_version, content_hash, created_at \
             FROM embeddings WHERE item_id = ? ORDER BY model_version",
        )
        .bind(item_id)
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<Embedding> {
                Ok(Embedding {
                    id: row.try_get("id")?,
                    item_id: row.try_get("item_id")?,
                    vector: row.try_get("vector")?,
                    model_version: row.try_get("model_version")?,
                    content_hash: row.try_get("content_hash")?,
                    created_at: from_millis(row.try_get("created_at")?),
                })
            })
            .collect()
    }

    /// Items with no embedding for `model_version`, or whose embedding was
    /// computed from older content.
    pub async fn items_missing_embedding(
        &self,
        model_version: &str,
        limit: i64,
    ) -> StoreResult<Vec<Item>> {
        let pool = self.ensure_ready()?;
        let columns = ITEM_COLUMNS
            .split(", ")
            .map(|c| format!("i.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM items i
            LEFT JOIN embeddings e ON e.item_id = i.id AND e.model_version = ?
            WHERE e.id IS NULL OR e.content_hash <> i.content_hash
            ORDER BY i.id
            LIMIT ?
            "#,
            columns
        ))
        .bind(model_version)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    /// Brute-force cosine similarity against every vector of `model_version`.
    pub async fn similar(
        &self,
        query: &[f32],
        model_version: &str,
        limit: usize,
    ) -> StoreResult<Vec<SimilarItem>> {
        let pool = self.ensure_ready()?;
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.source_key, i.title, e.vector
            FROM embeddings e
            JOIN items i ON i.id = e.item_id
            WHERE e.model_version = ?
            "#,
        )
        .bind(model_version)
        .fetch_all(pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("vector")?;
            let vector = blob_to_vec(&blob);
            if vector.len() != query.len() {
                continue;
            }
            scored.push(SimilarItem {
                item_id: row.try_get("id")?,
                source_key: row.try_get("source_key")?,
                title: row.try_get("title")?,
                similarity: cosine_similarity(query, &vector),
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.item_id.cmp(&b.item_id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    pub async fn get_config(&self, key: &str) -> StoreResult<Option<ConfigVersion>> {
        let pool = self.ensure_ready()?;
        let row = sqlx::query("SELECT id, key, value, updated_at FROM config_versions WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
        row.as_ref().map(config_from_row).transpose()
    }

    /// Config rows whose key starts with `prefix`, ordered by key.
    pub async fn list_config(&self, prefix: &str) -> StoreResult<Vec<ConfigVersion>> {
        let pool = self.ensure_ready()?;
        let rows = sqlx::query(
            "SELECT id, key, value, updated_at FROM config_versions \
             WHERE substr(key, 1, ?) = ? ORDER BY key",
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(pool)
        .await?;
        rows.iter().map(config_from_row).collect()
    }
}

async fn upsert_in(
    conn: &mut SqliteConnection,
    items: &[NewItem],
    at: DateTime<Utc>,
) -> StoreResult<UpsertSummary> {
    let now = to_millis(at);
    let mut summary = UpsertSummary::default();

    for item in items {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM items WHERE source_key = ?")
            .bind(&item.source_key)
            .fetch_optional(&mut *conn)
            .await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO items (source_key, source, title, content, url, author, occurred_at,
                               metadata_json, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_key) DO UPDATE SET
                source = excluded.source,
                title = excluded.title,
                content = excluded.content,
                url = excluded.url,
                author = excluded.author,
                occurred_at = excluded.occurred_at,
                metadata_json = excluded.metadata_json,
                content_hash = excluded.content_hash,
                updated_at = MAX(items.updated_at, excluded.updated_at)
            RETURNING id
            "#,
        )
        .bind(&item.source_key)
        .bind(&item.source)
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.url)
        .bind(&item.author)
        .bind(item.occurred_at.map(to_millis))
        .bind(item.metadata.to_string())
        .bind(item.content_hash())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        if existing.is_some() {
            summary.updated += 1;
        } else {
            summary.inserted += 1;
        }
        summary.item_ids.push(id);
    }

    Ok(summary)
}

async fn set_config_in(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO config_versions (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(to_millis(at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn item_from_row(row: &SqliteRow) -> StoreResult<Item> {
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata = serde_json::from_str(&metadata_json).map_err(|e| sqlx::Error::ColumnDecode {
        index: "metadata_json".to_string(),
        source: Box::new(e),
    })?;
    Ok(Item {
        id: row.try_get("id")?,
        source_key: row.try_get("source_key")?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        url: row.try_get("url")?,
        author: row.try_get("author")?,
        occurred_at: row.try_get::<Option<i64>, _>("occurred_at")?.map(from_millis),
        metadata,
        content_hash: row.try_get("content_hash")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

fn config_from_row(row: &SqliteRow) -> StoreResult<ConfigVersion> {
    Ok(ConfigVersion {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConstraintKind;

    async fn ready_store() -> Store {
        let store = Store::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let store = Store::in_memory().await.unwrap();
        assert!(!store.is_initialized());
        assert!(matches!(
            store.count_items().await,
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(
            store.upsert_items(&[NewItem::new("chat:1", "t", "c")]).await,
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(
            store.search("x", 5).await,
            Err(StoreError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn upsert_counts_inserts_and_updates() {
        let store = ready_store().await;
        let first = store
            .upsert_items(&[
                NewItem::new("chat:1", "a", "alpha"),
                NewItem::new("chat:2", "b", "beta"),
            ])
            .await
            .unwrap();
        assert_eq!((first.inserted, first.updated), (2, 0));

        let second = store
            .upsert_items(&[NewItem::new("chat:1", "a", "alpha two")])
            .await
            .unwrap();
        assert_eq!((second.inserted, second.updated), (0, 1));
        assert_eq!(second.item_ids, vec![first.item_ids[0]]);
        assert_eq!(store.count_items().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn insert_item_rejects_duplicate_key() {
        let store = ready_store().await;
        store
            .insert_item(&NewItem::new("mail:1", "s", "b"))
            .await
            .unwrap();
        let err = store
            .insert_item(&NewItem::new("mail:1", "s", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    }

    #[tokio::test]
    async fn query_filters_by_prefix_and_source() {
        let store = ready_store().await;
        store
            .upsert_items(&[
                NewItem::new("chat:1", "a", "x").with_source("chat:team"),
                NewItem::new("mail:1", "b", "y").with_source("mail:work"),
                NewItem::new("chat:2", "c", "z").with_source("chat:ops"),
            ])
            .await
            .unwrap();

        let chat = store
            .query(&ItemFilter::new().with_key_prefix("chat:"))
            .await
            .unwrap();
        assert_eq!(chat.len(), 2);

        let ops = store
            .query(&ItemFilter::new().with_source("chat:ops"))
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].source_key, "chat:2");

        let limited = store.query(&ItemFilter::new().with_limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn config_is_insert_or_replace() {
        let store = ready_store().await;
        store.set_config("sync.chat:team.last_success", "a").await.unwrap();
        store.set_config("sync.chat:team.last_success", "b").await.unwrap();
        store.set_config("other", "c").await.unwrap();

        let row = store
            .get_config("sync.chat:team.last_success")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.value, "b");
        assert_eq!(store.list_config("sync.").await.unwrap().len(), 1);
        assert!(store.get_config("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_embeddings() {
        let store = ready_store().await;
        let summary = store
            .upsert_items(&[NewItem::new("chat:1", "a", "alpha")])
            .await
            .unwrap();
        let id = summary.item_ids[0];
        store.attach_embedding(id, &[0, 0, 128, 63], "m1").await.unwrap();
        assert_eq!(store.count_embeddings().await.unwrap(), 1);

        assert!(store.delete_item(id).await.unwrap());
        assert_eq!(store.count_embeddings().await.unwrap(), 0);
        assert!(store.search("alpha", 5).await.unwrap().is_empty());
        assert!(!store.delete_item(id).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_metadata_is_a_storage_error() {
        let store = ready_store().await;
        let summary = store
            .upsert_items(&[NewItem::new("chat:9", "t", "c")])
            .await
            .unwrap();
        sqlx::query("UPDATE items SET metadata_json = '{not json' WHERE id = ?")
            .bind(summary.item_ids[0])
            .execute(&store.inner.pool)
            .await
            .unwrap();

        let err = store.get_item(summary.item_ids[0]).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Storage(sqlx::Error::ColumnDecode { .. })
        ));
    }

    #[tokio::test]
    async fn readers_see_only_committed_refreshes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Store::open(&DbConfig {
            path: tmp.path().join("chx.sqlite"),
        })
        .await
        .unwrap();
        store.initialize().await.unwrap();
        store
            .upsert_items(&[NewItem::new("chat:1", "before", "old cycle")])
            .await
            .unwrap();

        let mut tx = db::begin_write(&store.inner.pool).await.unwrap();
        upsert_in(
            &mut *tx,
            &[
                NewItem::new("chat:1", "after", "new cycle"),
                NewItem::new("chat:2", "added", "new cycle"),
            ],
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(store.count_items().await.unwrap(), 1);
        assert!(store.search("new", 10).await.unwrap().is_empty());
        let seen = store.get_item_by_key("chat:1").await.unwrap().unwrap();
        assert_eq!(seen.title, "before");

        tx.commit().await.unwrap();

        assert_eq!(store.count_items().await.unwrap(), 2);
        assert_eq!(store.search("new", 10).await.unwrap().len(), 2);
        assert!(store.search("old", 10).await.unwrap().is_empty());
        store.close().await;
    }
}
