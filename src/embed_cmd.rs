//! Embedding backfill for `chx embed pending`, and the inline pass that
//! runs after `chx sync` when a provider is configured.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding::{self, EmbedReport};
use crate::store::Store;

/// Embed items that are missing or have stale embeddings.
pub async fn run_embed_pending(config: &Config, limit: Option<i64>) -> Result<()> {
    let Some(embedder) = embedding::create_embedder(&config.embedding)? else {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    };

    let store = Store::open(&config.db).await?;
    store.initialize().await?;

    let report = embedding::embed_pending(
        &store,
        embedder.as_ref(),
        config.embedding.batch_size,
        limit.unwrap_or(i64::MAX),
    )
    .await?;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all items up to date");
    } else {
        println!("  total pending: {}", report.pending);
        println!("  embedded: {}", report.embedded);
        println!("  failed: {}", report.failed);
    }

    store.close().await;
    Ok(())
}

/// Embed newly synced items after a refresh. Never fails: problems are
/// logged and the affected items stay pending for `chx embed pending`.
pub async fn embed_after_sync(config: &Config, store: &Store) -> Option<EmbedReport> {
    let embedder = match embedding::create_embedder(&config.embedding) {
        Ok(Some(e)) => e,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "could not create embedder");
            return None;
        }
    };

    match embedding::embed_pending(
        store,
        embedder.as_ref(),
        config.embedding.batch_size,
        i64::MAX,
    )
    .await
    {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!(error = %e, "inline embedding failed");
            None
        }
    }
}
