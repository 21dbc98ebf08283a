//! Search over stored items.
//!
//! Keyword search goes through the `items_fts` index (bm25 ranking);
//! semantic search embeds the query with the configured embedder and ranks
//! stored vectors by cosine similarity.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding;
use crate::store::Store;

/// Turn free text into an FTS5 MATCH expression.
///
/// Every whitespace-separated word becomes a quoted string token (internal
/// quotes doubled), and tokens are implicitly ANDed. Returns `None` when
/// there is nothing to match.
pub fn fts_match_expression(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

pub async fn run_search(config: &Config, term: &str, mode: &str, limit: i64) -> Result<()> {
    if term.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    match mode {
        "keyword" | "semantic" => {}
        _ => bail!("Unknown search mode: {}. Use keyword or semantic.", mode),
    }

    let store = Store::open(&config.db).await?;
    store.initialize().await?;

    if mode == "semantic" {
        let Some(embedder) = embedding::create_embedder(&config.embedding)? else {
            bail!("Mode 'semantic' requires embeddings. Set [embedding] provider in config.");
        };
        let query = embedding::embed_query(embedder.as_ref(), term).await?;
        let hits = store
            .similar(&query, embedder.model_version(), limit.max(0) as usize)
            .await?;
        if hits.is_empty() {
            println!("No results.");
        }
        for (i, hit) in hits.iter().enumerate() {
            println!("{}. [{:.3}] {}", i + 1, hit.similarity, hit.title);
            println!("    key: {}", hit.source_key);
            println!("    id: {}", hit.item_id);
            println!();
        }
        store.close().await;
        return Ok(());
    }

    let hits = store.search(term, limit).await?;
    if hits.is_empty() {
        println!("No results.");
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.title);
        println!("    key: {}", hit.source_key);
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!("    id: {}", hit.item_id);
        println!();
    }

    store.close().await;
    Ok(())
}
