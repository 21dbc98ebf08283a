//! Item retrieval by id for `chx get`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::store::Store;

pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let store = Store::open(&config.db).await?;
    store.initialize().await?;

    let Some(item) = store.get_item(id).await? else {
        store.close().await;
        bail!("item not found: {}", id);
    };
    let embeddings = store.embeddings_for(id).await?;
    store.close().await;

    println!("--- Item ---");
    println!("id:           {}", item.id);
    println!("key:          {}", item.source_key);
    println!("title:        {}", item.title);
    println!("source:       {}", item.source);
    if let Some(ref url) = item.url {
        println!("url:          {}", url);
    }
    if let Some(ref author) = item.author {
        println!("author:       {}", author);
    }
    if let Some(at) = item.occurred_at {
        println!("occurred_at:  {}", at.to_rfc3339());
    }
    println!("created_at:   {}", item.created_at.to_rfc3339());
    println!("updated_at:   {}", item.updated_at.to_rfc3339());
    println!("metadata:     {}", item.metadata);
    for embedding in &embeddings {
        let current = if embedding.content_hash == item.content_hash {
            "current"
        } else {
            "stale"
        };
        println!(
            "embedding:    {} ({} bytes, {})",
            embedding.model_version,
            embedding.vector.len(),
            current
        );
    }
    println!();

    println!("--- Content ---");
    println!("{}", item.content);

    Ok(())
}
