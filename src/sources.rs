//! Configured source listing for `chx sources`.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::store::{checkpoint_key, Store};

/// One configured source and where it reads from.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    /// `"{kind}:{name}"`.
    pub label: String,
    pub kind: String,
    /// Base URL or command.
    pub target: String,
    /// RFC 3339 time of the last cycle this source succeeded in.
    pub last_success: Option<String>,
}

/// Every configured source, ordered by kind then name. Checkpoints are read
/// from `store` when given.
pub async fn get_sources(config: &Config, store: Option<&Store>) -> Result<Vec<SourceStatus>> {
    let s = &config.sources;
    let mut sources: Vec<(&str, &String, String)> = Vec::with_capacity(s.len());
    for (name, cfg) in &s.calendar {
        sources.push(("calendar", name, cfg.command.clone()));
    }
    for (name, cfg) in &s.chat {
        sources.push(("chat", name, cfg.base_url.clone()));
    }
    for (name, cfg) in &s.issues {
        sources.push(("issues", name, cfg.base_url.clone()));
    }
    for (name, cfg) in &s.mail {
        sources.push(("mail", name, format!("{} [{}]", cfg.base_url, cfg.mailbox)));
    }
    for (name, cfg) in &s.notifications {
        sources.push(("notifications", name, cfg.base_url.clone()));
    }

    let mut statuses = Vec::with_capacity(sources.len());
    for (kind, name, target) in sources {
        let label = format!("{}:{}", kind, name);
        let last_success = match store {
            Some(store) => store
                .get_config(&checkpoint_key(&label))
                .await?
                .map(|row| row.value),
            None => None,
        };
        statuses.push(SourceStatus {
            label,
            kind: kind.to_string(),
            target,
            last_success,
        });
    }
    Ok(statuses)
}

pub async fn list_sources(config: &Config) -> Result<()> {
    let store = Store::open(&config.db).await?;
    store.initialize().await?;
    let sources = get_sources(config, Some(&store)).await?;
    store.close().await;

    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!("{:<28} {:<26} TARGET", "SOURCE", "LAST SUCCESS");
    for source in &sources {
        println!(
            "{:<28} {:<26} {}",
            source.label,
            source.last_success.as_deref().unwrap_or("never"),
            source.target
        );
    }
    Ok(())
}
