//! Database statistics and health overview.
//!
//! Summarizes what is stored: item and embedding counts, per-source
//! breakdowns, and when each source last synced. Used by `chx stats`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::store::{checkpoint_key, Store};

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = Store::open(&config.db).await?;
    store.initialize().await?;

    let total_items = store.count_items().await?;
    let total_embeddings = store.count_embeddings().await?;
    let migrations = store.applied_migrations().await?;
    let by_source = store.source_counts().await?;

    let db_size = if config.db.is_in_memory() {
        0
    } else {
        std::fs::metadata(&config.db.path)
            .map(|m| m.len())
            .unwrap_or(0)
    };

    println!("Comms Harness Database Stats");
    println!("==============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Schema:      v{}",
        migrations.last().copied().unwrap_or(0)
    );
    println!();
    println!("  Items:       {}", total_items);
    println!("  Embeddings:  {}", total_embeddings);

    if !by_source.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<28} {:>6}   {:<16} {}",
            "SOURCE", "ITEMS", "LAST UPDATE", "LAST SYNC"
        );
        println!("  {}", "-".repeat(72));

        let now = Utc::now();
        for s in &by_source {
            let last_sync = store
                .get_config(&checkpoint_key(&s.source))
                .await?
                .and_then(|row| DateTime::parse_from_rfc3339(&row.value).ok())
                .map(|at| format_relative(at.with_timezone(&Utc), now))
                .unwrap_or_else(|| "never".to_string());
            let last_update = s
                .last_updated
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "  {:<28} {:>6}   {:<16} {}",
                s.source, s.items, last_update, last_sync
            );
        }
    }

    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" style, falling back to a date beyond 30 days or for times
/// in the future.
fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - at).num_seconds();
    if delta < 0 || delta >= 86400 * 30 {
        return at.format("%Y-%m-%d %H:%M").to_string();
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = Utc::now();
        assert_eq!(format_relative(now - Duration::seconds(5), now), "just now");
        assert_eq!(format_relative(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(format_relative(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_relative(now - Duration::days(2), now), "2 days ago");
        let old = now - Duration::days(90);
        assert_eq!(
            format_relative(old, now),
            old.format("%Y-%m-%d %H:%M").to_string()
        );
    }
}
