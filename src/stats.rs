//! Store statistics.
//!
//! Used by `mmrag stats` to show what has been ingested: one line per
//! collection with its dimension, metric, record count and age.

use anyhow::Result;
use mmrag_core::store::VectorStore;

use crate::config::Config;
use crate::services;

struct CollectionStats {
    name: String,
    embedding_dim: usize,
    distance: String,
    count: u64,
    created_at: Option<i64>,
}

/// Run the stats command: read every collection and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = services::open_store(config).await?;

    let mut stats = Vec::new();
    for info in store.list_collections().await? {
        stats.push(CollectionStats {
            count: store.count(&info.name).await?,
            created_at: store.created_at(&info.name).await?,
            embedding_dim: info.embedding_dim,
            distance: info.distance.to_string(),
            name: info.name,
        });
    }
    let total: u64 = stats.iter().map(|s| s.count).sum();

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("mmrag store stats");
    println!("=================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Records:     {}", total);

    if stats.is_empty() {
        println!();
        println!("  No collections. Run `mmrag init` or ingest files first.");
    } else {
        println!();
        println!(
            "  {:<20} {:>6} {:>8} {:>8}   {}",
            "COLLECTION", "DIMS", "METRIC", "RECORDS", "CREATED"
        );
        println!("  {}", "-".repeat(64));
        for s in &stats {
            let created = match s.created_at {
                Some(ts) => format_ts_relative(ts),
                None => "unknown".to_string(),
            };
            println!(
                "  {:<20} {:>6} {:>8} {:>8}   {}",
                s.name, s.embedding_dim, s.distance, s.count, created
            );
        }
    }
    println!();

    store.pool().close().await;
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

/// Format a Unix timestamp relative to now ("3 hours ago"), falling back
/// to a date for anything older than a month.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
