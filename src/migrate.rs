//! Schema creation. Every statement is idempotent, so this runs on every
//! store open.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Collection registry: dimension and metric are fixed at creation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            embedding_dim INTEGER NOT NULL,
            distance TEXT NOT NULL DEFAULT 'cosine',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Points: one vector + payload per row, ids are fresh UUIDs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS points (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            collection TEXT NOT NULL,
            vector BLOB NOT NULL,
            payload TEXT NOT NULL,
            FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_points_collection ON points(collection, seq)")
        .execute(pool)
        .await?;

    Ok(())
}
