//! SQLite-backed [`VectorStore`] implementation.
//!
//! Collections are rows in `collections`; points are rows in `points`
//! holding the vector as a little-endian f32 BLOB and the chunk payload as
//! JSON. Search loads a collection's vectors and scores them brute-force,
//! which is adequate for the collection sizes a local pipeline produces.
//!
//! Every sqlx failure is mapped to [`StoreError::Unavailable`], and rows
//! that cannot be decoded to [`StoreError::Corrupt`], so callers can tell
//! an engine failure apart from an empty answer.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use mmrag_core::embedding::{blob_to_vec, vec_to_blob};
use mmrag_core::models::{Chunk, ScoredPayload};
use mmrag_core::store::{
    top_k, validate_batch, validate_query, CollectionInfo, Distance, PayloadFilter, StoreError,
    VectorStore,
};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and create the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creation time of a collection as a Unix timestamp.
    pub async fn created_at(&self, name: &str) -> Result<Option<i64>, StoreError> {
        sqlx::query_scalar("SELECT created_at FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)
    }

    async fn require_info(&self, name: &str) -> Result<CollectionInfo, StoreError> {
        self.collection_info(name)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> Result<CollectionInfo, StoreError> {
    let name: String = row.try_get("name").map_err(unavailable)?;
    let dim: i64 = row.try_get("embedding_dim").map_err(unavailable)?;
    let distance: String = row.try_get("distance").map_err(unavailable)?;
    let distance = Distance::parse(&distance).ok_or_else(|| StoreError::Corrupt {
        id: name.clone(),
        reason: format!("unknown distance '{distance}'"),
    })?;
    let embedding_dim = usize::try_from(dim).map_err(|_| StoreError::Corrupt {
        id: name.clone(),
        reason: format!("invalid embedding_dim {dim}"),
    })?;
    Ok(CollectionInfo {
        name,
        embedding_dim,
        distance,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_collection(
        &self,
        name: &str,
        embedding_dim: usize,
        distance: Distance,
    ) -> Result<CollectionInfo, StoreError> {
        if embedding_dim == 0 {
            return Err(StoreError::ZeroDimension(name.to_string()));
        }
        // Racing creators: the first insert wins, the rest are no-ops and
        // read back the winner's schema.
        sqlx::query(
            r#"
            INSERT INTO collections (name, embedding_dim, distance, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(embedding_dim as i64)
        .bind(distance.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        self.collection_info(name).await?.ok_or_else(|| {
            StoreError::Unavailable(format!("collection '{name}' missing after creation"))
        })
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        let row = sqlx::query(
            "SELECT name, embedding_dim, distance FROM collections WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(row_to_info).transpose()
    }

    async fn add_vectors(
        &self,
        name: &str,
        vectors: &[Vec<f32>],
        payloads: &[Chunk],
    ) -> Result<usize, StoreError> {
        let info = self.require_info(name).await?;
        validate_batch(&info, vectors, payloads)?;
        if vectors.is_empty() {
            return Ok(0);
        }

        let mut encoded = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let json = serde_json::to_string(payload).map_err(|e| StoreError::Corrupt {
                id: payload.chunk_id().to_string(),
                reason: e.to_string(),
            })?;
            encoded.push(json);
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for (vector, payload) in vectors.iter().zip(encoded) {
            sqlx::query("INSERT INTO points (id, collection, vector, payload) VALUES (?, ?, ?, ?)")
                .bind(Uuid::new_v4().to_string())
                .bind(name)
                .bind(vec_to_blob(vector))
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;

        tracing::debug!(collection = name, inserted = vectors.len(), "vectors committed");
        Ok(vectors.len())
    }

    async fn search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPayload>, StoreError> {
        let info = self.require_info(name).await?;
        validate_query(&info, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, vector, payload FROM points WHERE collection = ? ORDER BY seq")
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(unavailable)?;
            let blob: Vec<u8> = row.try_get("vector").map_err(unavailable)?;
            let payload: String = row.try_get("payload").map_err(unavailable)?;

            let vector = blob_to_vec(&blob);
            if vector.len() != info.embedding_dim {
                return Err(StoreError::Corrupt {
                    id,
                    reason: format!(
                        "stored vector has {} dims, collection declares {}",
                        vector.len(),
                        info.embedding_dim
                    ),
                });
            }
            let chunk: Chunk = serde_json::from_str(&payload).map_err(|e| StoreError::Corrupt {
                id: id.clone(),
                reason: e.to_string(),
            })?;
            if let Some(f) = filter {
                if !f.matches(chunk.metadata()) {
                    continue;
                }
            }
            hits.push(ScoredPayload {
                score: info.distance.score(query, &vector),
                payload: chunk,
            });
        }

        Ok(top_k(hits, k))
    }

    async fn count(&self, name: &str) -> Result<u64, StoreError> {
        self.require_info(name).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM points WHERE collection = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(count.max(0) as u64)
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        sqlx::query("DELETE FROM points WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?
            .rows_affected();
        tx.commit().await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let rows = sqlx::query("SELECT name, embedding_dim, distance FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(row_to_info).collect()
    }
}
