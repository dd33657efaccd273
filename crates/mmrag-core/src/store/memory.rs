//! In-memory [`VectorStore`] implementation for tests and embedding in
//! other processes.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Points are
//! kept in insertion order and search is brute-force scoring over every
//! point of the collection.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::models::{Chunk, ScoredPayload};

use super::{
    top_k, validate_batch, validate_query, CollectionInfo, Distance, PayloadFilter, StoreError,
    VectorStore,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: Chunk,
}

struct MemCollection {
    info: CollectionInfo,
    points: Vec<StoredPoint>,
}

/// In-memory vector store.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemCollection>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemCollection>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(
        &self,
        name: &str,
        embedding_dim: usize,
        distance: Distance,
    ) -> Result<CollectionInfo, StoreError> {
        if embedding_dim == 0 {
            return Err(StoreError::ZeroDimension(name.to_string()));
        }
        let mut collections = self.write()?;
        let entry = collections
            .entry(name.to_string())
            .or_insert_with(|| MemCollection {
                info: CollectionInfo {
                    name: name.to_string(),
                    embedding_dim,
                    distance,
                },
                points: Vec::new(),
            });
        Ok(entry.info.clone())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        Ok(self.read()?.get(name).map(|c| c.info.clone()))
    }

    async fn add_vectors(
        &self,
        name: &str,
        vectors: &[Vec<f32>],
        payloads: &[Chunk],
    ) -> Result<usize, StoreError> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        validate_batch(&collection.info, vectors, payloads)?;
        for (vector, payload) in vectors.iter().zip(payloads) {
            collection.points.push(StoredPoint {
                vector: vector.clone(),
                payload: payload.clone(),
            });
        }
        Ok(vectors.len())
    }

    async fn search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPayload>, StoreError> {
        let collections = self.read()?;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        validate_query(&collection.info, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let distance = collection.info.distance;
        let hits: Vec<ScoredPayload> = collection
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(p.payload.metadata())))
            .map(|p| ScoredPayload {
                score: distance.score(query, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        Ok(top_k(hits, k))
    }

    async fn count(&self, name: &str) -> Result<u64, StoreError> {
        self.read()?
            .get(name)
            .map(|c| c.points.len() as u64)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.remove(name).is_some())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let mut infos: Vec<CollectionInfo> =
            self.read()?.values().map(|c| c.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}
