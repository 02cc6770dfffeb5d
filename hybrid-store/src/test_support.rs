//! Deterministic providers and backends for unit tests.

use crate::backend::{BackendFuture, VectorBackend};
use crate::config::{RetrievalMode, VectorSchema};
use crate::embed::{DenseEmbedder, EmbedFuture, l2_normalize};
use crate::errors::RetrievalError;
use crate::memory_backend::MemoryBackend;
use crate::record::{Chunk, DocumentScope, HybridQuery, IndexedPoint, RetrievedPassage};

/// Bag-of-words dense embedder: each lowercase word is hashed into one bucket.
///
/// Texts sharing words get a positive cosine similarity; unrelated texts
/// score close to zero. No network access.
pub(crate) struct TokenHashEmbedder {
    dim: usize,
}

impl TokenHashEmbedder {
    pub(crate) fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub(crate) fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dim as u64) as usize;
            v[bucket] += 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

impl DenseEmbedder for TokenHashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, Vec<f32>> {
        Box::pin(async move { Ok(self.vector(text)) })
    }
}

/// [`MemoryBackend`] wrapper that can widen the exists/create window or
/// refuse to build the source index.
pub(crate) struct FlakyBackend {
    pub(crate) inner: MemoryBackend,
    yield_after_exists: bool,
    fail_index: bool,
}

impl FlakyBackend {
    /// Yields to the scheduler after every existence check, so two
    /// concurrent first writes both observe a missing collection.
    pub(crate) fn racing() -> Self {
        Self {
            inner: MemoryBackend::new(),
            yield_after_exists: true,
            fail_index: false,
        }
    }

    pub(crate) fn failing_index() -> Self {
        Self {
            inner: MemoryBackend::new(),
            yield_after_exists: false,
            fail_index: true,
        }
    }
}

impl VectorBackend for FlakyBackend {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let exists = self.inner.collection_exists(collection).await?;
            if self.yield_after_exists {
                tokio::task::yield_now().await;
            }
            Ok(exists)
        })
    }

    fn create_collection<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
    ) -> BackendFuture<'a, ()> {
        self.inner.create_collection(collection, schema)
    }

    fn create_source_index<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        if self.fail_index {
            return Box::pin(async {
                Err(RetrievalError::backend("create_field_index", "index build failed"))
            });
        }
        self.inner.create_source_index(collection)
    }

    fn delete_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        self.inner.delete_collection(collection)
    }

    fn upsert_points<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
        points: Vec<IndexedPoint>,
    ) -> BackendFuture<'a, usize> {
        self.inner.upsert_points(collection, schema, points)
    }

    fn delete_by_source<'a>(
        &'a self,
        collection: &'a str,
        source: &'a str,
    ) -> BackendFuture<'a, ()> {
        self.inner.delete_by_source(collection, source)
    }

    fn query<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
        mode: RetrievalMode,
        query: HybridQuery,
    ) -> BackendFuture<'a, Vec<RetrievedPassage>> {
        self.inner.query(collection, schema, mode, query)
    }

    fn scroll<'a>(
        &'a self,
        collection: &'a str,
        scope: &'a DocumentScope,
        limit: u32,
    ) -> BackendFuture<'a, Vec<Chunk>> {
        self.inner.scroll(collection, scope, limit)
    }
}
