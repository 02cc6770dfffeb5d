//! Per-tenant store handles and their bounded LRU + TTL cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::backend::VectorBackend;
use crate::config::{RetrievalMode, StoreCacheConfig, VectorSchema};
use crate::embed::{DenseEmbedder, SparseEmbedder};
use crate::embed_pool::embed_chunks;
use crate::errors::RetrievalError;
use crate::record::{Chunk, DocumentScope, HybridQuery, IndexedPoint, RetrievedPassage};

/// Handle bound to one tenant collection: embeds, writes and searches.
///
/// Holds only shared references, so two live handles for the same
/// collection are harmless.
pub struct StoreHandle {
    collection: String,
    mode: RetrievalMode,
    schema: Arc<VectorSchema>,
    backend: Arc<dyn VectorBackend>,
    dense: Arc<dyn DenseEmbedder>,
    sparse: Arc<dyn SparseEmbedder>,
}

impl StoreHandle {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    /// Embeds `chunks` with both providers and upserts them in batches.
    ///
    /// Not transactional: on error, earlier batches stay written.
    pub async fn add_chunks(
        &self,
        chunks: Vec<Chunk>,
        concurrency: usize,
        batch_size: usize,
    ) -> Result<usize, RetrievalError> {
        let vectors = embed_chunks(
            &chunks,
            self.dense.as_ref(),
            self.sparse.as_ref(),
            self.schema.dense_size,
            concurrency,
        )
        .await?;

        let mut points: Vec<IndexedPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, (dense, sparse))| IndexedPoint {
                id: Uuid::new_v4().to_string(),
                dense,
                sparse,
                chunk,
            })
            .collect();

        let batch_size = batch_size.max(1);
        let mut written = 0;
        while !points.is_empty() {
            let rest = points.split_off(batch_size.min(points.len()));
            let batch = std::mem::replace(&mut points, rest);
            written += self
                .backend
                .upsert_points(&self.collection, &self.schema, batch)
                .await?;
        }
        Ok(written)
    }

    /// Embeds `query` and runs a ranked search restricted to `scope`.
    pub async fn similarity_search(
        &self,
        query: &str,
        scope: DocumentScope,
        limit: u64,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        trace!(
            "StoreHandle::similarity_search collection={} limit={limit}",
            self.collection
        );
        let dense = self.dense.embed(query).await?;
        let sparse = self.sparse.embed_query(query).await?;
        self.backend
            .query(
                &self.collection,
                &self.schema,
                self.mode,
                HybridQuery {
                    dense,
                    sparse,
                    scope,
                    limit,
                },
            )
            .await
    }

    /// Stored chunks admitted by `scope`, at most `limit`.
    pub async fn list_chunks(
        &self,
        scope: &DocumentScope,
        limit: u32,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        self.backend.scroll(&self.collection, scope, limit).await
    }
}

/// Hit/miss/construction counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Every miss constructs exactly one handle.
    pub fn constructed(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Time-bounded cache of tenant collection name → [`StoreHandle`].
///
/// Overflow evicts the least-recently-used handle; entries also expire a
/// fixed time after insertion. Construction is serialized per key.
pub struct StoreCache {
    inner: Cache<String, Arc<StoreHandle>>,
    stats: CacheStats,
    mode: RetrievalMode,
    schema: Arc<VectorSchema>,
    backend: Arc<dyn VectorBackend>,
    dense: Arc<dyn DenseEmbedder>,
    sparse: Arc<dyn SparseEmbedder>,
}

impl StoreCache {
    pub fn new(
        cfg: &StoreCacheConfig,
        mode: RetrievalMode,
        schema: Arc<VectorSchema>,
        backend: Arc<dyn VectorBackend>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
    ) -> Self {
        let inner = Cache::builder()
            .max_capacity(cfg.capacity)
            .time_to_live(cfg.ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        info!(
            capacity = cfg.capacity,
            ttl_secs = cfg.ttl.as_secs(),
            "Store handle cache initialized"
        );

        Self {
            inner,
            stats: CacheStats::default(),
            mode,
            schema,
            backend,
            dense,
            sparse,
        }
    }

    /// Cached handle for `collection`, constructing it on a miss or after expiry.
    pub fn get_or_create(&self, collection: &str) -> Arc<StoreHandle> {
        let mut constructed = false;
        let handle = self.inner.get_with_by_ref(collection, || {
            constructed = true;
            Arc::new(self.build(collection))
        });

        if constructed {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Store handle constructed for '{}'", collection);
        } else {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Store handle cache hit for '{}'", collection);
        }
        handle
    }

    /// Drops the cached handle, if any.
    pub fn invalidate(&self, collection: &str) {
        self.inner.invalidate(collection);
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.inner.contains_key(collection)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of live handles after pending evictions are applied.
    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.inner.policy().time_to_live()
    }

    fn build(&self, collection: &str) -> StoreHandle {
        StoreHandle {
            collection: collection.to_string(),
            mode: self.mode,
            schema: Arc::clone(&self.schema),
            backend: Arc::clone(&self.backend),
            dense: Arc::clone(&self.dense),
            sparse: Arc::clone(&self.sparse),
        }
    }
}
