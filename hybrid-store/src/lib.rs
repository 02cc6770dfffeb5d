//! Per-tenant hybrid (dense + sparse) retrieval over Qdrant.
//!
//! This crate provides a clean API to:
//! - Ingest pre-chunked documents into one collection per tenant, tagging
//!   every chunk with its source file and owner
//! - Retrieve the best passages for a question, restricted to an allow-list
//!   of documents, by fusing semantic and lexical rankings
//! - Delete single documents or whole tenant collections
//!
//! The design is flat (no deep nesting) and splits responsibilities into focused modules.

mod backend;
mod collections;
mod config;
mod embed;
mod embed_pool;
mod errors;
mod filters;
mod memory_backend;
mod qdrant_facade;
mod record;
mod store_cache;
#[cfg(test)]
mod test_support;

pub use backend::{BackendFuture, VectorBackend};
pub use collections::{CollectionManager, collection_name};
pub use config::{
    DENSE_VECTOR_NAME, DENSE_VECTOR_SIZE, DistanceKind, EmbeddingConfig, RetrievalConfig,
    RetrievalMode, SPARSE_VECTOR_NAME, StoreCacheConfig, VectorSchema,
};
pub use embed::bm25::{Bm25Encoder, Bm25Params};
pub use embed::ollama::OllamaEmbedder;
pub use embed::{DenseEmbedder, EmbedFuture, SparseEmbedder, l2_normalize};
pub use errors::RetrievalError;
pub use memory_backend::MemoryBackend;
pub use qdrant_facade::QdrantFacade;
pub use record::{
    Chunk, DocumentScope, HybridQuery, IndexedPoint, Metadata, RetrievedPassage, SparseVector,
};
pub use store_cache::{CacheStats, StoreCache, StoreHandle};

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

/// High-level facade that wires configuration, the vector backend, both
/// embedding providers and the per-tenant store cache.
///
/// Built once at startup and shared (`Arc`) by every request handler.
pub struct HybridRetrievalEngine {
    cfg: RetrievalConfig,
    backend: Arc<dyn VectorBackend>,
    collections: CollectionManager,
    stores: StoreCache,
}

impl HybridRetrievalEngine {
    /// Assembles an engine from already constructed parts.
    ///
    /// # Errors
    /// Returns `RetrievalError::Config` on invalid configuration and
    /// `RetrievalError::VectorSizeMismatch` if the dense provider does not
    /// produce `cfg.embedding.dim`-sized vectors.
    pub fn new(
        cfg: RetrievalConfig,
        backend: Arc<dyn VectorBackend>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
    ) -> Result<Self, RetrievalError> {
        cfg.validate()?;
        if dense.dim() != cfg.embedding.dim {
            return Err(RetrievalError::VectorSizeMismatch {
                got: dense.dim(),
                want: cfg.embedding.dim,
            });
        }

        let schema = Arc::new(cfg.schema());
        let collections = CollectionManager::new(Arc::clone(&backend), Arc::clone(&schema));
        let stores = StoreCache::new(
            &cfg.cache,
            cfg.retrieval_mode,
            schema,
            Arc::clone(&backend),
            dense,
            sparse,
        );

        Ok(Self {
            cfg,
            backend,
            collections,
            stores,
        })
    }

    /// Connects to Qdrant and the Ollama embedding server described by `cfg`.
    ///
    /// No request is sent yet; connectivity problems surface on first use.
    ///
    /// # Errors
    /// Returns `RetrievalError::Config` if a client cannot be initialized.
    pub fn connect(cfg: RetrievalConfig) -> Result<Self, RetrievalError> {
        trace!("HybridRetrievalEngine::connect qdrant_url={}", cfg.qdrant_url);
        let backend = Arc::new(QdrantFacade::new(&cfg)?);
        let dense = Arc::new(OllamaEmbedder::new(&cfg.embedding)?);
        let sparse = Arc::new(Bm25Encoder::new(Bm25Params::default())?);
        Self::new(cfg, backend, dense, sparse)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.cfg
    }

    pub fn stores(&self) -> &StoreCache {
        &self.stores
    }

    /// Creates the tenant's collection if it does not exist yet.
    ///
    /// Returns `true` when the collection was created by this call.
    pub async fn ensure_collection(&self, tenant_id: &str) -> Result<bool, RetrievalError> {
        self.collections.ensure_collection(tenant_id).await
    }

    /// Embeds and stores `chunks` for `tenant_id`.
    ///
    /// Every chunk is tagged with `source` (base name of `origin_file`) and
    /// `user_id`; these override any caller-supplied values. Returns the
    /// number of points written.
    ///
    /// # Errors
    /// Returns `RetrievalError::InvalidInput` if `origin_file` has no file
    /// name (the collection is still ensured first), and embedding or backend
    /// errors unchanged. Non UTF-8 file names are converted lossily. Batches written
    /// before a failure are not rolled back.
    pub async fn ingest(
        &self,
        chunks: Vec<Chunk>,
        tenant_id: &str,
        origin_file: impl AsRef<Path>,
    ) -> Result<usize, RetrievalError> {
        let origin = origin_file.as_ref();
        trace!("HybridRetrievalEngine::ingest tenant={tenant_id} origin={origin:?}");

        self.collections.ensure_collection(tenant_id).await?;

        let source = origin
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                RetrievalError::InvalidInput(format!("no file name in path {origin:?}"))
            })?;

        if chunks.is_empty() {
            warn!(
                "No chunks to ingest for '{}' in collection '{}', skipping",
                source, tenant_id
            );
            return Ok(0);
        }

        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .map(|c| {
                c.with_metadata(record::SOURCE_KEY, source.as_str())
                    .with_metadata(record::USER_ID_KEY, tenant_id)
            })
            .collect();

        let handle = self.stores.get_or_create(tenant_id);
        let written = handle
            .add_chunks(chunks, self.cfg.embedding.concurrency, self.cfg.upsert_batch)
            .await?;

        info!(
            "Ingested {} points from '{}' into collection '{}'",
            written, source, tenant_id
        );
        Ok(written)
    }

    /// Removes every point of `filename` from the tenant's collection.
    ///
    /// Succeeds when nothing matches.
    pub async fn delete_document(
        &self,
        filename: &str,
        tenant_id: &str,
    ) -> Result<(), RetrievalError> {
        let collection = collection_name(tenant_id)?;
        debug!(
            "Deleting points with source '{}' from '{}'",
            filename, collection
        );
        self.backend.delete_by_source(collection, filename).await
    }

    /// Drops the tenant's collection and its cached store handle.
    pub async fn delete_collection(&self, tenant_id: &str) -> Result<(), RetrievalError> {
        let collection = collection_name(tenant_id)?;
        self.backend.delete_collection(collection).await?;
        self.stores.invalidate(collection);
        info!("Collection '{}' and its store handle removed", collection);
        Ok(())
    }

    /// Passage texts most relevant to `query`, best first, restricted to
    /// `allowed_documents`.
    ///
    /// An empty allow-list matches nothing. `limit` defaults to the
    /// configured search limit.
    pub async fn search(
        &self,
        query: &str,
        tenant_id: &str,
        allowed_documents: &[String],
        limit: Option<u64>,
    ) -> Result<Vec<String>, RetrievalError> {
        let hits = self
            .search_scoped(
                query,
                tenant_id,
                DocumentScope::only(allowed_documents.iter().cloned()),
                limit,
            )
            .await?;
        Ok(hits.into_iter().map(|h| h.text).collect())
    }

    /// Same as [`HybridRetrievalEngine::search`] but with an explicit scope
    /// and full hit details.
    pub async fn search_scoped(
        &self,
        query: &str,
        tenant_id: &str,
        scope: DocumentScope,
        limit: Option<u64>,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let collection = collection_name(tenant_id)?;
        let limit = limit.unwrap_or(self.cfg.search_limit);
        trace!("HybridRetrievalEngine::search_scoped collection={collection} limit={limit}");

        if limit == 0 {
            debug!("Search limit is 0, returning no passages");
            return Ok(Vec::new());
        }
        if scope.admits_nothing() {
            warn!(
                "Search in '{}' with an empty document allow-list, returning no passages",
                collection
            );
            return Ok(Vec::new());
        }

        let hits = self
            .stores
            .get_or_create(collection)
            .similarity_search(query, scope, limit)
            .await?;
        debug!("Search in '{}' returned {} passages", collection, hits.len());
        Ok(hits)
    }

    /// Stored chunks of one document, in backend order.
    ///
    /// `limit` defaults to the configured scroll limit.
    pub async fn document_chunks(
        &self,
        filename: &str,
        tenant_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let collection = collection_name(tenant_id)?;
        let limit = limit.unwrap_or(self.cfg.scroll_limit);
        self.stores
            .get_or_create(collection)
            .list_chunks(&DocumentScope::only([filename]), limit)
            .await
    }
}
