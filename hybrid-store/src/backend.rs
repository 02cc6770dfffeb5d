//! Backend-agnostic retrieval API.
//!
//! [`crate::QdrantFacade`] talks to a Qdrant server; [`crate::MemoryBackend`]
//! keeps everything in process.

use std::{future::Future, pin::Pin};

use crate::config::{RetrievalMode, VectorSchema};
use crate::errors::RetrievalError;
use crate::record::{Chunk, DocumentScope, HybridQuery, IndexedPoint, RetrievedPassage};

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RetrievalError>> + Send + 'a>>;

/// Collection admin, writes and searches against a vector store.
pub trait VectorBackend: Send + Sync {
    /// `Ok(false)` only when the backend positively reports the collection as absent.
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, bool>;

    fn create_collection<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
    ) -> BackendFuture<'a, ()>;

    /// Keyword index on `metadata.source`; succeeds if it already exists.
    fn create_source_index<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()>;

    fn delete_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()>;

    /// Writes `points`, returning how many were acknowledged.
    fn upsert_points<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
        points: Vec<IndexedPoint>,
    ) -> BackendFuture<'a, usize>;

    /// Removes every point whose `metadata.source` equals `source`.
    fn delete_by_source<'a>(&'a self, collection: &'a str, source: &'a str)
    -> BackendFuture<'a, ()>;

    /// Ranked search, best first, at most `query.limit` hits.
    fn query<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
        mode: RetrievalMode,
        query: HybridQuery,
    ) -> BackendFuture<'a, Vec<RetrievedPassage>>;

    /// Stored chunks admitted by `scope`, in backend order.
    fn scroll<'a>(
        &'a self,
        collection: &'a str,
        scope: &'a DocumentScope,
        limit: u32,
    ) -> BackendFuture<'a, Vec<Chunk>>;
}
