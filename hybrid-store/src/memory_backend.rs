//! In-process [`VectorBackend`] for tests and offline development.
//!
//! Semantics follow the Qdrant facade: collections must exist before writes,
//! dense vectors are ranked by cosine similarity, sparse vectors by dot
//! product, and hybrid mode fuses both rankings with reciprocal rank fusion.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::{BackendFuture, VectorBackend};
use crate::config::{RetrievalMode, VectorSchema};
use crate::errors::RetrievalError;
use crate::record::{Chunk, DocumentScope, HybridQuery, IndexedPoint, RetrievedPassage};

/// RRF constant, same default as Qdrant.
const RRF_K: f32 = 60.0;

struct MemoryCollection {
    schema: VectorSchema,
    source_indexed: bool,
    points: Vec<IndexedPoint>,
}

/// Collections held in a process-local map.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted names of the existing collections.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn schema_of(&self, collection: &str) -> Option<VectorSchema> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.schema.clone())
    }

    /// Whether the `metadata.source` index was created for `collection`.
    pub async fn has_source_index(&self, collection: &str) -> bool {
        self.collections
            .read()
            .await
            .get(collection)
            .is_some_and(|c| c.source_indexed)
    }

    /// Snapshot of the stored points of a collection, in insertion order.
    pub async fn points(&self, collection: &str) -> Vec<IndexedPoint> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.clone())
            .unwrap_or_default()
    }
}

fn not_found(op: &'static str, collection: &str) -> RetrievalError {
    RetrievalError::backend(op, format!("collection '{collection}' not found"))
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Indices of `candidates` ordered by descending score, truncated to `limit`.
fn rank(
    candidates: &[&IndexedPoint],
    score: impl Fn(&IndexedPoint) -> f32,
    limit: usize,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, p)| (i, score(*p)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(limit);
    scored
}

/// Reciprocal rank fusion of several rankings.
fn fuse(rankings: &[Vec<(usize, f32)>], limit: usize) -> Vec<(usize, f32)> {
    let mut fused: HashMap<usize, f32> = HashMap::new();
    for ranking in rankings {
        for (pos, (idx, _)) in ranking.iter().enumerate() {
            *fused.entry(*idx).or_insert(0.0) += 1.0 / (RRF_K + pos as f32 + 1.0);
        }
    }
    let mut out: Vec<(usize, f32)> = fused.into_iter().collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    out.truncate(limit);
    out
}

impl VectorBackend for MemoryBackend {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move { Ok(self.collections.read().await.contains_key(collection)) })
    }

    fn create_collection<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.collections.write().await;
            if guard.contains_key(collection) {
                return Err(RetrievalError::backend(
                    "create_collection",
                    format!("collection '{collection}' already exists"),
                ));
            }
            guard.insert(
                collection.to_string(),
                MemoryCollection {
                    schema: schema.clone(),
                    source_indexed: false,
                    points: Vec::new(),
                },
            );
            info!("Collection '{}' created in memory", collection);
            Ok(())
        })
    }

    fn create_source_index<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.collections.write().await;
            let coll = guard
                .get_mut(collection)
                .ok_or_else(|| not_found("create_field_index", collection))?;
            coll.source_indexed = true;
            Ok(())
        })
    }

    fn delete_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.collections
                .write()
                .await
                .remove(collection)
                .map(|_| ())
                .ok_or_else(|| not_found("delete_collection", collection))
        })
    }

    fn upsert_points<'a>(
        &'a self,
        collection: &'a str,
        _schema: &'a VectorSchema,
        points: Vec<IndexedPoint>,
    ) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let mut guard = self.collections.write().await;
            let coll = guard
                .get_mut(collection)
                .ok_or_else(|| not_found("upsert_points", collection))?;

            let want = coll.schema.dense_size;
            if let Some(bad) = points.iter().find(|p| p.dense.len() != want) {
                return Err(RetrievalError::VectorSizeMismatch {
                    got: bad.dense.len(),
                    want,
                });
            }

            let count = points.len();
            for p in points {
                match coll.points.iter_mut().find(|existing| existing.id == p.id) {
                    Some(existing) => *existing = p,
                    None => coll.points.push(p),
                }
            }
            debug!("Upserted {} points into '{}'", count, collection);
            Ok(count)
        })
    }

    fn delete_by_source<'a>(
        &'a self,
        collection: &'a str,
        source: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.collections.write().await;
            let coll = guard
                .get_mut(collection)
                .ok_or_else(|| not_found("delete_points", collection))?;
            let before = coll.points.len();
            coll.points.retain(|p| p.chunk.source() != Some(source));
            debug!(
                "Deleted {} points with source '{}'",
                before - coll.points.len(),
                source
            );
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        collection: &'a str,
        _schema: &'a VectorSchema,
        mode: RetrievalMode,
        query: HybridQuery,
    ) -> BackendFuture<'a, Vec<RetrievedPassage>> {
        Box::pin(async move {
            let guard = self.collections.read().await;
            let coll = guard
                .get(collection)
                .ok_or_else(|| not_found("query_points", collection))?;

            if query.dense.len() != coll.schema.dense_size {
                return Err(RetrievalError::VectorSizeMismatch {
                    got: query.dense.len(),
                    want: coll.schema.dense_size,
                });
            }

            let candidates: Vec<&IndexedPoint> = coll
                .points
                .iter()
                .filter(|p| query.scope.admits(p.chunk.source()))
                .collect();
            let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);

            let dense = || rank(&candidates, |p| cosine(&query.dense, &p.dense), limit);
            // Points sharing no term with the query are not sparse neighbours.
            let sparse = || {
                let mut r = rank(&candidates, |p| query.sparse.dot(&p.sparse), limit);
                r.retain(|(_, s)| *s > 0.0);
                r
            };

            let hits = match mode {
                RetrievalMode::Dense => dense(),
                RetrievalMode::Sparse => sparse(),
                RetrievalMode::Hybrid => fuse(&[dense(), sparse()], limit),
            };

            Ok(hits
                .into_iter()
                .map(|(idx, score)| {
                    let chunk = &candidates[idx].chunk;
                    RetrievedPassage {
                        score,
                        text: chunk.text.clone(),
                        source: chunk.source().map(str::to_string),
                        metadata: chunk.metadata.clone(),
                    }
                })
                .collect())
        })
    }

    fn scroll<'a>(
        &'a self,
        collection: &'a str,
        scope: &'a DocumentScope,
        limit: u32,
    ) -> BackendFuture<'a, Vec<Chunk>> {
        Box::pin(async move {
            let guard = self.collections.read().await;
            let coll = guard
                .get(collection)
                .ok_or_else(|| not_found("scroll", collection))?;
            Ok(coll
                .points
                .iter()
                .filter(|p| scope.admits(p.chunk.source()))
                .take(limit as usize)
                .map(|p| p.chunk.clone())
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SparseVector;

    fn point(id: &str, source: &str, dense: Vec<f32>, sparse: SparseVector) -> IndexedPoint {
        IndexedPoint {
            id: id.into(),
            dense,
            sparse,
            chunk: Chunk::new(format!("text of {id}")).with_metadata("source", source),
        }
    }

    fn sparse(indices: Vec<u32>) -> SparseVector {
        SparseVector {
            values: vec![1.0; indices.len()],
            indices,
        }
    }

    async fn backend_with_points() -> (MemoryBackend, VectorSchema) {
        let backend = MemoryBackend::new();
        let schema = VectorSchema::hybrid(2);
        backend.create_collection("t", &schema).await.unwrap();
        backend
            .upsert_points(
                "t",
                &schema,
                vec![
                    point("p1", "a.pdf", vec![1.0, 0.0], sparse(vec![1])),
                    point("p2", "a.pdf", vec![0.7, 0.7], sparse(vec![2])),
                    point("p3", "b.pdf", vec![0.0, 1.0], sparse(vec![2, 3])),
                ],
            )
            .await
            .unwrap();
        (backend, schema)
    }

    fn query(
        dense: Vec<f32>,
        sparse: SparseVector,
        scope: DocumentScope,
        limit: u64,
    ) -> HybridQuery {
        HybridQuery {
            dense,
            sparse,
            scope,
            limit,
        }
    }

    #[tokio::test]
    async fn writes_require_an_existing_collection() {
        let backend = MemoryBackend::new();
        let schema = VectorSchema::hybrid(2);
        let err = backend
            .upsert_points("missing", &schema, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Backend { op: "upsert_points", .. }));
        assert!(!backend.collection_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_wrong_dimensionality() {
        let (backend, schema) = backend_with_points().await;
        let err = backend
            .upsert_points("t", &schema, vec![point("x", "a.pdf", vec![1.0], sparse(vec![]))])
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::VectorSizeMismatch { got: 1, want: 2 }));
    }

    #[tokio::test]
    async fn dense_mode_ranks_by_cosine() {
        let (backend, schema) = backend_with_points().await;
        let hits = backend
            .query(
                "t",
                &schema,
                RetrievalMode::Dense,
                query(vec![1.0, 0.0], sparse(vec![]), DocumentScope::All, 3),
            )
            .await
            .unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["text of p1", "text of p2", "text of p3"]);
    }

    #[tokio::test]
    async fn sparse_mode_skips_points_without_shared_terms() {
        let (backend, schema) = backend_with_points().await;
        let hits = backend
            .query(
                "t",
                &schema,
                RetrievalMode::Sparse,
                query(vec![1.0, 0.0], sparse(vec![3]), DocumentScope::All, 3),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source.as_deref(), Some("b.pdf"));
    }

    #[tokio::test]
    async fn hybrid_mode_fuses_and_filters() {
        let (backend, schema) = backend_with_points().await;
        let hits = backend
            .query(
                "t",
                &schema,
                RetrievalMode::Hybrid,
                query(vec![0.7, 0.7], sparse(vec![2]), DocumentScope::only(["a.pdf"]), 3),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "text of p2");
        assert!(hits.iter().all(|h| h.source.as_deref() == Some("a.pdf")));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn delete_by_source_and_scroll() {
        let (backend, _) = backend_with_points().await;
        backend.delete_by_source("t", "a.pdf").await.unwrap();
        let left = backend.scroll("t", &DocumentScope::All, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].source(), Some("b.pdf"));
        // Nothing left to match: still succeeds.
        backend.delete_by_source("t", "a.pdf").await.unwrap();
    }
}
