//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! This facade concentrates all Qdrant interactions behind [`VectorBackend`],
//! hiding away the verbose builder pattern and keeping the rest of the
//! crate decoupled from `qdrant-client`.

use std::collections::HashMap;
use std::time::Duration;

use crate::backend::{BackendFuture, VectorBackend};
use crate::config::{DistanceKind, RetrievalConfig, RetrievalMode, VectorSchema};
use crate::errors::RetrievalError;
use crate::filters::{scope_filter, source_equals};
use crate::record::{
    Chunk, DocumentScope, HybridQuery, IndexedPoint, RetrievedPassage, SOURCE_FILTER_KEY,
    SparseVector,
};

use qdrant_client::qdrant::{
    CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance,
    FieldType, Fusion, Modifier, NamedVectors, PointStruct, PrefetchQueryBuilder, Query,
    QueryPoints, QueryPointsBuilder, ScrollPointsBuilder, SparseIndexConfigBuilder,
    SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value as QValue,
    Vector, VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, info, warn};

/// A facade over the Qdrant client.
///
/// The client is cheap to clone and multiplexes requests over one gRPC
/// channel, so one facade serves every tenant collection.
#[derive(Clone)]
pub struct QdrantFacade {
    client: Qdrant,
}

impl QdrantFacade {
    /// Creates a new facade from the given configuration.
    ///
    /// Supports optional API key authentication and a per-request timeout.
    pub fn new(cfg: &RetrievalConfig) -> Result<Self, RetrievalError> {
        cfg.validate()?;

        let mut builder = Qdrant::from_url(&cfg.qdrant_url)
            .timeout(Duration::from_secs(cfg.qdrant_timeout_secs));
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RetrievalError::backend("connect", e))?;

        info!("Qdrant client configured for {}", cfg.qdrant_url);
        Ok(Self { client })
    }

    async fn create(&self, collection: &str, schema: &VectorSchema) -> Result<(), RetrievalError> {
        let distance = match schema.distance {
            DistanceKind::Cosine => Distance::Cosine,
            DistanceKind::Dot => Distance::Dot,
            DistanceKind::Euclid => Distance::Euclid,
        };

        let mut dense = VectorsConfigBuilder::default();
        dense.add_named_vector_params(
            &schema.dense_name,
            VectorParamsBuilder::new(schema.dense_size as u64, distance),
        );

        // IDF is computed server-side over the whole collection.
        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(
            &schema.sparse_name,
            SparseVectorParamsBuilder::default()
                .modifier(Modifier::Idf)
                .index(SparseIndexConfigBuilder::default().on_disk(false)),
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(dense)
                    .sparse_vectors_config(sparse)
                    .on_disk_payload(schema.on_disk_payload),
            )
            .await
            .map_err(|e| RetrievalError::backend("create_collection", e))?;

        info!("Collection '{}' created successfully", collection);
        Ok(())
    }

    async fn create_index(&self, collection: &str) -> Result<(), RetrievalError> {
        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    collection,
                    SOURCE_FILTER_KEY,
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await
            .map_err(|e| RetrievalError::backend("create_field_index", e))?;
        debug!("Keyword index on '{}' ready in '{}'", SOURCE_FILTER_KEY, collection);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        schema: &VectorSchema,
        points: Vec<IndexedPoint>,
    ) -> Result<usize, RetrievalError> {
        if points.is_empty() {
            debug!("No points provided for upsert");
            return Ok(0);
        }

        let mut pts = Vec::with_capacity(points.len());
        for p in points {
            let payload = Payload::try_from(p.chunk.to_payload())
                .map_err(|e| RetrievalError::Payload(e.to_string()))?;
            let vectors = NamedVectors::default()
                .add_vector(schema.dense_name.clone(), Vector::new_dense(p.dense))
                .add_vector(
                    schema.sparse_name.clone(),
                    Vector::new_sparse(p.sparse.indices, p.sparse.values),
                );
            pts.push(PointStruct::new(p.id, vectors, payload));
        }
        let count = pts.len();

        debug!(
            "Upserting {} points into collection '{}'",
            count, collection
        );
        let res = self
            .client
            .upsert_points(UpsertPointsBuilder::new(collection, pts).wait(true))
            .await
            .map_err(|e| RetrievalError::backend("upsert_points", e))?;
        debug!("Upsert operation result={:?}", res.result);

        Ok(count)
    }

    async fn search(
        &self,
        collection: &str,
        schema: &VectorSchema,
        mode: RetrievalMode,
        query: HybridQuery,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let Some(mode) = effective_mode(mode, &query.sparse) else {
            debug!("Sparse query without terms, nothing to match");
            return Ok(Vec::new());
        };
        info!(
            "Searching in '{}' with limit={}, mode={:?}",
            collection, query.limit, mode
        );

        let res = self
            .client
            .query(build_query(collection, schema, mode, query))
            .await
            .map_err(|e| RetrievalError::backend("query_points", e))?;

        let mut out = Vec::with_capacity(res.result.len());
        for sp in res.result {
            match RetrievedPassage::from_payload(sp.score, qpayload_to_json(sp.payload)) {
                Ok(p) => out.push(p),
                Err(e) => warn!("Skipping point with unexpected payload: {e}"),
            }
        }

        debug!("Search completed: {} hits returned", out.len());
        Ok(out)
    }

    async fn scroll_chunks(
        &self,
        collection: &str,
        scope: &DocumentScope,
        limit: u32,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit)
            .with_payload(true)
            .with_vectors(false);
        if let Some(f) = scope_filter(scope) {
            builder = builder.filter(f);
        }

        let res = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| RetrievalError::backend("scroll", e))?;

        let mut out = Vec::with_capacity(res.result.len());
        for p in res.result {
            match Chunk::from_payload(qpayload_to_json(p.payload)) {
                Ok(c) => out.push(c),
                Err(e) => warn!("Skipping point with unexpected payload: {e}"),
            }
        }
        Ok(out)
    }
}

impl VectorBackend for QdrantFacade {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.client
                .collection_exists(collection)
                .await
                .map_err(|e| RetrievalError::backend("collection_exists", e))
        })
    }

    fn create_collection<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
    ) -> BackendFuture<'a, ()> {
        Box::pin(self.create(collection, schema))
    }

    fn create_source_index<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(self.create_index(collection))
    }

    fn delete_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_collection(collection)
                .await
                .map_err(|e| RetrievalError::backend("delete_collection", e))?;
            info!("Collection '{}' deleted", collection);
            Ok(())
        })
    }

    fn upsert_points<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
        points: Vec<IndexedPoint>,
    ) -> BackendFuture<'a, usize> {
        Box::pin(self.upsert(collection, schema, points))
    }

    fn delete_by_source<'a>(
        &'a self,
        collection: &'a str,
        source: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let res = self
                .client
                .delete_points(
                    DeletePointsBuilder::new(collection)
                        .points(source_equals(source))
                        .wait(true),
                )
                .await
                .map_err(|e| RetrievalError::backend("delete_points", e))?;
            info!("Deletion response: {:?}", res.result);
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        collection: &'a str,
        schema: &'a VectorSchema,
        mode: RetrievalMode,
        query: HybridQuery,
    ) -> BackendFuture<'a, Vec<RetrievedPassage>> {
        Box::pin(self.search(collection, schema, mode, query))
    }

    fn scroll<'a>(
        &'a self,
        collection: &'a str,
        scope: &'a DocumentScope,
        limit: u32,
    ) -> BackendFuture<'a, Vec<Chunk>> {
        Box::pin(self.scroll_chunks(collection, scope, limit))
    }
}

/// Mode actually sent to Qdrant for a query with these sparse terms.
///
/// Hybrid without terms degrades to dense; sparse without terms can match
/// nothing and yields `None`.
fn effective_mode(mode: RetrievalMode, sparse: &SparseVector) -> Option<RetrievalMode> {
    match mode {
        RetrievalMode::Hybrid if sparse.is_empty() => Some(RetrievalMode::Dense),
        RetrievalMode::Sparse if sparse.is_empty() => None,
        other => Some(other),
    }
}

/// Query request for `mode`. In hybrid mode the scope filter is applied to
/// both prefetches as well as to the fused result.
fn build_query(
    collection: &str,
    schema: &VectorSchema,
    mode: RetrievalMode,
    query: HybridQuery,
) -> QueryPoints {
    let filter = scope_filter(&query.scope);
    let dense = Query::new_nearest(VectorInput::new_dense(query.dense));
    let sparse = Query::new_nearest(VectorInput::new_sparse(
        query.sparse.indices,
        query.sparse.values,
    ));

    let mut builder = QueryPointsBuilder::new(collection)
        .limit(query.limit)
        .with_payload(true);
    builder = match mode {
        RetrievalMode::Dense => builder.query(dense).using(&schema.dense_name),
        RetrievalMode::Sparse => builder.query(sparse).using(&schema.sparse_name),
        RetrievalMode::Hybrid => {
            let mut dense_pf = PrefetchQueryBuilder::default()
                .query(dense)
                .using(&schema.dense_name)
                .limit(query.limit);
            let mut sparse_pf = PrefetchQueryBuilder::default()
                .query(sparse)
                .using(&schema.sparse_name)
                .limit(query.limit);
            if let Some(f) = &filter {
                dense_pf = dense_pf.filter(f.clone());
                sparse_pf = sparse_pf.filter(f.clone());
            }
            builder
                .add_prefetch(dense_pf)
                .add_prefetch(sparse_pf)
                .query(Query::new_fusion(Fusion::Rrf))
        }
    };
    if let Some(f) = filter {
        builder = builder.filter(f);
    }
    builder.build()
}

/// Converts a Qdrant payload (`HashMap<String, qdrant::Value>`) into JSON.
fn qpayload_to_json(p: HashMap<String, QValue>) -> serde_json::Value {
    serde_json::Value::Object(p.into_iter().map(|(k, v)| (k, v.into_json())).collect())
}
