//! Lazy, idempotent creation of per-tenant collections.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::VectorBackend;
use crate::config::VectorSchema;
use crate::errors::RetrievalError;

/// Ensures tenant collections exist with the fixed two-space schema.
#[derive(Clone)]
pub struct CollectionManager {
    backend: Arc<dyn VectorBackend>,
    schema: Arc<VectorSchema>,
}

impl CollectionManager {
    pub fn new(backend: Arc<dyn VectorBackend>, schema: Arc<VectorSchema>) -> Self {
        Self { backend, schema }
    }

    pub fn schema(&self) -> &VectorSchema {
        &self.schema
    }

    /// Ensures that the tenant's collection exists.
    ///
    /// - If the collection already exists → no-op, returns `false`.
    /// - If the backend reports it absent → creates it together with the
    ///   `metadata.source` keyword index, returns `true`.
    /// - If creation fails because a concurrent caller created it first →
    ///   returns `false`.
    ///
    /// # Errors
    /// Lookup failures other than "absent" and creation failures are returned
    /// unchanged; nothing is retried. If the index cannot be built the new
    /// collection is dropped again, so the next call starts from scratch.
    pub async fn ensure_collection(&self, tenant_id: &str) -> Result<bool, RetrievalError> {
        let collection = collection_name(tenant_id)?;

        if self.backend.collection_exists(collection).await? {
            debug!("Collection '{}' already exists", collection);
            return Ok(false);
        }

        info!(
            "Collection '{}' not found, creating with dense={}({:?}) sparse={}",
            collection, self.schema.dense_size, self.schema.distance, self.schema.sparse_name
        );
        if let Err(err) = self
            .backend
            .create_collection(collection, &self.schema)
            .await
        {
            return match self.backend.collection_exists(collection).await {
                Ok(true) => {
                    debug!(
                        "Collection '{}' was created concurrently, reusing it",
                        collection
                    );
                    Ok(false)
                }
                _ => Err(err),
            };
        }

        if let Err(err) = self.backend.create_source_index(collection).await {
            warn!(
                "Source index for '{}' failed, dropping the new collection: {}",
                collection, err
            );
            if let Err(e) = self.backend.delete_collection(collection).await {
                warn!("Rollback of collection '{}' failed: {}", collection, e);
            }
            return Err(err);
        }
        Ok(true)
    }
}

/// Collection name for a tenant: the id itself, rejected when blank.
pub fn collection_name(tenant_id: &str) -> Result<&str, RetrievalError> {
    if tenant_id.trim().is_empty() {
        return Err(RetrievalError::InvalidInput("tenant id is empty".into()));
    }
    Ok(tenant_id)
}
