//! Embedding executor with bounded concurrency and dimension checks.

use crate::embed::{DenseEmbedder, SparseEmbedder};
use crate::errors::RetrievalError;
use crate::record::{Chunk, SparseVector};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Embeds every chunk with both providers.
///
/// Output order matches `chunks`. At most `concurrency` chunks are in flight.
///
/// # Errors
/// Returns [`RetrievalError::VectorSizeMismatch`] if a dense vector does not
/// have `expected_dim` entries, or the first provider error.
pub async fn embed_chunks(
    chunks: &[Chunk],
    dense: &dyn DenseEmbedder,
    sparse: &dyn SparseEmbedder,
    expected_dim: usize,
    concurrency: usize,
) -> Result<Vec<(Vec<f32>, SparseVector)>, RetrievalError> {
    info!(
        "embed_pool::embed_chunks: total={} concurrency={}",
        chunks.len(),
        concurrency
    );

    let out: Vec<(Vec<f32>, SparseVector)> = stream::iter(chunks.iter())
        .map(|chunk| async move {
            let v = dense.embed(&chunk.text).await?;
            if v.len() != expected_dim {
                return Err(RetrievalError::VectorSizeMismatch {
                    got: v.len(),
                    want: expected_dim,
                });
            }
            let s = sparse.embed_document(&chunk.text).await?;
            Ok::<_, RetrievalError>((v, s))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    debug!("embed_pool::embed_chunks: embeddings filled");
    Ok(out)
}
