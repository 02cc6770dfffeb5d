use crate::errors::RetrievalError;
use crate::record::SparseVector;
use std::{future::Future, pin::Pin};

/// Boxed future returned by embedding providers.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RetrievalError>> + Send + 'a>>;

/// Dense (semantic) embedding provider.
///
/// Async is required because most real providers (Ollama, OpenAI, etc.)
/// perform HTTP requests. Implementations are built once and shared by all
/// tenants.
pub trait DenseEmbedder: Send + Sync {
    /// Dimensionality of every vector this provider returns.
    fn dim(&self) -> usize;

    /// Embeds `text` into an L2-normalized vector of length [`DenseEmbedder::dim`].
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, Vec<f32>>;
}

/// Sparse (lexical) embedding provider.
///
/// Documents and queries are encoded differently: documents carry term
/// frequency weights, queries only mark which terms are present.
pub trait SparseEmbedder: Send + Sync {
    fn embed_document<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, SparseVector>;

    fn embed_query<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, SparseVector>;
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub mod bm25;
pub mod ollama;
