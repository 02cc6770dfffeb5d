//! Runtime and collection configuration.
//!
//! Settings are read from environment variables; unset keys fall back to
//! defaults while malformed values are reported as [`RetrievalError::EnvParse`].

use std::str::FromStr;
use std::time::Duration;

use crate::errors::RetrievalError;

/// Name of the dense vector space inside every tenant collection.
pub const DENSE_VECTOR_NAME: &str = "dense";
/// Name of the sparse vector space inside every tenant collection.
pub const SPARSE_VECTOR_NAME: &str = "sparse";
/// Dimensionality of the dense space (all-MiniLM-L6-v2).
pub const DENSE_VECTOR_SIZE: usize = 384;

/// Distance function used for the dense vector space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceKind {
    /// Cosine distance (recommended for most embeddings).
    Cosine,
    /// Dot product (useful for normalized vectors).
    Dot,
    /// Euclidean distance (L2).
    Euclid,
}

/// How a store handle ranks candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Dense nearest neighbours only.
    Dense,
    /// Sparse (lexical) nearest neighbours only.
    Sparse,
    /// Dense and sparse rankings fused by the backend.
    Hybrid,
}

impl FromStr for RetrievalMode {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dense" => Ok(Self::Dense),
            "sparse" => Ok(Self::Sparse),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(RetrievalError::EnvParse {
                key: "RETRIEVAL_MODE".into(),
                value: other.into(),
            }),
        }
    }
}

/// Immutable two-space schema every tenant collection is created with.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorSchema {
    pub dense_name: String,
    pub dense_size: usize,
    pub distance: DistanceKind,
    pub sparse_name: String,
    /// Keep point payloads on disk instead of in RAM.
    pub on_disk_payload: bool,
}

impl VectorSchema {
    /// The `dense` + `sparse` schema with the given dense dimensionality.
    pub fn hybrid(dense_size: usize) -> Self {
        Self {
            dense_name: DENSE_VECTOR_NAME.to_string(),
            dense_size,
            distance: DistanceKind::Cosine,
            sparse_name: SPARSE_VECTOR_NAME.to_string(),
            on_disk_payload: true,
        }
    }
}

impl Default for VectorSchema {
    fn default() -> Self {
        Self::hybrid(DENSE_VECTOR_SIZE)
    }
}

/// Dense embedding backend settings (Ollama).
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    /// Base URL of the Ollama server, e.g. `http://localhost:11434`.
    pub endpoint: String,
    /// Embedding model identifier.
    pub model: String,
    /// Expected embedding dimensionality.
    pub dim: usize,
    /// Max concurrent embedding requests during ingestion.
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dim: DENSE_VECTOR_SIZE,
            concurrency: 4,
            timeout_secs: 60,
        }
    }
}

/// Bounds of the per-tenant store handle cache.
#[derive(Clone, Debug)]
pub struct StoreCacheConfig {
    pub capacity: u64,
    pub ttl: Duration,
}

impl Default for StoreCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Configuration for ingestion and retrieval.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Qdrant gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    /// Optional API key for Qdrant Cloud.
    pub qdrant_api_key: Option<String>,
    pub qdrant_timeout_secs: u64,
    /// Default number of passages returned by a search.
    pub search_limit: u64,
    /// Default number of points returned when listing a document.
    pub scroll_limit: u32,
    /// Upsert batch size.
    pub upsert_batch: usize,
    pub retrieval_mode: RetrievalMode,
    pub embedding: EmbeddingConfig,
    pub cache: StoreCacheConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            qdrant_timeout_secs: 30,
            search_limit: 5,
            scroll_limit: 100,
            upsert_batch: 64,
            retrieval_mode: RetrievalMode::Hybrid,
            embedding: EmbeddingConfig::default(),
            cache: StoreCacheConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Build configuration from process environment variables.
    ///
    /// Environment variables used:
    /// - `QDRANT_URL` (default: "http://localhost:6334")
    /// - `QDRANT_API_KEY` (optional)
    /// - `QDRANT_TIMEOUT_SECS` (default: 30)
    /// - `QDRANT_SEARCH_LIMIT` (default: 5)
    /// - `QDRANT_SCROLL_LIMIT` (default: 100)
    /// - `QDRANT_UPSERT_BATCH` (default: 64)
    /// - `RETRIEVAL_MODE` ("dense" | "sparse" | "hybrid"; default: "hybrid")
    /// - `EMBEDDING_ENDPOINT` (default: "http://localhost:11434")
    /// - `EMBEDDING_MODEL` (default: "all-minilm")
    /// - `EMBEDDING_DIM` (default: 384)
    /// - `EMBEDDING_CONCURRENCY` (default: 4)
    /// - `EMBEDDING_TIMEOUT_SECS` (default: 60)
    /// - `STORE_CACHE_CAPACITY` (default: 100)
    /// - `STORE_CACHE_TTL_SECS` (default: 3600)
    pub fn from_env() -> Result<Self, RetrievalError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RetrievalConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RetrievalError> {
        let defaults = Self::default();

        let embedding = EmbeddingConfig {
            endpoint: lookup("EMBEDDING_ENDPOINT").unwrap_or(defaults.embedding.endpoint),
            model: lookup("EMBEDDING_MODEL").unwrap_or(defaults.embedding.model),
            dim: read_parsed(&lookup, "EMBEDDING_DIM", defaults.embedding.dim)?,
            concurrency: read_parsed(
                &lookup,
                "EMBEDDING_CONCURRENCY",
                defaults.embedding.concurrency,
            )?,
            timeout_secs: read_parsed(
                &lookup,
                "EMBEDDING_TIMEOUT_SECS",
                defaults.embedding.timeout_secs,
            )?,
        };

        let cache = StoreCacheConfig {
            capacity: read_parsed(&lookup, "STORE_CACHE_CAPACITY", defaults.cache.capacity)?,
            ttl: Duration::from_secs(read_parsed(
                &lookup,
                "STORE_CACHE_TTL_SECS",
                defaults.cache.ttl.as_secs(),
            )?),
        };

        let retrieval_mode = match lookup("RETRIEVAL_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.retrieval_mode,
        };

        let cfg = Self {
            qdrant_url: lookup("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            qdrant_api_key: lookup("QDRANT_API_KEY").filter(|k| !k.trim().is_empty()),
            qdrant_timeout_secs: read_parsed(
                &lookup,
                "QDRANT_TIMEOUT_SECS",
                defaults.qdrant_timeout_secs,
            )?,
            search_limit: read_parsed(&lookup, "QDRANT_SEARCH_LIMIT", defaults.search_limit)?,
            scroll_limit: read_parsed(&lookup, "QDRANT_SCROLL_LIMIT", defaults.scroll_limit)?,
            upsert_batch: read_parsed(&lookup, "QDRANT_UPSERT_BATCH", defaults.upsert_batch)?,
            retrieval_mode,
            embedding,
            cache,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.qdrant_url.trim().is_empty() {
            return Err(RetrievalError::Config("qdrant_url is empty".into()));
        }
        if self.embedding.endpoint.trim().is_empty() {
            return Err(RetrievalError::Config("embedding endpoint is empty".into()));
        }
        if self.embedding.dim == 0 {
            return Err(RetrievalError::Config("EMBEDDING_DIM must be > 0".into()));
        }
        if self.search_limit == 0 {
            return Err(RetrievalError::Config(
                "QDRANT_SEARCH_LIMIT must be > 0".into(),
            ));
        }
        if self.scroll_limit == 0 {
            return Err(RetrievalError::Config(
                "QDRANT_SCROLL_LIMIT must be > 0".into(),
            ));
        }
        if self.upsert_batch == 0 {
            return Err(RetrievalError::Config(
                "QDRANT_UPSERT_BATCH must be > 0".into(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(RetrievalError::Config(
                "STORE_CACHE_CAPACITY must be > 0".into(),
            ));
        }
        if self.cache.ttl.is_zero() {
            return Err(RetrievalError::Config(
                "STORE_CACHE_TTL_SECS must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Schema new tenant collections are created with.
    pub fn schema(&self) -> VectorSchema {
        VectorSchema::hybrid(self.embedding.dim)
    }
}

/// Read and parse `key`, falling back to `default` when it is unset.
fn read_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, RetrievalError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| RetrievalError::EnvParse {
            key: key.into(),
            value: raw,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = RetrievalConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.qdrant_url, "http://localhost:6334");
        assert_eq!(cfg.search_limit, 5);
        assert_eq!(cfg.scroll_limit, 100);
        assert_eq!(cfg.embedding.dim, 384);
        assert_eq!(cfg.cache.capacity, 100);
        assert_eq!(cfg.cache.ttl, Duration::from_secs(3600));
        assert_eq!(cfg.retrieval_mode, RetrievalMode::Hybrid);
        assert!(cfg.qdrant_api_key.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = RetrievalConfig::from_lookup(lookup_from(&[
            ("QDRANT_URL", "http://qdrant:6334"),
            ("QDRANT_SEARCH_LIMIT", "12"),
            ("STORE_CACHE_TTL_SECS", "60"),
            ("RETRIEVAL_MODE", "Dense"),
            ("QDRANT_API_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(cfg.qdrant_url, "http://qdrant:6334");
        assert_eq!(cfg.search_limit, 12);
        assert_eq!(cfg.cache.ttl, Duration::from_secs(60));
        assert_eq!(cfg.retrieval_mode, RetrievalMode::Dense);
        assert_eq!(cfg.qdrant_api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = RetrievalConfig::from_lookup(lookup_from(&[("QDRANT_SEARCH_LIMIT", "ten")]))
            .unwrap_err();
        match err {
            RetrievalError::EnvParse { key, value } => {
                assert_eq!(key, "QDRANT_SEARCH_LIMIT");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(RetrievalConfig::from_lookup(lookup_from(&[("QDRANT_SEARCH_LIMIT", "0")])).is_err());
        assert!(RetrievalConfig::from_lookup(lookup_from(&[("STORE_CACHE_CAPACITY", "0")])).is_err());
        assert!(RetrievalConfig::from_lookup(lookup_from(&[("RETRIEVAL_MODE", "fuzzy")])).is_err());
    }

    #[test]
    fn schema_has_two_named_spaces() {
        let schema = RetrievalConfig::default().schema();
        assert_eq!(schema.dense_name, "dense");
        assert_eq!(schema.sparse_name, "sparse");
        assert_eq!(schema.dense_size, 384);
        assert_eq!(schema.distance, DistanceKind::Cosine);
        assert!(schema.on_disk_payload);
    }
}
