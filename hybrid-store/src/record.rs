//! Core data models used by the library.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RetrievalError;

/// Payload key holding the chunk text.
pub const PAGE_CONTENT_KEY: &str = "page_content";
/// Payload key holding the chunk metadata object.
pub const METADATA_KEY: &str = "metadata";
/// Metadata key with the base name of the originating file.
pub const SOURCE_KEY: &str = "source";
/// Metadata key with the owning tenant id.
pub const USER_ID_KEY: &str = "user_id";
/// Payload path used to filter points by document.
pub const SOURCE_FILTER_KEY: &str = "metadata.source";

/// Arbitrary chunk metadata.
pub type Metadata = Map<String, Value>;

/// Atomic retrievable unit produced by the (external) document chunker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Adds one metadata entry, overwriting an existing value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `metadata.source`, if present and a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }

    /// Rebuilds a chunk from a stored `{page_content, metadata}` payload.
    pub fn from_payload(payload: Value) -> Result<Self, RetrievalError> {
        let Value::Object(mut obj) = payload else {
            return Err(RetrievalError::Payload("payload is not an object".into()));
        };
        let text = match obj.remove(PAGE_CONTENT_KEY) {
            Some(Value::String(s)) => s,
            _ => {
                return Err(RetrievalError::Payload(format!(
                    "payload has no string `{PAGE_CONTENT_KEY}`"
                )));
            }
        };
        let metadata = match obj.remove(METADATA_KEY) {
            Some(Value::Object(m)) => m,
            _ => Metadata::new(),
        };
        Ok(Self { text, metadata })
    }

    /// Payload layout stored alongside the vectors.
    pub fn to_payload(&self) -> Value {
        let mut obj = Map::with_capacity(2);
        obj.insert(PAGE_CONTENT_KEY.into(), Value::String(self.text.clone()));
        obj.insert(METADATA_KEY.into(), Value::Object(self.metadata.clone()));
        Value::Object(obj)
    }
}

/// Sparse vector as parallel `(indices, values)` arrays.
///
/// Indices are unique and sorted ascending.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Dot product of two sorted sparse vectors.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }
}

/// Persisted unit inside a tenant collection.
#[derive(Clone, Debug)]
pub struct IndexedPoint {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub chunk: Chunk,
}

/// Restricts retrieval to a set of documents.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentScope {
    /// Every document of the tenant.
    All,
    /// Only points whose `metadata.source` is one of these file names.
    /// An empty list admits nothing.
    Only(Vec<String>),
}

impl DocumentScope {
    pub fn only<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(documents.into_iter().map(Into::into).collect())
    }

    /// True when no point can ever match.
    pub fn admits_nothing(&self) -> bool {
        matches!(self, Self::Only(docs) if docs.is_empty())
    }

    pub fn admits(&self, source: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Only(docs) => source.is_some_and(|s| docs.iter().any(|d| d == s)),
        }
    }
}

/// Already embedded query handed to a backend.
#[derive(Clone, Debug)]
pub struct HybridQuery {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub scope: DocumentScope,
    pub limit: u64,
}

/// A single retrieval hit, best-first ordering is the backend's.
#[derive(Clone, Debug)]
pub struct RetrievedPassage {
    pub score: f32,
    pub text: String,
    pub source: Option<String>,
    pub metadata: Metadata,
}

impl RetrievedPassage {
    pub fn from_payload(score: f32, payload: Value) -> Result<Self, RetrievalError> {
        let chunk = Chunk::from_payload(payload)?;
        Ok(Self {
            score,
            source: chunk.source().map(str::to_string),
            text: chunk.text,
            metadata: chunk.metadata,
        })
    }
}
