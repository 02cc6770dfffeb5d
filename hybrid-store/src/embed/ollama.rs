//! Ollama dense embedding provider.
//!
//! Calls `POST {endpoint}/api/embeddings` with a reusable `reqwest::Client`,
//! checks the dimensionality and normalizes the vector for cosine search.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{DenseEmbedder, EmbedFuture, l2_normalize};
use crate::config::EmbeddingConfig;
use crate::errors::RetrievalError;

/// Ollama embedding provider (async).
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dim: usize,
}

impl OllamaEmbedder {
    /// Construct a new embedder from configuration.
    ///
    /// # Errors
    /// - [`RetrievalError::Config`] if the endpoint is empty or not http(s)
    /// - [`RetrievalError::Transport`] if the HTTP client cannot be built
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self, RetrievalError> {
        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(RetrievalError::Config(format!(
                "invalid embedding endpoint: '{}'",
                cfg.endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/api/embeddings", endpoint.trim_end_matches('/')),
            model: cfg.model.clone(),
            dim: cfg.dim,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn request(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let body = EmbeddingsRequest {
            model: &self.model,
            prompt: text,
        };

        debug!("POST {}", self.url);
        let resp = self.client.post(&self.url).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = text.chars().take(240).collect::<String>();
            return Err(RetrievalError::Embedding(format!(
                "unexpected HTTP status {status} from {}: {snippet}",
                self.url
            )));
        }

        let bytes = resp.bytes().await?;
        decode_embedding(&bytes)
    }
}

impl DenseEmbedder for OllamaEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, Vec<f32>> {
        Box::pin(async move {
            let mut v = self.request(text).await?;
            if v.len() != self.dim {
                return Err(RetrievalError::VectorSizeMismatch {
                    got: v.len(),
                    want: self.dim,
                });
            }
            l2_normalize(&mut v);
            Ok(v)
        })
    }
}

/// Request body for `/api/embeddings`.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response body for `/api/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// Extracts the vector from an `/api/embeddings` response body.
fn decode_embedding(body: &[u8]) -> Result<Vec<f32>, RetrievalError> {
    let out: EmbeddingsResponse = serde_json::from_slice(body)?;
    Ok(out.embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_embeddings_url_from_endpoint() {
        let cfg = EmbeddingConfig {
            endpoint: "http://ollama:11434/".into(),
            ..EmbeddingConfig::default()
        };
        let e = OllamaEmbedder::new(&cfg).unwrap();
        assert_eq!(e.url(), "http://ollama:11434/api/embeddings");
        assert_eq!(e.dim(), 384);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let cfg = EmbeddingConfig {
            endpoint: "ollama:11434".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            OllamaEmbedder::new(&cfg),
            Err(RetrievalError::Config(_))
        ));
    }

    #[test]
    fn request_uses_prompt_field() {
        let body = serde_json::to_value(EmbeddingsRequest {
            model: "all-minilm",
            prompt: "hello",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"model": "all-minilm", "prompt": "hello"}));

        let v = decode_embedding(br#"{"embedding":[0.5,-1.0]}"#).unwrap();
        assert_eq!(v, vec![0.5, -1.0]);
    }

    #[test]
    fn malformed_response_is_a_parse_error() {
        assert!(matches!(
            decode_embedding(br#"{"error":"model not found"}"#),
            Err(RetrievalError::Parse(_))
        ));
        assert!(matches!(
            decode_embedding(b"<html>"),
            Err(RetrievalError::Parse(_))
        ));
    }
}
