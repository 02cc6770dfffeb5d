//! Local BM25 sparse encoder.
//!
//! Documents are encoded with BM25 term-frequency saturation; the inverse
//! document frequency part is left to the backend (Qdrant `Modifier::Idf`),
//! which sees the whole collection. Queries only mark which terms occur.

use std::collections::BTreeMap;

use regex::Regex;

use super::{EmbedFuture, SparseEmbedder};
use crate::errors::RetrievalError;
use crate::record::SparseVector;

/// Common English words that carry no lexical signal.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

/// BM25 shape parameters.
#[derive(Clone, Copy, Debug)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f32,
    /// Length normalization strength.
    pub b: f32,
    /// Assumed average document length in tokens.
    pub avg_len: f32,
    /// Tokens longer than this are dropped.
    pub max_token_len: usize,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            avg_len: 256.0,
            max_token_len: 40,
        }
    }
}

/// Deterministic BM25 encoder; term ids are the first 4 bytes of the token's blake3 hash.
#[derive(Clone, Debug)]
pub struct Bm25Encoder {
    token_re: Regex,
    params: Bm25Params,
}

impl Bm25Encoder {
    pub fn new(params: Bm25Params) -> Result<Self, RetrievalError> {
        let token_re = Regex::new(r"[^\W_]+")
            .map_err(|e| RetrievalError::Config(format!("bm25 tokenizer: {e}")))?;
        Ok(Self { token_re, params })
    }

    /// Lowercased tokens with stopwords and overlong tokens removed.
    pub fn tokenize<'t>(&'t self, text: &'t str) -> impl Iterator<Item = String> + 't {
        self.token_re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(move |t| t.chars().count() <= self.params.max_token_len)
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
    }

    /// BM25 document vector.
    pub fn encode_document(&self, text: &str) -> SparseVector {
        let mut tf: BTreeMap<u32, f32> = BTreeMap::new();
        let mut doc_len = 0usize;
        for token in self.tokenize(text) {
            *tf.entry(term_id(&token)).or_insert(0.0) += 1.0;
            doc_len += 1;
        }

        let Bm25Params { k1, b, avg_len, .. } = self.params;
        let len_norm = 1.0 - b + b * (doc_len as f32 / avg_len);

        let mut out = SparseVector::default();
        for (id, freq) in tf {
            out.indices.push(id);
            out.values.push(freq * (k1 + 1.0) / (freq + k1 * len_norm));
        }
        out
    }

    /// Query vector: every distinct term with weight 1.0.
    pub fn encode_query(&self, text: &str) -> SparseVector {
        let mut ids: Vec<u32> = self.tokenize(text).map(|t| term_id(&t)).collect();
        ids.sort_unstable();
        ids.dedup();
        SparseVector {
            values: vec![1.0; ids.len()],
            indices: ids,
        }
    }
}

impl SparseEmbedder for Bm25Encoder {
    fn embed_document<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, SparseVector> {
        Box::pin(async move { Ok(self.encode_document(text)) })
    }

    fn embed_query<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, SparseVector> {
        Box::pin(async move { Ok(self.encode_query(text)) })
    }
}

/// Stable 32-bit term id.
fn term_id(token: &str) -> u32 {
    let h = blake3::hash(token.as_bytes());
    let b = h.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> Bm25Encoder {
        Bm25Encoder::new(Bm25Params::default()).unwrap()
    }

    #[test]
    fn tokenizer_drops_stopwords_and_punctuation() {
        let e = encoder();
        let tokens: Vec<String> = e.tokenize("The Quick, brown_fox is HERE!").collect();
        assert_eq!(tokens, vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn overlong_tokens_are_dropped() {
        let e = encoder();
        let long = "x".repeat(41);
        let tokens: Vec<String> = e.tokenize(&format!("short {long}")).collect();
        assert_eq!(tokens, vec!["short"]);
    }

    #[test]
    fn document_indices_are_sorted_and_unique() {
        let v = encoder().encode_document("rust tokio rust serde tokio rust");
        assert_eq!(v.len(), 3);
        assert!(v.indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(v.indices.len(), v.values.len());
    }

    #[test]
    fn repeated_terms_weigh_more_but_saturate() {
        let e = encoder();
        let v = e.encode_document("invoice invoice invoice payment");
        let weight = |term: &str| {
            let id = term_id(term);
            let pos = v.indices.iter().position(|i| *i == id).unwrap();
            v.values[pos]
        };
        assert!(weight("invoice") > weight("payment"));
        assert!(weight("invoice") < 3.0 * weight("payment"));
        assert!(weight("invoice") < 1.2 + 1.0);
    }

    #[test]
    fn query_marks_terms_with_unit_weight() {
        let e = encoder();
        let q = e.encode_query("Revenue revenue growth");
        assert_eq!(q.len(), 2);
        assert!(q.values.iter().all(|w| *w == 1.0));
        assert!(q.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn encoding_is_case_insensitive_and_deterministic() {
        let e = encoder();
        assert_eq!(e.encode_query("Contract"), e.encode_query("contract"));
        assert_eq!(e.encode_document("a contract"), e.encode_document("a contract"));
    }

    #[test]
    fn empty_or_stopword_only_text_is_empty() {
        let e = encoder();
        assert!(e.encode_document("").is_empty());
        assert!(e.encode_query("the and of").is_empty());
    }

    #[test]
    fn shared_terms_score_positive() {
        let e = encoder();
        let doc = e.encode_document("quarterly revenue grew in the third quarter");
        assert!(e.encode_query("revenue").dot(&doc) > 0.0);
        assert_eq!(e.encode_query("kittens").dot(&doc), 0.0);
    }
}
