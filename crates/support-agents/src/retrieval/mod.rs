//! Retrieval port: scored policy passages from a namespaced semantic index.
//!
//! The pipeline only ever calls [`PolicyIndex::search`]. Index creation,
//! upsert and statistics are administrative operations exposed for the
//! `seed` / `stats` commands.
//!
//! Backends:
//! - [`PineconeIndex`]: hosted index with integrated embedding and rerank.
//! - [`InMemoryPolicyIndex`]: deterministic lexical index for offline runs.

mod memory;
mod pinecone;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::RetrievalConfig;
use crate::errors::PipelineError;

pub use memory::InMemoryPolicyIndex;
pub use pinecone::PineconeIndex;

/// One document returned by a search, ordered as the service ranked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPassage {
    pub text: String,
    pub id: String,
    pub category: Option<String>,
    pub score: f64,
}

/// A document to store in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: String,
    pub text: String,
    /// Flat metadata stored beside the text (e.g. `category`).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PolicyRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.metadata
            .insert("category".to_string(), Value::String(category.into()));
        self
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata.get("category").and_then(Value::as_str)
    }
}

/// Secondary relevance pass over the initial candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rerank {
    pub model: String,
    /// Never larger than the request's `top_k`.
    pub top_n: usize,
    pub rank_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub namespace: String,
    pub query: String,
    pub top_k: usize,
    pub rerank: Option<Rerank>,
}

impl SearchRequest {
    /// Build a reranked search using the configured models and fields.
    pub fn reranked(config: &RetrievalConfig, query: impl Into<String>, top_k: usize) -> Self {
        Self {
            namespace: config.namespace.clone(),
            query: query.into(),
            top_k,
            rerank: Some(Rerank {
                model: config.rerank_model.clone(),
                top_n: config.rerank_top_n.min(top_k),
                rank_fields: vec![config.text_field.clone()],
            }),
        }
    }

    /// Number of passages the caller can expect at most.
    pub fn result_limit(&self) -> usize {
        self.rerank
            .as_ref()
            .map_or(self.top_k, |r| r.top_n.min(self.top_k))
    }
}

/// What to create if the index is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub embed_model: String,
    /// Record field the embedding model reads.
    pub text_field: String,
    pub cloud: String,
    pub region: String,
}

impl IndexSpec {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            name: config.index_name.clone(),
            embed_model: config.embed_model.clone(),
            text_field: config.text_field.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_records: u64,
    pub namespaces: BTreeMap<String, u64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyIndex: Send + Sync {
    /// Create the index if absent; no-op if present.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsureOutcome, PipelineError>;

    /// Insert or replace records by id.
    async fn upsert(&self, namespace: &str, records: &[PolicyRecord]) -> Result<(), PipelineError>;

    /// Top passages for a query. An empty result is not an error.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<PolicyPassage>, PipelineError>;

    async fn describe(&self) -> Result<IndexStats, PipelineError>;
}
