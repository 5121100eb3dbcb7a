//! In-process policy index with lexical scoring.
//!
//! Scores are the cosine of the query and document term sets after
//! lower-casing, dropping stop words and folding a trailing plural `s`.
//! Only passages sharing at least one term are returned, so an unrelated
//! query yields an empty result exactly like a sparse hosted index would.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{
    EnsureOutcome, IndexSpec, IndexStats, PolicyIndex, PolicyPassage, PolicyRecord, SearchRequest,
};
use crate::errors::PipelineError;

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "are", "as", "at", "be", "by", "can", "did", "do", "does",
    "for", "from", "how", "i", "if", "in", "is", "it", "me", "my", "of", "on", "or", "our",
    "that", "the", "this", "to", "was", "we", "what", "when", "why", "will", "with", "you",
    "your",
];

type Namespace = BTreeMap<String, PolicyRecord>;

#[derive(Default)]
pub struct InMemoryPolicyIndex {
    indexes: RwLock<HashSet<String>>,
    namespaces: RwLock<BTreeMap<String, Namespace>>,
}

impl InMemoryPolicyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index with one namespace already populated.
    pub fn with_records(namespace: &str, records: impl IntoIterator<Item = PolicyRecord>) -> Self {
        let index = Self::new();
        if let Ok(mut namespaces) = index.namespaces.write() {
            let ns = namespaces.entry(namespace.to_string()).or_default();
            for record in records {
                ns.insert(record.id.clone(), record);
            }
        }
        index
    }
}

fn poisoned() -> PipelineError {
    PipelineError::Internal(anyhow::anyhow!("in-memory policy index lock poisoned"))
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .map(|t| fold_plural(&t))
        .collect()
}

fn fold_plural(term: &str) -> String {
    if term.len() > 3 && term.ends_with('s') && !term.ends_with("ss") {
        term[..term.len() - 1].to_string()
    } else {
        term.to_string()
    }
}

fn similarity(query: &BTreeSet<String>, doc: &BTreeSet<String>) -> f64 {
    if query.is_empty() || doc.is_empty() {
        return 0.0;
    }
    let shared = query.intersection(doc).count() as f64;
    shared / ((query.len() * doc.len()) as f64).sqrt()
}

#[async_trait]
impl PolicyIndex for InMemoryPolicyIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsureOutcome, PipelineError> {
        let mut indexes = self.indexes.write().map_err(|_| poisoned())?;
        if indexes.insert(spec.name.clone()) {
            Ok(EnsureOutcome::Created)
        } else {
            Ok(EnsureOutcome::AlreadyExists)
        }
    }

    async fn upsert(&self, namespace: &str, records: &[PolicyRecord]) -> Result<(), PipelineError> {
        let mut namespaces = self.namespaces.write().map_err(|_| poisoned())?;
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<PolicyPassage>, PipelineError> {
        let namespaces = self.namespaces.read().map_err(|_| poisoned())?;
        let Some(ns) = namespaces.get(&request.namespace) else {
            return Ok(Vec::new());
        };

        let query = terms(&request.query);
        let mut passages: Vec<PolicyPassage> = ns
            .values()
            .filter_map(|record| {
                let score = similarity(&query, &terms(&record.text));
                (score > 0.0).then(|| PolicyPassage {
                    text: record.text.clone(),
                    id: record.id.clone(),
                    category: record.category().map(str::to_string),
                    score: (score * 100.0).round() / 100.0,
                })
            })
            .collect();

        passages.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        passages.truncate(request.result_limit());
        Ok(passages)
    }

    async fn describe(&self) -> Result<IndexStats, PipelineError> {
        let namespaces = self.namespaces.read().map_err(|_| poisoned())?;
        let counts: BTreeMap<String, u64> = namespaces
            .iter()
            .map(|(name, ns)| (name.clone(), ns.len() as u64))
            .collect();
        Ok(IndexStats {
            total_records: counts.values().sum(),
            namespaces: counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::policies;

    fn seeded() -> InMemoryPolicyIndex {
        InMemoryPolicyIndex::with_records("policy-knowledge", policies::seed_records())
    }

    fn search(query: &str) -> SearchRequest {
        SearchRequest::reranked(&RetrievalConfig::default(), query, 3)
    }

    #[tokio::test]
    async fn refund_query_finds_refund_policy_first() {
        let hits = seeded()
            .search(&search("billing policy: Can I get a refund if I change my mind?"))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "billing-2");
        assert_eq!(hits[0].category.as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn password_query_finds_security_policy() {
        let hits = seeded()
            .search(&search("What are your password rules?"))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "security-5");
    }

    #[tokio::test]
    async fn unrelated_query_returns_empty() {
        let hits = seeded().search(&search("zebra giraffe")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn unknown_namespace_returns_empty() {
        let mut request = search("refund");
        request.namespace = "other".into();
        assert!(seeded().search(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn results_are_capped_and_ordered() {
        let index = InMemoryPolicyIndex::new();
        let records: Vec<PolicyRecord> = (1..=6)
            .map(|i| PolicyRecord::new(format!("fee-{i}"), format!("fee number {i}")))
            .collect();
        index.upsert("ns", &records).await.unwrap();
        let mut request = search("fee");
        request.namespace = "ns".into();
        let hits = index.search(&request).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn ensure_index_is_idempotent() {
        let index = InMemoryPolicyIndex::new();
        let spec = IndexSpec::from_config(&RetrievalConfig::default());
        assert_eq!(
            index.ensure_index(&spec).await.unwrap(),
            EnsureOutcome::Created
        );
        assert_eq!(
            index.ensure_index(&spec).await.unwrap(),
            EnsureOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_counts() {
        let index = seeded();
        index
            .upsert(
                "policy-knowledge",
                &[PolicyRecord::new("billing-1", "Billed quarterly.")],
            )
            .await
            .unwrap();
        let stats = index.describe().await.unwrap();
        assert_eq!(stats.total_records, 10);
        assert_eq!(stats.namespaces["policy-knowledge"], 10);
    }

    #[test]
    fn plural_folding() {
        assert_eq!(fold_plural("refunds"), "refund");
        assert_eq!(fold_plural("access"), "access");
        assert_eq!(fold_plural("gas"), "gas");
    }
}
