//! Seed policy corpus loaded by `support-agents seed` and by offline runs.

use std::time::Duration;

use tracing::info;

use crate::config::RetrievalConfig;
use crate::errors::PipelineError;
use crate::retrieval::{EnsureOutcome, IndexSpec, PolicyIndex, PolicyRecord};

/// Wait after upserting before the hosted index serves the new records.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

const BILLING: &[(&str, &str)] = &[
    ("billing-1", "Customers will be billed on the first day of every month."),
    ("billing-2", "Refunds must be requested within 30 days of the original transaction."),
    ("billing-3", "All transactions are subject to a 5% processing fee."),
    ("billing-4", "Subscription renewals will be automatically processed."),
    ("billing-5", "Late payments will incur a penalty of $25."),
];

const SECURITY: &[(&str, &str)] = &[
    ("security-1", "All user data is encrypted in transit and at rest."),
    ("security-2", "Multi-factor authentication is required for admin accounts."),
    ("security-3", "System access is logged and audited regularly."),
    ("security-4", "Security patches are applied within 48 hours of release."),
    ("security-5", "Password complexity requirements include at least 12 characters."),
];

pub fn seed_records() -> Vec<PolicyRecord> {
    let tagged = |category: &'static str, docs: &'static [(&str, &str)]| {
        docs.iter()
            .map(move |(id, text)| PolicyRecord::new(*id, *text).with_category(category))
    };
    tagged("billing", BILLING)
        .chain(tagged("security", SECURITY))
        .collect()
}

/// Create the index if needed and upsert the seed corpus into the configured
/// namespace. Re-running overwrites records with the same ids.
pub async fn seed_index(
    index: &dyn PolicyIndex,
    retrieval: &RetrievalConfig,
) -> Result<EnsureOutcome, PipelineError> {
    let spec = IndexSpec::from_config(retrieval);
    let outcome = index.ensure_index(&spec).await?;
    info!(index = %spec.name, ?outcome, "Policy index ready");

    let records = seed_records();
    index.upsert(&retrieval.namespace, &records).await?;
    info!(
        namespace = %retrieval.namespace,
        count = records.len(),
        "Seeded policy records"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{InMemoryPolicyIndex, SearchRequest};

    #[test]
    fn corpus_has_unique_ids_and_categories() {
        let records = seed_records();
        assert_eq!(records.len(), 10);
        let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert!(records
            .iter()
            .all(|r| r.id.starts_with(r.category().unwrap())));
    }

    #[tokio::test]
    async fn seeding_twice_keeps_one_copy() {
        let index = InMemoryPolicyIndex::new();
        let retrieval = RetrievalConfig::default();
        assert_eq!(
            seed_index(&index, &retrieval).await.unwrap(),
            EnsureOutcome::Created
        );
        assert_eq!(
            seed_index(&index, &retrieval).await.unwrap(),
            EnsureOutcome::AlreadyExists
        );

        let stats = index.describe().await.unwrap();
        assert_eq!(stats.total_records, 10);

        let hits = index
            .search(&SearchRequest::reranked(&retrieval, "late payment penalty", 3))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "billing-5");
    }
}
