//! Pinecone integrated-inference index (embedding and rerank run server side).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{
    EnsureOutcome, IndexSpec, IndexStats, PolicyIndex, PolicyPassage, PolicyRecord, SearchRequest,
};
use crate::config::RetrievalConfig;
use crate::errors::{PipelineError, Service, Unavailability};

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: f64,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceStats>,
    #[serde(default)]
    total_vector_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: u64,
}

pub struct PineconeIndex {
    config: RetrievalConfig,
    http: reqwest::Client,
    host: OnceCell<String>,
}

impl PineconeIndex {
    pub fn new(config: RetrievalConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;
        let host = match config.index_host.as_deref() {
            Some(h) => OnceCell::new_with(Some(normalize_host(h))),
            None => OnceCell::new(),
        };
        Ok(Self { config, http, host })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", &self.config.api_version)
    }

    fn control_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.control_plane_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PipelineError> {
        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::from_transport(Service::Retrieval, &e))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::from_status(Service::Retrieval, status, &body))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PipelineError> {
        response
            .json()
            .await
            .map_err(|e| PipelineError::from_transport(Service::Retrieval, &e))
    }

    /// Look the index up on the control plane. `None` when it does not exist.
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>, PipelineError> {
        let url = self.control_url(&format!("indexes/{name}"));
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| PipelineError::from_transport(Service::Retrieval, &e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::from_status(Service::Retrieval, status, &body));
        }
        Self::decode(response).await.map(Some)
    }

    /// Data-plane base URL, resolved once per process.
    async fn data_url(&self, path: &str) -> Result<String, PipelineError> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let description = self
                    .describe_index(&self.config.index_name)
                    .await?
                    .ok_or_else(|| {
                        PipelineError::unavailable(
                            Service::Retrieval,
                            Unavailability::Rejected,
                            format!("index '{}' does not exist", self.config.index_name),
                        )
                    })?;
                Ok::<_, PipelineError>(normalize_host(&description.host))
            })
            .await?;
        Ok(format!("{host}/{}", path.trim_start_matches('/')))
    }

    fn passage_from_hit(&self, hit: Hit) -> PolicyPassage {
        let text = hit
            .fields
            .get(&self.config.text_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let category = hit
            .fields
            .get("category")
            .and_then(Value::as_str)
            .map(str::to_string);
        PolicyPassage {
            text,
            id: hit.id,
            category,
            score: round_score(hit.score),
        }
    }
}

#[async_trait]
impl PolicyIndex for PineconeIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsureOutcome, PipelineError> {
        if self.describe_index(&spec.name).await?.is_some() {
            info!(index = %spec.name, "Using existing policy index");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        let body = json!({
            "name": spec.name,
            "cloud": spec.cloud,
            "region": spec.region,
            "embed": {
                "model": spec.embed_model,
                "field_map": { "text": spec.text_field },
            },
        });
        let url = self.control_url("indexes/create-for-model");
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::from_transport(Service::Retrieval, &e))?;

        // Lost a creation race with another process.
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::from_status(Service::Retrieval, status, &body));
        }
        info!(index = %spec.name, model = %spec.embed_model, "Created policy index");
        Ok(EnsureOutcome::Created)
    }

    async fn upsert(&self, namespace: &str, records: &[PolicyRecord]) -> Result<(), PipelineError> {
        if records.is_empty() {
            return Ok(());
        }
        let body = records_to_ndjson(records, &self.config.text_field)?;
        let url = self
            .data_url(&format!("records/namespaces/{namespace}/upsert"))
            .await?;
        self.send(
            self.request(reqwest::Method::POST, &url)
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body),
        )
        .await?;
        info!(namespace, count = records.len(), "Upserted policy records");
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<PolicyPassage>, PipelineError> {
        let mut body = json!({
            "query": {
                "top_k": request.top_k,
                "inputs": { "text": request.query },
            },
            "fields": [self.config.text_field, "category"],
        });
        if let Some(rerank) = &request.rerank {
            body["rerank"] = json!({
                "model": rerank.model,
                "top_n": rerank.top_n,
                "rank_fields": rerank.rank_fields,
            });
        }

        let url = self
            .data_url(&format!("records/namespaces/{}/search", request.namespace))
            .await?;
        debug!(namespace = %request.namespace, query = %request.query, "Pinecone search");

        let response = self
            .send(self.request(reqwest::Method::POST, &url).json(&body))
            .await?;
        let parsed: SearchResponse = Self::decode(response).await?;
        Ok(parsed
            .result
            .hits
            .into_iter()
            .map(|hit| self.passage_from_hit(hit))
            .collect())
    }

    async fn describe(&self) -> Result<IndexStats, PipelineError> {
        let url = self.data_url("describe_index_stats").await?;
        let response = self
            .send(self.request(reqwest::Method::POST, &url).json(&json!({})))
            .await?;
        let parsed: StatsResponse = Self::decode(response).await?;
        Ok(IndexStats {
            total_records: parsed.total_vector_count,
            namespaces: parsed
                .namespaces
                .into_iter()
                .map(|(name, stats)| (name, stats.vector_count))
                .collect(),
        })
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Two decimals, as surfaced in reports.
fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// One JSON record per line: `_id`, the text field, then flat metadata.
fn records_to_ndjson(records: &[PolicyRecord], text_field: &str) -> Result<String, PipelineError> {
    let mut out = String::new();
    for record in records {
        let mut line = Map::new();
        line.insert("_id".to_string(), Value::String(record.id.clone()));
        line.insert(text_field.to_string(), Value::String(record.text.clone()));
        for (key, value) in &record.metadata {
            line.insert(key.clone(), value.clone());
        }
        let encoded = serde_json::to_string(&Value::Object(line))
            .map_err(|e| PipelineError::Internal(e.into()))?;
        out.push_str(&encoded);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> PineconeIndex {
        PineconeIndex::new(RetrievalConfig {
            api_key: "pc-key".into(),
            index_host: Some("index-policies-abc.svc.pinecone.io".into()),
            ..RetrievalConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn host_gets_https_scheme() {
        assert_eq!(
            normalize_host("index-policies-abc.svc.pinecone.io/"),
            "https://index-policies-abc.svc.pinecone.io"
        );
        assert_eq!(
            normalize_host("http://localhost:5081"),
            "http://localhost:5081"
        );
    }

    #[tokio::test]
    async fn configured_host_skips_control_plane() {
        let url = index().data_url("describe_index_stats").await.unwrap();
        assert_eq!(
            url,
            "https://index-policies-abc.svc.pinecone.io/describe_index_stats"
        );
    }

    #[test]
    fn scores_round_to_two_decimals() {
        assert_eq!(round_score(0.98765), 0.99);
        assert_eq!(round_score(0.004), 0.0);
    }

    #[test]
    fn ndjson_flattens_metadata() {
        let records = vec![
            PolicyRecord::new("billing-2", "Refunds within 30 days.").with_category("billing"),
            PolicyRecord::new("security-1", "Encrypted at rest."),
        ];
        let body = records_to_ndjson(&records, "chunk_text").unwrap();
        let lines: Vec<Value> = body
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["_id"], "billing-2");
        assert_eq!(lines[0]["chunk_text"], "Refunds within 30 days.");
        assert_eq!(lines[0]["category"], "billing");
        assert!(lines[1].get("category").is_none());
    }

    #[test]
    fn hit_maps_to_passage() {
        let hit: Hit = serde_json::from_value(json!({
            "_id": "billing-2",
            "_score": 0.8712,
            "fields": {
                "chunk_text": "Refunds must be requested within 30 days.",
                "category": "billing"
            }
        }))
        .unwrap();
        let passage = index().passage_from_hit(hit);
        assert_eq!(passage.id, "billing-2");
        assert_eq!(passage.category.as_deref(), Some("billing"));
        assert_eq!(passage.score, 0.87);
        assert!(passage.text.starts_with("Refunds"));
    }

    #[test]
    fn empty_search_result_decodes() {
        let parsed: SearchResponse = serde_json::from_value(json!({"usage": {}})).unwrap();
        assert!(parsed.result.hits.is_empty());
    }

    #[test]
    fn stats_decode() {
        let parsed: StatsResponse = serde_json::from_value(json!({
            "dimension": 1024,
            "namespaces": {"policy-knowledge": {"vectorCount": 10}},
            "totalVectorCount": 10
        }))
        .unwrap();
        assert_eq!(parsed.total_vector_count, 10);
        assert_eq!(parsed.namespaces["policy-knowledge"].vector_count, 10);
    }
}
