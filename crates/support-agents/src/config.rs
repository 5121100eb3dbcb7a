//! Pipeline configuration: generation provider, policy index, resilience and
//! routing policy.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variables (e.g. `AZURE_DEPLOYMENT_NAME`, `PINECONE_API_KEY`)
//! 2. TOML file passed with `--config`
//! 3. Built-in defaults
//!
//! The resolved `PipelineConfig` is handed to port constructors explicitly;
//! nothing reads the environment after startup.

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::policy::EscalationPolicy;

const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 4096;

const DEFAULT_CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const DEFAULT_PINECONE_API_VERSION: &str = "2025-04";
const DEFAULT_INDEX_NAME: &str = "index-policies";
/// Namespace holding the support policy corpus.
pub const DEFAULT_NAMESPACE: &str = "policy-knowledge";
const DEFAULT_EMBED_MODEL: &str = "llama-text-embed-v2";
const DEFAULT_RERANK_MODEL: &str = "bge-reranker-v2-m3";
const DEFAULT_TEXT_FIELD: &str = "chunk_text";
const DEFAULT_TOP_K: usize = 3;

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRIEVAL_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

const ENV_PROVIDER: &str = "SUPPORT_LLM_PROVIDER";
const ENV_AZURE_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
const ENV_AZURE_KEY: &str = "AZURE_SUBSCRIPTION_KEY";
const ENV_AZURE_API_VERSION: &str = "AZURE_API_VERSION";
const ENV_AZURE_DEPLOYMENT: &str = "AZURE_DEPLOYMENT_NAME";
const ENV_OPENAI_URL: &str = "SUPPORT_LLM_URL";
const ENV_OPENAI_MODEL: &str = "SUPPORT_LLM_MODEL";
const ENV_OPENAI_KEY: &str = "SUPPORT_LLM_API_KEY";
const ENV_PINECONE_KEY: &str = "PINECONE_API_KEY";
const ENV_PINECONE_HOST: &str = "PINECONE_INDEX_HOST";
const ENV_NAMESPACE: &str = "SUPPORT_POLICY_NAMESPACE";

/// Which text-generation backend drafts and judges replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Azure OpenAI deployment, called directly over HTTPS.
    #[default]
    Azure,
    /// Any OpenAI-compatible chat endpoint, called through rig.
    OpenAi,
}

impl std::str::FromStr for GenerationProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown generation provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    pub azure: AzureConfig,
    pub openai: OpenAiCompatConfig,
    /// Upper bound on tokens per response, for every stage.
    pub max_output_tokens: u64,
    /// Temperature for the responder and escalator. Classifier and evaluator
    /// are pinned to zero.
    pub draft_temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::default(),
            azure: AzureConfig {
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
                ..AzureConfig::default()
            },
            openai: OpenAiCompatConfig::default(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            draft_temperature: 0.0,
        }
    }
}

/// Pinecone-backed policy index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub api_key: String,
    /// Data-plane host; resolved from the control plane when absent.
    pub index_host: Option<String>,
    pub control_plane_url: String,
    pub api_version: String,
    pub index_name: String,
    pub namespace: String,
    pub cloud: String,
    pub region: String,
    pub embed_model: String,
    /// Record field holding the passage text; embedded and reranked.
    pub text_field: String,
    pub rerank_model: String,
    pub top_k: usize,
    pub rerank_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            index_host: None,
            control_plane_url: DEFAULT_CONTROL_PLANE_URL.to_string(),
            api_version: DEFAULT_PINECONE_API_VERSION.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            text_field: DEFAULT_TEXT_FIELD.to_string(),
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            rerank_top_n: DEFAULT_TOP_K,
        }
    }
}

/// Deadlines and retry budget for port calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub call_timeout_secs: u64,
    /// Retries after the first attempt, retrieval reads only.
    pub retrieval_max_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub backoff_base_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            retrieval_max_retries: DEFAULT_RETRIEVAL_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        }
    }
}

impl ResilienceConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Top-level configuration for one process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub resilience: ResilienceConfig,
    pub policy: EscalationPolicy,
}

impl PipelineConfig {
    /// Defaults, then the optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.policy = config.policy.normalized();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay environment variables onto the current values.
    pub fn apply_env(&mut self) {
        if let Some(provider) = env_var(ENV_PROVIDER).and_then(|p| p.parse().ok()) {
            self.generation.provider = provider;
        }
        let azure = &mut self.generation.azure;
        override_from_env(&mut azure.endpoint, ENV_AZURE_ENDPOINT);
        override_from_env(&mut azure.api_key, ENV_AZURE_KEY);
        override_from_env(&mut azure.api_version, ENV_AZURE_API_VERSION);
        override_from_env(&mut azure.deployment, ENV_AZURE_DEPLOYMENT);
        let openai = &mut self.generation.openai;
        override_from_env(&mut openai.base_url, ENV_OPENAI_URL);
        override_from_env(&mut openai.model, ENV_OPENAI_MODEL);
        override_from_env(&mut openai.api_key, ENV_OPENAI_KEY);
        override_from_env(&mut self.retrieval.api_key, ENV_PINECONE_KEY);
        override_from_env(&mut self.retrieval.namespace, ENV_NAMESPACE);
        if let Some(host) = env_var(ENV_PINECONE_HOST) {
            self.retrieval.index_host = Some(host);
        }
    }

    /// Validate everything the pipeline itself depends on.
    pub fn validate(&self) -> Result<(), String> {
        self.policy.validate()?;
        let generation = &self.generation;
        if !(0.0..=2.0).contains(&generation.draft_temperature) {
            return Err(format!(
                "draft_temperature must be in [0, 2], got {}",
                generation.draft_temperature
            ));
        }
        if generation.max_output_tokens == 0 {
            return Err("max_output_tokens must be > 0".to_string());
        }
        match generation.provider {
            GenerationProvider::Azure => {
                let azure = &generation.azure;
                for (name, value) in [
                    (ENV_AZURE_ENDPOINT, &azure.endpoint),
                    (ENV_AZURE_KEY, &azure.api_key),
                    (ENV_AZURE_API_VERSION, &azure.api_version),
                    (ENV_AZURE_DEPLOYMENT, &azure.deployment),
                ] {
                    if value.trim().is_empty() {
                        return Err(format!("azure provider selected but {name} is not set"));
                    }
                }
            }
            GenerationProvider::OpenAi => {
                if generation.openai.base_url.trim().is_empty() {
                    return Err(format!("openai provider selected but {ENV_OPENAI_URL} is empty"));
                }
                if generation.openai.model.trim().is_empty() {
                    return Err(format!("openai provider selected but {ENV_OPENAI_MODEL} is empty"));
                }
            }
        }
        self.validate_retrieval_shape()?;
        if self.resilience.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }

    /// Validate search parameters without requiring service credentials.
    pub fn validate_retrieval_shape(&self) -> Result<(), String> {
        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return Err("top_k must be > 0".to_string());
        }
        if retrieval.rerank_top_n == 0 || retrieval.rerank_top_n > retrieval.top_k {
            return Err(format!(
                "rerank_top_n must be in [1, top_k={}], got {}",
                retrieval.top_k, retrieval.rerank_top_n
            ));
        }
        if retrieval.namespace.trim().is_empty() {
            return Err("namespace must not be empty".to_string());
        }
        Ok(())
    }

    /// Credentials needed only when talking to the hosted index.
    pub fn validate_remote_retrieval(&self) -> Result<(), String> {
        if self.retrieval.api_key.trim().is_empty() {
            return Err(format!("{ENV_PINECONE_KEY} is not set"));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn override_from_env(slot: &mut String, name: &str) {
    if let Some(value) = env_var(name) {
        *slot = value;
    }
}
