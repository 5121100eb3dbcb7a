//! OpenAI-compatible backend built on rig.
//!
//! One preamble-configured agent is built per call: the system prompt differs
//! for every stage and ticket, and building an agent is cheap.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::debug;

use super::{GenerationRequest, Generator};
use crate::config::OpenAiCompatConfig;
use crate::errors::{PipelineError, Service, Unavailability};

pub struct RigGenerator {
    client: openai::CompletionsClient,
    model: String,
}

impl RigGenerator {
    pub fn new(config: &OpenAiCompatConfig) -> Result<Self, PipelineError> {
        let api_key = if config.api_key.is_empty() {
            "not-needed"
        } else {
            config.api_key.as_str()
        };
        let client = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(&config.base_url)
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!(
                    "failed to build client for {}: {e}",
                    config.base_url
                ))
            })?;
        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generator for RigGenerator {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        let agent = self
            .client
            .agent(&self.model)
            .name(&request.stage.to_string())
            .preamble(&request.system_prompt)
            .temperature(request.temperature)
            .max_tokens(request.max_output_tokens)
            .build();

        debug!(stage = %request.stage, model = %self.model, "rig completion");

        let response: String = agent
            .prompt(request.user_prompt.as_str())
            .await
            .map_err(|e| classify_prompt_error(&e.to_string()))?;
        Ok(response.trim().to_string())
    }
}

/// rig flattens transport failures into its error text; recover the kind.
fn classify_prompt_error(message: &str) -> PipelineError {
    let lower = message.to_ascii_lowercase();
    let kind = if message.contains("429") || lower.contains("rate limit") {
        Unavailability::RateLimited
    } else if message.contains("401") || message.contains("403") || lower.contains("unauthorized")
    {
        Unavailability::Unauthorized
    } else if lower.contains("timed out") || lower.contains("timeout") {
        Unavailability::Timeout
    } else if lower.contains("connection")
        || message.contains("502")
        || message.contains("503")
        || message.contains("504")
    {
        Unavailability::Network
    } else {
        Unavailability::Rejected
    };
    PipelineError::unavailable(Service::Generation, kind, message)
}
