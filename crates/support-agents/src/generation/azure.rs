//! Azure OpenAI chat-completions backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, Generator};
use crate::config::AzureConfig;
use crate::errors::{PipelineError, Service, Unavailability};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    max_tokens: u64,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Calls one Azure OpenAI deployment.
pub struct AzureChatGenerator {
    config: AzureConfig,
    http: reqwest::Client,
}

impl AzureChatGenerator {
    pub fn new(config: AzureConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, http })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }
}

#[async_trait]
impl Generator for AzureChatGenerator {
    fn name(&self) -> &'static str {
        "azure-openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        let body = ChatRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        };

        debug!(
            stage = %request.stage,
            deployment = %self.config.deployment,
            "azure chat completion"
        );

        let response = self
            .http
            .post(self.completions_url())
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::from_transport(Service::Generation, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::from_status(Service::Generation, status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::from_transport(Service::Generation, &e))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                PipelineError::unavailable(
                    Service::Generation,
                    Unavailability::Rejected,
                    "response contained no message content",
                )
            })?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(endpoint: &str) -> AzureChatGenerator {
        AzureChatGenerator::new(AzureConfig {
            endpoint: endpoint.into(),
            api_key: "k".into(),
            api_version: "2024-06-01".into(),
            deployment: "support-gpt".into(),
        })
        .unwrap()
    }

    #[test]
    fn url_includes_deployment_and_version() {
        let g = generator("https://acme.openai.azure.com/");
        assert_eq!(
            g.completions_url(),
            "https://acme.openai.azure.com/openai/deployments/support-gpt/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "usr",
                },
            ],
            max_tokens: 4096,
            temperature: 0.0,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "usr");
        assert_eq!(value["max_tokens"], 4096);
    }

    #[test]
    fn response_without_choices_parses_empty() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
