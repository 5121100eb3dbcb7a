//! Generation port: "send a system + user prompt, get back text".
//!
//! Stages depend only on the [`Generator`] trait. Concrete backends:
//!
//! | Backend               | Transport                       |
//! |-----------------------|---------------------------------|
//! | [`AzureChatGenerator`] | reqwest → Azure OpenAI deployment |
//! | [`RigGenerator`]       | rig-core OpenAI-compatible client |
//!
//! Timeouts are applied by wrapping a backend in
//! [`crate::resilience::TimedGenerator`].

mod azure;
mod compat;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{GenerationConfig, GenerationProvider};
use crate::errors::PipelineError;

pub use azure::AzureChatGenerator;
pub use compat::RigGenerator;

/// Which pipeline stage issued a generation call. Used for logs and test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Classify,
    Respond,
    Evaluate,
    Escalate,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classify => write!(f, "classify"),
            Self::Respond => write!(f, "respond"),
            Self::Evaluate => write!(f, "evaluate"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// One non-streaming chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub stage: StageKind,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f64,
    pub max_output_tokens: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Run the completion and return the model's text, trimmed.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError>;
}

/// Build the configured backend.
pub fn from_config(config: &GenerationConfig) -> Result<Arc<dyn Generator>, PipelineError> {
    let generator: Arc<dyn Generator> = match config.provider {
        GenerationProvider::Azure => Arc::new(AzureChatGenerator::new(config.azure.clone())?),
        GenerationProvider::OpenAi => Arc::new(RigGenerator::new(&config.openai)?),
    };
    Ok(generator)
}
