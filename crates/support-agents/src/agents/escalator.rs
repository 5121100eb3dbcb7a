//! Escalation note for a human agent. Free text; nothing to parse.

use std::sync::Arc;

use crate::errors::PipelineError;
use crate::generation::{GenerationRequest, Generator, StageKind};
use crate::prompts;
use crate::types::Ticket;

pub struct Escalator {
    generator: Arc<dyn Generator>,
    temperature: f64,
    max_output_tokens: u64,
}

impl Escalator {
    pub fn new(generator: Arc<dyn Generator>, temperature: f64, max_output_tokens: u64) -> Self {
        Self {
            generator,
            temperature,
            max_output_tokens,
        }
    }

    pub async fn escalate(&self, ticket: &Ticket, reason: &str) -> Result<String, PipelineError> {
        let request = GenerationRequest {
            stage: StageKind::Escalate,
            system_prompt: prompts::ESCALATOR_SYSTEM.to_string(),
            user_prompt: prompts::escalator_user(&ticket.text, reason),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };
        self.generator.generate(&request).await
    }
}
