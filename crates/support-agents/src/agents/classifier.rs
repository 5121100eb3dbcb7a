//! Ticket classifier: category + priority as JSON.

use std::sync::Arc;

use tracing::debug;

use super::DETERMINISTIC_TEMPERATURE;
use crate::errors::PipelineError;
use crate::generation::{GenerationRequest, Generator, StageKind};
use crate::parser::{extract_json_object, ExtractionStrategy};
use crate::prompts;
use crate::types::{Classification, Ticket};

pub struct Classifier {
    generator: Arc<dyn Generator>,
    extraction: ExtractionStrategy,
    max_output_tokens: u64,
}

impl Classifier {
    pub fn new(
        generator: Arc<dyn Generator>,
        extraction: ExtractionStrategy,
        max_output_tokens: u64,
    ) -> Self {
        Self {
            generator,
            extraction,
            max_output_tokens,
        }
    }

    /// Label the ticket.
    ///
    /// A response without a parseable JSON object is returned as
    /// `MalformedOutput`; missing fields inside a parsed object fall back to
    /// `unknown` / `normal`.
    pub async fn classify(&self, ticket: &Ticket) -> Result<Classification, PipelineError> {
        let request = GenerationRequest {
            stage: StageKind::Classify,
            system_prompt: prompts::CLASSIFIER_SYSTEM.to_string(),
            user_prompt: prompts::classifier_user(&ticket.text),
            temperature: DETERMINISTIC_TEMPERATURE,
            max_output_tokens: self.max_output_tokens,
        };
        let raw = self.generator.generate(&request).await?;
        debug!(raw = %raw, "Classification raw result");

        let fields = extract_json_object(&raw, self.extraction)?;
        Ok(Classification::from_object(&fields))
    }
}
