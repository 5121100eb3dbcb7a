//! QA review of a drafted reply.

use std::sync::Arc;

use super::DETERMINISTIC_TEMPERATURE;
use crate::errors::PipelineError;
use crate::generation::{GenerationRequest, Generator, StageKind};
use crate::parser::{extract_json_object, ExtractionStrategy};
use crate::prompts;
use crate::types::{Draft, EvaluationVerdict, Ticket};

pub struct Evaluator {
    generator: Arc<dyn Generator>,
    extraction: ExtractionStrategy,
    max_output_tokens: u64,
}

impl Evaluator {
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

    /// Judge whether the draft can go to the customer as-is.
    ///
    /// Returns the verdict exactly as stated; parse failures propagate so the
    /// caller applies the fail-closed default explicitly.
    pub async fn evaluate(
        &self,
        ticket: &Ticket,
        draft: &Draft,
    ) -> Result<EvaluationVerdict, PipelineError> {
        let request = GenerationRequest {
            stage: StageKind::Evaluate,
            system_prompt: prompts::EVALUATOR_SYSTEM.to_string(),
            user_prompt: prompts::evaluator_user(&ticket.text, &draft.text),
            temperature: DETERMINISTIC_TEMPERATURE,
            max_output_tokens: self.max_output_tokens,
        };
        let raw = self.generator.generate(&request).await?;
        let fields = extract_json_object(&raw, self.extraction)?;
        Ok(EvaluationVerdict::from_object(&fields))
    }
}
