//! Retrieval-grounded reply drafting.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::errors::PipelineError;
use crate::generation::{GenerationRequest, Generator, StageKind};
use crate::prompts;
use crate::retrieval::{PolicyIndex, PolicyPassage, SearchRequest};
use crate::types::{Draft, Ticket, UNKNOWN_CATEGORY};

/// A drafted reply and the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct Drafted {
    pub draft: Draft,
    pub passages: Vec<PolicyPassage>,
}

pub struct Responder {
    generator: Arc<dyn Generator>,
    index: Arc<dyn PolicyIndex>,
    retrieval: RetrievalConfig,
    temperature: f64,
    max_output_tokens: u64,
}

impl Responder {
    pub fn new(
        generator: Arc<dyn Generator>,
        index: Arc<dyn PolicyIndex>,
        retrieval: RetrievalConfig,
        temperature: f64,
        max_output_tokens: u64,
    ) -> Self {
        Self {
            generator,
            index,
            retrieval,
            temperature,
            max_output_tokens,
        }
    }

    /// Retrieve up to `retrieval.top_k` passages for the ticket and draft a
    /// reply.
    ///
    /// Zero hits is a valid result: the placeholder context is used and the
    /// draft is still produced.
    pub async fn respond(&self, ticket: &Ticket, category: &str) -> Result<Drafted, PipelineError> {
        let known = Some(category).filter(|c| !c.is_empty() && *c != UNKNOWN_CATEGORY);
        let query = prompts::policy_query(known, &ticket.text);
        let request = SearchRequest::reranked(&self.retrieval, query, self.retrieval.top_k);
        let passages = self.index.search(&request).await?;

        info!(
            hits = passages.len(),
            ids = ?passages.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            "Retrieved policy context"
        );

        let context = context_block(&passages);
        let request = GenerationRequest {
            stage: StageKind::Respond,
            system_prompt: prompts::responder_system(category, &context),
            user_prompt: prompts::responder_user(&ticket.text),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };
        let text = self.generator.generate(&request).await?;
        debug!(draft = %text, "Proposed response");

        Ok(Drafted {
            draft: Draft { text },
            passages,
        })
    }
}

/// Newline-joined passage text, or the placeholder when nothing matched.
pub fn context_block(passages: &[PolicyPassage]) -> String {
    let joined = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.trim().is_empty() {
        prompts::NO_POLICY_CONTEXT.to_string()
    } else {
        joined
    }
}
