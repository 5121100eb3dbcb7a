//! Ticket pipeline controller.
//!
//! Sequences the stages for one ticket, applies the branch rules and returns
//! exactly one of two dispositions, or a `TicketFailure` when a fatal
//! condition stops the run:
//!
//! 1. Classify. Unparseable output is fatal for the ticket.
//! 2. Draft a reply from retrieved policy context.
//! 3. Auto-escalate categories (and `unknown`) skip the evaluator.
//! 4. Otherwise evaluate. Unparseable evaluation counts as a rejection.
//! 5. Approve iff the evaluator approved; every escalation writes a note.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::agents::StageSet;
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::generation::Generator;
use crate::policy::EscalationPolicy;
use crate::prompts::PROMPT_VERSION;
use crate::resilience::{ResilientIndex, TimedGenerator};
use crate::retrieval::{PolicyIndex, PolicyPassage};
use crate::state_machine::{StateMachine, TicketState, TransitionRecord};
use crate::types::{Classification, Disposition, Draft, Evaluation, Ticket};

/// Everything a completed run produced, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TicketOutcome {
    pub ticket: Ticket,
    pub classification: Classification,
    /// Draft proposed by the responder, approved or not.
    pub draft: Draft,
    pub passages: Vec<PolicyPassage>,
    /// `None` when the category was auto-escalated.
    pub evaluation: Option<Evaluation>,
    pub disposition: Disposition,
    pub transitions: Vec<TransitionRecord>,
}

/// A run that stopped before producing a disposition.
#[derive(Debug, Error)]
#[error("ticket failed in state {state}: {error}")]
pub struct TicketFailure {
    pub ticket: Ticket,
    /// State the run was in when the error surfaced.
    pub state: TicketState,
    pub error: PipelineError,
    pub transitions: Vec<TransitionRecord>,
}

impl TicketFailure {
    /// Raw model output, when the failure was a parse failure.
    pub fn raw_output(&self) -> Option<&str> {
        self.error.raw_output()
    }
}

pub type TicketResult = Result<TicketOutcome, TicketFailure>;

struct Progress {
    classification: Classification,
    draft: Draft,
    passages: Vec<PolicyPassage>,
    evaluation: Option<Evaluation>,
    disposition: Disposition,
}

pub struct TicketPipeline {
    stages: StageSet,
    policy: EscalationPolicy,
}

impl TicketPipeline {
    pub fn new(
        config: &PipelineConfig,
        generator: Arc<dyn Generator>,
        index: Arc<dyn PolicyIndex>,
    ) -> Self {
        Self::from_stages(
            StageSet::new(config, generator, index),
            config.policy.clone().normalized(),
        )
    }

    /// Same as [`TicketPipeline::new`], with the generation deadline and
    /// retrieval retry budget from `config.resilience` applied to both ports.
    pub fn with_resilience(
        config: &PipelineConfig,
        generator: Arc<dyn Generator>,
        index: Arc<dyn PolicyIndex>,
    ) -> Self {
        let resilience = &config.resilience;
        let generator: Arc<dyn Generator> =
            Arc::new(TimedGenerator::new(generator, resilience.call_timeout()));
        let index: Arc<dyn PolicyIndex> = Arc::new(ResilientIndex::from_config(index, resilience));
        Self::new(config, generator, index)
    }

    pub fn from_stages(stages: StageSet, policy: EscalationPolicy) -> Self {
        Self { stages, policy }
    }

    /// Run one ticket to a disposition.
    pub async fn handle(&self, ticket: &Ticket) -> TicketResult {
        let mut sm = StateMachine::new();
        let result = self.drive(ticket, &mut sm).await;
        match result {
            Ok(progress) => {
                info!(
                    path = %sm.summary(),
                    prompt_version = PROMPT_VERSION,
                    "Ticket complete"
                );
                Ok(TicketOutcome {
                    ticket: ticket.clone(),
                    classification: progress.classification,
                    draft: progress.draft,
                    passages: progress.passages,
                    evaluation: progress.evaluation,
                    disposition: progress.disposition,
                    transitions: sm.into_transitions(),
                })
            }
            Err(error) => {
                let state = sm.current();
                if let Err(e) = sm.fail(&error.to_string()) {
                    warn!(error = %e, "Could not record failure transition");
                }
                warn!(
                    state = %state,
                    error = %error,
                    raw = error.raw_output().unwrap_or(""),
                    "Ticket processing aborted"
                );
                Err(TicketFailure {
                    ticket: ticket.clone(),
                    state,
                    error,
                    transitions: sm.into_transitions(),
                })
            }
        }
    }

    /// Process tickets one at a time. A failed ticket never stops the batch.
    pub async fn run_batch(&self, tickets: &[Ticket]) -> Vec<TicketResult> {
        let mut results = Vec::with_capacity(tickets.len());
        for (index, ticket) in tickets.iter().enumerate() {
            let span = info_span!("ticket", index, text = %ticket.text);
            results.push(self.handle(ticket).instrument(span).await);
        }
        results
    }

    async fn drive(
        &self,
        ticket: &Ticket,
        sm: &mut StateMachine,
    ) -> Result<Progress, PipelineError> {
        let classification = self.stages.classifier.classify(ticket).await?;
        info!(
            category = %classification.category,
            priority = %classification.priority,
            "Ticket classified"
        );
        let label = format!("{}/{}", classification.category, classification.priority);
        advance(sm, TicketState::Classified, Some(label.as_str()))?;

        let drafted = self
            .stages
            .responder
            .respond(ticket, &classification.category)
            .await?;
        advance(sm, TicketState::Drafted, None)?;

        let (evaluation, disposition) = if self.policy.requires_manual_review(&classification) {
            let reason = self.policy.manual_review_reason(&classification);
            info!(category = %classification.category, "Category requires manual review");
            advance(sm, TicketState::AutoEscalate, Some(reason.as_str()))?;
            let disposition = self.escalate(ticket, reason, sm).await?;
            (None, disposition)
        } else {
            let evaluator = &self.stages.evaluator;
            let evaluation = match evaluator.evaluate(ticket, &drafted.draft).await {
                Ok(verdict) => Evaluation::resolve(verdict),
                Err(e) if e.is_malformed_output() => {
                    warn!(error = %e, "Evaluator output unreadable; treating as rejection");
                    Evaluation::rejected()
                }
                Err(e) => return Err(e),
            };
            advance(sm, TicketState::Evaluated, Some(evaluation.reason.as_str()))?;

            let disposition = if evaluation.approve {
                advance(sm, TicketState::Approved, None)?;
                advance(sm, TicketState::Done, None)?;
                info!("Final response approved");
                Disposition::Approved {
                    draft: drafted.draft.clone(),
                }
            } else {
                self.escalate(ticket, evaluation.reason.clone(), sm).await?
            };
            (Some(evaluation), disposition)
        };

        Ok(Progress {
            classification,
            draft: drafted.draft,
            passages: drafted.passages,
            evaluation,
            disposition,
        })
    }

    async fn escalate(
        &self,
        ticket: &Ticket,
        reason: String,
        sm: &mut StateMachine,
    ) -> Result<Disposition, PipelineError> {
        advance(sm, TicketState::Escalated, Some(reason.as_str()))?;
        let note = self.stages.escalator.escalate(ticket, &reason).await?;
        advance(sm, TicketState::Done, None)?;
        info!(reason = %reason, "Ticket escalated");
        Ok(Disposition::Escalated { note, reason })
    }
}

fn advance(
    sm: &mut StateMachine,
    to: TicketState,
    reason: Option<&str>,
) -> Result<(), PipelineError> {
    sm.advance(to, reason)
        .map_err(|e| PipelineError::Internal(e.into()))
}
