//! Human and JSON renderings of pipeline results for the CLI.

use std::fmt::Write as _;

use serde::Serialize;

use crate::pipeline::{TicketFailure, TicketOutcome, TicketResult};
use crate::prompts::PROMPT_VERSION;
use crate::retrieval::PolicyPassage;
use crate::state_machine::{TicketState, TransitionRecord};
use crate::types::{Disposition, Ticket};

/// One ticket's result as emitted by `run --json`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketReport<'a> {
    Completed(&'a TicketOutcome),
    Failed(FailureReport<'a>),
}

#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub ticket: &'a Ticket,
    pub state: TicketState,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<&'a str>,
    pub transitions: &'a [TransitionRecord],
}

impl<'a> From<&'a TicketFailure> for FailureReport<'a> {
    fn from(failure: &'a TicketFailure) -> Self {
        Self {
            ticket: &failure.ticket,
            state: failure.state,
            error: failure.error.to_string(),
            raw_output: failure.raw_output(),
            transitions: &failure.transitions,
        }
    }
}

impl<'a> From<&'a TicketResult> for TicketReport<'a> {
    fn from(result: &'a TicketResult) -> Self {
        match result {
            Ok(outcome) => Self::Completed(outcome),
            Err(failure) => Self::Failed(failure.into()),
        }
    }
}

/// Disposition counts over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub approved: usize,
    pub escalated: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[TicketResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result {
                Ok(outcome) if outcome.disposition.is_approved() => summary.approved += 1,
                Ok(_) => summary.escalated += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Serialize)]
struct BatchReport<'a> {
    prompt_version: &'static str,
    summary: BatchSummary,
    tickets: Vec<TicketReport<'a>>,
}

/// Whole batch as pretty JSON, tagged with the prompt version that produced it.
pub fn render_json(results: &[TicketResult]) -> serde_json::Result<String> {
    let report = BatchReport {
        prompt_version: PROMPT_VERSION,
        summary: BatchSummary::from_results(results),
        tickets: results.iter().map(TicketReport::from).collect(),
    };
    serde_json::to_string_pretty(&report)
}

/// Plain-text report for one ticket. `index` is 1-based.
pub fn render_text(index: usize, result: &TicketResult) -> String {
    let mut out = String::new();
    let ticket = match result {
        Ok(outcome) => &outcome.ticket,
        Err(failure) => &failure.ticket,
    };
    let _ = writeln!(out, "=== Ticket {index} ===");
    let _ = writeln!(out, "{}", ticket.text);

    match result {
        Ok(outcome) => {
            let c = &outcome.classification;
            let _ = writeln!(out, "Category: {} | Priority: {}", c.category, c.priority);
            let _ = writeln!(out, "Policies: {}", passage_summary(&outcome.passages));
            match &outcome.disposition {
                Disposition::Approved { draft } => {
                    let _ = writeln!(out, "Final response (approved):");
                    let _ = writeln!(out, "{}", draft.text);
                }
                Disposition::Escalated { note, reason } => {
                    let _ = writeln!(out, "Escalated: {reason}");
                    let _ = writeln!(out, "Escalation note:");
                    let _ = writeln!(out, "{note}");
                }
            }
        }
        Err(failure) => {
            let _ = writeln!(out, "FAILED in {}: {}", failure.state, failure.error);
            if let Some(raw) = failure.raw_output() {
                let _ = writeln!(out, "Raw model output:");
                let _ = writeln!(out, "{raw}");
            }
        }
    }
    out
}

/// Closing line for a text batch report.
pub fn render_summary(summary: &BatchSummary) -> String {
    format!(
        "{} tickets: {} approved, {} escalated, {} failed",
        summary.total, summary.approved, summary.escalated, summary.failed
    )
}

/// One line per passage for `search`.
pub fn render_passages(passages: &[PolicyPassage]) -> String {
    if passages.is_empty() {
        return "No matching policies.".to_string();
    }
    passages
        .iter()
        .map(|p| {
            format!(
                "[{:.3}] {} ({}): {}",
                p.score,
                p.id,
                p.category.as_deref().unwrap_or("-"),
                p.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn passage_summary(passages: &[PolicyPassage]) -> String {
    if passages.is_empty() {
        return "none".to_string();
    }
    passages
        .iter()
        .map(|p| format!("{} ({:.2})", p.id, p.score))
        .collect::<Vec<_>>()
        .join(", ")
}
